//! Login key exchange and the AES/CFB8 stream cipher used once it completes.

use crate::error::{LodestoneError, Result};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use rand::RngCore;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};

pub type SharedSecret = [u8; 16];

const RSA_BITS: usize = 1024;

/// RSA key pair a server hands out in its encryption requests.
pub struct ServerKeyPair {
    private_key: RsaPrivateKey,
    public_key_der: Vec<u8>,
}

impl ServerKeyPair {
    pub fn generate() -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_BITS)
            .map_err(|e| LodestoneError::Crypto(format!("Key generation failed: {}", e)))?;
        let public_key_der = RsaPublicKey::from(&private_key)
            .to_public_key_der()
            .map_err(|e| LodestoneError::Crypto(format!("Public key encoding failed: {}", e)))?
            .as_bytes()
            .to_vec();
        Ok(ServerKeyPair {
            private_key,
            public_key_der,
        })
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }
}

impl std::fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("public_key_der", &self.public_key_der.len())
            .finish_non_exhaustive()
    }
}

pub fn generate_shared_secret() -> SharedSecret {
    let mut secret = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

pub fn generate_verify_token() -> [u8; 4] {
    let mut token = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut token);
    token
}

pub fn rsa_encrypt(public_key_der: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let public_key = RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|e| LodestoneError::Crypto(format!("Invalid public key: {}", e)))?;
    public_key
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, data)
        .map_err(|e| LodestoneError::Crypto(format!("RSA encryption failed: {}", e)))
}

pub fn rsa_decrypt(private_key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    private_key
        .decrypt(Pkcs1v15Encrypt, data)
        .map_err(|e| LodestoneError::Crypto(format!("RSA decryption failed: {}", e)))
}

/// SHA-1 over server id, shared secret and public key, printed the way the
/// session service expects: signed, hex, no leading zeros.
pub fn server_id_hash(server_id: &str, secret: &[u8], public_key_der: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(secret);
    hasher.update(public_key_der);
    signed_hex(hasher.finalize().into())
}

fn signed_hex(mut digest: [u8; 20]) -> String {
    let negative = digest[0] & 0x80 != 0;
    if negative {
        // two's complement
        let mut carry = true;
        for byte in digest.iter_mut().rev() {
            *byte = !*byte;
            if carry {
                let (sum, overflow) = byte.overflowing_add(1);
                *byte = sum;
                carry = overflow;
            }
        }
    }

    let hex: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
    let trimmed = match hex.trim_start_matches('0') {
        "" => "0",
        rest => rest,
    };
    if negative {
        format!("-{}", trimmed)
    } else {
        trimmed.to_owned()
    }
}

/// AES-128 in CFB8 mode with the shared secret as both key and IV. One
/// instance per direction; the cipher state carries across frames.
pub struct StreamEncryptor(cfb8::Encryptor<Aes128>);

pub struct StreamDecryptor(cfb8::Decryptor<Aes128>);

impl StreamEncryptor {
    pub fn new(secret: &SharedSecret) -> Self {
        StreamEncryptor(cfb8::Encryptor::new(secret.into(), secret.into()))
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data.chunks_mut(1) {
            self.0.encrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

impl StreamDecryptor {
    pub fn new(secret: &SharedSecret) -> Self {
        StreamDecryptor(cfb8::Decryptor::new(secret.into(), secret.into()))
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.chunks_mut(1) {
            self.0.decrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_id_hash_known_digests() {
        assert_eq!(
            server_id_hash("Notch", &[], &[]),
            "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48"
        );
        assert_eq!(
            server_id_hash("jeb_", &[], &[]),
            "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1"
        );
        assert_eq!(
            server_id_hash("simon", &[], &[]),
            "88e16a1019277b15d58faf0541e11910eb756f6"
        );
    }

    #[test]
    fn test_cipher_streams_across_calls() {
        let secret = generate_shared_secret();
        let plain = b"a frame, then another frame".to_vec();

        let mut whole = plain.clone();
        StreamEncryptor::new(&secret).encrypt(&mut whole);
        assert_ne!(whole, plain);

        let mut encryptor = StreamEncryptor::new(&secret);
        let mut split = plain.clone();
        let (first, second) = split.split_at_mut(7);
        encryptor.encrypt(first);
        encryptor.encrypt(second);
        assert_eq!(split, whole);

        let mut decryptor = StreamDecryptor::new(&secret);
        decryptor.decrypt(&mut whole);
        assert_eq!(whole, plain);
    }

    #[test]
    fn test_rsa_round_trip_and_wrong_key() {
        let keys = ServerKeyPair::generate().unwrap();
        let encrypted = rsa_encrypt(keys.public_key_der(), b"token").unwrap();
        assert_eq!(rsa_decrypt(keys.private_key(), &encrypted).unwrap(), b"token");

        let other = ServerKeyPair::generate().unwrap();
        assert!(rsa_decrypt(other.private_key(), &encrypted).is_err());
        assert!(rsa_encrypt(&[1, 2, 3], b"token").is_err());
    }
}
