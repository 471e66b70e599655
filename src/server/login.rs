use super::{keep_alive, Flow, ServerConnection};
use crate::auth::{GameProfile, SessionService};
use crate::error::Result;
use crate::logger::{log, LogSeverity::*};
use crate::net::crypt::{server_id_hash, SharedSecret};
use crate::net::session::{Control, SessionHandle};
use crate::protocol::login::{
    EncryptionRequestPacket, EncryptionResponsePacket, LoginSetCompressionPacket,
    LoginStartPacket, LoginSuccessPacket,
};
use crate::protocol::packet::ClientboundPacket;
use crate::protocol::state::SubProtocol;
use std::sync::Arc;

impl ServerConnection {
    pub(super) fn handle_login_start(&mut self, start: LoginStartPacket) -> Result<Flow> {
        log(
            format!("[{}] Login started for {}", self.session.peer(), start.username),
            Info,
        );
        self.username = start.username;
        if self.session.context.verify_users {
            self.session
                .send(ClientboundPacket::EncryptionRequest(EncryptionRequestPacket {
                    server_id: self.server_id.clone(),
                    public_key: self.shared.key_pair.public_key_der().to_vec(),
                    verify_token: self.verify_token.to_vec(),
                }))?;
        } else {
            self.spawn_auth(None);
        }
        Ok(Flow::Continue)
    }

    pub(super) fn handle_encryption_response(
        &mut self,
        response: EncryptionResponsePacket,
    ) -> Result<Flow> {
        if !self.session.context.verify_users
            || self.authenticating
            || self.session.is_encrypted()
        {
            return Ok(Flow::Disconnect("Unexpected encryption response.".to_owned()));
        }
        let private_key = self.shared.key_pair.private_key();
        let token_matches = response
            .decrypt_verify_token(private_key)
            .map(|token| token == self.verify_token)
            .unwrap_or(false);
        if !token_matches {
            return Ok(Flow::Disconnect("Invalid nonce!".to_owned()));
        }
        let secret = match response.decrypt_secret(private_key) {
            Ok(secret) => secret,
            Err(err) => {
                log(
                    format!("[{}] Bad shared secret: {}", self.session.peer(), err),
                    Warning,
                );
                return Ok(Flow::Disconnect("Invalid nonce!".to_owned()));
            }
        };
        self.session.enable_encryption(&secret)?;
        self.spawn_auth(Some(secret));
        Ok(Flow::Continue)
    }

    /// Verifies the player in the background. The outcome comes back to
    /// [`ServerConnection::run`] as a control request.
    fn spawn_auth(&mut self, secret: Option<SharedSecret>) {
        if self.authenticating {
            return;
        }
        self.authenticating = true;

        let handle = self.session.handle();
        let username = self.username.clone();
        let server_hash = secret.map(|secret| {
            server_id_hash(
                &self.server_id,
                &secret,
                self.shared.key_pair.public_key_der(),
            )
        });
        let service = self.shared.session_service.clone();

        tokio::spawn(async move {
            let cancel = handle.cancellation();
            tokio::select! {
                _ = cancel.cancelled() => {}
                control = authenticate(service, username, server_hash) => handle.control(control),
            }
        });
    }

    /// Login finished: announce compression, confirm the profile and enter the game.
    pub(super) fn handle_authenticated(&mut self, profile: GameProfile) -> Result<()> {
        let threshold = self.session.context.server_compression_threshold;
        self.session
            .send(ClientboundPacket::LoginSetCompression(LoginSetCompressionPacket {
                threshold,
            }))?;
        self.session.set_compression_threshold(threshold)?;
        self.session
            .send(ClientboundPacket::LoginSuccess(LoginSuccessPacket {
                profile: profile.clone(),
            }))?;
        self.session.transition(SubProtocol::Game)?;
        log(
            format!(
                "[{}] {} ({}) logged in",
                self.session.peer(),
                profile.name,
                profile.id
            ),
            Info,
        );

        let handle: SessionHandle<ClientboundPacket> = self.session.handle();
        self.session.context.profile = Some(profile.clone());
        if let Some(handler) = &self.shared.login_handler {
            handler.logged_in(&handle, &profile);
        }
        keep_alive::spawn(handle, self.shared.config.keep_alive_interval());
        Ok(())
    }
}

async fn authenticate(
    service: Arc<dyn SessionService>,
    username: String,
    server_hash: Option<String>,
) -> Control {
    let Some(server_hash) = server_hash else {
        return Control::Authenticated(GameProfile::offline(&username));
    };
    match service.profile_by_server(&username, &server_hash).await {
        Ok(Some(profile)) => Control::Authenticated(profile),
        Ok(None) => Control::Disconnect("Failed to verify username.".to_owned()),
        Err(err) => {
            log(format!("Session service request failed: {}", err), Warning);
            Control::Disconnect("Failed to make session service request.".to_owned())
        }
    }
}
