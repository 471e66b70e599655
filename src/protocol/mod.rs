pub mod buffer;
pub mod chat;
pub mod chunk;
pub mod game;
pub mod handshake;
pub mod login;
pub mod metadata;
pub mod nbt;
pub mod packet;
pub mod state;
pub mod status;
pub mod types;

pub const PROTOCOL_VERSION: i32 = 340;
pub const GAME_VERSION: &str = "1.12.2";
