pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod net;
pub mod protocol;
pub mod server;

// Re-export commonly used items
pub use client::ClientSession;
pub use config::{ClientConfig, ServerConfig};
pub use error::{LodestoneError, Result};
pub use logger::{log, LogSeverity};
pub use protocol::packet::{ClientboundPacket, Packet, ServerboundPacket};
pub use server::{Server, ServerConnection};
