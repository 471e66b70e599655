#![allow(dead_code)]

use futures::future::BoxFuture;
use lodestone::auth::{AuthError, GameProfile, SessionService};
use lodestone::config::ServerConfig;
use lodestone::net::session::{Incoming, Session, SessionContext, SessionEvent};
use lodestone::protocol::handshake::HandshakePacket;
use lodestone::protocol::packet::{ClientboundPacket, ServerboundPacket};
use lodestone::protocol::state::HandshakeIntent;
use lodestone::server::{Server, ServerConnection};
use lodestone::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub type RawClient = Session<ClientboundPacket, ServerboundPacket>;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn offline_config() -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1:0".to_owned(),
        ..ServerConfig::default()
    }
}

pub fn online_config() -> ServerConfig {
    ServerConfig {
        verify_users: true,
        ..offline_config()
    }
}

/// Serves one end of an in-memory pipe and hands back the other end.
pub fn serve(server: &Server) -> (DuplexStream, JoinHandle<Result<String>>) {
    let (client, server_side) = duplex(64 * 1024);
    let mut connection: ServerConnection = server.accept(server_side, "test-client");
    let task = tokio::spawn(async move { connection.run().await });
    (client, task)
}

pub fn raw_client(stream: DuplexStream) -> RawClient {
    Session::new(stream, "test-server", SessionContext::default())
}

pub fn handshake(protocol_version: i32, intent: HandshakeIntent) -> ServerboundPacket {
    ServerboundPacket::Handshake(HandshakePacket {
        protocol_version,
        server_address: "localhost".to_string(),
        server_port: 25565,
        intent,
    })
}

pub async fn next_packet(client: &mut RawClient) -> ClientboundPacket {
    match timeout(TIMEOUT, client.next()).await {
        Ok(Ok(Incoming::Packet(packet))) => packet,
        other => panic!("Expected a packet, got {:?}", other),
    }
}

pub async fn wait_for_event<F>(events: &mut UnboundedReceiver<SessionEvent>, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    timeout(TIMEOUT, async {
        loop {
            match events.recv().await {
                Some(event) if matches(&event) => return event,
                Some(_) => continue,
                None => panic!("Event channel closed"),
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

/// Session service double. Both sides of an online login can share one
/// instance, so the hashes they computed can be compared.
#[derive(Default)]
pub struct MockSessionService {
    pub profile: Option<GameProfile>,
    pub join_error: Option<AuthError>,
    /// Never answer profile lookups.
    pub stall: bool,
    pub joined: Mutex<Vec<String>>,
    pub verified: Mutex<Vec<String>>,
}

impl MockSessionService {
    pub fn knowing(profile: GameProfile) -> Arc<Self> {
        Arc::new(MockSessionService {
            profile: Some(profile),
            ..MockSessionService::default()
        })
    }

    pub fn stalling() -> Arc<Self> {
        Arc::new(MockSessionService {
            stall: true,
            ..MockSessionService::default()
        })
    }

    pub fn failing_join(error: AuthError) -> Arc<Self> {
        Arc::new(MockSessionService {
            join_error: Some(error),
            ..MockSessionService::default()
        })
    }
}

impl SessionService for MockSessionService {
    fn join_server<'a>(
        &'a self,
        _profile: &'a GameProfile,
        _access_token: &'a str,
        server_hash: &'a str,
    ) -> BoxFuture<'a, std::result::Result<(), AuthError>> {
        Box::pin(async move {
            if let Some(error) = &self.join_error {
                return Err(error.clone());
            }
            self.joined.lock().push(server_hash.to_owned());
            Ok(())
        })
    }

    fn profile_by_server<'a>(
        &'a self,
        username: &'a str,
        server_hash: &'a str,
    ) -> BoxFuture<'a, std::result::Result<Option<GameProfile>, AuthError>> {
        Box::pin(async move {
            self.verified.lock().push(server_hash.to_owned());
            if self.stall {
                futures::future::pending::<()>().await;
            }
            Ok(self
                .profile
                .clone()
                .filter(|profile| profile.name == username))
        })
    }
}
