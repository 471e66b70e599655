//! Server side of the connection lifecycle.

mod keep_alive;
mod login;

pub use keep_alive::record_answer;

use crate::auth::{GameProfile, SessionService, UnavailableSessionService};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::logger::{log, LogSeverity::*};
use crate::net::crypt::{generate_verify_token, ServerKeyPair};
use crate::net::session::{Control, EventSender, Incoming, Session, SessionContext, SessionHandle};
use crate::protocol::game::ServerDisconnectPacket;
use crate::protocol::handshake::HandshakePacket;
use crate::protocol::login::LoginDisconnectPacket;
use crate::protocol::packet::{ClientboundPacket, ServerboundPacket};
use crate::protocol::state::{HandshakeIntent, SubProtocol};
use crate::protocol::status::{ServerStatusInfo, StatusPongPacket, StatusResponsePacket};
use crate::protocol::{GAME_VERSION, PROTOCOL_VERSION};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

/// Builds the document answered to status queries.
pub trait ServerInfoBuilder: Send + Sync {
    fn build_info(&self, peer: &str) -> ServerStatusInfo;
}

impl<F: Fn(&str) -> ServerStatusInfo + Send + Sync> ServerInfoBuilder for F {
    fn build_info(&self, peer: &str) -> ServerStatusInfo {
        self(peer)
    }
}

/// Called once a player reached the game state.
pub trait LoginHandler: Send + Sync {
    fn logged_in(&self, session: &SessionHandle<ClientboundPacket>, profile: &GameProfile);
}

impl<F> LoginHandler for F
where
    F: Fn(&SessionHandle<ClientboundPacket>, &GameProfile) + Send + Sync,
{
    fn logged_in(&self, session: &SessionHandle<ClientboundPacket>, profile: &GameProfile) {
        self(session, profile)
    }
}

/// Answers with zero players online and the configured limit and motd.
struct DefaultInfoBuilder {
    max_players: i32,
    motd: String,
}

impl ServerInfoBuilder for DefaultInfoBuilder {
    fn build_info(&self, _peer: &str) -> ServerStatusInfo {
        ServerStatusInfo::new(0, self.max_players, &self.motd)
    }
}

struct Shared {
    config: ServerConfig,
    key_pair: ServerKeyPair,
    session_service: Arc<dyn SessionService>,
    info_builder: Arc<dyn ServerInfoBuilder>,
    login_handler: Option<Arc<dyn LoginHandler>>,
    events: Option<EventSender>,
}

/// Settings and capabilities shared by every connection of one listener.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").finish_non_exhaustive()
    }
}

pub struct ServerBuilder {
    config: ServerConfig,
    session_service: Arc<dyn SessionService>,
    info_builder: Option<Arc<dyn ServerInfoBuilder>>,
    login_handler: Option<Arc<dyn LoginHandler>>,
    events: Option<EventSender>,
}

impl ServerBuilder {
    pub fn session_service(mut self, service: Arc<dyn SessionService>) -> Self {
        self.session_service = service;
        self
    }

    pub fn info_builder(mut self, builder: impl ServerInfoBuilder + 'static) -> Self {
        self.info_builder = Some(Arc::new(builder));
        self
    }

    pub fn login_handler(mut self, handler: impl LoginHandler + 'static) -> Self {
        self.login_handler = Some(Arc::new(handler));
        self
    }

    /// Every connection publishes its lifecycle events here.
    pub fn events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Validates the configuration and generates the listener's RSA key pair.
    pub fn build(self) -> Result<Server> {
        self.config.validate()?;
        let info_builder: Arc<dyn ServerInfoBuilder> = match self.info_builder {
            Some(builder) => builder,
            None => Arc::new(DefaultInfoBuilder {
                max_players: self.config.max_players,
                motd: self.config.motd.clone(),
            }),
        };
        Ok(Server {
            shared: Arc::new(Shared {
                key_pair: ServerKeyPair::generate()?,
                config: self.config,
                session_service: self.session_service,
                info_builder,
                login_handler: self.login_handler,
                events: self.events,
            }),
        })
    }
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder {
            config,
            session_service: Arc::new(UnavailableSessionService),
            info_builder: None,
            login_handler: None,
            events: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.shared.config.bind).await?;
        log(format!("Listening on {}", listener.local_addr()?), Info);
        Ok(listener)
    }

    /// Accepts connections forever, each handled in its own task.
    pub async fn run(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (socket, addr) = listener.accept().await?;
            log(format!("New connection from: {}", addr), Info);
            if let Err(err) = socket.set_nodelay(true) {
                log(format!("Failed to set TCP_NODELAY for {}: {}", addr, err), Warning);
            }
            let mut connection = self.accept(socket, addr.to_string());
            tokio::spawn(async move {
                let _ = connection.run().await;
            });
        }
    }

    /// Starts serving one already established stream.
    pub fn accept<S>(&self, stream: S, peer: impl Into<String>) -> ServerConnection
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let context = SessionContext {
            verify_users: self.shared.config.verify_users,
            server_compression_threshold: self.shared.config.compression_threshold,
            ..SessionContext::default()
        };
        let mut session = Session::new(stream, peer, context);
        if let Some(events) = &self.shared.events {
            session.set_events(events.clone());
        }
        ServerConnection {
            session,
            shared: self.shared.clone(),
            verify_token: generate_verify_token(),
            server_id: String::new(),
            username: String::new(),
            authenticating: false,
        }
    }
}

enum Flow {
    Continue,
    Disconnect(String),
}

/// One client connection as seen by the server.
pub struct ServerConnection {
    session: Session<ServerboundPacket, ClientboundPacket>,
    shared: Arc<Shared>,
    verify_token: [u8; 4],
    server_id: String,
    username: String,
    authenticating: bool,
}

impl ServerConnection {
    pub fn handle(&self) -> SessionHandle<ClientboundPacket> {
        self.session.handle()
    }

    pub fn sub_protocol(&self) -> SubProtocol {
        self.session.sub_protocol()
    }

    pub fn history(&self) -> &[SubProtocol] {
        self.session.history()
    }

    pub fn profile(&self) -> Option<&GameProfile> {
        self.session.context.profile.as_ref()
    }

    /// Latency of the last answered keep-alive in milliseconds.
    pub fn ping(&self) -> i64 {
        self.session.handle().ping()
    }

    /// Serves the connection until it ends and returns the disconnect reason.
    pub async fn run(&mut self) -> Result<String> {
        let result = self.drive().await;
        let reason = match &result {
            Ok(reason) => reason.clone(),
            Err(err) => {
                log(format!("[{}] Connection failed: {}", self.session.peer(), err), Error);
                err.to_string()
            }
        };
        self.disconnect(&reason);
        self.session.finish().await;
        result
    }

    async fn drive(&mut self) -> Result<String> {
        loop {
            let flow = match self.session.next().await? {
                Incoming::Packet(packet) => self.handle_packet(packet)?,
                Incoming::Control(Control::Authenticated(profile)) => {
                    self.handle_authenticated(profile)?;
                    Flow::Continue
                }
                Incoming::Control(Control::Disconnect(reason)) => Flow::Disconnect(reason),
                Incoming::Closed => Flow::Disconnect("Connection closed".to_owned()),
            };
            if let Flow::Disconnect(reason) = flow {
                return Ok(reason);
            }
        }
    }

    fn handle_packet(&mut self, packet: ServerboundPacket) -> Result<Flow> {
        match packet {
            ServerboundPacket::Handshake(handshake) => return self.handle_handshake(handshake),
            ServerboundPacket::StatusQuery(_) => {
                let info = self.shared.info_builder.build_info(self.session.peer());
                self.session
                    .send(ClientboundPacket::StatusResponse(StatusResponsePacket { info }))?;
            }
            ServerboundPacket::StatusPing(ping) => {
                self.session
                    .send(ClientboundPacket::StatusPong(StatusPongPacket { time: ping.time }))?;
            }
            ServerboundPacket::LoginStart(start) => return self.handle_login_start(start),
            ServerboundPacket::EncryptionResponse(response) => {
                return self.handle_encryption_response(response)
            }
            ServerboundPacket::KeepAlive(answer) => {
                if let Some(latency) =
                    record_answer(&self.session.handle().ping_state(), answer.ping_id)
                {
                    log(
                        format!("[{}] Keep-alive latency {} ms", self.session.peer(), latency),
                        Debug,
                    );
                }
            }
            ServerboundPacket::PlayerAbilities(_) | ServerboundPacket::Game(_) => {}
        }
        Ok(Flow::Continue)
    }

    fn handle_handshake(&mut self, handshake: HandshakePacket) -> Result<Flow> {
        self.session.transition(handshake.intent.target())?;
        if handshake.intent == HandshakeIntent::Login {
            if handshake.protocol_version > PROTOCOL_VERSION {
                return Ok(Flow::Disconnect(format!(
                    "Outdated server! I'm still on {}.",
                    GAME_VERSION
                )));
            }
            if handshake.protocol_version < PROTOCOL_VERSION {
                return Ok(Flow::Disconnect(format!(
                    "Outdated client! Please use {}.",
                    GAME_VERSION
                )));
            }
        }
        Ok(Flow::Continue)
    }

    /// Tells the client why, if the current state has a disconnect packet, then closes.
    pub fn disconnect(&mut self, reason: &str) {
        if self.session.is_closed() {
            return;
        }
        let packet = match self.session.sub_protocol() {
            SubProtocol::Login => Some(ClientboundPacket::LoginDisconnect(
                LoginDisconnectPacket::new(reason),
            )),
            SubProtocol::Game => Some(ClientboundPacket::Disconnect(ServerDisconnectPacket::new(
                reason,
            ))),
            SubProtocol::Handshake | SubProtocol::Status => None,
        };
        if let Some(packet) = packet {
            if let Err(err) = self.session.send(packet) {
                log(
                    format!("[{}] Could not send disconnect: {}", self.session.peer(), err),
                    Debug,
                );
            }
        }
        self.session.close(reason);
    }
}
