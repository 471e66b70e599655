//! Client side of the connection lifecycle: handshake, login with optional
//! encryption, status queries and the keep-alive echo.

use crate::auth::{AuthError, GameProfile, SessionService, UnavailableSessionService};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::logger::{log, systime::unix_millis, LogSeverity::*};
use crate::net::crypt::{generate_shared_secret, server_id_hash};
use crate::net::session::{Control, EventSender, Incoming, Session, SessionContext, SessionHandle};
use crate::protocol::chat;
use crate::protocol::game::{ClientKeepAlivePacket, ServerKeepAlivePacket};
use crate::protocol::handshake::HandshakePacket;
use crate::protocol::login::{EncryptionRequestPacket, EncryptionResponsePacket, LoginStartPacket};
use crate::protocol::packet::{ClientboundPacket, ServerboundPacket};
use crate::protocol::state::{HandshakeIntent, SubProtocol};
use crate::protocol::status::{ServerStatusInfo, StatusPingPacket, StatusQueryPacket};
use crate::protocol::PROTOCOL_VERSION;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Receives the status document of a queried server.
pub trait ServerInfoHandler: Send {
    fn handle(&mut self, info: &ServerStatusInfo);
}

impl<F: FnMut(&ServerStatusInfo) + Send> ServerInfoHandler for F {
    fn handle(&mut self, info: &ServerStatusInfo) {
        self(info)
    }
}

/// Receives the status ping round trip in milliseconds.
pub trait ServerPingTimeHandler: Send {
    fn handle(&mut self, ping: i64);
}

impl<F: FnMut(i64) + Send> ServerPingTimeHandler for F {
    fn handle(&mut self, ping: i64) {
        self(ping)
    }
}

/// Receives the in-game packets the client does not answer itself.
pub trait GamePacketHandler: Send {
    fn handle(&mut self, packet: &ClientboundPacket, session: &SessionHandle<ServerboundPacket>);
}

impl<F> GamePacketHandler for F
where
    F: FnMut(&ClientboundPacket, &SessionHandle<ServerboundPacket>) + Send,
{
    fn handle(&mut self, packet: &ClientboundPacket, session: &SessionHandle<ServerboundPacket>) {
        self(packet, session)
    }
}

enum Flow {
    Continue,
    Disconnect(String),
}

pub struct ClientSession {
    session: Session<ClientboundPacket, ServerboundPacket>,
    config: ClientConfig,
    session_service: Arc<dyn SessionService>,
    info_handler: Option<Box<dyn ServerInfoHandler>>,
    ping_time_handler: Option<Box<dyn ServerPingTimeHandler>>,
    game_handler: Option<Box<dyn GamePacketHandler>>,
}

impl ClientSession {
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(config.address()).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, config))
    }

    /// Wraps an established stream. The player profile defaults to the
    /// offline profile of the configured username.
    pub fn new<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let context = SessionContext {
            profile: Some(GameProfile::offline(&config.username)),
            access_token: config.access_token.clone(),
            ..SessionContext::default()
        };
        ClientSession {
            session: Session::new(stream, config.address(), context),
            config,
            session_service: Arc::new(UnavailableSessionService),
            info_handler: None,
            ping_time_handler: None,
            game_handler: None,
        }
    }

    /// Authenticated profile to join with, usually the selected profile of an
    /// authentication service.
    pub fn with_profile(mut self, profile: GameProfile) -> Self {
        self.session.context.profile = Some(profile);
        self
    }

    pub fn with_session_service(mut self, service: Arc<dyn SessionService>) -> Self {
        self.session_service = service;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.session.set_events(events);
        self
    }

    pub fn on_server_info(mut self, handler: impl ServerInfoHandler + 'static) -> Self {
        self.info_handler = Some(Box::new(handler));
        self
    }

    pub fn on_ping_time(mut self, handler: impl ServerPingTimeHandler + 'static) -> Self {
        self.ping_time_handler = Some(Box::new(handler));
        self
    }

    pub fn on_game_packet(mut self, handler: impl GamePacketHandler + 'static) -> Self {
        self.game_handler = Some(Box::new(handler));
        self
    }

    pub fn handle(&self) -> SessionHandle<ServerboundPacket> {
        self.session.handle()
    }

    pub fn profile(&self) -> Option<&GameProfile> {
        self.session.context.profile.as_ref()
    }

    pub fn context(&self) -> &SessionContext {
        &self.session.context
    }

    pub fn sub_protocol(&self) -> SubProtocol {
        self.session.sub_protocol()
    }

    pub fn history(&self) -> &[SubProtocol] {
        self.session.history()
    }

    /// Drives the connection until either side ends it and returns the
    /// disconnect reason. Protocol failures close the session and are returned
    /// as errors.
    pub async fn run(&mut self) -> Result<String> {
        let result = self.drive().await;
        let reason = match &result {
            Ok(reason) => reason.clone(),
            Err(err) => {
                log(format!("[{}] Session failed: {}", self.session.peer(), err), Error);
                err.to_string()
            }
        };
        self.session.close(&reason);
        self.session.finish().await;
        result
    }

    async fn drive(&mut self) -> Result<String> {
        self.connected()?;
        loop {
            let flow = match self.session.next().await? {
                Incoming::Packet(packet) => self.handle_packet(packet).await?,
                Incoming::Control(Control::Disconnect(reason)) => Flow::Disconnect(reason),
                Incoming::Control(Control::Authenticated(_)) => Flow::Continue,
                Incoming::Closed => Flow::Disconnect("Connection closed".to_owned()),
            };
            if let Flow::Disconnect(reason) = flow {
                return Ok(reason);
            }
        }
    }

    fn connected(&mut self) -> Result<()> {
        let intent = self.config.intent;
        self.session.send(ServerboundPacket::Handshake(HandshakePacket {
            protocol_version: PROTOCOL_VERSION,
            server_address: self.config.host.clone(),
            server_port: self.config.port,
            intent,
        }))?;
        self.session.transition(intent.target())?;

        match intent {
            HandshakeIntent::Login => {
                let username = self
                    .session
                    .context
                    .profile
                    .as_ref()
                    .map(|profile| profile.name.clone())
                    .unwrap_or_default();
                self.session
                    .send(ServerboundPacket::LoginStart(LoginStartPacket { username }))
            }
            HandshakeIntent::Status => self
                .session
                .send(ServerboundPacket::StatusQuery(StatusQueryPacket)),
        }
    }

    async fn handle_packet(&mut self, packet: ClientboundPacket) -> Result<Flow> {
        match packet {
            ClientboundPacket::EncryptionRequest(request) => {
                return self.handle_encryption_request(request).await
            }
            ClientboundPacket::LoginSuccess(success) => {
                log(
                    format!("Logged in as {} ({})", success.profile.name, success.profile.id),
                    Info,
                );
                self.session.context.profile = Some(success.profile);
                self.session.transition(SubProtocol::Game)?;
            }
            ClientboundPacket::LoginDisconnect(disconnect) => {
                return Ok(Flow::Disconnect(chat::plain_text(&disconnect.reason)))
            }
            ClientboundPacket::LoginSetCompression(compression) => {
                self.session.set_compression_threshold(compression.threshold)?
            }
            ClientboundPacket::StatusResponse(response) => {
                if let Some(handler) = self.info_handler.as_mut() {
                    handler.handle(&response.info);
                }
                self.session
                    .send(ServerboundPacket::StatusPing(StatusPingPacket {
                        time: unix_millis(),
                    }))?;
            }
            ClientboundPacket::StatusPong(pong) => {
                if let Some(handler) = self.ping_time_handler.as_mut() {
                    handler.handle(unix_millis() - pong.time);
                }
                return Ok(Flow::Disconnect("Finished".to_owned()));
            }
            ClientboundPacket::KeepAlive(ServerKeepAlivePacket { ping_id }) => {
                self.session
                    .send(ServerboundPacket::KeepAlive(ClientKeepAlivePacket { ping_id }))?;
            }
            ClientboundPacket::Disconnect(disconnect) => {
                return Ok(Flow::Disconnect(chat::plain_text(&disconnect.reason)))
            }
            ClientboundPacket::SetCompression(compression) => {
                self.session.set_compression_threshold(compression.threshold)?
            }
            other => {
                if let Some(handler) = self.game_handler.as_mut() {
                    handler.handle(&other, &self.session.handle());
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_encryption_request(&mut self, request: EncryptionRequestPacket) -> Result<Flow> {
        let secret = generate_shared_secret();
        let server_hash = server_id_hash(&request.server_id, &secret, &request.public_key);
        let profile = self
            .session
            .context
            .profile
            .clone()
            .unwrap_or_else(|| GameProfile::offline(&self.config.username));
        let access_token = self.session.context.access_token.clone().unwrap_or_default();

        if let Err(err) = self
            .session_service
            .join_server(&profile, &access_token, &server_hash)
            .await
        {
            log(format!("Session server join failed: {}", err), Warning);
            let reason = match err {
                AuthError::ServiceUnavailable => {
                    "Login failed: Authentication service unavailable.".to_owned()
                }
                AuthError::InvalidCredentials => "Login failed: Invalid login session.".to_owned(),
                AuthError::Request(message) => {
                    format!("Login failed: Authentication error: {}", message)
                }
            };
            return Ok(Flow::Disconnect(reason));
        }

        let response =
            EncryptionResponsePacket::new(&secret, &request.public_key, &request.verify_token)?;
        self.session
            .send(ServerboundPacket::EncryptionResponse(response))?;
        self.session.enable_encryption(&secret)?;
        Ok(Flow::Continue)
    }
}
