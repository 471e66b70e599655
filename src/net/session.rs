//! One protocol connection: the read half, a writer task fed through a FIFO
//! queue, the sub-protocol state and the typed per-connection context.

use super::codec::{PacketDecoder, PacketEncoder};
use super::crypt::SharedSecret;
use crate::auth::GameProfile;
use crate::error::{LodestoneError, Result};
use crate::logger::{log, LogSeverity::*};
use crate::protocol::packet::{PacketFamily, RawPacket};
use crate::protocol::state::{StateMachine, SubProtocol};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Work for the writer task. Reconfiguration items take effect for the packet
/// queued right after them.
#[derive(Debug)]
pub enum Outbound {
    Packet(RawPacket),
    EnableEncryption(SharedSecret),
    SetCompression(i32),
    Close,
}

/// Requests delivered to the task that owns the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Disconnect(String),
    /// Background login verification finished.
    Authenticated(GameProfile),
}

/// Observable lifecycle of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: SubProtocol, to: SubProtocol },
    PacketReceived { id: i32, name: &'static str },
    PacketSent { id: i32, name: &'static str },
    Disconnected { reason: String },
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Keep-alive bookkeeping shared between the keep-alive task and the receive path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingState {
    pub last_ping_id: i64,
    pub last_ping_time: i64,
    /// Round trip in milliseconds of the last answered keep-alive.
    pub latency: i64,
}

/// Typed per-connection settings and results.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub profile: Option<GameProfile>,
    pub access_token: Option<String>,
    pub verify_users: bool,
    /// Threshold a server announces after login.
    pub server_compression_threshold: i32,
    /// Threshold currently applied to the transport, if any.
    pub compression: Option<i32>,
}

impl Default for SessionContext {
    fn default() -> Self {
        SessionContext {
            profile: None,
            access_token: None,
            verify_users: false,
            server_compression_threshold: 256,
            compression: None,
        }
    }
}

/// Cloneable access to a session from other tasks.
pub struct SessionHandle<Out> {
    outbound: mpsc::UnboundedSender<Outbound>,
    control: mpsc::UnboundedSender<Control>,
    events: Option<EventSender>,
    cancel: CancellationToken,
    ping: Arc<Mutex<PingState>>,
    _family: PhantomData<fn(Out)>,
}

impl<Out> Clone for SessionHandle<Out> {
    fn clone(&self) -> Self {
        SessionHandle {
            outbound: self.outbound.clone(),
            control: self.control.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
            ping: self.ping.clone(),
            _family: PhantomData,
        }
    }
}

impl<Out: PacketFamily> SessionHandle<Out> {
    /// Queues a packet without any state check.
    pub fn send(&self, packet: Out) -> Result<()> {
        let raw = packet.encode()?;
        self.emit(SessionEvent::PacketSent {
            id: raw.id,
            name: packet.name(),
        });
        self.queue(Outbound::Packet(raw))
    }

    /// Asks the owning task to end the session with `reason`.
    pub fn disconnect(&self, reason: impl Into<String>) {
        let _ = self.control.send(Control::Disconnect(reason.into()));
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled when the session closes.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ping(&self) -> i64 {
        self.ping.lock().latency
    }

    pub fn ping_state(&self) -> Arc<Mutex<PingState>> {
        self.ping.clone()
    }

    pub(crate) fn control(&self, control: Control) {
        let _ = self.control.send(control);
    }

    fn queue(&self, item: Outbound) -> Result<()> {
        self.outbound
            .send(item)
            .map_err(|_| LodestoneError::Disconnected("Connection closed".to_owned()))
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// What the owning task gets next.
#[derive(Debug)]
pub enum Incoming<In> {
    Packet(In),
    Control(Control),
    /// The peer closed the stream.
    Closed,
}

/// A connection that reads `In` packets and writes `Out` packets.
pub struct Session<In, Out> {
    peer: String,
    reader: FramedRead<BoxedReader, PacketDecoder>,
    writer: Option<JoinHandle<Result<()>>>,
    control: mpsc::UnboundedReceiver<Control>,
    handle: SessionHandle<Out>,
    state: StateMachine,
    pub context: SessionContext,
    closed: Option<String>,
    _family: PhantomData<fn() -> In>,
}

impl<In: PacketFamily, Out: PacketFamily> Session<In, Out> {
    pub fn new<S>(stream: S, peer: impl Into<String>, context: SessionContext) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let peer = peer.into();

        let writer = tokio::spawn(write_loop(
            FramedWrite::new(write, PacketEncoder::new()),
            outbound_rx,
            peer.clone(),
        ));

        Session {
            peer,
            reader: FramedRead::new(Box::new(read) as BoxedReader, PacketDecoder::new()),
            writer: Some(writer),
            control: control_rx,
            handle: SessionHandle {
                outbound: outbound_tx,
                control: control_tx,
                events: None,
                cancel: CancellationToken::new(),
                ping: Arc::new(Mutex::new(PingState::default())),
                _family: PhantomData,
            },
            state: StateMachine::new(),
            context,
            closed: None,
            _family: PhantomData,
        }
    }

    /// Publishes lifecycle events to `events`. Handles taken earlier keep their old sink.
    pub fn set_events(&mut self, events: EventSender) {
        self.handle.events = Some(events);
    }

    pub fn handle(&self) -> SessionHandle<Out> {
        self.handle.clone()
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn sub_protocol(&self) -> SubProtocol {
        self.state.current()
    }

    pub fn history(&self) -> &[SubProtocol] {
        self.state.history()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn close_reason(&self) -> Option<&str> {
        self.closed.as_deref()
    }

    pub fn transition(&mut self, to: SubProtocol) -> Result<()> {
        let from = self.state.current();
        self.state.transition(to)?;
        log(
            format!("[{}] Switched sub-protocol {:?} -> {:?}", self.peer, from, to),
            Debug,
        );
        self.handle.emit(SessionEvent::StateChanged { from, to });
        Ok(())
    }

    /// Queues a packet. Packets that do not belong to the current
    /// sub-protocol are rejected before anything reaches the wire.
    pub fn send(&mut self, packet: Out) -> Result<()> {
        let current = self.state.current();
        if packet.sub_protocol() != current {
            let raw = packet.encode()?;
            return Err(LodestoneError::IllegalPacket {
                state: current,
                direction: Out::DIRECTION,
                id: raw.id,
            });
        }
        log(
            format!("[{}] Sending {}", self.peer, packet.name()),
            Debug,
        );
        self.handle.send(packet)
    }

    /// Applies to inbound frames from now on and to outbound frames queued after this call.
    pub fn set_compression_threshold(&mut self, threshold: i32) -> Result<()> {
        self.reader.decoder_mut().set_compression_threshold(threshold);
        self.context.compression = (threshold >= 0).then_some(threshold);
        self.handle.queue(Outbound::SetCompression(threshold))
    }

    /// Same ordering rules as [`Session::set_compression_threshold`].
    pub fn enable_encryption(&mut self, secret: &SharedSecret) -> Result<()> {
        self.reader.decoder_mut().enable_encryption(secret);
        self.handle.queue(Outbound::EnableEncryption(*secret))
    }

    pub fn is_encrypted(&self) -> bool {
        self.reader.decoder().is_encrypted()
    }

    /// Waits for the next inbound packet or control request.
    pub async fn next(&mut self) -> Result<Incoming<In>> {
        tokio::select! {
            biased;
            control = self.control.recv() => Ok(match control {
                Some(control) => Incoming::Control(control),
                None => Incoming::Closed,
            }),
            frame = self.reader.next() => match frame {
                Some(frame) => {
                    let raw = frame?;
                    let id = raw.id;
                    let packet = In::decode(self.state.current(), raw)?;
                    log(
                        format!("[{}] Received {} (0x{:02x})", self.peer, packet.name(), id),
                        Debug,
                    );
                    self.handle.emit(SessionEvent::PacketReceived {
                        id,
                        name: packet.name(),
                    });
                    Ok(Incoming::Packet(packet))
                }
                None => Ok(Incoming::Closed),
            },
        }
    }

    /// Ends the session. Packets queued before this call are still written.
    pub fn close(&mut self, reason: &str) {
        if self.closed.is_some() {
            return;
        }
        log(format!("[{}] Disconnected: {}", self.peer, reason), Info);
        self.closed = Some(reason.to_owned());
        self.handle.cancel.cancel();
        self.handle.emit(SessionEvent::Disconnected {
            reason: reason.to_owned(),
        });
        let _ = self.handle.outbound.send(Outbound::Close);
    }

    /// Waits until the writer task has flushed and shut down the write half.
    pub async fn finish(&mut self) {
        if let Some(writer) = self.writer.take() {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log(format!("[{}] Write failed: {}", self.peer, err), Debug),
                Err(err) => log(format!("[{}] Writer task failed: {}", self.peer, err), Error),
            }
        }
    }
}

impl<In, Out> Drop for Session<In, Out> {
    fn drop(&mut self) {
        self.handle.cancel.cancel();
        let _ = self.handle.outbound.send(Outbound::Close);
    }
}

async fn write_loop<W>(
    mut sink: FramedWrite<WriteHalf<W>, PacketEncoder>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    peer: String,
) -> Result<()>
where
    W: AsyncRead + AsyncWrite + Send,
{
    while let Some(item) = queue.recv().await {
        match item {
            Outbound::Packet(packet) => sink.send(packet).await?,
            Outbound::EnableEncryption(secret) => {
                log(format!("[{}] Outbound encryption enabled", peer), Debug);
                sink.encoder_mut().enable_encryption(&secret);
            }
            Outbound::SetCompression(threshold) => {
                sink.encoder_mut().set_compression_threshold(threshold);
            }
            Outbound::Close => break,
        }
    }
    sink.close().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::game::{ClientKeepAlivePacket, ServerKeepAlivePacket};
    use crate::protocol::handshake::HandshakePacket;
    use crate::protocol::packet::{ClientboundPacket, ServerboundPacket};
    use crate::protocol::state::HandshakeIntent;
    use assert_matches::assert_matches;
    use tokio::io::duplex;

    type ClientSide = Session<ClientboundPacket, ServerboundPacket>;
    type ServerSide = Session<ServerboundPacket, ClientboundPacket>;

    fn pair() -> (ClientSide, ServerSide) {
        let (a, b) = duplex(64 * 1024);
        (
            Session::new(a, "client", SessionContext::default()),
            Session::new(b, "server", SessionContext::default()),
        )
    }

    fn handshake() -> ServerboundPacket {
        ServerboundPacket::Handshake(HandshakePacket {
            protocol_version: 340,
            server_address: "localhost".to_owned(),
            server_port: 25565,
            intent: HandshakeIntent::Login,
        })
    }

    #[tokio::test]
    async fn test_packets_cross_the_pipe() {
        let (mut client, mut server) = pair();
        client.send(handshake()).unwrap();
        assert_matches!(
            server.next().await.unwrap(),
            Incoming::Packet(ServerboundPacket::Handshake(_))
        );
    }

    #[tokio::test]
    async fn test_send_rejects_wrong_state() {
        let (mut client, _server) = pair();
        let keep_alive = ServerboundPacket::KeepAlive(ClientKeepAlivePacket { ping_id: 1 });
        assert_matches!(
            client.send(keep_alive),
            Err(LodestoneError::IllegalPacket {
                state: SubProtocol::Handshake,
                ..
            })
        );
    }

    #[tokio::test]
    async fn test_reconfiguration_applies_to_next_packet() {
        let (mut client, mut server) = pair();
        client.transition(SubProtocol::Login).unwrap();
        client.transition(SubProtocol::Game).unwrap();
        server.transition(SubProtocol::Login).unwrap();
        server.transition(SubProtocol::Game).unwrap();

        let secret = [5u8; 16];
        server
            .send(ClientboundPacket::KeepAlive(ServerKeepAlivePacket { ping_id: 1 }))
            .unwrap();
        server.enable_encryption(&secret).unwrap();
        server.set_compression_threshold(0).unwrap();
        server
            .send(ClientboundPacket::KeepAlive(ServerKeepAlivePacket { ping_id: 2 }))
            .unwrap();

        assert_matches!(
            client.next().await.unwrap(),
            Incoming::Packet(ClientboundPacket::KeepAlive(ServerKeepAlivePacket { ping_id: 1 }))
        );
        client.enable_encryption(&secret).unwrap();
        client.set_compression_threshold(0).unwrap();
        assert_matches!(
            client.next().await.unwrap(),
            Incoming::Packet(ClientboundPacket::KeepAlive(ServerKeepAlivePacket { ping_id: 2 }))
        );
        assert_eq!(client.context.compression, Some(0));
        assert!(client.is_encrypted());
    }

    #[tokio::test]
    async fn test_close_flushes_then_peer_sees_eof() {
        let (mut client, mut server) = pair();
        client.send(handshake()).unwrap();
        client.close("done");
        client.finish().await;
        assert!(client.handle().is_closed());
        assert_eq!(client.close_reason(), Some("done"));

        assert_matches!(server.next().await.unwrap(), Incoming::Packet(_));
        assert_matches!(server.next().await.unwrap(), Incoming::Closed);
    }

    #[tokio::test]
    async fn test_reads_frames_from_stream() {
        use bytes::BytesMut;
        use tokio_util::codec::Encoder;

        let mut frame = BytesMut::new();
        PacketEncoder::new()
            .encode(handshake().encode().unwrap(), &mut frame)
            .unwrap();
        let stream = tokio_test::io::Builder::new().read(&frame).build();

        let mut server: ServerSide = Session::new(stream, "mock", SessionContext::default());
        assert_matches!(
            server.next().await.unwrap(),
            Incoming::Packet(ServerboundPacket::Handshake(HandshakePacket {
                protocol_version: 340,
                ..
            }))
        );
        assert_matches!(server.next().await.unwrap(), Incoming::Closed);
        server.close("Connection closed");
        server.finish().await;
    }

    #[tokio::test]
    async fn test_handle_disconnect_reaches_owner() {
        let (client, mut server) = pair();
        server.handle().disconnect("bye");
        assert_matches!(
            server.next().await.unwrap(),
            Incoming::Control(Control::Disconnect(reason)) if reason == "bye"
        );
        drop(client);
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let (a, b) = duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client: ClientSide = Session::new(a, "client", SessionContext::default());
        client.set_events(tx);
        let _server: ServerSide = Session::new(b, "server", SessionContext::default());

        client.send(handshake()).unwrap();
        client.transition(SubProtocol::Login).unwrap();
        client.close("Finished");

        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::PacketSent {
                id: 0x00,
                name: "Handshake"
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::StateChanged {
                from: SubProtocol::Handshake,
                to: SubProtocol::Login
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Disconnected {
                reason: "Finished".to_owned()
            }
        );
    }
}
