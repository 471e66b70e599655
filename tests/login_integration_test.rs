mod common;

use assert_matches::assert_matches;
use common::*;
use lodestone::auth::{AuthError, GameProfile};
use lodestone::client::ClientSession;
use lodestone::config::ClientConfig;
use lodestone::net::crypt::generate_shared_secret;
use lodestone::net::session::{Incoming, SessionEvent, SessionHandle};
use lodestone::protocol::chat;
use lodestone::protocol::login::{
    EncryptionRequestPacket, EncryptionResponsePacket, LoginStartPacket,
};
use lodestone::protocol::packet::{ClientboundPacket, ServerboundPacket};
use lodestone::protocol::state::{HandshakeIntent, SubProtocol};
use lodestone::server::{Server, ServerConnection};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

fn notch() -> GameProfile {
    GameProfile::new(
        Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap(),
        "Notch".to_string(),
    )
}

async fn expect_login_disconnect(client: &mut RawClient) -> String {
    match next_packet(client).await {
        ClientboundPacket::LoginDisconnect(packet) => chat::plain_text(&packet.reason),
        other => panic!("Expected LoginDisconnect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_offline_login_reaches_game() {
    let server = Server::builder(offline_config()).build().unwrap();
    let (stream, server_task) = serve(&server);

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut client = ClientSession::new(stream, ClientConfig::login("localhost", 25565, "Steve"))
        .with_events(events_tx);
    let handle = client.handle();
    let client_task = tokio::spawn(async move {
        let reason = client.run().await;
        (client, reason)
    });

    wait_for_event(&mut events, |event| {
        matches!(event, SessionEvent::StateChanged { to: SubProtocol::Game, .. })
    })
    .await;
    handle.disconnect("bye");

    let (client, reason) = client_task.await.unwrap();
    assert_eq!(reason.unwrap(), "bye");
    assert_eq!(client.profile(), Some(&GameProfile::offline("Steve")));
    assert_eq!(
        client.history(),
        &[SubProtocol::Handshake, SubProtocol::Login, SubProtocol::Game]
    );
    assert_eq!(client.context().compression, Some(256));

    assert_eq!(server_task.await.unwrap().unwrap(), "Connection closed");
}

#[tokio::test]
async fn test_online_login_verifies_with_session_server() {
    let service = MockSessionService::knowing(notch());
    let server = Server::builder(online_config())
        .session_service(service.clone())
        .build()
        .unwrap();
    let (stream, server_task) = serve(&server);

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut client = ClientSession::new(stream, ClientConfig::login("localhost", 25565, "Notch"))
        .with_profile(notch())
        .with_session_service(service.clone())
        .with_events(events_tx);
    let handle = client.handle();
    let client_task = tokio::spawn(async move {
        let reason = client.run().await;
        (client, reason)
    });

    wait_for_event(&mut events, |event| {
        matches!(event, SessionEvent::StateChanged { to: SubProtocol::Game, .. })
    })
    .await;
    handle.disconnect("bye");

    let (client, reason) = client_task.await.unwrap();
    assert_eq!(reason.unwrap(), "bye");
    assert_eq!(client.profile(), Some(&notch()));

    let joined = service.joined.lock().clone();
    let verified = service.verified.lock().clone();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined, verified);

    assert_eq!(server_task.await.unwrap().unwrap(), "Connection closed");
}

#[tokio::test]
async fn test_online_login_packet_order() {
    let service = MockSessionService::knowing(notch());
    let server = Server::builder(online_config())
        .session_service(service.clone())
        .build()
        .unwrap();
    let (stream, server_task) = serve(&server);

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut client = ClientSession::new(stream, ClientConfig::login("localhost", 25565, "Notch"))
        .with_profile(notch())
        .with_session_service(service)
        .with_events(events_tx);
    let handle = client.handle();
    let client_task = tokio::spawn(async move { client.run().await });

    let mut seen = Vec::new();
    loop {
        let event = wait_for_event(&mut events, |_| true).await;
        let done = matches!(event, SessionEvent::StateChanged { to: SubProtocol::Game, .. });
        seen.push(event);
        if done {
            break;
        }
    }
    handle.disconnect("bye");

    assert_eq!(
        seen,
        vec![
            SessionEvent::PacketSent { id: 0x00, name: "Handshake" },
            SessionEvent::StateChanged {
                from: SubProtocol::Handshake,
                to: SubProtocol::Login
            },
            SessionEvent::PacketSent { id: 0x00, name: "LoginStart" },
            SessionEvent::PacketReceived { id: 0x01, name: "EncryptionRequest" },
            SessionEvent::PacketSent { id: 0x01, name: "EncryptionResponse" },
            SessionEvent::PacketReceived { id: 0x03, name: "LoginSetCompression" },
            SessionEvent::PacketReceived { id: 0x02, name: "LoginSuccess" },
            SessionEvent::StateChanged {
                from: SubProtocol::Login,
                to: SubProtocol::Game
            },
        ]
    );

    assert_eq!(client_task.await.unwrap().unwrap(), "bye");
    assert_eq!(server_task.await.unwrap().unwrap(), "Connection closed");
}

#[tokio::test]
async fn test_unknown_player_is_rejected() {
    let service = MockSessionService::knowing(notch());
    let server = Server::builder(online_config())
        .session_service(service.clone())
        .build()
        .unwrap();
    let (stream, server_task) = serve(&server);

    let mut client = ClientSession::new(stream, ClientConfig::login("localhost", 25565, "jeb_"))
        .with_session_service(service);

    assert_eq!(client.run().await.unwrap(), "Failed to verify username.");
    assert_eq!(server_task.await.unwrap().unwrap(), "Failed to verify username.");
}

#[tokio::test]
async fn test_client_reports_join_failures() {
    let cases = [
        (
            AuthError::ServiceUnavailable,
            "Login failed: Authentication service unavailable.",
        ),
        (
            AuthError::InvalidCredentials,
            "Login failed: Invalid login session.",
        ),
        (
            AuthError::Request("Forbidden".to_string()),
            "Login failed: Authentication error: Forbidden",
        ),
    ];

    for (error, expected) in cases {
        let server = Server::builder(online_config()).build().unwrap();
        let (stream, server_task) = serve(&server);
        let mut client =
            ClientSession::new(stream, ClientConfig::login("localhost", 25565, "Steve"))
                .with_session_service(MockSessionService::failing_join(error));

        assert_eq!(client.run().await.unwrap(), expected);
        drop(client);
        assert_eq!(server_task.await.unwrap().unwrap(), "Connection closed");
    }
}

/// Starts a login on a raw client and returns the server's encryption request.
async fn start_online_login(client: &mut RawClient) -> EncryptionRequestPacket {
    client.send(handshake(340, HandshakeIntent::Login)).unwrap();
    client.transition(SubProtocol::Login).unwrap();
    client
        .send(ServerboundPacket::LoginStart(LoginStartPacket {
            username: "Steve".to_string(),
        }))
        .unwrap();

    match next_packet(client).await {
        ClientboundPacket::EncryptionRequest(request) => request,
        other => panic!("Expected EncryptionRequest, got {:?}", other),
    }
}

fn spawn_connection(
    mut connection: ServerConnection,
) -> tokio::task::JoinHandle<(ServerConnection, lodestone::Result<String>)> {
    tokio::spawn(async move {
        let reason = connection.run().await;
        (connection, reason)
    })
}

#[tokio::test]
async fn test_wrong_verify_token_is_invalid_nonce() {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let server = Server::builder(online_config())
        .events(events_tx)
        .build()
        .unwrap();
    let (stream, server_side) = tokio::io::duplex(64 * 1024);
    let server_task = spawn_connection(server.accept(server_side, "test-client"));
    let mut client = raw_client(stream);

    let request = start_online_login(&mut client).await;
    assert_eq!(request.server_id, "");
    assert_eq!(request.verify_token.len(), 4);

    let wrong_token: Vec<u8> = request.verify_token.iter().map(|b| !b).collect();
    let response =
        EncryptionResponsePacket::new(&generate_shared_secret(), &request.public_key, &wrong_token)
            .unwrap();
    client
        .send(ServerboundPacket::EncryptionResponse(response))
        .unwrap();

    assert_eq!(expect_login_disconnect(&mut client).await, "Invalid nonce!");
    assert_matches!(client.next().await.unwrap(), Incoming::Closed);

    let (connection, reason) = server_task.await.unwrap();
    assert_eq!(reason.unwrap(), "Invalid nonce!");
    assert_eq!(
        connection.history(),
        &[SubProtocol::Handshake, SubProtocol::Login]
    );
    assert_eq!(connection.sub_protocol(), SubProtocol::Login);
    assert_eq!(connection.profile(), None);

    let mut sent = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_ne!(
            event,
            SessionEvent::StateChanged {
                from: SubProtocol::Login,
                to: SubProtocol::Game
            }
        );
        if let SessionEvent::PacketSent { name, .. } = event {
            sent.push(name);
        }
    }
    assert_eq!(sent, vec!["EncryptionRequest", "LoginDisconnect"]);
}

#[tokio::test]
async fn test_repeated_encryption_response_is_rejected() {
    let server = Server::builder(online_config())
        .session_service(MockSessionService::stalling())
        .build()
        .unwrap();
    let (stream, server_task) = serve(&server);
    let mut client = raw_client(stream);

    let request = start_online_login(&mut client).await;
    let secret = generate_shared_secret();
    for _ in 0..2 {
        let response =
            EncryptionResponsePacket::new(&secret, &request.public_key, &request.verify_token)
                .unwrap();
        client
            .send(ServerboundPacket::EncryptionResponse(response))
            .unwrap();
        if !client.is_encrypted() {
            client.enable_encryption(&secret).unwrap();
        }
    }

    assert_eq!(
        expect_login_disconnect(&mut client).await,
        "Unexpected encryption response."
    );
    assert_eq!(
        server_task.await.unwrap().unwrap(),
        "Unexpected encryption response."
    );
}

#[tokio::test]
async fn test_zero_keep_alive_interval_is_rejected() {
    let config = lodestone::config::ServerConfig {
        keep_alive_interval_ms: 0,
        ..offline_config()
    };
    assert_matches!(
        Server::builder(config).build(),
        Err(lodestone::LodestoneError::Config(_))
    );
}

#[tokio::test]
async fn test_protocol_version_mismatch() {
    let cases = [
        (316, "Outdated client! Please use 1.12.2."),
        (341, "Outdated server! I'm still on 1.12.2."),
    ];

    for (version, expected) in cases {
        let server = Server::builder(offline_config()).build().unwrap();
        let (stream, server_task) = serve(&server);
        let mut client = raw_client(stream);

        client.send(handshake(version, HandshakeIntent::Login)).unwrap();
        client.transition(SubProtocol::Login).unwrap();

        assert_eq!(expect_login_disconnect(&mut client).await, expected);
        assert_matches!(client.next().await.unwrap(), Incoming::Closed);
        assert_eq!(server_task.await.unwrap().unwrap(), expected);
    }
}

#[tokio::test]
async fn test_keep_alive_is_echoed() {
    let config = lodestone::config::ServerConfig {
        keep_alive_interval_ms: 50,
        ..offline_config()
    };
    let logged_in: Arc<Mutex<Option<GameProfile>>> = Arc::new(Mutex::new(None));
    let slot = logged_in.clone();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let server = Server::builder(config)
        .events(events_tx)
        .login_handler(
            move |_session: &SessionHandle<ClientboundPacket>, profile: &GameProfile| {
                *slot.lock() = Some(profile.clone());
            },
        )
        .build()
        .unwrap();
    let (stream, server_task) = serve(&server);

    let mut client = ClientSession::new(stream, ClientConfig::login("localhost", 25565, "Steve"));
    let handle = client.handle();
    let client_task = tokio::spawn(async move { client.run().await });

    wait_for_event(&mut events, |event| {
        matches!(event, SessionEvent::PacketSent { name: "ServerKeepAlive", .. })
    })
    .await;
    let answer = wait_for_event(&mut events, |event| {
        matches!(event, SessionEvent::PacketReceived { name: "ClientKeepAlive", .. })
    })
    .await;
    assert_eq!(
        answer,
        SessionEvent::PacketReceived {
            id: 0x0B,
            name: "ClientKeepAlive"
        }
    );
    assert_eq!(*logged_in.lock(), Some(GameProfile::offline("Steve")));

    handle.disconnect("bye");
    assert_eq!(client_task.await.unwrap().unwrap(), "bye");
    assert_eq!(server_task.await.unwrap().unwrap(), "Connection closed");
}
