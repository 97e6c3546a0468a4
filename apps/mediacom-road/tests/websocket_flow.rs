use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use mediacom_road::broker::RelayPolicy;
use mediacom_road::handlers::StatusResponse;
use mediacom_road::hub::HubHandle;
use mediacom_road::signaling::{ClientMessage, ConnectionId, JoinRoom, Role, ServerMessage};

struct TestClient {
    id: ConnectionId,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        Self::connect_at(addr, "/ws").await
    }

    async fn connect_at(addr: SocketAddr, path: &str) -> Self {
        let (ws, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
        let mut client = Self {
            id: ConnectionId::from(""),
            ws,
        };
        match client.recv().await {
            ServerMessage::Connected { id } => client.id = id,
            other => panic!("expected handshake, got {other:?}"),
        }
        client
    }

    async fn send(&mut self, message: &ClientMessage) {
        let text = serde_json::to_string(message).unwrap();
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    async fn join(&mut self, room: &str, name: &str) -> Vec<ConnectionId> {
        self.send(&ClientMessage::JoinRoom(JoinRoom::new(room, name, Role::Member)))
            .await;
        match self.recv().await {
            ServerMessage::RoomUsers(users) => users.into_iter().map(|u| u.id).collect(),
            other => panic!("expected room-users, got {other:?}"),
        }
    }

    async fn recv(&mut self) -> ServerMessage {
        loop {
            let frame = timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timed out waiting for event")
                .expect("socket closed")
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Round-trip a ping so every earlier event has been flushed, and
    /// return whatever arrived before the pong.
    async fn flush(&mut self) -> Vec<ServerMessage> {
        self.send(&ClientMessage::Ping).await;
        let mut seen = Vec::new();
        loop {
            match self.recv().await {
                ServerMessage::Pong => return seen,
                other => seen.push(other),
            }
        }
    }

    async fn close(mut self) {
        self.ws.close(None).await.unwrap();
    }
}

async fn start_server(policy: RelayPolicy) -> SocketAddr {
    let (hub, _task) = HubHandle::spawn(policy);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mediacom_road::serve(listener, hub));
    addr
}

async fn status(addr: SocketAddr) -> StatusResponse {
    reqwest::get(format!("http://{addr}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[test_timeout::tokio_timeout_test(30)]
async fn join_and_leave_scenario() {
    let addr = start_server(RelayPolicy::default()).await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;

    let roster = a.join("R", "A").await;
    assert_eq!(roster, vec![a.id.clone()]);
    let roster = b.join("R", "B").await;
    assert_eq!(roster, vec![a.id.clone(), b.id.clone()]);

    match a.recv().await {
        ServerMessage::UserJoined(profile) => {
            assert_eq!(profile.id, b.id);
            assert_eq!(profile.name, "B");
        }
        other => panic!("expected user-joined, got {other:?}"),
    }

    let a_id = a.id.clone();
    a.close().await;
    assert_eq!(b.recv().await, ServerMessage::UserLeft(a_id));

    let snapshot = status(addr).await;
    assert_eq!(snapshot.status, "ok");
    assert_eq!(snapshot.rooms.len(), 1);
    assert_eq!(snapshot.rooms[0].id, "R");
    assert_eq!(snapshot.rooms[0].user_count, 1);

    b.close().await;
    // The disconnect is processed asynchronously; poll until it lands.
    let mut rooms = status(addr).await.rooms;
    for _ in 0..50 {
        if rooms.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        rooms = status(addr).await.rooms;
    }
    assert!(rooms.is_empty());
}

#[test_timeout::tokio_timeout_test(30)]
async fn signal_is_relayed_verbatim() {
    let addr = start_server(RelayPolicy::default()).await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    a.join("R", "A").await;
    b.join("R", "B").await;
    a.flush().await;

    let offer = json!({"sdp": {"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 0.0.0.0\r\n"}});
    a.send(&ClientMessage::Signal {
        to: b.id.clone(),
        signal: offer.clone(),
    })
    .await;

    // Flushing the sender first guarantees the hub has routed the signal.
    assert!(a.flush().await.is_empty());
    assert_eq!(
        b.flush().await,
        vec![ServerMessage::Signal {
            from: a.id.clone(),
            signal: offer,
        }]
    );
}

#[test_timeout::tokio_timeout_test(30)]
async fn signal_to_unknown_peer_is_dropped() {
    let addr = start_server(RelayPolicy::default()).await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    a.join("R", "A").await;
    b.join("R", "B").await;
    a.flush().await;

    a.send(&ClientMessage::Signal {
        to: ConnectionId::from("not-connected-yet"),
        signal: json!({"sdp": "X"}),
    })
    .await;

    assert!(a.flush().await.is_empty());
    assert!(b.flush().await.is_empty());
}

#[test_timeout::tokio_timeout_test(30)]
async fn speaking_is_broadcast_to_others_only() {
    let addr = start_server(RelayPolicy::default()).await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    a.join("R", "A").await;
    b.join("R", "B").await;
    a.flush().await;

    a.send(&ClientMessage::SpeakingStatus { is_speaking: true })
        .await;
    assert!(a.flush().await.is_empty());
    assert_eq!(
        b.flush().await,
        vec![ServerMessage::UserSpeaking {
            id: a.id.clone(),
            is_speaking: true,
        }]
    );

    let mut late = TestClient::connect(addr).await;
    late.send(&ClientMessage::JoinRoom(JoinRoom::new("R", "Late", Role::Director)))
        .await;
    match late.recv().await {
        ServerMessage::RoomUsers(users) => {
            assert_eq!(users.len(), 3);
            assert!(users[0].is_speaking);
            assert!(!users[1].is_speaking);
            assert_eq!(users[2].role, Role::Director);
        }
        other => panic!("expected room-users, got {other:?}"),
    }
}

#[test_timeout::tokio_timeout_test(30)]
async fn malformed_frames_get_an_error_reply() {
    let addr = start_server(RelayPolicy::default()).await;
    let mut a = TestClient::connect(addr).await;

    a.ws.send(Message::Text("{\"event\":\"teleport\"}".into()))
        .await
        .unwrap();
    assert!(matches!(a.recv().await, ServerMessage::Error { .. }));

    // Binary frames carrying JSON are handled like text.
    let join = serde_json::to_vec(&ClientMessage::JoinRoom(JoinRoom::new(
        "bin",
        "A",
        Role::Member,
    )))
    .unwrap();
    a.ws.send(Message::Binary(join.into())).await.unwrap();
    assert!(matches!(a.recv().await, ServerMessage::RoomUsers(users) if users.len() == 1));

    a.ws.send(Message::Binary(vec![0xff, 0xfe, 0x00].into()))
        .await
        .unwrap();
    assert!(matches!(a.recv().await, ServerMessage::Error { .. }));

    // The connection survives both bad frames.
    assert!(a.flush().await.is_empty());
}

#[test_timeout::tokio_timeout_test(30)]
async fn root_path_accepts_websockets() {
    let addr = start_server(RelayPolicy::default()).await;
    let mut a = TestClient::connect_at(addr, "/").await;
    let mut b = TestClient::connect(addr).await;

    let roster = a.join("R", "A").await;
    assert_eq!(roster, vec![a.id.clone()]);
    let roster = b.join("R", "B").await;
    assert_eq!(roster, vec![a.id.clone(), b.id.clone()]);
    assert!(matches!(a.recv().await, ServerMessage::UserJoined(p) if p.id == b.id));
}

#[test_timeout::tokio_timeout_test(30)]
async fn same_room_policy_blocks_cross_room_signals() {
    let addr = start_server(RelayPolicy {
        same_room_only: true,
    })
    .await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    a.join("one", "A").await;
    b.join("two", "B").await;

    a.send(&ClientMessage::Signal {
        to: b.id.clone(),
        signal: json!({"candidate": "c"}),
    })
    .await;
    a.flush().await;
    assert!(b.flush().await.is_empty());
}
