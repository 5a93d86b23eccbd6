//! Integration tests for the arena server
//!
//! These tests start a real server on an ephemeral port and drive it over TCP
//! the way a game client would.

use server::config::ServerConfig;
use server::events;
use server::network::{Server, ShutdownHandle};
use server::state::ServerState;
use shared::framing::FrameBuffer;
use shared::protocol::{ClientMessage, PlayerInfo, ServerMessage};
use shared::{Color, EventKind};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

type RunResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: ShutdownHandle,
    handle: JoinHandle<RunResult>,
}

async fn start_server() -> TestServer {
    let mut config = ServerConfig::local_test();
    config.tick = Duration::from_millis(5);
    let server = Server::bind(config).await.unwrap();

    TestServer {
        addr: server.local_addr().unwrap(),
        state: server.state(),
        shutdown: server.shutdown_handle(),
        handle: tokio::spawn(server.run()),
    }
}

/// Minimal TCP client speaking the framed protocol
struct TestClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    frames: FrameBuffer,
    queue: VecDeque<ServerMessage>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            reader,
            writer,
            frames: FrameBuffer::new(),
            queue: VecDeque::new(),
        }
    }

    /// Connects and consumes the snapshot and id that open every session
    async fn join(addr: SocketAddr) -> (Self, u32, Vec<PlayerInfo>) {
        let mut client = Self::connect(addr).await;
        let players = match client.recv().await {
            ServerMessage::GameState { players } => players,
            other => panic!("expected GAME_STATE first, got {other:?}"),
        };
        let id = match client.recv().await {
            ServerMessage::ClientId { id } => id,
            other => panic!("expected CLIENT_ID second, got {other:?}"),
        };
        (client, id, players)
    }

    async fn send(&mut self, message: ClientMessage) {
        self.send_raw(&message.to_frame().unwrap()).await;
    }

    async fn send_raw(&mut self, bytes: &str) {
        self.writer.write_all(bytes.as_bytes()).await.unwrap();
    }

    /// Next message, or `None` once the server closes the socket
    async fn next(&mut self) -> Option<ServerMessage> {
        loop {
            if let Some(message) = self.queue.pop_front() {
                return Some(message);
            }
            let mut buf = [0u8; 4096];
            let n = self.reader.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                return None;
            }
            for frame in self.frames.push(&buf[..n]).unwrap() {
                self.queue.push_back(ServerMessage::decode(&frame).unwrap());
            }
        }
    }

    async fn recv(&mut self) -> ServerMessage {
        timeout(RECV_TIMEOUT, self.next())
            .await
            .expect("timed out waiting for a message")
            .expect("server closed the connection")
    }

    /// Skips messages until one matches
    async fn recv_until(&mut self, mut matches: impl FnMut(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let message = self.recv().await;
            if matches(&message) {
                return message;
            }
        }
    }

    async fn expect_silence(&mut self) {
        if let Ok(message) = timeout(QUIET_PERIOD, self.next()).await {
            panic!("expected silence, got {message:?}");
        }
    }

    async fn expect_closed(&mut self) {
        let closed = timeout(RECV_TIMEOUT, async {
            while self.next().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "server kept the connection open");
    }
}

fn player_new_id(message: &ServerMessage) -> Option<u32> {
    match message {
        ServerMessage::PlayerNew(info) => Some(info.id),
        _ => None,
    }
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Tests that ids are the smallest free value and are reused after a leave
    #[tokio::test]
    async fn id_reuse_after_disconnect() {
        let server = start_server().await;

        let (a, id_a, players) = TestClient::join(server.addr).await;
        assert_eq!(id_a, 0);
        assert_eq!(players.len(), 1);

        let (mut b, id_b, players) = TestClient::join(server.addr).await;
        assert_eq!(id_b, 1);
        assert_eq!(players.len(), 2);

        drop(a);
        assert_eq!(
            b.recv_until(|m| matches!(m, ServerMessage::PlayerLeft { .. })).await,
            ServerMessage::PlayerLeft { id: 0 }
        );

        let (_c, id_c, players) = TestClient::join(server.addr).await;
        assert_eq!(id_c, 0);
        let ids: Vec<u32> = players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1]);

        server.shutdown.trigger();
    }

    /// Tests that existing players hear about a newcomer exactly once
    #[tokio::test]
    async fn newcomer_is_announced_to_others() {
        let server = start_server().await;
        let (mut a, _, _) = TestClient::join(server.addr).await;
        let (mut b, id_b, _) = TestClient::join(server.addr).await;

        match a.recv().await {
            ServerMessage::PlayerNew(info) => {
                assert_eq!(info.id, id_b);
                assert_eq!((info.x, info.y), (100, 100));
                assert_eq!(info.username, "unset");
                assert_eq!(info.color, Color::RED);
            }
            other => panic!("expected PLAYER_NEW, got {other:?}"),
        }
        a.expect_silence().await;
        b.expect_silence().await;

        server.shutdown.trigger();
    }

    /// Tests that the snapshot a late joiner receives reflects earlier updates
    #[tokio::test]
    async fn snapshot_is_complete() {
        let server = start_server().await;
        let (mut a, id_a, _) = TestClient::join(server.addr).await;
        let (mut b, id_b, _) = TestClient::join(server.addr).await;
        a.recv_until(|m| player_new_id(m) == Some(id_b)).await;

        b.send(ClientMessage::PlayerUpdate {
            username: "bob".into(),
            color: Color::YELLOW,
        })
        .await;
        b.send(ClientMessage::Move {
            x: 300,
            y: 400,
            rot: 90.0,
        })
        .await;
        a.recv_until(|m| matches!(m, ServerMessage::PlayerMove { .. }))
            .await;

        let (_c, id_c, players) = TestClient::join(server.addr).await;
        assert_eq!(id_c, 2);
        assert_eq!(players.len(), 3);

        let bob = players.iter().find(|p| p.id == id_b).unwrap();
        assert_eq!(bob.username, "bob");
        assert_eq!(bob.color, Color::YELLOW);
        assert_eq!((bob.x, bob.y), (300, 400));
        assert!(players.iter().any(|p| p.id == id_a));

        server.shutdown.trigger();
    }

    /// Tests that a late joiner is told about events already running
    #[tokio::test]
    async fn late_joiner_sees_running_darkness() {
        let server = start_server().await;
        {
            let mut world = server.state.lock_all().await;
            let config = server.state.config().clone();
            assert!(events::summon(
                &mut world,
                EventKind::Darkness,
                &config,
                Instant::now(),
                &mut rand::thread_rng()
            ));
        }

        let (mut a, _, _) = TestClient::join(server.addr).await;
        assert_eq!(
            a.recv().await,
            ServerMessage::EventSummon {
                event: EventKind::Darkness
            }
        );

        server.shutdown.trigger();
    }

    /// Tests that shutdown closes every session and the server exits cleanly
    #[tokio::test]
    async fn graceful_shutdown_closes_sessions() {
        let server = start_server().await;
        let (mut a, _, _) = TestClient::join(server.addr).await;
        let (mut b, _, _) = TestClient::join(server.addr).await;

        server.shutdown.trigger();
        let result = timeout(Duration::from_secs(5), server.handle)
            .await
            .expect("server did not stop")
            .unwrap();
        tokio_test::assert_ok!(result);

        a.expect_closed().await;
        b.expect_closed().await;
    }
}

/// MESSAGE RELAY TESTS
mod relay_tests {
    use super::*;

    /// Tests that a move reaches every other client and is not echoed
    #[tokio::test]
    async fn move_is_relayed_without_echo() {
        let server = start_server().await;
        let (mut a, id_a, _) = TestClient::join(server.addr).await;
        let (mut b, id_b, _) = TestClient::join(server.addr).await;
        let (mut c, id_c, _) = TestClient::join(server.addr).await;
        a.recv_until(|m| player_new_id(m) == Some(id_c)).await;
        b.recv_until(|m| player_new_id(m) == Some(id_c)).await;
        assert_ne!(id_a, id_b);

        a.send(ClientMessage::Move {
            x: 150,
            y: 200,
            rot: 450.0,
        })
        .await;

        let expected = ServerMessage::PlayerMove {
            id: id_a,
            x: 150,
            y: 200,
            rot: 90.0,
        };
        assert_eq!(b.recv().await, expected);
        assert_eq!(c.recv().await, expected);
        a.expect_silence().await;

        server.shutdown.trigger();
    }

    /// Tests that a shot goes to everyone, shooter included, and later despawns
    #[tokio::test]
    async fn shot_is_broadcast_to_all() {
        let server = start_server().await;
        let (mut a, id_a, _) = TestClient::join(server.addr).await;
        let (mut b, id_b, _) = TestClient::join(server.addr).await;
        a.recv_until(|m| player_new_id(m) == Some(id_b)).await;

        a.send(ClientMessage::BulletShot {
            x: 0,
            y: 0,
            rot: 0.0,
        })
        .await;

        let shot_a = a.recv().await;
        let shot_b = b.recv().await;
        assert_eq!(shot_a, shot_b);
        let bullet_id = match shot_a {
            ServerMessage::BulletShot {
                player_id,
                bullet_id,
                ..
            } => {
                assert_eq!(player_id, id_a);
                bullet_id
            }
            other => panic!("expected BULLET_SHOT, got {other:?}"),
        };

        for client in [&mut a, &mut b] {
            assert_eq!(
                client.recv().await,
                ServerMessage::BulletDespawn { bullet_id }
            );
        }

        server.shutdown.trigger();
    }

    /// Tests that an undecodable message is skipped without ending the session
    #[tokio::test]
    async fn garbage_does_not_end_session() {
        let server = start_server().await;
        let (mut a, id_a, _) = TestClient::join(server.addr).await;
        let (mut b, id_b, _) = TestClient::join(server.addr).await;
        a.recv_until(|m| player_new_id(m) == Some(id_b)).await;

        a.send_raw("not a message;99\n{};").await;
        a.send(ClientMessage::Move {
            x: 1,
            y: 2,
            rot: 3.0,
        })
        .await;

        assert!(matches!(
            b.recv().await,
            ServerMessage::PlayerMove { id, .. } if id == id_a
        ));

        server.shutdown.trigger();
    }

    /// Tests that a client flooding bytes without a terminator is dropped
    #[tokio::test]
    async fn oversized_frame_ends_session() {
        let server = start_server().await;
        let (mut a, id_a, _) = TestClient::join(server.addr).await;
        let (mut b, id_b, _) = TestClient::join(server.addr).await;
        a.recv_until(|m| player_new_id(m) == Some(id_b)).await;

        let flood = "x".repeat(shared::framing::MAX_PENDING_BYTES + 1);
        a.send_raw(&flood).await;

        assert_eq!(
            b.recv_until(|m| matches!(m, ServerMessage::PlayerLeft { .. })).await,
            ServerMessage::PlayerLeft { id: id_a }
        );
        a.expect_closed().await;

        server.shutdown.trigger();
    }
}
