//! Server network layer: TCP acceptor, background tasks and the tick loop

use crate::client_manager::outbound_channel;
use crate::config::ServerConfig;
use crate::state::ServerState;
use crate::{admin, events, reaper, router, session};
use log::{debug, error, info, warn};
use shared::protocol::ServerMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Longest simulated step for a single tick, in seconds.
const MAX_TICK_DELTA: f32 = 0.1;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    #[error("sessions did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Cloneable trigger for the server-wide shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Main server coordinating the listener, sessions and world simulation
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: ShutdownHandle,
    // keeps the channel open while no task is subscribed
    _shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        info!("Server listening on {}", address);

        let (shutdown, shutdown_rx) = ShutdownHandle::new();
        Ok(Server {
            listener,
            state: Arc::new(ServerState::new(config)),
            shutdown,
            _shutdown_rx: shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Runs until shutdown is triggered, then stops every session.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Server {
            listener,
            state,
            shutdown,
            _shutdown_rx,
        } = self;
        let config = state.config().clone();

        let acceptor = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&state),
            shutdown.subscribe(),
        ));

        let mut background: Vec<JoinHandle<()>> = Vec::new();
        if config.random_events {
            background.push(tokio::spawn(events::run_scheduler(
                Arc::clone(&state),
                shutdown.subscribe(),
            )));
        }
        if config.admin_console {
            background.push(tokio::spawn(admin::run_console(
                Arc::clone(&state),
                shutdown.clone(),
                shutdown.subscribe(),
            )));
        }

        let mut shutdown_rx = shutdown.subscribe();
        let mut ticker = interval(config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => continue,
            }

            let now = Instant::now();
            let mut dt = now.duration_since(last_tick).as_secs_f32();
            last_tick = now;
            if dt > MAX_TICK_DELTA {
                debug!("Tick took {:.3}s, capping to {:.3}s", dt, MAX_TICK_DELTA);
                dt = MAX_TICK_DELTA;
            }

            tick(&state, now, dt).await;
        }

        info!("Server shutting down");
        let drain = async {
            if let Err(e) = acceptor.await {
                error!("Acceptor task failed: {}", e);
            }
            reaper::shutdown_all(&state).await
        };
        let result = match tokio::time::timeout(config.shutdown_timeout, drain).await {
            Ok(stopped) => {
                info!("Stopped {} sessions", stopped);
                Ok(())
            }
            Err(_) => Err(ServerError::ShutdownTimeout(config.shutdown_timeout).into()),
        };

        for task in background {
            task.abort();
        }
        result
    }
}

/// One server tick: event timeouts, reaping, queued messages, then bullets.
pub async fn tick(state: &ServerState, now: Instant, dt: f32) {
    {
        let mut world = state.lock_all().await;
        events::check_timeouts(&mut world, state.config(), now);
    }

    let reaped = reaper::reap(state).await;
    if !reaped.is_empty() {
        debug!("Reaped clients {:?}", reaped);
    }

    router::process_inbox(state).await;

    let mut world = state.lock_all().await;
    for bullet_id in world.game.step_bullets(dt) {
        world
            .clients
            .broadcast(&ServerMessage::BulletDespawn { bullet_id }, None);
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.changed() => continue,
        };

        match accepted {
            Ok((stream, addr)) => {
                admit(&state, stream, addr).await;
            }
            Err(e) => {
                warn!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
    debug!("Acceptor stopped");
}

/// Registers a new connection, queues its welcome and spawns its session and
/// writer tasks.
///
/// The welcome is queued under the same locks that add the player, so the
/// snapshot and id are always the first frames the client receives.
async fn admit(state: &Arc<ServerState>, stream: TcpStream, addr: SocketAddr) -> u32 {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }
    let (reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = outbound_channel();

    let mut world = state.lock_all().await;
    let id = world.free_id();
    world.game.add_player(id);
    let stop = world.clients.register(id, outbound_tx);
    session::welcome(&world, id);

    let writer_task = tokio::spawn(session::write_loop(id, writer, outbound_rx));
    let session_task = tokio::spawn(session::run(id, reader, Arc::clone(state), stop));
    world.clients.attach_tasks(id, session_task, writer_task);
    info!("Client {} joined from {}", id, addr);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameState;
    use shared::framing::FrameBuffer;
    use shared::protocol::ClientMessage;
    use tokio::io::AsyncReadExt;

    /// Reads from `stream` until `count` messages have arrived
    async fn read_messages(stream: &mut TcpStream, count: usize) -> Vec<ServerMessage> {
        let mut frames = FrameBuffer::new();
        let mut messages = Vec::new();
        let mut buf = [0u8; 1024];
        while messages.len() < count {
            let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
                .await
                .expect("timed out reading from the server")
                .unwrap();
            assert_ne!(n, 0, "server closed the connection");
            for frame in frames.push(&buf[..n]).unwrap() {
                messages.push(ServerMessage::decode(&frame).unwrap());
            }
        }
        messages
    }

    #[test]
    fn test_shutdown_handle_reaches_subscribers() {
        let (handle, rx) = ShutdownHandle::new();
        let other = handle.subscribe();
        handle.clone().trigger();
        assert!(*rx.borrow());
        assert!(*other.borrow());
    }

    #[tokio::test]
    async fn test_bind_reports_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = ServerConfig::local_test();
        config.port = taken.local_addr().unwrap().port();
        let expected = config.address();
        match Server::bind(config).await {
            Err(ServerError::Bind { address, .. }) => assert_eq!(address, expected),
            other => panic!("expected a bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_welcome_precedes_updates_from_the_next_tick() {
        let state = Arc::new(ServerState::with_world(
            ServerConfig::local_test(),
            GameState::new(),
        ));
        let _rx = {
            let mut world = state.lock_all().await;
            world.game.add_player(0);
            let (tx, rx) = outbound_channel();
            world.clients.register(0, tx);
            rx
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        let id = admit(&state, stream, peer).await;
        assert_eq!(id, 1);

        // an update routed before the newcomer has read anything
        state
            .push_inbox(
                0,
                vec![ClientMessage::Move { x: 5, y: 6, rot: 0.0 }
                    .encode()
                    .unwrap()],
            )
            .await;
        tick(&state, Instant::now(), 0.0).await;

        let messages = read_messages(&mut client, 3).await;
        match &messages[0] {
            ServerMessage::GameState { players } => assert_eq!(players.len(), 2),
            other => panic!("expected GAME_STATE first, got {other:?}"),
        }
        assert_eq!(messages[1], ServerMessage::ClientId { id: 1 });
        assert_eq!(
            messages[2],
            ServerMessage::PlayerMove {
                id: 0,
                x: 5,
                y: 6,
                rot: 0.0
            }
        );
    }

    #[tokio::test]
    async fn test_tick_despawns_escaped_bullets() {
        let state = ServerState::with_world(ServerConfig::local_test(), GameState::new());
        let mut rx = {
            let mut world = state.lock_all().await;
            world.game.add_player(0);
            let (tx, rx) = outbound_channel();
            world.clients.register(0, tx);
            rx
        };
        state
            .push_inbox(
                0,
                vec![ClientMessage::BulletShot { x: 0, y: 0, rot: 0.0 }
                    .encode()
                    .unwrap()],
            )
            .await;

        tick(&state, Instant::now(), 0.0).await;
        let bullet_id = match ServerMessage::decode(rx.try_recv().unwrap().trim_end_matches(';')) {
            Ok(ServerMessage::BulletShot { bullet_id, .. }) => bullet_id,
            other => panic!("expected BULLET_SHOT, got {other:?}"),
        };

        // long enough to cross the whole playing area
        for _ in 0..30 {
            tick(&state, Instant::now(), MAX_TICK_DELTA).await;
        }
        let frame = rx.try_recv().unwrap();
        assert_eq!(
            ServerMessage::decode(frame.trim_end_matches(';')).unwrap(),
            ServerMessage::BulletDespawn { bullet_id }
        );
        assert!(state.lock_all().await.game.bullets().is_empty());
    }
}
