//! Client registry and outbound message delivery for the arena server
//!
//! This module tracks every connected session, including:
//! - The outbound queue that feeds the session's socket writer
//! - The running flag cleared when a session ends or falls behind
//! - The task handles the reaper awaits before forgetting a client
//!
//! Entries are added only by the connection listener and removed only by the
//! reaper. Everything else uses the registry to address clients.

use log::{debug, error, info, warn};
use shared::protocol::ServerMessage;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Frames a session may have queued before it is treated as stalled
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Creates the bounded queue between the registry and a session's writer
pub fn outbound_channel() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    mpsc::channel(OUTBOUND_QUEUE_CAPACITY)
}

/// Registry entry for one connected session
///
/// Each client holds:
/// - A sender for already framed messages, drained by the session's writer task
/// - A stop signal the server uses to force the session's read loop to exit
/// - The session and writer task handles once they have been spawned
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier, equal to the player id
    pub id: u32,
    /// Cleared when the socket closes or errors, or the outbound queue fills
    running: AtomicBool,
    outbound: Option<mpsc::Sender<String>>,
    stop: Arc<Notify>,
    session: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Client {
    /// Creates a running client that writes through `outbound`
    pub fn new(id: u32, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id,
            running: AtomicBool::new(true),
            outbound: Some(outbound),
            stop: Arc::new(Notify::new()),
            session: None,
            writer: None,
        }
    }

    /// Queues an already framed message
    ///
    /// Never blocks, so it is safe to call while world locks are held. Returns
    /// false if the session's writer is gone or has fallen too far behind. A
    /// full queue stops the client so the reaper tears it down.
    pub fn send_frame(&self, frame: &str) -> bool {
        let Some(outbound) = &self.outbound else {
            return false;
        };
        match outbound.try_send(frame.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if self.running.swap(false, Ordering::Relaxed) {
                    warn!("Client {} is not keeping up, dropping it", self.id);
                    self.signal_stop();
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signals the session to stop reading
    pub fn signal_stop(&self) {
        self.stop.notify_one();
    }
}

/// Task handles taken from a client that is being torn down
///
/// The outbound sender has already been dropped, so the writer finishes once
/// it has flushed whatever was queued before retirement.
#[derive(Debug)]
pub struct RetiredSession {
    pub id: u32,
    pub session: Option<JoinHandle<()>>,
    pub writer: Option<JoinHandle<()>>,
}

/// Registry of all connected clients
///
/// The ClientManager owns the only handle to each session's outbound queue,
/// so every message a client receives goes through [`ClientManager::send_to`]
/// or [`ClientManager::broadcast`]. Sends never wait on a socket.
#[derive(Debug, Default)]
pub struct ClientManager {
    clients: BTreeMap<u32, Client>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new running client
    ///
    /// Returns the stop signal the session task should listen on. An existing
    /// entry under the same id is replaced; callers pick ids that are free.
    pub fn register(&mut self, id: u32, outbound: mpsc::Sender<String>) -> Arc<Notify> {
        let client = Client::new(id, outbound);
        let stop = Arc::clone(&client.stop);
        info!("Client {} registered", id);
        self.clients.insert(id, client);
        stop
    }

    /// Stores the spawned task handles for a registered client
    pub fn attach_tasks(&mut self, id: u32, session: JoinHandle<()>, writer: JoinHandle<()>) {
        match self.clients.get_mut(&id) {
            Some(client) => {
                client.session = Some(session);
                client.writer = Some(writer);
            }
            None => {
                // already torn down; nothing will await these
                session.abort();
                writer.abort();
            }
        }
    }

    /// Marks a client as no longer running
    ///
    /// Called by the session on exit. Unknown ids are ignored.
    pub fn mark_stopped(&mut self, id: u32) {
        if let Some(client) = self.clients.get(&id) {
            client.running.store(false, Ordering::Relaxed);
        }
    }

    pub fn is_running(&self, id: u32) -> bool {
        self.clients.get(&id).map_or(false, Client::is_running)
    }

    /// Ids of clients whose sessions have ended but are still registered
    pub fn stopped_ids(&self) -> Vec<u32> {
        self.clients
            .values()
            .filter(|c| !c.is_running())
            .map(|c| c.id)
            .collect()
    }

    /// Takes the task handles out of a client and drops its outbound sender
    ///
    /// The entry itself stays registered so the id is not handed out again
    /// until [`ClientManager::remove`] is called. Retiring twice yields empty
    /// handles.
    pub fn retire(&mut self, id: u32) -> Option<RetiredSession> {
        let client = self.clients.get_mut(&id)?;
        client.running.store(false, Ordering::Relaxed);
        client.outbound = None;
        client.signal_stop();
        Some(RetiredSession {
            id,
            session: client.session.take(),
            writer: client.writer.take(),
        })
    }

    /// Removes a client from the registry
    ///
    /// Returns true if the client was found and removed, false if it was
    /// already gone.
    pub fn remove(&mut self, id: u32) -> bool {
        if self.clients.remove(&id).is_some() {
            info!("Client {} removed", id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn ids(&self) -> HashSet<u32> {
        self.clients.keys().copied().collect()
    }

    /// Sends a message to a single client
    pub fn send_to(&self, id: u32, message: &ServerMessage) {
        let Some(client) = self.clients.get(&id) else {
            debug!("Dropping {:?} for unknown client {}", message.kind(), id);
            return;
        };
        match message.to_frame() {
            Ok(frame) => {
                if !client.send_frame(&frame) {
                    debug!("Client {} is no longer accepting messages", id);
                }
            }
            Err(e) => error!("Failed to encode {:?}: {}", message.kind(), e),
        }
    }

    /// Sends a message to every client except `exclude`
    ///
    /// The message is encoded once and queued on each session in turn.
    pub fn broadcast(&self, message: &ServerMessage, exclude: Option<u32>) {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {:?}: {}", message.kind(), e);
                return;
            }
        };

        for client in self.clients.values() {
            if Some(client.id) == exclude {
                continue;
            }
            if !client.send_frame(&frame) {
                debug!("Client {} is no longer accepting messages", client.id);
            }
        }
    }

    /// Returns the number of registered clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
