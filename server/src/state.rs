//! Shared server state and the lock order that protects it.
//!
//! Five structures are guarded independently. Whenever more than one is
//! needed they are acquired together through [`ServerState::lock_all`], which
//! always locks in this order:
//!
//! 1. world (`GameState`)
//! 2. assassin state
//! 3. pending assassins
//! 4. darkness and acid rain flags
//! 5. client registry
//!
//! The only other entry point is [`ServerState::lock_clients`], which takes
//! the last lock alone. No guard is ever held across a socket write; sends go
//! through the registry's non-blocking queues. The inbox has its own lock and
//! is never taken while a world guard is held.

use crate::assassin::{AssassinState, DesignateError, PendingAssassins};
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::events::EventFlags;
use crate::game::GameState;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};

pub struct ServerState {
    config: ServerConfig,
    game: Mutex<GameState>,
    assassin: Mutex<AssassinState>,
    pending: Mutex<PendingAssassins>,
    events: Mutex<EventFlags>,
    clients: Mutex<ClientManager>,
    inbox: Mutex<Vec<(u32, String)>>,
}

/// All five world locks, held together.
pub struct WorldGuard<'a> {
    pub game: MutexGuard<'a, GameState>,
    pub assassin: MutexGuard<'a, AssassinState>,
    pub pending: MutexGuard<'a, PendingAssassins>,
    pub events: MutexGuard<'a, EventFlags>,
    pub clients: MutexGuard<'a, ClientManager>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_world(config, GameState::with_default_map())
    }

    pub fn with_world(config: ServerConfig, game: GameState) -> Self {
        Self {
            config,
            game: Mutex::new(game),
            assassin: Mutex::new(AssassinState::new()),
            pending: Mutex::new(PendingAssassins::new()),
            events: Mutex::new(EventFlags::new()),
            clients: Mutex::new(ClientManager::new()),
            inbox: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn lock_all(&self) -> WorldGuard<'_> {
        let game = self.game.lock().await;
        let assassin = self.assassin.lock().await;
        let pending = self.pending.lock().await;
        let events = self.events.lock().await;
        let clients = self.clients.lock().await;
        WorldGuard {
            game,
            assassin,
            pending,
            events,
            clients,
        }
    }

    /// Locks the client registry alone. It is last in the order, so this never
    /// waits on a caller that holds it while acquiring anything else.
    pub async fn lock_clients(&self) -> MutexGuard<'_, ClientManager> {
        self.clients.lock().await
    }

    pub async fn push_inbox(&self, sender: u32, frames: Vec<String>) {
        if frames.is_empty() {
            return;
        }
        let mut inbox = self.inbox.lock().await;
        inbox.extend(frames.into_iter().map(|frame| (sender, frame)));
    }

    /// Takes the whole inbox, leaving an empty one for new arrivals.
    pub async fn take_inbox(&self) -> Vec<(u32, String)> {
        std::mem::take(&mut *self.inbox.lock().await)
    }
}

impl WorldGuard<'_> {
    /// Smallest id held by neither a player nor a registered session.
    pub fn free_id(&self) -> u32 {
        self.game.smallest_free_id(&self.clients.ids())
    }

    /// Removes a player and everything that refers to them. Safe to call for
    /// an id that is already gone.
    pub fn drop_player(&mut self, id: u32) -> bool {
        self.assassin
            .release_assassin(id, &mut self.pending, &mut self.game, &self.clients);
        let removed = self.game.remove_player(id).is_some();
        self.pending.remove(id);
        self.assassin
            .replace_target(id, &self.game, &self.clients, &mut rand::thread_rng());
        removed
    }

    pub fn designate_assassin(&mut self, id: u32, now: Instant) -> Result<(), DesignateError> {
        self.assassin.designate(
            id,
            &mut self.game,
            &self.clients,
            now,
            &mut rand::thread_rng(),
        )
    }
}
