//! Global world events and the random scheduler that summons them.

use crate::config::{ServerConfig, MIN_EVENT_WINDOW};
use crate::state::{ServerState, WorldGuard};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shared::protocol::ServerMessage;
use shared::EventKind;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Random rolls landing this close to the start of a window are skipped.
pub const SCHEDULER_DEAD_ZONE: Duration = Duration::from_millis(70);

/// Darkness and acid rain, each with the instant it began.
#[derive(Debug, Default)]
pub struct EventFlags {
    darkness_since: Option<Instant>,
    acid_rain_since: Option<Instant>,
}

impl EventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn darkness_active(&self) -> bool {
        self.darkness_since.is_some()
    }

    pub fn acid_rain_active(&self) -> bool {
        self.acid_rain_since.is_some()
    }

    /// Returns false if darkness was already active.
    pub fn start_darkness(&mut self, now: Instant) -> bool {
        if self.darkness_since.is_some() {
            return false;
        }
        self.darkness_since = Some(now);
        true
    }

    /// Returns false if acid rain was already active.
    pub fn start_acid_rain(&mut self, now: Instant) -> bool {
        if self.acid_rain_since.is_some() {
            return false;
        }
        self.acid_rain_since = Some(now);
        true
    }

    /// Clears both flags, returning whether either was set.
    pub fn clear(&mut self) -> bool {
        let was_active = self.darkness_active() || self.acid_rain_active();
        self.darkness_since = None;
        self.acid_rain_since = None;
        was_active
    }

    /// Clears every flag that has run for at least `ceiling` and returns the
    /// events that ended.
    pub fn expire(&mut self, now: Instant, ceiling: Duration) -> Vec<EventKind> {
        let mut expired = Vec::new();
        let mut check = |since: &mut Option<Instant>, kind: EventKind| {
            if let Some(started) = *since {
                if now.saturating_duration_since(started) >= ceiling {
                    *since = None;
                    expired.push(kind);
                }
            }
        };
        check(&mut self.darkness_since, EventKind::Darkness);
        check(&mut self.acid_rain_since, EventKind::AcidRain);
        expired
    }

    /// Notifications a late joiner needs to see the events already running.
    pub fn active_notifications(&self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        if self.darkness_active() {
            messages.push(ServerMessage::EventSummon {
                event: EventKind::Darkness,
            });
        }
        if self.acid_rain_active() {
            messages.push(ServerMessage::EventSummon {
                event: EventKind::AcidRain,
            });
        }
        messages
    }
}

/// Applies `kind` to the world if its preconditions hold. Returns whether
/// anything changed.
///
/// An assassin summoned here is a random roll: it needs enough players and
/// picks the assassin from the pool.
pub fn summon(
    world: &mut WorldGuard<'_>,
    kind: EventKind,
    config: &ServerConfig,
    now: Instant,
    rng: &mut impl Rng,
) -> bool {
    match kind {
        EventKind::Darkness => {
            if !world.events.start_darkness(now) {
                return false;
            }
            info!("Darkness event started");
            world.clients.broadcast(&ServerMessage::EventSummon { event: kind }, None);
            true
        }
        EventKind::AcidRain => {
            if !world.events.start_acid_rain(now) {
                return false;
            }
            info!("Acid rain event started");
            world.clients.broadcast(&ServerMessage::EventSummon { event: kind }, None);
            true
        }
        EventKind::Assassin => {
            if world.game.player_count() < config.min_assassin_players {
                info!("Not enough players to start an assassin event");
                return false;
            }
            if world.assassin.is_active() {
                debug!("Assassin roll skipped, an event is already running");
                return false;
            }
            let Some(id) = world.assassin.pick_random_assassin(&world.game, rng) else {
                return false;
            };
            world
                .assassin
                .designate(id, &mut world.game, &world.clients, now, rng)
                .is_ok()
        }
        EventKind::Clear => {
            let cleared = world.events.clear();
            let ended = world
                .assassin
                .end_event(&mut world.pending, &mut world.game, &world.clients);
            if cleared || ended {
                info!("All events cleared");
                world.clients.broadcast(&ServerMessage::EventSummon { event: kind }, None);
            }
            cleared || ended
        }
    }
}

/// Ends events that have run past the ceiling and retargets assassins whose
/// grace window is over. Runs once per tick.
pub fn check_timeouts(world: &mut WorldGuard<'_>, config: &ServerConfig, now: Instant) {
    for kind in world.events.expire(now, config.event_ceiling) {
        info!("{:?} event ended after {:?}", kind, config.event_ceiling);
        world.clients.broadcast(
            &ServerMessage::EventSummon {
                event: EventKind::Clear,
            },
            None,
        );
    }

    world.assassin.check_timeouts(
        &mut world.pending,
        &mut world.game,
        &world.clients,
        now,
        config.event_ceiling,
        config.assassin_grace,
        &mut rand::thread_rng(),
    );
}

/// Sleeps for `duration` unless shutdown is signalled first. Returns true on
/// shutdown.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.changed() => true,
    }
}

/// Rolls one random event per window at a uniformly random point within it.
pub async fn run_scheduler(state: Arc<ServerState>, mut shutdown: watch::Receiver<bool>) {
    let mut rng = StdRng::from_entropy();
    let window = state.config().event_window.max(MIN_EVENT_WINDOW);
    info!("Event scheduler running with a {:?} window", window);

    loop {
        let delay = rng.gen_range(Duration::ZERO..=window);
        if sleep_or_shutdown(delay, &mut shutdown).await {
            break;
        }

        if delay <= SCHEDULER_DEAD_ZONE {
            debug!("Skipping event roll {:?} into the window", delay);
        } else if let Some(kind) = EventKind::ALL.choose(&mut rng).copied() {
            debug!("Rolled {:?}", kind);
            let mut world = state.lock_all().await;
            summon(&mut world, kind, state.config(), Instant::now(), &mut rng);
        }

        if sleep_or_shutdown(window.saturating_sub(delay), &mut shutdown).await {
            break;
        }
    }
    info!("Event scheduler stopped");
}
