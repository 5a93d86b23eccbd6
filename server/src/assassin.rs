//! Assassin mini-game.
//!
//! One player at a time may be the assassin. While the event runs their colour
//! is pinned to [`Color::INVISIBLE`] and they hunt a single target with the
//! knife. A successful strike puts them in a short pending window with
//! themselves as a placeholder target before a fresh target is chosen.

use crate::client_manager::ClientManager;
use crate::game::GameState;
use crate::physics;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::protocol::ServerMessage;
use shared::{Color, Weapon};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssassinPhase {
    #[default]
    Inactive,
    /// `target` is `None` while nobody else is eligible.
    Active { assassin: u32, target: Option<u32> },
    /// Grace window after a strike; the assassin is their own placeholder target.
    Pending { assassin: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DesignateError {
    #[error("an assassin event is already active")]
    AlreadyActive,
    #[error("player {0} not found")]
    UnknownPlayer(u32),
    #[error("player {0} was the last assassin")]
    RepeatAssassin(u32),
}

/// Assassins waiting out their post-strike grace window.
#[derive(Debug, Default)]
pub struct PendingAssassins {
    since: HashMap<u32, Instant>,
}

impl PendingAssassins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, assassin: u32, now: Instant) {
        self.since.insert(assassin, now);
    }

    pub fn remove(&mut self, assassin: u32) -> bool {
        self.since.remove(&assassin).is_some()
    }

    pub fn contains(&self, assassin: u32) -> bool {
        self.since.contains_key(&assassin)
    }

    pub fn clear(&mut self) {
        self.since.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.since.is_empty()
    }

    /// Removes and returns every entry whose grace window has elapsed.
    fn take_expired(&mut self, now: Instant, grace: Duration) -> Vec<u32> {
        let expired: Vec<u32> = self
            .since
            .iter()
            .filter(|(_, since)| now.saturating_duration_since(**since) >= grace)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.since.remove(id);
        }
        expired
    }
}

#[derive(Debug)]
pub struct AssassinState {
    phase: AssassinPhase,
    original_color: Color,
    started_at: Option<Instant>,
    last_assassin: Option<u32>,
    used_assassins: HashSet<u32>,
    previous_targets: HashSet<u32>,
}

impl Default for AssassinState {
    fn default() -> Self {
        Self {
            phase: AssassinPhase::Inactive,
            original_color: Color::RED,
            started_at: None,
            last_assassin: None,
            used_assassins: HashSet::new(),
            previous_targets: HashSet::new(),
        }
    }
}

impl AssassinState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> AssassinPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != AssassinPhase::Inactive
    }

    pub fn assassin(&self) -> Option<u32> {
        match self.phase {
            AssassinPhase::Inactive => None,
            AssassinPhase::Active { assassin, .. } | AssassinPhase::Pending { assassin } => {
                Some(assassin)
            }
        }
    }

    /// Current target. During the pending window this is the assassin.
    pub fn target(&self) -> Option<u32> {
        match self.phase {
            AssassinPhase::Inactive => None,
            AssassinPhase::Active { target, .. } => target,
            AssassinPhase::Pending { assassin } => Some(assassin),
        }
    }

    pub fn last_assassin(&self) -> Option<u32> {
        self.last_assassin
    }

    /// Notification describing the current assignment, if there is one.
    pub fn assignment(&self) -> Option<ServerMessage> {
        let assassin_id = self.assassin()?;
        let target_id = self.target()?;
        Some(ServerMessage::AssassinChange {
            assassin_id,
            target_id,
        })
    }

    /// Picks a target for `assassin`, avoiding players already targeted since
    /// the pool was last exhausted. The choice is recorded.
    fn select_target(&mut self, assassin: u32, game: &GameState, rng: &mut impl Rng) -> Option<u32> {
        let eligible: Vec<u32> = game
            .players()
            .filter(|(id, p)| *id != assassin && !p.color.is_invisible())
            .map(|(id, _)| id)
            .collect();

        let mut candidates: Vec<u32> = eligible
            .iter()
            .copied()
            .filter(|id| !self.previous_targets.contains(id))
            .collect();
        if candidates.is_empty() {
            self.previous_targets.clear();
            candidates = eligible;
        }

        let target = *candidates.choose(rng)?;
        self.previous_targets.insert(target);
        Some(target)
    }

    /// Chooses a player for a random assassin event. Players who have not yet
    /// been the assassin go first and the previous assassin is never chosen.
    pub fn pick_random_assassin(&mut self, game: &GameState, rng: &mut impl Rng) -> Option<u32> {
        let fresh = |used: &HashSet<u32>, last: Option<u32>| -> Vec<u32> {
            game.players()
                .map(|(id, _)| id)
                .filter(|id| !used.contains(id) && Some(*id) != last)
                .collect()
        };

        let mut available = fresh(&self.used_assassins, self.last_assassin);
        if available.is_empty() {
            info!("All players have been assassins, resetting the pool");
            self.used_assassins.clear();
            available = fresh(&self.used_assassins, self.last_assassin);
        }
        available.choose(rng).copied()
    }

    /// Makes `id` the assassin: their colour goes invisible for everyone and
    /// they are told their first target.
    pub fn designate(
        &mut self,
        id: u32,
        game: &mut GameState,
        clients: &ClientManager,
        now: Instant,
        rng: &mut impl Rng,
    ) -> Result<(), DesignateError> {
        if self.is_active() {
            return Err(DesignateError::AlreadyActive);
        }
        let player = game.player_mut(id).ok_or(DesignateError::UnknownPlayer(id))?;
        if self.last_assassin == Some(id) {
            return Err(DesignateError::RepeatAssassin(id));
        }

        self.original_color = player.color;
        player.color = Color::INVISIBLE;
        let update = ServerMessage::PlayerUpdate {
            id,
            username: player.username.clone(),
            color: Color::INVISIBLE,
        };

        self.used_assassins.insert(id);
        self.started_at = Some(now);
        let target = self.select_target(id, game, rng);
        self.phase = AssassinPhase::Active {
            assassin: id,
            target,
        };

        info!("Player {} is now the assassin, target {:?}", id, target);
        clients.broadcast(&update, None);
        if let Some(target_id) = target {
            clients.send_to(
                id,
                &ServerMessage::AssassinChange {
                    assassin_id: id,
                    target_id,
                },
            );
        }
        Ok(())
    }

    /// Checks whether `mover`'s new pose lands a knife strike on the current
    /// target. On a hit the assassin enters the pending window.
    pub fn check_strike(
        &mut self,
        mover: u32,
        pending: &mut PendingAssassins,
        game: &GameState,
        clients: &ClientManager,
        now: Instant,
    ) -> bool {
        let AssassinPhase::Active {
            assassin,
            target: Some(target),
        } = self.phase
        else {
            return false;
        };
        if mover != assassin || target == assassin {
            return false;
        }

        let (Some(attacker), Some(victim)) = (game.player(assassin), game.player(target)) else {
            return false;
        };
        if attacker.weapon != Weapon::Melee {
            return false;
        }
        if !physics::melee_hits((attacker.x, attacker.y, attacker.rotation), (victim.x, victim.y)) {
            return false;
        }

        info!("Assassin {} struck target {}", assassin, target);
        self.last_assassin = Some(assassin);
        self.phase = AssassinPhase::Pending { assassin };
        pending.insert(assassin, now);
        clients.send_to(
            assassin,
            &ServerMessage::AssassinChange {
                assassin_id: assassin,
                target_id: assassin,
            },
        );
        true
    }

    /// Ends the event and restores the assassin's colour. Returns false if no
    /// event was running, which makes repeated calls harmless.
    pub fn end_event(
        &mut self,
        pending: &mut PendingAssassins,
        game: &mut GameState,
        clients: &ClientManager,
    ) -> bool {
        let Some(assassin) = self.assassin() else {
            return false;
        };

        if let Some(player) = game.player_mut(assassin) {
            player.color = self.original_color;
            clients.broadcast(
                &ServerMessage::PlayerUpdate {
                    id: assassin,
                    username: player.username.clone(),
                    color: self.original_color,
                },
                None,
            );
        }

        info!("Assassin event for player {} ended", assassin);
        self.phase = AssassinPhase::Inactive;
        self.started_at = None;
        self.previous_targets.clear();
        pending.clear();
        true
    }

    /// Ends the event if `id` is the assassin. Must run while the player is
    /// still in the roster so the restored colour reaches everyone.
    pub fn release_assassin(
        &mut self,
        id: u32,
        pending: &mut PendingAssassins,
        game: &mut GameState,
        clients: &ClientManager,
    ) -> bool {
        if self.assassin() != Some(id) {
            return false;
        }
        info!("Assassin {} left, ending the event", id);
        self.end_event(pending, game, clients)
    }

    /// Picks a replacement if `id`, already removed from the roster, was the
    /// current target.
    pub fn replace_target(
        &mut self,
        id: u32,
        game: &GameState,
        clients: &ClientManager,
        rng: &mut impl Rng,
    ) {
        self.previous_targets.remove(&id);
        if let AssassinPhase::Active {
            assassin,
            target: Some(target),
        } = self.phase
        {
            if target == id {
                debug!("Target {} of assassin {} left", id, assassin);
                self.assign_new_target(assassin, game, clients, rng);
            }
        }
    }

    fn assign_new_target(
        &mut self,
        assassin: u32,
        game: &GameState,
        clients: &ClientManager,
        rng: &mut impl Rng,
    ) {
        let target = self.select_target(assassin, game, rng);
        self.phase = AssassinPhase::Active { assassin, target };
        if let Some(target_id) = target {
            info!("Assassin {} assigned new target {}", assassin, target_id);
            clients.send_to(
                assassin,
                &ServerMessage::AssassinChange {
                    assassin_id: assassin,
                    target_id,
                },
            );
        }
    }

    /// Enforces the event ceiling and moves assassins out of the pending
    /// window once their grace period is over.
    #[allow(clippy::too_many_arguments)]
    pub fn check_timeouts(
        &mut self,
        pending: &mut PendingAssassins,
        game: &mut GameState,
        clients: &ClientManager,
        now: Instant,
        ceiling: Duration,
        grace: Duration,
        rng: &mut impl Rng,
    ) {
        if let Some(started) = self.started_at {
            if now.saturating_duration_since(started) >= ceiling {
                info!("Assassin event timed out");
                self.end_event(pending, game, clients);
                return;
            }
        }

        for assassin in pending.take_expired(now, grace) {
            if self.phase == (AssassinPhase::Pending { assassin }) {
                self.assign_new_target(assassin, game, clients, rng);
            }
        }

        if let AssassinPhase::Active {
            assassin,
            target: None,
        } = self.phase
        {
            self.assign_new_target(assassin, game, clients, rng);
        }
    }
}
