//! Line-oriented admin commands read from the server's stdin.

use crate::events;
use crate::network::ShutdownHandle;
use crate::state::ServerState;
use log::{info, warn};
use shared::EventKind;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Force `id` to become the assassin.
    Assassin(u32),
    Darkness,
    Clear,
    AcidRain,
    Shutdown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdminParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("usage: assassin <player_id>")]
    MissingPlayerId,
    #[error("invalid player id {0:?}")]
    InvalidPlayerId(String),
    #[error("{0} takes no arguments")]
    UnexpectedArgument(&'static str),
}

impl FromStr for AdminCommand {
    type Err = AdminParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(AdminParseError::Empty)?;

        let command = match name.to_ascii_lowercase().as_str() {
            "assassin" => {
                let raw = words.next().ok_or(AdminParseError::MissingPlayerId)?;
                let id = raw
                    .parse()
                    .map_err(|_| AdminParseError::InvalidPlayerId(raw.to_string()))?;
                AdminCommand::Assassin(id)
            }
            "darkness" => AdminCommand::Darkness,
            "clear" => AdminCommand::Clear,
            "acid_rain" => AdminCommand::AcidRain,
            "shutdown" => AdminCommand::Shutdown,
            _ => return Err(AdminParseError::Unknown(name.to_string())),
        };

        if words.next().is_some() {
            return Err(AdminParseError::UnexpectedArgument(command.name()));
        }
        Ok(command)
    }
}

impl AdminCommand {
    fn name(&self) -> &'static str {
        match self {
            AdminCommand::Assassin(_) => "assassin",
            AdminCommand::Darkness => "darkness",
            AdminCommand::Clear => "clear",
            AdminCommand::AcidRain => "acid_rain",
            AdminCommand::Shutdown => "shutdown",
        }
    }
}

/// Applies a command directly, bypassing the random scheduler.
pub async fn execute(state: &ServerState, command: AdminCommand, shutdown: &ShutdownHandle) {
    let now = Instant::now();
    let kind = match command {
        AdminCommand::Assassin(id) => {
            let mut world = state.lock_all().await;
            match world.designate_assassin(id, now) {
                Ok(()) => info!("Player {} forced to be the assassin", id),
                Err(e) => warn!("Cannot make {} the assassin: {}", id, e),
            }
            return;
        }
        AdminCommand::Shutdown => {
            info!("Shutdown requested from the console");
            shutdown.trigger();
            return;
        }
        AdminCommand::Darkness => EventKind::Darkness,
        AdminCommand::Clear => EventKind::Clear,
        AdminCommand::AcidRain => EventKind::AcidRain,
    };

    let mut world = state.lock_all().await;
    if !events::summon(&mut world, kind, state.config(), now, &mut rand::thread_rng()) {
        info!("{:?} had no effect", kind);
    }
}

/// Reads commands from stdin until it closes or the server shuts down.
pub async fn run_console(
    state: Arc<ServerState>,
    shutdown: ShutdownHandle,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Admin console ready");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown_rx.changed() => break,
        };

        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<AdminCommand>() {
                    Ok(command) => execute(&state, command, &shutdown).await,
                    Err(e) => warn!("{}", e),
                }
            }
            Ok(None) => {
                info!("stdin closed, admin console stopped");
                break;
            }
            Err(e) => {
                warn!("Failed to read admin command: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_manager::outbound_channel;
    use crate::config::ServerConfig;
    use crate::game::GameState;
    use shared::protocol::ServerMessage;
    use shared::Color;

    #[test]
    fn test_parse_commands() {
        assert_eq!("assassin 3".parse::<AdminCommand>(), Ok(AdminCommand::Assassin(3)));
        assert_eq!("  DARKNESS ".parse::<AdminCommand>(), Ok(AdminCommand::Darkness));
        assert_eq!("clear".parse::<AdminCommand>(), Ok(AdminCommand::Clear));
        assert_eq!("acid_rain".parse::<AdminCommand>(), Ok(AdminCommand::AcidRain));
        assert_eq!("shutdown".parse::<AdminCommand>(), Ok(AdminCommand::Shutdown));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<AdminCommand>(), Err(AdminParseError::Empty));
        assert_eq!(
            "assassin".parse::<AdminCommand>(),
            Err(AdminParseError::MissingPlayerId)
        );
        assert_eq!(
            "assassin bob".parse::<AdminCommand>(),
            Err(AdminParseError::InvalidPlayerId("bob".into()))
        );
        assert_eq!(
            "clear now".parse::<AdminCommand>(),
            Err(AdminParseError::UnexpectedArgument("clear"))
        );
        assert!(matches!(
            "rain".parse::<AdminCommand>(),
            Err(AdminParseError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn test_forced_assassin_ignores_player_minimum() {
        let state = ServerState::with_world(ServerConfig::local_test(), GameState::new());
        let (shutdown, _rx) = ShutdownHandle::new();
        {
            let mut world = state.lock_all().await;
            world.game.add_player(0);
            world.game.add_player(1);
        }

        execute(&state, AdminCommand::Assassin(1), &shutdown).await;

        let world = state.lock_all().await;
        assert_eq!(world.assassin.assassin(), Some(1));
        assert_eq!(world.assassin.target(), Some(0));
        assert_eq!(world.game.player(1).unwrap().color, Color::INVISIBLE);
    }

    #[tokio::test]
    async fn test_shutdown_command_flips_watch() {
        let state = ServerState::with_world(ServerConfig::local_test(), GameState::new());
        let (shutdown, rx) = ShutdownHandle::new();
        execute(&state, AdminCommand::Shutdown, &shutdown).await;
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_forced_darkness_times_out_once() {
        let state = ServerState::with_world(ServerConfig::local_test(), GameState::new());
        let (shutdown, _rx) = ShutdownHandle::new();
        let mut rx = {
            let mut world = state.lock_all().await;
            world.game.add_player(0);
            let (tx, rx) = outbound_channel();
            world.clients.register(0, tx);
            rx
        };

        execute(&state, AdminCommand::Darkness, &shutdown).await;
        let ceiling = state.config().event_ceiling;
        for factor in [1, 2] {
            let mut world = state.lock_all().await;
            events::check_timeouts(&mut world, state.config(), Instant::now() + ceiling * factor);
        }

        let mut summons = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Ok(ServerMessage::EventSummon { event }) =
                ServerMessage::decode(frame.trim_end_matches(';'))
            {
                summons.push(event);
            }
        }
        assert_eq!(summons, vec![EventKind::Darkness, EventKind::Clear]);
        assert!(!state.lock_all().await.events.darkness_active());
    }

    #[tokio::test]
    async fn test_darkness_and_clear() {
        let state = ServerState::with_world(ServerConfig::local_test(), GameState::new());
        let (shutdown, _rx) = ShutdownHandle::new();

        execute(&state, AdminCommand::Darkness, &shutdown).await;
        execute(&state, AdminCommand::AcidRain, &shutdown).await;
        {
            let world = state.lock_all().await;
            assert!(world.events.darkness_active());
            assert!(world.events.acid_rain_active());
        }

        execute(&state, AdminCommand::Clear, &shutdown).await;
        let world = state.lock_all().await;
        assert!(!world.events.darkness_active());
        assert!(!world.events.acid_rain_active());
    }
}
