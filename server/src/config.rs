//! Command line arguments and the runtime configuration derived from them.

use clap::Parser;
use shared::DEFAULT_PORT;
use std::time::Duration;

/// Shortest random event window the scheduler will run with.
pub const MIN_EVENT_WINDOW: Duration = Duration::from_secs(1);

/// Authoritative arena server
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// IPv4 address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,
    /// TCP port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Milliseconds between server ticks
    #[clap(long, default_value_t = 10)]
    pub tick_ms: u64,
    /// Length of the random event window in seconds
    #[clap(long, default_value_t = 300)]
    pub event_window_secs: u64,
    /// Maximum duration of darkness, acid rain and assassin events in seconds
    #[clap(long, default_value_t = 60)]
    pub event_ceiling_secs: u64,
    /// Seconds an assassin waits for a new target after a strike
    #[clap(long, default_value_t = 5)]
    pub assassin_grace_secs: u64,
    /// Players required before a random assassin event can start
    #[clap(long, default_value_t = 3)]
    pub min_assassin_players: usize,
    /// Seconds to wait for sessions to wind down before exiting
    #[clap(long, default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
    /// Disable the random event scheduler
    #[clap(long)]
    pub no_events: bool,
    /// Do not read admin commands from stdin
    #[clap(long)]
    pub no_admin: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick: Duration,
    pub event_window: Duration,
    pub event_ceiling: Duration,
    pub assassin_grace: Duration,
    pub min_assassin_players: usize,
    pub shutdown_timeout: Duration,
    pub random_events: bool,
    pub admin_console: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick: Duration::from_millis(10),
            event_window: Duration::from_secs(300),
            event_ceiling: Duration::from_secs(60),
            assassin_grace: Duration::from_secs(5),
            min_assassin_players: 3,
            shutdown_timeout: Duration::from_secs(5),
            random_events: true,
            admin_console: true,
        }
    }
}

impl ServerConfig {
    /// Loopback config on an ephemeral port with no background event sources.
    pub fn local_test() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            random_events: false,
            admin_console: false,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            tick: Duration::from_millis(args.tick_ms.max(1)),
            event_window: Duration::from_secs(args.event_window_secs).max(MIN_EVENT_WINDOW),
            event_ceiling: Duration::from_secs(args.event_ceiling_secs),
            assassin_grace: Duration::from_secs(args.assassin_grace_secs),
            min_assassin_players: args.min_assassin_players,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            random_events: !args.no_events,
            admin_console: !args.no_admin,
        }
    }
}
