//! # Arena Server Library
//!
//! This library provides the authoritative server for the top-down arena game.
//! It owns the canonical world, relays player actions between clients, runs
//! the bullet simulation and drives the global events (darkness, acid rain and
//! the assassin round).
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World
//! Player poses are reported by clients and stored as-is, but everything that
//! decides an outcome happens here: bullet ids, positions and collisions,
//! assassin strikes, target selection and event timeouts. Clients render what
//! the server tells them.
//!
//! ### Client Management
//! Handles the complete lifecycle of a TCP connection:
//! - Id assignment (smallest id free in both the roster and the registry)
//! - The welcome sequence: snapshot, id, running events, assassin assignment
//! - Disconnection detection and cleanup through the reaper
//!
//! ### Relaying
//! Most messages are applied to the world and then forwarded to every other
//! client. Bullet shots are the exception and go to everyone, the shooter
//! included, because the server assigns the bullet id.
//!
//! ## Architecture Design
//!
//! ### Task Model
//! Every connection runs a session task that frames incoming bytes and a
//! writer task that drains the session's outbound queue. A fixed set of
//! background tasks handles accepting connections, the random event scheduler
//! and the admin console. The tick loop does the rest.
//!
//! ### Tick Pipeline
//! Each tick runs, in order:
//! 1. Event and assassin timeouts
//! 2. Reaping of sessions that have stopped
//! 3. Every message queued since the last tick, in arrival order
//! 4. One bullet simulation step
//!
//! ### Locking
//! Shared state lives in [`state::ServerState`]. Structures that are needed
//! together are always locked together and in one fixed order, and no lock is
//! held across socket I/O. Sends are non-blocking queue pushes.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! TCP listener, background task startup, the tick loop and graceful
//! shutdown.
//!
//! ### Session Module (`session`)
//! Per-connection welcome, read loop and writer.
//!
//! ### Router Module (`router`)
//! Decodes queued messages and applies them to the world.
//!
//! ### Game Module (`game`)
//! Player roster, bullets and map objects.
//!
//! ### Assassin Module (`assassin`)
//! The assassin round: designation, targets, strikes and the grace window.
//!
//! ### Events Module (`events`)
//! Darkness and acid rain flags, event timeouts and the random scheduler.
//!
//! ### Reaper Module (`reaper`)
//! Tears down stopped sessions and announces departures.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     // Bind on the default port with the scheduler and admin console enabled
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Runs until Ctrl-C or the `shutdown` admin command:
//!     // - Accepts connections and welcomes new players
//!     // - Routes client messages once per tick
//!     // - Simulates bullets and expires events
//!     // - Reaps disconnected sessions
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.trigger();
//!     });
//!     server.run().await
//! }
//! ```

pub mod admin;
pub mod assassin;
pub mod client_manager;
pub mod config;
pub mod events;
pub mod game;
pub mod network;
pub mod physics;
pub mod reaper;
pub mod router;
pub mod session;
pub mod state;
