//! Per-client session: welcome sequence, read loop and teardown.
//!
//! Each connection runs two tasks. The session task owns the read half, frames
//! incoming bytes and pushes complete messages into the shared inbox. The
//! writer task owns the write half and drains the session's outbound queue, so
//! every socket has exactly one writer and broadcasts never interleave.

use crate::state::{ServerState, WorldGuard};
use log::{debug, info, warn};
use shared::framing::FrameBuffer;
use shared::protocol::ServerMessage;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Notify};

const READ_BUFFER_SIZE: usize = 1024;

/// Queues the join sequence for `id` and announces them to everyone else.
///
/// The new client gets the full roster, its own id, any running darkness or
/// acid rain, and the current assassin assignment. Must run under the same
/// world locks that registered the client, before anything else can be queued
/// for it.
pub fn welcome(world: &WorldGuard<'_>, id: u32) -> bool {
    let Some(player) = world.game.player(id) else {
        return false;
    };

    let mut greeting = vec![
        ServerMessage::GameState {
            players: world.game.snapshot(),
        },
        ServerMessage::ClientId { id },
    ];
    greeting.extend(world.events.active_notifications());
    greeting.extend(world.assassin.assignment());

    for message in &greeting {
        world.clients.send_to(id, message);
    }
    world
        .clients
        .broadcast(&ServerMessage::PlayerNew(player.info(id)), Some(id));
    true
}

/// Reads from an already welcomed client until the socket closes, errors,
/// sends garbage that never terminates, or the server signals `stop`.
pub async fn run(id: u32, mut reader: OwnedReadHalf, state: Arc<ServerState>, stop: Arc<Notify>) {
    read_loop(id, &mut reader, &state, &stop).await;
    finish(id, &state).await;
    info!("Client {} disconnected", id);
}

async fn read_loop(id: u32, reader: &mut OwnedReadHalf, state: &ServerState, stop: &Notify) {
    let mut frames = FrameBuffer::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        let read = tokio::select! {
            _ = stop.notified() => {
                debug!("Session {} told to stop", id);
                return;
            }
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => return,
            Ok(n) => match frames.push(&buffer[..n]) {
                Ok(complete) => state.push_inbox(id, complete).await,
                Err(e) => {
                    warn!("Dropping client {}: {}", id, e);
                    return;
                }
            },
            Err(e) => {
                debug!("Read error from client {}: {}", id, e);
                return;
            }
        }
    }
}

/// Marks the session stopped and takes the player out of the world. If they
/// were the assassin their colour is restored for everyone first.
async fn finish(id: u32, state: &ServerState) {
    let mut world = state.lock_all().await;
    world.clients.mark_stopped(id);
    world.drop_player(id);
}

/// Writes queued frames to the socket until the queue is closed or a write
/// fails, then shuts down the write side.
pub async fn write_loop(id: u32, mut writer: OwnedWriteHalf, mut outbound: mpsc::Receiver<String>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            debug!("Write to client {} failed: {}", id, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}
