//! Tears down sessions that have stopped and tells everyone they left.
//!
//! Reaping runs in three steps so that no lock is held while a task is awaited:
//! retire the stopped clients under the registry lock, join their tasks, then
//! take the world locks to forget them and announce the departure.

use crate::client_manager::RetiredSession;
use crate::state::ServerState;
use log::{info, warn};
use shared::protocol::ServerMessage;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long a stopped session's tasks get to finish before they are aborted.
pub const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Reaps every stopped session. Returns the ids that were removed.
pub async fn reap(state: &ServerState) -> Vec<u32> {
    let retired: Vec<RetiredSession> = {
        let mut clients = state.lock_clients().await;
        let stopped = clients.stopped_ids();
        stopped.into_iter().filter_map(|id| clients.retire(id)).collect()
    };
    if retired.is_empty() {
        return Vec::new();
    }

    let ids = join_all(retired).await;
    forget(state, &ids).await;
    ids
}

/// Stops every session, waits for them and removes them.
pub async fn shutdown_all(state: &ServerState) -> usize {
    let retired: Vec<RetiredSession> = {
        let mut clients = state.lock_clients().await;
        let ids: Vec<u32> = clients.ids().into_iter().collect();
        ids.into_iter().filter_map(|id| clients.retire(id)).collect()
    };

    info!("Stopping {} sessions", retired.len());
    let ids = join_all(retired).await;
    forget(state, &ids).await;
    ids.len()
}

/// Waits for every retired task against one shared deadline, so the whole
/// batch takes at most [`JOIN_TIMEOUT`] no matter how many are stuck.
async fn join_all(retired: Vec<RetiredSession>) -> Vec<u32> {
    let deadline = Instant::now() + JOIN_TIMEOUT;
    let mut ids = Vec::with_capacity(retired.len());
    for session in retired {
        join(session.id, session.session, deadline).await;
        join(session.id, session.writer, deadline).await;
        ids.push(session.id);
    }
    ids
}

async fn join(id: u32, handle: Option<JoinHandle<()>>, deadline: Instant) {
    let Some(mut handle) = handle else {
        return;
    };
    match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => warn!("Task for client {} panicked: {}", id, e),
        Err(_) => {
            warn!("Task for client {} did not finish in time, aborting", id);
            handle.abort();
        }
    }
}

/// Removes the clients and their players, then announces each departure to
/// whoever is left.
async fn forget(state: &ServerState, ids: &[u32]) {
    let mut world = state.lock_all().await;
    for &id in ids {
        world.clients.remove(id);
        world.drop_player(id);
    }
    for &id in ids {
        world
            .clients
            .broadcast(&ServerMessage::PlayerLeft { id }, Some(id));
    }
}
