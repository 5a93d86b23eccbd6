//! Packet router: drains the inbox once per tick and applies each message.

use crate::state::{ServerState, WorldGuard};
use log::{debug, warn};
use shared::protocol::{ClientMessage, ProtocolError, ServerMessage};
use shared::{normalize_rotation, sanitize_username, Color, Weapon};
use std::time::Instant;

/// Processes every message received since the last tick. A message that fails
/// to decode is logged and skipped; the rest of the batch still runs.
pub async fn process_inbox(state: &ServerState) -> usize {
    let batch = state.take_inbox().await;
    if batch.is_empty() {
        return 0;
    }

    let now = Instant::now();
    let mut world = state.lock_all().await;
    for (sender, raw) in &batch {
        if let Err(e) = handle_message(&mut world, *sender, raw, now) {
            warn!("Dropping message from client {}: {}", sender, e);
        }
    }
    batch.len()
}

/// Decodes and applies one message from `sender`. Messages from ids that have
/// already left are ignored.
pub fn handle_message(
    world: &mut WorldGuard<'_>,
    sender: u32,
    raw: &str,
    now: Instant,
) -> Result<(), ProtocolError> {
    let message = ClientMessage::decode(raw)?;
    if !world.game.contains(sender) {
        debug!("Ignoring {:?} from departed client {}", message.kind(), sender);
        return Ok(());
    }

    match message {
        ClientMessage::Move { x, y, rot } => on_move(world, sender, x, y, rot, now),
        ClientMessage::PlayerUpdate { username, color } => {
            on_player_update(world, sender, &username, color)
        }
        ClientMessage::ColorChange { color_code } => on_color_change(world, sender, color_code)?,
        ClientMessage::SwitchWeapon { weapon } => on_switch_weapon(world, sender, weapon),
        ClientMessage::BulletShot { rot, .. } => on_shot(world, sender, rot),
        ClientMessage::UmbrellaShoot { rot } => on_umbrella(world, sender, Some(rot)),
        ClientMessage::UmbrellaStop => on_umbrella(world, sender, None),
    }
    Ok(())
}

fn on_move(world: &mut WorldGuard<'_>, sender: u32, x: i32, y: i32, rot: f32, now: Instant) {
    let Some((x, y, rot)) = world.game.move_player(sender, x, y, rot) else {
        return;
    };

    world.clients.broadcast(
        &ServerMessage::PlayerMove {
            id: sender,
            x,
            y,
            rot,
        },
        Some(sender),
    );

    world
        .assassin
        .check_strike(sender, &mut world.pending, &world.game, &world.clients, now);
}

fn on_player_update(world: &mut WorldGuard<'_>, sender: u32, username: &str, color: Color) {
    let is_assassin = world.assassin.assassin() == Some(sender);
    let Some(player) = world.game.player_mut(sender) else {
        return;
    };

    player.username = sanitize_username(username);
    // the sentinel is reserved for the assassin and the assassin's colour is pinned
    if !is_assassin && !color.is_invisible() {
        player.color = color;
    }

    let update = ServerMessage::PlayerUpdate {
        id: sender,
        username: player.username.clone(),
        color: player.color,
    };
    world.clients.broadcast(&update, Some(sender));
}

fn on_color_change(
    world: &mut WorldGuard<'_>,
    sender: u32,
    color_code: u32,
) -> Result<(), ProtocolError> {
    let color = Color::from_code(color_code).ok_or(ProtocolError::InvalidField("color_code"))?;
    if world.assassin.assassin() == Some(sender) {
        debug!("Ignoring colour change from assassin {}", sender);
        return Ok(());
    }
    if let Some(player) = world.game.player_mut(sender) {
        player.color = color;
        world.clients.broadcast(
            &ServerMessage::ColorChange {
                player_id: sender,
                color_code,
            },
            Some(sender),
        );
    }
    Ok(())
}

fn on_switch_weapon(world: &mut WorldGuard<'_>, sender: u32, weapon: Weapon) {
    let Some(player) = world.game.player_mut(sender) else {
        return;
    };
    player.weapon = weapon;
    if weapon != Weapon::Umbrella {
        player.is_shooting = false;
    }
    world.clients.broadcast(
        &ServerMessage::SwitchWeapon {
            player_id: sender,
            weapon,
        },
        Some(sender),
    );
}

fn on_shot(world: &mut WorldGuard<'_>, sender: u32, rot: f32) {
    let rot = normalize_rotation(rot);
    if let Some(player) = world.game.player_mut(sender) {
        player.rotation = rot;
    }
    let Some(bullet) = world.game.spawn_bullet(sender, rot) else {
        warn!("No bullet id available for client {}", sender);
        return;
    };

    // sent to the shooter too so the local bullet can take the server's id
    world.clients.broadcast(
        &ServerMessage::BulletShot {
            player_id: sender,
            bullet_id: bullet.id,
            x: bullet.position.x.round() as i32,
            y: bullet.position.y.round() as i32,
            rot,
        },
        None,
    );
}

/// `rot` is `Some` when the umbrella starts firing and `None` when it stops.
fn on_umbrella(world: &mut WorldGuard<'_>, sender: u32, rot: Option<f32>) {
    let Some(player) = world.game.player_mut(sender) else {
        return;
    };
    if player.weapon != Weapon::Umbrella {
        debug!("Client {} used the umbrella without holding it", sender);
        return;
    }

    let message = match rot {
        Some(rot) => {
            player.rotation = normalize_rotation(rot);
            player.is_shooting = true;
            ServerMessage::UmbrellaShoot {
                player_id: sender,
                rot: player.rotation,
            }
        }
        None => {
            player.is_shooting = false;
            ServerMessage::UmbrellaStop { player_id: sender }
        }
    };
    world.clients.broadcast(&message, Some(sender));
}
