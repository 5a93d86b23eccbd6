//! The authoritative world model: player roster, live bullets and map objects.

use crate::physics::{self, Rect, Vector2};
use log::{debug, info};
use shared::protocol::PlayerInfo;
use shared::{
    normalize_rotation, sanitize_username, Color, Weapon, BULLET_ID_MODULUS, BULLET_RADIUS,
    DEFAULT_USERNAME, PLAYING_AREA_HEIGHT, PLAYING_AREA_WIDTH, SPAWN_X, SPAWN_Y,
};
use std::collections::{BTreeMap, HashSet};

const BARREL_SIZE: f32 = 100.0;
const CHARGER_SIZE: f32 = 64.0;
const CHARGER_OFFSET: f32 = 32.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub x: i32,
    pub y: i32,
    /// Degrees in `[0, 360)`.
    pub rotation: f32,
    pub username: String,
    pub color: Color,
    pub weapon: Weapon,
    pub is_shooting: bool,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            x: SPAWN_X,
            y: SPAWN_Y,
            rotation: 0.0,
            username: DEFAULT_USERNAME.to_string(),
            color: Color::RED,
            weapon: Weapon::Melee,
            is_shooting: false,
        }
    }
}

impl Player {
    pub fn info(&self, id: u32) -> PlayerInfo {
        PlayerInfo {
            id,
            x: self.x,
            y: self.y,
            rot: self.rotation,
            username: sanitize_username(&self.username),
            color: self.color,
            weapon: self.weapon,
            is_shooting: self.is_shooting,
        }
    }

    pub fn bounds(&self) -> Rect {
        physics::player_bounds(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub id: u32,
    pub position: Vector2,
    /// Units per second.
    pub velocity: Vector2,
    pub shooter_id: u32,
    pub radius: f32,
}

impl Bullet {
    pub fn bounds(&self) -> Rect {
        physics::bullet_bounds(self.position, self.radius)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Umbrella recharge point.
    Barrel,
    /// Flashlight recharge point.
    Charger,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapObject {
    pub kind: ObjectKind,
    pub bounds: Rect,
}

#[derive(Debug, Clone, Default)]
pub struct GameState {
    players: BTreeMap<u32, Player>,
    bullets: Vec<Bullet>,
    next_bullet_id: u32,
    objects: Vec<MapObject>,
}

impl GameState {
    /// Empty world without map objects.
    pub fn new() -> Self {
        Self::default()
    }

    /// World seeded with the centre barrel and the four chargers.
    pub fn with_default_map() -> Self {
        let mut state = Self::new();
        let (w, h) = (PLAYING_AREA_WIDTH, PLAYING_AREA_HEIGHT);

        state.add_object(
            ObjectKind::Barrel,
            Rect::new(
                (w - BARREL_SIZE) / 2.0,
                (h - BARREL_SIZE) / 2.0,
                BARREL_SIZE,
                BARREL_SIZE,
            ),
        );

        let chargers = [
            (CHARGER_OFFSET, h / 2.0 - CHARGER_OFFSET),
            (w - CHARGER_OFFSET - CHARGER_SIZE, h / 2.0 - CHARGER_OFFSET),
            (w / 2.0 - CHARGER_OFFSET, CHARGER_OFFSET),
            (w / 2.0 - CHARGER_OFFSET, h - CHARGER_OFFSET - CHARGER_SIZE),
        ];
        for (x, y) in chargers {
            state.add_object(
                ObjectKind::Charger,
                Rect::new(x, y, CHARGER_SIZE, CHARGER_SIZE),
            );
        }
        state
    }

    pub fn add_object(&mut self, kind: ObjectKind, bounds: Rect) {
        self.objects.push(MapObject { kind, bounds });
    }

    pub fn objects(&self) -> &[MapObject] {
        &self.objects
    }

    /// Smallest id that is neither in the roster nor in `reserved`.
    pub fn smallest_free_id(&self, reserved: &HashSet<u32>) -> u32 {
        (0..)
            .find(|id| !self.players.contains_key(id) && !reserved.contains(id))
            .unwrap_or(u32::MAX)
    }

    pub fn add_player(&mut self, id: u32) -> &Player {
        info!("Added player {} at ({}, {})", id, SPAWN_X, SPAWN_Y);
        self.players.entry(id).or_default()
    }

    /// Removing an id that is already gone is a no-op.
    pub fn remove_player(&mut self, id: u32) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    pub fn contains(&self, id: u32) -> bool {
        self.players.contains_key(&id)
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: u32) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = (u32, &Player)> {
        self.players.iter().map(|(id, p)| (*id, p))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Every player in id order, as sent in `GAME_STATE`.
    pub fn snapshot(&self) -> Vec<PlayerInfo> {
        self.players().map(|(id, p)| p.info(id)).collect()
    }

    /// Returns the stored pose, or `None` for an id no longer in the roster.
    pub fn move_player(&mut self, id: u32, x: i32, y: i32, rot: f32) -> Option<(i32, i32, f32)> {
        let player = self.players.get_mut(&id)?;
        player.x = x;
        player.y = y;
        player.rotation = normalize_rotation(rot);
        Some((player.x, player.y, player.rotation))
    }

    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    /// Next id from the wrapping counter that no live bullet holds.
    fn allocate_bullet_id(&mut self) -> Option<u32> {
        let live: HashSet<u32> = self.bullets.iter().map(|b| b.id).collect();
        for _ in 0..BULLET_ID_MODULUS {
            let candidate = self.next_bullet_id;
            self.next_bullet_id = (self.next_bullet_id + 1) % BULLET_ID_MODULUS;
            if !live.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Fires a bullet from the shooter's recorded position facing `rot`.
    pub fn spawn_bullet(&mut self, shooter_id: u32, rot: f32) -> Option<Bullet> {
        let shooter = self.players.get(&shooter_id)?;
        let (position, velocity) = physics::bullet_launch(shooter.x, shooter.y, rot);
        let id = self.allocate_bullet_id()?;

        let bullet = Bullet {
            id,
            position,
            velocity,
            shooter_id,
            radius: BULLET_RADIUS,
        };
        debug!("Player {} fired bullet {}", shooter_id, id);
        self.bullets.push(bullet.clone());
        Some(bullet)
    }

    /// Advances every bullet by `dt` seconds and removes the ones that left the
    /// playing area or hit a player or map object. Returns the removed ids.
    pub fn step_bullets(&mut self, dt: f32) -> Vec<u32> {
        let mut despawned = Vec::new();
        let players = &self.players;
        let objects = &self.objects;

        self.bullets.retain_mut(|bullet| {
            bullet.position = bullet.position.add(&bullet.velocity.scale(dt));

            let hit = !physics::in_playing_area(bullet.position) || {
                let bounds = bullet.bounds();
                players
                    .iter()
                    .any(|(id, p)| *id != bullet.shooter_id && p.bounds().intersects(&bounds))
                    || objects.iter().any(|o| o.bounds.intersects(&bounds))
            };

            if hit {
                despawned.push(bullet.id);
            }
            !hit
        });
        despawned
    }
}
