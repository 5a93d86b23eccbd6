//! Types and constants shared by the arena server and anything that talks to it.
//!
//! The wire stack is layered bottom-up:
//! - [`framing`] splits the TCP byte stream on the `;` terminator
//! - [`netvent`] turns a frame body into a tag plus a key-value table
//! - [`protocol`] maps tags and tables onto the closed message enums

pub mod framing;
pub mod netvent;
pub mod protocol;

use netvent::{Table, Value};

pub const DEFAULT_PORT: u16 = 50000;

pub const PLAYING_AREA_WIDTH: f32 = 1000.0;
pub const PLAYING_AREA_HEIGHT: f32 = 1000.0;

/// Players are 100x100 squares anchored at their top-left corner.
pub const PLAYER_SIZE: i32 = 100;
pub const SPAWN_X: i32 = 100;
pub const SPAWN_Y: i32 = 100;

pub const DEFAULT_USERNAME: &str = "unset";
pub const MAX_USERNAME_LEN: usize = 16;

pub const BULLET_RADIUS: f32 = 10.0;
/// Units per second.
pub const BULLET_SPEED: f32 = 600.0;
pub const MUZZLE_OFFSET: f32 = 120.0;
pub const BULLET_ID_MODULUS: u32 = 10_000;

/// Distance from the assassin's centre to the knife point.
pub const MELEE_REACH: f32 = 80.0;
/// The knife point must land within this distance of the target's centre.
pub const MELEE_HIT_RADIUS: f32 = 100.0;

/// RGBA colour as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const RED: Color = Color::rgba(230, 41, 55, 255);
    pub const GREEN: Color = Color::rgba(0, 228, 48, 255);
    pub const YELLOW: Color = Color::rgba(253, 249, 0, 255);
    pub const PURPLE: Color = Color::rgba(200, 122, 255, 255);
    pub const ORANGE: Color = Color::rgba(255, 161, 0, 255);

    /// Reserved sentinel: a player with this colour is not drawn for others.
    pub const INVISIBLE: Color = Color::rgba(0, 0, 0, 0);

    /// Colours a player may pick, indexed by their colour code.
    pub const PALETTE: [Color; 5] = [
        Color::RED,
        Color::GREEN,
        Color::YELLOW,
        Color::PURPLE,
        Color::ORANGE,
    ];

    /// Code reported for any colour outside the palette.
    pub const UNKNOWN_CODE: u32 = 5;

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }

    pub fn from_code(code: u32) -> Option<Color> {
        Self::PALETTE.get(code as usize).copied()
    }

    pub fn code(&self) -> u32 {
        Self::PALETTE
            .iter()
            .position(|c| c == self)
            .map(|i| i as u32)
            .unwrap_or(Self::UNKNOWN_CODE)
    }

    pub fn is_invisible(&self) -> bool {
        *self == Color::INVISIBLE
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.insert("r".into(), Value::from(self.r as i64));
        table.insert("g".into(), Value::from(self.g as i64));
        table.insert("b".into(), Value::from(self.b as i64));
        table.insert("a".into(), Value::from(self.a as i64));
        table
    }

    /// Reads `{r, g, b, a}`; every channel must be present and fit in a byte.
    pub fn from_table(table: &Table) -> Option<Color> {
        let channel = |key: &str| {
            table
                .get(key)
                .and_then(Value::as_int)
                .and_then(|v| u8::try_from(v).ok())
        };
        Some(Color {
            r: channel("r")?,
            g: channel("g")?,
            b: channel("b")?,
            a: channel("a")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Weapon {
    /// Gun when shooting, knife for assassin strikes.
    #[default]
    Melee = 0,
    Flashlight = 1,
    Umbrella = 2,
}

impl Weapon {
    pub fn from_id(id: i64) -> Option<Weapon> {
        match id {
            0 => Some(Weapon::Melee),
            1 => Some(Weapon::Flashlight),
            2 => Some(Weapon::Umbrella),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        self as i64
    }
}

/// Global world events announced through `EVENT_SUMMON`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Darkness = 0,
    Assassin = 1,
    Clear = 2,
    AcidRain = 3,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Darkness,
        EventKind::Assassin,
        EventKind::Clear,
        EventKind::AcidRain,
    ];

    pub fn from_id(id: i64) -> Option<EventKind> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn id(self) -> i64 {
        self as i64
    }
}

/// Reduces a user supplied name to an ASCII alphanumeric token of bounded length.
///
/// Names that end up empty fall back to [`DEFAULT_USERNAME`].
pub fn sanitize_username(raw: &str) -> String {
    let name: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_USERNAME_LEN)
        .collect();

    if name.is_empty() {
        DEFAULT_USERNAME.to_string()
    } else {
        name
    }
}

/// Maps any angle in degrees into `[0, 360)`.
pub fn normalize_rotation(rot: f32) -> f32 {
    let rot = rot % 360.0;
    if rot < 0.0 {
        // -1e-6 % 360 + 360 rounds to exactly 360.0
        (rot + 360.0) % 360.0
    } else {
        rot
    }
}
