//! The closed set of messages exchanged between clients and the server.
//!
//! Each message kind has a fixed tag and a fixed netvent schema. Client bound
//! and server bound messages live in separate enums so a handler can only
//! ever match on what the other side is allowed to send.

use crate::framing;
use crate::netvent::{self, NetventError, Table, Value};
use crate::{Color, EventKind, Weapon};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    GameState = 0,
    ClientId = 1,
    PlayerMove = 2,
    PlayerNew = 3,
    PlayerLeft = 4,
    PlayerUpdate = 5,
    ColorChange = 6,
    BulletShot = 10,
    EventSummon = 11,
    SwitchWeapon = 12,
    AssassinChange = 15,
    BulletDespawn = 16,
    UmbrellaShoot = 17,
    UmbrellaStop = 18,
}

impl MessageKind {
    const ALL: [MessageKind; 14] = [
        MessageKind::GameState,
        MessageKind::ClientId,
        MessageKind::PlayerMove,
        MessageKind::PlayerNew,
        MessageKind::PlayerLeft,
        MessageKind::PlayerUpdate,
        MessageKind::ColorChange,
        MessageKind::BulletShot,
        MessageKind::EventSummon,
        MessageKind::SwitchWeapon,
        MessageKind::AssassinChange,
        MessageKind::BulletDespawn,
        MessageKind::UmbrellaShoot,
        MessageKind::UmbrellaStop,
    ];

    pub fn from_tag(tag: i64) -> Option<MessageKind> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn tag(self) -> i64 {
        self as i64
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Netvent(#[from] NetventError),
    #[error("unknown message tag {0}")]
    UnknownTag(i64),
    #[error("{0:?} is not accepted in this direction")]
    UnexpectedKind(MessageKind),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has the wrong type or is out of range")]
    InvalidField(&'static str),
}

/// Typed read access to a payload table.
struct Fields<'a>(&'a Table);

impl<'a> Fields<'a> {
    fn get(&self, key: &'static str) -> Result<&'a Value, ProtocolError> {
        self.0.get(key).ok_or(ProtocolError::MissingField(key))
    }

    fn int(&self, key: &'static str) -> Result<i64, ProtocolError> {
        self.get(key)?
            .as_int()
            .ok_or(ProtocolError::InvalidField(key))
    }

    fn id(&self, key: &'static str) -> Result<u32, ProtocolError> {
        u32::try_from(self.int(key)?).map_err(|_| ProtocolError::InvalidField(key))
    }

    /// Coordinates are integral game units; fractional input is rounded.
    fn coord(&self, key: &'static str) -> Result<i32, ProtocolError> {
        let value = self.float64(key)?.round();
        if value >= i32::MIN as f64 && value <= i32::MAX as f64 {
            Ok(value as i32)
        } else {
            Err(ProtocolError::InvalidField(key))
        }
    }

    fn float64(&self, key: &'static str) -> Result<f64, ProtocolError> {
        self.get(key)?
            .as_float()
            .filter(|v| v.is_finite())
            .ok_or(ProtocolError::InvalidField(key))
    }

    fn float(&self, key: &'static str) -> Result<f32, ProtocolError> {
        Ok(self.float64(key)? as f32)
    }

    fn string(&self, key: &'static str) -> Result<String, ProtocolError> {
        self.get(key)?
            .as_str()
            .map(str::to_string)
            .ok_or(ProtocolError::InvalidField(key))
    }

    fn table(&self, key: &'static str) -> Result<&'a Table, ProtocolError> {
        self.get(key)?
            .as_table()
            .ok_or(ProtocolError::InvalidField(key))
    }

    fn color(&self, key: &'static str) -> Result<Color, ProtocolError> {
        Color::from_table(self.table(key)?).ok_or(ProtocolError::InvalidField(key))
    }

    fn weapon(&self, key: &'static str) -> Result<Weapon, ProtocolError> {
        Weapon::from_id(self.int(key)?).ok_or(ProtocolError::InvalidField(key))
    }

    fn event(&self, key: &'static str) -> Result<EventKind, ProtocolError> {
        EventKind::from_id(self.int(key)?).ok_or(ProtocolError::InvalidField(key))
    }

    fn bool_or(&self, key: &'static str, default: bool) -> Result<bool, ProtocolError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(value) => value.as_bool().ok_or(ProtocolError::InvalidField(key)),
        }
    }

    fn float_or(&self, key: &'static str, default: f32) -> Result<f32, ProtocolError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(_) => self.float(key),
        }
    }
}

fn table<const N: usize>(entries: [(&str, Value); N]) -> Table {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// One roster entry as seen by clients.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub rot: f32,
    pub username: String,
    pub color: Color,
    pub weapon: Weapon,
    pub is_shooting: bool,
}

impl PlayerInfo {
    pub fn to_table(&self) -> Table {
        table([
            ("id", Value::from(self.id)),
            ("x", Value::from(self.x)),
            ("y", Value::from(self.y)),
            ("rot", Value::from(self.rot)),
            ("username", Value::from(self.username.as_str())),
            ("color", Value::from(self.color.to_table())),
            ("weapon_id", Value::from(self.weapon.id())),
            ("is_shooting", Value::from(self.is_shooting)),
        ])
    }

    pub fn from_table(data: &Table) -> Result<Self, ProtocolError> {
        let f = Fields(data);
        Ok(PlayerInfo {
            id: f.id("id")?,
            x: f.coord("x")?,
            y: f.coord("y")?,
            rot: f.float_or("rot", 0.0)?,
            username: f.string("username")?,
            color: f.color("color")?,
            weapon: f.weapon("weapon_id")?,
            is_shooting: f.bool_or("is_shooting", false)?,
        })
    }
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Move { x: i32, y: i32, rot: f32 },
    PlayerUpdate { username: String, color: Color },
    ColorChange { color_code: u32 },
    /// The pose fields are the client's prediction; the server spawns from its own record.
    BulletShot { x: i32, y: i32, rot: f32 },
    SwitchWeapon { weapon: Weapon },
    UmbrellaShoot { rot: f32 },
    UmbrellaStop,
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::Move { .. } => MessageKind::PlayerMove,
            ClientMessage::PlayerUpdate { .. } => MessageKind::PlayerUpdate,
            ClientMessage::ColorChange { .. } => MessageKind::ColorChange,
            ClientMessage::BulletShot { .. } => MessageKind::BulletShot,
            ClientMessage::SwitchWeapon { .. } => MessageKind::SwitchWeapon,
            ClientMessage::UmbrellaShoot { .. } => MessageKind::UmbrellaShoot,
            ClientMessage::UmbrellaStop => MessageKind::UmbrellaStop,
        }
    }

    pub fn to_table(&self) -> Table {
        match self {
            ClientMessage::Move { x, y, rot } => table([
                ("x", Value::from(*x)),
                ("y", Value::from(*y)),
                ("rot", Value::from(*rot)),
            ]),
            ClientMessage::PlayerUpdate { username, color } => table([
                ("username", Value::from(username.as_str())),
                ("color", Value::from(color.to_table())),
            ]),
            ClientMessage::ColorChange { color_code } => {
                table([("color_code", Value::from(*color_code))])
            }
            ClientMessage::BulletShot { x, y, rot } => table([
                ("x", Value::from(*x)),
                ("y", Value::from(*y)),
                ("rot", Value::from(*rot)),
            ]),
            ClientMessage::SwitchWeapon { weapon } => {
                table([("weapon_id", Value::from(weapon.id()))])
            }
            ClientMessage::UmbrellaShoot { rot } => table([("rot", Value::from(*rot))]),
            ClientMessage::UmbrellaStop => Table::new(),
        }
    }

    pub fn from_netvent(tag: i64, data: &Table) -> Result<Self, ProtocolError> {
        let kind = MessageKind::from_tag(tag).ok_or(ProtocolError::UnknownTag(tag))?;
        let f = Fields(data);
        let message = match kind {
            MessageKind::PlayerMove => ClientMessage::Move {
                x: f.coord("x")?,
                y: f.coord("y")?,
                rot: f.float("rot")?,
            },
            MessageKind::PlayerUpdate => ClientMessage::PlayerUpdate {
                username: f.string("username")?,
                color: f.color("color")?,
            },
            MessageKind::ColorChange => ClientMessage::ColorChange {
                color_code: f.id("color_code")?,
            },
            MessageKind::BulletShot => ClientMessage::BulletShot {
                x: f.coord("x")?,
                y: f.coord("y")?,
                rot: f.float("rot")?,
            },
            MessageKind::SwitchWeapon => ClientMessage::SwitchWeapon {
                weapon: f.weapon("weapon_id")?,
            },
            MessageKind::UmbrellaShoot => ClientMessage::UmbrellaShoot {
                rot: f.float("rot")?,
            },
            MessageKind::UmbrellaStop => ClientMessage::UmbrellaStop,
            other => return Err(ProtocolError::UnexpectedKind(other)),
        };
        Ok(message)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(netvent::serialize(self.kind().tag(), &self.to_table())?)
    }

    /// Encoded message with the frame terminator appended.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(framing::frame(&self.encode()?))
    }

    pub fn decode(message: &str) -> Result<Self, ProtocolError> {
        let (tag, data) = netvent::deserialize(message)?;
        Self::from_netvent(tag, &data)
    }
}

/// Messages the server sends to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    GameState { players: Vec<PlayerInfo> },
    ClientId { id: u32 },
    PlayerMove { id: u32, x: i32, y: i32, rot: f32 },
    PlayerNew(PlayerInfo),
    PlayerLeft { id: u32 },
    PlayerUpdate { id: u32, username: String, color: Color },
    ColorChange { player_id: u32, color_code: u32 },
    BulletShot {
        player_id: u32,
        bullet_id: u32,
        x: i32,
        y: i32,
        rot: f32,
    },
    BulletDespawn { bullet_id: u32 },
    EventSummon { event: EventKind },
    AssassinChange { assassin_id: u32, target_id: u32 },
    SwitchWeapon { player_id: u32, weapon: Weapon },
    UmbrellaShoot { player_id: u32, rot: f32 },
    UmbrellaStop { player_id: u32 },
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::GameState { .. } => MessageKind::GameState,
            ServerMessage::ClientId { .. } => MessageKind::ClientId,
            ServerMessage::PlayerMove { .. } => MessageKind::PlayerMove,
            ServerMessage::PlayerNew(_) => MessageKind::PlayerNew,
            ServerMessage::PlayerLeft { .. } => MessageKind::PlayerLeft,
            ServerMessage::PlayerUpdate { .. } => MessageKind::PlayerUpdate,
            ServerMessage::ColorChange { .. } => MessageKind::ColorChange,
            ServerMessage::BulletShot { .. } => MessageKind::BulletShot,
            ServerMessage::BulletDespawn { .. } => MessageKind::BulletDespawn,
            ServerMessage::EventSummon { .. } => MessageKind::EventSummon,
            ServerMessage::AssassinChange { .. } => MessageKind::AssassinChange,
            ServerMessage::SwitchWeapon { .. } => MessageKind::SwitchWeapon,
            ServerMessage::UmbrellaShoot { .. } => MessageKind::UmbrellaShoot,
            ServerMessage::UmbrellaStop { .. } => MessageKind::UmbrellaStop,
        }
    }

    pub fn to_table(&self) -> Table {
        match self {
            ServerMessage::GameState { players } => {
                let roster: Table = players
                    .iter()
                    .map(|p| (p.id.to_string(), Value::from(p.to_table())))
                    .collect();
                table([("players", Value::from(roster))])
            }
            ServerMessage::ClientId { id } => table([("id", Value::from(*id))]),
            ServerMessage::PlayerMove { id, x, y, rot } => table([
                ("id", Value::from(*id)),
                ("x", Value::from(*x)),
                ("y", Value::from(*y)),
                ("rot", Value::from(*rot)),
            ]),
            ServerMessage::PlayerNew(info) => info.to_table(),
            ServerMessage::PlayerLeft { id } => table([("id", Value::from(*id))]),
            ServerMessage::PlayerUpdate {
                id,
                username,
                color,
            } => table([
                ("id", Value::from(*id)),
                ("username", Value::from(username.as_str())),
                ("color", Value::from(color.to_table())),
            ]),
            ServerMessage::ColorChange {
                player_id,
                color_code,
            } => table([
                ("player_id", Value::from(*player_id)),
                ("color_code", Value::from(*color_code)),
            ]),
            ServerMessage::BulletShot {
                player_id,
                bullet_id,
                x,
                y,
                rot,
            } => table([
                ("player_id", Value::from(*player_id)),
                ("bullet_id", Value::from(*bullet_id)),
                ("x", Value::from(*x)),
                ("y", Value::from(*y)),
                ("rot", Value::from(*rot)),
            ]),
            ServerMessage::BulletDespawn { bullet_id } => {
                table([("bullet_id", Value::from(*bullet_id))])
            }
            ServerMessage::EventSummon { event } => {
                table([("event_type", Value::from(event.id()))])
            }
            ServerMessage::AssassinChange {
                assassin_id,
                target_id,
            } => table([
                ("assassin_id", Value::from(*assassin_id)),
                ("target_id", Value::from(*target_id)),
            ]),
            ServerMessage::SwitchWeapon { player_id, weapon } => table([
                ("player_id", Value::from(*player_id)),
                ("weapon_id", Value::from(weapon.id())),
            ]),
            ServerMessage::UmbrellaShoot { player_id, rot } => table([
                ("player_id", Value::from(*player_id)),
                ("rot", Value::from(*rot)),
            ]),
            ServerMessage::UmbrellaStop { player_id } => {
                table([("player_id", Value::from(*player_id))])
            }
        }
    }

    pub fn from_netvent(tag: i64, data: &Table) -> Result<Self, ProtocolError> {
        let kind = MessageKind::from_tag(tag).ok_or(ProtocolError::UnknownTag(tag))?;
        let f = Fields(data);
        let message = match kind {
            MessageKind::GameState => {
                let mut players = f
                    .table("players")?
                    .values()
                    .map(|entry| {
                        entry
                            .as_table()
                            .ok_or(ProtocolError::InvalidField("players"))
                            .and_then(PlayerInfo::from_table)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                players.sort_by_key(|p| p.id);
                ServerMessage::GameState { players }
            }
            MessageKind::ClientId => ServerMessage::ClientId { id: f.id("id")? },
            MessageKind::PlayerMove => ServerMessage::PlayerMove {
                id: f.id("id")?,
                x: f.coord("x")?,
                y: f.coord("y")?,
                rot: f.float("rot")?,
            },
            MessageKind::PlayerNew => ServerMessage::PlayerNew(PlayerInfo::from_table(data)?),
            MessageKind::PlayerLeft => ServerMessage::PlayerLeft { id: f.id("id")? },
            MessageKind::PlayerUpdate => ServerMessage::PlayerUpdate {
                id: f.id("id")?,
                username: f.string("username")?,
                color: f.color("color")?,
            },
            MessageKind::ColorChange => ServerMessage::ColorChange {
                player_id: f.id("player_id")?,
                color_code: f.id("color_code")?,
            },
            MessageKind::BulletShot => ServerMessage::BulletShot {
                player_id: f.id("player_id")?,
                bullet_id: f.id("bullet_id")?,
                x: f.coord("x")?,
                y: f.coord("y")?,
                rot: f.float("rot")?,
            },
            MessageKind::BulletDespawn => ServerMessage::BulletDespawn {
                bullet_id: f.id("bullet_id")?,
            },
            MessageKind::EventSummon => ServerMessage::EventSummon {
                event: f.event("event_type")?,
            },
            MessageKind::AssassinChange => ServerMessage::AssassinChange {
                assassin_id: f.id("assassin_id")?,
                target_id: f.id("target_id")?,
            },
            MessageKind::SwitchWeapon => ServerMessage::SwitchWeapon {
                player_id: f.id("player_id")?,
                weapon: f.weapon("weapon_id")?,
            },
            MessageKind::UmbrellaShoot => ServerMessage::UmbrellaShoot {
                player_id: f.id("player_id")?,
                rot: f.float("rot")?,
            },
            MessageKind::UmbrellaStop => ServerMessage::UmbrellaStop {
                player_id: f.id("player_id")?,
            },
        };
        Ok(message)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(netvent::serialize(self.kind().tag(), &self.to_table())?)
    }

    /// Encoded message with the frame terminator appended.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(framing::frame(&self.encode()?))
    }

    pub fn decode(message: &str) -> Result<Self, ProtocolError> {
        let (tag, data) = netvent::deserialize(message)?;
        Self::from_netvent(tag, &data)
    }
}
