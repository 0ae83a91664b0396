use chrono::Utc;
use parlor_schema::{
    DelegateError, DelegatedFields, SchemaBuilder, SchemaResult, Shape, Storable,
};
use parlor_types::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::Player;

/// State of a room before its game starts.
pub const STATE_WAITING: &str = "waiting";

/// Status of a member that has joined but not yet acted.
pub const STATUS_JOINED: &str = "joined";

/// A game room.
///
/// The owner and every member's player are stored by id only; loading a
/// room through the [`Lobby`](crate::Lobby) re-attaches the full players.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub state: String,
    pub game: Option<String>,
    #[serde(default)]
    pub owner: Option<Player>,
    pub members: Vec<RoomMember>,
    pub created: i64,
    pub activity: i64,
    pub round: i32,
    /// Per-round event log; kept in memory only.
    #[serde(default)]
    pub history: Vec<Vec<String>>,
}

/// A player's seat in a room.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomMember {
    pub index: i32,
    #[serde(default)]
    pub player: Option<Player>,
    pub status: String,
}

impl Room {
    /// A new, unsaved room owned (and joined) by `owner`.
    pub fn new(name: impl Into<String>, owner: &Player) -> Self {
        let mut room = Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            state: STATE_WAITING.to_string(),
            owner: Some(owner.clone()),
            created: Utc::now().timestamp(),
            ..Self::default()
        };
        room.join(owner);
        room
    }

    /// Seat `player`, unless already seated. Returns the seat index.
    pub fn join(&mut self, player: &Player) -> i32 {
        if let Some(member) = self.member(&player.id) {
            return member.index;
        }
        let index = self.members.iter().map(|m| m.index + 1).max().unwrap_or(0);
        self.members.push(RoomMember {
            index,
            player: Some(player.clone()),
            status: STATUS_JOINED.to_string(),
        });
        index
    }

    /// Remove `player_id` from the room. Returns whether it was seated.
    pub fn leave(&mut self, player_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.player_id() != Some(player_id));
        self.members.len() != before
    }

    pub fn member(&self, player_id: &str) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.player_id() == Some(player_id))
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner.as_ref().map(|p| p.id.as_str())
    }

    pub fn is_saved(&self) -> bool {
        self.activity != 0
    }

    pub fn next_round(&mut self) {
        self.round += 1;
        self.history.push(Vec::new());
    }
}

impl RoomMember {
    pub fn player_id(&self) -> Option<&str> {
        self.player.as_ref().map(|p| p.id.as_str())
    }
}

/// Store a player reference as its id; restore it as a [`Player::reference`].
fn player_id_value(player: Option<&Player>) -> Value {
    player
        .filter(|p| !p.id.is_empty())
        .map(|p| Value::from(p.id.as_str()))
        .unwrap_or_default()
}

fn player_from_value(accessor: &str, value: Value) -> Result<Option<Player>, DelegateError> {
    match value {
        Value::Str(id) if id.is_empty() => Ok(None),
        Value::Str(id) => Ok(Some(Player::reference(id))),
        Value::Absent => Ok(None),
        other => Err(DelegateError::InvalidValue {
            accessor: accessor.to_string(),
            reason: format!("expected a player id, found {}", other.kind_name()),
        }),
    }
}

impl Storable for Room {
    fn type_name() -> &'static str {
        "Room"
    }

    fn describe(schema: &mut SchemaBuilder<'_>) -> SchemaResult<Shape> {
        Ok(Shape::Struct(vec![
            schema.string("id"),
            schema.string("name"),
            schema.string("state").indexed(),
            schema.pointer::<String>("game")?,
            schema.delegated("owner").indexed(),
            schema.array::<RoomMember>("members")?,
            schema.int("created"),
            schema.int("activity"),
            schema.int_sized("round", 32),
            // `history` is not described, so it is never stored.
        ]))
    }

    fn delegate(&self) -> Option<&dyn DelegatedFields> {
        Some(self)
    }

    fn delegate_mut(&mut self) -> Option<&mut dyn DelegatedFields> {
        Some(self)
    }
}

impl DelegatedFields for Room {
    fn delegated_value(&self, accessor: &str) -> Result<Value, DelegateError> {
        match accessor {
            "owner" => Ok(player_id_value(self.owner.as_ref())),
            other => Err(DelegateError::UnknownField(other.to_string())),
        }
    }

    fn set_delegated_value(&mut self, accessor: &str, value: Value) -> Result<(), DelegateError> {
        match accessor {
            "owner" => {
                self.owner = player_from_value(accessor, value)?;
                Ok(())
            }
            other => Err(DelegateError::UnknownField(other.to_string())),
        }
    }
}

impl Storable for RoomMember {
    fn type_name() -> &'static str {
        "RoomMember"
    }

    fn describe(schema: &mut SchemaBuilder<'_>) -> SchemaResult<Shape> {
        Ok(Shape::Struct(vec![
            schema.int_sized("index", 32),
            schema.delegated("player").indexed(),
            schema.string("status"),
        ]))
    }

    fn delegate(&self) -> Option<&dyn DelegatedFields> {
        Some(self)
    }

    fn delegate_mut(&mut self) -> Option<&mut dyn DelegatedFields> {
        Some(self)
    }
}

impl DelegatedFields for RoomMember {
    fn delegated_value(&self, accessor: &str) -> Result<Value, DelegateError> {
        match accessor {
            "player" => Ok(player_id_value(self.player.as_ref())),
            other => Err(DelegateError::UnknownField(other.to_string())),
        }
    }

    fn set_delegated_value(&mut self, accessor: &str, value: Value) -> Result<(), DelegateError> {
        match accessor {
            "player" => {
                self.player = player_from_value(accessor, value)?;
                Ok(())
            }
            other => Err(DelegateError::UnknownField(other.to_string())),
        }
    }
}
