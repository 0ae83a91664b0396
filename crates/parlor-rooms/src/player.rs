use chrono::Utc;
use parlor_schema::{SchemaBuilder, SchemaResult, Shape, Storable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role granting administrative operations.
pub const ADMIN_ROLE: &str = "admin";

/// A registered player.
///
/// `created` and `activity` are Unix timestamps in seconds; an `activity`
/// of zero marks a player that has never been saved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub login: String,
    pub email: String,
    pub avatar: String,
    pub created: i64,
    pub activity: i64,
    pub roles: Vec<String>,
}

impl Player {
    /// A new, unsaved player with a fresh time-ordered id.
    pub fn new(name: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            login: login.into(),
            created: Utc::now().timestamp(),
            ..Self::default()
        }
    }

    /// Stand-in for a player known only by id.
    pub fn reference(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }

    pub fn is_saved(&self) -> bool {
        self.activity != 0
    }
}

impl Storable for Player {
    fn type_name() -> &'static str {
        "Player"
    }

    fn describe(schema: &mut SchemaBuilder<'_>) -> SchemaResult<Shape> {
        Ok(Shape::Struct(vec![
            schema.string("id"),
            schema.string("name"),
            schema.string("login").unique().case_insensitive(),
            schema.string("email"),
            schema.string("avatar"),
            schema.int("created"),
            schema.int("activity").accessor("modified"),
            schema.array::<String>("roles")?.indexed(),
        ]))
    }
}
