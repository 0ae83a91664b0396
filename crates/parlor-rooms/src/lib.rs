//! Player and room records for the Parlor game server.
//!
//! Rooms refer to players through delegated fields: a room's owner and each
//! member's player are stored as player ids and indexed, so the
//! [`Lobby`] can answer "rooms owned by" and "rooms with member" through
//! index lookups and re-attach the stored players on load.

pub mod error;
pub mod lobby;
pub mod player;
pub mod room;

pub use error::{RoomsError, RoomsResult};
pub use lobby::Lobby;
pub use player::{Player, ADMIN_ROLE};
pub use room::{Room, RoomMember, STATE_WAITING, STATUS_JOINED};
