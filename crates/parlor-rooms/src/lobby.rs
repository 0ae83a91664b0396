//! Repository over the player and room buckets.

use std::sync::Arc;

use chrono::Utc;
use parlor_store::{Store, StoreConfig, StoreError};
use parlor_types::Filter;
use tracing::{debug, warn};

use crate::error::{RoomsError, RoomsResult};
use crate::player::Player;
use crate::room::Room;

/// Player and room persistence for the game server.
#[derive(Clone, Debug)]
pub struct Lobby {
    store: Arc<Store>,
}

impl Lobby {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Open a store for `config` and wrap it.
    pub fn open(config: StoreConfig) -> RoomsResult<Self> {
        Ok(Self::new(Arc::new(Store::open(config)?)))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ---------------------------------------------------------------
    // Players
    // ---------------------------------------------------------------

    /// Create the player on its first save, update it afterwards. Either
    /// way its activity time is stamped.
    pub fn save_player(&self, player: &mut Player) -> RoomsResult<()> {
        let create = !player.is_saved();
        let previous = player.activity;
        player.activity = Utc::now().timestamp().max(1);
        let result = if create {
            debug!(id = %player.id, login = %player.login, "creating player");
            self.store.create(&player.id, &*player)
        } else {
            debug!(id = %player.id, "updating player");
            self.store.update(&player.id, &*player)
        };
        if let Err(err) = result {
            player.activity = previous;
            return Err(login_conflict(err, &player.login));
        }
        Ok(())
    }

    pub fn player(&self, id: &str) -> RoomsResult<Option<Player>> {
        Ok(self.store.get(id)?)
    }

    /// The player whose login matches, ignoring case. The login index is
    /// unique and folded, so the lookup yields at most one player.
    pub fn find_player(&self, login: &str) -> RoomsResult<Option<Player>> {
        let found = self.store.list::<Player>(&Filter::by("login", login).with_limit(1))?;
        Ok(found.into_iter().next())
    }

    /// Players matching `filter`, sorted by name then login.
    pub fn players(&self, filter: &Filter) -> RoomsResult<Vec<Player>> {
        let mut players = self.store.list::<Player>(filter)?;
        players.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.login.cmp(&b.login)));
        Ok(players)
    }

    /// Delete a player. Returns the deleted record, if there was one.
    pub fn delete_player(&self, id: &str) -> RoomsResult<Option<Player>> {
        let Some(player) = self.player(id)? else {
            return Ok(None);
        };
        self.store.delete::<Player>(id)?;
        debug!(id, login = %player.login, "player deleted");
        Ok(Some(player))
    }

    // ---------------------------------------------------------------
    // Rooms
    // ---------------------------------------------------------------

    /// Create the room on its first save, update it afterwards. The owner
    /// and every member must be stored players.
    pub fn save_room(&self, room: &mut Room) -> RoomsResult<()> {
        let referenced = room
            .owner_id()
            .into_iter()
            .chain(room.members.iter().filter_map(|m| m.player_id()));
        for id in referenced {
            if self.player(id)?.is_none() {
                return Err(RoomsError::UnknownPlayer(id.to_string()));
            }
        }

        let create = !room.is_saved();
        room.activity = Utc::now().timestamp().max(1);
        if create {
            debug!(id = %room.id, name = %room.name, "creating room");
            self.store.create(&room.id, &*room)?;
        } else {
            debug!(id = %room.id, "updating room");
            self.store.update(&room.id, &*room)?;
        }
        Ok(())
    }

    /// Load a room with its owner and members re-attached.
    pub fn room(&self, id: &str) -> RoomsResult<Option<Room>> {
        let Some(mut room) = self.store.get::<Room>(id)? else {
            return Ok(None);
        };
        self.hydrate(&mut room)?;
        Ok(Some(room))
    }

    /// Rooms matching `filter`, most recently active first.
    pub fn rooms(&self, filter: &Filter) -> RoomsResult<Vec<Room>> {
        let mut rooms = self.store.list::<Room>(filter)?;
        for room in &mut rooms {
            self.hydrate(room)?;
        }
        rooms.sort_by(|a, b| b.activity.cmp(&a.activity).then_with(|| a.id.cmp(&b.id)));
        Ok(rooms)
    }

    pub fn rooms_owned_by(&self, player_id: &str) -> RoomsResult<Vec<Room>> {
        self.rooms(&Filter::by("owner", player_id))
    }

    pub fn rooms_with_member(&self, player_id: &str) -> RoomsResult<Vec<Room>> {
        self.rooms(&Filter::by("members.player", player_id))
    }

    pub fn delete_room(&self, id: &str) -> RoomsResult<bool> {
        Ok(self.store.delete::<Room>(id)?)
    }

    /// Rebuild the player and room indexes. Returns the records re-indexed.
    pub fn rebuild_indexes(&self) -> RoomsResult<usize> {
        let players = self.store.rebuild_indexes::<Player>()?;
        let rooms = self.store.rebuild_indexes::<Room>()?;
        Ok(players + rooms)
    }

    /// Replace player references with the stored players.
    fn hydrate(&self, room: &mut Room) -> RoomsResult<()> {
        if let Some(owner) = room.owner.as_mut() {
            attach(self, owner)?;
        }
        for member in &mut room.members {
            if let Some(player) = member.player.as_mut() {
                attach(self, player)?;
            }
        }
        Ok(())
    }
}

fn attach(lobby: &Lobby, reference: &mut Player) -> RoomsResult<()> {
    match lobby.player(&reference.id)? {
        Some(stored) => *reference = stored,
        None => warn!(id = %reference.id, "room refers to a missing player"),
    }
    Ok(())
}

fn login_conflict(err: StoreError, login: &str) -> RoomsError {
    if err.is_constraint_violation() {
        RoomsError::LoginTaken(login.to_string())
    } else {
        RoomsError::Store(err)
    }
}
