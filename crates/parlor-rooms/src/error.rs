use parlor_store::StoreError;

/// Errors from lobby operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomsError {
    /// Another player already uses this login (compared case-insensitively).
    #[error("login already taken: {0}")]
    LoginTaken(String),

    /// The room refers to a player that is not stored.
    #[error("unknown player: {0}")]
    UnknownPlayer(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for lobby results.
pub type RoomsResult<T> = Result<T, RoomsError>;
