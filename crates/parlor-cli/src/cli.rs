use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "parlor",
    about = "Parlor - inspect and maintain an indexed object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Database file (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// TOML store configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every bucket in the database
    Buckets,
    /// Print the raw entries of one bucket
    Dump(DumpArgs),
    /// Rebuild the indexes of every known type
    Rebuild,
    /// Manage players
    Player(PlayerArgs),
    /// Inspect and delete rooms
    Room(RoomArgs),
}

#[derive(Args)]
pub struct DumpArgs {
    /// Bucket name, e.g. `Player` or `idx_Player.login`
    pub bucket: String,
}

#[derive(Args)]
pub struct PlayerArgs {
    #[command(subcommand)]
    pub action: PlayerAction,
}

#[derive(Subcommand)]
pub enum PlayerAction {
    /// Register a new player
    Add {
        name: String,
        login: String,
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Look a player up by login (case-insensitive)
    Find { login: String },
    /// List players, optionally filtered by an indexed field
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Delete a player by id
    Rm { id: String },
}

#[derive(Args)]
pub struct RoomArgs {
    #[command(subcommand)]
    pub action: RoomAction,
}

#[derive(Subcommand)]
pub enum RoomAction {
    /// List rooms
    List {
        /// Only rooms owned by this player id
        #[arg(long, conflicts_with = "member")]
        owner: Option<String>,
        /// Only rooms seating this player id
        #[arg(long)]
        member: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show one room with its members
    Show { id: String },
    /// Delete a room by id
    Rm { id: String },
}

#[derive(Args, Clone, Debug, Default)]
pub struct FilterArgs {
    /// Indexed field (or dotted path) to filter on
    #[arg(long, requires = "mask")]
    pub field: Option<String>,
    /// Value to match, or prefix with --seek
    #[arg(long)]
    pub mask: Option<String>,
    /// Match on prefix instead of the whole value
    #[arg(long)]
    pub seek: bool,
    /// Maximum number of results (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
}
