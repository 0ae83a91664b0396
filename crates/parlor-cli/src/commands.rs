use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use parlor_rooms::{Lobby, Player, Room};
use parlor_store::StoreConfig;
use parlor_types::Filter;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = store_config(cli.db.as_deref(), cli.config.as_deref())?;
    let path = config.resolved_path();
    debug!(path = %path.display(), "opening store");
    let lobby = Lobby::open(config)
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    let format = cli.format;

    match cli.command {
        Command::Buckets => cmd_buckets(&lobby, format),
        Command::Dump(args) => cmd_dump(&lobby, args, format),
        Command::Rebuild => cmd_rebuild(&lobby),
        Command::Player(args) => match args.action {
            PlayerAction::Add { name, login, roles, email } => {
                cmd_player_add(&lobby, name, login, roles, email, format)
            }
            PlayerAction::Find { login } => cmd_player_find(&lobby, &login, format),
            PlayerAction::List { filter } => cmd_player_list(&lobby, &filter, format),
            PlayerAction::Rm { id } => cmd_player_rm(&lobby, &id),
        },
        Command::Room(args) => match args.action {
            RoomAction::List { owner, member, filter } => {
                cmd_room_list(&lobby, owner, member, &filter, format)
            }
            RoomAction::Show { id } => cmd_room_show(&lobby, &id, format),
            RoomAction::Rm { id } => cmd_room_rm(&lobby, &id),
        },
    }
}

/// Load `config` when given, then let `db` override the database path.
pub fn store_config(db: Option<&Path>, config: Option<&Path>) -> anyhow::Result<StoreConfig> {
    let mut resolved = match config {
        Some(file) => StoreConfig::load(file)
            .with_context(|| format!("failed to load config {}", file.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(db) = db {
        resolved.path = db.to_path_buf();
    }
    Ok(resolved)
}

impl FilterArgs {
    pub fn to_filter(&self) -> Filter {
        let filter = match (&self.field, &self.mask) {
            (Some(field), Some(mask)) if self.seek => Filter::seek(field, mask),
            (Some(field), Some(mask)) => Filter::by(field, mask),
            _ => Filter::all(),
        };
        filter.with_limit(self.limit)
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_buckets(lobby: &Lobby, format: OutputFormat) -> anyhow::Result<()> {
    let buckets = lobby.store().buckets()?;
    if format == OutputFormat::Json {
        return print_json(&json!(buckets));
    }
    if buckets.is_empty() {
        println!("No buckets.");
    }
    for bucket in &buckets {
        let entries = lobby.store().raw_entries(bucket)?.len();
        println!("{:<32} {} entries", bucket.bold(), entries);
    }
    Ok(())
}

fn cmd_dump(lobby: &Lobby, args: DumpArgs, format: OutputFormat) -> anyhow::Result<()> {
    let entries = lobby.store().raw_entries(&args.bucket)?;
    if format == OutputFormat::Json {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .into_iter()
            .map(|(key, value)| {
                let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
                (key, value)
            })
            .collect();
        return print_json(&serde_json::Value::Object(map));
    }
    if entries.is_empty() {
        println!("Bucket {} is empty or missing.", args.bucket.yellow());
    }
    for (key, value) in entries {
        println!("{} {}", key.cyan(), value);
    }
    Ok(())
}

fn cmd_rebuild(lobby: &Lobby) -> anyhow::Result<()> {
    let count = lobby.rebuild_indexes()?;
    println!("{} Rebuilt indexes for {} records.", "✓".green().bold(), count.to_string().bold());
    Ok(())
}

fn cmd_player_add(
    lobby: &Lobby,
    name: String,
    login: String,
    roles: Vec<String>,
    email: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut player = roles
        .into_iter()
        .fold(Player::new(name, login), |player, role| player.with_role(role));
    if let Some(email) = email {
        player.email = email;
    }
    lobby.save_player(&mut player)?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::to_value(&player)?);
    }
    println!("{} Added player {} ({})", "✓".green().bold(), player.login.yellow(), player.id);
    Ok(())
}

fn cmd_player_find(lobby: &Lobby, login: &str, format: OutputFormat) -> anyhow::Result<()> {
    let player = lobby.find_player(login)?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::to_value(&player)?);
    }
    match player {
        Some(player) => print_player(&player),
        None => println!("No player with login {}.", login.yellow()),
    }
    Ok(())
}

fn cmd_player_list(lobby: &Lobby, filter: &FilterArgs, format: OutputFormat) -> anyhow::Result<()> {
    let players = lobby.players(&filter.to_filter())?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::to_value(&players)?);
    }
    if players.is_empty() {
        println!("No players.");
    }
    for player in &players {
        print_player(player);
    }
    Ok(())
}

fn cmd_player_rm(lobby: &Lobby, id: &str) -> anyhow::Result<()> {
    match lobby.delete_player(id)? {
        Some(player) => println!("{} Deleted player {}.", "✓".green().bold(), player.login.yellow()),
        None => println!("No player {}.", id.yellow()),
    }
    Ok(())
}

fn print_player(player: &Player) {
    let roles = if player.roles.is_empty() {
        String::new()
    } else {
        format!(" [{}]", player.roles.join(", "))
    };
    println!("{} {} <{}>{}", player.id.cyan(), player.name.bold(), player.login, roles);
}

fn cmd_room_list(
    lobby: &Lobby,
    owner: Option<String>,
    member: Option<String>,
    filter: &FilterArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut rooms = match (owner, member) {
        (Some(owner), _) => lobby.rooms_owned_by(&owner)?,
        (None, Some(member)) => lobby.rooms_with_member(&member)?,
        (None, None) => lobby.rooms(&filter.to_filter())?,
    };
    if filter.limit > 0 {
        rooms.truncate(filter.limit);
    }
    if format == OutputFormat::Json {
        return print_json(&serde_json::to_value(&rooms)?);
    }
    if rooms.is_empty() {
        println!("No rooms.");
    }
    for room in &rooms {
        println!(
            "{} {} ({}, {} members)",
            room.id.cyan(),
            room.name.bold(),
            room.state.yellow(),
            room.members.len()
        );
    }
    Ok(())
}

fn cmd_room_show(lobby: &Lobby, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let room = lobby.room(id)?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::to_value(&room)?);
    }
    let Some(room) = room else {
        println!("No room {}.", id.yellow());
        return Ok(());
    };
    print_room(&room);
    Ok(())
}

fn print_room(room: &Room) {
    println!("Room {} {}", room.name.bold(), room.id.cyan());
    println!("  State: {}", room.state.yellow());
    if let Some(game) = &room.game {
        println!("  Game: {}", game);
    }
    if let Some(owner) = &room.owner {
        println!("  Owner: {}", display_name(owner));
    }
    println!("  Round: {}", room.round);
    for member in &room.members {
        let who = member.player.as_ref().map(display_name).unwrap_or_else(|| "-".into());
        println!("  #{} {} {}", member.index, who, member.status.green());
    }
}

fn display_name(player: &Player) -> String {
    if player.login.is_empty() {
        format!("{} (missing)", player.id)
    } else {
        format!("{} <{}>", player.name, player.login)
    }
}

fn cmd_room_rm(lobby: &Lobby, id: &str) -> anyhow::Result<()> {
    if lobby.delete_room(id)? {
        println!("{} Deleted room {}.", "✓".green().bold(), id.yellow());
    } else {
        println!("No room {}.", id.yellow());
    }
    Ok(())
}
