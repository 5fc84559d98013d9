use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use linkvault_core::{Board, BoardId, Link, LinkId};
use linkvault_store_sqlite::{run_full_cleanup, validate, ArchiveLog, LinkStore};
use serde_json::Value;
use time::OffsetDateTime;
use ulid::Ulid;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "lv")]
#[command(about = "LinkVault CLI")]
struct Cli {
    #[arg(long, default_value = "./linkvault.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
    Link {
        #[command(subcommand)]
        command: Box<LinkCommand>,
    },
    Board {
        #[command(subcommand)]
        command: Box<BoardCommand>,
    },
    Conversation {
        #[command(subcommand)]
        command: Box<ConversationCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    Validate,
    Cleanup,
    Clear,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum LinkCommand {
    Add(LinkAddArgs),
    List,
    Get(LinkGetArgs),
    Delete(LinkDeleteArgs),
}

#[derive(Debug, Args)]
struct LinkAddArgs {
    #[arg(long)]
    url: String,
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long = "label")]
    labels: Vec<String>,
    #[arg(long)]
    board: Option<String>,
}

#[derive(Debug, Args)]
struct LinkGetArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
struct LinkDeleteArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Subcommand)]
enum BoardCommand {
    Add(BoardAddArgs),
    List,
}

#[derive(Debug, Args)]
struct BoardAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
}

#[derive(Debug, Subcommand)]
enum ConversationCommand {
    FindActive(ConversationLinksArgs),
    Start(ConversationStartArgs),
}

#[derive(Debug, Args)]
struct ConversationLinksArgs {
    #[arg(long = "link", required = true)]
    links: Vec<String>,
}

#[derive(Debug, Args)]
struct ConversationStartArgs {
    #[arg(long = "link", required = true)]
    links: Vec<String>,
    #[arg(long, default_value = "")]
    title: String,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn open_store(db: &Path) -> Result<LinkStore> {
    let archive_path = db.with_extension("deleted.ndjson");
    let store = LinkStore::open(db)?.with_archive(ArchiveLog::new(archive_path));
    Ok(store)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Db { command } => run_db(*command, &cli.db),
        Command::Link { command } => {
            let mut store = open_store(&cli.db)?;
            store.migrate()?;
            run_link(*command, &mut store)
        }
        Command::Board { command } => {
            let mut store = open_store(&cli.db)?;
            store.migrate()?;
            run_board(*command, &mut store)
        }
        Command::Conversation { command } => {
            let mut store = open_store(&cli.db)?;
            store.migrate()?;
            run_conversation(*command, &mut store)
        }
    }
}

fn run_db(command: DbCommand, db: &Path) -> Result<()> {
    let mut store = open_store(db)?;
    match command {
        DbCommand::SchemaVersion => run_db_schema_version(&store),
        DbCommand::Migrate(args) => run_db_migrate(&args, &mut store),
        DbCommand::Validate => run_db_validate(&mut store),
        DbCommand::Cleanup => run_db_cleanup(&mut store),
        DbCommand::Clear => run_db_clear(&mut store),
    }
}

fn run_db_schema_version(store: &LinkStore) -> Result<()> {
    let status = store.schema_status()?;
    emit_json(serde_json::json!({
        "current_version": status.current_version,
        "target_version": status.target_version,
        "pending_versions": status.pending_versions,
        "up_to_date": status.pending_versions.is_empty()
    }))
}

fn run_db_migrate(args: &DbMigrateArgs, store: &mut LinkStore) -> Result<()> {
    let before = store.schema_status()?;
    if args.dry_run {
        emit_json(serde_json::json!({
            "dry_run": true,
            "current_version": before.current_version,
            "target_version": before.target_version,
            "would_apply_versions": before.pending_versions
        }))?;
        return Ok(());
    }

    store.migrate()?;
    let after = store.schema_status()?;
    emit_json(serde_json::json!({
        "dry_run": false,
        "before_version": before.current_version,
        "applied_versions": before.pending_versions,
        "after_version": after.current_version,
        "target_version": after.target_version,
        "up_to_date": after.pending_versions.is_empty()
    }))
}

fn run_db_validate(store: &mut LinkStore) -> Result<()> {
    store.migrate()?;
    let report = validate(store);
    emit_json(serde_json::json!({
        "health": report.health().as_str(),
        "is_valid": report.is_valid(),
        "report": serde_json::to_value(&report).context("failed to serialize validation report")?
    }))
}

fn run_db_cleanup(store: &mut LinkStore) -> Result<()> {
    store.migrate()?;
    let report = run_full_cleanup(store);
    emit_json(serde_json::json!({
        "total_removed": report.total_removed(),
        "report": serde_json::to_value(&report).context("failed to serialize cleanup report")?
    }))
}

fn run_db_clear(store: &mut LinkStore) -> Result<()> {
    store.migrate()?;
    store.clear_all()?;
    let status = store.schema_status()?;
    emit_json(serde_json::json!({
        "status": "cleared",
        "current_version": status.current_version
    }))
}

fn run_link(command: LinkCommand, store: &mut LinkStore) -> Result<()> {
    match command {
        LinkCommand::Add(args) => {
            let now = OffsetDateTime::now_utc();
            let link = Link {
                id: LinkId::new(),
                url: args.url,
                title: args.title,
                description: args.description,
                labels: args.labels,
                board_id: args.board.as_deref().map(parse_board_id).transpose()?,
                created_at: now,
                updated_at: now,
            };
            store.add_link(&link)?;
            emit_json(serde_json::to_value(&link).context("failed to serialize link")?)
        }
        LinkCommand::List => {
            let links = store.list_links()?;
            emit_json(serde_json::json!({
                "count": links.len(),
                "links": links
            }))
        }
        LinkCommand::Get(args) => {
            let id = parse_link_id(&args.id)?;
            match store.get_link(id)? {
                Some(link) => emit_json(serde_json::json!({
                    "found": true,
                    "link": serde_json::to_value(&link).context("failed to serialize link")?
                })),
                None => emit_json(serde_json::json!({
                    "found": false,
                    "id": args.id
                })),
            }
        }
        LinkCommand::Delete(args) => {
            let id = parse_link_id(&args.id)?;
            store.delete_link_cascade(id)?;
            emit_json(serde_json::json!({
                "deleted": args.id
            }))
        }
    }
}

fn run_board(command: BoardCommand, store: &mut LinkStore) -> Result<()> {
    match command {
        BoardCommand::Add(args) => {
            let now = OffsetDateTime::now_utc();
            let board = Board {
                id: BoardId::new(),
                name: args.name,
                description: args.description,
                created_at: now,
                updated_at: now,
            };
            store.add_board(&board)?;
            emit_json(serde_json::to_value(&board).context("failed to serialize board")?)
        }
        BoardCommand::List => {
            let boards = store.list_boards()?;
            emit_json(serde_json::json!({
                "count": boards.len(),
                "boards": boards
            }))
        }
    }
}

fn run_conversation(command: ConversationCommand, store: &mut LinkStore) -> Result<()> {
    match command {
        ConversationCommand::FindActive(args) => {
            let link_ids = parse_link_ids(&args.links)?;
            match store.find_active_conversation(&link_ids)? {
                Some(conversation) => emit_json(serde_json::json!({
                    "found": true,
                    "conversation": serde_json::to_value(&conversation)
                        .context("failed to serialize conversation")?
                })),
                None => emit_json(serde_json::json!({
                    "found": false
                })),
            }
        }
        ConversationCommand::Start(args) => {
            let link_ids = parse_link_ids(&args.links)?;
            let conversation =
                store.find_or_create_active_conversation(&link_ids, &args.title)?;
            emit_json(
                serde_json::to_value(&conversation)
                    .context("failed to serialize conversation")?,
            )
        }
    }
}

fn parse_link_ids(raw: &[String]) -> Result<Vec<LinkId>> {
    raw.iter().map(|value| parse_link_id(value)).collect()
}

fn parse_link_id(value: &str) -> Result<LinkId> {
    let parsed = Ulid::from_string(value).with_context(|| format!("invalid ULID: {value}"))?;
    Ok(LinkId(parsed))
}

fn parse_board_id(value: &str) -> Result<BoardId> {
    let parsed = Ulid::from_string(value).with_context(|| format!("invalid ULID: {value}"))?;
    Ok(BoardId(parsed))
}
