//! Append-only schema registry and the migration runner.
//!
//! Each registry entry is a *full* definition of every table and managed
//! index at that version, not a diff. Shipping a version freezes it: new
//! schema work is always a new appended entry. The runner walks every
//! pending version in order, one transaction per version, and refuses to
//! open a database written by a newer build.

use linkvault_core::{link_ids_key, LinkId, Settings, StoreError, SETTINGS_SINGLETON_ID};
use rusqlite::{params, Connection, Transaction};
use std::str::FromStr;
use time::OffsetDateTime;
use ulid::Ulid;

use crate::{now_rfc3339, parse_rfc3339, rfc3339, storage_err};

pub const LATEST_SCHEMA_VERSION: i64 = 9;

/// Indexes created by the runner carry this prefix so reconciliation can
/// tell them apart from SQLite-internal autoindexes.
const MANAGED_INDEX_PREFIX: &str = "idx_lv_";

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub name: &'static str,
    pub create_sql: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub create_sql: &'static str,
    pub indexes: &'static [IndexSpec],
}

#[derive(Clone, Copy)]
pub struct SchemaVersion {
    pub version: i64,
    pub tables: &'static [TableSpec],
    pub upgrade: Option<fn(&Transaction<'_>) -> Result<(), StoreError>>,
}

const CREATE_LINKS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS links (
  id TEXT PRIMARY KEY,
  url TEXT NOT NULL,
  title TEXT NOT NULL DEFAULT '',
  description TEXT NOT NULL DEFAULT '',
  labels_json TEXT NOT NULL DEFAULT '[]',
  board_id TEXT,
  created_at TEXT,
  updated_at TEXT
);
";

const CREATE_BOARDS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS boards (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  created_at TEXT,
  updated_at TEXT
);
";

const CREATE_SUMMARIES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS summaries (
  id TEXT PRIMARY KEY,
  link_id TEXT NOT NULL,
  content TEXT NOT NULL,
  model TEXT NOT NULL DEFAULT '',
  created_at TEXT,
  updated_at TEXT
);
";

const CREATE_CONVERSATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS conversations (
  id TEXT PRIMARY KEY,
  link_ids_json TEXT NOT NULL DEFAULT '[]',
  title TEXT NOT NULL DEFAULT '',
  ended_at TEXT,
  created_at TEXT,
  updated_at TEXT
);
";

const CREATE_CHAT_MESSAGES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS chat_messages (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL,
  link_id TEXT NOT NULL,
  role TEXT NOT NULL CHECK (role IN ('user','assistant')),
  content TEXT NOT NULL,
  created_at TEXT,
  updated_at TEXT
);
";

const CREATE_SETTINGS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS settings (
  id TEXT PRIMARY KEY,
  theme TEXT NOT NULL,
  ai_model TEXT NOT NULL,
  summary_language TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

const CREATE_TASKS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
  id TEXT PRIMARY KEY,
  title TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('open','done','dismissed')),
  link_id TEXT,
  due_at TEXT,
  created_at TEXT,
  updated_at TEXT
);
";

const CREATE_DOWNLOAD_EVENTS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS download_events (
  id TEXT PRIMARY KEY,
  url TEXT NOT NULL,
  link_id TEXT,
  occurred_at TEXT NOT NULL
);
";

const CREATE_EXTENSION_INSTALLATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS extension_installations (
  id TEXT PRIMARY KEY,
  browser TEXT NOT NULL,
  extension_version TEXT NOT NULL,
  installed_at TEXT NOT NULL,
  created_at TEXT,
  updated_at TEXT
);
";

// Early versions indexed the raw URL; version 6 stopped declaring it once
// duplicate detection moved to the canonical key, so the runner drops it.
const LINKS_V1: TableSpec = TableSpec {
    name: "links",
    create_sql: CREATE_LINKS_SQL,
    indexes: &[
        IndexSpec {
            name: "idx_lv_links_board_id",
            create_sql: "CREATE INDEX IF NOT EXISTS idx_lv_links_board_id ON links(board_id)",
        },
        IndexSpec {
            name: "idx_lv_links_url",
            create_sql: "CREATE INDEX IF NOT EXISTS idx_lv_links_url ON links(url)",
        },
    ],
};

const LINKS_V6: TableSpec = TableSpec {
    name: "links",
    create_sql: CREATE_LINKS_SQL,
    indexes: &[IndexSpec {
        name: "idx_lv_links_board_id",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_lv_links_board_id ON links(board_id)",
    }],
};

const BOARDS: TableSpec =
    TableSpec { name: "boards", create_sql: CREATE_BOARDS_SQL, indexes: &[] };

const SUMMARIES: TableSpec = TableSpec {
    name: "summaries",
    create_sql: CREATE_SUMMARIES_SQL,
    indexes: &[IndexSpec {
        name: "idx_lv_summaries_link_id",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_lv_summaries_link_id ON summaries(link_id)",
    }],
};

const CONVERSATIONS_V3: TableSpec =
    TableSpec { name: "conversations", create_sql: CREATE_CONVERSATIONS_SQL, indexes: &[] };

const CONVERSATIONS_V7: TableSpec = TableSpec {
    name: "conversations",
    create_sql: CREATE_CONVERSATIONS_SQL,
    indexes: &[
        IndexSpec {
            name: "idx_lv_conversations_link_ids_key",
            create_sql: "CREATE INDEX IF NOT EXISTS idx_lv_conversations_link_ids_key ON conversations(link_ids_key)",
        },
        IndexSpec {
            name: "idx_lv_conversations_ended_at",
            create_sql: "CREATE INDEX IF NOT EXISTS idx_lv_conversations_ended_at ON conversations(ended_at)",
        },
    ],
};

const CHAT_MESSAGES: TableSpec = TableSpec {
    name: "chat_messages",
    create_sql: CREATE_CHAT_MESSAGES_SQL,
    indexes: &[
        IndexSpec {
            name: "idx_lv_chat_messages_conversation_id",
            create_sql: "CREATE INDEX IF NOT EXISTS idx_lv_chat_messages_conversation_id ON chat_messages(conversation_id)",
        },
        IndexSpec {
            name: "idx_lv_chat_messages_link_id",
            create_sql: "CREATE INDEX IF NOT EXISTS idx_lv_chat_messages_link_id ON chat_messages(link_id)",
        },
    ],
};

const SETTINGS: TableSpec =
    TableSpec { name: "settings", create_sql: CREATE_SETTINGS_SQL, indexes: &[] };

const TASKS: TableSpec = TableSpec {
    name: "tasks",
    create_sql: CREATE_TASKS_SQL,
    indexes: &[IndexSpec {
        name: "idx_lv_tasks_status",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_lv_tasks_status ON tasks(status)",
    }],
};

const DOWNLOAD_EVENTS: TableSpec =
    TableSpec { name: "download_events", create_sql: CREATE_DOWNLOAD_EVENTS_SQL, indexes: &[] };

const EXTENSION_INSTALLATIONS: TableSpec = TableSpec {
    name: "extension_installations",
    create_sql: CREATE_EXTENSION_INSTALLATIONS_SQL,
    indexes: &[],
};

static REGISTRY: [SchemaVersion; 9] = [
    SchemaVersion { version: 1, tables: &[LINKS_V1, BOARDS], upgrade: None },
    SchemaVersion { version: 2, tables: &[LINKS_V1, BOARDS, SUMMARIES], upgrade: None },
    SchemaVersion {
        version: 3,
        tables: &[LINKS_V1, BOARDS, SUMMARIES, CONVERSATIONS_V3, CHAT_MESSAGES],
        upgrade: None,
    },
    SchemaVersion {
        version: 4,
        tables: &[LINKS_V1, BOARDS, SUMMARIES, CONVERSATIONS_V3, CHAT_MESSAGES, SETTINGS],
        upgrade: None,
    },
    SchemaVersion {
        version: 5,
        tables: &[LINKS_V1, BOARDS, SUMMARIES, CONVERSATIONS_V3, CHAT_MESSAGES, SETTINGS, TASKS],
        upgrade: None,
    },
    SchemaVersion {
        version: 6,
        tables: &[LINKS_V6, BOARDS, SUMMARIES, CONVERSATIONS_V3, CHAT_MESSAGES, SETTINGS, TASKS],
        upgrade: Some(upgrade_v6_backfill_link_board_timestamps),
    },
    SchemaVersion {
        version: 7,
        tables: &[LINKS_V6, BOARDS, SUMMARIES, CONVERSATIONS_V7, CHAT_MESSAGES, SETTINGS, TASKS],
        upgrade: Some(upgrade_v7_conversation_link_ids_key),
    },
    SchemaVersion {
        version: 8,
        tables: &[
            LINKS_V6,
            BOARDS,
            SUMMARIES,
            CONVERSATIONS_V7,
            CHAT_MESSAGES,
            SETTINGS,
            TASKS,
            DOWNLOAD_EVENTS,
        ],
        upgrade: None,
    },
    SchemaVersion {
        version: 9,
        tables: &[
            LINKS_V6,
            BOARDS,
            SUMMARIES,
            CONVERSATIONS_V7,
            CHAT_MESSAGES,
            SETTINGS,
            TASKS,
            DOWNLOAD_EVENTS,
            EXTENSION_INSTALLATIONS,
        ],
        upgrade: Some(upgrade_v9_backfill_summary_timestamps),
    },
];

#[must_use]
pub fn schema_versions() -> &'static [SchemaVersion] {
    &REGISTRY
}

/// Full table set at the latest version. Used by `clear_all` to rebuild the
/// store from scratch.
pub(crate) fn latest_tables() -> &'static [TableSpec] {
    REGISTRY[REGISTRY.len() - 1].tables
}

fn validate_registry(registry: &[SchemaVersion]) -> Result<(), StoreError> {
    let Some(first) = registry.first() else {
        return Err(StoreError::Migration("schema registry is empty".to_string()));
    };
    if first.version != 1 {
        return Err(StoreError::Migration(format!(
            "schema registry must start at version 1, found {}",
            first.version
        )));
    }
    for pair in registry.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(StoreError::Migration(format!(
                "schema registry versions must be strictly increasing: {} then {}",
                pair[0].version, pair[1].version
            )));
        }
    }
    Ok(())
}

/// Apply every pending schema version in ascending order, one transaction
/// per version. Fails fast when the on-disk version is newer than this
/// build's registry; any step error aborts the whole migration.
pub(crate) fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    run_migrations_up_to(conn, LATEST_SCHEMA_VERSION)
}

pub(crate) fn run_migrations_up_to(
    conn: &mut Connection,
    target_version: i64,
) -> Result<(), StoreError> {
    let registry = schema_versions();
    validate_registry(registry)?;

    conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
        .map_err(|err| storage_err("failed to create schema_migrations table", &err))?;

    let current = current_schema_version(conn)?;
    let latest = registry[registry.len() - 1].version;
    if current > latest {
        return Err(StoreError::Migration(format!(
            "on-disk schema version {current} is newer than supported version {latest}; \
             refusing to open"
        )));
    }

    for step in registry {
        if step.version <= current || step.version > target_version {
            continue;
        }
        apply_version(conn, step)
            .map_err(|err| StoreError::Migration(format!("version {} failed: {err}", step.version)))?;
    }

    if target_version >= 4 {
        ensure_settings_row(conn)?;
    }
    Ok(())
}

fn apply_version(conn: &mut Connection, step: &SchemaVersion) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|err| storage_err("failed to start migration transaction", &err))?;

    for table in step.tables {
        tx.execute_batch(table.create_sql)
            .map_err(|err| storage_err("failed to create table", &err))?;
    }

    // The upgrade callback runs before index creation: a version may index a
    // column its own callback adds (v7's link_ids_key).
    if let Some(upgrade) = step.upgrade {
        upgrade(&tx)?;
    }

    for table in step.tables {
        for index in table.indexes {
            tx.execute_batch(index.create_sql)
                .map_err(|err| storage_err("failed to create index", &err))?;
        }
        drop_undeclared_indexes(&tx, table)?;
    }

    let now = now_rfc3339()?;
    tx.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![step.version, now],
    )
    .map_err(|err| storage_err("failed to record migration version", &err))?;

    tx.commit().map_err(|err| storage_err("failed to commit migration version", &err))
}

/// A version spec is the complete index set for its tables: any managed
/// index present on disk but absent from the spec was dropped by a later
/// declaration, so remove it (data is untouched).
fn drop_undeclared_indexes(tx: &Transaction<'_>, table: &TableSpec) -> Result<(), StoreError> {
    let mut stmt = tx
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ?1 AND name LIKE ?2",
        )
        .map_err(|err| storage_err("failed to list table indexes", &err))?;
    let names = stmt
        .query_map(params![table.name, format!("{MANAGED_INDEX_PREFIX}%")], |row| {
            row.get::<_, String>(0)
        })
        .map_err(|err| storage_err("failed to read table indexes", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read table indexes", &err))?;

    for name in names {
        if table.indexes.iter().any(|index| index.name == name) {
            continue;
        }
        tx.execute_batch(&format!("DROP INDEX IF EXISTS {name}"))
            .map_err(|err| storage_err("failed to drop undeclared index", &err))?;
    }
    Ok(())
}

fn upgrade_v6_backfill_link_board_timestamps(tx: &Transaction<'_>) -> Result<(), StoreError> {
    backfill_timestamps(tx, "links")?;
    backfill_timestamps(tx, "boards")
}

fn upgrade_v7_conversation_link_ids_key(tx: &Transaction<'_>) -> Result<(), StoreError> {
    // Idempotent: the column guard tolerates a crash-and-retry re-open.
    if !table_has_column(tx, "conversations", "link_ids_key")? {
        tx.execute_batch("ALTER TABLE conversations ADD COLUMN link_ids_key TEXT")
            .map_err(|err| storage_err("failed to add link_ids_key column", &err))?;
    }
    backfill_link_ids_keys(tx)
}

fn upgrade_v9_backfill_summary_timestamps(tx: &Transaction<'_>) -> Result<(), StoreError> {
    backfill_timestamps(tx, "summaries")
}

/// Pure repair of one row's timestamp pair. Missing or unparseable values
/// degrade to the other member of the pair, then to `now`; the result always
/// satisfies `created_at <= updated_at`. Never errors.
pub(crate) fn normalize_timestamp_pair(
    created_at: Option<&str>,
    updated_at: Option<&str>,
    now: OffsetDateTime,
) -> (OffsetDateTime, OffsetDateTime) {
    let parsed_created = created_at.and_then(|raw| parse_rfc3339(raw).ok());
    let parsed_updated = updated_at.and_then(|raw| parse_rfc3339(raw).ok());

    let created = parsed_created.or(parsed_updated).unwrap_or(now);
    let mut updated = parsed_updated.unwrap_or(created);
    if updated < created {
        updated = created;
    }
    (created, updated)
}

fn backfill_timestamps(tx: &Transaction<'_>, table: &str) -> Result<(), StoreError> {
    let now = OffsetDateTime::now_utc();
    let mut fixes: Vec<(i64, String, String)> = Vec::new();

    {
        let mut stmt = tx
            .prepare(&format!("SELECT rowid, created_at, updated_at FROM {table}"))
            .map_err(|err| storage_err("failed to scan timestamp columns", &err))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(|err| storage_err("failed to scan timestamp columns", &err))?;

        for row in rows {
            let (rowid, created_raw, updated_raw) =
                row.map_err(|err| storage_err("failed to read timestamp row", &err))?;
            let (created, updated) = normalize_timestamp_pair(
                created_raw.as_deref(),
                updated_raw.as_deref(),
                now,
            );
            let created_text = rfc3339(created)?;
            let updated_text = rfc3339(updated)?;
            if created_raw.as_deref() != Some(created_text.as_str())
                || updated_raw.as_deref() != Some(updated_text.as_str())
            {
                fixes.push((rowid, created_text, updated_text));
            }
        }
    }

    for (rowid, created, updated) in fixes {
        tx.execute(
            &format!("UPDATE {table} SET created_at = ?1, updated_at = ?2 WHERE rowid = ?3"),
            params![created, updated, rowid],
        )
        .map_err(|err| storage_err("failed to backfill timestamps", &err))?;
    }
    Ok(())
}

fn backfill_link_ids_keys(tx: &Transaction<'_>) -> Result<(), StoreError> {
    let mut fixes: Vec<(i64, String)> = Vec::new();

    {
        let mut stmt = tx
            .prepare(
                "SELECT rowid, link_ids_json FROM conversations
                 WHERE link_ids_key IS NULL OR link_ids_key = ''",
            )
            .map_err(|err| storage_err("failed to scan conversations for key backfill", &err))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(|err| storage_err("failed to scan conversations for key backfill", &err))?;

        for row in rows {
            let (rowid, raw_json) =
                row.map_err(|err| storage_err("failed to read conversation row", &err))?;
            fixes.push((rowid, derive_link_ids_key(&raw_json)));
        }
    }

    for (rowid, key) in fixes {
        tx.execute(
            "UPDATE conversations SET link_ids_key = ?1 WHERE rowid = ?2",
            params![key, rowid],
        )
        .map_err(|err| storage_err("failed to backfill link_ids_key", &err))?;
    }
    Ok(())
}

/// Pure old-row -> new-row derivation for the v7 backfill. Tolerant:
/// unreadable JSON or non-ULID entries are skipped rather than aborting the
/// migration.
fn derive_link_ids_key(link_ids_json: &str) -> String {
    let raw_ids: Vec<String> = serde_json::from_str(link_ids_json).unwrap_or_default();
    let ids = raw_ids
        .iter()
        .filter_map(|raw| Ulid::from_str(raw).ok().map(LinkId))
        .collect::<Vec<_>>();
    link_ids_key(&ids)
}

fn ensure_settings_row(conn: &Connection) -> Result<(), StoreError> {
    let initial = Settings::initial(OffsetDateTime::now_utc());
    conn.execute(
        "INSERT OR IGNORE INTO settings(id, theme, ai_model, summary_language, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            SETTINGS_SINGLETON_ID,
            initial.theme,
            initial.ai_model,
            initial.summary_language,
            rfc3339(initial.updated_at)?,
        ],
    )
    .map_err(|err| storage_err("failed to seed settings singleton", &err))?;
    Ok(())
}

pub(crate) fn current_schema_version(conn: &Connection) -> Result<i64, StoreError> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(|err| storage_err("failed to read current schema version", &err))
}

pub(crate) fn table_exists(conn: &Connection, table_name: &str) -> Result<bool, StoreError> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .map_err(|err| storage_err("failed to check table existence", &err))?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<bool, StoreError> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }

    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|err| storage_err("failed to inspect table_info", &err))?;
    let mut rows =
        stmt.query([]).map_err(|err| storage_err("failed to inspect table_info", &err))?;

    while let Some(row) =
        rows.next().map_err(|err| storage_err("failed to inspect table_info", &err))?
    {
        let name: String =
            row.get(1).map_err(|err| storage_err("failed to inspect table_info", &err))?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
