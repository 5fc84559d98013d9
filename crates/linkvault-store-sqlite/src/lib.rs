//! SQLite-backed store for the link vault: typed CRUD facades, cascading
//! deletes, the versioned schema/migration engine, the consistency
//! validator, and the duplicate/orphan repair engine.
//!
//! Referential integrity across tables is owned by this layer (see
//! [`validate`] and [`run_full_cleanup`]), not by SQLite foreign keys: the
//! store must be able to hold, report, and repair dangling references
//! rather than reject them at write time.

use std::path::Path;

use linkvault_core::{
    link_ids_key, ArchivedLink, Board, BoardId, ChatMessage, ChatRole, Conversation,
    ConversationId, DownloadEvent, DownloadId, ExtensionInstallation, InstallationId, Link,
    LinkId, MessageId, Settings, StoreError, Summary, SummaryId, Task, TaskId, TaskStatus,
    SETTINGS_SINGLETON_ID,
};
use rusqlite::{params, Connection, OptionalExtension, Params};
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;
use ulid::Ulid;

mod archive;
mod schema;
mod validate;

pub use archive::{ArchiveLog, ARCHIVE_CAPACITY};
pub use schema::{schema_versions, IndexSpec, SchemaVersion, TableSpec, LATEST_SCHEMA_VERSION};
pub use validate::{
    run_full_cleanup, validate, CleanupReport, DuplicateGroup, HealthStatus, InvalidRow,
    ValidationReport,
};

/// Process-wide notification emitted by [`LinkStore::clear_all`] so sibling
/// contexts sharing the dataset can purge caches. Tag only, no payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StoreEvent {
    Cleared,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

type Listener = Box<dyn Fn(&StoreEvent) + Send>;

pub struct LinkStore {
    conn: Connection,
    archive: Option<ArchiveLog>,
    listeners: Vec<Listener>,
}

const SELECT_LINKS: &str =
    "SELECT id, url, title, description, labels_json, board_id, created_at, updated_at FROM links";

const SELECT_BOARDS: &str =
    "SELECT id, name, description, created_at, updated_at FROM boards";

const SELECT_SUMMARIES: &str =
    "SELECT id, link_id, content, model, created_at, updated_at FROM summaries";

const SELECT_MESSAGES: &str =
    "SELECT id, conversation_id, link_id, role, content, created_at, updated_at FROM chat_messages";

const SELECT_CONVERSATIONS: &str =
    "SELECT id, link_ids_json, link_ids_key, title, ended_at, created_at, updated_at FROM conversations";

const SELECT_TASKS: &str =
    "SELECT id, title, status, link_id, due_at, created_at, updated_at FROM tasks";

const SELECT_DOWNLOAD_EVENTS: &str =
    "SELECT id, url, link_id, occurred_at FROM download_events";

const SELECT_INSTALLATIONS: &str =
    "SELECT id, browser, extension_version, installed_at, created_at, updated_at FROM extension_installations";

impl LinkStore {
    /// Open the store file and configure runtime pragmas. Does not migrate;
    /// call [`LinkStore::migrate`] before using the facades.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] when the database cannot be opened or
    /// pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|err| {
            StoreError::Storage(format!("failed to open database at {}: {err}", path.display()))
        })?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests and the validator's own fixtures.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] when SQLite cannot allocate the
    /// database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| StoreError::Storage(format!("failed to open memory database: {err}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        // foreign_keys stays off: dangling references are data to be
        // reported and repaired here, not writes to be rejected.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|err| storage_err("failed to configure sqlite pragmas", &err))?;

        Ok(Self { conn, archive: None, listeners: Vec::new() })
    }

    /// Attach the bounded archival log that receives trimmed snapshots of
    /// hard-deleted links.
    #[must_use]
    pub fn with_archive(mut self, archive: ArchiveLog) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Register a listener for store-wide notifications.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&StoreEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Apply every pending schema version (see [`schema_versions`]) and seed
    /// the settings singleton.
    ///
    /// # Errors
    /// Returns [`StoreError::Migration`] when the on-disk version is newer
    /// than this build supports or any version step fails; the store must
    /// not be used after a migration error.
    pub fn migrate(&mut self) -> Result<(), StoreError> {
        schema::run_migrations(&mut self.conn)
    }

    /// Current and target schema versions plus the pending gap.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] when migration metadata cannot be
    /// read.
    pub fn schema_status(&self) -> Result<SchemaStatus, StoreError> {
        let current = if schema::table_exists(&self.conn, "schema_migrations")? {
            schema::current_schema_version(&self.conn)?
        } else {
            0
        };
        let pending = if current < LATEST_SCHEMA_VERSION {
            ((current + 1)..=LATEST_SCHEMA_VERSION).collect()
        } else {
            Vec::new()
        };
        Ok(SchemaStatus {
            current_version: current,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions: pending,
        })
    }

    // ---- links ----

    /// # Errors
    /// Returns [`StoreError::Validation`] for a malformed row,
    /// [`StoreError::DuplicateKey`] when the id already exists.
    pub fn add_link(&mut self, link: &Link) -> Result<(), StoreError> {
        link.validate()?;
        self.conn
            .execute(
                "INSERT INTO links(id, url, title, description, labels_json, board_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    link.id.to_string(),
                    link.url,
                    link.title,
                    link.description,
                    to_json(&link.labels)?,
                    link.board_id.map(|id| id.to_string()),
                    rfc3339(link.created_at)?,
                    rfc3339(link.updated_at)?,
                ],
            )
            .map_err(|err| insert_err("link", link.id.to_string(), err))?;
        Ok(())
    }

    /// Absence is a value: a missing id returns `Ok(None)`.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure or an
    /// undecodable row.
    pub fn get_link(&self, id: LinkId) -> Result<Option<Link>, StoreError> {
        let rows = query_links(
            &self.conn,
            &format!("{SELECT_LINKS} WHERE id = ?1"),
            params![id.to_string()],
        )?;
        Ok(rows.into_iter().next())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn list_links(&self) -> Result<Vec<Link>, StoreError> {
        query_links(&self.conn, &format!("{SELECT_LINKS} ORDER BY created_at DESC, id ASC"), [])
    }

    /// Apply a mutation and restamp `updated_at`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for an absent id,
    /// [`StoreError::Validation`] when the mutated row is malformed.
    pub fn update_link<F>(&mut self, id: LinkId, apply: F) -> Result<Link, StoreError>
    where
        F: FnOnce(&mut Link),
    {
        let Some(mut link) = self.get_link(id)? else {
            return Err(StoreError::NotFound { entity: "link", id: id.to_string() });
        };
        apply(&mut link);
        link.id = id;
        link.updated_at = OffsetDateTime::now_utc();
        link.validate()?;

        self.conn
            .execute(
                "UPDATE links SET url = ?2, title = ?3, description = ?4, labels_json = ?5,
                 board_id = ?6, created_at = ?7, updated_at = ?8 WHERE id = ?1",
                params![
                    link.id.to_string(),
                    link.url,
                    link.title,
                    link.description,
                    to_json(&link.labels)?,
                    link.board_id.map(|board_id| board_id.to_string()),
                    rfc3339(link.created_at)?,
                    rfc3339(link.updated_at)?,
                ],
            )
            .map_err(|err| storage_err("failed to update link", &err))?;
        Ok(link)
    }

    /// Idempotent: deleting a missing id is not an error.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn delete_link(&mut self, id: LinkId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM links WHERE id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete link", &err))?;
        Ok(())
    }

    /// Delete a link and every summary referencing it, in one transaction,
    /// then append a trimmed snapshot to the archival log. The archival
    /// write is best-effort: its failure never rolls back the delete.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for an absent id.
    pub fn delete_link_cascade(&mut self, id: LinkId) -> Result<(), StoreError> {
        let Some(link) = self.get_link(id)? else {
            return Err(StoreError::NotFound { entity: "link", id: id.to_string() });
        };

        let tx = self
            .conn
            .transaction()
            .map_err(|err| storage_err("failed to start cascade transaction", &err))?;
        tx.execute("DELETE FROM summaries WHERE link_id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete dependent summaries", &err))?;
        tx.execute("DELETE FROM links WHERE id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete link", &err))?;
        tx.commit().map_err(|err| storage_err("failed to commit cascade", &err))?;

        if let Some(log) = &self.archive {
            let snapshot = ArchivedLink::from_link(&link, OffsetDateTime::now_utc());
            if let Err(err) = log.append(&snapshot) {
                tracing::warn!(link_id = %id, error = %err, "archival append failed after link delete");
            }
        }
        Ok(())
    }

    // ---- boards ----

    /// # Errors
    /// Returns [`StoreError::Validation`] or [`StoreError::DuplicateKey`].
    pub fn add_board(&mut self, board: &Board) -> Result<(), StoreError> {
        board.validate()?;
        self.conn
            .execute(
                "INSERT INTO boards(id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    board.id.to_string(),
                    board.name,
                    board.description,
                    rfc3339(board.created_at)?,
                    rfc3339(board.updated_at)?,
                ],
            )
            .map_err(|err| insert_err("board", board.id.to_string(), err))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn get_board(&self, id: BoardId) -> Result<Option<Board>, StoreError> {
        let rows = query_boards(
            &self.conn,
            &format!("{SELECT_BOARDS} WHERE id = ?1"),
            params![id.to_string()],
        )?;
        Ok(rows.into_iter().next())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn list_boards(&self) -> Result<Vec<Board>, StoreError> {
        query_boards(&self.conn, &format!("{SELECT_BOARDS} ORDER BY created_at DESC, id ASC"), [])
    }

    /// # Errors
    /// Returns [`StoreError::NotFound`] or [`StoreError::Validation`].
    pub fn update_board<F>(&mut self, id: BoardId, apply: F) -> Result<Board, StoreError>
    where
        F: FnOnce(&mut Board),
    {
        let Some(mut board) = self.get_board(id)? else {
            return Err(StoreError::NotFound { entity: "board", id: id.to_string() });
        };
        apply(&mut board);
        board.id = id;
        board.updated_at = OffsetDateTime::now_utc();
        board.validate()?;

        self.conn
            .execute(
                "UPDATE boards SET name = ?2, description = ?3, created_at = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    board.id.to_string(),
                    board.name,
                    board.description,
                    rfc3339(board.created_at)?,
                    rfc3339(board.updated_at)?,
                ],
            )
            .map_err(|err| storage_err("failed to update board", &err))?;
        Ok(board)
    }

    /// Idempotent.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn delete_board(&mut self, id: BoardId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM boards WHERE id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete board", &err))?;
        Ok(())
    }

    // ---- summaries ----

    /// # Errors
    /// Returns [`StoreError::Validation`] or [`StoreError::DuplicateKey`].
    pub fn add_summary(&mut self, summary: &Summary) -> Result<(), StoreError> {
        summary.validate()?;
        self.conn
            .execute(
                "INSERT INTO summaries(id, link_id, content, model, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    summary.id.to_string(),
                    summary.link_id.to_string(),
                    summary.content,
                    summary.model,
                    rfc3339(summary.created_at)?,
                    rfc3339(summary.updated_at)?,
                ],
            )
            .map_err(|err| insert_err("summary", summary.id.to_string(), err))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn get_summary(&self, id: SummaryId) -> Result<Option<Summary>, StoreError> {
        let rows = query_summaries(
            &self.conn,
            &format!("{SELECT_SUMMARIES} WHERE id = ?1"),
            params![id.to_string()],
        )?;
        Ok(rows.into_iter().next())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn summaries_for_link(&self, link_id: LinkId) -> Result<Vec<Summary>, StoreError> {
        query_summaries(
            &self.conn,
            &format!("{SELECT_SUMMARIES} WHERE link_id = ?1 ORDER BY created_at ASC, id ASC"),
            params![link_id.to_string()],
        )
    }

    /// # Errors
    /// Returns [`StoreError::NotFound`] or [`StoreError::Validation`].
    pub fn update_summary<F>(&mut self, id: SummaryId, apply: F) -> Result<Summary, StoreError>
    where
        F: FnOnce(&mut Summary),
    {
        let Some(mut summary) = self.get_summary(id)? else {
            return Err(StoreError::NotFound { entity: "summary", id: id.to_string() });
        };
        apply(&mut summary);
        summary.id = id;
        summary.updated_at = OffsetDateTime::now_utc();
        summary.validate()?;

        self.conn
            .execute(
                "UPDATE summaries SET link_id = ?2, content = ?3, model = ?4, created_at = ?5,
                 updated_at = ?6 WHERE id = ?1",
                params![
                    summary.id.to_string(),
                    summary.link_id.to_string(),
                    summary.content,
                    summary.model,
                    rfc3339(summary.created_at)?,
                    rfc3339(summary.updated_at)?,
                ],
            )
            .map_err(|err| storage_err("failed to update summary", &err))?;
        Ok(summary)
    }

    /// Idempotent.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn delete_summary(&mut self, id: SummaryId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM summaries WHERE id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete summary", &err))?;
        Ok(())
    }

    // ---- chat messages ----

    /// # Errors
    /// Returns [`StoreError::Validation`] or [`StoreError::DuplicateKey`].
    pub fn add_chat_message(&mut self, message: &ChatMessage) -> Result<(), StoreError> {
        message.validate()?;
        self.conn
            .execute(
                "INSERT INTO chat_messages(id, conversation_id, link_id, role, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.id.to_string(),
                    message.conversation_id.to_string(),
                    message.link_id.to_string(),
                    message.role.as_str(),
                    message.content,
                    rfc3339(message.created_at)?,
                    rfc3339(message.updated_at)?,
                ],
            )
            .map_err(|err| insert_err("chat_message", message.id.to_string(), err))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn get_chat_message(&self, id: MessageId) -> Result<Option<ChatMessage>, StoreError> {
        let rows = query_messages(
            &self.conn,
            &format!("{SELECT_MESSAGES} WHERE id = ?1"),
            params![id.to_string()],
        )?;
        Ok(rows.into_iter().next())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn messages_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        query_messages(
            &self.conn,
            &format!(
                "{SELECT_MESSAGES} WHERE conversation_id = ?1 ORDER BY created_at ASC, id ASC"
            ),
            params![conversation_id.to_string()],
        )
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn messages_for_link(&self, link_id: LinkId) -> Result<Vec<ChatMessage>, StoreError> {
        query_messages(
            &self.conn,
            &format!("{SELECT_MESSAGES} WHERE link_id = ?1 ORDER BY created_at ASC, id ASC"),
            params![link_id.to_string()],
        )
    }

    /// Idempotent.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn delete_chat_message(&mut self, id: MessageId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM chat_messages WHERE id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete chat message", &err))?;
        Ok(())
    }

    // ---- conversations ----

    /// The caller provides `link_ids`; the store owns the derived key.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] or [`StoreError::DuplicateKey`].
    pub fn add_conversation(&mut self, conversation: &Conversation) -> Result<(), StoreError> {
        conversation.validate()?;
        insert_conversation(&self.conn, conversation)
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let rows = query_conversations(
            &self.conn,
            &format!("{SELECT_CONVERSATIONS} WHERE id = ?1"),
            params![id.to_string()],
        )?;
        Ok(rows.into_iter().next())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        query_conversations(
            &self.conn,
            &format!("{SELECT_CONVERSATIONS} ORDER BY created_at DESC, id ASC"),
            [],
        )
    }

    /// Apply a mutation, recompute the derived link-set key, restamp
    /// `updated_at`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] or [`StoreError::Validation`].
    pub fn update_conversation<F>(
        &mut self,
        id: ConversationId,
        apply: F,
    ) -> Result<Conversation, StoreError>
    where
        F: FnOnce(&mut Conversation),
    {
        let Some(mut conversation) = self.get_conversation(id)? else {
            return Err(StoreError::NotFound { entity: "conversation", id: id.to_string() });
        };
        apply(&mut conversation);
        conversation.id = id;
        conversation.link_ids_key = link_ids_key(&conversation.link_ids);
        conversation.updated_at = OffsetDateTime::now_utc();
        conversation.validate()?;

        self.conn
            .execute(
                "UPDATE conversations SET link_ids_json = ?2, link_ids_key = ?3, title = ?4,
                 ended_at = ?5, created_at = ?6, updated_at = ?7 WHERE id = ?1",
                params![
                    conversation.id.to_string(),
                    to_json(&id_strings(&conversation.link_ids))?,
                    conversation.link_ids_key,
                    conversation.title,
                    conversation.ended_at.map(rfc3339).transpose()?,
                    rfc3339(conversation.created_at)?,
                    rfc3339(conversation.updated_at)?,
                ],
            )
            .map_err(|err| storage_err("failed to update conversation", &err))?;
        Ok(conversation)
    }

    /// Idempotent.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn delete_conversation(&mut self, id: ConversationId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM conversations WHERE id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete conversation", &err))?;
        Ok(())
    }

    /// Delete a conversation and all of its chat messages in one
    /// transaction.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for an absent id.
    pub fn delete_conversation_cascade(&mut self, id: ConversationId) -> Result<(), StoreError> {
        if self.get_conversation(id)?.is_none() {
            return Err(StoreError::NotFound { entity: "conversation", id: id.to_string() });
        }

        let tx = self
            .conn
            .transaction()
            .map_err(|err| storage_err("failed to start cascade transaction", &err))?;
        tx.execute(
            "DELETE FROM chat_messages WHERE conversation_id = ?1",
            params![id.to_string()],
        )
        .map_err(|err| storage_err("failed to delete dependent chat messages", &err))?;
        tx.execute("DELETE FROM conversations WHERE id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete conversation", &err))?;
        tx.commit().map_err(|err| storage_err("failed to commit cascade", &err))
    }

    /// One indexed equality lookup: the open conversation for exactly this
    /// link set, if any.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn find_active_conversation(
        &self,
        link_ids: &[LinkId],
    ) -> Result<Option<Conversation>, StoreError> {
        find_active_by_key(&self.conn, &link_ids_key(link_ids))
    }

    /// Lookup plus conditional insert inside one transaction: the
    /// store-level guarantee that at most one conversation per link set is
    /// open at a time under the single-writer model.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] for an empty link set.
    pub fn find_or_create_active_conversation(
        &mut self,
        link_ids: &[LinkId],
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let key = link_ids_key(link_ids);
        let tx = self
            .conn
            .transaction()
            .map_err(|err| storage_err("failed to start find-or-create transaction", &err))?;

        if let Some(existing) = find_active_by_key(&tx, &key)? {
            tx.commit()
                .map_err(|err| storage_err("failed to commit find-or-create", &err))?;
            return Ok(existing);
        }

        let now = OffsetDateTime::now_utc();
        let conversation = Conversation {
            id: ConversationId::new(),
            link_ids: link_ids.to_vec(),
            link_ids_key: key,
            title: title.to_string(),
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        conversation.validate()?;
        insert_conversation(&tx, &conversation)?;
        tx.commit().map_err(|err| storage_err("failed to commit find-or-create", &err))?;
        Ok(conversation)
    }

    // ---- settings ----

    /// The singleton row seeded by [`LinkStore::migrate`].
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] when the row is missing (store not
    /// migrated) or unreadable.
    pub fn get_settings(&self) -> Result<Settings, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT theme, ai_model, summary_language, updated_at FROM settings WHERE id = ?1",
                params![SETTINGS_SINGLETON_ID],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| storage_err("failed to read settings", &err))?;

        let Some((theme, ai_model, summary_language, updated_raw)) = row else {
            return Err(StoreError::Storage(
                "settings singleton missing; migrate the store first".to_string(),
            ));
        };
        Ok(Settings {
            theme,
            ai_model,
            summary_language,
            updated_at: parse_rfc3339(&updated_raw)?,
        })
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] when the singleton is missing or the
    /// write fails.
    pub fn update_settings<F>(&mut self, apply: F) -> Result<Settings, StoreError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.get_settings()?;
        apply(&mut settings);
        settings.updated_at = OffsetDateTime::now_utc();

        self.conn
            .execute(
                "UPDATE settings SET theme = ?2, ai_model = ?3, summary_language = ?4,
                 updated_at = ?5 WHERE id = ?1",
                params![
                    SETTINGS_SINGLETON_ID,
                    settings.theme,
                    settings.ai_model,
                    settings.summary_language,
                    rfc3339(settings.updated_at)?,
                ],
            )
            .map_err(|err| storage_err("failed to update settings", &err))?;
        Ok(settings)
    }

    // ---- tasks ----

    /// # Errors
    /// Returns [`StoreError::Validation`] or [`StoreError::DuplicateKey`].
    pub fn add_task(&mut self, task: &Task) -> Result<(), StoreError> {
        task.validate()?;
        self.conn
            .execute(
                "INSERT INTO tasks(id, title, status, link_id, due_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    task.id.to_string(),
                    task.title,
                    task.status.as_str(),
                    task.link_id.map(|link_id| link_id.to_string()),
                    task.due_at.map(rfc3339).transpose()?,
                    rfc3339(task.created_at)?,
                    rfc3339(task.updated_at)?,
                ],
            )
            .map_err(|err| insert_err("task", task.id.to_string(), err))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let rows = query_tasks(
            &self.conn,
            &format!("{SELECT_TASKS} WHERE id = ?1"),
            params![id.to_string()],
        )?;
        Ok(rows.into_iter().next())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        query_tasks(&self.conn, &format!("{SELECT_TASKS} ORDER BY created_at DESC, id ASC"), [])
    }

    /// # Errors
    /// Returns [`StoreError::NotFound`] or [`StoreError::Validation`].
    pub fn update_task<F>(&mut self, id: TaskId, apply: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task),
    {
        let Some(mut task) = self.get_task(id)? else {
            return Err(StoreError::NotFound { entity: "task", id: id.to_string() });
        };
        apply(&mut task);
        task.id = id;
        task.updated_at = OffsetDateTime::now_utc();
        task.validate()?;

        self.conn
            .execute(
                "UPDATE tasks SET title = ?2, status = ?3, link_id = ?4, due_at = ?5,
                 created_at = ?6, updated_at = ?7 WHERE id = ?1",
                params![
                    task.id.to_string(),
                    task.title,
                    task.status.as_str(),
                    task.link_id.map(|link_id| link_id.to_string()),
                    task.due_at.map(rfc3339).transpose()?,
                    rfc3339(task.created_at)?,
                    rfc3339(task.updated_at)?,
                ],
            )
            .map_err(|err| storage_err("failed to update task", &err))?;
        Ok(task)
    }

    /// Idempotent.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn delete_task(&mut self, id: TaskId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete task", &err))?;
        Ok(())
    }

    // ---- download events ----

    /// # Errors
    /// Returns [`StoreError::Validation`] or [`StoreError::DuplicateKey`].
    pub fn add_download_event(&mut self, event: &DownloadEvent) -> Result<(), StoreError> {
        event.validate()?;
        self.conn
            .execute(
                "INSERT INTO download_events(id, url, link_id, occurred_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    event.id.to_string(),
                    event.url,
                    event.link_id.map(|link_id| link_id.to_string()),
                    rfc3339(event.occurred_at)?,
                ],
            )
            .map_err(|err| insert_err("download_event", event.id.to_string(), err))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn get_download_event(&self, id: DownloadId) -> Result<Option<DownloadEvent>, StoreError> {
        let rows = query_download_events(
            &self.conn,
            &format!("{SELECT_DOWNLOAD_EVENTS} WHERE id = ?1"),
            params![id.to_string()],
        )?;
        Ok(rows.into_iter().next())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn list_download_events(&self) -> Result<Vec<DownloadEvent>, StoreError> {
        query_download_events(
            &self.conn,
            &format!("{SELECT_DOWNLOAD_EVENTS} ORDER BY occurred_at DESC, id ASC"),
            [],
        )
    }

    /// Idempotent.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn delete_download_event(&mut self, id: DownloadId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM download_events WHERE id = ?1", params![id.to_string()])
            .map_err(|err| storage_err("failed to delete download event", &err))?;
        Ok(())
    }

    // ---- extension installations ----

    /// # Errors
    /// Returns [`StoreError::Validation`] or [`StoreError::DuplicateKey`].
    pub fn add_installation(
        &mut self,
        installation: &ExtensionInstallation,
    ) -> Result<(), StoreError> {
        installation.validate()?;
        self.conn
            .execute(
                "INSERT INTO extension_installations(id, browser, extension_version, installed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    installation.id.to_string(),
                    installation.browser,
                    installation.extension_version,
                    rfc3339(installation.installed_at)?,
                    rfc3339(installation.created_at)?,
                    rfc3339(installation.updated_at)?,
                ],
            )
            .map_err(|err| insert_err("extension_installation", installation.id.to_string(), err))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn get_installation(
        &self,
        id: InstallationId,
    ) -> Result<Option<ExtensionInstallation>, StoreError> {
        let rows = query_installations(
            &self.conn,
            &format!("{SELECT_INSTALLATIONS} WHERE id = ?1"),
            params![id.to_string()],
        )?;
        Ok(rows.into_iter().next())
    }

    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn list_installations(&self) -> Result<Vec<ExtensionInstallation>, StoreError> {
        query_installations(
            &self.conn,
            &format!("{SELECT_INSTALLATIONS} ORDER BY installed_at DESC, id ASC"),
            [],
        )
    }

    /// # Errors
    /// Returns [`StoreError::NotFound`] or [`StoreError::Validation`].
    pub fn update_installation<F>(
        &mut self,
        id: InstallationId,
        apply: F,
    ) -> Result<ExtensionInstallation, StoreError>
    where
        F: FnOnce(&mut ExtensionInstallation),
    {
        let Some(mut installation) = self.get_installation(id)? else {
            return Err(StoreError::NotFound {
                entity: "extension_installation",
                id: id.to_string(),
            });
        };
        apply(&mut installation);
        installation.id = id;
        installation.updated_at = OffsetDateTime::now_utc();
        installation.validate()?;

        self.conn
            .execute(
                "UPDATE extension_installations SET browser = ?2, extension_version = ?3,
                 installed_at = ?4, created_at = ?5, updated_at = ?6 WHERE id = ?1",
                params![
                    installation.id.to_string(),
                    installation.browser,
                    installation.extension_version,
                    rfc3339(installation.installed_at)?,
                    rfc3339(installation.created_at)?,
                    rfc3339(installation.updated_at)?,
                ],
            )
            .map_err(|err| storage_err("failed to update installation", &err))?;
        Ok(installation)
    }

    /// Idempotent.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] on an engine failure.
    pub fn delete_installation(&mut self, id: InstallationId) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM extension_installations WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(|err| storage_err("failed to delete installation", &err))?;
        Ok(())
    }

    // ---- whole-store operations ----

    /// Drop every table, replay the migration history from scratch, and
    /// notify listeners. Leaves the store at the latest schema with a
    /// freshly seeded settings singleton.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] or [`StoreError::Migration`] when the
    /// rebuild fails.
    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        let mut ddl = String::new();
        for table in schema::latest_tables() {
            ddl.push_str(&format!("DROP TABLE IF EXISTS {};\n", table.name));
        }
        ddl.push_str("DROP TABLE IF EXISTS schema_migrations;\n");
        self.conn
            .execute_batch(&ddl)
            .map_err(|err| storage_err("failed to drop tables", &err))?;

        schema::run_migrations(&mut self.conn)?;

        for listener in &self.listeners {
            listener(&StoreEvent::Cleared);
        }
        Ok(())
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ---- row decoding ----

type RawLink =
    (String, String, String, String, String, Option<String>, Option<String>, Option<String>);

fn query_links<P: Params>(
    conn: &Connection,
    sql: &str,
    query_params: P,
) -> Result<Vec<Link>, StoreError> {
    let mut stmt =
        conn.prepare(sql).map_err(|err| storage_err("failed to prepare link query", &err))?;
    let raw = stmt
        .query_map(query_params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })
        .map_err(|err| storage_err("failed to query links", &err))?
        .collect::<Result<Vec<RawLink>, _>>()
        .map_err(|err| storage_err("failed to read links", &err))?;

    raw.into_iter()
        .map(|(id, url, title, description, labels_json, board_id, created_raw, updated_raw)| {
            Ok(Link {
                id: LinkId(parse_ulid(&id)?),
                url,
                title,
                description,
                labels: from_json(&labels_json)?,
                board_id: board_id.as_deref().map(parse_ulid).transpose()?.map(BoardId),
                created_at: required_ts(created_raw.as_deref(), "links")?,
                updated_at: required_ts(updated_raw.as_deref(), "links")?,
            })
        })
        .collect()
}

fn query_boards<P: Params>(
    conn: &Connection,
    sql: &str,
    query_params: P,
) -> Result<Vec<Board>, StoreError> {
    let mut stmt =
        conn.prepare(sql).map_err(|err| storage_err("failed to prepare board query", &err))?;
    let raw = stmt
        .query_map(query_params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })
        .map_err(|err| storage_err("failed to query boards", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read boards", &err))?;

    raw.into_iter()
        .map(|(id, name, description, created_raw, updated_raw)| {
            Ok(Board {
                id: BoardId(parse_ulid(&id)?),
                name,
                description,
                created_at: required_ts(created_raw.as_deref(), "boards")?,
                updated_at: required_ts(updated_raw.as_deref(), "boards")?,
            })
        })
        .collect()
}

fn query_summaries<P: Params>(
    conn: &Connection,
    sql: &str,
    query_params: P,
) -> Result<Vec<Summary>, StoreError> {
    let mut stmt =
        conn.prepare(sql).map_err(|err| storage_err("failed to prepare summary query", &err))?;
    let raw = stmt
        .query_map(query_params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })
        .map_err(|err| storage_err("failed to query summaries", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read summaries", &err))?;

    raw.into_iter()
        .map(|(id, link_id, content, model, created_raw, updated_raw)| {
            Ok(Summary {
                id: SummaryId(parse_ulid(&id)?),
                link_id: LinkId(parse_ulid(&link_id)?),
                content,
                model,
                created_at: required_ts(created_raw.as_deref(), "summaries")?,
                updated_at: required_ts(updated_raw.as_deref(), "summaries")?,
            })
        })
        .collect()
}

fn query_messages<P: Params>(
    conn: &Connection,
    sql: &str,
    query_params: P,
) -> Result<Vec<ChatMessage>, StoreError> {
    let mut stmt =
        conn.prepare(sql).map_err(|err| storage_err("failed to prepare message query", &err))?;
    let raw = stmt
        .query_map(query_params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })
        .map_err(|err| storage_err("failed to query chat messages", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read chat messages", &err))?;

    raw.into_iter()
        .map(|(id, conversation_id, link_id, role_raw, content, created_raw, updated_raw)| {
            let role = ChatRole::parse(&role_raw).ok_or_else(|| {
                StoreError::Storage(format!("unknown chat role in storage: {role_raw}"))
            })?;
            Ok(ChatMessage {
                id: MessageId(parse_ulid(&id)?),
                conversation_id: ConversationId(parse_ulid(&conversation_id)?),
                link_id: LinkId(parse_ulid(&link_id)?),
                role,
                content,
                created_at: required_ts(created_raw.as_deref(), "chat_messages")?,
                updated_at: required_ts(updated_raw.as_deref(), "chat_messages")?,
            })
        })
        .collect()
}

type RawConversation =
    (String, String, Option<String>, String, Option<String>, Option<String>, Option<String>);

fn query_conversations<P: Params>(
    conn: &Connection,
    sql: &str,
    query_params: P,
) -> Result<Vec<Conversation>, StoreError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| storage_err("failed to prepare conversation query", &err))?;
    let raw = stmt
        .query_map(query_params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })
        .map_err(|err| storage_err("failed to query conversations", &err))?
        .collect::<Result<Vec<RawConversation>, _>>()
        .map_err(|err| storage_err("failed to read conversations", &err))?;

    raw.into_iter()
        .map(|(id, link_ids_json, key, title, ended_raw, created_raw, updated_raw)| {
            let raw_ids: Vec<String> = from_json(&link_ids_json)?;
            let link_ids = raw_ids
                .iter()
                .map(|raw| parse_ulid(raw).map(LinkId))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Conversation {
                id: ConversationId(parse_ulid(&id)?),
                link_ids,
                link_ids_key: key.unwrap_or_default(),
                title,
                ended_at: ended_raw.as_deref().map(parse_rfc3339).transpose()?,
                created_at: required_ts(created_raw.as_deref(), "conversations")?,
                updated_at: required_ts(updated_raw.as_deref(), "conversations")?,
            })
        })
        .collect()
}

fn query_tasks<P: Params>(
    conn: &Connection,
    sql: &str,
    query_params: P,
) -> Result<Vec<Task>, StoreError> {
    let mut stmt =
        conn.prepare(sql).map_err(|err| storage_err("failed to prepare task query", &err))?;
    let raw = stmt
        .query_map(query_params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })
        .map_err(|err| storage_err("failed to query tasks", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read tasks", &err))?;

    raw.into_iter()
        .map(|(id, title, status_raw, link_id, due_raw, created_raw, updated_raw)| {
            let status = TaskStatus::parse(&status_raw).ok_or_else(|| {
                StoreError::Storage(format!("unknown task status in storage: {status_raw}"))
            })?;
            Ok(Task {
                id: TaskId(parse_ulid(&id)?),
                title,
                status,
                link_id: link_id.as_deref().map(parse_ulid).transpose()?.map(LinkId),
                due_at: due_raw.as_deref().map(parse_rfc3339).transpose()?,
                created_at: required_ts(created_raw.as_deref(), "tasks")?,
                updated_at: required_ts(updated_raw.as_deref(), "tasks")?,
            })
        })
        .collect()
}

fn query_download_events<P: Params>(
    conn: &Connection,
    sql: &str,
    query_params: P,
) -> Result<Vec<DownloadEvent>, StoreError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| storage_err("failed to prepare download event query", &err))?;
    let raw = stmt
        .query_map(query_params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|err| storage_err("failed to query download events", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read download events", &err))?;

    raw.into_iter()
        .map(|(id, url, link_id, occurred_raw)| {
            Ok(DownloadEvent {
                id: DownloadId(parse_ulid(&id)?),
                url,
                link_id: link_id.as_deref().map(parse_ulid).transpose()?.map(LinkId),
                occurred_at: parse_rfc3339(&occurred_raw)?,
            })
        })
        .collect()
}

fn query_installations<P: Params>(
    conn: &Connection,
    sql: &str,
    query_params: P,
) -> Result<Vec<ExtensionInstallation>, StoreError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| storage_err("failed to prepare installation query", &err))?;
    let raw = stmt
        .query_map(query_params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })
        .map_err(|err| storage_err("failed to query installations", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read installations", &err))?;

    raw.into_iter()
        .map(|(id, browser, extension_version, installed_raw, created_raw, updated_raw)| {
            Ok(ExtensionInstallation {
                id: InstallationId(parse_ulid(&id)?),
                browser,
                extension_version,
                installed_at: parse_rfc3339(&installed_raw)?,
                created_at: required_ts(created_raw.as_deref(), "extension_installations")?,
                updated_at: required_ts(updated_raw.as_deref(), "extension_installations")?,
            })
        })
        .collect()
}

fn find_active_by_key(conn: &Connection, key: &str) -> Result<Option<Conversation>, StoreError> {
    let rows = query_conversations(
        conn,
        &format!(
            "{SELECT_CONVERSATIONS} WHERE link_ids_key = ?1 AND ended_at IS NULL
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ),
        params![key],
    )?;
    Ok(rows.into_iter().next())
}

fn insert_conversation(conn: &Connection, conversation: &Conversation) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO conversations(id, link_ids_json, link_ids_key, title, ended_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            conversation.id.to_string(),
            to_json(&id_strings(&conversation.link_ids))?,
            conversation.link_ids_key,
            conversation.title,
            conversation.ended_at.map(rfc3339).transpose()?,
            rfc3339(conversation.created_at)?,
            rfc3339(conversation.updated_at)?,
        ],
    )
    .map_err(|err| insert_err("conversation", conversation.id.to_string(), err))?;
    Ok(())
}

fn id_strings(link_ids: &[LinkId]) -> Vec<String> {
    link_ids.iter().map(ToString::to_string).collect()
}

// ---- shared boundary helpers ----

pub(crate) fn storage_err(context: &str, err: &rusqlite::Error) -> StoreError {
    StoreError::Storage(format!("{context}: {err}"))
}

fn insert_err(entity: &'static str, id: String, err: rusqlite::Error) -> StoreError {
    // Only uniqueness violations are duplicates; a CHECK or NOT NULL
    // failure is a plain storage error.
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation
            && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        {
            return StoreError::DuplicateKey { entity, id };
        }
    }
    storage_err("insert failed", &err)
}

pub(crate) fn rfc3339(value: OffsetDateTime) -> Result<String, StoreError> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| StoreError::Storage(format!("failed to format RFC3339 timestamp: {err}")))
}

pub(crate) fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| StoreError::Storage(format!("invalid RFC3339 timestamp {value}: {err}")))
}

pub(crate) fn now_rfc3339() -> Result<String, StoreError> {
    rfc3339(OffsetDateTime::now_utc())
}

fn required_ts(raw: Option<&str>, table: &str) -> Result<OffsetDateTime, StoreError> {
    let Some(raw) = raw else {
        return Err(StoreError::Storage(format!("missing timestamp in {table} row")));
    };
    parse_rfc3339(raw)
}

fn parse_ulid(raw: &str) -> Result<Ulid, StoreError> {
    Ulid::from_string(raw).map_err(|err| StoreError::Storage(format!("invalid ULID {raw}: {err}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|err| StoreError::Storage(format!("failed to encode JSON column: {err}")))
}

fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw)
        .map_err(|err| StoreError::Storage(format!("failed to decode JSON column: {err}")))
}
