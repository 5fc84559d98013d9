//! Store-wide consistency checks and the repair engine.
//!
//! The validator only reports; [`run_full_cleanup`] repairs. Both run over
//! raw rows so corruption the typed facades would refuse to decode is still
//! visible, and both survive per-row failures: one bad row becomes a report
//! entry, never an abort.

use std::collections::BTreeMap;

use linkvault_core::{
    canonical_url_key, link_ids_key, Link, LinkId, MessageId, StoreError, SummaryId,
};
use rusqlite::Connection;
use serde::Serialize;
use time::OffsetDateTime;
use ulid::Ulid;

use crate::{parse_rfc3339, storage_err, LinkStore};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
}

impl HealthStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Links sharing one canonical URL key. `keep` is the survivor: greatest
/// `updated_at`, smallest id on a tie.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct DuplicateGroup {
    pub canonical_key: String,
    pub keep: LinkId,
    pub remove: Vec<LinkId>,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct InvalidRow {
    pub table: &'static str,
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub duplicate_link_groups: Vec<DuplicateGroup>,
    pub invalid_rows: Vec<InvalidRow>,
    pub orphaned_summaries: Vec<SummaryId>,
    pub orphaned_messages: Vec<MessageId>,
    pub self_test_passed: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Invalid rows and a failed self-test make the store invalid;
    /// duplicates and orphans are repairable warnings, not errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.invalid_rows.is_empty() && self.self_test_passed && self.errors.is_empty()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.duplicate_link_groups.is_empty()
            || !self.orphaned_summaries.is_empty()
            || !self.orphaned_messages.is_empty()
    }

    #[must_use]
    pub fn health(&self) -> HealthStatus {
        if !self.is_valid() {
            HealthStatus::Error
        } else if self.has_warnings() {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed_duplicate_links: usize,
    pub removed_orphaned_summaries: usize,
    pub removed_orphaned_messages: usize,
    pub errors: Vec<String>,
}

impl CleanupReport {
    #[must_use]
    pub fn total_removed(&self) -> usize {
        self.removed_duplicate_links
            + self.removed_orphaned_summaries
            + self.removed_orphaned_messages
    }
}

/// Full consistency sweep. Infallible by contract: scan and self-test
/// failures are recorded in `errors` rather than returned.
pub fn validate(store: &mut LinkStore) -> ValidationReport {
    let mut report = ValidationReport::default();

    match duplicate_groups(store.connection()) {
        Ok(groups) => report.duplicate_link_groups = groups,
        Err(err) => report.errors.push(format!("duplicate scan failed: {err}")),
    }
    if let Err(err) = collect_invalid_rows(store.connection(), &mut report.invalid_rows) {
        report.errors.push(format!("row scan failed: {err}"));
    }
    match orphaned_summaries(store.connection()) {
        Ok(ids) => report.orphaned_summaries = ids,
        Err(err) => report.errors.push(format!("orphaned summary scan failed: {err}")),
    }
    match orphaned_messages(store.connection()) {
        Ok(ids) => report.orphaned_messages = ids,
        Err(err) => report.errors.push(format!("orphaned message scan failed: {err}")),
    }

    match run_self_test(store) {
        Ok(()) => report.self_test_passed = true,
        Err(err) => {
            report.self_test_passed = false;
            report.errors.push(format!("self-test failed: {err}"));
        }
    }
    report
}

/// Repair everything the validator flags as a warning: duplicate links go
/// through the cascading delete (their summaries go with them), then the
/// surviving orphans are removed. Best-effort per row; each failure lands
/// in `errors` and the sweep continues.
pub fn run_full_cleanup(store: &mut LinkStore) -> CleanupReport {
    let mut report = CleanupReport::default();

    match duplicate_groups(store.connection()) {
        Ok(groups) => {
            for group in groups {
                for id in group.remove {
                    match store.delete_link_cascade(id) {
                        Ok(()) => report.removed_duplicate_links += 1,
                        Err(err) => {
                            tracing::warn!(link_id = %id, error = %err, "duplicate removal failed");
                            report.errors.push(format!("failed to remove duplicate {id}: {err}"));
                        }
                    }
                }
            }
        }
        Err(err) => report.errors.push(format!("duplicate scan failed: {err}")),
    }

    // Orphans are re-scanned after the cascades so rows they already
    // removed are not counted twice.
    match orphaned_summaries(store.connection()) {
        Ok(ids) => {
            for id in ids {
                match store.delete_summary(id) {
                    Ok(()) => report.removed_orphaned_summaries += 1,
                    Err(err) => {
                        report.errors.push(format!("failed to remove orphaned summary {id}: {err}"));
                    }
                }
            }
        }
        Err(err) => report.errors.push(format!("orphaned summary scan failed: {err}")),
    }

    match orphaned_messages(store.connection()) {
        Ok(ids) => {
            for id in ids {
                match store.delete_chat_message(id) {
                    Ok(()) => report.removed_orphaned_messages += 1,
                    Err(err) => {
                        report.errors.push(format!("failed to remove orphaned message {id}: {err}"));
                    }
                }
            }
        }
        Err(err) => report.errors.push(format!("orphaned message scan failed: {err}")),
    }

    report
}

fn duplicate_groups(conn: &Connection) -> Result<Vec<DuplicateGroup>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT id, url, updated_at FROM links")
        .map_err(|err| storage_err("failed to prepare duplicate scan", &err))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .map_err(|err| storage_err("failed to scan links for duplicates", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read links for duplicates", &err))?;

    let mut by_key: BTreeMap<String, Vec<(Ulid, OffsetDateTime)>> = BTreeMap::new();
    for (raw_id, url, updated_raw) in rows {
        let Ok(id) = Ulid::from_string(&raw_id) else {
            // Undecodable ids are surfaced by the invalid-row scan.
            continue;
        };
        let key = canonical_url_key(&url);
        if key.is_empty() {
            continue;
        }
        // An unreadable timestamp ranks the row last, so a well-formed
        // duplicate always survives over it.
        let updated = updated_raw
            .as_deref()
            .and_then(|raw| parse_rfc3339(raw).ok())
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        by_key.entry(key).or_default().push((id, updated));
    }

    let mut groups = Vec::new();
    for (key, candidates) in by_key {
        if candidates.len() < 2 {
            continue;
        }
        let mut keep = candidates[0];
        for candidate in &candidates[1..] {
            if candidate.1 > keep.1 || (candidate.1 == keep.1 && candidate.0 < keep.0) {
                keep = *candidate;
            }
        }
        let remove = candidates
            .iter()
            .filter(|candidate| candidate.0 != keep.0)
            .map(|candidate| LinkId(candidate.0))
            .collect();
        groups.push(DuplicateGroup { canonical_key: key, keep: LinkId(keep.0), remove });
    }
    Ok(groups)
}

fn collect_invalid_rows(
    conn: &Connection,
    invalid: &mut Vec<InvalidRow>,
) -> Result<(), StoreError> {
    scan_link_rows(conn, invalid)?;
    scan_conversation_rows(conn, invalid)?;
    scan_required_text(conn, "boards", "name", invalid)?;
    scan_required_text(conn, "summaries", "content", invalid)?;
    scan_required_text(conn, "chat_messages", "content", invalid)?;
    scan_required_text(conn, "tasks", "title", invalid)?;
    for table in ["boards", "summaries", "chat_messages", "tasks"] {
        scan_timestamp_pairs(conn, table, invalid)?;
    }
    Ok(())
}

fn scan_required_text(
    conn: &Connection,
    table: &'static str,
    column: &'static str,
    invalid: &mut Vec<InvalidRow>,
) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT id FROM {table} WHERE {column} IS NULL OR TRIM({column}) = ''"
        ))
        .map_err(|err| storage_err("failed to prepare required-field scan", &err))?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|err| storage_err("failed to scan required fields", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read required fields", &err))?;
    for id in ids {
        invalid.push(InvalidRow { table, id, reason: format!("empty {column}") });
    }
    Ok(())
}

fn scan_link_rows(conn: &Connection, invalid: &mut Vec<InvalidRow>) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare("SELECT id, url, created_at, updated_at FROM links")
        .map_err(|err| storage_err("failed to prepare link row scan", &err))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })
        .map_err(|err| storage_err("failed to scan link rows", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read link rows", &err))?;

    for (id, url, created_raw, updated_raw) in rows {
        if url.trim().is_empty() {
            invalid.push(InvalidRow { table: "links", id: id.clone(), reason: "empty url".to_string() });
        }
        check_timestamp_pair("links", &id, created_raw.as_deref(), updated_raw.as_deref(), invalid);
    }
    Ok(())
}

fn scan_conversation_rows(
    conn: &Connection,
    invalid: &mut Vec<InvalidRow>,
) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare("SELECT id, link_ids_json, link_ids_key, created_at, updated_at FROM conversations")
        .map_err(|err| storage_err("failed to prepare conversation row scan", &err))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })
        .map_err(|err| storage_err("failed to scan conversation rows", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read conversation rows", &err))?;

    for (id, link_ids_json, key, created_raw, updated_raw) in rows {
        match decode_link_ids(&link_ids_json) {
            Ok(link_ids) if link_ids.is_empty() => {
                invalid.push(InvalidRow {
                    table: "conversations",
                    id: id.clone(),
                    reason: "empty link set".to_string(),
                });
            }
            Ok(link_ids) => {
                let expected = link_ids_key(&link_ids);
                if key.as_deref() != Some(expected.as_str()) {
                    invalid.push(InvalidRow {
                        table: "conversations",
                        id: id.clone(),
                        reason: format!(
                            "stale link_ids_key: stored {:?}, expected {expected:?}",
                            key.unwrap_or_default()
                        ),
                    });
                }
            }
            Err(reason) => {
                invalid.push(InvalidRow { table: "conversations", id: id.clone(), reason });
            }
        }
        check_timestamp_pair(
            "conversations",
            &id,
            created_raw.as_deref(),
            updated_raw.as_deref(),
            invalid,
        );
    }
    Ok(())
}

fn scan_timestamp_pairs(
    conn: &Connection,
    table: &'static str,
    invalid: &mut Vec<InvalidRow>,
) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare(&format!("SELECT id, created_at, updated_at FROM {table}"))
        .map_err(|err| storage_err("failed to prepare timestamp scan", &err))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .map_err(|err| storage_err("failed to scan timestamps", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read timestamps", &err))?;

    for (id, created_raw, updated_raw) in rows {
        check_timestamp_pair(table, &id, created_raw.as_deref(), updated_raw.as_deref(), invalid);
    }
    Ok(())
}

fn check_timestamp_pair(
    table: &'static str,
    id: &str,
    created_raw: Option<&str>,
    updated_raw: Option<&str>,
    invalid: &mut Vec<InvalidRow>,
) {
    let created = match created_raw {
        None => {
            invalid.push(InvalidRow {
                table,
                id: id.to_string(),
                reason: "missing created_at".to_string(),
            });
            return;
        }
        Some(raw) => match parse_rfc3339(raw) {
            Ok(value) => value,
            Err(_) => {
                invalid.push(InvalidRow {
                    table,
                    id: id.to_string(),
                    reason: format!("unparseable created_at {raw:?}"),
                });
                return;
            }
        },
    };
    let updated = match updated_raw {
        None => {
            invalid.push(InvalidRow {
                table,
                id: id.to_string(),
                reason: "missing updated_at".to_string(),
            });
            return;
        }
        Some(raw) => match parse_rfc3339(raw) {
            Ok(value) => value,
            Err(_) => {
                invalid.push(InvalidRow {
                    table,
                    id: id.to_string(),
                    reason: format!("unparseable updated_at {raw:?}"),
                });
                return;
            }
        },
    };
    if created > updated {
        invalid.push(InvalidRow {
            table,
            id: id.to_string(),
            reason: "created_at after updated_at".to_string(),
        });
    }
}

fn decode_link_ids(raw: &str) -> Result<Vec<LinkId>, String> {
    let raw_ids: Vec<String> =
        serde_json::from_str(raw).map_err(|err| format!("undecodable link_ids_json: {err}"))?;
    raw_ids
        .iter()
        .map(|raw_id| {
            Ulid::from_string(raw_id)
                .map(LinkId)
                .map_err(|err| format!("invalid link id {raw_id:?} in link set: {err}"))
        })
        .collect()
}

fn orphaned_summaries(conn: &Connection) -> Result<Vec<SummaryId>, StoreError> {
    collect_orphan_ids(
        conn,
        "SELECT s.id FROM summaries s LEFT JOIN links l ON l.id = s.link_id WHERE l.id IS NULL",
    )
    .map(|ids| ids.into_iter().map(SummaryId).collect())
}

fn orphaned_messages(conn: &Connection) -> Result<Vec<MessageId>, StoreError> {
    collect_orphan_ids(
        conn,
        "SELECT m.id FROM chat_messages m
         LEFT JOIN links l ON l.id = m.link_id
         LEFT JOIN conversations c ON c.id = m.conversation_id
         WHERE l.id IS NULL OR c.id IS NULL",
    )
    .map(|ids| ids.into_iter().map(MessageId).collect())
}

fn collect_orphan_ids(conn: &Connection, sql: &str) -> Result<Vec<Ulid>, StoreError> {
    let mut stmt =
        conn.prepare(sql).map_err(|err| storage_err("failed to prepare orphan scan", &err))?;
    let raw = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|err| storage_err("failed to scan orphans", &err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| storage_err("failed to read orphans", &err))?;
    Ok(raw.iter().filter_map(|raw_id| Ulid::from_string(raw_id).ok()).collect())
}

/// End-to-end canary through the typed facade: add, read back, update,
/// delete, confirm gone. Leaves no residue on success.
fn run_self_test(store: &mut LinkStore) -> Result<(), StoreError> {
    let id = LinkId::new();
    let now = OffsetDateTime::now_utc();
    let canary = Link {
        id,
        url: format!("linkvault://self-test/{id}"),
        title: "self test".to_string(),
        description: String::new(),
        labels: Vec::new(),
        board_id: None,
        created_at: now,
        updated_at: now,
    };

    store.add_link(&canary)?;
    if store.get_link(id)?.is_none() {
        return Err(StoreError::Storage("canary missing after add".to_string()));
    }
    let updated = store.update_link(id, |link| link.title = "self test updated".to_string())?;
    if updated.title != "self test updated" {
        return Err(StoreError::Storage("canary update not applied".to_string()));
    }
    store.delete_link(id)?;
    if store.get_link(id)?.is_some() {
        return Err(StoreError::Storage("canary survived delete".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use linkvault_core::{ChatMessage, ChatRole, ConversationId, MessageId, Summary, SummaryId};
    use rusqlite::params;

    use super::*;

    fn open_store() -> Result<LinkStore, StoreError> {
        let mut store = LinkStore::open_in_memory()?;
        store.migrate()?;
        Ok(store)
    }

    fn ts(offset: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_704_067_200 + offset)
            .unwrap_or_else(|err| panic!("fixture timestamp should be valid: {err}"))
    }

    fn mk_link(id: LinkId, url: &str, updated: OffsetDateTime) -> Link {
        Link {
            id,
            url: url.to_string(),
            title: "page".to_string(),
            description: String::new(),
            labels: Vec::new(),
            board_id: None,
            created_at: ts(0),
            updated_at: updated,
        }
    }

    #[test]
    fn fresh_store_is_healthy() -> Result<(), StoreError> {
        let mut store = open_store()?;
        let report = validate(&mut store);
        assert!(report.is_valid());
        assert!(report.self_test_passed);
        assert!(!report.has_warnings());
        assert_eq!(report.health(), HealthStatus::Healthy);
        // The canary must not leak into the dataset.
        assert!(store.list_links()?.is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_detection_keeps_most_recently_updated() -> Result<(), StoreError> {
        let mut store = open_store()?;
        let older = mk_link(LinkId::new(), "https://Example.com/Article/", ts(10));
        let newer = mk_link(LinkId::new(), "https://example.com/Article", ts(20));
        store.add_link(&older)?;
        store.add_link(&newer)?;

        let report = validate(&mut store);
        assert_eq!(report.health(), HealthStatus::Warning);
        assert_eq!(report.duplicate_link_groups.len(), 1);
        let group = &report.duplicate_link_groups[0];
        assert_eq!(group.keep, newer.id);
        assert_eq!(group.remove, vec![older.id]);
        Ok(())
    }

    #[test]
    fn duplicate_tie_breaks_on_smallest_id() -> Result<(), StoreError> {
        let mut store = open_store()?;
        let low = LinkId(Ulid::from(7_u128));
        let high = LinkId(Ulid::from(9_u128));
        store.add_link(&mk_link(high, "https://example.com/a", ts(10)))?;
        store.add_link(&mk_link(low, "https://example.com/a/", ts(10)))?;

        let report = validate(&mut store);
        assert_eq!(report.duplicate_link_groups.len(), 1);
        assert_eq!(report.duplicate_link_groups[0].keep, low);
        assert_eq!(report.duplicate_link_groups[0].remove, vec![high]);
        Ok(())
    }

    #[test]
    fn cleanup_removes_duplicates_with_their_summaries() -> Result<(), StoreError> {
        let mut store = open_store()?;
        let loser = mk_link(LinkId::new(), "https://example.com/a/", ts(10));
        let winner = mk_link(LinkId::new(), "https://example.com/a", ts(20));
        store.add_link(&loser)?;
        store.add_link(&winner)?;
        let summary = Summary {
            id: SummaryId::new(),
            link_id: loser.id,
            content: "about the loser".to_string(),
            model: "small".to_string(),
            created_at: ts(0),
            updated_at: ts(0),
        };
        store.add_summary(&summary)?;

        let report = run_full_cleanup(&mut store);
        assert_eq!(report.removed_duplicate_links, 1);
        assert!(report.errors.is_empty());
        assert!(store.get_link(loser.id)?.is_none());
        assert!(store.get_summary(summary.id)?.is_none());
        assert!(store.get_link(winner.id)?.is_some());

        // A second sweep finds nothing left to repair.
        let second = run_full_cleanup(&mut store);
        assert_eq!(second.total_removed(), 0);
        assert!(!validate(&mut store).has_warnings());
        Ok(())
    }

    #[test]
    fn orphans_are_reported_and_removed() -> Result<(), StoreError> {
        let mut store = open_store()?;
        // No foreign keys, so dangling references go straight through the
        // facade, exactly how they arise in the wild.
        let dangling_summary = Summary {
            id: SummaryId::new(),
            link_id: LinkId::new(),
            content: "points nowhere".to_string(),
            model: "small".to_string(),
            created_at: ts(0),
            updated_at: ts(0),
        };
        store.add_summary(&dangling_summary)?;
        let dangling_message = ChatMessage {
            id: MessageId::new(),
            conversation_id: ConversationId::new(),
            link_id: LinkId::new(),
            role: ChatRole::Assistant,
            content: "hello?".to_string(),
            created_at: ts(0),
            updated_at: ts(0),
        };
        store.add_chat_message(&dangling_message)?;

        let report = validate(&mut store);
        assert_eq!(report.orphaned_summaries, vec![dangling_summary.id]);
        assert_eq!(report.orphaned_messages, vec![dangling_message.id]);
        assert_eq!(report.health(), HealthStatus::Warning);
        assert!(report.is_valid());

        let cleanup = run_full_cleanup(&mut store);
        assert_eq!(cleanup.removed_orphaned_summaries, 1);
        assert_eq!(cleanup.removed_orphaned_messages, 1);
        assert!(!validate(&mut store).has_warnings());
        Ok(())
    }

    #[test]
    fn message_with_dangling_conversation_only_is_still_an_orphan() -> Result<(), StoreError> {
        let mut store = open_store()?;
        let link = mk_link(LinkId::new(), "https://example.com", ts(0));
        store.add_link(&link)?;
        let message = ChatMessage {
            id: MessageId::new(),
            conversation_id: ConversationId::new(),
            link_id: link.id,
            role: ChatRole::User,
            content: "hi".to_string(),
            created_at: ts(0),
            updated_at: ts(0),
        };
        store.add_chat_message(&message)?;

        let report = validate(&mut store);
        assert_eq!(report.orphaned_messages, vec![message.id]);
        Ok(())
    }

    #[test]
    fn malformed_rows_are_invalid_and_fail_health() -> Result<(), StoreError> {
        let mut store = open_store()?;
        store
            .connection()
            .execute(
                "INSERT INTO links(id, url, title, description, labels_json, board_id, created_at, updated_at)
                 VALUES (?1, '', 'no url', '', '[]', NULL, NULL, NULL)",
                params![LinkId::new().to_string()],
            )
            .map_err(|err| storage_err("seed bad row", &err))?;

        let report = validate(&mut store);
        assert!(!report.is_valid());
        assert_eq!(report.health(), HealthStatus::Error);
        let reasons: Vec<&str> =
            report.invalid_rows.iter().map(|row| row.reason.as_str()).collect();
        assert!(reasons.contains(&"empty url"));
        assert!(reasons.contains(&"missing created_at"));
        Ok(())
    }

    #[test]
    fn blank_required_text_fields_are_invalid() -> Result<(), StoreError> {
        let mut store = open_store()?;
        let link = mk_link(LinkId::new(), "https://example.com", ts(0));
        store.add_link(&link)?;
        store
            .connection()
            .execute(
                "INSERT INTO summaries(id, link_id, content, model, created_at, updated_at)
                 VALUES (?1, ?2, '   ', 'small', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                params![SummaryId::new().to_string(), link.id.to_string()],
            )
            .map_err(|err| storage_err("seed blank summary", &err))?;

        let report = validate(&mut store);
        assert_eq!(report.health(), HealthStatus::Error);
        assert!(report
            .invalid_rows
            .iter()
            .any(|row| row.table == "summaries" && row.reason == "empty content"));
        Ok(())
    }

    #[test]
    fn stale_conversation_key_is_invalid() -> Result<(), StoreError> {
        let mut store = open_store()?;
        let conversation =
            store.find_or_create_active_conversation(&[LinkId::new()], "chat")?;
        store
            .connection()
            .execute(
                "UPDATE conversations SET link_ids_key = 'stale' WHERE id = ?1",
                params![conversation.id.to_string()],
            )
            .map_err(|err| storage_err("seed stale key", &err))?;

        let report = validate(&mut store);
        assert!(!report.is_valid());
        assert!(report
            .invalid_rows
            .iter()
            .any(|row| row.table == "conversations" && row.reason.contains("stale link_ids_key")));
        Ok(())
    }

    #[test]
    fn inverted_timestamps_are_invalid() -> Result<(), StoreError> {
        let mut store = open_store()?;
        let link = mk_link(LinkId::new(), "https://example.com", ts(0));
        store.add_link(&link)?;
        store
            .connection()
            .execute(
                "UPDATE links SET updated_at = '2020-01-01T00:00:00Z' WHERE id = ?1",
                params![link.id.to_string()],
            )
            .map_err(|err| storage_err("seed inverted row", &err))?;

        let report = validate(&mut store);
        assert!(report
            .invalid_rows
            .iter()
            .any(|row| row.reason == "created_at after updated_at"));
        Ok(())
    }
}
