use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

/// Separator for the conversation link-set key. ULIDs are Crockford
/// base32, so this byte can never appear inside an id.
pub const LINK_IDS_KEY_SEPARATOR: char = '|';

/// Fixed row id of the settings singleton.
pub const SETTINGS_SINGLETON_ID: &str = "settings";

/// Character budget for title/description in archived link snapshots.
pub const ARCHIVE_FIELD_MAX_CHARS: usize = 5000;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("duplicate {entity} id: {id}")]
    DuplicateKey { entity: &'static str, id: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LinkId(pub Ulid);

impl LinkId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LinkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BoardId(pub Ulid);

impl BoardId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for BoardId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BoardId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SummaryId(pub Ulid);

impl SummaryId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SummaryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SummaryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MessageId(pub Ulid);

impl MessageId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ConversationId(pub Ulid);

impl ConversationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(pub Ulid);

impl TaskId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DownloadId(pub Ulid);

impl DownloadId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DownloadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InstallationId(pub Ulid);

impl InstallationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for InstallationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for InstallationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Done,
    Dismissed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Done => "done",
            Self::Dismissed => "dismissed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "done" => Some(Self::Done),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub id: LinkId,
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub board_id: Option<BoardId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Link {
    /// Validate a link row before it reaches storage.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] when the URL is empty or the
    /// timestamp pair is out of order.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.url.trim().is_empty() {
            return Err(StoreError::Validation("link url MUST be non-empty".to_string()));
        }
        check_timestamps("link", self.created_at, self.updated_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Board {
    /// # Errors
    /// Returns [`StoreError::Validation`] for an empty name or an out of
    /// order timestamp pair.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Validation("board name MUST be non-empty".to_string()));
        }
        check_timestamps("board", self.created_at, self.updated_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub id: SummaryId,
    pub link_id: LinkId,
    pub content: String,
    pub model: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Summary {
    /// # Errors
    /// Returns [`StoreError::Validation`] for empty content or an out of
    /// order timestamp pair.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.content.trim().is_empty() {
            return Err(StoreError::Validation("summary content MUST be non-empty".to_string()));
        }
        check_timestamps("summary", self.created_at, self.updated_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub link_id: LinkId,
    pub role: ChatRole,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ChatMessage {
    /// # Errors
    /// Returns [`StoreError::Validation`] for empty content or an out of
    /// order timestamp pair.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.content.trim().is_empty() {
            return Err(StoreError::Validation(
                "chat message content MUST be non-empty".to_string(),
            ));
        }
        check_timestamps("chat_message", self.created_at, self.updated_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub link_ids: Vec<LinkId>,
    /// Derived: sorted-unique join of `link_ids`. Maintained by the store on
    /// every write that can change the set.
    pub link_ids_key: String,
    pub title: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    /// # Errors
    /// Returns [`StoreError::Validation`] when the participant set is empty,
    /// the persisted key disagrees with the computed one, or the timestamp
    /// pair is out of order.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.link_ids.is_empty() {
            return Err(StoreError::Validation(
                "conversation MUST reference at least one link".to_string(),
            ));
        }
        if self.link_ids_key != link_ids_key(&self.link_ids) {
            return Err(StoreError::Validation(
                "conversation link_ids_key does not match its link set".to_string(),
            ));
        }
        check_timestamps("conversation", self.created_at, self.updated_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Settings {
    pub theme: String,
    pub ai_model: String,
    pub summary_language: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Settings {
    #[must_use]
    pub fn initial(now: OffsetDateTime) -> Self {
        Self {
            theme: "system".to_string(),
            ai_model: "default".to_string(),
            summary_language: "en".to_string(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub link_id: Option<LinkId>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Task {
    /// # Errors
    /// Returns [`StoreError::Validation`] for an empty title or an out of
    /// order timestamp pair.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::Validation("task title MUST be non-empty".to_string()));
        }
        check_timestamps("task", self.created_at, self.updated_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadEvent {
    pub id: DownloadId,
    pub url: String,
    pub link_id: Option<LinkId>,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl DownloadEvent {
    /// # Errors
    /// Returns [`StoreError::Validation`] for an empty URL.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.url.trim().is_empty() {
            return Err(StoreError::Validation(
                "download event url MUST be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtensionInstallation {
    pub id: InstallationId,
    pub browser: String,
    pub extension_version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub installed_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ExtensionInstallation {
    /// # Errors
    /// Returns [`StoreError::Validation`] for an empty browser name or an
    /// out of order timestamp pair.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.browser.trim().is_empty() {
            return Err(StoreError::Validation(
                "installation browser MUST be non-empty".to_string(),
            ));
        }
        check_timestamps("extension_installation", self.created_at, self.updated_at)
    }
}

/// Trimmed snapshot of a hard-deleted link, appended to the archival log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchivedLink {
    pub id: LinkId,
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub deleted_at: OffsetDateTime,
}

impl ArchivedLink {
    #[must_use]
    pub fn from_link(link: &Link, deleted_at: OffsetDateTime) -> Self {
        Self {
            id: link.id,
            url: link.url.clone(),
            title: truncate_chars(&link.title, ARCHIVE_FIELD_MAX_CHARS),
            description: truncate_chars(&link.description, ARCHIVE_FIELD_MAX_CHARS),
            labels: link.labels.clone(),
            deleted_at,
        }
    }
}

fn check_timestamps(
    entity: &'static str,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
) -> Result<(), StoreError> {
    if created_at > updated_at {
        return Err(StoreError::Validation(format!(
            "{entity} created_at MUST be <= updated_at"
        )));
    }
    Ok(())
}

/// Canonical natural key for a link URL: whitespace trimmed, lowercased,
/// trailing slashes stripped. Two links with equal canonical keys are
/// logical duplicates even when their stored URLs differ in formatting.
#[must_use]
pub fn canonical_url_key(url: &str) -> String {
    let trimmed = url.trim().to_lowercase();
    trimmed.trim_end_matches('/').to_string()
}

/// Order-independent key for a conversation's participant link set:
/// sorted-unique ids joined with [`LINK_IDS_KEY_SEPARATOR`].
#[must_use]
pub fn link_ids_key(link_ids: &[LinkId]) -> String {
    let sorted = link_ids.iter().map(ToString::to_string).collect::<BTreeSet<_>>();
    sorted.into_iter().collect::<Vec<_>>().join(&LINK_IDS_KEY_SEPARATOR.to_string())
}

/// Truncate to at most `max_chars` characters on a char boundary.
#[must_use]
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::Duration;

    use super::*;

    fn fixture_time() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_704_067_200)
            .unwrap_or_else(|err| panic!("fixture timestamp should be valid: {err}"))
    }

    fn mk_link(url: &str) -> Link {
        Link {
            id: LinkId::new(),
            url: url.to_string(),
            title: "title".to_string(),
            description: "description".to_string(),
            labels: vec![],
            board_id: None,
            created_at: fixture_time(),
            updated_at: fixture_time(),
        }
    }

    #[test]
    fn canonical_url_key_normalizes_case_and_trailing_slashes() {
        assert_eq!(canonical_url_key("HTTPS://Example.com/Page/"), "https://example.com/page");
        assert_eq!(canonical_url_key("  https://example.com///  "), "https://example.com");
        assert_eq!(canonical_url_key("https://example.com/a"), "https://example.com/a");
    }

    #[test]
    fn canonical_url_key_is_idempotent() {
        let once = canonical_url_key("HTTPS://Example.com/Page/");
        assert_eq!(canonical_url_key(&once), once);
    }

    #[test]
    fn link_ids_key_is_order_independent_and_set_sensitive() {
        let a = LinkId::new();
        let b = LinkId::new();

        assert_eq!(link_ids_key(&[a, b]), link_ids_key(&[b, a]));
        assert_eq!(link_ids_key(&[a, a, b]), link_ids_key(&[a, b]));
        assert_ne!(link_ids_key(&[a]), link_ids_key(&[a, b]));
    }

    #[test]
    fn link_ids_key_joins_with_separator() {
        let a = LinkId::new();
        let b = LinkId::new();
        let key = link_ids_key(&[a, b]);

        assert_eq!(key.matches(LINK_IDS_KEY_SEPARATOR).count(), 1);
        assert!(key.contains(&a.to_string()));
        assert!(key.contains(&b.to_string()));
    }

    #[test]
    fn link_rejects_empty_url_and_inverted_timestamps() {
        let empty = mk_link("   ");
        assert!(matches!(empty.validate(), Err(StoreError::Validation(_))));

        let mut inverted = mk_link("https://example.com");
        inverted.created_at = fixture_time() + Duration::hours(1);
        assert!(matches!(inverted.validate(), Err(StoreError::Validation(_))));

        assert!(mk_link("https://example.com").validate().is_ok());
    }

    #[test]
    fn conversation_rejects_stale_link_ids_key() {
        let a = LinkId::new();
        let b = LinkId::new();
        let conversation = Conversation {
            id: ConversationId::new(),
            link_ids: vec![a, b],
            link_ids_key: link_ids_key(&[a]),
            title: "chat".to_string(),
            ended_at: None,
            created_at: fixture_time(),
            updated_at: fixture_time(),
        };

        assert!(matches!(conversation.validate(), Err(StoreError::Validation(_))));
    }

    #[test]
    fn conversation_requires_at_least_one_link() {
        let conversation = Conversation {
            id: ConversationId::new(),
            link_ids: vec![],
            link_ids_key: String::new(),
            title: "chat".to_string(),
            ended_at: None,
            created_at: fixture_time(),
            updated_at: fixture_time(),
        };

        assert!(matches!(conversation.validate(), Err(StoreError::Validation(_))));
    }

    #[test]
    fn archived_link_truncates_oversized_fields() {
        let mut link = mk_link("https://example.com");
        link.title = "t".repeat(ARCHIVE_FIELD_MAX_CHARS + 100);
        link.description = "d".repeat(ARCHIVE_FIELD_MAX_CHARS + 1);

        let archived = ArchivedLink::from_link(&link, fixture_time());
        assert_eq!(archived.title.chars().count(), ARCHIVE_FIELD_MAX_CHARS);
        assert_eq!(archived.description.chars().count(), ARCHIVE_FIELD_MAX_CHARS);
        assert_eq!(archived.url, link.url);
    }

    proptest! {
        #[test]
        fn property_link_ids_key_ignores_permutation(raw_ids in prop::collection::vec(any::<u128>(), 1..8), seed in any::<u64>()) {
            let ids = raw_ids.into_iter().map(|raw| LinkId(Ulid::from(raw))).collect::<Vec<_>>();
            let mut shuffled = ids.clone();

            let mut state = seed;
            for index in (1..shuffled.len()).rev() {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
                let pick = usize::try_from(state % (index as u64 + 1)).unwrap_or(0);
                shuffled.swap(index, pick);
            }

            prop_assert_eq!(link_ids_key(&ids), link_ids_key(&shuffled));
        }
    }
}
