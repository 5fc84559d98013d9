//! Bounded NDJSON log of hard-deleted links. One JSON object per line,
//! oldest first; the log is a ring, not an audit trail, so appends past
//! capacity evict the oldest entries.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use linkvault_core::{ArchivedLink, StoreError};

/// Retained entries per log. Deletes beyond this evict oldest-first.
pub const ARCHIVE_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct ArchiveLog {
    path: PathBuf,
    capacity: usize,
}

impl ArchiveLog {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, capacity: ARCHIVE_CAPACITY }
    }

    #[must_use]
    pub fn with_capacity(path: PathBuf, capacity: usize) -> Self {
        Self { path, capacity }
    }

    /// Append a snapshot, evicting oldest entries past capacity. The whole
    /// log is rewritten on each append; at the fixed capacity that stays
    /// cheap, and it lets eviction and append land in one write.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] when the log cannot be read back or
    /// rewritten.
    pub fn append(&self, record: &ArchivedLink) -> Result<(), StoreError> {
        let mut lines = self.read_lines()?;
        let encoded = serde_json::to_string(record)
            .map_err(|err| StoreError::Storage(format!("failed to encode archive entry: {err}")))?;
        lines.push(encoded);
        while lines.len() > self.capacity {
            lines.remove(0);
        }

        let file = File::create(&self.path).map_err(|err| {
            StoreError::Storage(format!(
                "failed to open archive log {}: {err}",
                self.path.display()
            ))
        })?;
        let mut writer = BufWriter::new(file);
        for line in &lines {
            writeln!(writer, "{line}").map_err(|err| {
                StoreError::Storage(format!("failed to write archive log: {err}"))
            })?;
        }
        writer
            .flush()
            .map_err(|err| StoreError::Storage(format!("failed to flush archive log: {err}")))?;
        Ok(())
    }

    /// Decode every entry, oldest first. Undecodable lines are skipped so a
    /// torn write never blocks later appends or reads.
    ///
    /// # Errors
    /// Returns [`StoreError::Storage`] when the log file cannot be read.
    pub fn read_all(&self) -> Result<Vec<ArchivedLink>, StoreError> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    fn read_lines(&self) -> Result<Vec<String>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).map_err(|err| {
            StoreError::Storage(format!(
                "failed to open archive log {}: {err}",
                self.path.display()
            ))
        })?;
        let reader = BufReader::new(file);
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|err| {
                StoreError::Storage(format!("failed to read archive log: {err}"))
            })?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use linkvault_core::{Link, LinkId};
    use time::OffsetDateTime;
    use ulid::Ulid;

    use super::*;

    fn temp_log(capacity: usize) -> (PathBuf, ArchiveLog) {
        let dir = std::env::temp_dir().join(format!("linkvault-log-{}", Ulid::new()));
        std::fs::create_dir_all(&dir)
            .unwrap_or_else(|err| panic!("temp dir should be creatable: {err}"));
        let path = dir.join("deleted_links.ndjson");
        (dir, ArchiveLog::with_capacity(path, capacity))
    }

    fn snapshot(url: &str) -> ArchivedLink {
        let now = OffsetDateTime::from_unix_timestamp(1_704_067_200)
            .unwrap_or_else(|err| panic!("fixture timestamp should be valid: {err}"));
        let link = Link {
            id: LinkId::new(),
            url: url.to_string(),
            title: "t".to_string(),
            description: String::new(),
            labels: Vec::new(),
            board_id: None,
            created_at: now,
            updated_at: now,
        };
        ArchivedLink::from_link(&link, now)
    }

    #[test]
    fn append_and_read_preserve_order() -> Result<(), StoreError> {
        let (dir, log) = temp_log(8);
        log.append(&snapshot("https://one.example"))?;
        log.append(&snapshot("https://two.example"))?;

        let records = log.read_all()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, "https://one.example");
        assert_eq!(records[1].url, "https://two.example");

        std::fs::remove_dir_all(dir)
            .map_err(|err| StoreError::Storage(format!("temp cleanup: {err}")))?;
        Ok(())
    }

    #[test]
    fn capacity_evicts_oldest_first() -> Result<(), StoreError> {
        let (dir, log) = temp_log(3);
        for index in 0..5 {
            log.append(&snapshot(&format!("https://example.com/{index}")))?;
        }

        let records = log.read_all()?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].url, "https://example.com/2");
        assert_eq!(records[2].url, "https://example.com/4");

        std::fs::remove_dir_all(dir)
            .map_err(|err| StoreError::Storage(format!("temp cleanup: {err}")))?;
        Ok(())
    }

    #[test]
    fn undecodable_lines_are_skipped() -> Result<(), StoreError> {
        let (dir, log) = temp_log(8);
        log.append(&snapshot("https://example.com"))?;

        let path = dir.join("deleted_links.ndjson");
        let mut raw = std::fs::read_to_string(&path)
            .map_err(|err| StoreError::Storage(format!("read log: {err}")))?;
        raw.push_str("not json\n");
        std::fs::write(&path, raw)
            .map_err(|err| StoreError::Storage(format!("write log: {err}")))?;

        assert_eq!(log.read_all()?.len(), 1);
        // A further append still works and keeps the decodable entry.
        log.append(&snapshot("https://two.example"))?;
        assert_eq!(log.read_all()?.len(), 2);

        std::fs::remove_dir_all(dir)
            .map_err(|err| StoreError::Storage(format!("temp cleanup: {err}")))?;
        Ok(())
    }

    #[test]
    fn missing_file_reads_as_empty() -> Result<(), StoreError> {
        let (dir, log) = temp_log(8);
        assert!(log.read_all()?.is_empty());
        std::fs::remove_dir_all(dir)
            .map_err(|err| StoreError::Storage(format!("temp cleanup: {err}")))?;
        Ok(())
    }
}
