//! Loads append log partitions into `raw_messages`.
//!
//! Each partition is parsed completely before anything is written, then
//! inserted in a single transaction. A malformed line therefore fails the load
//! without committing any row of its partition. Partitions loaded earlier in
//! the same call stay committed; re-running the load is always safe because
//! inserts skip ids that already exist.

use std::path::Path;
use std::sync::Arc;

use chrono::SecondsFormat;
use medlens_db::Database;
use medlens_db::models::RawMessageRow;
use medlens_types::Message;
use tracing::info;

use crate::append_log::{AppendLog, Partition};
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub partitions: usize,
    pub records: usize,
    pub inserted: usize,
}

pub struct Persister {
    db: Arc<Database>,
}

impl Persister {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load every partition under `root`. Returns how many rows were new.
    pub async fn load_all(&self, root: &Path) -> Result<LoadStats> {
        let log = AppendLog::new(root);
        let mut stats = LoadStats::default();

        for partition in log.partitions().await? {
            let (records, inserted) = self.load_partition(&partition).await?;
            info!(
                "Loaded {} ({} records, {} new)",
                partition.path.display(),
                records,
                inserted
            );
            stats.partitions += 1;
            stats.records += records;
            stats.inserted += inserted;
        }

        Ok(stats)
    }

    async fn load_partition(&self, partition: &Partition) -> Result<(usize, usize)> {
        let contents = tokio::fs::read_to_string(&partition.path).await?;
        let rows = parse_partition(&partition.path, &contents)?;
        let records = rows.len();

        let db = self.db.clone();
        let inserted = tokio::task::spawn_blocking(move || db.insert_raw_messages(&rows)).await??;

        Ok((records, inserted))
    }
}

/// Parse every non-blank line; the first bad line fails the whole partition.
fn parse_partition(path: &Path, contents: &str) -> Result<Vec<RawMessageRow>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let message: Message =
                serde_json::from_str(line).map_err(|e| Error::Malformed {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    reason: e.to_string(),
                })?;
            Ok(row_from_message(message, line.trim()))
        })
        .collect()
}

fn row_from_message(message: Message, raw_line: &str) -> RawMessageRow {
    RawMessageRow {
        id: message.id,
        date: message
            .date
            .map(|d| d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        message: message.text,
        sender_id: message.sender_id,
        chat_id: message.chat_id,
        has_media: message.has_media,
        raw_payload: raw_line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn write_partition(root: &Path, date: &str, channel: &str, lines: &[&str]) {
        let dir = root.join(date);
        std::fs::create_dir_all(&dir).unwrap();
        let mut body = lines.join("\n");
        body.push('\n');
        std::fs::write(dir.join(format!("{}.jsonl", channel)), body).unwrap();
    }

    const LINE_1: &str = r#"{"id":1,"date":"2024-01-01T08:00:00+00:00","message":"Amoxicillin","sender_id":null,"chat_id":"x","has_media":false}"#;
    const LINE_2: &str = r#"{"id":2,"date":"2024-01-01T09:00:00+00:00","message":"Vitamin C","sender_id":"5","chat_id":"x","has_media":true}"#;

    #[tokio::test]
    async fn loading_twice_inserts_once() {
        let dir = tempfile::tempdir().unwrap();
        write_partition(dir.path(), "2024-01-01", "x", &[LINE_1, LINE_2, LINE_1]);
        let db = Arc::new(Database::open_in_memory().unwrap());
        let persister = Persister::new(db.clone());

        let first = persister.load_all(dir.path()).await.unwrap();
        assert_eq!(
            first,
            LoadStats {
                partitions: 1,
                records: 3,
                inserted: 2
            }
        );

        let second = persister.load_all(dir.path()).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(db.count_raw_messages().unwrap(), 2);

        let row = db.get_raw_message(2).unwrap().unwrap();
        assert_eq!(row.date.as_deref(), Some("2024-01-01T09:00:00Z"));
        assert_eq!(row.sender_id.as_deref(), Some("5"));
        assert!(row.has_media);
        assert_eq!(row.raw_payload, LINE_2);
    }

    #[tokio::test]
    async fn malformed_line_commits_nothing_from_its_partition() {
        let dir = tempfile::tempdir().unwrap();
        write_partition(dir.path(), "2024-01-01", "x", &[LINE_1, "{not json", LINE_2]);
        let db = Arc::new(Database::open_in_memory().unwrap());

        let err = Persister::new(db.clone())
            .load_all(dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Malformed { line: 2, .. }));
        assert_eq!(db.count_raw_messages().unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_required_field_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write_partition(dir.path(), "2024-01-01", "x", &[r#"{"id":3,"message":"no flag"}"#]);
        let db = Arc::new(Database::open_in_memory().unwrap());

        let err = Persister::new(db).load_all(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Malformed { line: 1, .. }));
    }

    #[tokio::test]
    async fn timestamps_without_offset_load_as_utc() {
        let dir = tempfile::tempdir().unwrap();
        write_partition(
            dir.path(),
            "2024-01-01",
            "x",
            &[
                r#"{"id":1,"date":"2024-01-01T10:00:00","message":"a","has_media":false}"#,
                r#"{"id":2,"date":"2024-01-01T11:00:00+00:00","message":"b","has_media":false}"#,
                r#"{"id":3,"date":"2024-01-02","message":"c","has_media":false}"#,
                r#"{"id":4,"date":"2024-01-02T08:30:15.125Z","message":"d","has_media":false}"#,
            ],
        );
        let db = Arc::new(Database::open_in_memory().unwrap());

        let stats = Persister::new(db.clone()).load_all(dir.path()).await.unwrap();
        assert_eq!(stats.inserted, 4);

        let date = |id| db.get_raw_message(id).unwrap().unwrap().date;
        assert_eq!(date(1).as_deref(), Some("2024-01-01T10:00:00Z"));
        assert_eq!(date(2).as_deref(), Some("2024-01-01T11:00:00Z"));
        assert_eq!(date(3).as_deref(), Some("2024-01-02T00:00:00Z"));
        assert_eq!(date(4).as_deref(), Some("2024-01-02T08:30:15.125Z"));
    }

    #[tokio::test]
    async fn blank_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_partition(dir.path(), "2024-01-01", "x", &[LINE_1, "", "   ", LINE_2]);
        let db = Arc::new(Database::open_in_memory().unwrap());

        let stats = Persister::new(db).load_all(dir.path()).await.unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.inserted, 2);
    }

    #[tokio::test]
    async fn reads_what_the_append_log_writes() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let mut message = crate::source::tests::message(77);
        message.payload = Some(serde_json::json!({"id": 77, "views": 10}));
        log.append("pharma", date, &message).await.unwrap();

        let db = Arc::new(Database::open_in_memory().unwrap());
        let stats = Persister::new(db.clone()).load_all(dir.path()).await.unwrap();

        assert_eq!(stats.inserted, 1);
        let row = db.get_raw_message(77).unwrap().unwrap();
        let raw: serde_json::Value = serde_json::from_str(&row.raw_payload).unwrap();
        assert_eq!(raw["payload"]["views"], 10);
    }
}
