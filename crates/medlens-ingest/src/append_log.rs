//! Date- and channel-partitioned JSONL log of fetched messages.
//!
//! Layout:
//! ```text
//! {root}/2024-01-01/tikvahpharma.jsonl
//! {root}/2024-01-01/lobelia4cosmetics.jsonl
//! {root}/2024-01-02/tikvahpharma.jsonl
//! ```
//!
//! Records are only ever appended. Runs on the same day for the same channel
//! share a partition, so a partition may hold the same message id more than
//! once; the persister dedupes on load.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use medlens_types::Message;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::Result;

const PARTITION_DATE_FORMAT: &str = "%Y-%m-%d";
const PARTITION_EXTENSION: &str = "jsonl";

/// One `{date}/{channel}.jsonl` file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Partition {
    pub date: NaiveDate,
    pub channel: String,
    pub path: PathBuf,
}

pub struct AppendLog {
    root: PathBuf,
}

impl AppendLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_path(&self, channel: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join(date.format(PARTITION_DATE_FORMAT).to_string())
            .join(format!("{}.{}", channel, PARTITION_EXTENSION))
    }

    /// Append one message as a single line, creating the partition if needed.
    pub async fn append(&self, channel: &str, date: NaiveDate, message: &Message) -> Result<()> {
        let path = self.partition_path(channel, date);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Every partition under the root, ordered by date then channel.
    ///
    /// Directories whose name is not a date are skipped. A missing root means
    /// nothing has been collected yet.
    pub async fn partitions(&self) -> Result<Vec<Partition>> {
        let mut partitions = Vec::new();

        let mut days = match fs::read_dir(&self.root).await {
            Ok(days) => days,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Append log root {} does not exist yet", self.root.display());
                return Ok(partitions);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(day) = days.next_entry().await? {
            if !day.file_type().await?.is_dir() {
                continue;
            }
            let name = day.file_name();
            let name = name.to_string_lossy();
            let Ok(date) = NaiveDate::parse_from_str(&name, PARTITION_DATE_FORMAT) else {
                warn!("Skipping non-partition directory {}", day.path().display());
                continue;
            };

            let mut files = fs::read_dir(day.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if !file.file_type().await?.is_file()
                    || path.extension().is_none_or(|ext| ext != PARTITION_EXTENSION)
                {
                    continue;
                }
                let Some(channel) = path.file_stem().map(|s| s.to_string_lossy().into_owned())
                else {
                    continue;
                };
                partitions.push(Partition { date, channel, path });
            }
        }

        partitions.sort();
        Ok(partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tests::message;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn appends_one_line_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::new(dir.path());

        log.append("x", day("2024-01-01"), &message(1)).await.unwrap();
        log.append("x", day("2024-01-01"), &message(2)).await.unwrap();
        log.append("x", day("2024-01-01"), &message(1)).await.unwrap();

        let path = dir.path().join("2024-01-01").join("x.jsonl");
        let contents = std::fs::read_to_string(path).unwrap();
        let ids: Vec<i64> = contents
            .lines()
            .map(|l| serde_json::from_str::<Message>(l).unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn lists_partitions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::new(dir.path());

        log.append("b", day("2024-01-02"), &message(1)).await.unwrap();
        log.append("a", day("2024-01-02"), &message(2)).await.unwrap();
        log.append("z", day("2024-01-01"), &message(3)).await.unwrap();
        std::fs::create_dir_all(dir.path().join("scratch")).unwrap();
        std::fs::write(dir.path().join("2024-01-01").join("notes.txt"), "x").unwrap();

        let found: Vec<(String, String)> = log
            .partitions()
            .await
            .unwrap()
            .into_iter()
            .map(|p| (p.date.to_string(), p.channel))
            .collect();

        assert_eq!(
            found,
            vec![
                ("2024-01-01".to_string(), "z".to_string()),
                ("2024-01-02".to_string(), "a".to_string()),
                ("2024-01-02".to_string(), "b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn missing_root_has_no_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::new(dir.path().join("never-created"));
        assert!(log.partitions().await.unwrap().is_empty());
    }
}
