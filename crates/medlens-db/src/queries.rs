use std::collections::HashMap;

use crate::Database;
use crate::models::{DetectionRow, RawMessageRow};
use anyhow::Result;
use medlens_types::api::{ChannelActivity, MessageResult, ProductMention};
use rusqlite::{Connection, OptionalExtension};

/// Upper bound on rows returned by a message search.
pub const SEARCH_LIMIT: usize = 100;

impl Database {
    // -- Raw messages --

    /// Insert every row whose id is not already stored. Existing ids are left
    /// untouched. The whole batch is one transaction.
    /// Returns the number of rows actually inserted.
    pub fn insert_raw_messages(&self, rows: &[RawMessageRow]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO raw_messages (id, date, message, sender_id, chat_id, has_media, raw_payload)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (id) DO NOTHING",
                )?;
                for row in rows {
                    inserted += stmt.execute(rusqlite::params![
                        row.id,
                        row.date,
                        row.message,
                        row.sender_id,
                        row.chat_id,
                        row.has_media,
                        row.raw_payload,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    pub fn get_raw_message(&self, id: i64) -> Result<Option<RawMessageRow>> {
        self.with_conn(|conn| query_raw_message(conn, id))
    }

    pub fn count_raw_messages(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM raw_messages", [], |r| r.get(0))?)
        })
    }

    // -- Detections --

    /// Insert detections keyed by (image_path, object_class, confidence);
    /// exact duplicates are discarded. Returns the number inserted.
    pub fn insert_detections(&self, rows: &[DetectionRow]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO image_detections (image_path, message_id, object_class, confidence)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT DO NOTHING",
                )?;
                for row in rows {
                    inserted += stmt.execute(rusqlite::params![
                        row.image_path,
                        row.message_id,
                        row.object_class,
                        row.confidence,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    pub fn get_detections_for_image(&self, image_path: &str) -> Result<Vec<DetectionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT image_path, message_id, object_class, confidence
                 FROM image_detections
                 WHERE image_path = ?1
                 ORDER BY object_class, confidence",
            )?;
            let rows = stmt
                .query_map([image_path], |row| {
                    Ok(DetectionRow {
                        image_path: row.get(0)?,
                        message_id: row.get(1)?,
                        object_class: row.get(2)?,
                        confidence: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_detections(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM image_detections", [], |r| r.get(0))?)
        })
    }

    // -- Analytics --

    /// Most frequent lower-cased whitespace-separated tokens across all
    /// message text. Ties are broken alphabetically.
    pub fn top_products(&self, limit: usize) -> Result<Vec<ProductMention>> {
        let texts: Vec<String> = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT message FROM raw_messages WHERE message IS NOT NULL")?;
            let texts = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(texts)
        })?;

        // Tokenising in Rust: SQLite has no string_to_array/unnest.
        let mut counts: HashMap<String, i64> = HashMap::new();
        for text in &texts {
            for token in text.split_whitespace() {
                *counts.entry(token.to_lowercase()).or_default() += 1;
            }
        }

        let mut mentions: Vec<ProductMention> = counts
            .into_iter()
            .map(|(product, count)| ProductMention { product, count })
            .collect();
        mentions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.product.cmp(&b.product)));
        mentions.truncate(limit);
        Ok(mentions)
    }

    /// Message counts per calendar day for one chat id, oldest day first.
    pub fn channel_activity(&self, chat_id: &str) -> Result<Vec<ChannelActivity>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date(date) AS day, COUNT(*)
                 FROM raw_messages
                 WHERE chat_id = ?1 AND date IS NOT NULL
                 GROUP BY day
                 ORDER BY day",
            )?;
            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok(ChannelActivity {
                        date: row.get(0)?,
                        message_count: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Case-insensitive substring search over message text, oldest id first,
    /// at most [`SEARCH_LIMIT`] rows. Case folding is Unicode-aware (SQLite's
    /// `LIKE` only folds ASCII).
    pub fn search_messages(&self, query: &str) -> Result<Vec<MessageResult>> {
        let needle = query.to_lowercase();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, message
                 FROM raw_messages
                 WHERE message IS NOT NULL
                 ORDER BY id",
            )?;
            let mut rows = stmt.query([])?;

            let mut hits = Vec::new();
            while let Some(row) = rows.next()? {
                let message: String = row.get(2)?;
                if !message.to_lowercase().contains(&needle) {
                    continue;
                }
                hits.push(MessageResult {
                    message_id: row.get(0)?,
                    channel_id: row.get(1)?,
                    message,
                });
                if hits.len() >= SEARCH_LIMIT {
                    break;
                }
            }
            Ok(hits)
        })
    }
}

fn query_raw_message(conn: &Connection, id: i64) -> Result<Option<RawMessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, message, sender_id, chat_id, has_media, raw_payload
         FROM raw_messages WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(RawMessageRow {
                id: row.get(0)?,
                date: row.get(1)?,
                message: row.get(2)?,
                sender_id: row.get(3)?,
                chat_id: row.get(4)?,
                has_media: row.get(5)?,
                raw_payload: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}
