use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Create-if-absent only. Safe to run from several processes at once.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS raw_messages (
            id          INTEGER PRIMARY KEY,
            date        TEXT,
            message     TEXT,
            sender_id   TEXT,
            chat_id     TEXT,
            has_media   INTEGER NOT NULL,
            raw_payload TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_raw_messages_chat
            ON raw_messages(chat_id, date);

        CREATE TABLE IF NOT EXISTS image_detections (
            image_path      TEXT NOT NULL,
            message_id      INTEGER,
            object_class    TEXT NOT NULL,
            confidence      REAL NOT NULL,
            PRIMARY KEY (image_path, object_class, confidence)
        );

        CREATE INDEX IF NOT EXISTS idx_image_detections_message
            ON image_detections(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_twice_is_harmless() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute(
            "INSERT INTO raw_messages (id, has_media, raw_payload) VALUES (1, 0, '{}')",
            [],
        )
        .unwrap();

        run(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM raw_messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
