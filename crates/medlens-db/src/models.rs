/// Database row types — these map directly to SQLite rows.
/// Distinct from medlens-types models to keep the DB layer independent.

pub struct RawMessageRow {
    pub id: i64,
    pub date: Option<String>,
    pub message: Option<String>,
    pub sender_id: Option<String>,
    pub chat_id: Option<String>,
    pub has_media: bool,
    pub raw_payload: String,
}

pub struct DetectionRow {
    pub image_path: String,
    pub message_id: Option<i64>,
    pub object_class: String,
    pub confidence: f64,
}
