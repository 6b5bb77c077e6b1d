use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A message fetched from a remote channel.
///
/// This is also the append log record: one `Message` serializes to exactly one
/// JSONL line. Field names on the wire follow the source (`message` for the
/// text body).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(default, deserialize_with = "iso_datetime")]
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "message", default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "string_or_int")]
    pub sender_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_int")]
    pub chat_id: Option<String>,
    pub has_media: bool,
    /// Original payload as delivered by the source, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// One (class, confidence) output of the detection capability for an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    #[serde(rename = "class")]
    pub object_class: String,
    pub confidence: f64,
}

/// Telegram-style ids arrive as either JSON strings or integers.
fn string_or_int<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Int(i64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Str(s) => s,
        Id::Int(n) => n.to_string(),
    }))
}

/// ISO-8601 timestamps: RFC 3339 with an offset, or a naive date-time or
/// bare date read as UTC.
fn iso_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    parse_iso_datetime(raw.trim())
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 timestamp: {:?}", raw)))
}

fn parse_iso_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
}
