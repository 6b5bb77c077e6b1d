use serde::{Deserialize, Serialize};

// -- Reports --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMention {
    pub product: String,
    pub count: i64,
}

// -- Channels --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelActivity {
    pub date: String,
    pub message_count: i64,
}

// -- Search --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResult {
    pub message_id: i64,
    pub channel_id: Option<String>,
    pub message: String,
}
