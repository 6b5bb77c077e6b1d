//! HTTP message source.
//!
//! Talks to a JSON gateway in front of the chat network:
//!
//! ```text
//! GET {base_url}/channels/{channel}/messages?limit=N[&offset_id=ID]
//! Authorization: Bearer {token}
//!
//! 200 {"messages": [{"id": 1, "date": "...", "message": "...", "media": {...}}, ...]}
//! 429 Retry-After: 30            (or {"parameters": {"retry_after": 30}})
//! ```

use std::time::Duration;

use async_trait::async_trait;
use medlens_types::Message;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::MessageSource;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

pub struct HttpSource {
    client: reqwest::Client,
    config: HttpSourceConfig,
}

#[derive(Deserialize)]
struct PageResponse {
    messages: Vec<Value>,
}

impl HttpSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("medlens/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl MessageSource for HttpSource {
    async fn fetch_page(
        &self,
        channel: &str,
        offset_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let url = format!(
            "{}/channels/{}/messages",
            self.config.base_url.trim_end_matches('/'),
            channel
        );

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(&self.config.token)
            .query(&[("limit", limit.to_string())]);
        if let Some(offset_id) = offset_id {
            request = request.query(&[("offset_id", offset_id.to_string())]);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let header_wait = retry_after_header(response.headers());
            let body = response.text().await.unwrap_or_default();
            let wait = header_wait
                .or_else(|| retry_after_body(&body))
                .ok_or_else(|| Error::Remote {
                    status: status.as_u16(),
                    message: "rate limited without a retry-after duration".into(),
                })?;
            return Err(Error::RateLimited { wait });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote {
                status: status.as_u16(),
                message: body,
            });
        }

        let page: PageResponse = response.json().await?;
        debug!("GET {} -> {} messages", url, page.messages.len());

        page.messages.into_iter().map(message_from_payload).collect()
    }
}

/// Build a [`Message`] from one source entry, keeping the entry verbatim as
/// the payload. `has_media` is derived from a non-null `media` field.
fn message_from_payload(payload: Value) -> Result<Message> {
    let Value::Object(mut fields) = payload.clone() else {
        return Err(Error::Remote {
            status: StatusCode::OK.as_u16(),
            message: format!("message entry is not an object: {}", payload),
        });
    };

    let has_media = fields.get("media").is_some_and(|media| !media.is_null());
    fields.insert("has_media".into(), Value::Bool(has_media));
    fields.remove("payload");

    let mut message: Message = serde_json::from_value(Value::Object(fields))?;
    message.payload = Some(payload);
    Ok(message)
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn retry_after_body(body: &str) -> Option<Duration> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/parameters/retry_after")
        .or_else(|| value.get("retry_after"))
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn source(base_url: String) -> HttpSource {
        HttpSource::new(HttpSourceConfig {
            base_url,
            token: "secret".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn payload_is_kept_and_media_flag_derived() {
        let payload = json!({
            "id": 482991,
            "date": "2024-01-01T10:00:00+00:00",
            "message": "Vitamin D3 available",
            "sender_id": 77,
            "chat_id": -1001,
            "media": {"type": "photo"},
            "views": 120
        });
        let message = message_from_payload(payload.clone()).unwrap();

        assert_eq!(message.id, 482991);
        assert!(message.has_media);
        assert_eq!(message.chat_id.as_deref(), Some("-1001"));
        assert_eq!(message.payload, Some(payload));

        let without_media = message_from_payload(json!({"id": 1, "media": null})).unwrap();
        assert!(!without_media.has_media);
    }

    #[test]
    fn non_object_entries_are_rejected() {
        assert!(message_from_payload(json!([1, 2])).is_err());
        assert!(message_from_payload(json!({"message": "no id"})).is_err());
    }

    #[test]
    fn retry_after_from_header_or_body() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after_header(&headers), Some(Duration::from_secs(12)));
        assert_eq!(retry_after_header(&HeaderMap::new()), None);

        assert_eq!(
            retry_after_body(r#"{"ok":false,"parameters":{"retry_after":7}}"#),
            Some(Duration::from_secs(7))
        );
        assert_eq!(retry_after_body(r#"{"retry_after":3}"#), Some(Duration::from_secs(3)));
        assert_eq!(retry_after_body("not json"), None);
    }

    #[tokio::test]
    async fn maps_statuses_to_errors() {
        let app = Router::new()
            .route(
                "/channels/slow/messages",
                get(|| async {
                    (StatusCode::TOO_MANY_REQUESTS, [(RETRY_AFTER, "4")], "").into_response()
                }),
            )
            .route(
                "/channels/private/messages",
                get(|| async { StatusCode::UNAUTHORIZED.into_response() }),
            )
            .route(
                "/channels/broken/messages",
                get(|| async { (StatusCode::BAD_GATEWAY, "upstream down").into_response() }),
            );
        let source = source(serve(app).await);

        let err = source.fetch_page("slow", None, 10).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { wait } if wait == Duration::from_secs(4)));

        let err = source.fetch_page("private", None, 10).await.unwrap_err();
        assert!(matches!(err, Error::Auth { status: 401 }));

        let err = source.fetch_page("broken", None, 10).await.unwrap_err();
        assert!(matches!(err, Error::Remote { status: 502, .. }));
    }

    #[tokio::test]
    async fn fetches_page_with_auth_and_query() {
        let app = Router::new().route(
            "/channels/tikvahpharma/messages",
            get(
                |headers: axum::http::HeaderMap,
                 axum::extract::Query(query): axum::extract::Query<
                    std::collections::HashMap<String, String>,
                >| async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer secret");
                    if !authorized || query.get("limit").map(String::as_str) != Some("2") {
                        return StatusCode::BAD_REQUEST.into_response();
                    }
                    axum::Json(json!({
                        "messages": [
                            {"id": 2, "date": "2024-01-01T11:00:00Z", "message": "b", "chat_id": "x"},
                            {"id": 1, "date": "2024-01-01T10:00:00Z", "message": "a", "chat_id": "x"}
                        ]
                    }))
                    .into_response()
                },
            ),
        );
        let source = source(serve(app).await);

        let page = source.fetch_page("tikvahpharma", None, 2).await.unwrap();
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2, 1]);
        assert!(page.iter().all(|m| !m.has_media));
    }
}
