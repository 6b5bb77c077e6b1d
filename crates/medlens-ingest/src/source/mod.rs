//! Remote message sources.
//!
//! A [`MessageSource`] knows how to fetch one page of a channel's history.
//! [`SourceClient`] sits in front of it and turns pages into a lazy stream of
//! messages, sleeping through rate-limit signals along the way.

mod http;

pub use http::{HttpSource, HttpSourceConfig};

use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::Stream;
use medlens_types::Message;
use tracing::{debug, warn};

use crate::{Error, Result};

/// One page of a remote channel's history.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch up to `limit` messages of `channel` that are older than
    /// `offset_id`, newest first. `None` starts from the latest message.
    ///
    /// Returns [`Error::RateLimited`] when the source asks the caller to wait;
    /// every other error is fatal.
    async fn fetch_page(
        &self,
        channel: &str,
        offset_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Messages requested per page.
    pub page_size: usize,

    /// Consecutive rate-limit waits tolerated for a single page before the
    /// fetch fails with [`Error::RateLimitExhausted`].
    pub rate_limit_max_waits: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            rate_limit_max_waits: 10,
        }
    }
}

/// Rate-limit aware paging client over a [`MessageSource`].
pub struct SourceClient {
    source: Arc<dyn MessageSource>,
    config: ClientConfig,
}

impl SourceClient {
    pub fn new(source: Arc<dyn MessageSource>, config: ClientConfig) -> Self {
        Self { source, config }
    }

    /// Lazily fetch at most `max_count` messages of `channel`, in the order
    /// the source delivers them.
    ///
    /// The stream ends once `max_count` messages were yielded or the source
    /// returns a short page. It cannot be restarted.
    pub fn fetch<'a>(
        &'a self,
        channel: &'a str,
        max_count: usize,
    ) -> impl Stream<Item = Result<Message>> + 'a {
        try_stream! {
            let mut remaining = max_count;
            let mut offset_id = None;

            while remaining > 0 {
                let limit = remaining.min(self.config.page_size.max(1));
                let page = self.fetch_page_patiently(channel, offset_id, limit).await?;
                let exhausted = page.len() < limit;
                debug!("Channel {}: fetched page of {} messages", channel, page.len());

                for message in page.into_iter().take(remaining) {
                    offset_id = Some(message.id);
                    remaining -= 1;
                    yield message;
                }

                if exhausted {
                    break;
                }
            }
        }
    }

    async fn fetch_page_patiently(
        &self,
        channel: &str,
        offset_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let mut waits = 0;
        loop {
            match self.source.fetch_page(channel, offset_id, limit).await {
                Err(Error::RateLimited { wait }) => {
                    if waits >= self.config.rate_limit_max_waits {
                        return Err(Error::RateLimitExhausted {
                            channel: channel.to_string(),
                            waits,
                        });
                    }
                    waits += 1;
                    warn!(
                        "Channel {}: rate limited, sleeping {:.1}s (wait {}/{})",
                        channel,
                        wait.as_secs_f64(),
                        waits,
                        self.config.rate_limit_max_waits
                    );
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }
}

/// Partition name for a channel reference: the last path segment of a URL
/// such as `https://t.me/tikvahpharma`, without a leading `@`.
///
/// The name is used verbatim as a file name and as a URL path segment, so it
/// may only hold ASCII letters, digits, `_` and `-`.
pub fn channel_name(reference: &str) -> Result<String> {
    let name = reference
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_start_matches('@');

    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(Error::InvalidChannel(reference.to_string()));
    }
    Ok(name.to_string())
}
