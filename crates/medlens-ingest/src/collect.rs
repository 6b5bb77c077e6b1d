//! Collect stage: fetch each channel and append its messages to the log.

use std::pin::pin;

use chrono::NaiveDate;
use futures_util::TryStreamExt;
use tracing::info;

use crate::Result;
use crate::append_log::AppendLog;
use crate::source::{SourceClient, channel_name};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub channels: usize,
    pub messages: usize,
}

pub struct Collector {
    client: SourceClient,
    log: AppendLog,
    channels: Vec<String>,
    fetch_limit: usize,
}

impl Collector {
    pub fn new(client: SourceClient, log: AppendLog, channels: Vec<String>, fetch_limit: usize) -> Self {
        Self {
            client,
            log,
            channels,
            fetch_limit,
        }
    }

    /// Fetch every configured channel in turn into the `date` partition.
    /// The first failing channel aborts the stage.
    pub async fn collect(&self, date: NaiveDate) -> Result<CollectStats> {
        let mut stats = CollectStats::default();

        for reference in &self.channels {
            let channel = channel_name(reference)?;
            info!("Scraping {} into partition {}", reference, date);

            let mut messages = pin!(self.client.fetch(&channel, self.fetch_limit));
            let mut count = 0;
            while let Some(message) = messages.try_next().await? {
                self.log.append(&channel, date, &message).await?;
                count += 1;
            }

            info!("Channel {}: {} messages appended", channel, count);
            stats.channels += 1;
            stats.messages += count;
        }

        Ok(stats)
    }
}
