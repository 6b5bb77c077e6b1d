//! The concrete pipeline stages, each usable alone or under the orchestrator.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::Result;
use crate::collect::Collector;
use crate::enrich::EnrichmentWriter;
use crate::orchestrator::Stage;
use crate::persister::Persister;
use crate::transform::Transformer;

/// Fetches every channel into today's (UTC) partition.
pub struct CollectStage(pub Collector);

#[async_trait]
impl Stage for CollectStage {
    async fn run(&self) -> Result<()> {
        let stats = self.0.collect(Utc::now().date_naive()).await?;
        info!(
            "Collect: {} messages from {} channels",
            stats.messages, stats.channels
        );
        Ok(())
    }
}

pub struct PersistStage {
    pub persister: Persister,
    pub root: PathBuf,
}

#[async_trait]
impl Stage for PersistStage {
    async fn run(&self) -> Result<()> {
        let stats = self.persister.load_all(&self.root).await?;
        info!(
            "Persist: {} partitions, {} records, {} new rows",
            stats.partitions, stats.records, stats.inserted
        );
        Ok(())
    }
}

pub struct TransformStage(pub Transformer);

#[async_trait]
impl Stage for TransformStage {
    async fn run(&self) -> Result<()> {
        self.0.transform().await
    }
}

pub struct EnrichStage {
    pub writer: EnrichmentWriter,
    pub root: PathBuf,
}

#[async_trait]
impl Stage for EnrichStage {
    async fn run(&self) -> Result<()> {
        let stats = self.writer.enrich_all(&self.root).await?;
        info!(
            "Enrich: {} images, {} detections, {} new rows",
            stats.images, stats.detections, stats.inserted
        );
        Ok(())
    }
}
