//! Enrich stage: run detection over collected images and record the results.

use std::path::Path;
use std::sync::Arc;

use medlens_db::Database;
use medlens_db::models::DetectionRow;
use tracing::info;

use crate::Result;
use crate::detect::{Detector, find_images, message_id_from_path};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub images: usize,
    pub detections: usize,
    pub inserted: usize,
}

pub struct EnrichmentWriter {
    db: Arc<Database>,
    detector: Arc<dyn Detector>,
}

impl EnrichmentWriter {
    pub fn new(db: Arc<Database>, detector: Arc<dyn Detector>) -> Self {
        Self { db, detector }
    }

    /// Detect objects in every image under `root`. Detections already stored
    /// for the same (image, class, confidence) are skipped, so this is safe
    /// to repeat. The first detection failure aborts the stage.
    pub async fn enrich_all(&self, root: &Path) -> Result<EnrichStats> {
        let scan_root = root.to_path_buf();
        let images = tokio::task::spawn_blocking(move || find_images(&scan_root)).await??;
        let mut stats = EnrichStats::default();

        for image in &images {
            let inserted = self.enrich_image(image, &mut stats).await?;
            info!("Processed {} ({} new detections)", image.display(), inserted);
        }

        Ok(stats)
    }

    async fn enrich_image(&self, image: &Path, stats: &mut EnrichStats) -> Result<usize> {
        let detections = self.detector.detect(image).await?;
        let message_id = message_id_from_path(image);
        let image_path = image.to_string_lossy().into_owned();

        let rows: Vec<DetectionRow> = detections
            .into_iter()
            .map(|d| DetectionRow {
                image_path: image_path.clone(),
                message_id,
                object_class: d.object_class,
                confidence: d.confidence,
            })
            .collect();

        stats.images += 1;
        stats.detections += rows.len();

        let db = self.db.clone();
        let inserted = tokio::task::spawn_blocking(move || db.insert_detections(&rows)).await??;
        stats.inserted += inserted;
        Ok(inserted)
    }
}
