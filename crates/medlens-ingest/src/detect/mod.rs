//! Object detection on collected images.
//!
//! The detection model itself is external; [`Detector`] is the seam. The
//! concrete [`HttpDetector`] posts image bytes to a detection service.

mod http;

pub use http::HttpDetector;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use medlens_types::ObjectDetection;
use regex::Regex;

use crate::Result;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

static MESSAGE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\.(?:jpg|jpeg|png)$").expect("message id pattern is valid")
});

#[async_trait]
pub trait Detector: Send + Sync {
    /// Detect objects in one image, in the order the model reports them.
    async fn detect(&self, image: &Path) -> Result<Vec<ObjectDetection>>;
}

/// Message id encoded in an image file name such as `482991.jpg`.
pub fn message_id_from_path(image: &Path) -> Option<i64> {
    let name = image.file_name()?.to_str()?;
    MESSAGE_ID_RE.captures(name)?.get(1)?.as_str().parse().ok()
}

/// All `.jpg`/`.jpeg`/`.png` files under `root`, recursively, sorted.
pub fn find_images(root: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    if root.is_dir() {
        walk(root, &mut images)?;
    }
    images.sort();
    Ok(images)
}

fn walk(dir: &Path, images: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&path, images)?;
        } else if file_type.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}
