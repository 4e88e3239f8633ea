//! Remote image loading for glasses parts.
//!
//! Config numbers apply synchronously; bitmaps arrive later and are attached
//! only if the part still points at the same URL.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use image::{DynamicImage, RgbaImage};
use tracing::{debug, warn};

use crate::anchor::{ArModel, PendingImage};
use crate::error::{Error, Result};

pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<DynamicImage>> + Send;
}

/// http(s) through reqwest, anything else as a local path.
#[derive(Clone, Default)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn decode(url: String, bytes: Vec<u8>) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map_err(Error::from))
        .await
        .map_err(|e| Error::Fetch { url, reason: e.to_string() })?
}

impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<DynamicImage> {
        let fetch_err = |e: &dyn std::fmt::Display| Error::Fetch { url: url.to_string(), reason: e.to_string() };

        let bytes = if url.starts_with("http://") || url.starts_with("https://") {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| fetch_err(&e))?;
            resp.bytes().await.map_err(|e| fetch_err(&e))?.to_vec()
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            tokio::fs::read(Path::new(path)).await?
        };
        decode(url.to_string(), bytes).await
    }
}

/// Outcome of one part image request.
pub struct FetchedImage {
    pub request: PendingImage,
    pub image: Result<Arc<RgbaImage>>,
}

/// Fetches every pending part image concurrently. Does not touch the model, so
/// it can run on another task while frames keep rendering.
pub async fn fetch_part_images<F: ImageFetcher>(pending: Vec<PendingImage>, fetcher: &F) -> Vec<FetchedImage> {
    let results = join_all(pending.iter().map(|p| fetcher.fetch(&p.url))).await;
    pending
        .into_iter()
        .zip(results)
        .map(|(request, result)| FetchedImage { request, image: result.map(|img| Arc::new(img.into_rgba8())) })
        .collect()
}

/// Attaches what decoded, skipping parts that have moved on to another URL.
/// Returns how many images were attached. Failures leave the part without an
/// image.
pub fn attach_fetched(model: &mut ArModel, fetched: Vec<FetchedImage>) -> usize {
    let mut attached = 0;
    for FetchedImage { request, image } in fetched {
        match image {
            Ok(img) => {
                if model.attach_remote_image(request.part, &request.url, img) {
                    attached += 1;
                } else {
                    debug!(url = %request.url, "dropping stale image");
                }
            }
            Err(e) => warn!(part = ?request.part, url = %request.url, error = %e, "part image unavailable"),
        }
    }
    attached
}

pub async fn load_part_images<F: ImageFetcher>(model: &mut ArModel, pending: Vec<PendingImage>, fetcher: &F) -> usize {
    let fetched = fetch_part_images(pending, fetcher).await;
    attach_fetched(model, fetched)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::anchor::PartKind;
    use crate::ar_config::ArConfig;
    use std::collections::HashMap;

    /// In-memory fetcher keyed by URL.
    pub(crate) struct MapFetcher(pub HashMap<String, DynamicImage>);

    impl ImageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<DynamicImage> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| Error::Fetch { url: url.to_string(), reason: "not found".into() })
        }
    }

    #[tokio::test]
    async fn numbers_apply_before_images_arrive() {
        let mut model = ArModel::default();
        let cfg = ArConfig {
            front: Some("front.png".into()),
            left: Some("missing.png".into()),
            front_params: Some(crate::ar_config::FrontParams { x: 0.0, y: 0.1, scale: 1.2 }),
            ..ArConfig::default()
        };
        let pending = model.apply_config(&cfg);
        assert_eq!(model.front.scale, 1.2);
        assert!(model.front.image.is_none());

        let fetcher = MapFetcher(HashMap::from([(
            "front.png".to_string(),
            DynamicImage::ImageRgba8(RgbaImage::new(4, 2)),
        )]));
        let attached = load_part_images(&mut model, pending, &fetcher).await;
        assert_eq!(attached, 1);
        assert_eq!(model.part(PartKind::Front).image.as_ref().map(|i| i.width()), Some(4));
        assert!(model.left.image.is_none());
        assert_eq!(model.left.remote_url.as_deref(), Some("missing.png"));
    }

    #[tokio::test]
    async fn image_for_a_replaced_url_is_dropped() {
        let mut model = ArModel::default();
        let pending = model.apply_config(&ArConfig { front: Some("old.png".into()), ..ArConfig::default() });
        let fetcher = MapFetcher(HashMap::from([(
            "old.png".to_string(),
            DynamicImage::ImageRgba8(RgbaImage::new(2, 2)),
        )]));
        let fetched = fetch_part_images(pending, &fetcher).await;
        model.apply_config(&ArConfig { front: Some("new.png".into()), ..ArConfig::default() });
        assert_eq!(attach_fetched(&mut model, fetched), 0);
        assert!(model.front.image.is_none());
    }

    #[tokio::test]
    async fn local_path_that_is_not_an_image_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let result = HttpImageFetcher::new().fetch(path.to_str().unwrap()).await;
        assert!(matches!(result, Err(Error::Image(_))));
    }
}
