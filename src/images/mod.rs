//! Poster fetching and caching
//!
//! Posters are downloaded once per URL, validated, and kept in memory until the
//! next sweep. Failed downloads are cached too, so a broken URL is not retried
//! before the sweep. Any failure degrades to the bundled fallback image.

mod validate;

pub use validate::{decode_header, Dimensions, ImageMime};

use crate::config::{
    ImageSettings, POSTER_FETCH_TIMEOUT_SECS, POSTER_MAX_BYTES, POSTER_MIN_BYTES,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use moka::future::Cache;
use reqwest::{header::CONTENT_TYPE, Client as HttpClient, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const FALLBACK_FILE_NAME: &str = "not-found.png";

/// Why a poster download was rejected
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("poster request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("poster server answered {0}")]
    Status(StatusCode),
    #[error("unsupported poster type: {0}")]
    UnsupportedType(String),
    #[error("poster too small: {0} bytes")]
    TooSmall(usize),
    #[error("invalid {mime} header: {reason}")]
    InvalidImage {
        mime: &'static str,
        reason: &'static str,
    },
}

/// Image ready to hand to the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadableImage {
    /// In-memory image with the file name used for the upload
    Memory { file_name: String, bytes: Bytes },
    /// Image read from disk by the platform at send time
    Path(PathBuf),
}

impl UploadableImage {
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::Memory { file_name, .. } => file_name.clone(),
            Self::Path(path) => path.file_name().map_or_else(
                || FALLBACK_FILE_NAME.to_string(),
                |n| n.to_string_lossy().into_owned(),
            ),
        }
    }
}

/// Cache entry: a validated poster or a remembered failure
#[derive(Debug, Clone)]
enum CachedPoster {
    Image { bytes: Bytes, mime: ImageMime },
    Failed,
}

/// Source of poster images for rendering
#[async_trait]
pub trait PosterSource: Send + Sync {
    /// Returns the poster at `url`, or the fallback when it is unusable.
    async fn get_poster(&self, url: &str) -> UploadableImage;
}

/// Poster downloader with a per-URL in-memory cache
pub struct ImageService {
    http: HttpClient,
    cache: Cache<String, CachedPoster>,
    fallback_path: PathBuf,
    fallback: OnceCell<Bytes>,
}

impl ImageService {
    /// # Errors
    ///
    /// Returns the builder error if the HTTP client cannot be initialized.
    pub fn new(settings: &ImageSettings) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(POSTER_FETCH_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            cache: Cache::builder().max_capacity(10_000).build(),
            fallback_path: settings.fallback_path.clone(),
            fallback: OnceCell::new(),
        })
    }

    /// Loads the fallback image eagerly so a missing file shows up at startup.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be read. Later requests retry
    /// the load and degrade to a path upload meanwhile.
    pub async fn preload_fallback(&self) -> std::io::Result<()> {
        self.fallback_bytes().await.map(|_| ())
    }

    async fn fallback_bytes(&self) -> std::io::Result<&Bytes> {
        self.fallback
            .get_or_try_init(|| async {
                let data = tokio::fs::read(&self.fallback_path).await?;
                info!(path = %self.fallback_path.display(), size = data.len(), "Fallback poster loaded");
                Ok::<_, std::io::Error>(Bytes::from(data))
            })
            .await
    }

    /// The fallback image, from memory when it could be loaded.
    pub async fn fallback(&self) -> UploadableImage {
        match self.fallback_bytes().await {
            Ok(bytes) => UploadableImage::Memory {
                file_name: FALLBACK_FILE_NAME.to_string(),
                bytes: bytes.clone(),
            },
            Err(e) => {
                error!(path = %self.fallback_path.display(), error = %e, "Failed to load fallback poster");
                UploadableImage::Path(self.fallback_path.clone())
            }
        }
    }

    /// Drops every cached entry and returns how many there were.
    pub async fn sweep(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        let count = self.cache.entry_count();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        count
    }

    /// Number of cached URLs, including remembered failures.
    pub async fn cached_entries(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    async fn load(&self, url: &str) -> CachedPoster {
        match self.download(url).await {
            Ok((bytes, mime)) => {
                debug!(url, size = bytes.len(), mime = mime.as_str(), "Poster cached");
                CachedPoster::Image { bytes, mime }
            }
            Err(e) => {
                warn!(url, error = %e, "Poster rejected");
                CachedPoster::Failed
            }
        }
    }

    async fn download(&self, url: &str) -> Result<(Bytes, ImageMime), FetchError> {
        let mut response = self.http.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status));
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            let room = POSTER_MAX_BYTES - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                break;
            }
            body.extend_from_slice(&chunk);
        }
        let bytes = body.freeze();

        let mime = match declared.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(value) => ImageMime::from_content_type(value)
                .ok_or_else(|| FetchError::UnsupportedType(value.to_string()))?,
            None => ImageMime::sniff(&bytes)
                .ok_or_else(|| FetchError::UnsupportedType("unrecognized content".to_string()))?,
        };

        if bytes.len() < POSTER_MIN_BYTES {
            return Err(FetchError::TooSmall(bytes.len()));
        }

        decode_header(mime, &bytes).map_err(|reason| FetchError::InvalidImage {
            mime: mime.as_str(),
            reason,
        })?;

        Ok((bytes, mime))
    }
}

#[async_trait]
impl PosterSource for ImageService {
    async fn get_poster(&self, url: &str) -> UploadableImage {
        if url.is_empty() {
            return self.fallback().await;
        }

        // Concurrent callers for the same URL share one download
        let entry = self.cache.get_with(url.to_string(), self.load(url)).await;

        match entry {
            CachedPoster::Image { bytes, mime } => UploadableImage::Memory {
                file_name: format!("poster{}", mime.extension()),
                bytes,
            },
            CachedPoster::Failed => self.fallback().await,
        }
    }
}

/// Spawns the periodic full sweep of the poster cache.
///
/// The first sweep happens one `every` after start. The task exits when
/// `shutdown` is cancelled.
pub fn spawn_cache_sweeper(
    service: Arc<ImageService>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("Poster cache sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let cleared = service.sweep().await;
                    info!(cleared, "Poster cache swept");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::validate::fixtures::{jpeg, png};
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_with_fallback(path: PathBuf) -> ImageService {
        ImageService::new(&ImageSettings {
            cache_ttl_secs: 600,
            fallback_path: path,
        })
        .expect("client builds")
    }

    fn missing_fallback() -> ImageService {
        service_with_fallback(PathBuf::from("./definitely/not/here.png"))
    }

    #[test]
    fn test_path_file_name() {
        let image = UploadableImage::Path(PathBuf::from("./static/not-found.png"));
        assert_eq!(image.file_name(), "not-found.png");
    }

    #[tokio::test]
    async fn test_empty_url_uses_fallback_without_fetch() {
        let service = missing_fallback();
        let image = service.get_poster("").await;
        assert_eq!(image, UploadableImage::Path(PathBuf::from("./definitely/not/here.png")));
        assert_eq!(service.cached_entries().await, 0);
    }

    #[tokio::test]
    async fn test_fallback_loaded_from_disk() -> std::io::Result<()> {
        let dir = std::env::temp_dir().join(format!("poster-fallback-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await?;
        let file = dir.join("fallback.png");
        tokio::fs::write(&file, png(2, 2, 600)).await?;

        let service = service_with_fallback(file);
        service.preload_fallback().await?;

        match service.get_poster("").await {
            UploadableImage::Memory { file_name, bytes } => {
                assert_eq!(file_name, "not-found.png");
                assert_eq!(bytes.len(), 600);
            }
            other => panic!("expected in-memory fallback, got {other:?}"),
        }
        tokio::fs::remove_dir_all(&dir).await
    }

    #[tokio::test]
    async fn test_valid_jpeg_is_cached_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(jpeg(300, 450, 2048)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = missing_fallback();
        let url = format!("{}/p.jpg", server.uri());

        let first = service.get_poster(&url).await;
        let second = service.get_poster(&url).await;

        assert_eq!(first, second);
        assert_eq!(first.file_name(), "poster.jpg");
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(png(40, 60, 1024))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = missing_fallback();
        let url = format!("{}/slow.png", server.uri());

        let (a, b, c) = tokio::join!(
            service.get_poster(&url),
            service.get_poster(&url),
            service.get_poster(&url)
        );

        assert_eq!(a.file_name(), "poster.png");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    async fn serve_jpeg(server: &MockServer, route: &str, len: usize) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(jpeg(640, 960, len)),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_oversized_body_is_cut_at_limit() {
        let server = MockServer::start().await;
        serve_jpeg(&server, "/huge.jpg", POSTER_MAX_BYTES + 4096).await;

        let service = missing_fallback();
        match service.get_poster(&format!("{}/huge.jpg", server.uri())).await {
            UploadableImage::Memory { file_name, bytes } => {
                assert_eq!(file_name, "poster.jpg");
                assert_eq!(bytes.len(), POSTER_MAX_BYTES);
            }
            other => panic!("expected cached poster, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_body_at_exact_limit_is_kept_whole() {
        let server = MockServer::start().await;
        serve_jpeg(&server, "/exact.jpg", POSTER_MAX_BYTES).await;

        let (bytes, mime) = missing_fallback()
            .download(&format!("{}/exact.jpg", server.uri()))
            .await
            .expect("body at the limit is accepted");
        assert_eq!(mime, ImageMime::Jpeg);
        assert_eq!(bytes.len(), POSTER_MAX_BYTES);
    }

    #[tokio::test]
    async fn test_sniffs_png_without_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(10, 10, 1024)))
            .mount(&server)
            .await;

        let image = missing_fallback()
            .get_poster(&format!("{}/p", server.uri()))
            .await;
        assert_eq!(image.file_name(), "poster.png");
    }

    #[tokio::test]
    async fn test_failure_is_cached_until_sweep() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let service = missing_fallback();
        let url = format!("{}/gone.jpg", server.uri());

        assert!(matches!(service.get_poster(&url).await, UploadableImage::Path(_)));
        assert!(matches!(service.get_poster(&url).await, UploadableImage::Path(_)));

        assert_eq!(service.sweep().await, 1);
        assert!(matches!(service.get_poster(&url).await, UploadableImage::Path(_)));
    }

    #[tokio::test]
    async fn test_rejects_html_and_tiny_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html>".repeat(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tiny.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(png(1, 1, 100)),
            )
            .mount(&server)
            .await;

        let service = missing_fallback();
        let err = service
            .download(&format!("{}/page", server.uri()))
            .await
            .expect_err("html must be rejected");
        assert!(matches!(err, FetchError::UnsupportedType(_)));

        let err = service
            .download(&format!("{}/tiny.png", server.uri()))
            .await
            .expect_err("tiny body must be rejected");
        assert!(matches!(err, FetchError::TooSmall(_)));
    }

    #[tokio::test]
    async fn test_rejects_body_that_does_not_match_declared_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/liar.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(png(10, 10, 1024)),
            )
            .mount(&server)
            .await;

        let err = missing_fallback()
            .download(&format!("{}/liar.jpg", server.uri()))
            .await
            .expect_err("mismatched body must be rejected");
        assert!(matches!(err, FetchError::InvalidImage { .. }));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let service = Arc::new(missing_fallback());
        let token = CancellationToken::new();
        let handle = spawn_cache_sweeper(service, Duration::from_secs(3600), token.clone());

        token.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }
}
