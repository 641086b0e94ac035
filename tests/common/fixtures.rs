//! Fake rendering environments and an HTTP page server for end-to-end tests

use async_trait::async_trait;
use chapter_dl::{
    Asset, AuxiliaryContext, AuxiliaryContextFactory, ChapterDownloader, Collaborators,
    ContextFactory, DocumentRequest, Event, Job, RenderingContext, Result, Settings,
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Context whose page already shows every image it will ever show
pub struct LoadedPage {
    assets: Vec<Asset>,
}

#[async_trait]
impl RenderingContext for LoadedPage {
    async fn expected_total(&self) -> Result<Option<usize>> {
        Ok(Some(self.assets.len()))
    }

    async fn loaded_assets(&self) -> Result<Vec<Asset>> {
        Ok(self.assets.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Maps a chapter URL `<server>/read/<chapter>` to pages `<server>/img/<chapter>/<n>.jpg`
pub struct PageServerContexts {
    pub pages_per_chapter: usize,
}

#[async_trait]
impl ContextFactory for PageServerContexts {
    async fn open(&self, job: &Job) -> Result<Arc<dyn RenderingContext>> {
        let chapter = job
            .source_location
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or_default()
            .to_string();
        let assets = (0..self.pages_per_chapter)
            .map(|i| {
                let url = job
                    .source_location
                    .join(&format!("/img/{chapter}/{i}.jpg"))
                    .unwrap();
                Asset::located(i, url).with_mime_hint("image/jpeg")
            })
            .collect();
        Ok(Arc::new(LoadedPage { assets }))
    }
}

/// Renders documents as `PDF <title> <pages>`
pub struct TextRenderer;

#[async_trait]
impl AuxiliaryContext for TextRenderer {
    async fn render_document(&self, request: &DocumentRequest) -> Result<Vec<u8>> {
        Ok(format!("PDF {} {}", request.title, request.pages.len()).into_bytes())
    }
}

pub struct TextRendererFactory;

#[async_trait]
impl AuxiliaryContextFactory for TextRendererFactory {
    async fn create(&self) -> Result<Arc<dyn AuxiliaryContext>> {
        Ok(Arc::new(TextRenderer))
    }
}

/// Small real JPEG so document layout can read its dimensions
pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

/// Serve `pages` images for `chapter`
pub async fn serve_chapter(server: &MockServer, chapter: &str, pages: usize) {
    for i in 0..pages {
        Mock::given(method("GET"))
            .and(path(format!("/img/{chapter}/{i}.jpg")))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/jpeg")
                    .set_body_bytes(jpeg(8 + i as u32, 12)),
            )
            .mount(server)
            .await;
    }
}

pub fn chapter_job(server: &MockServer, chapter: &str) -> Job {
    let url = Url::parse(&format!("{}/read/{chapter}", server.uri())).unwrap();
    Job::new(url, chapter, "Series")
}

/// Settings tuned for a local page server
pub fn fast_settings() -> Settings {
    Settings {
        tick_interval: Duration::from_millis(20),
        stability_ticks_required: 2,
        overall_timeout: Duration::from_secs(5),
        retry_delay: Duration::from_millis(20),
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Downloader with the bundled HTTP fetcher writing below a temp dir
pub fn create_downloader(settings: Settings, pages_per_chapter: usize) -> (ChapterDownloader, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let collaborators = Collaborators::with_http(
        Arc::new(PageServerContexts { pages_per_chapter }),
        Arc::new(TextRendererFactory),
        temp_dir.path(),
        &settings,
    )
    .unwrap();
    let downloader = ChapterDownloader::new(settings, collaborators).unwrap();
    (downloader, temp_dir)
}

/// Collect events until `done` matches or `timeout` elapses
pub async fn collect_events_until(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    timeout: Duration,
    done: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut events = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = rx.recv().await {
            let finished = done(&event);
            events.push(event);
            if finished {
                break;
            }
        }
    })
    .await;
    events
}
