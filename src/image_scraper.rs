//! Candidate cover photo scraping through a headless browser.
//!
//! Each image search provider is a row in a descriptor table: how to build
//! its search URL, which elements hold the photos, which URLs to keep, and
//! how many to return. Adding a provider means adding a row.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use log::{debug, info, warn};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::config::ScraperConfig;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.3; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/73.0.3683.103 Safari/537.36";
const VISIBILITY_POLL_INTERVAL: Duration = Duration::from_millis(200);
const BAIDU_QUERY_SUFFIX: &str = "盆栽";
const IPLANT_THUMBNAIL_MARKER: &str = "/148/";

/// Image search sources known to the scraper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageProvider {
    #[default]
    Baidu,
    #[serde(rename = "iplant")]
    IPlant,
    Garden,
}

/// How one provider is searched and filtered.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDescriptor {
    pub search_url: fn(&str) -> String,
    pub selector: &'static str,
    pub include: fn(&str) -> bool,
    pub max_results: Option<usize>,
}

fn baidu_search_url(query: &str) -> String {
    format!(
        "https://image.baidu.com/search/index?word={}",
        urlencoding::encode(&format!("{query}{BAIDU_QUERY_SUFFIX}"))
    )
}

fn iplant_search_url(query: &str) -> String {
    format!("https://www.iplant.cn/info/{query}")
}

fn garden_search_url(query: &str) -> String {
    format!(
        "https://garden.org/search/index.php?q={}",
        query.replace(' ', "+")
    )
}

fn include_all(_url: &str) -> bool {
    true
}

fn include_iplant_thumbnail(url: &str) -> bool {
    url.contains(IPLANT_THUMBNAIL_MARKER)
}

const PROVIDERS: &[(ImageProvider, ProviderDescriptor)] = &[
    (
        ImageProvider::Baidu,
        ProviderDescriptor {
            search_url: baidu_search_url,
            selector: "div#waterfall img",
            include: include_all,
            max_results: Some(4),
        },
    ),
    (
        ImageProvider::IPlant,
        ProviderDescriptor {
            search_url: iplant_search_url,
            selector: "img",
            include: include_iplant_thumbnail,
            max_results: None,
        },
    ),
    (
        ImageProvider::Garden,
        ProviderDescriptor {
            search_url: garden_search_url,
            selector: "img",
            include: include_all,
            max_results: Some(3),
        },
    ),
];

impl ImageProvider {
    pub fn descriptor(self) -> &'static ProviderDescriptor {
        PROVIDERS
            .iter()
            .find(|(provider, _)| *provider == self)
            .map(|(_, descriptor)| descriptor)
            .unwrap_or(&PROVIDERS[0].1)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Baidu => "baidu",
            Self::IPlant => "iplant",
            Self::Garden => "garden",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser session timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid selector `{0}`")]
    Selector(String),
    #[error("failed to capture rendered page: {0}")]
    Render(String),
}

/// Source of candidate image URLs. Implementations never fail: problems
/// are logged and produce an empty list.
pub trait ImageSource: Send + Sync {
    fn fetch_images(
        &self,
        provider: ImageProvider,
        query: &str,
    ) -> impl Future<Output = Vec<String>> + Send;
}

/// Rewrites protocol-relative URLs to explicit https.
pub fn normalize_image_url(src: &str) -> String {
    if src.starts_with("//") {
        format!("https:{src}")
    } else {
        src.to_string()
    }
}

/// Collects image URLs from rendered markup following the provider rules.
pub fn extract_image_urls(
    descriptor: &ProviderDescriptor,
    markup: &str,
) -> Result<Vec<String>, ScrapeError> {
    let selector = Selector::parse(descriptor.selector)
        .map_err(|_| ScrapeError::Selector(descriptor.selector.to_string()))?;
    let document = Html::parse_document(markup);

    let mut images = Vec::new();
    for element in document.select(&selector) {
        if descriptor
            .max_results
            .is_some_and(|max_results| images.len() >= max_results)
        {
            break;
        }
        let Some(src) = element.value().attr("src") else {
            continue;
        };
        let url = normalize_image_url(src);
        if (descriptor.include)(&url) {
            images.push(url);
        }
    }
    Ok(images)
}

/// Scraper that renders each search page in a fresh headless Chrome session.
pub struct HeadlessImageScraper {
    session_timeout: Duration,
    chrome_executable: Option<PathBuf>,
}

impl HeadlessImageScraper {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            session_timeout: Duration::from_secs(config.session_timeout_secs),
            chrome_executable: config.chrome_executable.clone(),
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, ScrapeError> {
        let mut builder = BrowserConfig::builder()
            .arg("--blink-settings=imagesEnabled=true")
            .arg("--ignore-certificate-errors")
            .arg("--no-default-browser-check")
            .arg(format!("--user-agent={BROWSER_USER_AGENT}"))
            .request_timeout(self.session_timeout);
        if let Some(executable) = &self.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(ScrapeError::Launch)
    }

    fn visibility_probe(selector: &str) -> String {
        let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"img\"".to_string());
        format!(
            "(() => {{ const el = document.querySelector({quoted}); \
             if (!el) return false; \
             const rect = el.getBoundingClientRect(); \
             const style = window.getComputedStyle(el); \
             return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden'; }})()"
        )
    }

    /// Opens `url`, waits until `selector` is visible, and returns the page
    /// markup. Launch and capture are each bounded by the session timeout,
    /// and the browser is torn down on every exit path after launch.
    async fn render_page(&self, url: &str, selector: &str) -> Result<String, ScrapeError> {
        let (mut browser, mut handler) =
            tokio::time::timeout(self.session_timeout, Browser::launch(self.browser_config()?))
                .await
                .map_err(|_| ScrapeError::Timeout(self.session_timeout))?
                .map_err(|err| ScrapeError::Launch(err.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let rendered = tokio::time::timeout(
            self.session_timeout,
            self.capture_markup(&browser, url, selector),
        )
        .await
        .unwrap_or(Err(ScrapeError::Timeout(self.session_timeout)));

        if let Err(err) = browser.close().await {
            debug!("Scrape: browser close failed: {err}");
        }
        handler_task.abort();
        rendered
    }

    async fn capture_markup(
        &self,
        browser: &Browser,
        url: &str,
        selector: &str,
    ) -> Result<String, ScrapeError> {
        let page = browser
            .new_page(url)
            .await
            .map_err(|err| ScrapeError::Navigation(err.to_string()))?;

        let probe = Self::visibility_probe(selector);
        loop {
            let visible = page
                .evaluate(probe.as_str())
                .await
                .map_err(|err| ScrapeError::Render(err.to_string()))?
                .into_value::<bool>()
                .unwrap_or(false);
            if visible {
                break;
            }
            tokio::time::sleep(VISIBILITY_POLL_INTERVAL).await;
        }

        page.content()
            .await
            .map_err(|err| ScrapeError::Render(err.to_string()))
    }

    /// Runs one bounded browser session for `provider`.
    pub async fn try_fetch_images(
        &self,
        provider: ImageProvider,
        query: &str,
    ) -> Result<Vec<String>, ScrapeError> {
        let descriptor = provider.descriptor();
        let url = (descriptor.search_url)(query);
        info!(
            "Scrape[{}]: fetching {query} plant images with selector {}",
            provider.label(),
            descriptor.selector
        );

        let markup = self.render_page(&url, descriptor.selector).await?;
        extract_image_urls(descriptor, &markup)
    }
}

impl ImageSource for HeadlessImageScraper {
    fn fetch_images(
        &self,
        provider: ImageProvider,
        query: &str,
    ) -> impl Future<Output = Vec<String>> + Send {
        async move {
            match self.try_fetch_images(provider, query).await {
                Ok(images) => {
                    debug!(
                        "Scrape[{}]: {} candidate images for {query}",
                        provider.label(),
                        images.len()
                    );
                    images
                }
                Err(err) => {
                    warn!("Scrape[{}]: no images for {query}: {err}", provider.label());
                    Vec::new()
                }
            }
        }
    }
}
