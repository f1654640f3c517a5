// pgdump-provision/src/toolchain/remote.rs
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use super::PostgresqlVersionInfo;
use crate::errors::{AppError, Result};

pub const DEFAULT_VERSIONS_FEED_URL: &str = "https://www.postgresql.org/versions.json";
pub const DEFAULT_DOWNLOADS_PAGE_URL: &str =
    "https://www.enterprisedb.com/downloads/postgres-postgresql-downloads";

// Layout of the EDB downloads table. One row per release, the version label in
// its own cell, then one `td.text-center.py-4` cell per platform.
const ROW_SELECTOR: &str = "tr";
const VERSION_CELL_SELECTOR: &str = "td.py-2.text-center.font-family-table-body";
const DOWNLOAD_CELL_SELECTOR: &str = "td.text-center.py-4";
const WINDOWS_DOWNLOAD_COLUMN: usize = 3;

/// Where the currently published PostgreSQL release and its installer come from.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Returns the single release the feed marks as current, with its
    /// installer URL resolved.
    async fn fetch_current_release(&self) -> Result<PostgresqlVersionInfo>;

    async fn resolve_windows_installer_url(&self, major_minor: &str) -> Result<String>;
}

/// One entry of the postgresql.org `versions.json` feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEntry {
    #[serde(default)]
    pub current: bool,
    #[serde(deserialize_with = "feed_label")]
    pub major: String,
    #[serde(deserialize_with = "feed_label")]
    pub latest_minor: String,
    #[serde(default)]
    pub supported: bool,
}

// The feed has shipped version labels both as strings and as bare numbers.
fn feed_label<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Label::deserialize(deserializer)? {
        Label::Text(text) => text,
        Label::Number(number) => number.to_string(),
    })
}

/// Picks the one entry flagged `current`. Zero or several is an error rather
/// than a guess.
pub fn select_current_release(entries: &[ReleaseEntry]) -> Result<PostgresqlVersionInfo> {
    let current: Vec<&ReleaseEntry> = entries.iter().filter(|e| e.current).collect();
    match current.as_slice() {
        [entry] => {
            debug!(
                major = %entry.major,
                latest_minor = %entry.latest_minor,
                supported = entry.supported,
                "selected current release"
            );
            Ok(PostgresqlVersionInfo::new(&entry.major, &entry.latest_minor))
        }
        [] => Err(AppError::NoCurrentRelease(format!(
            "none of {} entries is marked current",
            entries.len()
        ))),
        many => Err(AppError::NoCurrentRelease(format!(
            "{} entries are marked current ({})",
            many.len(),
            many.iter()
                .map(|e| e.major.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Finds the Windows installer link for `major_minor` in the downloads page.
pub fn find_installer_link(html: &str, major_minor: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let rows = selector(ROW_SELECTOR)?;
    let version_cell = selector(VERSION_CELL_SELECTOR)?;
    let download_cell = selector(DOWNLOAD_CELL_SELECTOR)?;
    let anchor = selector("a[href]")?;

    for row in document.select(&rows) {
        let label: String = match row.select(&version_cell).next() {
            Some(cell) => cell.text().collect(),
            None => continue,
        };
        if label.trim() != major_minor {
            continue;
        }

        let href = row
            .select(&download_cell)
            .nth(WINDOWS_DOWNLOAD_COLUMN)
            .and_then(|cell| cell.select(&anchor).next())
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty());

        return href.map(str::to_string).ok_or_else(|| {
            AppError::LinkNotFound(format!(
                "{} (row found but download column {} has no link)",
                major_minor,
                WINDOWS_DOWNLOAD_COLUMN + 1
            ))
        });
    }

    Err(AppError::LinkNotFound(format!(
        "{} (no matching row on downloads page)",
        major_minor
    )))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| AppError::LinkNotFound(format!("invalid selector '{}': {:?}", css, e)))
}

/// Release lookup against postgresql.org and the EDB downloads page.
pub struct HttpReleaseSource {
    client: reqwest::Client,
    versions_feed_url: String,
    downloads_page_url: String,
}

impl HttpReleaseSource {
    pub fn new(
        client: reqwest::Client,
        versions_feed_url: impl Into<String>,
        downloads_page_url: impl Into<String>,
    ) -> Self {
        HttpReleaseSource {
            client,
            versions_feed_url: versions_feed_url.into(),
            downloads_page_url: downloads_page_url.into(),
        }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Network(format!("GET {}: {}", url, e)))?;
        response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("reading body of {}: {}", url, e)))
    }
}

#[async_trait]
impl ReleaseSource for HttpReleaseSource {
    async fn fetch_current_release(&self) -> Result<PostgresqlVersionInfo> {
        info!(feed = %self.versions_feed_url, "fetching published PostgreSQL releases");
        let body = self.get_text(&self.versions_feed_url).await?;
        let entries: Vec<ReleaseEntry> = serde_json::from_str(&body).map_err(|e| {
            AppError::NoCurrentRelease(format!("release feed could not be parsed: {}", e))
        })?;

        let release = select_current_release(&entries)?;
        let url = self
            .resolve_windows_installer_url(release.major_minor())
            .await?;
        info!(version = %release.major_minor(), installer = %url, "resolved current release");
        Ok(release.with_download_url(url))
    }

    async fn resolve_windows_installer_url(&self, major_minor: &str) -> Result<String> {
        debug!(page = %self.downloads_page_url, version = %major_minor, "scraping installer link");
        let html = self.get_text(&self.downloads_page_url).await?;
        find_installer_link(&html, major_minor)
    }
}
