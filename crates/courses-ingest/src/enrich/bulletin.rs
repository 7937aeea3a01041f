//! Course descriptions scraped from the university bulletin
//!
//! Each section has a bulletin page at a URL derived from its course code and
//! term. The description sits in a two-column table row labelled
//! "Course Description".

use std::time::Duration;

use async_trait::async_trait;
use courses_common::CourseKey;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::EnrichmentProvider;
use crate::error::ProviderError;

pub const DEFAULT_URL_TEMPLATE: &str =
    "http://www.columbia.edu/cu/bulletin/uwb/subj/{dept}/{symbol_number}-{term}-{section}/";

const DESCRIPTION_LABEL: &str = "Course Description";

/// HTTP enrichment provider for bulletin pages
#[derive(Debug, Clone)]
pub struct BulletinProvider {
    client: Client,
    url_template: String,
}

impl BulletinProvider {
    /// Create a provider.
    ///
    /// `url_template` may use the placeholders `{dept}`, `{symbol_number}`,
    /// `{term}` and `{section}`.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("courses-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    /// Bulletin page for one section of a course
    pub fn url_for(&self, course: &CourseKey, term: &str) -> String {
        self.url_template
            .replace("{dept}", course.department())
            .replace(
                "{symbol_number}",
                &format!("{}{}", course.symbol(), course.number()),
            )
            .replace("{term}", term)
            .replace("{section}", course.section())
    }
}

#[async_trait]
impl EnrichmentProvider for BulletinProvider {
    async fn lookup(&self, course: &CourseKey, term: &str) -> Result<Option<String>, ProviderError> {
        let url = self.url_for(course, term);
        debug!(url = %url, "Fetching bulletin page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ProviderError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status { url, status });
        }

        let body = response
            .text()
            .await
            .map_err(|source| ProviderError::Body {
                url: url.clone(),
                source,
            })?;

        Ok(extract_description(&body))
    }
}

/// Text of the table cell following the "Course Description" label, with
/// whitespace collapsed. `None` if the label is missing or the cell is empty.
pub fn extract_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let cells = Selector::parse("td").ok()?;

    let label = document
        .select(&cells)
        .find(|cell| collapse_text(cell) == DESCRIPTION_LABEL)?;

    let content = label
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().name() == "td")?;

    let text = collapse_text(&content);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn collapse_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
