//! `scrape_listings` tool definitions.

use std::time;

use derive_more::{Display, Error as StdError, From};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracerr::Traced;
use tracing as log;

use crate::llm::ToolSchema;

/// Name of the tool.
pub const NAME: &str = "scrape_listings";

/// Returns the [`ToolSchema`] of the tool.
#[must_use]
pub fn schema() -> ToolSchema {
    ToolSchema {
        name: NAME,
        description: "Fetches the current property listings page of a city \
                      as text. Use when the search finds nothing.",
        parameters: json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City to fetch listings of, like `pune`.",
                },
            },
            "required": ["city"],
        }),
    }
}

/// [`Scraper`] configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// API key of the scraping API.
    pub api_key: SecretString,

    /// Base URL of the scraping API.
    pub base_url: String,

    /// Template of a listing page URL, with `{city}` placeholders.
    pub listing_url: String,

    /// Maximum number of characters of a scraped page.
    pub max_chars: usize,

    /// Timeout of a single scraping request.
    pub timeout: time::Duration,
}

/// Arguments of the tool.
#[derive(Clone, Debug, Deserialize)]
pub struct Args {
    /// City to fetch listings of.
    pub city: String,
}

/// Client of a [Firecrawl]-compatible scraping API fetching listing pages.
///
/// [Firecrawl]: https://docs.firecrawl.dev/api-reference/endpoint/scrape
#[derive(Clone, Debug)]
pub struct Scraper {
    /// HTTP client to perform requests with.
    http: reqwest::Client,

    /// [`Config`] of this [`Scraper`].
    config: Config,
}

/// Scraping request body.
#[derive(Serialize)]
struct Request<'a> {
    /// URL of the page to scrape.
    url: &'a str,

    /// Formats to scrape the page in.
    formats: [&'static str; 1],
}

/// Scraping response body.
#[derive(Deserialize)]
struct Response {
    /// Indicator whether the page was scraped.
    #[serde(default)]
    success: bool,

    /// Scraped page.
    #[serde(default)]
    data: Option<Page>,

    /// Error description, if failed.
    #[serde(default)]
    error: Option<String>,
}

/// Scraped page.
#[derive(Deserialize)]
struct Page {
    /// Markdown of the page.
    #[serde(default)]
    markdown: Option<String>,
}

impl Scraper {
    /// Creates a new [`Scraper`] with the provided [`Config`].
    ///
    /// # Errors
    ///
    /// If failed to initialize the HTTP client.
    pub fn new(config: Config) -> Result<Self, Traced<Error>> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(tracerr::from_and_wrap!(=> Error))?;
        Ok(Self { http, config })
    }

    /// Fetches the listings page of the provided `city` as tool output.
    ///
    /// Failures are reported in the output.
    pub async fn listings(&self, city: &str) -> String {
        let city = city.trim().to_lowercase();
        match self.fetch(&city).await {
            Ok(markdown) => condense(&markdown, self.config.max_chars),
            Err(e) => {
                log::warn!("failed to scrape listings of `{city}`: {e}");
                format!("Failed to fetch listings for {city}. Error: {e}")
            }
        }
    }

    /// Fetches the markdown of the provided `city` listings page.
    async fn fetch(&self, city: &str) -> Result<String, Traced<Error>> {
        let url = listing_url(&self.config.listing_url, city);
        log::debug!("scraping `{url}`");

        let resp = self
            .http
            .post(format!("{}/v1/scrape", self.config.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&Request {
                url: &url,
                formats: ["markdown"],
            })
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))?;

        let status = resp.status();
        let resp = resp
            .json::<Response>()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))?;
        if !status.is_success() || !resp.success {
            return Err(tracerr::new!(Error::Failed {
                status,
                message: resp.error.unwrap_or_default(),
            }));
        }

        resp.data
            .and_then(|p| p.markdown)
            .ok_or_else(|| tracerr::new!(Error::NoContent))
    }
}

/// Builds the listing page URL of the provided `city` out of the `template`.
fn listing_url(template: &str, city: &str) -> String {
    template.replace("{city}", city)
}

/// Condenses the provided `markdown`: collapses paragraph breaks into spaces
/// and keeps at most `max_chars` characters.
fn condense(markdown: &str, max_chars: usize) -> String {
    markdown.replace("\n\n", " ").chars().take(max_chars).collect()
}

/// [`Scraper`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// Failed to reach the scraping API.
    #[display("{_0}")]
    #[from]
    Transport(reqwest::Error),

    /// Scraping API failed to scrape the page.
    #[display("scraping failed with `{status}`: {message}")]
    Failed {
        /// HTTP status of the response.
        status: http::StatusCode,

        /// Error description of the response.
        message: String,
    },

    /// Scraping API returned no content.
    #[display("no content scraped")]
    NoContent,
}
