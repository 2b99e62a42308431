//! HTTP upstream client.

use std::time::Duration;

use anyhow::Context;
use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

use super::Upstream;
use crate::error::FetchError;

/// Placeholder replaced by the entity id in the URL template.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Fetches entities as JSON from a templated URL, e.g.
/// `https://api.example.gov/members/{id}`.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    url_template: String,
}

impl HttpUpstream {
    /// Builds a client whose requests are bounded by `timeout`.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let url_template = url_template.into();
        anyhow::ensure!(
            url_template.contains(ID_PLACEHOLDER),
            "upstream URL template must contain {ID_PLACEHOLDER}: {url_template}"
        );

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            url_template,
        })
    }

    /// Resolves the URL for `id`.
    pub fn url_for(&self, id: &str) -> Result<Url, FetchError> {
        let raw = self.url_template.replace(ID_PLACEHOLDER, id);
        Url::parse(&raw)
            .map_err(|e| FetchError::upstream(format!("invalid upstream URL {raw}: {e}")))
    }
}

impl Upstream for HttpUpstream {
    fn fetch(&self, id: String) -> BoxFuture<'static, Result<Value, FetchError>> {
        let client = self.client.clone();
        let url = self.url_for(&id);

        async move {
            let url = url?;
            debug!(%url, "fetching entity from upstream");
            let payload = client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await?;
            Ok::<_, FetchError>(payload)
        }
        .boxed()
    }
}
