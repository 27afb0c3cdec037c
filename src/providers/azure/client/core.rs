use log::{debug, info};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::auth::PersonalAccessToken;
use crate::error::{Result, RunfoError};

pub const CONTINUATION_TOKEN_HEADER: &str = "x-ms-continuationtoken";

pub const JSON_CONTENT: &str = "application/json";
pub const ZIP_CONTENT: &str = "application/zip";
pub const BINARY_CONTENT: &str = "application/octet-stream";

/// The `{ "count": n, "value": [...] }` wrapper every list endpoint returns.
#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    value: Vec<T>,
}

#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation_token: Option<String>,
}

pub struct DevOpsClient {
    client: Client,
    api_root: Url,
    token: Option<PersonalAccessToken>,
}

impl DevOpsClient {
    pub fn new(
        base_url: &str,
        organization: &str,
        token: Option<PersonalAccessToken>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("runfo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RunfoError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        let api_root = Url::parse(&base)
            .map_err(|e| RunfoError::Config(format!("Invalid base URL: {e}")))?
            .join(&format!("{organization}/"))
            .map_err(|e| RunfoError::Config(format!("Invalid organization URL: {e}")))?;

        Ok(Self {
            client,
            api_root,
            token,
        })
    }

    /// Root of the organization, e.g. `https://dev.azure.com/dnceng/`.
    pub fn organization_url(&self) -> &Url {
        &self.api_root
    }

    /// `{organization}/{project}/_apis/{path}`
    pub fn project_url(&self, project: &str, path: &str) -> Result<Url> {
        self.api_root
            .join(&format!("{project}/_apis/{path}"))
            .map_err(|e| RunfoError::Config(format!("Invalid project URL: {e}")))
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            token.authorize(request)
        } else {
            request
        }
    }

    /// Authenticated GET. Any non-2xx status is fatal for the call.
    async fn send(&self, url: Url, accept: &str) -> Result<Response> {
        debug!("GET {url}");
        let request = self.client.get(url.clone()).header(ACCEPT, accept);
        let response = self.auth_request(request).send().await?;
        ensure_success(url.as_str(), response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send(url, JSON_CONTENT).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn get_text(&self, url: Url) -> Result<String> {
        let response = self.send(url, "text/plain").await?;
        Ok(response.text().await?)
    }

    /// Fetches a URI outside the service (e.g. blob storage) without sending the credential.
    pub async fn get_external_text(&self, uri: &str) -> Result<String> {
        debug!("GET {uri}");
        let response = self.client.get(uri).send().await?;
        let response = ensure_success(uri, response).await?;
        Ok(response.text().await?)
    }

    pub async fn fetch_page<T: DeserializeOwned>(&self, url: Url) -> Result<Page<T>> {
        let response = self.send(url, JSON_CONTENT).await?;

        let continuation_token = response
            .headers()
            .get(CONTINUATION_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let envelope = response.json::<ListEnvelope<T>>().await?;
        Ok(Page {
            items: envelope.value,
            continuation_token,
        })
    }

    /// Follows continuation tokens until the server stops returning one, or until more than
    /// `max_items` have been accumulated. The result is not truncated to `max_items`.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        url: Url,
        page_size: Option<usize>,
        max_items: Option<usize>,
    ) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut continuation_token: Option<String> = None;
        let mut page = 1;

        loop {
            let mut page_url = url.clone();
            {
                let mut query = page_url.query_pairs_mut();
                if let Some(page_size) = page_size {
                    query.append_pair("$top", &page_size.to_string());
                }
                if let Some(token) = &continuation_token {
                    query.append_pair("continuationToken", token);
                }
            }

            let Page {
                items,
                continuation_token: next_token,
            } = self.fetch_page::<T>(page_url).await?;

            let fetched_count = items.len();
            all_items.extend(items);

            info!(
                "Page {page}: fetched {fetched_count} items (total: {})",
                all_items.len()
            );

            let Some(next_token) = next_token else {
                break;
            };

            if max_items.is_some_and(|max| all_items.len() > max) {
                break;
            }

            continuation_token = Some(next_token);
            page += 1;
        }

        Ok(all_items)
    }

    /// Streams a binary body into `sink`, returning the number of bytes written.
    pub async fn download<W>(&self, url: Url, accept: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut response = self.send(url, accept).await?;
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        sink.flush().await?;
        Ok(written)
    }

    pub async fn download_to_file(
        &self,
        url: Url,
        accept: &str,
        path: &std::path::Path,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(path).await?;
        let written = self.download(url, accept, &mut file).await?;
        info!("Downloaded {written} bytes to {}", path.display());
        Ok(written)
    }
}

async fn ensure_success(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RunfoError::Api {
        url: url.to_string(),
        status,
        body,
    })
}
