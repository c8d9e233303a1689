use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ClientSettings;
use crate::error::WikiError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

// Unreserved characters plus '/' pass through, so a hierarchical page
// path stays readable in the query string while everything else is
// percent-encoded.
const PAGE_PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const COMPONENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One node of the page tree as listed by upstream. `order` is a
/// sibling ordering hint; pages may lack a path (the tree root does).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PageRef {
    pub path: Option<String>,
    pub id: Option<i64>,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageContent {
    pub path: String,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub id: Option<i64>,
    pub path: Option<String>,
    pub order: Option<i64>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageWriteOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageUpsert {
    pub outcome: PageWriteOutcome,
    pub page: PageMetadata,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AttachmentRef {
    #[serde(default)]
    pub name: String,
    pub path: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RemoteSearchResults {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub results: Vec<RemoteSearchHit>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RemoteSearchHit {
    #[serde(default, rename = "fileName")]
    pub file_name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub wiki: Option<WikiRef>,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default)]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PageContentResponse {
    path: Option<String>,
    content: Option<String>,
}

/// Authenticated client for the Azure DevOps wiki REST API.
///
/// Holds only immutable settings and a precomputed auth header, so a
/// single instance may serve concurrent callers; every operation is a
/// self-contained request/response exchange with no retries.
pub struct WikiClient<T = ReqwestTransport> {
    transport: T,
    settings: ClientSettings,
    auth_header: String,
    wiki_base: String,
    search_endpoint: String,
}

impl WikiClient<ReqwestTransport> {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(settings, transport))
    }
}

impl<T: HttpTransport> WikiClient<T> {
    pub fn with_transport(settings: ClientSettings, transport: T) -> Self {
        // Personal access tokens act as the password of an otherwise
        // empty Basic credential pair.
        let auth_header = format!("Basic {}", BASE64.encode(format!(":{}", settings.token)));
        let organization = encode_component(&settings.organization);
        let project = encode_component(&settings.project);
        let wiki_base = format!("{}/{organization}/{project}/_apis/wiki", settings.base_url);
        let search_endpoint = format!(
            "{}/{organization}/{project}/_apis/search/wikisearchresults?api-version={}",
            settings.search_url, settings.api_version
        );
        Self {
            transport,
            settings,
            auth_header,
            wiki_base,
            search_endpoint,
        }
    }

    /// All wikis in the configured project. An absent collection key
    /// decodes as an empty sequence, not an error.
    pub fn list_wikis(&self) -> Result<Vec<WikiRef>, WikiError> {
        let url = format!(
            "{}/wikis?api-version={}",
            self.wiki_base, self.settings.api_version
        );
        let response = self.exchange(self.get(&url))?;
        let collection: Collection<WikiRef> = decode_success(&url, response)?;
        Ok(collection.value)
    }

    /// The full page tree of a wiki, flattened in upstream order.
    pub fn list_pages(&self, wiki: &str) -> Result<Vec<PageRef>, WikiError> {
        let url = format!(
            "{}/wikis/{}/pages?recursionLevel=full&api-version={}",
            self.wiki_base,
            encode_component(wiki),
            self.settings.api_version
        );
        let response = self.exchange(self.get(&url))?;
        let collection: Collection<PageRef> = decode_success(&url, response)?;
        Ok(collection.value)
    }

    /// Fetch one page's content, addressed by path or by numeric id.
    /// Exactly one selector must be supplied; violating that fails
    /// before any network call. A missing `content` key in the
    /// response yields `content = None`.
    pub fn get_page_content(
        &self,
        wiki: &str,
        path: Option<&str>,
        id: Option<i64>,
    ) -> Result<PageContent, WikiError> {
        let url = match (path, id) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(WikiError::invalid_argument(
                    "exactly one of page path or page id must be supplied",
                ));
            }
            (Some(path), None) => format!(
                "{}/wikis/{}/pages?path={}&includeContent=true&api-version={}",
                self.wiki_base,
                encode_component(wiki),
                encode_page_path(path),
                self.settings.api_version
            ),
            (None, Some(id)) => format!(
                "{}/wikis/{}/pages/{id}?includeContent=true&api-version={}",
                self.wiki_base,
                encode_component(wiki),
                self.settings.api_version
            ),
        };

        let response = self.exchange(self.get(&url))?;
        let decoded: PageContentResponse = decode_success(&url, response)?;
        Ok(PageContent {
            path: decoded
                .path
                .or_else(|| path.map(str::to_string))
                .unwrap_or_default(),
            content: decoded.content,
            error: None,
        })
    }

    /// Idempotent upsert: creates the page when absent (HTTP 201),
    /// overwrites it when present. Supplying the current etag makes
    /// the update conditional via `If-Match`; omitting it is
    /// last-writer-wins.
    pub fn put_page(
        &self,
        wiki: &str,
        path: &str,
        content: &str,
        comment: Option<&str>,
        etag: Option<&str>,
    ) -> Result<PageUpsert, WikiError> {
        if path.trim().is_empty() {
            return Err(WikiError::invalid_argument("page path must not be empty"));
        }
        let mut url = format!(
            "{}/wikis/{}/pages?path={}&api-version={}",
            self.wiki_base,
            encode_component(wiki),
            encode_page_path(path),
            self.settings.api_version
        );
        if let Some(comment) = comment {
            url.push_str("&comment=");
            url.push_str(&encode_component(comment));
        }

        let mut request = HttpRequest::new(Method::Put, url.clone())
            .header("Authorization", self.auth_header.clone())
            .json(json!({ "content": content }));
        if let Some(etag) = etag {
            request = request.header("If-Match", etag);
        }

        let response = self.exchange(request)?;
        if !response.is_success() {
            return Err(WikiError::upstream(response.status, &response.body));
        }
        let outcome = if response.status == 201 {
            PageWriteOutcome::Created
        } else {
            PageWriteOutcome::Updated
        };
        let page = decode_body(&url, &response)?;
        Ok(PageUpsert { outcome, page })
    }

    pub fn delete_page(&self, wiki: &str, path: &str) -> Result<PageMetadata, WikiError> {
        if path.trim().is_empty() {
            return Err(WikiError::invalid_argument("page path must not be empty"));
        }
        let url = format!(
            "{}/wikis/{}/pages?path={}&api-version={}",
            self.wiki_base,
            encode_component(wiki),
            encode_page_path(path),
            self.settings.api_version
        );
        let request = HttpRequest::new(Method::Delete, url.clone())
            .header("Authorization", self.auth_header.clone());
        let response = self.exchange(request)?;
        if !response.is_success() {
            return Err(WikiError::upstream(response.status, &response.body));
        }
        // Some deployments answer a delete with an empty body.
        if response.body.trim().is_empty() {
            return Ok(PageMetadata::default());
        }
        decode_body(&url, &response)
    }

    pub fn list_attachments(&self, wiki: &str) -> Result<Vec<AttachmentRef>, WikiError> {
        let url = format!(
            "{}/wikis/{}/attachments?api-version={}",
            self.wiki_base,
            encode_component(wiki),
            self.settings.api_version
        );
        let response = self.exchange(self.get(&url))?;
        let collection: Collection<AttachmentRef> = decode_success(&url, response)?;
        Ok(collection.value)
    }

    /// Upload an attachment. The wire contract wants the payload
    /// base64-encoded in the request body.
    pub fn upload_attachment(
        &self,
        wiki: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<AttachmentRef, WikiError> {
        if name.trim().is_empty() {
            return Err(WikiError::invalid_argument(
                "attachment name must not be empty",
            ));
        }
        let url = format!(
            "{}/wikis/{}/attachments?name={}&api-version={}",
            self.wiki_base,
            encode_component(wiki),
            encode_component(name),
            self.settings.api_version
        );
        let request = HttpRequest::new(Method::Put, url.clone())
            .header("Authorization", self.auth_header.clone())
            .header("Content-Type", content_type)
            .raw(BASE64.encode(bytes).into_bytes());
        let response = self.exchange(request)?;
        decode_success(&url, response)
    }

    /// Delegated full-text search against the upstream search service.
    /// Lives on a separate host from the wiki API.
    pub fn search_remote(
        &self,
        wiki: &str,
        query: &str,
        top: usize,
    ) -> Result<RemoteSearchResults, WikiError> {
        if query.trim().is_empty() {
            return Err(WikiError::invalid_argument(
                "search query must not be empty",
            ));
        }
        let body = json!({
            "searchText": query,
            "$top": top,
            "filters": { "Wiki": [wiki] },
        });
        let request = HttpRequest::new(Method::Post, self.search_endpoint.clone())
            .header("Authorization", self.auth_header.clone())
            .json(body);
        let response = self.exchange(request)?;
        decode_success(&self.search_endpoint, response)
    }

    fn get(&self, url: &str) -> HttpRequest {
        HttpRequest::new(Method::Get, url.to_string())
            .header("Authorization", self.auth_header.clone())
    }

    fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, WikiError> {
        tracing::debug!(method = request.method.as_str(), url = %request.url, "upstream request");
        self.transport.send(request)
    }
}

fn decode_success<D: DeserializeOwned>(
    url: &str,
    response: HttpResponse,
) -> Result<D, WikiError> {
    if !response.is_success() {
        return Err(WikiError::upstream(response.status, &response.body));
    }
    decode_body(url, &response)
}

fn decode_body<D: DeserializeOwned>(url: &str, response: &HttpResponse) -> Result<D, WikiError> {
    serde_json::from_str(&response.body).map_err(|error| {
        WikiError::Decode(format!("unexpected response shape from {url}: {error}"))
    })
}

/// Percent-encode a page path for query position, preserving `/`.
pub fn encode_page_path(path: &str) -> String {
    utf8_percent_encode(path, PAGE_PATH_SET).to_string()
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT_SET).to_string()
}
