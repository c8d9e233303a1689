pub mod client;
pub mod config;
pub mod crawl;
pub mod error;
pub mod transport;

pub use client::{
    AttachmentRef, PageContent, PageMetadata, PageRef, PageUpsert, PageWriteOutcome, WikiClient,
    WikiRef,
};
pub use config::{ClientSettings, WikiConfig, load_config};
pub use crawl::{DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT, SearchMatch, WikiPages, crawl, search};
pub use error::WikiError;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, ReqwestTransport};
