use serde::Serialize;

use crate::client::{PageContent, PageRef, WikiClient};
use crate::error::WikiError;
use crate::transport::HttpTransport;

/// Snippet length returned with a search match, in characters.
pub const SNIPPET_CHARS: usize = 250;

/// Default number of matches when the caller does not say otherwise.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Hard cap on matches per search, regardless of caller input.
pub const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchMatch {
    pub path: String,
    pub snippet: String,
}

/// The slice of the upstream client the aggregator depends on.
pub trait WikiPages {
    fn list_pages(&self, wiki: &str) -> Result<Vec<PageRef>, WikiError>;
    fn page_content_by_path(&self, wiki: &str, path: &str) -> Result<PageContent, WikiError>;
}

impl<T: HttpTransport> WikiPages for WikiClient<T> {
    fn list_pages(&self, wiki: &str) -> Result<Vec<PageRef>, WikiError> {
        WikiClient::list_pages(self, wiki)
    }

    fn page_content_by_path(&self, wiki: &str, path: &str) -> Result<PageContent, WikiError> {
        self.get_page_content(wiki, Some(path), None)
    }
}

/// Fetch the content of every page in a wiki, sequentially, in listing
/// order. Pages without a path are skipped. A failed fetch is recorded
/// in that page's entry and the crawl moves on; only `list_pages`
/// itself failing aborts the whole crawl. Every call re-fetches from
/// upstream; nothing is cached between calls.
pub fn crawl<A: WikiPages>(api: &A, wiki: &str) -> Result<Vec<PageContent>, WikiError> {
    let pages = api.list_pages(wiki)?;
    let mut results = Vec::with_capacity(pages.len());
    for page in pages {
        let path = match page.path {
            Some(path) if !path.is_empty() => path,
            _ => continue,
        };
        match api.page_content_by_path(wiki, &path) {
            Ok(mut page_content) => {
                page_content.path = path;
                results.push(page_content);
            }
            Err(error) => {
                tracing::warn!(path = %path, error = %error, "page fetch failed during crawl");
                results.push(PageContent {
                    path,
                    content: None,
                    error: Some(error.to_string()),
                });
            }
        }
    }
    Ok(results)
}

/// Case-insensitive substring search over a full crawl of the wiki.
/// Matches are returned in listing order with a bounded snippet, and
/// the scan stops once `limit` matches have been collected. `limit` is
/// clamped to [`MAX_SEARCH_LIMIT`].
pub fn search<A: WikiPages>(
    api: &A,
    wiki: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchMatch>, WikiError> {
    let limit = limit.min(MAX_SEARCH_LIMIT);
    let query_lower = query.to_lowercase();
    let pages = crawl(api, wiki)?;

    let mut matches = Vec::new();
    for page in pages {
        if matches.len() >= limit {
            break;
        }
        let content = page.content.as_deref().unwrap_or("");
        if content.to_lowercase().contains(&query_lower) {
            matches.push(SearchMatch {
                path: page.path,
                snippet: content.chars().take(SNIPPET_CHARS).collect(),
            });
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use super::{MAX_SEARCH_LIMIT, SNIPPET_CHARS, WikiPages, crawl, search};
    use crate::client::{PageContent, PageRef};
    use crate::error::WikiError;

    #[derive(Default)]
    struct FakeWiki {
        pages: Vec<PageRef>,
        contents: BTreeMap<String, String>,
        failing_paths: Vec<String>,
        fetched_paths: RefCell<Vec<String>>,
    }

    impl FakeWiki {
        fn with_pages(entries: &[(&str, &str)]) -> Self {
            let mut wiki = Self::default();
            for (path, content) in entries {
                wiki.pages.push(PageRef {
                    path: Some((*path).to_string()),
                    id: None,
                    order: None,
                });
                wiki.contents
                    .insert((*path).to_string(), (*content).to_string());
            }
            wiki
        }
    }

    impl WikiPages for FakeWiki {
        fn list_pages(&self, _wiki: &str) -> Result<Vec<PageRef>, WikiError> {
            Ok(self.pages.clone())
        }

        fn page_content_by_path(
            &self,
            _wiki: &str,
            path: &str,
        ) -> Result<PageContent, WikiError> {
            self.fetched_paths.borrow_mut().push(path.to_string());
            if self.failing_paths.iter().any(|failing| failing == path) {
                return Err(WikiError::upstream(500, "internal error"));
            }
            Ok(PageContent {
                path: path.to_string(),
                content: self.contents.get(path).cloned(),
                error: None,
            })
        }
    }

    #[test]
    fn crawl_yields_one_entry_per_listed_page_in_listing_order() {
        let wiki = FakeWiki::with_pages(&[
            ("/Home", "Welcome to the team"),
            ("/Arch", "System architecture overview"),
            ("/Arch/Storage", "Disk layout"),
        ]);
        let results = crawl(&wiki, "TeamWiki").expect("crawl");

        let paths: Vec<&str> = results.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(paths, vec!["/Home", "/Arch", "/Arch/Storage"]);
        assert!(results.iter().all(|entry| entry.error.is_none()));
    }

    #[test]
    fn crawl_skips_pages_without_a_path_silently() {
        let mut wiki = FakeWiki::with_pages(&[("/Home", "hello")]);
        wiki.pages.insert(
            0,
            PageRef {
                path: None,
                id: Some(1),
                order: None,
            },
        );
        wiki.pages.push(PageRef {
            path: Some(String::new()),
            id: Some(2),
            order: None,
        });

        let results = crawl(&wiki, "TeamWiki").expect("crawl");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/Home");
    }

    #[test]
    fn crawl_isolates_a_single_page_failure() {
        let mut wiki = FakeWiki::with_pages(&[
            ("/Home", "hello"),
            ("/Broken", "unreachable"),
            ("/After", "still processed"),
        ]);
        wiki.failing_paths.push("/Broken".to_string());

        let results = crawl(&wiki, "TeamWiki").expect("crawl");
        assert_eq!(results.len(), 3);

        let broken = &results[1];
        assert_eq!(broken.path, "/Broken");
        assert!(broken.content.is_none());
        assert!(broken.error.as_deref().unwrap_or("").contains("HTTP 500"));

        assert_eq!(results[2].content.as_deref(), Some("still processed"));
        assert_eq!(wiki.fetched_paths.borrow().len(), 3);
    }

    #[test]
    fn search_matches_case_insensitively_with_bounded_snippets() {
        let wiki = FakeWiki::with_pages(&[
            ("/Home", "Welcome to the team"),
            ("/Arch", "System architecture overview"),
        ]);
        let matches = search(&wiki, "TeamWiki", "ARCHITECTURE", 10).expect("search");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "/Arch");
        assert_eq!(matches[0].snippet, "System architecture overview");
    }

    #[test]
    fn search_snippet_is_a_250_character_prefix() {
        let long = "architecture ".repeat(100);
        let wiki = FakeWiki::with_pages(&[("/Long", long.as_str())]);
        let matches = search(&wiki, "TeamWiki", "architecture", 10).expect("search");

        assert_eq!(matches[0].snippet.chars().count(), SNIPPET_CHARS);
        assert!(long.starts_with(&matches[0].snippet));
    }

    #[test]
    fn search_stops_at_the_limit_in_listing_order() {
        let wiki = FakeWiki::with_pages(&[
            ("/First", "shared keyword"),
            ("/Second", "shared keyword"),
        ]);
        let matches = search(&wiki, "TeamWiki", "keyword", 1).expect("search");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "/First");
    }

    #[test]
    fn search_clamps_the_limit() {
        let entries: Vec<(String, String)> = (0..80)
            .map(|index| (format!("/Page{index:02}"), "keyword".to_string()))
            .collect();
        let borrowed: Vec<(&str, &str)> = entries
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_str()))
            .collect();
        let wiki = FakeWiki::with_pages(&borrowed);

        let matches = search(&wiki, "TeamWiki", "keyword", 1_000).expect("search");
        assert_eq!(matches.len(), MAX_SEARCH_LIMIT);
    }

    #[test]
    fn search_treats_failed_pages_as_empty_content() {
        let mut wiki = FakeWiki::with_pages(&[("/Home", "keyword here")]);
        wiki.pages.push(PageRef {
            path: Some("/Broken".to_string()),
            id: None,
            order: None,
        });
        wiki.failing_paths.push("/Broken".to_string());

        let matches = search(&wiki, "TeamWiki", "keyword", 10).expect("search");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "/Home");
    }

    #[test]
    fn search_is_deterministic_for_fixed_upstream_state() {
        let wiki = FakeWiki::with_pages(&[
            ("/Home", "alpha beta"),
            ("/Arch", "beta gamma"),
        ]);
        let first = search(&wiki, "TeamWiki", "beta", 10).expect("search");
        let second = search(&wiki, "TeamWiki", "beta", 10).expect("search");
        assert_eq!(first, second);
    }
}
