//! S3-compatible catalog over HTTP(S).
//!
//! Listing uses the ListObjectsV2 query (`?list-type=2&prefix=...`) and
//! pulls the `<Key>` elements out of the XML response, following
//! continuation tokens until the listing is no longer truncated. Objects are
//! read with a plain `GET {bucket}/{key}`, so the bucket (or the update
//! prefix) must be publicly readable.

use super::{CatalogEntry, ProgressFn, RemoteCatalog, discard_partial, finish_partial, partial_path};
use crate::constants::UPDATE_PREFIX;
use crate::core::CatalogError;
use crate::updater::installer::archive_destination;
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use reqwest::{Client, Response, Url};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Key>([^<]*)</Key>").expect("valid key regex"));
static TRUNCATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<IsTruncated>\s*true\s*</IsTruncated>").expect("valid truncation regex")
});
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<NextContinuationToken>([^<]*)</NextContinuationToken>")
        .expect("valid token regex")
});
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#[xX]([0-9A-Fa-f]+)|#([0-9]+)|(lt|gt|quot|apos|amp));")
        .expect("valid entity regex")
});

/// One page of a ListObjectsV2 response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub keys: Vec<String>,
    /// Token for the next page, present only when the listing is truncated.
    pub next_token: Option<String>,
}

/// Parse a ListObjectsV2 XML document.
pub fn parse_listing(xml: &str) -> Result<ListingPage, CatalogError> {
    if !xml.contains("<ListBucketResult") {
        return Err(CatalogError::InvalidListing {
            reason: "response is not a ListBucketResult document".to_string(),
        });
    }

    let keys = KEY_RE
        .captures_iter(xml)
        .map(|caps| unescape_xml(&caps[1]))
        .collect();

    let next_token = if TRUNCATED_RE.is_match(xml) {
        let token = TOKEN_RE
            .captures(xml)
            .map(|caps| unescape_xml(&caps[1]))
            .ok_or_else(|| CatalogError::InvalidListing {
                reason: "truncated listing without a continuation token".to_string(),
            })?;
        Some(token)
    } else {
        None
    };

    Ok(ListingPage { keys, next_token })
}

/// Decode the predefined entities and numeric character references in
/// one pass. Unknown or invalid references are left as they are.
fn unescape_xml(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let decoded = if let Some(hex) = caps.get(1) {
                u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = caps.get(2) {
                dec.as_str().parse().ok().and_then(char::from_u32)
            } else {
                match &caps[3] {
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    _ => Some('&'),
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Catalog backed by an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    prefix: String,
}

impl HttpCatalog {
    /// Create a catalog for `base_url` (the bucket endpoint).
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Url::parse(base_url).with_context(|| format!("Invalid catalog URL '{base_url}'"))?;

        let client = Client::builder()
            .user_agent(concat!("kiosk-updater/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix: UPDATE_PREFIX.to_string(),
        })
    }

    /// Restrict listings to keys under `prefix` (default `software_update/`).
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, CatalogError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| CatalogError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn stream_to(
        &self,
        response: Response,
        url: &str,
        partial: &Path,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64, CatalogError> {
        let total = response.content_length();
        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| CatalogError::io(partial, e))?;

        let mut loaded = 0u64;
        on_progress(loaded, total);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| CatalogError::Transport {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| CatalogError::io(partial, e))?;
            loaded += chunk.len() as u64;
            on_progress(loaded, total);
        }

        file.sync_all().await.map_err(|e| CatalogError::io(partial, e))?;
        Ok(loaded)
    }
}

#[async_trait]
impl RemoteCatalog for HttpCatalog {
    async fn list_keys(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let url = format!("{}/", self.base_url);
        let mut entries = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query = vec![("list-type", "2"), ("prefix", self.prefix.as_str())];
            if let Some(token) = token.as_deref() {
                query.push(("continuation-token", token));
            }

            let body = self
                .get(&url, &query)
                .await?
                .text()
                .await
                .map_err(|source| CatalogError::Transport {
                    url: url.clone(),
                    source,
                })?;

            let page = parse_listing(&body)?;
            entries.extend(page.keys.into_iter().map(CatalogEntry::new));

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!("Listed {} key(s) from {}", entries.len(), self.base_url);
        Ok(entries)
    }

    async fn read_text_key(&self, key: &str) -> Result<String, CatalogError> {
        let url = self.object_url(key);
        let response = self.get(&url, &[]).await.map_err(|e| match e {
            CatalogError::Status { status: 404, .. } => CatalogError::MissingKey {
                key: key.to_string(),
            },
            other => other,
        })?;

        response.text().await.map_err(|source| CatalogError::Transport { url, source })
    }

    async fn download_key(
        &self,
        key: &str,
        dest_dir: &Path,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf, CatalogError> {
        let url = self.object_url(key);
        let final_path = archive_destination(dest_dir, key);
        let partial = partial_path(&final_path);

        info!("Downloading {url} to {}", final_path.display());
        let response = self.get(&url, &[]).await?;

        match self.stream_to(response, &url, &partial, on_progress).await {
            Ok(bytes) => {
                finish_partial(&partial, &final_path).await?;
                info!("Downloaded {bytes} bytes");
                Ok(final_path)
            }
            Err(e) => {
                discard_partial(&partial).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::VERSION_KEY;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>touch-plus</Name>
  <Prefix>software_update/</Prefix>
  <KeyCount>2</KeyCount>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>software_update/version.txt</Key><Size>4</Size></Contents>
  <Contents><Key>software_update/patch.zip</Key><Size>1024</Size></Contents>
</ListBucketResult>"#;

    #[test]
    fn test_parse_listing_keys() {
        let page = parse_listing(PAGE).unwrap();
        assert_eq!(
            page.keys,
            vec!["software_update/version.txt", "software_update/patch.zip"]
        );
        assert_eq!(page.next_token, None);
    }

    #[test]
    fn test_parse_truncated_listing() {
        let xml = r#"<ListBucketResult><IsTruncated>true</IsTruncated>
<NextContinuationToken>abc&amp;def</NextContinuationToken>
<Contents><Key>a&amp;b</Key></Contents></ListBucketResult>"#;
        let page = parse_listing(xml).unwrap();
        assert_eq!(page.keys, vec!["a&b"]);
        assert_eq!(page.next_token.as_deref(), Some("abc&def"));
    }

    #[test]
    fn test_parse_numeric_character_references() {
        let xml = "<ListBucketResult><IsTruncated>false</IsTruncated>\
<Contents><Key>software_update&#47;version.txt</Key></Contents>\
<Contents><Key>a&#38;b&#x26;c&#X3C;</Key></Contents>\
<Contents><Key>&amp;lt; &#xD800; &#99999999;</Key></Contents></ListBucketResult>";
        let page = parse_listing(xml).unwrap();
        assert_eq!(
            page.keys,
            vec![VERSION_KEY, "a&b&c<", "&lt; &#xD800; &#99999999;"]
        );
    }

    #[test]
    fn test_parse_rejects_non_listing() {
        assert!(matches!(
            parse_listing("<Error><Code>AccessDenied</Code></Error>"),
            Err(CatalogError::InvalidListing { .. })
        ));
        assert!(matches!(
            parse_listing("<ListBucketResult><IsTruncated>true</IsTruncated></ListBucketResult>"),
            Err(CatalogError::InvalidListing { .. })
        ));
    }

    #[test]
    fn test_empty_listing() {
        let page = parse_listing("<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>")
            .unwrap();
        assert!(page.keys.is_empty());
    }

    #[tokio::test]
    async fn test_list_follows_continuation() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/")
            .match_query(mockito::Matcher::Regex(
                "^list-type=2&prefix=software_update%2F$".into(),
            ))
            .with_body(
                "<ListBucketResult><IsTruncated>true</IsTruncated>\
                 <NextContinuationToken>page2</NextContinuationToken>\
                 <Contents><Key>software_update/version.txt</Key></Contents></ListBucketResult>",
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/")
            .match_query(mockito::Matcher::UrlEncoded(
                "continuation-token".into(),
                "page2".into(),
            ))
            .with_body(
                "<ListBucketResult><IsTruncated>false</IsTruncated>\
                 <Contents><Key>software_update/patch.zip</Key></Contents></ListBucketResult>",
            )
            .create_async()
            .await;

        let catalog = HttpCatalog::new(&server.url(), Duration::from_secs(5)).unwrap();
        let keys = catalog.list_keys().await.unwrap();

        assert_eq!(
            keys,
            vec![
                CatalogEntry::new("software_update/version.txt"),
                CatalogEntry::new("software_update/patch.zip"),
            ]
        );
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_read_text_key_and_missing_key() {
        let mut server = mockito::Server::new_async().await;
        let _version = server
            .mock("GET", "/software_update/version.txt")
            .with_body("2.0\n")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/software_update/missing.txt")
            .with_status(404)
            .create_async()
            .await;

        let catalog = HttpCatalog::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert_eq!(catalog.read_text_key("software_update/version.txt").await.unwrap(), "2.0\n");
        assert!(matches!(
            catalog.read_text_key("software_update/missing.txt").await,
            Err(CatalogError::MissingKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let catalog = HttpCatalog::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            catalog.list_keys().await,
            Err(CatalogError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_download_reports_progress_and_renames() {
        let body = vec![7u8; 10_000];
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/software_update/patch.zip")
            .with_body(body.clone())
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let catalog = HttpCatalog::new(&server.url(), Duration::from_secs(5)).unwrap();
        let seen = Mutex::new(Vec::new());
        let progress = |loaded: u64, total: Option<u64>| seen.lock().unwrap().push((loaded, total));

        let path = catalog
            .download_key("software_update/patch.zip", temp.path(), &progress)
            .await
            .unwrap();

        assert_eq!(path, temp.path().join("patch.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert!(!temp.path().join("patch.zip.part").exists());

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.first(), Some(&(0, Some(10_000))));
        assert_eq!(seen.last(), Some(&(10_000, Some(10_000))));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/software_update/patch.zip")
            .with_status(500)
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let catalog = HttpCatalog::new(&server.url(), Duration::from_secs(5)).unwrap();
        let result = catalog
            .download_key("software_update/patch.zip", temp.path(), &|_, _| {})
            .await;

        assert!(matches!(result, Err(CatalogError::Status { status: 500, .. })));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
