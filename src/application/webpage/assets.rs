//! Transient image assets for document composition.
//!
//! Every image URL the sanitizer discovered is fetched independently with
//! its own timeout; a failed fetch is logged and omitted, never fatal. Each
//! fetched image lives in a uniquely named temporary file that is deleted
//! when the owning [`AssetSet`] drops, so cleanup holds on every exit path.

use std::collections::HashMap;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;

use futures::future::join_all;
use reqwest::redirect;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetchSettings;

use super::validate;

const MAX_ASSET_REDIRECTS: usize = 5;

/// The same literal-IP classification the URL validator applies, for asset
/// URLs and redirect hops. Hostname targets pass; a failed asset only
/// degrades the output.
fn literal_host_is_public(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Ipv4(ip)) => validate::ip_is_public(IpAddr::V4(ip)),
        Some(url::Host::Ipv6(ip)) => validate::ip_is_public(IpAddr::V6(ip)),
        _ => true,
    }
}

fn asset_redirect_policy() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_ASSET_REDIRECTS {
            return attempt.error("too many redirects");
        }
        if literal_host_is_public(attempt.url()) {
            attempt.follow()
        } else {
            attempt.error("redirect to non-public address")
        }
    })
}

/// One fetched image held on disk for the lifetime of a single request.
#[derive(Debug)]
pub struct AssetRef {
    pub source: Url,
    pub content_type: String,
    file: NamedTempFile,
}

impl AssetRef {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// The request-scoped mapping from absolute image URL to local asset.
/// Dropping the set removes every temporary file it created.
#[derive(Debug, Default)]
pub struct AssetSet {
    assets: HashMap<String, AssetRef>,
}

impl AssetSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&AssetRef> {
        self.assets.get(url)
    }

    pub fn path_for(&self, url: &str) -> Option<&Path> {
        self.assets.get(url).map(AssetRef::path)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Fetches all images concurrently. Returns whatever subset succeeded.
pub async fn resolve(image_urls: &[Url], settings: &FetchSettings) -> AssetSet {
    if image_urls.is_empty() {
        return AssetSet::empty();
    }

    let client = match reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.image_timeout)
        .redirect(asset_redirect_policy())
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "could not build asset fetch client, skipping all images");
            return AssetSet::empty();
        }
    };

    let fetches = image_urls
        .iter()
        .map(|url| fetch_one(&client, url, settings));
    let mut assets = HashMap::new();
    for asset in join_all(fetches).await.into_iter().flatten() {
        assets.insert(asset.source.to_string(), asset);
    }

    AssetSet { assets }
}

async fn fetch_one(
    client: &reqwest::Client,
    url: &Url,
    settings: &FetchSettings,
) -> Option<AssetRef> {
    match try_fetch(client, url, settings).await {
        Ok(asset) => Some(asset),
        Err(reason) => {
            metrics::counter!("cambio_asset_fetch_failed_total").increment(1);
            warn!(url = %url, reason, "image skipped");
            None
        }
    }
}

async fn try_fetch(
    client: &reqwest::Client,
    url: &Url,
    settings: &FetchSettings,
) -> Result<AssetRef, String> {
    if !literal_host_is_public(url) {
        return Err("non-public address".to_string());
    }

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|err| format!("request failed: {err}"))?;
    let response = response
        .error_for_status()
        .map_err(|err| format!("status error: {err}"))?;

    let content_type = match header_content_type(&response) {
        Some(from_header) => {
            if !from_header.starts_with("image/") {
                return Err(format!("not an image (Content-Type: {from_header})"));
            }
            from_header
        }
        None => mime_guess::from_path(url.path())
            .first()
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| "image/jpeg".to_string()),
    };

    let bytes = response
        .bytes()
        .await
        .map_err(|err| format!("body read failed: {err}"))?;
    if bytes.len() as u64 > settings.max_image_bytes.get() {
        return Err(format!("image too large ({} bytes)", bytes.len()));
    }
    if bytes.is_empty() {
        return Err("empty response body".to_string());
    }

    let mut file = tempfile::Builder::new()
        .prefix("cambio-asset-")
        .suffix(&format!(".{}", extension_for(url)))
        .tempfile()
        .map_err(|err| format!("temp file creation failed: {err}"))?;
    file.write_all(&bytes)
        .map_err(|err| format!("temp file write failed: {err}"))?;

    debug!(url = %url, bytes = bytes.len(), path = %file.path().display(), "image cached");
    Ok(AssetRef {
        source: url.clone(),
        content_type,
        file,
    })
}

fn header_content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase())
}

fn extension_for(url: &Url) -> &'static str {
    let path = url.path().to_ascii_lowercase();
    for ext in ["jpg", "jpeg", "png", "gif", "webp"] {
        if path.ends_with(&format!(".{ext}")) {
            return ext;
        }
    }
    "jpg"
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::num::NonZeroU64;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use url::Url;

    use crate::config::FetchSettings;

    use super::{AssetRef, AssetSet, extension_for, resolve};

    fn asset(url: &str) -> (AssetRef, PathBuf) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"fake image bytes").unwrap();
        let path = file.path().to_path_buf();
        (
            AssetRef {
                source: Url::parse(url).unwrap(),
                content_type: "image/png".to_string(),
                file,
            },
            path,
        )
    }

    #[test]
    fn dropping_the_set_removes_every_file() {
        let (first, first_path) = asset("https://example.com/a.png");
        let (second, second_path) = asset("https://example.com/b.png");

        let mut set = AssetSet::empty();
        set.assets.insert(first.source.to_string(), first);
        set.assets.insert(second.source.to_string(), second);

        assert!(first_path.exists());
        assert!(second_path.exists());
        drop(set);
        assert!(!first_path.exists());
        assert!(!second_path.exists());
    }

    #[test]
    fn lookup_is_by_absolute_url() {
        let (asset, _path) = asset("https://example.com/pic.jpg");
        let mut set = AssetSet::empty();
        set.assets.insert(asset.source.to_string(), asset);

        assert!(set.path_for("https://example.com/pic.jpg").is_some());
        assert!(set.path_for("https://example.com/other.jpg").is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn extension_falls_back_to_jpg() {
        let with_ext = Url::parse("https://example.com/photo.PNG").unwrap();
        let without = Url::parse("https://example.com/photo").unwrap();

        assert_eq!(extension_for(&with_ext), "png");
        assert_eq!(extension_for(&without), "jpg");
    }

    #[tokio::test]
    async fn loopback_sources_are_rejected_without_contact() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let contacted = Arc::new(AtomicBool::new(false));
        let flag = contacted.clone();
        let server = tokio::spawn(async move {
            if listener.accept().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });

        let settings = FetchSettings {
            image_timeout: Duration::from_secs(2),
            max_image_bytes: NonZeroU64::new(1024).unwrap(),
            user_agent: "test-agent".to_string(),
        };
        let urls = vec![Url::parse(&format!("http://{addr}/pic.png")).unwrap()];
        let set = resolve(&urls, &settings).await;

        assert!(set.is_empty());
        assert!(
            !contacted.load(Ordering::SeqCst),
            "resolver contacted a loopback address"
        );
        server.abort();
    }
}
