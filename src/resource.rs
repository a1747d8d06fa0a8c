//! Instance-scoped resource cache.
//!
//! Backends register every external resource (images) they need, then wait
//! on `resolve_all`, which fetches everything still pending concurrently with
//! a per-resource timeout. Cross-origin handling follows `ResourceOptions`:
//! blocked when neither CORS, taint nor a proxy is allowed; routed through the
//! proxy when one is configured and CORS is off.

use crate::config::ResourceOptions;
use crate::{Error, Result};
use base64::Engine as _;
use futures::future::{join_all, BoxFuture};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

/// A single outgoing fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Whether the request should carry credentials (CORS mode)
    pub credentialed: bool,
}

/// Transport used by the resource cache
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Vec<u8>>>;
}

/// Fetcher that refuses every request; inline `data:` resources still work.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFetcher;

impl Fetcher for NoopFetcher {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move { Err(Error::Network(format!("fetching is disabled: {}", request.url))) })
    }
}

/// HTTP transport backed by `reqwest`
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move {
            let mut req = self.client.get(&request.url);
            if request.credentialed {
                req = req.header("Sec-Fetch-Mode", "cors");
            }
            let resp = req.send().await?.error_for_status()?;
            Ok(resp.bytes().await?.to_vec())
        })
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Pending(FetchRequest),
    Ready(Arc<Vec<u8>>),
    Skipped(String),
    Failed(String),
}

/// Resource cache for one render instance
pub struct ResourceCache {
    options: ResourceOptions,
    origin: Option<Url>,
    fetcher: Arc<dyn Fetcher>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("options", &self.options)
            .field("origin", &self.origin.as_ref().map(|u| u.as_str()))
            .field("entries", &self.len())
            .finish()
    }
}

impl ResourceCache {
    /// `base_url` is the document's URL; relative sources resolve against it
    /// and it defines the same-origin check.
    pub fn new(options: ResourceOptions, base_url: Option<&str>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            options,
            origin: base_url.and_then(|u| Url::parse(u).ok()),
            fetcher,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ResourceOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register an image source. Returns false when the source will not be
    /// loaded (blocked by policy or unresolvable).
    pub fn add_image(&self, src: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(src) {
            return !matches!(existing, Entry::Skipped(_));
        }
        let entry = self.plan(src);
        let loadable = !matches!(entry, Entry::Skipped(_));
        entries.insert(src.to_string(), entry);
        loadable
    }

    fn plan(&self, src: &str) -> Entry {
        if src.starts_with("data:") {
            return match decode_data_url(src) {
                Some(bytes) => Entry::Ready(Arc::new(bytes)),
                None => Entry::Failed("malformed data url".into()),
            };
        }

        let url = match (Url::parse(src), &self.origin) {
            (Ok(u), _) => u,
            (Err(_), Some(base)) => match base.join(src) {
                Ok(u) => u,
                Err(e) => return Entry::Skipped(format!("unresolvable url: {}", e)),
            },
            (Err(_), None) => return Entry::Skipped("relative url without a document base".into()),
        };

        let same_origin = self.origin.as_ref().is_some_and(|o| o.origin() == url.origin());
        let opts = &self.options;
        let use_proxy = !same_origin && !opts.use_cors && opts.proxy.is_some();
        if !same_origin && !opts.allow_taint && !opts.use_cors && !use_proxy {
            return Entry::Skipped("cross-origin resource blocked".into());
        }

        if use_proxy {
            let proxy = opts.proxy.as_deref().unwrap_or_default();
            return match Url::parse(proxy) {
                Ok(mut proxied) => {
                    proxied
                        .query_pairs_mut()
                        .append_pair("url", url.as_str())
                        .append_pair("responseType", "blob");
                    Entry::Pending(FetchRequest { url: proxied.to_string(), credentialed: false })
                }
                Err(e) => Entry::Skipped(format!("invalid proxy url: {}", e)),
            };
        }

        Entry::Pending(FetchRequest {
            url: url.to_string(),
            credentialed: opts.use_cors && !same_origin,
        })
    }

    /// Whether `src` has been registered (in any state)
    pub fn has(&self, src: &str) -> bool {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).contains_key(src)
    }

    /// Loaded bytes for `src`, if it resolved
    pub fn get(&self, src: &str) -> Option<Arc<Vec<u8>>> {
        match self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(src)? {
            Entry::Ready(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// The request issued (or to be issued) for `src`
    pub fn request_for(&self, src: &str) -> Option<FetchRequest> {
        match self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(src)? {
            Entry::Pending(req) => Some(req.clone()),
            _ => None,
        }
    }

    /// Fetch every pending resource. The first failure or timeout is
    /// returned after all fetches settle; successful entries stay cached.
    pub async fn resolve_all(&self) -> Result<()> {
        let pending: Vec<(String, FetchRequest)> = {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .iter()
                .filter_map(|(k, e)| match e {
                    Entry::Pending(req) => Some((k.clone(), req.clone())),
                    _ => None,
                })
                .collect()
        };

        let timeout_ms = self.options.image_timeout_ms;
        let results = join_all(pending.into_iter().map(|(key, req)| async move {
            let fetch = self.fetcher.fetch(req);
            let res = if timeout_ms == 0 {
                fetch.await
            } else {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), fetch).await {
                    Ok(r) => r,
                    Err(_) => Err(Error::Resource(format!("Timed out ({}ms) loading {}", timeout_ms, key))),
                }
            };
            (key, res)
        }))
        .await;

        let mut first_err = None;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, res) in results {
            match res {
                Ok(bytes) => {
                    entries.insert(key, Entry::Ready(Arc::new(bytes)));
                }
                Err(e) => {
                    let msg = e.to_string();
                    first_err.get_or_insert_with(|| Error::Resource(format!("{}: {}", key, msg)));
                    entries.insert(key, Entry::Failed(msg));
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn decode_data_url(src: &str) -> Option<Vec<u8>> {
    let (meta, payload) = src.strip_prefix("data:")?.split_once(',')?;
    if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD.decode(payload.trim()).ok()
    } else {
        Some(payload.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        delay_ms: u64,
    }

    impl Fetcher for CountingFetcher {
        fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Vec<u8>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                }
                Ok(request.url.into_bytes())
            })
        }
    }

    fn cache(options: ResourceOptions, delay_ms: u64) -> (ResourceCache, Arc<CountingFetcher>) {
        let fetcher = Arc::new(CountingFetcher { calls: AtomicUsize::new(0), delay_ms });
        (ResourceCache::new(options, Some("https://site.test/page/"), fetcher.clone()), fetcher)
    }

    #[tokio::test]
    async fn same_origin_images_are_fetched_once() {
        let (c, f) = cache(ResourceOptions::default(), 0);
        assert!(c.add_image("img/a.png"));
        assert!(c.add_image("img/a.png"));
        c.resolve_all().await.unwrap();
        c.resolve_all().await.unwrap();
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        let bytes = c.get("img/a.png").unwrap();
        assert_eq!(bytes.as_slice(), b"https://site.test/page/img/a.png");
    }

    #[test]
    fn cross_origin_is_blocked_without_cors_taint_or_proxy() {
        let (c, _) = cache(ResourceOptions::default(), 0);
        assert!(!c.add_image("https://other.test/x.png"));
        let (taint, _) = cache(ResourceOptions { allow_taint: true, ..Default::default() }, 0);
        assert!(taint.add_image("https://other.test/x.png"));
    }

    #[test]
    fn proxy_and_cors_shape_the_request() {
        let opts = ResourceOptions { proxy: Some("https://proxy.test/fetch".into()), ..Default::default() };
        let (c, _) = cache(opts, 0);
        assert!(c.add_image("https://other.test/x.png"));
        let req = c.request_for("https://other.test/x.png").unwrap();
        assert!(req.url.starts_with("https://proxy.test/fetch?url=https%3A%2F%2Fother.test%2Fx.png"));
        assert!(!req.credentialed);

        let (cors, _) = cache(ResourceOptions { use_cors: true, ..Default::default() }, 0);
        cors.add_image("https://other.test/x.png");
        assert!(cors.request_for("https://other.test/x.png").unwrap().credentialed);
    }

    #[test]
    fn data_urls_resolve_inline() {
        let (c, f) = cache(ResourceOptions::default(), 0);
        assert!(c.add_image("data:text/plain;base64,aGk="));
        assert_eq!(c.get("data:text/plain;base64,aGk=").unwrap().as_slice(), b"hi");
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_resources_time_out() {
        let (c, _) = cache(ResourceOptions { image_timeout_ms: 10, ..Default::default() }, 200);
        c.add_image("slow.png");
        let err = c.resolve_all().await.unwrap_err();
        assert!(matches!(err, Error::Resource(ref m) if m.contains("Timed out")));
        assert!(c.get("slow.png").is_none());
    }
}
