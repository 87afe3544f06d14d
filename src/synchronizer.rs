//! The offline cache synchronizer.
//!
//! Keeps three caches in step with the resource table:
//!
//! - **content**: resources currently served to pages,
//! - **staging**: core shell files downloaded during install,
//! - **manifest**: the fingerprints of the last successful activation.
//!
//! `install` stages the shell, `activate` reconciles the content cache
//! against the previous manifest and promotes the staged files, `fetch`
//! serves requests for known resources, and `message` handles control
//! messages from the host page.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, stream};
use reqwest::Method;
use tokio_util::task::TaskTracker;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::key::{self, ROOT_KEY};
use crate::lifecycle::{Lifecycle, WorkerState};
use crate::message::ControlMessage;
use crate::network::{Network, Request, Response};
use crate::resources::{ResourceTable, parse_manifest};
use crate::stats::{CacheReport, ManifestState, PrefetchStats};
use crate::store::{CacheHandle, CacheStorage};

/// Key of the single entry held by the manifest cache.
pub const MANIFEST_KEY: &str = "manifest";

/// States of the activation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// No manifest was persisted: the content cache is rebuilt from scratch.
    NoPriorManifest,
    /// A previous manifest exists: unchanged resources are kept.
    HasPriorManifest,
    /// Reconciliation finished and the new manifest is persisted.
    Activated,
    /// Reconciliation failed and every cache was deleted.
    Corrupted,
}

/// What an activation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// Terminal state: [`ActivationState::Activated`] or [`ActivationState::Corrupted`].
    pub state: ActivationState,
    /// Branch taken: [`ActivationState::NoPriorManifest`] or [`ActivationState::HasPriorManifest`].
    pub path: ActivationState,
    /// Request keys evicted from the content cache.
    pub evicted: Vec<String>,
    /// Number of staged entries promoted into the content cache.
    pub promoted: usize,
}

impl ActivationReport {
    const fn new() -> Self {
        Self {
            state: ActivationState::NoPriorManifest,
            path: ActivationState::NoPriorManifest,
            evicted: Vec::new(),
            promoted: 0,
        }
    }
}

/// Result of intercepting a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not a cacheable resource; the host should perform the request itself.
    Passthrough,
    /// Served from the content cache.
    Cached(Response),
    /// Served live from the network.
    Network(Response),
}

impl FetchOutcome {
    /// Returns the response, unless the request was passed through.
    #[must_use]
    pub const fn response(&self) -> Option<&Response> {
        match self {
            Self::Passthrough => None,
            Self::Cached(r) | Self::Network(r) => Some(r),
        }
    }

    /// Consumes the outcome and returns the response, if any.
    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Passthrough => None,
            Self::Cached(r) | Self::Network(r) => Some(r),
        }
    }
}

/// Keeps a persistent cache synchronized with a versioned resource table.
///
/// Cloning is cheap; clones share storage, network, lifecycle and background
/// tasks.
pub struct Synchronizer<S, N> {
    storage: Arc<S>,
    network: Arc<N>,
    table: Arc<ResourceTable>,
    config: Arc<SyncConfig>,
    origin: Arc<str>,
    lifecycle: Arc<Lifecycle>,
    tasks: TaskTracker,
}

impl<S, N> Clone for Synchronizer<S, N> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            network: Arc::clone(&self.network),
            table: Arc::clone(&self.table),
            config: Arc::clone(&self.config),
            origin: Arc::clone(&self.origin),
            lifecycle: Arc::clone(&self.lifecycle),
            tasks: self.tasks.clone(),
        }
    }
}

impl<S, N> Synchronizer<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    /// Creates a synchronizer for `table` served from `config.origin`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrigin`] if the configured origin is not an
    /// absolute http(s) origin.
    pub fn new(
        config: SyncConfig,
        table: ResourceTable,
        storage: Arc<S>,
        network: Arc<N>,
    ) -> Result<Self> {
        let origin = key::normalize_origin(&config.origin)?;
        Ok(Self {
            storage,
            network,
            table: Arc::new(table),
            config: Arc::new(config),
            origin: origin.into(),
            lifecycle: Arc::new(Lifecycle::new()),
            tasks: TaskTracker::new(),
        })
    }

    /// Returns the normalized origin.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the resource table.
    #[must_use]
    pub fn table(&self) -> &ResourceTable {
        &self.table
    }

    /// Returns the lifecycle flags.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Returns the underlying cache storage.
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the absolute URL of a logical key on this origin.
    #[must_use]
    pub fn url_for(&self, key: &str) -> String {
        key::canonical_url(&self.origin, key)
    }

    async fn content(&self) -> Result<CacheHandle<'_, S>> {
        CacheHandle::open(&*self.storage, &self.config.cache_names.content).await
    }

    // ------------------------------------------------------------------
    // install
    // ------------------------------------------------------------------

    /// Downloads the core shell into the staging cache.
    ///
    /// Every core resource is fetched with a forced reload. Nothing is
    /// written unless all of them succeed. Skip-waiting is requested up front.
    ///
    /// # Errors
    ///
    /// Returns the first transport error or non-success status. The instance
    /// becomes [`WorkerState::Redundant`]; the host retries with a new one.
    pub async fn install(&self) -> Result<()> {
        self.lifecycle.transition(WorkerState::Installing);
        self.lifecycle.skip_waiting();

        match self.stage_core().await {
            Ok(staged) => {
                log::info!("Installed: staged {staged} core resources");
                self.lifecycle.transition(WorkerState::Installed);
                Ok(())
            }
            Err(e) => {
                log::debug!("Install failed: {e}");
                self.lifecycle.transition(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    async fn stage_core(&self) -> Result<usize> {
        let downloads = self.table.core().iter().map(|key| {
            let url = self.url_for(key);
            async move {
                let response = self
                    .network
                    .fetch(&Request::get(url.as_str()).with_reload())
                    .await?;
                if !response.is_success() {
                    return Err(Error::Status {
                        url,
                        status: response.status,
                    });
                }
                Ok((url, response))
            }
        });
        let staged = futures::future::try_join_all(downloads).await?;

        // Staging may still hold the shell of an instance that never activated.
        let name = &self.config.cache_names.staging;
        self.storage.delete(name).await?;
        let staging = CacheHandle::open(&*self.storage, name).await?;
        for (url, response) in &staged {
            staging.put(url, response).await?;
        }
        Ok(staged.len())
    }

    // ------------------------------------------------------------------
    // activate
    // ------------------------------------------------------------------

    /// Reconciles the content cache with the resource table and promotes the
    /// staged shell.
    ///
    /// On any failure all three caches are deleted and the error is logged, so
    /// the next cycle starts from [`ActivationState::NoPriorManifest`]. The
    /// instance becomes active either way.
    pub async fn activate(&self) -> ActivationReport {
        self.lifecycle.transition(WorkerState::Activating);

        let mut report = ActivationReport::new();
        match self.reconcile(&mut report).await {
            Ok(()) => {
                report.state = ActivationState::Activated;
                log::info!(
                    "Activated: promoted {}, evicted {}",
                    report.promoted,
                    report.evicted.len()
                );
            }
            Err(e) => {
                log::error!("Failed to upgrade offline cache: {e}");
                self.teardown().await;
                report.state = ActivationState::Corrupted;
                report.evicted.clear();
                report.promoted = 0;
            }
        }

        self.lifecycle.transition(WorkerState::Activated);
        report
    }

    async fn reconcile(&self, report: &mut ActivationReport) -> Result<()> {
        let storage = &*self.storage;
        let names = &self.config.cache_names;

        let content = CacheHandle::open(storage, &names.content).await?;
        let staging = CacheHandle::open(storage, &names.staging).await?;
        let manifest = CacheHandle::open(storage, &names.manifest).await?;

        if let Some(record) = manifest.get(MANIFEST_KEY).await? {
            report.path = ActivationState::HasPriorManifest;
            let previous = parse_manifest(&record.body)?;

            for url in content.keys().await? {
                let unchanged = key::stored_key(&url, &self.origin).is_some_and(|k| {
                    match (self.table.fingerprint(&k), previous.get(&k)) {
                        (Some(current), Some(old)) => current == old,
                        _ => false,
                    }
                });
                if !unchanged {
                    content.remove(&url).await?;
                    report.evicted.push(url);
                }
            }
        } else {
            report.path = ActivationState::NoPriorManifest;
            // Whatever is in content may come from an aborted run.
            storage.delete(&names.content).await?;
            storage.open(&names.content).await?;
        }

        for url in staging.keys().await? {
            let current =
                key::stored_key(&url, &self.origin).is_some_and(|k| self.table.contains(&k));
            if !current {
                log::debug!("Dropping {url} from {}: not in the resource table", staging.name());
                staging.remove(&url).await?;
            }
        }
        report.promoted = staging.copy_into(&content).await?;
        storage.delete(&names.staging).await?;

        let record = Response::new(MANIFEST_KEY, 200, self.table.to_manifest()?);
        manifest.put(MANIFEST_KEY, &record).await?;

        self.lifecycle.claim_clients();
        Ok(())
    }

    async fn teardown(&self) {
        let names = &self.config.cache_names;
        for name in [&names.content, &names.staging, &names.manifest] {
            if let Err(e) = self.storage.delete(name).await {
                log::error!("Failed to delete cache {name}: {e}");
            }
        }
    }

    // ------------------------------------------------------------------
    // fetch
    // ------------------------------------------------------------------

    /// Intercepts a page request.
    ///
    /// Only GET requests for keys in the resource table are handled. The root
    /// document is fetched online-first; everything else cache-first.
    ///
    /// # Errors
    ///
    /// Returns the network error when a resource is neither cached nor
    /// reachable, and propagates cache storage errors on the cache-first path.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome> {
        if request.method != Method::GET {
            return Ok(FetchOutcome::Passthrough);
        }
        let Some(key) = key::request_key(&request.url, &self.origin) else {
            return Ok(FetchOutcome::Passthrough);
        };
        if !self.table.contains(&key) {
            return Ok(FetchOutcome::Passthrough);
        }
        if key == ROOT_KEY {
            return self.online_first(request).await;
        }
        self.cache_first(&key, request).await
    }

    async fn cache_first(&self, key: &str, request: &Request) -> Result<FetchOutcome> {
        let url = self.url_for(key);
        if let Some(cached) = self.cached(&url).await? {
            return Ok(FetchOutcome::Cached(cached));
        }

        let response = self.network.fetch(request).await?;
        if response.is_success() {
            self.store_in_background(url, response.clone());
        }
        Ok(FetchOutcome::Network(response))
    }

    async fn online_first(&self, request: &Request) -> Result<FetchOutcome> {
        let url = self.url_for(ROOT_KEY);
        let err = match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store_in_background(url, response.clone());
                }
                return Ok(FetchOutcome::Network(response));
            }
            Err(e) => e,
        };

        match self.cached(&url).await {
            Ok(Some(cached)) => Ok(FetchOutcome::Cached(cached)),
            Ok(None) => Err(err),
            Err(cache_err) => {
                log::debug!("Cache fallback for {url} failed: {cache_err}");
                Err(err)
            }
        }
    }

    async fn cached(&self, url: &str) -> Result<Option<Response>> {
        self.content().await?.get(url).await
    }

    fn store_in_background(&self, url: String, response: Response) {
        let storage = Arc::clone(&self.storage);
        let config = Arc::clone(&self.config);
        self.tasks.spawn(async move {
            if let Err(e) = storage
                .put(&config.cache_names.content, &url, &response)
                .await
            {
                log::debug!("Failed to cache {url}: {e}");
            }
        });
    }

    // ------------------------------------------------------------------
    // message
    // ------------------------------------------------------------------

    /// Handles a control message. Work is started in the background; use
    /// [`wait_idle`](Self::wait_idle) to wait for it.
    pub fn message(&self, message: ControlMessage) {
        match message {
            ControlMessage::SkipWaiting => {
                self.lifecycle.skip_waiting();
                // The flag is set, so a controlling predecessor no longer blocks.
                if self.lifecycle.ready_to_activate(true) {
                    let this = self.clone();
                    self.tasks.spawn(async move {
                        this.activate().await;
                    });
                }
            }
            ControlMessage::PrefetchAll => {
                let this = self.clone();
                self.tasks.spawn(async move {
                    match this.prefetch_all().await {
                        Ok(stats) if stats.is_complete() => log::debug!(
                            "Prefetch finished: {} fetched, {} already cached",
                            stats.fetched,
                            stats.already_cached
                        ),
                        Ok(stats) => log::warn!(
                            "Prefetch incomplete: {} fetched, {} failed",
                            stats.fetched,
                            stats.failed
                        ),
                        Err(e) => log::debug!("Prefetch aborted: {e}"),
                    }
                });
            }
        }
    }

    /// Parses a wire tag and handles it. Unrecognised tags are ignored.
    pub fn message_tag(&self, tag: &str) -> Option<ControlMessage> {
        let Some(message) = ControlMessage::from_tag(tag) else {
            log::debug!("Ignoring unrecognised message {tag:?}");
            return None;
        };
        self.message(message);
        Some(message)
    }

    /// Downloads every resource not yet in the content cache.
    ///
    /// Best-effort: individual failures are counted, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error only if the content cache cannot be listed.
    pub async fn prefetch_all(&self) -> Result<PrefetchStats> {
        let content = self.content().await?;
        let present: HashSet<String> = content
            .keys()
            .await?
            .iter()
            .filter_map(|url| key::stored_key(url, &self.origin))
            .collect();
        let pending: Vec<String> = self
            .table
            .keys()
            .filter(|k| !present.contains(*k))
            .map(str::to_string)
            .collect();

        let mut stats = PrefetchStats::new();
        stats.already_cached = self.table.len() - pending.len();

        let content = &content;
        let results: Vec<Result<u64>> = stream::iter(pending)
            .map(|key: String| async move {
                let url = self.url_for(&key);
                let response = self.network.fetch(&Request::get(url.as_str())).await?;
                if !response.is_success() {
                    return Err(Error::Status {
                        url,
                        status: response.status,
                    });
                }
                content.put(&url, &response).await?;
                Ok(response.body.len() as u64)
            })
            .buffer_unordered(self.config.prefetch_concurrency.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                Ok(size) => stats.add_fetched(size),
                Err(e) => {
                    log::warn!("Prefetch failed: {e}");
                    stats.add_failed();
                }
            }
        }
        Ok(stats)
    }

    /// Waits until background cache writes, prefetches and message-triggered
    /// activations have finished.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    // ------------------------------------------------------------------
    // inspection
    // ------------------------------------------------------------------

    /// Reports which resources are cached, missing or stale.
    ///
    /// Does not create any cache.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn status(&self) -> Result<CacheReport> {
        let storage = &*self.storage;
        let names = &self.config.cache_names;

        let mut cached = Vec::new();
        let mut stale = Vec::new();
        let mut cached_bytes = 0u64;
        for url in storage.keys(&names.content).await? {
            match key::stored_key(&url, &self.origin).filter(|k| self.table.contains(k)) {
                Some(k) => {
                    if let Some(response) = storage.get(&names.content, &url).await? {
                        cached_bytes += response.body.len() as u64;
                    }
                    cached.push(k);
                }
                None => stale.push(url),
            }
        }

        let cached_set: HashSet<&str> = cached.iter().map(String::as_str).collect();
        let missing = self
            .table
            .keys()
            .filter(|k| !cached_set.contains(k))
            .map(str::to_string)
            .collect();

        let manifest = match storage.get(&names.manifest, MANIFEST_KEY).await? {
            None => ManifestState::Absent,
            Some(record) => match parse_manifest(&record.body) {
                Ok(previous) if self.table.matches(&previous) => ManifestState::Current,
                _ => ManifestState::Outdated,
            },
        };

        Ok(CacheReport {
            cached,
            missing,
            stale,
            cached_bytes,
            staged: storage.keys(&names.staging).await?.len(),
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use crate::store::MemoryStorage;

    const ORIGIN: &str = "https://app.example.com";

    /// A scripted network: fixed routes, a kill switch, and a request log.
    #[derive(Default)]
    struct MockNetwork {
        routes: Mutex<HashMap<String, Response>>,
        offline: AtomicBool,
        requests: Mutex<Vec<Request>>,
    }

    impl MockNetwork {
        fn serve(&self, path: &str, status: u16, body: &'static str) {
            let url = key::canonical_url(ORIGIN, path);
            self.routes
                .lock()
                .unwrap()
                .insert(url.clone(), Response::new(url, status, body));
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.requests.lock().unwrap().push(request.clone());
            if self.offline.load(Ordering::SeqCst) {
                return Err(Error::Network("offline".into()));
            }
            let url = request.url.split_once("?v=").map_or(request.url.as_str(), |(u, _)| u);
            Ok(self
                .routes
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Response::new(url, 404, "not found")))
        }
    }

    type TestSync = Synchronizer<MemoryStorage, MockNetwork>;

    fn setup(resources: &[(&str, &str)], core: &[&str]) -> (TestSync, Arc<MockNetwork>) {
        let table = ResourceTable::new(
            resources
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            core.iter().map(|k| (*k).to_string()).collect(),
        )
        .unwrap();
        let network = Arc::new(MockNetwork::default());
        for (k, _) in resources {
            network.serve(k, 200, "body");
        }
        let sync = Synchronizer::new(
            SyncConfig::new(ORIGIN),
            table,
            Arc::new(MemoryStorage::new()),
            Arc::clone(&network),
        )
        .unwrap();
        (sync, network)
    }

    fn get(path: &str) -> Request {
        Request::get(format!("{ORIGIN}/{path}"))
    }

    async fn content_keys(sync: &TestSync) -> Vec<String> {
        sync.storage().keys("app-cache").await.unwrap()
    }

    #[test]
    fn default_config_has_no_origin() {
        let result = Synchronizer::new(
            SyncConfig::default(),
            ResourceTable::new(Default::default(), vec![]).unwrap(),
            Arc::new(MemoryStorage::new()),
            Arc::new(MockNetwork::default()),
        );
        assert!(matches!(result, Err(Error::InvalidOrigin(_))));
    }

    #[test]
    fn rejects_invalid_origin() {
        let result = Synchronizer::new(
            SyncConfig::new("not-an-origin"),
            ResourceTable::new(Default::default(), vec![]).unwrap(),
            Arc::new(MemoryStorage::new()),
            Arc::new(MockNetwork::default()),
        );
        assert!(matches!(result, Err(Error::InvalidOrigin(_))));
    }

    // =========================================================================
    // install
    // =========================================================================

    #[tokio::test]
    async fn install_stages_core_with_reload() {
        let (sync, network) = setup(&[("main.js", "h1"), ("extra.js", "h2")], &["main.js"]);

        sync.install().await.unwrap();

        assert_eq!(sync.lifecycle().state(), WorkerState::Installed);
        assert!(sync.lifecycle().skip_waiting_requested());
        assert_eq!(
            sync.storage().keys("app-temp-cache").await.unwrap(),
            [format!("{ORIGIN}/main.js")]
        );
        let requests = network.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].reload);
    }

    #[tokio::test]
    async fn install_failure_stages_nothing() {
        let (sync, network) = setup(&[("a.js", "h1"), ("b.js", "h2")], &["a.js", "b.js"]);
        network.serve("b.js", 500, "boom");

        let err = sync.install().await.unwrap_err();

        assert!(matches!(err, Error::Status { status: 500, .. }));
        assert_eq!(sync.lifecycle().state(), WorkerState::Redundant);
        assert!(sync.storage().keys("app-temp-cache").await.unwrap().is_empty());
    }

    // =========================================================================
    // activate
    // =========================================================================

    #[tokio::test]
    async fn first_activation_discards_leftover_content() {
        let (sync, _network) = setup(&[("a.js", "h1")], &["a.js"]);
        sync.storage()
            .put("app-cache", &format!("{ORIGIN}/leftover.js"), &Response::new("x", 200, "old"))
            .await
            .unwrap();

        sync.install().await.unwrap();
        let report = sync.activate().await;

        assert_eq!(report.state, ActivationState::Activated);
        assert_eq!(report.path, ActivationState::NoPriorManifest);
        assert_eq!(report.promoted, 1);
        assert_eq!(content_keys(&sync).await, [format!("{ORIGIN}/a.js")]);
        assert!(!sync.storage().has("app-temp-cache").await.unwrap());
        assert!(sync.lifecycle().clients_claimed());
        assert_eq!(sync.lifecycle().state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn activation_promotes_only_current_resources() {
        let (sync, _network) = setup(&[("a.js", "1")], &["a.js"]);
        sync.storage()
            .put("app-temp-cache", &sync.url_for("gone.js"), &Response::new("g", 200, "x"))
            .await
            .unwrap();
        sync.storage()
            .put("app-temp-cache", &sync.url_for("a.js"), &Response::new("a", 200, "x"))
            .await
            .unwrap();

        let report = sync.activate().await;

        assert_eq!(report.state, ActivationState::Activated);
        assert_eq!(report.promoted, 1);
        assert_eq!(content_keys(&sync).await, [sync.url_for("a.js")]);
    }

    #[tokio::test]
    async fn install_replaces_previously_staged_shell() {
        let (sync, _network) = setup(&[("a.js", "1")], &["a.js"]);
        sync.storage()
            .put("app-temp-cache", &sync.url_for("x.js"), &Response::new("x", 200, "x"))
            .await
            .unwrap();

        sync.install().await.unwrap();

        assert_eq!(
            sync.storage().keys("app-temp-cache").await.unwrap(),
            [sync.url_for("a.js")]
        );
    }

    #[tokio::test]
    async fn corrupted_manifest_tears_down_everything() {
        let (sync, _network) = setup(&[("a.js", "h1")], &["a.js"]);
        sync.install().await.unwrap();
        sync.storage()
            .put("app-manifest", MANIFEST_KEY, &Response::new(MANIFEST_KEY, 200, "{oops"))
            .await
            .unwrap();

        let report = sync.activate().await;

        assert_eq!(report.state, ActivationState::Corrupted);
        for cache in ["app-cache", "app-temp-cache", "app-manifest"] {
            assert!(!sync.storage().has(cache).await.unwrap(), "{cache} survived");
        }

        // The next cycle starts over as a first install.
        sync.install().await.unwrap();
        let report = sync.activate().await;
        assert_eq!(report.path, ActivationState::NoPriorManifest);
        assert_eq!(report.state, ActivationState::Activated);
    }

    // =========================================================================
    // fetch
    // =========================================================================

    #[tokio::test]
    async fn non_get_requests_pass_through() {
        let (sync, network) = setup(&[("a.js", "h1")], &[]);
        let request = Request::new(Method::POST, format!("{ORIGIN}/a.js"));
        assert_eq!(sync.fetch(&request).await.unwrap(), FetchOutcome::Passthrough);
        assert_eq!(network.request_count(), 0);
    }

    #[tokio::test]
    async fn unknown_and_foreign_urls_pass_through() {
        let (sync, network) = setup(&[("a.js", "h1")], &[]);
        for request in [
            get("api/users"),
            Request::get("https://cdn.example.com/a.js"),
        ] {
            assert_eq!(sync.fetch(&request).await.unwrap(), FetchOutcome::Passthrough);
        }
        assert_eq!(network.request_count(), 0);
    }

    #[tokio::test]
    async fn cache_hit_skips_network() {
        let (sync, network) = setup(&[("a.js", "h1")], &[]);
        sync.storage()
            .put("app-cache", &sync.url_for("a.js"), &Response::new("a", 200, "cached"))
            .await
            .unwrap();

        let outcome = sync.fetch(&get("a.js")).await.unwrap();

        assert!(matches!(outcome, FetchOutcome::Cached(ref r) if r.body == "cached"));
        assert_eq!(network.request_count(), 0);
    }

    #[tokio::test]
    async fn cache_miss_populates_cache() {
        let (sync, network) = setup(&[("a.js", "h1")], &[]);

        let outcome = sync.fetch(&get("a.js")).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Network(_)));
        sync.wait_idle().await;

        assert_eq!(content_keys(&sync).await, [sync.url_for("a.js")]);
        assert!(matches!(
            sync.fetch(&get("a.js")).await.unwrap(),
            FetchOutcome::Cached(_)
        ));
        assert_eq!(network.request_count(), 1);
    }

    #[tokio::test]
    async fn error_status_is_returned_but_not_cached() {
        let (sync, network) = setup(&[("a.js", "h1")], &[]);
        network.serve("a.js", 503, "unavailable");

        let outcome = sync.fetch(&get("a.js")).await.unwrap();
        sync.wait_idle().await;

        assert_eq!(outcome.response().map(|r| r.status), Some(503));
        assert!(content_keys(&sync).await.is_empty());
    }

    #[tokio::test]
    async fn miss_while_offline_propagates_error() {
        let (sync, network) = setup(&[("a.js", "h1")], &[]);
        network.set_offline(true);
        assert!(matches!(
            sync.fetch(&get("a.js")).await,
            Err(Error::Network(_))
        ));
    }

    #[tokio::test]
    async fn version_query_shares_cache_entry() {
        let (sync, network) = setup(&[("app.js", "h1")], &[]);
        sync.fetch(&get("app.js")).await.unwrap();
        sync.wait_idle().await;
        network.set_offline(true);

        let outcome = sync.fetch(&get("app.js?v=123")).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Cached(_)));
    }

    #[tokio::test]
    async fn root_is_online_first() {
        let (sync, network) = setup(&[("/", "r1")], &[]);
        sync.storage()
            .put("app-cache", &sync.url_for("/"), &Response::new("/", 200, "stale"))
            .await
            .unwrap();
        network.serve("/", 200, "fresh");

        let outcome = sync.fetch(&get("")).await.unwrap();
        sync.wait_idle().await;

        assert!(matches!(outcome, FetchOutcome::Network(ref r) if r.body == "fresh"));
        let stored = sync.storage().get("app-cache", &sync.url_for("/")).await.unwrap();
        assert_eq!(stored.unwrap().body, "fresh");
    }

    #[tokio::test]
    async fn root_error_status_is_returned_but_not_cached() {
        let (sync, network) = setup(&[("/", "r1")], &[]);
        sync.storage()
            .put("app-cache", &sync.url_for("/"), &Response::new("/", 200, "shell"))
            .await
            .unwrap();
        network.serve("/", 503, "maintenance");

        let outcome = sync.fetch(&get("")).await.unwrap();
        sync.wait_idle().await;

        assert!(matches!(outcome, FetchOutcome::Network(ref r) if r.status == 503));
        let stored = sync.storage().get("app-cache", &sync.url_for("/")).await.unwrap();
        assert_eq!(stored.unwrap().body, "shell");
    }

    #[tokio::test]
    async fn root_falls_back_to_cache_offline() {
        let (sync, network) = setup(&[("/", "r1")], &[]);
        sync.storage()
            .put("app-cache", &sync.url_for("/"), &Response::new("/", 200, "shell"))
            .await
            .unwrap();
        network.set_offline(true);

        let outcome = sync.fetch(&get("#/settings")).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Cached(ref r) if r.body == "shell"));
    }

    #[tokio::test]
    async fn root_offline_without_cache_errors() {
        let (sync, network) = setup(&[("/", "r1")], &[]);
        network.set_offline(true);
        assert!(sync.fetch(&get("")).await.is_err());
    }

    // =========================================================================
    // message
    // =========================================================================

    #[tokio::test]
    async fn prefetch_message_fills_missing_resources() {
        let (sync, network) = setup(&[("/", "r"), ("a.js", "1"), ("b.js", "2"), ("c.js", "3")], &[]);
        sync.fetch(&get("a.js")).await.unwrap();
        sync.wait_idle().await;

        assert_eq!(sync.message_tag("downloadOffline"), Some(ControlMessage::PrefetchAll));
        sync.wait_idle().await;

        let report = sync.status().await.unwrap();
        assert!(report.missing.is_empty());
        assert_eq!(report.cached.len(), 4);
        // a.js was not downloaded a second time.
        let a_fetches = network
            .requests()
            .iter()
            .filter(|r| r.url.ends_with("/a.js"))
            .count();
        assert_eq!(a_fetches, 1);
    }

    #[tokio::test]
    async fn prefetch_message_races_concurrent_fetches() {
        let (sync, network) = setup(&[("/", "r"), ("a.js", "1"), ("b.js", "2")], &[]);

        sync.message(ControlMessage::PrefetchAll);
        let sync_ref = &sync;
        let fetches = (0..8).map(|i| {
            let path = if i % 2 == 0 { "a.js" } else { "" };
            async move { sync_ref.fetch(&get(path)).await }
        });
        let outcomes = futures::future::join_all(fetches).await;
        sync.wait_idle().await;

        assert!(outcomes.iter().all(Result::is_ok));
        assert_eq!(
            content_keys(&sync).await,
            [sync.url_for("/"), sync.url_for("a.js"), sync.url_for("b.js")]
        );
        assert!(sync.status().await.unwrap().missing.is_empty());
        assert!(network.request_count() >= 3);
    }

    #[tokio::test]
    async fn prefetch_counts_failures() {
        let (sync, network) = setup(&[("a.js", "1"), ("b.js", "2")], &[]);
        network.serve("b.js", 404, "gone");

        let stats = sync.prefetch_all().await.unwrap();

        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.already_cached, 0);
        assert_eq!(content_keys(&sync).await, [sync.url_for("a.js")]);
    }

    #[tokio::test]
    async fn skip_waiting_message_activates_installed_instance() {
        let (sync, _network) = setup(&[("a.js", "1")], &["a.js"]);
        sync.install().await.unwrap();

        sync.message(ControlMessage::SkipWaiting);
        sync.wait_idle().await;

        assert_eq!(sync.lifecycle().state(), WorkerState::Activated);
        assert_eq!(content_keys(&sync).await, [sync.url_for("a.js")]);
    }

    #[tokio::test]
    async fn unknown_message_is_ignored() {
        let (sync, network) = setup(&[("a.js", "1")], &[]);
        assert_eq!(sync.message_tag("reload-everything"), None);
        sync.wait_idle().await;
        assert_eq!(network.request_count(), 0);
        assert!(!sync.lifecycle().skip_waiting_requested());
    }

    // =========================================================================
    // status
    // =========================================================================

    #[tokio::test]
    async fn status_reports_manifest_and_stale_entries() {
        let (sync, _network) = setup(&[("a.js", "1"), ("b.js", "2")], &["a.js"]);
        assert_eq!(sync.status().await.unwrap().manifest, ManifestState::Absent);

        sync.install().await.unwrap();
        assert_eq!(sync.status().await.unwrap().staged, 1);
        sync.activate().await;
        sync.storage()
            .put("app-cache", &sync.url_for("old.js"), &Response::new("o", 200, "x"))
            .await
            .unwrap();

        let report = sync.status().await.unwrap();
        assert_eq!(report.manifest, ManifestState::Current);
        assert_eq!(report.cached, ["a.js"]);
        assert_eq!(report.missing, ["b.js"]);
        assert_eq!(report.stale, [sync.url_for("old.js")]);
        assert_eq!(report.cached_bytes, 4);
        assert_eq!(report.staged, 0);
        assert!(!report.offline_ready());
    }
}
