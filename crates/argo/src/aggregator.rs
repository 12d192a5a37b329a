//! The Argo aggregation context.
//!
//! Hub Applications and ApplicationSets arrive as polled pages; a pass for a
//! kind runs from its first page to the page flagged for post-processing.
//! Managed-cluster Applications arrive as search results, possibly in chunks.
//! Both feed per-ApplicationSet maps that readers only see once a pass is whole.

use std::sync::Arc;

use fleetview_core::{
    AggConfig, ApplicationSet, ArgoApplication, ClusterRegistry, Error, PassContext, PlacementDecision,
    RemoteArgoApp, Result, Transform, Transformer, PLACEMENT_DECISION_API_VERSION, PLACEMENT_DECISION_KIND,
};
use fleetview_kubehub::ResourceLister;
use fleetview_store::{
    cache_remote_apps, deflate_resource, inflate_resource, ApplicationCache, CacheEntry, CacheKey,
    ChunkCursor, Compressor, GenerationReader, Generational, Published, SweepTracker, ZstdCompressor,
};
use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use crate::query::{argo_search_input, SearchQuery};
use crate::reconcile::{filter_argo_apps, remote_argo_apps, AppSetMap, OcpAppFilter};
use crate::transform::ArgoTransformer;

pub type PushedAppSetMap = AppSetMap<ArgoApplication>;
pub type PulledAppSetMap = AppSetMap<RemoteArgoApp>;

/// A polled hub kind kept in a uid-keyed cache slot.
pub trait CachedResource: Serialize + DeserializeOwned + Sized {
    const KEY: CacheKey;
    fn uid(&self) -> Option<&str>;
    fn display_name(&self) -> &str;
    fn transform_with(&self, transformer: &dyn Transformer, ctx: &PassContext) -> Result<Transform>;

    /// Take out the items that are grouped rather than cached; the rest are returned.
    fn split_grouped(items: Vec<Self>, _ctx: &PassContext, _ocp: &mut OcpAppFilter, _pushed: &mut PushedAppSetMap) -> Vec<Self> {
        items
    }
}

impl CachedResource for ArgoApplication {
    const KEY: CacheKey = CacheKey::LocalArgoApps;
    fn uid(&self) -> Option<&str> { ArgoApplication::uid(self) }
    fn display_name(&self) -> &str { self.name() }
    fn transform_with(&self, transformer: &dyn Transformer, ctx: &PassContext) -> Result<Transform> {
        transformer.transform_application(self, ctx)
    }

    fn split_grouped(items: Vec<Self>, ctx: &PassContext, ocp: &mut OcpAppFilter, pushed: &mut PushedAppSetMap) -> Vec<Self> {
        filter_argo_apps(items, &ctx.clusters, ocp, pushed)
    }
}

impl CachedResource for ApplicationSet {
    const KEY: CacheKey = CacheKey::AppSets;
    fn uid(&self) -> Option<&str> { ApplicationSet::uid(self) }
    fn display_name(&self) -> &str { self.name() }
    fn transform_with(&self, transformer: &dyn Transformer, ctx: &PassContext) -> Result<Transform> {
        transformer.transform_application_set(self, ctx)
    }
}

/// Read-only access to the published maps from other tasks.
#[derive(Clone)]
pub struct AppSetReaders {
    pub pushed: GenerationReader<PushedAppSetMap>,
    pub pulled: GenerationReader<PulledAppSetMap>,
}

/// What one page of a polled pass did to the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOutcome {
    pub cached: usize,
    pub grouped: usize,
    pub skipped: usize,
    /// Set when this page ended the pass.
    pub swept: Option<usize>,
}

pub struct ArgoAggregator {
    config: AggConfig,
    registry: Arc<dyn ClusterRegistry>,
    resources: Arc<dyn ResourceLister>,
    transformer: Arc<dyn Transformer>,
    compressor: Arc<dyn Compressor>,
    pushed: Generational<PushedAppSetMap>,
    pulled: Generational<PulledAppSetMap>,
    ocp_filter: OcpAppFilter,
    cursor: ChunkCursor,
    sweep: SweepTracker,
    pass_ctx: FxHashMap<CacheKey, PassContext>,
}

impl ArgoAggregator {
    pub fn new(config: AggConfig, registry: Arc<dyn ClusterRegistry>, resources: Arc<dyn ResourceLister>) -> Self {
        Self {
            config,
            registry,
            resources,
            transformer: Arc::new(ArgoTransformer),
            compressor: Arc::new(ZstdCompressor::new(config.zstd_level)),
            pushed: Generational::new(),
            pulled: Generational::new(),
            ocp_filter: OcpAppFilter::new(),
            cursor: ChunkCursor::new(),
            sweep: SweepTracker::new(),
            pass_ctx: FxHashMap::default(),
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn config(&self) -> &AggConfig { &self.config }

    pub fn compressor(&self) -> &dyn Compressor { self.compressor.as_ref() }

    /// Published hub ApplicationSet -> Applications. Empty until a hub Application pass completes.
    pub fn pushed_appset_map(&self) -> Arc<Published<PushedAppSetMap>> { self.pushed.published() }

    /// Published search ApplicationSet -> Applications. While nothing is
    /// published, the map being built is returned instead.
    pub fn pulled_appset_map(&self) -> Arc<Published<PulledAppSetMap>> {
        let published = self.pulled.published();
        if published.data.is_empty() {
            return Arc::new(self.pulled.building_snapshot());
        }
        published
    }

    pub fn ocp_filter(&self) -> &OcpAppFilter { &self.ocp_filter }

    pub fn readers(&self) -> AppSetReaders {
        AppSetReaders { pushed: self.pushed.reader(), pulled: self.pulled.reader() }
    }

    fn placement_decisions(&self) -> Vec<PlacementDecision> {
        self.resources
            .list(PLACEMENT_DECISION_KIND, PLACEMENT_DECISION_API_VERSION)
            .into_iter()
            .filter_map(|obj| {
                let name = obj.metadata.name.clone().unwrap_or_default();
                match serde_json::to_value(&obj).and_then(serde_json::from_value::<PlacementDecision>) {
                    Ok(pd) => Some(pd),
                    Err(e) => {
                        warn!(name = %name, error = %e, "skipping undecodable PlacementDecision");
                        None
                    }
                }
            })
            .collect()
    }

    fn fresh_context(&self) -> PassContext {
        PassContext { clusters: self.registry.snapshot(), placement_decisions: self.placement_decisions() }
    }

    /// Add the search input for the next remote request, advancing the chunk cursor.
    pub fn add_argo_query_inputs(&mut self, cache: &ApplicationCache, query: &mut SearchQuery) {
        let limit = self.config.search_limit;
        let chunk = self.cursor.advance(cache, CacheKey::RemoteArgoApps, limit).cloned();
        let hub = self.registry.hub_cluster_name();
        query.input.push(argo_search_input(&hub, chunk.as_ref(), limit));
        debug!(chunk = ?chunk.as_ref().map(|c| c.index), remaining = self.cursor.remaining(), "argo search input added");
    }

    /// Absorb results of the last search request and refresh cached transforms.
    /// Each phase fails on its own; the others still run.
    pub fn cache_argo_applications(&mut self, cache: &mut ApplicationCache, remote: &[RemoteArgoApp]) -> &OcpAppFilter {
        let started = std::time::Instant::now();
        let ctx = self.fresh_context();

        if cache.resource_uid_map(CacheKey::LocalArgoApps).is_some() {
            if let Err(e) = self.refresh_transforms::<ArgoApplication>(cache, &ctx) {
                error!(error = %e, "refreshing local argo app transforms failed");
                metrics::counter!("aggregator_phase_errors_total", 1u64, "phase" => "localArgoApps");
            }
        }

        if let Err(e) = self.cache_remote(cache, remote, &ctx) {
            error!(error = %e, "caching remote argo apps failed");
            metrics::counter!("aggregator_phase_errors_total", 1u64, "phase" => "remoteArgoApps");
        }

        if cache.resource_uid_map(CacheKey::AppSets).is_some() {
            if let Err(e) = self.refresh_transforms::<ApplicationSet>(cache, &ctx) {
                error!(error = %e, "refreshing appset transforms failed");
                metrics::counter!("aggregator_phase_errors_total", 1u64, "phase" => "appset");
            }
        }

        metrics::histogram!("aggregator_remote_ms", started.elapsed().as_secs_f64() * 1000.0);
        &self.ocp_filter
    }

    fn cache_remote(&mut self, cache: &mut ApplicationCache, remote: &[RemoteArgoApp], ctx: &PassContext) -> Result<()> {
        if self.cursor.starts_sequence() {
            let epoch = self.pulled.commit();
            self.ocp_filter.publish_remote();
            debug!(epoch, "pulled appset map published");
        }
        let flat = remote_argo_apps(remote, &mut self.ocp_filter, self.pulled.building_mut());
        let mut entries = Vec::with_capacity(flat.len());
        for app in &flat {
            let transform = self.transformer.transform_application(app, ctx)?;
            let compressed = deflate_resource(self.compressor.as_ref(), app)?;
            entries.push(CacheEntry { compressed, transform });
        }
        debug!(records = remote.len(), flat = entries.len(), chunk = ?self.cursor.current().map(|c| c.index), "remote argo apps reconciled");
        cache_remote_apps(cache, entries, self.cursor.current(), CacheKey::RemoteArgoApps);
        Ok(())
    }

    fn refresh_transforms<R: CachedResource>(&self, cache: &mut ApplicationCache, ctx: &PassContext) -> Result<usize> {
        let map = cache.resource_uid_map_mut(R::KEY);
        for entry in map.values_mut() {
            let resource: R = inflate_resource(self.compressor.as_ref(), &entry.compressed)?;
            entry.transform = resource.transform_with(self.transformer.as_ref(), ctx)?;
        }
        Ok(map.len())
    }

    /// One page of hub Applications. ApplicationSet children go to the pushed
    /// map; the rest are cached. `should_post_process` ends the pass.
    pub fn poll_applications(&mut self, cache: &mut ApplicationCache, items: Vec<ArgoApplication>, should_post_process: bool) -> PageOutcome {
        self.absorb(cache, items, should_post_process)
    }

    /// One page of hub ApplicationSets. `should_post_process` ends the pass.
    pub fn poll_application_sets(&mut self, cache: &mut ApplicationCache, items: Vec<ApplicationSet>, should_post_process: bool) -> PageOutcome {
        self.absorb(cache, items, should_post_process)
    }

    fn absorb<R: CachedResource>(&mut self, cache: &mut ApplicationCache, items: Vec<R>, should_post_process: bool) -> PageOutcome {
        let key = R::KEY;
        let mut outcome = PageOutcome::default();

        if self.sweep.begin(key, cache.resource_uid_map_mut(key)) {
            let ctx = self.fresh_context();
            self.pass_ctx.insert(key, ctx);
        }

        let total = items.len();
        let items: Vec<R> = items
            .into_iter()
            .filter(|item| {
                let keep = item.uid().is_some();
                if !keep {
                    let e = Error::MissingUid(item.display_name().to_string());
                    warn!(key = %key, error = %e, "skipping resource");
                }
                keep
            })
            .collect();
        outcome.skipped = total - items.len();

        let ctx = self.pass_ctx.entry(key).or_default();
        let before = items.len();
        let items = R::split_grouped(items, ctx, &mut self.ocp_filter, self.pushed.building_mut());
        outcome.grouped = before - items.len();

        let map = cache.resource_uid_map_mut(key);
        for item in items {
            let Some(uid) = item.uid().map(str::to_string) else { continue };
            let transform = match map.get(&uid) {
                Some(existing) => Ok(existing.transform.clone()),
                None => item.transform_with(self.transformer.as_ref(), ctx),
            };
            let entry = transform.and_then(|transform| {
                Ok(CacheEntry { compressed: deflate_resource(self.compressor.as_ref(), &item)?, transform })
            });
            match entry {
                Ok(entry) => {
                    map.insert(uid.clone(), entry);
                    outcome.cached += 1;
                }
                Err(e) => {
                    warn!(key = %key, uid = %uid, error = %e, "keeping previous cache entry");
                    outcome.skipped += 1;
                }
            }
            self.sweep.touch(key, &uid);
        }

        if should_post_process {
            let removed = self.sweep.sweep(key, map);
            self.pass_ctx.remove(&key);
            outcome.swept = Some(removed);
            metrics::counter!("aggregator_swept_total", removed as u64, "key" => key.as_str());
            metrics::gauge!("aggregator_cached", map.len() as f64, "key" => key.as_str());
            if key == CacheKey::LocalArgoApps {
                self.ocp_filter.publish_local();
                let epoch = self.pushed.commit();
                let appsets = self.pushed.published().data.len();
                info!(epoch, appsets, cached = map.len(), removed, "pushed appset map published");
            } else {
                info!(key = %key, cached = map.len(), removed, "pass complete");
            }
        }
        outcome
    }
}
