//! Single-task event loop around an [`ArgoAggregator`].
//!
//! Every event is handled to completion before the next is received, so the
//! aggregator and its cache need no locking. Readers get published snapshots
//! through [`AggregationHandle`].

use std::sync::Arc;

use fleetview_core::{ApplicationSet, ArgoApplication, RemoteArgoApp};
use fleetview_store::{ApplicationCache, CacheKey, Published};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::aggregator::{AppSetReaders, ArgoAggregator, PulledAppSetMap, PushedAppSetMap};
use crate::query::SearchQuery;

#[derive(Debug)]
pub enum AggEvent {
    /// A page of hub Applications; `should_post_process` ends the pass.
    Applications { items: Vec<ArgoApplication>, should_post_process: bool },
    ApplicationSets { items: Vec<ApplicationSet>, should_post_process: bool },
    /// Results for the search input most recently handed out.
    RemoteSearch { results: Vec<RemoteArgoApp> },
    /// Ask for the next search query.
    NextQuery { reply: oneshot::Sender<SearchQuery> },
}

/// Counts exposed alongside each epoch bump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub local_apps: usize,
    pub appsets: usize,
    pub remote_apps: usize,
    pub ocp_signatures: usize,
}

fn stats(cache: &ApplicationCache, aggregator: &ArgoAggregator) -> CacheStats {
    CacheStats {
        local_apps: cache.resource_count(CacheKey::LocalArgoApps),
        appsets: cache.resource_count(CacheKey::AppSets),
        remote_apps: cache.resource_count(CacheKey::RemoteArgoApps),
        ocp_signatures: aggregator.ocp_filter().len(),
    }
}

pub struct AggregationHandle {
    readers: AppSetReaders,
    pulled_rx: watch::Receiver<Arc<Published<PulledAppSetMap>>>,
    epoch_rx: watch::Receiver<u64>,
    stats_rx: watch::Receiver<CacheStats>,
}

impl AggregationHandle {
    /// Published only; empty until a hub Application pass completes.
    pub fn pushed_appset_map(&self) -> Arc<Published<PushedAppSetMap>> { self.readers.pushed.load() }
    /// Same view as [`ArgoAggregator::pulled_appset_map`]: the map being built
    /// stands in while nothing is published.
    pub fn pulled_appset_map(&self) -> Arc<Published<PulledAppSetMap>> { self.pulled_rx.borrow().clone() }
    pub fn stats(&self) -> CacheStats { *self.stats_rx.borrow() }
    /// Bumped whenever either appset map is published.
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
}

/// Spawn the aggregation loop. Returns a sender for events and a handle for reads.
pub fn spawn_aggregation(mut aggregator: ArgoAggregator, cap: usize) -> (mpsc::Sender<AggEvent>, AggregationHandle) {
    let (tx, mut rx) = mpsc::channel::<AggEvent>(cap.max(1));
    let (epoch_tx, epoch_rx) = watch::channel(0u64);
    let (stats_tx, stats_rx) = watch::channel(CacheStats::default());
    let (pulled_tx, pulled_rx) = watch::channel(aggregator.pulled_appset_map());
    let readers = aggregator.readers();
    let publish_readers = readers.clone();

    tokio::spawn(async move {
        let mut cache = ApplicationCache::new();
        let published_epoch = |r: &AppSetReaders| r.pushed.epoch() + r.pulled.epoch();
        while let Some(ev) = rx.recv().await {
            match ev {
                AggEvent::Applications { items, should_post_process } => {
                    let out = aggregator.poll_applications(&mut cache, items, should_post_process);
                    debug!(?out, "application page handled");
                }
                AggEvent::ApplicationSets { items, should_post_process } => {
                    let out = aggregator.poll_application_sets(&mut cache, items, should_post_process);
                    debug!(?out, "appset page handled");
                }
                AggEvent::RemoteSearch { results } => {
                    aggregator.cache_argo_applications(&mut cache, &results);
                }
                AggEvent::NextQuery { reply } => {
                    let mut query = SearchQuery::default();
                    aggregator.add_argo_query_inputs(&cache, &mut query);
                    let _ = reply.send(query);
                    continue;
                }
            }
            let _ = stats_tx.send(stats(&cache, &aggregator));
            pulled_tx.send_replace(aggregator.pulled_appset_map());
            let epoch = published_epoch(&publish_readers);
            epoch_tx.send_if_modified(|cur| {
                let changed = *cur != epoch;
                *cur = epoch;
                changed
            });
        }
        info!("aggregation loop stopped");
    });

    (tx, AggregationHandle { readers, pulled_rx, epoch_rx, stats_rx })
}
