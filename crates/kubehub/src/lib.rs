//! Fleetview kubehub: resource listing, paginated polling and cluster inventory.

#![forbid(unsafe_code)]

use std::sync::RwLock;

use anyhow::{anyhow, Context, Result};
use fleetview_core::{Cluster, ClusterInventory};
use kube::{
    api::{Api, ListParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client,
};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub const MANAGED_CLUSTER_GVK: &str = "cluster.open-cluster-management.io/v1/ManagedCluster";
pub const DEFAULT_HUB_NAME: &str = "local-cluster";
const LOCAL_CLUSTER_LABEL: &str = "local-cluster";

/// Access to resources already observed by some watch, by kind and apiVersion.
pub trait ResourceLister: Send + Sync {
    fn list(&self, kind: &str, api_version: &str) -> Vec<DynamicObject>;
}

/// In-memory lister. Whole kinds are replaced at once.
#[derive(Default)]
pub struct StaticResources {
    inner: RwLock<FxHashMap<(String, String), Vec<DynamicObject>>>,
}

impl StaticResources {
    pub fn new() -> Self { Self::default() }

    pub fn replace(&self, kind: &str, api_version: &str, objs: Vec<DynamicObject>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.insert((kind.to_string(), api_version.to_string()), objs);
    }

    /// Replace a kind from raw JSON objects (fixtures, search payloads).
    pub fn replace_values(&self, kind: &str, api_version: &str, values: Vec<serde_json::Value>) -> Result<usize> {
        let objs = values
            .into_iter()
            .map(serde_json::from_value::<DynamicObject>)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("decoding {} objects", kind))?;
        let n = objs.len();
        self.replace(kind, api_version, objs);
        Ok(n)
    }
}

impl ResourceLister for StaticResources {
    fn list(&self, kind: &str, api_version: &str) -> Vec<DynamicObject> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.get(&(kind.to_string(), api_version.to_string())).cloned().unwrap_or_default()
    }
}

pub fn parse_gvk_key(key: &str) -> Result<GroupVersionKind> {
    let parts: Vec<_> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] => Ok(GroupVersionKind::gvk("", version, kind)),
        [group, version, kind] => Ok(GroupVersionKind::gvk(group, version, kind)),
        _ => Err(anyhow!("invalid gvk key: {} (expect v1/Kind or group/v1/Kind)", key)),
    }
}

/// GVK key for an `apiVersion` + `kind` pair, e.g. `argoproj.io/v1alpha1/Application`.
pub fn gvk_key(api_version: &str, kind: &str) -> String { format!("{}/{}", api_version, kind) }

async fn find_api_resource(client: Client, gvk: &GroupVersionKind) -> Result<(ApiResource, bool)> {
    let discovery = Discovery::new(client).run().await?;
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind {
                let namespaced = matches!(caps.scope, Scope::Namespaced);
                return Ok((ar.clone(), namespaced));
            }
        }
    }
    Err(anyhow!("GVK not found: {}/{}/{}", gvk.group, gvk.version, gvk.kind))
}

/// Cluster-wide API handle for a GVK key, resolved through discovery.
pub async fn api_for(client: Client, key: &str) -> Result<Api<DynamicObject>> {
    let gvk = parse_gvk_key(key)?;
    let (ar, namespaced) = find_api_resource(client.clone(), &gvk).await?;
    debug!(gvk = %key, namespaced, plural = %ar.plural, "resolved api resource");
    Ok(Api::all_with(client, &ar))
}

fn strip_managed_fields(v: &mut serde_json::Value) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

/// One page of a list pass. `last` marks the end of the pass.
#[derive(Debug, Clone)]
pub struct PolledPage {
    pub gvk_key: String,
    pub items: Vec<serde_json::Value>,
    pub last: bool,
}

/// Run one full paginated list of `api`, sending each page to `tx`. Returns the item count.
pub async fn poll_pages(api: &Api<DynamicObject>, key: &str, page_size: u32, tx: &mpsc::Sender<PolledPage>) -> Result<usize> {
    let started = std::time::Instant::now();
    let mut continue_token: Option<String> = None;
    let mut total = 0usize;
    loop {
        let mut lp = ListParams::default().limit(page_size.max(1));
        if let Some(token) = continue_token.as_deref() {
            lp = lp.continue_token(token);
        }
        let list = api.list(&lp).await.with_context(|| format!("listing {}", key))?;
        continue_token = list.metadata.continue_.filter(|c| !c.is_empty());
        let mut items = Vec::with_capacity(list.items.len());
        for obj in list.items {
            let mut raw = serde_json::to_value(&obj).context("serializing DynamicObject")?;
            strip_managed_fields(&mut raw);
            items.push(raw);
        }
        total += items.len();
        let last = continue_token.is_none();
        debug!(gvk = %key, count = items.len(), last, "page polled");
        tx.send(PolledPage { gvk_key: key.to_string(), items, last })
            .await
            .map_err(|_| anyhow!("page receiver closed while polling {}", key))?;
        if last {
            break;
        }
    }
    metrics::histogram!("kubehub_poll_ms", started.elapsed().as_secs_f64() * 1000.0, "gvk" => key.to_string());
    Ok(total)
}

pub async fn list_all(api: &Api<DynamicObject>) -> Result<Vec<DynamicObject>> {
    Ok(api.list(&ListParams::default()).await?.items)
}

/// Build the fleet view from ManagedCluster objects.
pub fn inventory_from(managed: &[DynamicObject]) -> ClusterInventory {
    let mut hub: Option<String> = None;
    let mut clusters = Vec::with_capacity(managed.len());
    for mc in managed {
        let Some(name) = mc.metadata.name.clone() else { continue };
        let is_local = mc
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(LOCAL_CLUSTER_LABEL))
            .is_some_and(|v| v == "true");
        if is_local && hub.is_none() {
            hub = Some(name.clone());
        }
        let kube_api_server = mc
            .data
            .pointer("/spec/managedClusterClientConfigs/0/url")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        clusters.push(Cluster { name, kube_api_server });
    }
    clusters.sort_by(|a, b| a.name.cmp(&b.name));
    ClusterInventory::new(hub.unwrap_or_else(|| DEFAULT_HUB_NAME.to_string()), clusters)
}

pub async fn cluster_inventory(client: Client) -> Result<ClusterInventory> {
    let gvk = parse_gvk_key(MANAGED_CLUSTER_GVK)?;
    let api: Api<DynamicObject> = Api::all_with(client, &ApiResource::from_gvk(&gvk));
    let managed = list_all(&api).await.context("listing managed clusters")?;
    let inv = inventory_from(&managed);
    info!(hub = %inv.hub_cluster_name, clusters = inv.clusters.len(), "cluster inventory loaded");
    Ok(inv)
}
