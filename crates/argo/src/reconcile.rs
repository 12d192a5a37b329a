//! Merging hub (watched) and managed-cluster (searched) Argo applications.
//!
//! Applications generated by an ApplicationSet are grouped under that set's
//! name and kept out of the flat application list. Every application seen,
//! grouped or not, leaves a signature in the OCP filter.

use std::collections::BTreeMap;

use fleetview_core::{
    ApplicationSource, ArgoApplication, ArgoApplicationSpec, ArgoApplicationStatus, ClusterInventory,
    Destination, HostingResource, RemoteArgoApp, StatusValue, ARGO_APPLICATION_API_VERSION, APPLICATION_KIND,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::cluster::destination_cluster;

/// ApplicationSet name -> member applications, each uid at most once.
pub type AppSetMap<A> = BTreeMap<String, Vec<A>>;

pub trait Keyed {
    fn key(&self) -> Option<&str>;
}

impl Keyed for ArgoApplication {
    fn key(&self) -> Option<&str> { self.uid() }
}

impl Keyed for RemoteArgoApp {
    fn key(&self) -> Option<&str> { Some(self.uid.as_str()).filter(|u| !u.is_empty()) }
}

/// Replace the member with the same uid in place, else append.
pub fn upsert_member<A: Keyed>(map: &mut AppSetMap<A>, appset: &str, app: A) {
    let members = map.entry(appset.to_string()).or_default();
    let existing = app.key().and_then(|k| members.iter().position(|m| m.key() == Some(k)));
    match existing {
        Some(i) => members[i] = app,
        None => members.push(app),
    }
}

/// `name-namespace-cluster` signatures of Argo applications, used to keep
/// them out of the generic OCP application view.
///
/// Each source keeps the set from its last completed pass plus the one being
/// built; lookups see both, so a pass in progress never hides an application.
#[derive(Debug, Default, Clone, Serialize)]
pub struct OcpAppFilter {
    local: FxHashSet<String>,
    local_building: FxHashSet<String>,
    remote: FxHashSet<String>,
    remote_building: FxHashSet<String>,
}

pub fn app_signature(name: &str, namespace: &str, cluster: &str) -> String {
    format!("{}-{}-{}", name, namespace, cluster)
}

impl OcpAppFilter {
    pub fn new() -> Self { Self::default() }

    /// End of a hub pass: its signatures replace the previous pass's.
    pub fn publish_local(&mut self) { self.local = std::mem::take(&mut self.local_building); }
    /// End of a search sequence.
    pub fn publish_remote(&mut self) { self.remote = std::mem::take(&mut self.remote_building); }

    pub fn add_local(&mut self, signature: String) { self.local_building.insert(signature); }
    pub fn add_remote(&mut self, signature: String) { self.remote_building.insert(signature); }

    fn sets(&self) -> [&FxHashSet<String>; 4] {
        [&self.local, &self.local_building, &self.remote, &self.remote_building]
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.sets().iter().any(|s| s.contains(signature))
    }

    pub fn is_ocp_app_argo(&self, name: &str, namespace: &str, cluster: &str) -> bool {
        self.contains(&app_signature(name, namespace, cluster))
    }

    pub fn len(&self) -> usize { self.sorted().len() }
    pub fn is_empty(&self) -> bool { self.sets().iter().all(|s| s.is_empty()) }

    pub fn sorted(&self) -> Vec<String> {
        let mut v: Vec<String> = self.sets().into_iter().flatten().cloned().collect();
        v.sort_unstable();
        v.dedup();
        v
    }
}

/// Split hub applications: ApplicationSet children go to `pushed`, the rest are returned.
pub fn filter_argo_apps(
    items: Vec<ArgoApplication>,
    clusters: &ClusterInventory,
    ocp: &mut OcpAppFilter,
    pushed: &mut AppSetMap<ArgoApplication>,
) -> Vec<ArgoApplication> {
    let hub = clusters.hub_cluster_name.as_str();
    let mut flat = Vec::with_capacity(items.len());
    for app in items {
        let cluster = destination_cluster(&app.spec.destination, clusters, Some(hub));
        ocp.add_local(app_signature(app.name(), app.defined_namespace().unwrap_or(""), &cluster));
        match app.owning_appset().map(str::to_string) {
            Some(appset) => upsert_member(pushed, &appset, app),
            None => flat.push(app),
        }
    }
    flat
}

/// Split search results: records hosted by an ApplicationSet go to `pulled`; the
/// rest come back as synthesized Applications.
pub fn remote_argo_apps(
    remote: &[RemoteArgoApp],
    ocp: &mut OcpAppFilter,
    pulled: &mut AppSetMap<RemoteArgoApp>,
) -> Vec<ArgoApplication> {
    let mut flat = Vec::new();
    for rec in remote {
        ocp.add_remote(app_signature(&rec.name, &rec.destination_namespace, &rec.cluster));
        match rec.hosting_resource.as_deref().filter(|h| !h.is_empty()) {
            // pull model or standalone
            None => flat.push(synthesize_application(rec)),
            Some(raw) => {
                if let Some(host) = HostingResource::parse(raw).filter(|h| h.is_application_set()) {
                    upsert_member(pulled, host.name, rec.clone());
                }
            }
        }
    }
    flat
}

fn non_empty(s: &str) -> Option<String> { (!s.is_empty()).then(|| s.to_string()) }

/// Hub-shaped Application for a search record with no owning ApplicationSet.
pub fn synthesize_application(rec: &RemoteArgoApp) -> ArgoApplication {
    let created = chrono::DateTime::parse_from_rfc3339(&rec.created)
        .ok()
        .map(|dt| Time(dt.with_timezone(&chrono::Utc)));
    let server = non_empty(&rec.destination_cluster).or_else(|| non_empty(&rec.destination_server));
    ArgoApplication {
        api_version: ARGO_APPLICATION_API_VERSION.to_string(),
        kind: APPLICATION_KIND.to_string(),
        metadata: ObjectMeta {
            name: non_empty(&rec.name),
            namespace: non_empty(&rec.namespace),
            creation_timestamp: created,
            ..Default::default()
        },
        spec: ArgoApplicationSpec {
            destination: Destination {
                name: non_empty(&rec.destination_name),
                namespace: non_empty(&rec.destination_namespace),
                server,
            },
            source: Some(ApplicationSource {
                path: non_empty(&rec.path),
                repo_url: non_empty(&rec.repo_url),
                target_revision: non_empty(&rec.target_revision),
                chart: non_empty(&rec.chart),
            }),
        },
        status: Some(ArgoApplicationStatus {
            resources: Vec::new(),
            cluster: non_empty(&rec.cluster),
            health: Some(StatusValue { status: non_empty(&rec.health_status) }),
            sync: Some(StatusValue { status: non_empty(&rec.sync_status) }),
        }),
    }
}
