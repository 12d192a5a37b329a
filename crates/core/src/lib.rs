//! Fleetview core types: Argo resources, cluster inventory and the transform contract.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod config;
pub mod resources;

pub use config::AggConfig;
pub use resources::{
    ApplicationSet, ApplicationSource, ArgoApplication, ArgoApplicationSpec, ArgoApplicationStatus,
    ClusterDecision, Destination, HostingResource, PlacementDecision, RemoteArgoApp, ResourceStatus,
    StatusValue,
};

/// Kubernetes `metadata.uid`, or the search index `_uid` for remote records.
pub type Uid = String;

pub const ARGO_API_GROUP: &str = "argoproj.io";
pub const ARGO_APPLICATION_API_VERSION: &str = "argoproj.io/v1alpha1";
pub const APPLICATION_KIND: &str = "Application";
pub const APPLICATION_SET_KIND: &str = "ApplicationSet";
pub const PLACEMENT_DECISION_KIND: &str = "PlacementDecision";
pub const PLACEMENT_DECISION_API_VERSION: &str = "cluster.open-cluster-management.io/v1beta1";
pub const PLACEMENT_LABEL: &str = "cluster.open-cluster-management.io/placement";

/// API server URL Argo uses for the cluster it runs in.
pub const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";
pub const IN_CLUSTER_NAME: &str = "in-cluster";
pub const UNKNOWN_CLUSTER: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("compression: {0}")]
    Compression(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("resource missing metadata.uid: {0}")]
    MissingUid(String),
    #[error("transform: {0}")]
    Transform(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A managed cluster as known to the hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_api_server: Option<String>,
}

/// Point-in-time view of the fleet: every managed cluster plus the hub's name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInventory {
    pub hub_cluster_name: String,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

impl ClusterInventory {
    pub fn new(hub_cluster_name: impl Into<String>, clusters: Vec<Cluster>) -> Self {
        Self { hub_cluster_name: hub_cluster_name.into(), clusters }
    }

    /// The hub's own entry in the cluster list, if it is registered as managed.
    pub fn local_cluster(&self) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.name == self.hub_cluster_name)
    }

    pub fn by_api_server(&self, server: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.kube_api_server.as_deref() == Some(server))
    }
}

/// Source of the cluster list and hub identity.
pub trait ClusterRegistry: Send + Sync {
    fn clusters(&self) -> Vec<Cluster>;
    fn hub_cluster_name(&self) -> String;

    fn snapshot(&self) -> ClusterInventory {
        ClusterInventory::new(self.hub_cluster_name(), self.clusters())
    }
}

impl ClusterRegistry for ClusterInventory {
    fn clusters(&self) -> Vec<Cluster> { self.clusters.clone() }
    fn hub_cluster_name(&self) -> String { self.hub_cluster_name.clone() }
    fn snapshot(&self) -> ClusterInventory { self.clone() }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Argo,
    AppSet,
}

/// Derived UI summary stored next to each cached resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transform {
    #[serde(rename = "type")]
    pub app_type: AppType,
    pub clusters: SmallVec<[String; 4]>,
}

/// Inputs captured once at the start of a pass and reused for every item in it.
#[derive(Debug, Clone, Default)]
pub struct PassContext {
    pub clusters: ClusterInventory,
    pub placement_decisions: Vec<PlacementDecision>,
}

/// Classification and cluster placement for cached resources.
pub trait Transformer: Send + Sync {
    fn transform_application(&self, app: &ArgoApplication, ctx: &PassContext) -> Result<Transform>;
    fn transform_application_set(&self, appset: &ApplicationSet, ctx: &PassContext) -> Result<Transform>;
}
