//! Typed views over the Argo and OCM resources the aggregator reads.
//!
//! Only the fields the aggregator consults are modelled; everything else in a
//! watched object is dropped on deserialization.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::{Deserialize, Serialize};

use crate::{APPLICATION_SET_KIND, PLACEMENT_LABEL};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "repoURL", default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgoApplicationSpec {
    #[serde(default)]
    pub destination: Destination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ApplicationSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgoApplicationStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceStatus>,
    /// Only set on applications synthesized from search records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<StatusValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<StatusValue>,
}

/// `argoproj.io/v1alpha1` Application.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArgoApplication {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ArgoApplicationSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ArgoApplicationStatus>,
}

impl ArgoApplication {
    pub fn name(&self) -> &str { self.metadata.name.as_deref().unwrap_or("") }
    pub fn namespace(&self) -> Option<&str> { self.metadata.namespace.as_deref() }
    pub fn uid(&self) -> Option<&str> { self.metadata.uid.as_deref().filter(|u| !u.is_empty()) }

    /// Name of the owning ApplicationSet. Only the first owner reference counts.
    pub fn owning_appset(&self) -> Option<&str> {
        let owner = self.metadata.owner_references.as_ref()?.first()?;
        (owner.kind == APPLICATION_SET_KIND).then_some(owner.name.as_str())
    }

    /// Namespace the app actually deployed into, else the one it targets.
    pub fn defined_namespace(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.resources.first())
            .and_then(|r| r.namespace.as_deref())
            .or(self.spec.destination.namespace.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDecisionResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// One ApplicationSet generator. Only the cluster decision generator is typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Generator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_decision_resource: Option<ClusterDecisionResource>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApplicationSetSpec {
    #[serde(default)]
    pub generators: Vec<Generator>,
}

/// `argoproj.io/v1alpha1` ApplicationSet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSet {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApplicationSetSpec,
}

impl ApplicationSet {
    pub fn name(&self) -> &str { self.metadata.name.as_deref().unwrap_or("") }
    pub fn namespace(&self) -> Option<&str> { self.metadata.namespace.as_deref() }
    pub fn uid(&self) -> Option<&str> { self.metadata.uid.as_deref().filter(|u| !u.is_empty()) }

    /// Placement named by the first generator's cluster decision label selector.
    pub fn placement(&self) -> Option<&str> {
        self.spec
            .generators
            .first()?
            .cluster_decision_resource
            .as_ref()?
            .label_selector
            .as_ref()?
            .match_labels
            .as_ref()?
            .get(PLACEMENT_LABEL)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

/// Owning resource encoded by search as `Kind/Namespace/Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingResource<'a> {
    pub kind: &'a str,
    pub namespace: &'a str,
    pub name: &'a str,
}

impl<'a> HostingResource<'a> {
    pub fn parse(s: &'a str) -> Option<Self> {
        let mut parts = s.splitn(3, '/');
        let kind = parts.next().filter(|k| !k.is_empty())?;
        let namespace = parts.next()?;
        let name = parts.next().filter(|n| !n.is_empty())?;
        Some(Self { kind, namespace, name })
    }

    pub fn is_application_set(&self) -> bool { self.kind == APPLICATION_SET_KIND }
}

/// Flat Application record returned by the search index for managed clusters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArgoApp {
    #[serde(rename = "_uid", default)]
    pub uid: String,
    #[serde(rename = "_hostingResource", default, skip_serializing_if = "Option::is_none")]
    pub hosting_resource: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub destination_namespace: String,
    #[serde(default)]
    pub destination_name: String,
    #[serde(default)]
    pub destination_cluster: String,
    #[serde(default)]
    pub destination_server: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "repoURL", default)]
    pub repo_url: String,
    #[serde(default)]
    pub target_revision: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub health_status: String,
    #[serde(default)]
    pub sync_status: String,
}

impl RemoteArgoApp {
    pub fn hosting_resource(&self) -> Option<HostingResource<'_>> {
        self.hosting_resource.as_deref().and_then(HostingResource::parse)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDecision {
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacementDecisionStatus {
    #[serde(default)]
    pub decisions: Vec<ClusterDecision>,
}

/// `cluster.open-cluster-management.io/v1beta1` PlacementDecision.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlacementDecision {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PlacementDecisionStatus>,
}

impl PlacementDecision {
    pub fn placement_name(&self) -> Option<&str> {
        self.metadata.labels.as_ref()?.get(PLACEMENT_LABEL).map(String::as_str)
    }

    pub fn cluster_names(&self) -> impl Iterator<Item = &str> {
        self.status.iter().flat_map(|s| s.decisions.iter().map(|d| d.cluster_name.as_str()))
    }
}
