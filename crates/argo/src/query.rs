//! Search request inputs for Argo applications on managed clusters.

use fleetview_core::{APPLICATION_KIND, ARGO_API_GROUP};
use fleetview_store::PageChunk;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub property: String,
    pub values: Vec<String>,
}

impl SearchFilter {
    pub fn new(property: &str, values: impl IntoIterator<Item = String>) -> Self {
        Self { property: property.to_string(), values: values.into_iter().collect() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchInput {
    pub filters: Vec<SearchFilter>,
    pub limit: usize,
}

impl SearchInput {
    pub fn filter(&self, property: &str) -> Option<&SearchFilter> {
        self.filters.iter().find(|f| f.property == property)
    }
}

/// One search round trip; every aggregator adds its own input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub input: Vec<SearchInput>,
}

impl SearchQuery {
    pub fn variables(&self) -> serde_json::Value {
        serde_json::json!({ "input": self.input })
    }
}

/// Argo Applications on every cluster except the hub, optionally narrowed to a name chunk.
pub fn argo_search_input(hub_cluster_name: &str, chunk: Option<&PageChunk>, limit: usize) -> SearchInput {
    let mut filters = vec![
        SearchFilter::new("kind", [APPLICATION_KIND.to_string()]),
        SearchFilter::new("apigroup", [ARGO_API_GROUP.to_string()]),
        SearchFilter::new("cluster", [format!("!{}", hub_cluster_name)]),
    ];
    if let Some(chunk) = chunk.filter(|c| !c.keys.is_empty()) {
        filters.push(SearchFilter::new("name", chunk.keys.iter().cloned()));
    }
    SearchInput { filters, limit }
}
