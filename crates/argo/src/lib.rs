//! Fleetview Argo aggregation: hub and managed-cluster Argo CD applications
//! grouped by owning ApplicationSet, with an incrementally swept cache.

#![forbid(unsafe_code)]

pub mod aggregator;
pub mod cluster;
pub mod driver;
pub mod query;
pub mod reconcile;
pub mod related;
pub mod transform;

pub use aggregator::{AppSetReaders, ArgoAggregator, CachedResource, PageOutcome, PulledAppSetMap, PushedAppSetMap};
pub use cluster::destination_cluster;
pub use driver::{spawn_aggregation, AggEvent, AggregationHandle, CacheStats};
pub use query::{argo_search_input, SearchFilter, SearchInput, SearchQuery};
pub use reconcile::{app_signature, filter_argo_apps, remote_argo_apps, synthesize_application, AppSetMap, OcpAppFilter};
pub use related::{appset_related_resources, RelatedAppSets};
pub use transform::ArgoTransformer;
