//! Resolving an Argo destination to a managed cluster name.

use fleetview_core::{ClusterInventory, Destination, IN_CLUSTER_NAME, IN_CLUSTER_SERVER, UNKNOWN_CLUSTER};

/// Name of the cluster an Argo destination points at.
///
/// `acting` is the cluster the Application itself lives on; the in-cluster
/// server and the `in-cluster` name mean that cluster. Without it they mean the hub.
pub fn destination_cluster(dest: &Destination, clusters: &ClusterInventory, acting: Option<&str>) -> String {
    let hub = clusters.hub_cluster_name.as_str();
    if let Some(server) = dest.server.as_deref().filter(|s| !s.is_empty()) {
        if server == IN_CLUSTER_SERVER {
            return acting.unwrap_or(hub).to_string();
        }
        return clusters
            .by_api_server(server)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| UNKNOWN_CLUSTER.to_string());
    }

    let name = dest.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(UNKNOWN_CLUSTER);
    if let Some(acting) = acting {
        if name == IN_CLUSTER_NAME || name == hub {
            return acting.to_string();
        }
    }
    if name == IN_CLUSTER_NAME {
        return hub.to_string();
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetview_core::Cluster;

    fn inv() -> ClusterInventory {
        ClusterInventory::new(
            "local-cluster",
            vec![
                Cluster { name: "local-cluster".into(), kube_api_server: Some("https://api.hub:6443".into()) },
                Cluster { name: "east".into(), kube_api_server: Some("https://api.east:6443".into()) },
            ],
        )
    }

    fn server(s: &str) -> Destination { Destination { server: Some(s.into()), ..Default::default() } }
    fn named(n: &str) -> Destination { Destination { name: Some(n.into()), ..Default::default() } }

    #[test]
    fn in_cluster_server_resolves_to_acting_then_hub() {
        assert_eq!(destination_cluster(&server(IN_CLUSTER_SERVER), &inv(), Some("east")), "east");
        assert_eq!(destination_cluster(&server(IN_CLUSTER_SERVER), &inv(), None), "local-cluster");
    }

    #[test]
    fn server_matches_registered_api_url() {
        assert_eq!(destination_cluster(&server("https://api.east:6443"), &inv(), None), "east");
        assert_eq!(destination_cluster(&server("https://api.west:6443"), &inv(), None), UNKNOWN_CLUSTER);
    }

    #[test]
    fn names_resolve_in_cluster_and_hub() {
        assert_eq!(destination_cluster(&named("in-cluster"), &inv(), None), "local-cluster");
        assert_eq!(destination_cluster(&named("in-cluster"), &inv(), Some("east")), "east");
        assert_eq!(destination_cluster(&named("local-cluster"), &inv(), Some("east")), "east");
        assert_eq!(destination_cluster(&named("west"), &inv(), Some("east")), "west");
    }

    #[test]
    fn missing_destination_is_unknown() {
        assert_eq!(destination_cluster(&Destination::default(), &inv(), None), UNKNOWN_CLUSTER);
        assert_eq!(destination_cluster(&server(""), &inv(), None), UNKNOWN_CLUSTER);
    }
}
