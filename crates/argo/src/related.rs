//! ApplicationSets that deploy through the same placement.

use fleetview_core::ApplicationSet;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedAppSets {
    pub placement: String,
    /// Names of other ApplicationSets using `placement`.
    pub sharing: Vec<String>,
}

/// Other ApplicationSets sharing `appset`'s placement. `None` when it has no placement.
pub fn appset_related_resources(appset: &ApplicationSet, all: &[ApplicationSet]) -> Option<RelatedAppSets> {
    let placement = appset.placement()?;
    let sharing = all
        .iter()
        .filter(|other| other.name() != appset.name() || other.namespace() != appset.namespace())
        .filter(|other| !other.name().is_empty() && other.placement() == Some(placement))
        .map(|other| other.name().to_string())
        .collect();
    Some(RelatedAppSets { placement: placement.to_string(), sharing })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn appset(name: &str, ns: &str, placement: Option<&str>) -> ApplicationSet {
        let generators = match placement {
            Some(p) => json!([{ "clusterDecisionResource": { "labelSelector": { "matchLabels": {
                "cluster.open-cluster-management.io/placement": p
            } } } }]),
            None => json!([{ "list": { "elements": [] } }]),
        };
        serde_json::from_value(json!({
            "metadata": { "name": name, "namespace": ns },
            "spec": { "generators": generators }
        }))
        .unwrap()
    }

    #[test]
    fn shared_placement_is_reported_both_ways() {
        let a = appset("alpha", "openshift-gitops", Some("shared"));
        let b = appset("beta", "openshift-gitops", Some("shared"));
        let c = appset("gamma", "openshift-gitops", Some("other"));
        let all = vec![a.clone(), b.clone(), c];

        let ra = appset_related_resources(&a, &all).unwrap();
        assert_eq!(ra, RelatedAppSets { placement: "shared".into(), sharing: vec!["beta".into()] });
        let rb = appset_related_resources(&b, &all).unwrap();
        assert_eq!(rb.sharing, vec!["alpha".to_string()]);
    }

    #[test]
    fn same_name_other_namespace_counts() {
        let a = appset("alpha", "ns-1", Some("shared"));
        let twin = appset("alpha", "ns-2", Some("shared"));
        let r = appset_related_resources(&a, &[a.clone(), twin]).unwrap();
        assert_eq!(r.sharing, vec!["alpha".to_string()]);
    }

    #[test]
    fn no_placement_is_absent() {
        let a = appset("alpha", "ns", None);
        let b = appset("beta", "ns", Some("shared"));
        assert!(appset_related_resources(&a, &[b]).is_none());
    }
}
