//! Default classification and cluster placement for cached Argo resources.

use fleetview_core::{
    AppType, ApplicationSet, ArgoApplication, PassContext, Result, Transform, Transformer,
};
use smallvec::SmallVec;

use crate::cluster::destination_cluster;

#[derive(Debug, Default, Clone, Copy)]
pub struct ArgoTransformer;

impl Transformer for ArgoTransformer {
    fn transform_application(&self, app: &ArgoApplication, ctx: &PassContext) -> Result<Transform> {
        // synthesized search records already know their cluster
        let cluster = match app.status.as_ref().and_then(|s| s.cluster.as_deref()) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => {
                let acting = ctx.clusters.local_cluster().map(|c| c.name.as_str());
                destination_cluster(&app.spec.destination, &ctx.clusters, acting)
            }
        };
        let mut clusters = SmallVec::new();
        clusters.push(cluster);
        Ok(Transform { app_type: AppType::Argo, clusters })
    }

    fn transform_application_set(&self, appset: &ApplicationSet, ctx: &PassContext) -> Result<Transform> {
        let mut clusters: SmallVec<[String; 4]> = SmallVec::new();
        if let Some(placement) = appset.placement() {
            let decisions = ctx
                .placement_decisions
                .iter()
                .filter(|pd| pd.placement_name() == Some(placement) && pd.metadata.namespace.as_deref() == appset.namespace());
            for name in decisions.flat_map(|pd| pd.cluster_names()) {
                if !clusters.iter().any(|c| c == name) {
                    clusters.push(name.to_string());
                }
            }
        }
        clusters.sort_unstable();
        Ok(Transform { app_type: AppType::AppSet, clusters })
    }
}
