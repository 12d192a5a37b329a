use std::sync::Arc;
use std::time::Duration;

use fleetview_argo::{spawn_aggregation, AggEvent, ArgoAggregator};
use fleetview_core::{AggConfig, ArgoApplication, ClusterInventory, RemoteArgoApp};
use fleetview_kubehub::StaticResources;
use serde_json::json;
use tokio::sync::oneshot;

fn app(name: &str, uid: &str, appset: &str) -> ArgoApplication {
    serde_json::from_value(json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "Application",
        "metadata": { "name": name, "namespace": "openshift-gitops", "uid": uid, "ownerReferences": [{
            "apiVersion": "argoproj.io/v1alpha1", "kind": "ApplicationSet", "name": appset, "uid": "set-uid"
        }] },
        "spec": { "destination": { "namespace": name, "server": "https://kubernetes.default.svc" } }
    }))
    .unwrap()
}

#[tokio::test]
async fn events_publish_maps_and_bump_epoch() {
    let agg = ArgoAggregator::new(
        AggConfig::default(),
        Arc::new(ClusterInventory::new("local-cluster", Vec::new())),
        Arc::new(StaticResources::new()),
    );
    let (tx, handle) = spawn_aggregation(agg, 8);
    let mut epoch = handle.subscribe_epoch();

    tx.send(AggEvent::Applications { items: vec![app("a", "u1", "set")], should_post_process: false }).await.unwrap();
    tx.send(AggEvent::Applications { items: vec![app("b", "u2", "set")], should_post_process: true }).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), epoch.changed()).await.unwrap().unwrap();
    assert_eq!(handle.pushed_appset_map().data["set"].len(), 2);

    let (reply, rx) = oneshot::channel();
    tx.send(AggEvent::NextQuery { reply }).await.unwrap();
    let query = rx.await.unwrap();
    assert_eq!(query.input.len(), 1);
    assert_eq!(query.input[0].filter("kind").unwrap().values, vec!["Application".to_string()]);

    let solo = RemoteArgoApp { uid: "east/1".into(), name: "solo".into(), cluster: "east".into(), ..Default::default() };
    tx.send(AggEvent::RemoteSearch { results: vec![solo] }).await.unwrap();
    // a round trip guarantees the search results were handled
    let (reply, rx) = oneshot::channel();
    tx.send(AggEvent::NextQuery { reply }).await.unwrap();
    rx.await.unwrap();
    let stats = handle.stats();
    assert_eq!(stats.remote_apps, 1);
    assert_eq!(stats.local_apps, 0);
    assert!(stats.ocp_signatures >= 3);
}

#[tokio::test]
async fn pulled_map_visible_before_first_publish() {
    let agg = ArgoAggregator::new(
        AggConfig::default(),
        Arc::new(ClusterInventory::new("local-cluster", Vec::new())),
        Arc::new(StaticResources::new()),
    );
    let (tx, handle) = spawn_aggregation(agg, 8);
    assert!(handle.pulled_appset_map().data.is_empty());

    let hosted = RemoteArgoApp {
        uid: "east/1".into(),
        hosting_resource: Some("ApplicationSet/openshift-gitops/pull-set".into()),
        name: "pulled".into(),
        cluster: "east".into(),
        ..Default::default()
    };
    tx.send(AggEvent::RemoteSearch { results: vec![hosted] }).await.unwrap();
    let (reply, rx) = oneshot::channel();
    tx.send(AggEvent::NextQuery { reply }).await.unwrap();
    rx.await.unwrap();

    let pulled = handle.pulled_appset_map();
    assert_eq!(pulled.data["pull-set"].len(), 1);
    // the pushed map has no such stand-in
    assert!(handle.pushed_appset_map().data.is_empty());
}
