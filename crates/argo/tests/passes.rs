#![forbid(unsafe_code)]

use std::sync::Arc;

use fleetview_argo::{ArgoAggregator, SearchQuery};
use fleetview_core::{
    AggConfig, ApplicationSet, ArgoApplication, Cluster, ClusterInventory, Error, PassContext, RemoteArgoApp,
    Transform, Transformer,
};
use fleetview_kubehub::StaticResources;
use fleetview_store::{inflate_resource, ApplicationCache, CacheKey, ZstdCompressor};
use serde_json::json;

fn inventory() -> ClusterInventory {
    ClusterInventory::new(
        "local-cluster",
        vec![
            Cluster { name: "local-cluster".into(), kube_api_server: Some("https://api.hub:6443".into()) },
            Cluster { name: "east".into(), kube_api_server: Some("https://api.east:6443".into()) },
        ],
    )
}

fn aggregator(config: AggConfig) -> ArgoAggregator {
    ArgoAggregator::new(config, Arc::new(inventory()), Arc::new(StaticResources::new()))
}

fn app(name: &str, uid: &str, appset: Option<&str>) -> ArgoApplication {
    let mut meta = json!({ "name": name, "namespace": "openshift-gitops", "uid": uid });
    if let Some(set) = appset {
        meta["ownerReferences"] = json!([{
            "apiVersion": "argoproj.io/v1alpha1", "kind": "ApplicationSet", "name": set, "uid": format!("{}-uid", set)
        }]);
    }
    serde_json::from_value(json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "Application",
        "metadata": meta,
        "spec": { "destination": { "namespace": name, "server": "https://api.east:6443" } }
    }))
    .unwrap()
}

fn appset(name: &str, uid: &str) -> ApplicationSet {
    serde_json::from_value(json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "ApplicationSet",
        "metadata": { "name": name, "namespace": "openshift-gitops", "uid": uid },
        "spec": { "generators": [] }
    }))
    .unwrap()
}

fn remote(name: &str, uid: &str, appset: Option<&str>) -> RemoteArgoApp {
    RemoteArgoApp {
        uid: uid.into(),
        hosting_resource: appset.map(|s| format!("ApplicationSet/openshift-gitops/{}", s)),
        name: name.into(),
        namespace: "openshift-gitops".into(),
        destination_namespace: name.into(),
        cluster: "east".into(),
        ..Default::default()
    }
}

fn cached_uids(cache: &ApplicationCache, key: CacheKey) -> Vec<String> {
    let mut v: Vec<String> = cache.resource_uid_map(key).map(|m| m.keys().cloned().collect()).unwrap_or_default();
    v.sort();
    v
}

#[test]
fn pushed_map_published_only_when_pass_completes() {
    let mut agg = aggregator(AggConfig::default());
    let mut cache = ApplicationCache::new();
    assert!(agg.pushed_appset_map().data.is_empty());

    let out = agg.poll_applications(&mut cache, vec![app("a", "u1", Some("set")), app("flat", "u9", None)], false);
    assert_eq!((out.cached, out.grouped, out.swept), (1, 1, None));
    assert!(agg.pushed_appset_map().data.is_empty(), "mid-pass state is not visible");

    agg.poll_applications(&mut cache, vec![app("b", "u2", Some("set")), app("a", "u1", Some("set"))], true);
    let published = agg.pushed_appset_map();
    assert_eq!(published.epoch, 1);
    let members: Vec<&str> = published.data["set"].iter().map(|a| a.name()).collect();
    assert_eq!(members, vec!["a", "b"]);
    assert_eq!(cached_uids(&cache, CacheKey::LocalArgoApps), vec!["u9".to_string()]);

    // the next pass starts from an empty building map
    agg.poll_applications(&mut cache, vec![app("flat", "u9", None)], true);
    assert!(agg.pushed_appset_map().data.is_empty());
    assert_eq!(agg.pushed_appset_map().epoch, 2);
}

#[test]
fn app_moving_between_appsets_is_not_duplicated() {
    let mut agg = aggregator(AggConfig::default());
    let mut cache = ApplicationCache::new();
    agg.poll_applications(&mut cache, vec![app("a", "u1", Some("old-set"))], true);
    agg.poll_applications(&mut cache, vec![app("a", "u1", Some("new-set"))], true);
    let published = agg.pushed_appset_map();
    assert!(!published.data.contains_key("old-set"));
    assert_eq!(published.data["new-set"].len(), 1);
}

#[test]
fn untouched_entries_swept_at_pass_end() {
    let mut agg = aggregator(AggConfig::default());
    let mut cache = ApplicationCache::new();
    agg.poll_application_sets(&mut cache, vec![appset("A", "A"), appset("B", "B"), appset("C", "C")], true);
    assert_eq!(cached_uids(&cache, CacheKey::AppSets), vec!["A", "B", "C"]);

    agg.poll_application_sets(&mut cache, vec![appset("A", "A")], false);
    let out = agg.poll_application_sets(&mut cache, vec![appset("C", "C")], true);
    assert_eq!(out.swept, Some(1));
    assert_eq!(cached_uids(&cache, CacheKey::AppSets), vec!["A", "C"]);
}

#[test]
fn kinds_keep_separate_passes() {
    let mut agg = aggregator(AggConfig::default());
    let mut cache = ApplicationCache::new();
    agg.poll_applications(&mut cache, vec![app("x", "ux", None), app("y", "uy", None)], true);

    // an appset pass finishing in the middle of an app pass does not end it
    agg.poll_applications(&mut cache, vec![app("x", "ux", None)], false);
    agg.poll_application_sets(&mut cache, vec![appset("A", "A")], true);
    assert_eq!(cached_uids(&cache, CacheKey::LocalArgoApps), vec!["ux", "uy"]);

    agg.poll_applications(&mut cache, Vec::new(), true);
    assert_eq!(cached_uids(&cache, CacheKey::LocalArgoApps), vec!["ux"]);
}

#[test]
fn resources_without_uid_are_skipped() {
    let mut agg = aggregator(AggConfig::default());
    let mut cache = ApplicationCache::new();
    let mut nameless = app("n", "", None);
    nameless.metadata.uid = None;
    let out = agg.poll_applications(&mut cache, vec![nameless, app("ok", "u1", None)], true);
    assert_eq!(out.skipped, 1);
    assert_eq!(out.cached, 1);
}

#[test]
fn pulled_map_falls_back_to_building_until_published() {
    let mut agg = aggregator(AggConfig::default());
    let mut cache = ApplicationCache::new();
    let mut query = SearchQuery::default();
    agg.add_argo_query_inputs(&cache, &mut query);
    agg.cache_argo_applications(&mut cache, &[remote("a", "east/1", Some("pull-set")), remote("solo", "east/2", None)]);

    assert!(agg.readers().pulled.load().data.is_empty());
    assert_eq!(agg.pulled_appset_map().data["pull-set"].len(), 1);
    // the pushed accessor has no such fallback
    agg.poll_applications(&mut cache, vec![app("a", "u1", Some("set"))], false);
    assert!(agg.pushed_appset_map().data.is_empty());

    assert_eq!(cache.resources(CacheKey::RemoteArgoApps).len(), 1);
    assert!(agg.ocp_filter().is_ocp_app_argo("a", "a", "east"));
    assert!(agg.ocp_filter().is_ocp_app_argo("solo", "solo", "east"));

    // next unchunked request promotes the previous one
    agg.add_argo_query_inputs(&cache, &mut query);
    agg.cache_argo_applications(&mut cache, &[]);
    assert_eq!(agg.readers().pulled.load().data["pull-set"].len(), 1);
}

#[test]
fn chunked_search_publishes_only_between_sequences() {
    let mut agg = aggregator(AggConfig { search_limit: 2, ..AggConfig::default() });
    let mut cache = ApplicationCache::new();
    let pulled = agg.readers().pulled;

    // unchunked request comes back at the limit
    let mut query = SearchQuery::default();
    agg.add_argo_query_inputs(&cache, &mut query);
    assert!(query.input[0].filter("name").is_none());
    agg.cache_argo_applications(&mut cache, &[remote("a", "east/1", None), remote("b", "east/2", None)]);
    assert_eq!(cache.resources(CacheKey::RemoteArgoApps).len(), 2);

    // the following requests are chunked by name prefix
    let mut chunks = 0;
    loop {
        let mut query = SearchQuery::default();
        agg.add_argo_query_inputs(&cache, &mut query);
        let names = query.input[0].filter("name").expect("chunked request").values.clone();
        let first = chunks == 0;
        let results = if first {
            vec![remote("a", "east/1", None), remote("b", "east/2", None), remote("app-1", "east/3", Some("big-set"))]
        } else {
            vec![remote(&format!("{}-app", &names[0][..1]), &format!("east/c{}", chunks), Some("big-set"))]
        };
        let before = pulled.epoch();
        agg.cache_argo_applications(&mut cache, &results);
        chunks += 1;
        if first {
            assert_eq!(pulled.epoch(), before + 1, "sequence start publishes the previous pass");
        } else {
            assert_eq!(pulled.epoch(), before, "mid-sequence chunk must not publish");
            assert!(!pulled.load().data.contains_key("big-set"));
        }
        if names.iter().any(|k| k == "0*") {
            break;
        }
    }
    assert!(chunks > 1);
    // flat remote apps from every chunk were swapped in together
    assert_eq!(cache.resources(CacheKey::RemoteArgoApps).len(), 2);

    // the next sequence start publishes everything gathered across the chunks
    let mut query = SearchQuery::default();
    agg.add_argo_query_inputs(&cache, &mut query);
    agg.cache_argo_applications(&mut cache, &[]);
    assert_eq!(pulled.load().data["big-set"].len(), chunks);
}

struct AppSetsBroken;

impl Transformer for AppSetsBroken {
    fn transform_application(&self, app: &ArgoApplication, ctx: &PassContext) -> fleetview_core::Result<Transform> {
        fleetview_argo::ArgoTransformer.transform_application(app, ctx)
    }
    fn transform_application_set(&self, _appset: &ApplicationSet, _ctx: &PassContext) -> fleetview_core::Result<Transform> {
        Err(Error::Transform("placement lookup failed".into()))
    }
}

#[test]
fn failing_phase_does_not_block_the_others() {
    let mut agg = aggregator(AggConfig::default());
    let mut cache = ApplicationCache::new();
    agg.poll_application_sets(&mut cache, vec![appset("A", "A")], true);
    agg.poll_applications(&mut cache, vec![app("flat", "u1", None)], true);

    let mut agg = agg.with_transformer(Arc::new(AppSetsBroken));
    agg.cache_argo_applications(&mut cache, &[remote("solo", "east/1", None)]);
    assert_eq!(cache.resources(CacheKey::RemoteArgoApps).len(), 1);
    assert_eq!(cached_uids(&cache, CacheKey::AppSets), vec!["A"]);
}

#[test]
fn signatures_survive_until_the_pass_ends() {
    let mut agg = aggregator(AggConfig::default());
    let mut cache = ApplicationCache::new();
    agg.poll_applications(&mut cache, vec![app("x", "ux", None), app("y", "uy", Some("set"))], true);
    assert!(agg.ocp_filter().is_ocp_app_argo("y", "y", "east"));

    // y's page has not arrived yet
    agg.poll_applications(&mut cache, vec![app("x", "ux", None)], false);
    assert!(agg.ocp_filter().is_ocp_app_argo("y", "y", "east"));

    agg.poll_applications(&mut cache, Vec::new(), true);
    assert!(!agg.ocp_filter().is_ocp_app_argo("y", "y", "east"));
    assert!(agg.ocp_filter().is_ocp_app_argo("x", "x", "east"));
}

#[test]
fn custom_compressor_round_trips_cached_entries() {
    let mut agg = aggregator(AggConfig::default()).with_compressor(Arc::new(ZstdCompressor::new(19)));
    assert_eq!(agg.config().search_limit, 1000);
    let mut cache = ApplicationCache::new();
    agg.poll_applications(&mut cache, vec![app("flat", "u1", None)], true);

    let entry = &cache.resource_uid_map(CacheKey::LocalArgoApps).unwrap()["u1"];
    let back: ArgoApplication = inflate_resource(agg.compressor(), &entry.compressed).unwrap();
    assert_eq!(back.name(), "flat");
    assert_eq!(entry.transform.clusters.as_slice(), ["east".to_string()]);
}
