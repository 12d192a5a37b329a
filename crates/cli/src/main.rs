use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fleetview_argo::{
    appset_related_resources, spawn_aggregation, AggEvent, AggregationHandle, ArgoAggregator, SearchQuery,
};
use fleetview_core::{
    AggConfig, ApplicationSet, ArgoApplication, ClusterInventory, RemoteArgoApp, Transform,
    APPLICATION_KIND, APPLICATION_SET_KIND, ARGO_APPLICATION_API_VERSION, PLACEMENT_DECISION_API_VERSION,
    PLACEMENT_DECISION_KIND,
};
use fleetview_kubehub::{api_for, cluster_inventory, gvk_key, list_all, poll_pages, PolledPage, StaticResources};
use fleetview_store::{inflate_resource, ApplicationCache, CacheKey};
use serde::{de::DeserializeOwned, Serialize};
use tokio::signal;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

mod fixtures;

#[derive(Parser, Debug)]
#[command(name = "fleetviewctl", version, about = "Argo CD application aggregation across a managed fleet")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Per-request cap for remote searches
    #[arg(long = "search-limit", global = true, env = "FLEETVIEW_SEARCH_LIMIT")]
    search_limit: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one full aggregation pass over fixture files
    Aggregate {
        /// Cluster inventory (hubClusterName + clusters)
        #[arg(long)]
        clusters: PathBuf,
        /// Hub Applications
        #[arg(long)]
        local: Option<PathBuf>,
        /// Hub ApplicationSets
        #[arg(long)]
        appsets: Option<PathBuf>,
        /// Search records for managed-cluster Applications
        #[arg(long)]
        remote: Option<PathBuf>,
        #[arg(long = "placement-decisions")]
        placement_decisions: Option<PathBuf>,
    },
    /// Print the variables of the next remote search query
    Query {
        #[arg(long, default_value = fleetview_kubehub::DEFAULT_HUB_NAME)]
        hub: String,
    },
    /// List ApplicationSets sharing a placement with the named one
    Related {
        #[arg(long)]
        appsets: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Poll the current kube context and aggregate continuously
    Watch {
        #[arg(long = "page-size", default_value_t = 500)]
        page_size: u32,
        #[arg(long = "interval-secs", default_value_t = 30)]
        interval_secs: u64,
        /// Search records replayed on every remote round
        #[arg(long)]
        remote: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env = std::env::var("FLEETVIEW_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("FLEETVIEW_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid FLEETVIEW_METRICS_ADDR; expected host:port");
        }
    }
}

fn emit<T: Serialize>(output: Output, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    match output {
        Output::Human => human(value),
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

#[derive(Serialize)]
struct FlatRow {
    key: &'static str,
    name: String,
    namespace: String,
    #[serde(flatten)]
    transform: Transform,
}

#[derive(Serialize)]
struct AggregateReport {
    pushed: std::collections::BTreeMap<String, Vec<String>>,
    pulled: std::collections::BTreeMap<String, Vec<String>>,
    flat: Vec<FlatRow>,
    ocp_signatures: Vec<String>,
}

fn flat_rows(agg: &ArgoAggregator, cache: &ApplicationCache) -> Result<Vec<FlatRow>> {
    let mut rows = Vec::new();
    let local = cache.resource_uid_map(CacheKey::LocalArgoApps).into_iter().flat_map(|m| m.values());
    for entry in local.chain(cache.resources(CacheKey::RemoteArgoApps)) {
        let app: ArgoApplication = inflate_resource(agg.compressor(), &entry.compressed)?;
        let key = if app.uid().is_some() { CacheKey::LocalArgoApps } else { CacheKey::RemoteArgoApps };
        rows.push(FlatRow {
            key: key.as_str(),
            name: app.name().to_string(),
            namespace: app.namespace().unwrap_or("").to_string(),
            transform: entry.transform.clone(),
        });
    }
    rows.sort_by(|a, b| (a.key, &a.namespace, &a.name).cmp(&(b.key, &b.namespace, &b.name)));
    Ok(rows)
}

fn aggregate(
    config: AggConfig,
    clusters: &Path,
    local: Option<&Path>,
    appsets: Option<&Path>,
    remote: Option<&Path>,
    placement_decisions: Option<&Path>,
) -> Result<AggregateReport> {
    let inventory: ClusterInventory = fixtures::load_one(clusters)?;
    let lister = Arc::new(StaticResources::new());
    let decisions: Vec<serde_json::Value> = fixtures::load_optional(placement_decisions)?;
    let n = lister.replace_values(PLACEMENT_DECISION_KIND, PLACEMENT_DECISION_API_VERSION, decisions)?;
    debug!(placement_decisions = n, "fixtures loaded");

    let mut agg = ArgoAggregator::new(config, Arc::new(inventory), lister);
    let mut cache = ApplicationCache::new();
    agg.poll_application_sets(&mut cache, fixtures::load_optional::<ApplicationSet>(appsets)?, true);
    agg.poll_applications(&mut cache, fixtures::load_optional::<ArgoApplication>(local)?, true);

    let remote: Vec<RemoteArgoApp> = fixtures::load_optional(remote)?;
    let mut query = SearchQuery::default();
    agg.add_argo_query_inputs(&cache, &mut query);
    agg.cache_argo_applications(&mut cache, &remote);

    let pushed = agg.pushed_appset_map();
    let pulled = agg.pulled_appset_map();
    Ok(AggregateReport {
        pushed: pushed.data.iter().map(|(k, v)| (k.clone(), v.iter().map(|a| a.name().to_string()).collect())).collect(),
        pulled: pulled.data.iter().map(|(k, v)| (k.clone(), v.iter().map(|r| format!("{}@{}", r.name, r.cluster)).collect())).collect(),
        flat: flat_rows(&agg, &cache)?,
        ocp_signatures: agg.ocp_filter().sorted(),
    })
}

fn print_report(r: &AggregateReport) {
    println!("APPSET                         SOURCE  APPLICATIONS");
    for (source, map) in [("pushed", &r.pushed), ("pulled", &r.pulled)] {
        for (appset, apps) in map {
            println!("{:<30} {:<7} {}", appset, source, apps.join(", "));
        }
    }
    println!();
    println!("KEY             NAMESPACE/NAME                 TYPE    CLUSTERS");
    for row in &r.flat {
        let ty = match row.transform.app_type {
            fleetview_core::AppType::Argo => "argo",
            fleetview_core::AppType::AppSet => "appset",
        };
        println!("{:<15} {:<30} {:<7} {}", row.key, format!("{}/{}", row.namespace, row.name), ty, row.transform.clusters.join(","));
    }
    println!();
    println!("ocp signatures: {}", r.ocp_signatures.len());
}

fn next_query(config: AggConfig, hub: &str) -> SearchQuery {
    let inventory = ClusterInventory::new(hub, Vec::new());
    let mut agg = ArgoAggregator::new(config, Arc::new(inventory), Arc::new(StaticResources::new()));
    let mut query = SearchQuery::default();
    agg.add_argo_query_inputs(&ApplicationCache::new(), &mut query);
    query
}

fn decode_page<T: DeserializeOwned>(page: PolledPage) -> Vec<T> {
    let key = page.gvk_key;
    page.items
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<T>(raw) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(gvk = %key, error = %e, "skipping undecodable item");
                None
            }
        })
        .collect()
}

#[derive(Serialize)]
struct WatchLine {
    epoch: u64,
    pushed_appsets: usize,
    pulled_appsets: usize,
    #[serde(flatten)]
    stats: fleetview_argo::CacheStats,
}

fn report_epoch(output: Output, epoch: u64, handle: &AggregationHandle) -> Result<()> {
    let line = WatchLine {
        epoch,
        pushed_appsets: handle.pushed_appset_map().data.len(),
        pulled_appsets: handle.pulled_appset_map().data.len(),
        stats: handle.stats(),
    };
    match output {
        Output::Json => println!("{}", serde_json::to_string(&line)?),
        _ => emit(output, &line, |l| {
            println!(
                "epoch {}: pushed={} pulled={} local={} appsets={} remote={} ocp={}",
                l.epoch, l.pushed_appsets, l.pulled_appsets, l.stats.local_apps, l.stats.appsets, l.stats.remote_apps, l.stats.ocp_signatures
            )
        })?,
    }
    Ok(())
}

async fn watch(config: AggConfig, output: Output, page_size: u32, interval: Duration, remote: Option<&Path>) -> Result<()> {
    let client = kube::Client::try_default().await.context("connecting to the current kube context")?;
    let inventory = cluster_inventory(client.clone()).await?;
    let remote_records: Vec<RemoteArgoApp> = fixtures::load_optional(remote)?;

    let apps_key = gvk_key(ARGO_APPLICATION_API_VERSION, APPLICATION_KIND);
    let appsets_key = gvk_key(ARGO_APPLICATION_API_VERSION, APPLICATION_SET_KIND);
    let pd_key = gvk_key(PLACEMENT_DECISION_API_VERSION, PLACEMENT_DECISION_KIND);
    let pd_api = match api_for(client.clone(), &pd_key).await {
        Ok(api) => Some(api),
        Err(e) => {
            warn!(error = %e, "PlacementDecisions not served; appset clusters stay empty");
            None
        }
    };

    let lister = Arc::new(StaticResources::new());
    let agg = ArgoAggregator::new(config, Arc::new(inventory), lister.clone());
    info!(search_limit = agg.config().search_limit, zstd_level = agg.config().zstd_level, "aggregator configured");
    let (tx, handle) = spawn_aggregation(agg, 64);
    let mut epoch_rx = handle.subscribe_epoch();

    // one poller per kind so passes of the same kind never interleave
    let (page_tx, mut page_rx) = mpsc::channel::<PolledPage>(16);
    let mut pollers = Vec::new();
    for key in [apps_key.clone(), appsets_key.clone()] {
        let api = api_for(client.clone(), &key).await?;
        let page_tx = page_tx.clone();
        pollers.push(tokio::spawn(async move {
            loop {
                match poll_pages(&api, &key, page_size, &page_tx).await {
                    Ok(n) => debug!(gvk = %key, items = n, "pass polled"),
                    Err(e) => error!(gvk = %key, error = ?e, "poll failed"),
                }
                if page_tx.is_closed() {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        }));
    }
    drop(page_tx);

    let mut ticker = tokio::time::interval(interval);
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    info!(interval_secs = interval.as_secs(), page_size, "watch started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(api) = &pd_api {
                    match list_all(api).await {
                        Ok(objs) => lister.replace(PLACEMENT_DECISION_KIND, PLACEMENT_DECISION_API_VERSION, objs),
                        Err(e) => warn!(error = ?e, "listing PlacementDecisions failed"),
                    }
                }
                let (reply, rx) = oneshot::channel();
                tx.send(AggEvent::NextQuery { reply }).await.map_err(|_| anyhow!("aggregation loop stopped"))?;
                let query = rx.await.context("aggregation loop dropped the query")?;
                debug!(variables = %query.variables(), "search query");
                tx.send(AggEvent::RemoteSearch { results: remote_records.clone() })
                    .await
                    .map_err(|_| anyhow!("aggregation loop stopped"))?;
            }
            Some(page) = page_rx.recv() => {
                let should_post_process = page.last;
                let ev = if page.gvk_key == apps_key {
                    AggEvent::Applications { items: decode_page(page), should_post_process }
                } else {
                    AggEvent::ApplicationSets { items: decode_page(page), should_post_process }
                };
                tx.send(ev).await.map_err(|_| anyhow!("aggregation loop stopped"))?;
            }
            changed = epoch_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let epoch = *epoch_rx.borrow_and_update();
                report_epoch(output, epoch, &handle)?;
            }
            _ = &mut ctrl_c => {
                info!("Ctrl-C received; stopping watch");
                break;
            }
        }
    }

    for p in pollers {
        p.abort();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let mut config = AggConfig::from_env();
    if let Some(limit) = cli.search_limit.filter(|n| *n > 0) {
        config.search_limit = limit;
    }

    match cli.command {
        Commands::Aggregate { clusters, local, appsets, remote, placement_decisions } => {
            info!(clusters = %clusters.display(), "aggregate invoked");
            let report = aggregate(
                config,
                &clusters,
                local.as_deref(),
                appsets.as_deref(),
                remote.as_deref(),
                placement_decisions.as_deref(),
            )?;
            emit(cli.output, &report, print_report)?;
        }
        Commands::Query { hub } => {
            let vars = next_query(config, &hub).variables();
            emit(cli.output, &vars, |v| println!("{}", serde_json::to_string_pretty(v).unwrap_or_default()))?;
        }
        Commands::Related { appsets, name, namespace } => {
            let all: Vec<ApplicationSet> = fixtures::load_items(&appsets)?;
            let target = all
                .iter()
                .find(|a| a.name() == name && namespace.as_deref().map_or(true, |ns| a.namespace() == Some(ns)))
                .ok_or_else(|| anyhow!("ApplicationSet {} not found in {}", name, appsets.display()))?;
            match appset_related_resources(target, &all) {
                Some(related) => emit(cli.output, &related, |r| {
                    println!("placement: {}", r.placement);
                    for other in &r.sharing {
                        println!("  {}", other);
                    }
                })?,
                None => eprintln!("{} has no placement", name),
            }
        }
        Commands::Watch { page_size, interval_secs, remote } => {
            watch(config, cli.output, page_size, Duration::from_secs(interval_secs.max(1)), remote.as_deref()).await?;
        }
    }

    Ok(())
}
