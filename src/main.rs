//! csi-watch - watch VolumeAttachments for the volumes of a CSI test run

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::api::ListParams;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use csi_watch_common::polling::PollConfig;
use csi_watch_common::retry::{retry_with_backoff, RetryConfig};
use csi_watch_common::telemetry::{init_telemetry, TelemetryConfig};
use csi_watch_common::DEFAULT_NAMESPACE;
use csi_watch_observer::client::wait_until_none_left;
use csi_watch_observer::{
    Clients, CompletionPolicy, MemoryStore, Observer, ObserverConfig, Runner, TestCase,
    TrackedEntity, VaListObserver,
};

/// csi-watch - observe VolumeAttachments while a CSI test suite runs
#[derive(Parser, Debug)]
#[command(name = "csi-watch", version, about, long_about = None)]
struct Cli {
    /// Emit JSON log lines
    #[arg(long, global = true, env = "CSI_WATCH_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch VolumeAttachments of the tracked volumes until they settle or drain
    Watch(WatchArgs),
}

#[derive(Parser, Debug)]
struct WatchArgs {
    /// Namespace of the test run
    #[arg(short, long, env = "CSI_WATCH_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Persistent volumes to track; defaults to every volume claimed from the namespace
    #[arg(long = "pv")]
    volumes: Vec<String>,

    /// Treat the run as a teardown: complete on divergence or once attachments drain
    #[arg(long)]
    clean: bool,

    /// Seconds between polls
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: u64,

    /// Seconds to wait for the observer before giving up
    #[arg(long, env = "CSI_WATCH_TIMEOUT", default_value_t = 600)]
    timeout: u64,

    /// Consecutive ready polls required before a steady run settles
    #[arg(long, default_value_t = 1)]
    settle_polls: u32,

    /// Attached/deleted gap that completes a clean run (0 waits for a full drain)
    #[arg(long, default_value_t = 1)]
    divergence_threshold: usize,

    /// After a clean run, wait until no attachment of a tracked volume is left
    #[arg(long)]
    wait_for_cleanup: bool,

    /// Test case id used to attribute events
    #[arg(long, default_value_t = 1)]
    test_case_id: i64,

    /// Test case name used in log output
    #[arg(long, default_value = "volume-attachments")]
    test_case: String,
}

impl WatchArgs {
    fn poll_config(&self) -> PollConfig {
        PollConfig::new(
            Duration::from_secs(self.poll_interval),
            Duration::from_secs(self.timeout),
        )
    }

    fn observer_config(&self) -> ObserverConfig {
        ObserverConfig {
            poll_interval: Duration::from_secs(self.poll_interval),
            backoff: RetryConfig::infinite(),
            policy: CompletionPolicy {
                settle_polls: self.settle_polls,
                divergence_threshold: self.divergence_threshold,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        json: cli.json_logs,
        ..Default::default()
    })?;

    match cli.command {
        Commands::Watch(args) => run_watch(args).await,
    }
}

/// Volumes bound to claims in `namespace`, as (volume, claim) pairs
async fn discover_volumes(
    client: &Client,
    namespace: &str,
) -> anyhow::Result<Vec<(String, String)>> {
    let api: Api<PersistentVolume> = Api::all(client.clone());
    let params = ListParams::default();
    let pvs = retry_with_backoff(
        &RetryConfig::with_max_attempts(5),
        "list_persistent_volumes",
        || api.list(&params),
    )
    .await?;

    Ok(pvs
        .items
        .into_iter()
        .filter_map(|pv| {
            let claim = pv.spec.as_ref()?.claim_ref.as_ref()?;
            if claim.namespace.as_deref() != Some(namespace) {
                return None;
            }
            Some((pv.metadata.name?, claim.name.clone()?))
        })
        .collect())
}

async fn run_watch(args: WatchArgs) -> anyhow::Result<()> {
    let client = Client::try_default().await?;
    let store = Arc::new(MemoryStore::new());
    let runner = Runner::new(
        Clients::from_kube(client.clone(), &args.namespace),
        store.clone(),
        TestCase::new(args.test_case_id, args.test_case.clone()),
    )
    .with_clean(args.clean);

    if args.volumes.is_empty() {
        for (id, (pv, claim)) in discover_volumes(&client, &args.namespace)
            .await?
            .into_iter()
            .enumerate()
        {
            runner.track(pv, TrackedEntity::new(id as i64 + 1).with_claim(claim))?;
        }
    } else {
        for (id, pv) in args.volumes.iter().enumerate() {
            runner.track(pv.clone(), TrackedEntity::new(id as i64 + 1))?;
        }
    }

    if runner.entities.is_empty() {
        anyhow::bail!("no persistent volumes to track in namespace {}", args.namespace);
    }
    info!(
        namespace = %args.namespace,
        volumes = runner.entities.len(),
        clean = args.clean,
        "tracking persistent volumes"
    );

    let runner = Arc::new(runner);
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling watch");
                cancel.cancel();
            }
        });
    }

    let observer: Arc<dyn Observer> =
        Arc::new(VaListObserver::new().with_config(args.observer_config()));
    let reports = runner
        .run_observers(vec![observer], cancel, Duration::from_secs(args.timeout))
        .await?;

    if args.clean && args.wait_for_cleanup {
        if let Some(va_client) = &runner.clients.va_client {
            wait_until_none_left(va_client.as_ref(), &runner.entities, &args.poll_config())
                .await?;
        }
    }

    let summary = serde_json::json!({
        "test_case": runner.test_case,
        "observers": reports,
        "events": store.events(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
