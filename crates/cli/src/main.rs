use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use navhook_core::{companion_set, OwnerIdentity};
use navhook_kubehub::{KubeStore, NavLinkStore};
use navhook_store::MemoryStore;
use navhook_webhook::{
    server::{serve, ServerConfig, TlsFiles},
    MonitoredKind, Reconciler, WebhookConfig, WebhookState,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "navhookd", version, about = "Companion NavLink admission webhook")]
struct Cli {
    #[command(flatten)]
    webhook: WebhookArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct WebhookArgs {
    /// Total time budget for one admission review
    #[arg(long = "request-budget-ms", env = "NAVHOOK_REQUEST_BUDGET_MS", global = true, default_value_t = 8000)]
    request_budget_ms: u64,

    /// Upper bound for a single NavLink store call
    #[arg(long = "store-timeout-ms", env = "NAVHOOK_STORE_TIMEOUT_MS", global = true, default_value_t = 2000)]
    store_timeout_ms: u64,

    /// API group of the monitored resource
    #[arg(long = "monitored-group", env = "NAVHOOK_MONITORED_GROUP", global = true, default_value = "monitoring.coreos.com")]
    monitored_group: String,

    /// Kind of the monitored resource
    #[arg(long = "monitored-kind", env = "NAVHOOK_MONITORED_KIND", global = true, default_value = "Prometheus")]
    monitored_kind: String,
}

impl WebhookArgs {
    fn config(&self) -> WebhookConfig {
        WebhookConfig {
            request_budget: Duration::from_millis(self.request_budget_ms),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            monitored: MonitoredKind { group: self.monitored_group.clone(), kind: self.monitored_kind.clone() },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve admission reviews against the cluster
    Serve {
        /// Listen address
        #[arg(long = "addr", env = "NAVHOOK_ADDR", default_value = "0.0.0.0:8443")]
        addr: SocketAddr,
        /// PEM certificate; plain http when omitted
        #[arg(long = "tls-cert", env = "NAVHOOK_TLS_CERT", requires = "tls_key")]
        tls_cert: Option<PathBuf>,
        /// PEM private key
        #[arg(long = "tls-key", env = "NAVHOOK_TLS_KEY", requires = "tls_cert")]
        tls_key: Option<PathBuf>,
        /// Serve NavLinks per namespace instead of cluster-wide
        #[arg(long = "navlink-namespaced", env = "NAVHOOK_NAVLINK_NAMESPACED", action = ArgAction::SetTrue)]
        navlink_namespaced: bool,
        /// Seconds to drain in-flight reviews on shutdown
        #[arg(long = "shutdown-grace-secs", default_value_t = 10)]
        shutdown_grace_secs: u64,
    },
    /// Run one AdmissionReview file through the webhook against an in-memory store
    Replay {
        /// Review JSON file, or "-" for stdin
        file: String,
        /// Pretend the NavLink kind is not installed
        #[arg(long = "not-installed", action = ArgAction::SetTrue)]
        not_installed: bool,
        /// Pre-populate the companion set of this namespace
        #[arg(long = "seed-namespace")]
        seed_namespace: Option<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("NAVHOOK_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() -> Option<metrics_exporter_prometheus::PrometheusHandle> {
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "failed to install metrics recorder; /metrics will be empty");
            None
        }
    }
}

fn read_review(file: &str) -> Result<Vec<u8>> {
    if file == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).context("reading review from stdin")?;
        Ok(buf)
    } else {
        std::fs::read(file).with_context(|| format!("reading review file {}", file))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.webhook.config();

    match cli.command {
        Commands::Serve { addr, tls_cert, tls_key, navlink_namespaced, shutdown_grace_secs } => {
            let metrics = init_metrics();
            let client = navhook_kubehub::get_kube_client().await?;
            let store: Arc<dyn NavLinkStore> = Arc::new(KubeStore::new(client, navlink_namespaced));
            info!(
                addr = %addr,
                budget_ms = config.request_budget.as_millis() as u64,
                store_timeout_ms = config.store_timeout.as_millis() as u64,
                monitored = %format!("{}/{}", config.monitored.group, config.monitored.kind),
                navlink_namespaced,
                "serve invoked"
            );
            let tls = match (tls_cert, tls_key) {
                (Some(cert), Some(key)) => Some(TlsFiles { cert, key }),
                _ => None,
            };
            let state = Arc::new(WebhookState::new(store, config, metrics));
            let server = ServerConfig { addr, tls, shutdown_grace: Duration::from_secs(shutdown_grace_secs) };
            serve(server, state).await?;
        }
        Commands::Replay { file, not_installed, seed_namespace } => {
            let body = read_review(&file)?;
            let store = Arc::new(if not_installed { MemoryStore::not_installed() } else { MemoryStore::new() });
            if let Some(ns) = seed_namespace.as_deref() {
                for (_, navlink) in companion_set(ns, &OwnerIdentity::new("replay", "replay"))? {
                    store.seed(navlink);
                }
            }
            let reconciler = Reconciler::new(store.clone(), config);
            let verdict = reconciler.review(&body).await;
            for call in store.calls() {
                info!(op = ?call.op, ns = %call.namespace, name = %call.name, "store call");
            }
            println!("{}", serde_json::to_string_pretty(&verdict.into_review())?);
        }
    }

    Ok(())
}
