use ccalloc_allocator::Allocator;
use ccalloc_client::{ApiClient, HttpApiClient};
use ccalloc_core::{ClusterCidr, ClusterCidrSpec};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Bootstrap CLI for the Multi-CIDR Range Allocator. Mirrors the familiar
/// `CIDRAllocatorParams{ClusterCIDRs, NodeCIDRMaskSizes}` bootstrap shape:
/// each `--cluster-cidr` admits one pool with no node selector, ahead of any
/// pools an administrator later creates through the real API.
#[derive(Parser)]
#[command(name = "ccalloc", about = "Multi-CIDR Range Allocator")]
struct Cli {
    /// A bootstrap ClusterCIDR as `<name>=<ipv4-cidr>[,<ipv6-cidr>]`. Repeatable.
    #[arg(long = "cluster-cidr", required = true)]
    cluster_cidrs: Vec<String>,

    /// perNodeHostBits for the corresponding `--cluster-cidr` at the same
    /// position. Repeatable; must match `--cluster-cidr` in count.
    #[arg(long = "per-node-mask-size", required = true)]
    per_node_mask_sizes: Vec<i32>,

    /// Base URL of the object-store API this allocator talks to.
    #[arg(long, env = "CCALLOC_API_BASE_URL", default_value = "http://localhost:8080")]
    api_base_url: String,

    /// Number of worker tasks pulling from the shared work queue.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Log level / filter directive passed to `tracing_subscriber::EnvFilter`.
    #[arg(long, env = "CCALLOC_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn parse_bootstrap_cidrs(cli: &Cli) -> miette::Result<Vec<ClusterCidr>> {
    if cli.cluster_cidrs.len() != cli.per_node_mask_sizes.len() {
        return Err(miette::miette!(
            "--cluster-cidr was given {} times but --per-node-mask-size {} times; they must match 1:1",
            cli.cluster_cidrs.len(),
            cli.per_node_mask_sizes.len()
        ));
    }

    cli.cluster_cidrs
        .iter()
        .zip(&cli.per_node_mask_sizes)
        .map(|(entry, &per_node_host_bits)| {
            let (name, cidrs) = entry.split_once('=').ok_or_else(|| {
                miette::miette!(
                    help = "use the form <name>=<ipv4-cidr>[,<ipv6-cidr>]",
                    "invalid --cluster-cidr '{}'",
                    entry
                )
            })?;
            let mut parts = cidrs.splitn(2, ',');
            let ipv4_or_ipv6 = parts.next().unwrap_or_default();
            let second = parts.next();

            let (ipv4, ipv6) = if ipv4_or_ipv6.contains(':') {
                (second.map(str::to_string), Some(ipv4_or_ipv6.to_string()))
            } else {
                (Some(ipv4_or_ipv6.to_string()), second.map(str::to_string))
            };

            Ok(ClusterCidr::new(
                name,
                ClusterCidrSpec {
                    per_node_host_bits,
                    ipv4,
                    ipv6,
                    node_selector: None,
                },
            ))
        })
        .collect()
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bootstrap_cidrs = parse_bootstrap_cidrs(&cli)?;

    let client: Arc<dyn ApiClient> = Arc::new(HttpApiClient::new(cli.api_base_url.clone()));
    for cc in &bootstrap_cidrs {
        match client.get_cluster_cidr(&cc.name).await {
            Ok(Some(_)) => info!(cluster_cidr = %cc.name, "bootstrap ClusterCIDR already present, leaving as-is"),
            Ok(None) => {
                info!(cluster_cidr = %cc.name, ipv4 = ?cc.spec.ipv4, ipv6 = ?cc.spec.ipv6, "creating bootstrap ClusterCIDR");
                if let Err(e) = client.create_cluster_cidr(cc).await {
                    error!(cluster_cidr = %cc.name, error = %e, "failed to create bootstrap ClusterCIDR");
                }
            }
            Err(e) => error!(cluster_cidr = %cc.name, error = %e, "failed to check for an existing ClusterCIDR"),
        }
    }

    let allocator = Arc::new(Allocator::new(client.clone()));
    if let Err(e) = allocator.initial_sync().await {
        error!(error = %e, "initial sync failed");
        return Err(miette::miette!("{}", e));
    }

    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_allocator = allocator.clone();
    let workers = cli.workers;
    let run_handle = tokio::spawn(async move { run_allocator.run(run_token, workers).await });

    let sig = shutdown_signal().await;
    info!("received {}, shutting down gracefully...", sig);
    token.cancel();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), run_handle).await;
    info!("shutdown complete");
    Ok(())
}

/// Wait for either SIGINT (ctrl-c) or SIGTERM, returning which one fired.
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}
