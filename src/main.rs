use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use pg_failover_operator::config::{LogFormat, OperatorConfig};
use pg_failover_operator::controller::{
    LoggingTriggers, PodController, PodEventHandler, DEFAULT_MAX_ATTEMPTS,
};
use pg_failover_operator::failover::FailoverStrategyKind;
use pg_failover_operator::platform::{KubePlatform, Platform};
use pg_failover_operator::{telemetry, Error};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pod controller until interrupted
    Run(CommonArgs),
    /// Run a single failover for a cluster using an existing Pgtask
    Failover(FailoverArgs),
    /// Show version information
    Version,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Namespace to watch and run failovers in
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Failover strategy: pod-relabel (1) or workload-relabel (2).
    /// workload-relabel only relabels the target's Deployment: no pod gets
    /// service-selector=<cluster>, so the primary Service selects nothing
    /// and later failovers of the cluster fail until a pod is relabeled.
    #[arg(long, env = "FAILOVER_STRATEGY", default_value = "pod-relabel")]
    strategy: FailoverStrategyKind,

    /// Attempts when writing a pod's role label
    #[arg(long, env = "LABEL_RETRY_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    retry_attempts: u32,

    /// Retry only conflict-class label writes, with jittered backoff.
    /// By default every failed write is retried immediately.
    #[arg(long, env = "LABEL_RETRY_CONFLICTS_ONLY")]
    retry_conflicts_only: bool,

    /// Backoff before the second label attempt, in milliseconds
    /// (with --retry-conflicts-only)
    #[arg(long, env = "LABEL_RETRY_BASE_MS", default_value_t = 50)]
    retry_base_ms: u64,

    /// Upper bound on a single label backoff, in milliseconds
    /// (with --retry-conflicts-only)
    #[arg(long, env = "LABEL_RETRY_MAX_MS", default_value_t = 2000)]
    retry_max_ms: u64,

    /// Log output format: text or json
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

impl CommonArgs {
    fn into_config(self) -> Result<OperatorConfig, Error> {
        let config = OperatorConfig {
            namespace: self.namespace,
            strategy: self.strategy,
            retry: OperatorConfig::retry_policy(
                self.retry_attempts,
                self.retry_conflicts_only,
                self.retry_base_ms,
                self.retry_max_ms,
            ),
            log_format: self.log_format,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct FailoverArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Cluster whose primary is replaced
    #[arg(long)]
    cluster: String,

    /// Name of the Pgtask naming the target pod
    #[arg(long)]
    task: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Version => {
            println!("pg-failover-operator v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Run(args) => {
            let config = args.into_config()?;
            telemetry::init_tracing(config.log_format)?;
            run_controller(config).await
        }
        Commands::Failover(args) => {
            let config = args.common.into_config()?;
            telemetry::init_tracing(config.log_format)?;
            run_failover(config, &args.cluster, &args.task).await
        }
    };

    // Flush any remaining traces
    telemetry::shutdown_telemetry();

    if let Err(e) = &result {
        error!("pg-failover-operator exited with error: {}", e);
    }
    result
}

async fn run_controller(config: OperatorConfig) -> Result<(), Error> {
    info!(
        "Starting pg-failover-operator v{} in namespace {} (strategy {})",
        env!("CARGO_PKG_VERSION"),
        config.namespace,
        config.strategy
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    let platform: Arc<dyn Platform> = Arc::new(KubePlatform::new(client.clone()));
    let handler = PodEventHandler::new(
        platform,
        Arc::new(LoggingTriggers),
        config.namespace.clone(),
        config.retry,
    );
    let controller = PodController::new(client, config.namespace.clone(), handler);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    match controller.run(cancel).await {
        Err(Error::Cancelled) => {
            info!("Pod controller stopped");
            Ok(())
        }
        other => other,
    }
}

async fn run_failover(config: OperatorConfig, cluster: &str, task_name: &str) -> Result<(), Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    let platform: Arc<dyn Platform> = Arc::new(KubePlatform::new(client));

    let task = platform
        .get_task(task_name, &config.namespace)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: "pgtask",
            name: task_name.to_string(),
        })?;

    task.ensure_failover()?;

    if task.phase().is_terminal() {
        warn!(
            "task {} already finished with phase {}, running failover again",
            task_name,
            task.phase()
        );
    }

    let strategy = config.strategy.build(platform);
    info!(
        "Running {} failover of cluster {} for task {}",
        strategy.name(),
        cluster,
        task_name
    );
    strategy.failover(cluster, &task, &config.namespace).await
}

/// Cancel `token` on Ctrl-C or SIGTERM
async fn cancel_on_shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl-C, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C, shutting down");
    }
    token.cancel();
}
