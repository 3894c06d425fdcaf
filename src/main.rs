//! `fleetd` entry point: loads configuration, wires every subsystem, and
//! serves the agent-facing gRPC surface until `ctrl_c` or `SIGTERM`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Server};

use fleetd::adapters::sqlite::{
    self, SqliteAgentRepository, SqliteEventRepository, SqliteGroupRepository, SqliteHookRepository,
    SqliteMetricsRepository, SqliteWebhookRepository,
};
use fleetd::config::FleetConfig;
use fleetd::domain::ports::{AgentRepository, EventQueue, GroupRepository, HookRepository, MetricsStore, WebhookRepository};
use fleetd::grpc::client::AgentClientDialer;
use fleetd::grpc::generated::fleet_service_server::FleetServiceServer;
use fleetd::grpc::FleetServiceImpl;
use fleetd::infrastructure::logging::{LogRotator, LoggerImpl};
use fleetd::reliability::circuit_breaker::CircuitBreakerManager;
use fleetd::reliability::pool::ConnectionPool;
use fleetd::services::{
    BufferedMetricsStore, EventService, GroupOrchestrator, GrpcBulkExecutor, GrpcTelemetryClient, HookDispatcher,
    MetricsCollector, RegistryService, WatcherFacade,
};

/// `fleetd` takes no subcommands — the daemon exposes only its gRPC surface
/// and internal loops. The only flag is an optional alternate config path.
#[derive(Parser, Debug)]
#[command(name = "fleetd", about = "Agent fleet control plane daemon")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FleetConfig::load_from_file(path).context("failed to load configuration file")?,
        None => FleetConfig::load().context("failed to load configuration")?,
    };

    let _logger = LoggerImpl::init(&config.logging).context("failed to initialize logging")?;
    tracing::info!(bind_address = %config.grpc.bind_address, "starting fleetd");

    let log_cleanup_token = CancellationToken::new();
    let log_cleanup_handle = config.logging.log_dir.clone().map(|log_dir| {
        let retention_days = u32::try_from(config.logging.retention_days).unwrap_or(30);
        let rotator = LogRotator::new(retention_days, u64::MAX);
        let token = log_cleanup_token.clone();
        tokio::spawn(async move {
            rotator
                .run_periodic_cleanup(log_dir, std::time::Duration::from_secs(24 * 60 * 60), token)
                .await;
        })
    });

    let pool = sqlite::initialize_database(&config.database.path)
        .await
        .context("failed to initialize database")?;

    let agent_repo: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let event_repo: Arc<dyn EventQueue> = Arc::new(SqliteEventRepository::new(pool.clone()));
    let hook_repo: Arc<dyn HookRepository> = Arc::new(SqliteHookRepository::new(pool.clone()));
    let group_repo: Arc<dyn GroupRepository> = Arc::new(SqliteGroupRepository::new(pool.clone()));
    let webhook_repo: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool.clone()));
    let metrics_repo: Arc<dyn MetricsStore> = Arc::new(SqliteMetricsRepository::new(pool.clone()));

    let registry = Arc::new(RegistryService::new(
        Arc::clone(&agent_repo),
        config.registry.staleness_threshold(),
    ));

    let events = EventService::new(Arc::clone(&event_repo));
    let recovered = events
        .recover_stuck_on_startup(config.event_queue.recovery_timeout())
        .await
        .context("failed to recover stuck events at startup")?;
    tracing::info!(recovered, "startup event recovery complete");

    let agent_dialer = AgentClientDialer {
        connect_timeout: config.connection_pool.to_pool_config().dial_timeout,
    };
    let connection_pool: Arc<ConnectionPool<Channel, AgentClientDialer>> =
        Arc::new(ConnectionPool::new(config.connection_pool.to_pool_config(), agent_dialer));
    let breakers = Arc::new(CircuitBreakerManager::new(config.circuit_breaker.to_circuit_breaker_config()));

    let pool_sweep_token = CancellationToken::new();
    let pool_sweep_handle = tokio::spawn({
        let pool = Arc::clone(&connection_pool);
        let token = pool_sweep_token.clone();
        async move { pool.run_sweep_loop(token).await }
    });

    let buffered_metrics = BufferedMetricsStore::new(
        metrics_repo,
        config.metrics_store.batch_size,
        config.metrics_store.flush_interval(),
    );

    let telemetry_client = Arc::new(GrpcTelemetryClient::new(Arc::clone(&connection_pool), Arc::clone(&breakers)));
    let collector = MetricsCollector::new(
        Arc::clone(&registry),
        telemetry_client,
        Arc::clone(&buffered_metrics),
        config.metrics_collector.interval(),
        config.metrics_collector.per_agent_timeout(),
        config.metrics_collector.batch_concurrency,
        config.metrics_store.retention_days,
        config.metrics_store.cleanup_period(),
    );
    collector.start().await;

    let hook_dispatcher = Arc::new(HookDispatcher::new(
        Arc::clone(&event_repo),
        Arc::clone(&hook_repo),
        config.hook_dispatcher.batch_size,
        config.hook_dispatcher.execution_timeout(),
        config.hook_dispatcher.stack_filter.clone(),
    ));
    let dispatch_token = CancellationToken::new();
    let dispatch_handle = tokio::spawn({
        let dispatcher = Arc::clone(&hook_dispatcher);
        let token = dispatch_token.clone();
        let tick = config.hook_dispatcher.tick();
        async move { dispatcher.run_loop(tick, token).await }
    });

    let bulk_executor = Arc::new(GrpcBulkExecutor::new(Arc::clone(&connection_pool), Arc::clone(&breakers)));
    let orchestrator = Arc::new(GroupOrchestrator::new(
        Arc::clone(&group_repo),
        Arc::clone(&agent_repo),
        Arc::clone(&webhook_repo),
        bulk_executor,
        chrono::Duration::from_std(config.registry.staleness_threshold()).unwrap_or_else(|_| chrono::Duration::minutes(5)),
        config.group_orchestrator.bulk_operation_concurrency,
    ));
    let auto_discovery_token = CancellationToken::new();
    let auto_discovery_handle = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let token = auto_discovery_token.clone();
        let tick = config.group_orchestrator.auto_discovery_tick();
        async move { orchestrator.run_auto_discovery_loop(tick, token).await }
    });

    let _watchers = Arc::new(WatcherFacade::new(
        Arc::clone(&agent_repo),
        Arc::clone(&connection_pool),
        Arc::clone(&breakers),
        config.group_orchestrator.webhook_delivery_timeout(),
    ));

    let fleet_service = FleetServiceImpl::new(Arc::clone(&agent_repo), Arc::clone(&event_repo));
    let addr = config
        .grpc
        .bind_address
        .parse()
        .context("invalid grpc.bind_address")?;

    tracing::info!(%addr, "serving FleetService");
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };

    Server::builder()
        .add_service(FleetServiceServer::new(fleet_service))
        .serve_with_shutdown(addr, shutdown)
        .await
        .context("gRPC server error")?;

    tracing::info!("shutting down fleetd");
    collector.stop().await;
    dispatch_token.cancel();
    let _ = dispatch_handle.await;
    auto_discovery_token.cancel();
    let _ = auto_discovery_handle.await;
    log_cleanup_token.cancel();
    if let Some(handle) = log_cleanup_handle {
        let _ = handle.await;
    }
    pool_sweep_token.cancel();
    let _ = pool_sweep_handle.await;
    connection_pool.close_all().await;
    buffered_metrics.close().await.context("failed to flush buffered metrics on shutdown")?;

    Ok(())
}
