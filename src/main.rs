use std::sync::Arc;

use taskforge::agent::{AgentTree, ChildConfig, HostCapabilities};
use taskforge::api::{TaskService, api_routes};
use taskforge::config::Config;
use taskforge::executor::{AnthropicExecutor, Dispatcher, EchoExecutor, Executor};
use taskforge::store::{JobStore, LibSqlJobStore};
use taskforge::worker::{Scheduler, spawn_scheduler};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Console logging, plus a daily-rolling file when `TASKFORGE_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("TASKFORGE_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "taskforge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    let Config {
        store: store_config,
        scheduler: scheduler_config,
        server: server_config,
        executor: executor_config,
        agent: agent_config,
    } = Config::from_env()?;

    eprintln!("Taskforge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Store: {}", store_config.path.display());
    eprintln!(
        "   Scheduler: every {}s",
        scheduler_config.poll_interval.as_secs()
    );
    eprintln!("   API: http://{}", server_config.bind_addr());

    // ── Store ─────────────────────────────────────────────────────────────
    let store: Arc<dyn JobStore> = Arc::new(LibSqlJobStore::new_local(&store_config.path).await?);

    // ── Executor ──────────────────────────────────────────────────────────
    let executor: Arc<dyn Executor> = match AnthropicExecutor::from_config(&executor_config) {
        Some(executor) => {
            eprintln!("   Model: {}", executor_config.model);
            Arc::new(executor)
        }
        None => {
            tracing::warn!("ANTHROPIC_API_KEY not set; using the offline echo executor");
            Arc::new(EchoExecutor)
        }
    };
    let dispatcher =
        Arc::new(Dispatcher::new(executor).with_timeout(scheduler_config.executor_timeout));
    tracing::info!(executor = dispatcher.executor_name(), "Executor ready");

    // ── Agent tree ────────────────────────────────────────────────────────
    let tree = AgentTree::new(
        &agent_config.root_name,
        ChildConfig::new(agent_config.system_prompt.clone())
            .with_capability(HostCapabilities::ASK_USER),
        Arc::clone(&dispatcher),
        Arc::new(HostCapabilities::new(agent_config.ask_user_answer.clone())),
    )?;
    let root = Arc::clone(tree.root());

    // ── Scheduler ─────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let scheduler = Arc::new(
        Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            scheduler_config.clone(),
        )
        .with_target(Arc::clone(&root)),
    );
    let scheduler_handle = spawn_scheduler(scheduler, cancel.clone());

    // ── HTTP ──────────────────────────────────────────────────────────────
    let service = Arc::new(TaskService::new(store, dispatcher).with_target(root));
    let app = api_routes(Arc::clone(&service));
    let listener = tokio::net::TcpListener::bind(server_config.bind_addr()).await?;
    tracing::info!(addr = %server_config.bind_addr(), "API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    cancel.cancel();
    service.shutdown(scheduler_config.shutdown_grace).await;
    if let Err(e) = scheduler_handle.await {
        tracing::error!("Scheduler task ended abnormally: {e}");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
