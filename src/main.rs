use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_appender::non_blocking::WorkerGuard;

use dm_autopilot::admin::{AdminState, admin_routes};
use dm_autopilot::channels::{GraphSender, MessageSender};
use dm_autopilot::config::AppConfig;
use dm_autopilot::llm::create_provider;
use dm_autopilot::pipeline::rules::RulesEngine;
use dm_autopilot::pipeline::{
    ClassificationPipeline, DraftModel, Job, LlmDraftModel, ManualSender, MessageProcessor,
    PolicyEngine,
};
use dm_autopilot::store::{Database, LibSqlBackend};
use dm_autopilot::webhook::{WebhookState, webhook_routes};
use dm_autopilot::worker::JobQueue;

/// Initialize tracing. Logs go to a daily rolling file when a log directory
/// is configured, stderr otherwise. The guard must live until shutdown.
fn init_tracing(config: &AppConfig) -> WorkerGuard {
    let (writer, guard) = match &config.log_dir {
        Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
            dir,
            "dm-autopilot.log",
        )),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(config.log_dir.is_none())
        .with_writer(writer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config);

    eprintln!("📬 DM Autopilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook/{{platform}}", config.port);
    eprintln!("   Admin API: http://0.0.0.0:{}/api", config.port);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Classification ───────────────────────────────────────────────────
    let model: Option<Arc<dyn DraftModel>> = match &config.llm {
        Some(llm_config) => {
            let llm = create_provider(llm_config).context("Failed to create LLM provider")?;
            eprintln!("   Model: {}", llm.model_name());
            Some(Arc::new(LlmDraftModel::new(llm)) as Arc<dyn DraftModel>)
        }
        None => {
            eprintln!("   Model: none (keyword rules + fallback draft only)");
            None
        }
    };
    let classifier = Arc::new(ClassificationPipeline::new(RulesEngine::default_rules(), model));

    // ── Delivery + processing ────────────────────────────────────────────
    let sender: Arc<dyn MessageSender> = Arc::new(GraphSender::new(&config.graph));
    let processor = Arc::new(MessageProcessor::new(
        Arc::clone(&db),
        classifier,
        Arc::clone(&sender),
        config.processor.clone(),
    ));

    let queue: JobQueue<Job> = JobQueue::new(config.queue_concurrency);
    queue.on_error(|e, job: &Job| {
        tracing::error!(
            message_id = %job.message_id,
            sender_id = %job.sender_id,
            error = %e,
            "Job abandoned"
        );
    });
    queue.start(processor);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let webhook_router = webhook_routes(WebhookState {
        queue: queue.clone(),
        app_secret: config.webhook.app_secret.clone(),
        verify_token: config.webhook.verify_token.clone(),
    });
    let admin_router = admin_routes(AdminState {
        db: Arc::clone(&db),
        policy: Arc::new(PolicyEngine::new(Arc::clone(&db))),
        manual: Arc::new(ManualSender::new(
            Arc::clone(&db),
            sender,
            config.processor.business_account_id.clone(),
        )),
        queue: queue.clone(),
    });

    let app = Router::new().merge(webhook_router).merge(admin_router).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(
        port = config.port,
        concurrency = config.queue_concurrency,
        "DM Autopilot listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // The queue is in-memory: anything not yet processed is lost.
    let pending = queue.pending();
    let in_flight = queue.in_flight();
    if pending > 0 || in_flight > 0 {
        tracing::warn!(pending, in_flight, "Shutting down with unprocessed jobs");
    }
    tracing::info!("DM Autopilot stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
