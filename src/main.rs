use std::sync::Arc;
use std::time::Duration;

use codebattle_backend::{
    archive::SqlxMatchArchive,
    config::AppConfig,
    db::Db,
    logger::init_tracing,
    matchmaker::{JudgeMapGenerator, Matcher, spawn_matcher_loops},
    metrics::counters::Counters,
    notify::ChannelNotifier,
    publish::ResultPublisher,
    queue::memory::InMemoryQueueStore,
    room::{SubmissionService, memory::InMemoryRoomStore},
    sandbox::{HarnessTemplater, JudgeConfig, Language, RunDispatcher, RunRequest, SandboxRunner},
    session::{DisconnectCoordinator, InMemorySessionRegistry},
};
use tokio::sync::mpsc;

struct PassthroughHarness;

#[async_trait::async_trait]
impl HarnessTemplater for PassthroughHarness {
    async fn render(&self, language: Language, source: &str) -> anyhow::Result<String> {
        // TODO: Replace with the per-language runner template pack
        // (stdin/stdout plumbing around the user code) once the template
        // bundle ships with the judge image.
        let _ = language;
        Ok(source.to_string())
    }
}

/// Connects the archive database and applies migrations.
async fn init_archive(cfg: &AppConfig) -> anyhow::Result<Arc<SqlxMatchArchive>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;
    Ok(Arc::new(SqlxMatchArchive::new(db.pool.clone())))
}

/// Starts the run dispatcher and returns the submission->dispatcher sender.
fn start_run_dispatcher(
    rooms: Arc<InMemoryRoomStore>,
    runner: Arc<SandboxRunner>,
    publisher: Arc<ResultPublisher>,
    counters: Counters,
    cfg: &AppConfig,
) -> mpsc::Sender<RunRequest> {
    let (run_tx, run_rx) = mpsc::channel::<RunRequest>(cfg.run_queue_capacity);

    let dispatcher = Arc::new(RunDispatcher::new(rooms, runner, publisher, counters));
    tokio::spawn(dispatcher.run(run_rx));

    run_tx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting codebattle backend...");

    let cfg = AppConfig::from_env();
    let counters = Counters::default();

    let queues = Arc::new(InMemoryQueueStore::new());
    let rooms = Arc::new(InMemoryRoomStore::new());
    let registry = Arc::new(InMemorySessionRegistry::new());
    let notifier = Arc::new(ChannelNotifier::default());

    let archive = init_archive(&cfg).await?;

    let runner = Arc::new(SandboxRunner::new(
        JudgeConfig::from_app(&cfg),
        Arc::new(PassthroughHarness),
        cfg.work_dir.clone(),
    ));

    let publisher = Arc::new(ResultPublisher::new(
        rooms.clone(),
        registry.clone(),
        notifier.clone(),
        archive,
        counters.clone(),
    ));

    let run_tx = start_run_dispatcher(
        rooms.clone(),
        runner.clone(),
        publisher.clone(),
        counters.clone(),
        &cfg,
    );

    let matcher = Arc::new(Matcher::new(
        queues.clone(),
        rooms.clone(),
        registry.clone(),
        Arc::new(JudgeMapGenerator::new(runner)),
        notifier.clone(),
        cfg.map_gen_attempts,
        counters.clone(),
    ));

    let _matcher_loops = spawn_matcher_loops(
        matcher,
        cfg.game_types.clone(),
        Duration::from_millis(cfg.matcher_tick_ms),
    );

    // Surfaces the transport adapter (out of scope here) drives: code
    // submissions in, disconnect events in.
    let _submissions = SubmissionService::new(
        rooms.clone(),
        notifier.clone(),
        run_tx,
        counters.clone(),
    );
    let _disconnects = DisconnectCoordinator::new(
        registry,
        queues,
        rooms,
        publisher,
        cfg.game_types.clone(),
        counters,
    );

    tracing::info!(game_types = ?cfg.game_types, "matchmaking loops running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    Ok(())
}
