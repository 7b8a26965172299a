use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string for the match archive.
    pub database_url: String,

    // =========================
    // Matchmaking configuration
    // =========================
    /// Game types that get their own matchmaking loop.
    ///
    /// Each entry owns an independent waiting queue and tick task; queues
    /// for different game types never interact.
    pub game_types: Vec<String>,

    /// Period of the matchmaking tick, per game type.
    ///
    /// Ticks for the same game type are strictly sequential: a tick must
    /// finish before the next one for that game type starts.
    pub matcher_tick_ms: u64,

    /// How many times map generation may be attempted per pairing before
    /// the pairing is abandoned and both players are returned to the queue
    /// at their original positions.
    pub map_gen_attempts: u32,

    // =========================
    // Execution configuration
    // =========================
    /// Capacity of the async channel between the run trigger and the
    /// sandbox dispatcher.
    ///
    /// Acts as backpressure: if judge invocations pile up, submission
    /// handling naturally slows instead of growing memory unboundedly.
    pub run_queue_capacity: usize,

    /// Root directory for per-match sandbox workspaces.
    ///
    /// Each invocation gets `<work_dir>/<match_id>` with `data/` and
    /// `players/` subtrees, removed when the invocation ends.
    pub work_dir: PathBuf,

    /// Program used to launch the judge (normally a container runtime).
    pub judge_program: String,

    /// Arguments placed before the mount flags (e.g. `run --rm`).
    pub judge_base_args: Vec<String>,

    /// Container image holding the judge. When set, the workspace `data/`
    /// and `players/` directories are bind-mounted into it.
    pub judge_image: Option<String>,

    /// Command executed inside the judge environment, before the
    /// positional `<game_variant> <phase>` arguments.
    pub judge_entrypoint: Vec<String>,

    /// Hard wall-clock limit for one judge invocation. On expiry the
    /// process is killed and the invocation reports a sandbox error.
    /// A submitted program must never be able to hang a match.
    pub sandbox_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://codebattle_dev.db".to_string());

        let judge_image = std::env::var("JUDGE_IMAGE")
            .ok()
            .or_else(|| Some("code-battle-engine".to_string()));

        Self {
            database_url,

            game_types: vec!["land_grab".to_string()],
            matcher_tick_ms: 1_000,
            map_gen_attempts: 3,

            run_queue_capacity: 256,
            work_dir: PathBuf::from("temp"),
            judge_program: "docker".to_string(),
            judge_base_args: vec!["run".to_string(), "--rm".to_string()],
            judge_image,
            judge_entrypoint: vec!["python3".to_string(), "referee.py".to_string()],
            sandbox_timeout_secs: 60,
        }
    }
}
