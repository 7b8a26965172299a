//! Judge process invocation.
//!
//! Contract:
//! - one invocation = one spawned judge process, phase-selected by
//!   positional arguments: `init` (produce a fresh map), `compile`
//!   (build/syntax check only), `run` (execute a full match);
//! - the workspace `data/` and `players/` directories are bind-mounted
//!   into the judge image;
//! - the judge reports one structured JSON block on its output stream;
//!   the caller captures everything, awaits exit, and parses;
//! - a non-zero exit, empty or unparsable output is a `SandboxError`
//!   value, never a fault;
//! - every invocation runs under a hard wall-clock limit with forced
//!   termination on expiry. A submitted program cannot hang a match.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::SandboxError;
use crate::room::model::{GameMap, MatchResult, MatchRoom, PlayerRole};
use crate::sandbox::harness::{HarnessTemplater, Language};
use crate::sandbox::workspace::MatchWorkspace;

/// Mount points the judge image expects.
pub const DATA_MOUNT: &str = "/app/data";
pub const PLAYERS_MOUNT: &str = "/app/players";

/// Cap on judge output carried inside error values.
const MAX_ERROR_OUTPUT: usize = 4_000;

#[derive(Clone, Copy, Debug)]
pub enum JudgePhase {
    Init,
    Compile,
    Run,
}

impl JudgePhase {
    pub fn as_arg(self) -> &'static str {
        match self {
            JudgePhase::Init => "init",
            JudgePhase::Compile => "compile",
            JudgePhase::Run => "run",
        }
    }
}

/// How to launch the judge.
///
/// With `image` set this builds a container invocation with the two
/// workspace mounts; with `image = None` the program is launched directly
/// (used by tests with scripted judges).
#[derive(Clone, Debug)]
pub struct JudgeConfig {
    pub program: String,
    pub base_args: Vec<String>,
    pub image: Option<String>,
    pub entrypoint: Vec<String>,
    pub timeout: Duration,
}

impl JudgeConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        Self {
            program: cfg.judge_program.clone(),
            base_args: cfg.judge_base_args.clone(),
            image: cfg.judge_image.clone(),
            entrypoint: cfg.judge_entrypoint.clone(),
            timeout: Duration::from_secs(cfg.sandbox_timeout_secs),
        }
    }
}

pub struct SandboxRunner {
    judge: JudgeConfig,
    harness: Arc<dyn HarnessTemplater>,
    work_dir: PathBuf,
}

impl SandboxRunner {
    pub fn new(judge: JudgeConfig, harness: Arc<dyn HarnessTemplater>, work_dir: PathBuf) -> Self {
        Self {
            judge,
            harness,
            work_dir,
        }
    }

    /// Judge `init` phase: produce a fresh map in a throwaway workspace.
    #[instrument(skip(self), target = "sandbox")]
    pub async fn generate_map(&self, game_type: &str) -> Result<GameMap, SandboxError> {
        let invocation_id = format!("mapgen-{}", Uuid::new_v4());
        let ws = MatchWorkspace::create(&self.work_dir, &invocation_id)
            .await
            .map_err(SandboxError::Workspace)?;

        let outcome = self.invoke(&ws, game_type, JudgePhase::Init).await;
        ws.cleanup().await;

        parse_block(&outcome?)
    }

    /// Judge `compile` phase: build-check a single submission.
    ///
    /// The judge's verdict block is passed through opaquely; only the
    /// process contract is interpreted here.
    #[instrument(skip(self, code), target = "sandbox")]
    pub async fn compile_check(
        &self,
        game_type: &str,
        code: &str,
        language: Language,
    ) -> Result<serde_json::Value, SandboxError> {
        let invocation_id = format!("compile-{}", Uuid::new_v4());
        let ws = MatchWorkspace::create(&self.work_dir, &invocation_id)
            .await
            .map_err(SandboxError::Workspace)?;

        let outcome = async {
            let full = self
                .harness
                .render(language, code)
                .await
                .map_err(SandboxError::Workspace)?;
            ws.write_player_source(PlayerRole::P1, language, &full)
                .await
                .map_err(SandboxError::Workspace)?;
            self.invoke(&ws, game_type, JudgePhase::Compile).await
        }
        .await;
        ws.cleanup().await;

        parse_block(&outcome?)
    }

    /// Judge `run` phase: execute a full match for a claimed room.
    #[instrument(skip(self, room), target = "sandbox", fields(match_id = %room.match_id))]
    pub async fn run_match(&self, room: &MatchRoom) -> Result<MatchResult, SandboxError> {
        let ws = MatchWorkspace::create(&self.work_dir, &room.match_id)
            .await
            .map_err(SandboxError::Workspace)?;

        let outcome = async {
            self.stage_inputs(&ws, room)
                .await
                .map_err(SandboxError::Workspace)?;
            self.invoke(&ws, &room.game_type, JudgePhase::Run).await
        }
        .await;
        ws.cleanup().await;

        parse_block(&outcome?)
    }

    /// Writes the map and both harnessed player sources into the workspace.
    async fn stage_inputs(&self, ws: &MatchWorkspace, room: &MatchRoom) -> anyhow::Result<()> {
        ws.write_map(&room.map).await?;

        for role in [PlayerRole::P1, PlayerRole::P2] {
            let slot = room.slot(role);
            let (code, language) = match (&slot.code, slot.language) {
                (Some(code), Some(language)) => (code, language),
                // A claimed room always has both; reaching this means the
                // claim gate was bypassed.
                _ => anyhow::bail!("slot {} has no submission", role.as_str()),
            };

            let full = self.harness.render(language, code).await?;
            ws.write_player_source(role, language, &full).await?;
        }
        Ok(())
    }

    fn build_command(&self, ws: &MatchWorkspace, game_variant: &str, phase: JudgePhase) -> Command {
        let mut cmd = Command::new(&self.judge.program);
        cmd.args(&self.judge.base_args);

        if let Some(image) = &self.judge.image {
            cmd.arg("-v")
                .arg(format!("{}:{DATA_MOUNT}", ws.data_dir().display()));
            cmd.arg("-v")
                .arg(format!("{}:{PLAYERS_MOUNT}", ws.players_dir().display()));
            cmd.arg(image);
        }

        cmd.args(&self.judge.entrypoint);
        cmd.arg(game_variant).arg(phase.as_arg());

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Dropping the wait future (timeout expiry) must kill the judge.
        cmd.kill_on_drop(true);
        cmd
    }

    async fn invoke(
        &self,
        ws: &MatchWorkspace,
        game_variant: &str,
        phase: JudgePhase,
    ) -> Result<String, SandboxError> {
        let mut cmd = self.build_command(ws, game_variant, phase);

        let child = cmd.spawn().map_err(SandboxError::Spawn)?;

        let started = std::time::Instant::now();
        let output = match tokio::time::timeout(self.judge.timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(SandboxError::Spawn(e)),
            Err(_) => {
                warn!(
                    limit_secs = self.judge.timeout.as_secs(),
                    phase = phase.as_arg(),
                    "judge exceeded wall-clock limit; killed"
                );
                return Err(SandboxError::Timeout {
                    limit_secs: self.judge.timeout.as_secs(),
                });
            }
        };

        // The judge emits one block on its combined stream; fold stderr in
        // so the full output travels with the verdict either way.
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        let text = text.trim().to_string();

        if !output.status.success() {
            return Err(SandboxError::JudgeFailed {
                code: output.status.code(),
                output: truncate_output(&text),
            });
        }

        debug!(
            phase = phase.as_arg(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = text.len(),
            "judge completed"
        );
        Ok(text)
    }
}

fn parse_block<T: DeserializeOwned>(text: &str) -> Result<T, SandboxError> {
    if text.is_empty() {
        return Err(SandboxError::Unparsable {
            output: "<empty output>".to_string(),
        });
    }

    serde_json::from_str(text).map_err(|_| SandboxError::Unparsable {
        output: truncate_output(text),
    })
}

fn truncate_output(s: &str) -> String {
    if s.len() > MAX_ERROR_OUTPUT {
        let cut = s
            .char_indices()
            .take_while(|(i, _)| *i < MAX_ERROR_OUTPUT)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}…", &s[..cut])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_block_reads_a_result() {
        let result: MatchResult = parse_block(
            r#"{"winner": "draw", "final_scores": {"p1": 5, "p2": 5}}"#,
        )
        .unwrap();
        assert_eq!(result.winner, crate::room::model::Winner::Draw);
    }

    #[test]
    fn parse_block_rejects_empty_and_garbage() {
        let empty = parse_block::<MatchResult>("");
        assert!(matches!(empty, Err(SandboxError::Unparsable { .. })));

        let garbage = parse_block::<MatchResult>("Traceback (most recent call last): ...");
        assert!(matches!(garbage, Err(SandboxError::Unparsable { .. })));
    }

    #[test]
    fn truncate_caps_long_output() {
        let long = "x".repeat(MAX_ERROR_OUTPUT * 2);
        let out = truncate_output(&long);
        assert!(out.len() < long.len());
        assert!(out.ends_with('…'));
    }

    #[tokio::test]
    async fn container_command_orders_mounts_image_and_phase() {
        struct NoHarness;
        #[async_trait::async_trait]
        impl HarnessTemplater for NoHarness {
            async fn render(&self, _: Language, source: &str) -> anyhow::Result<String> {
                Ok(source.to_string())
            }
        }

        let base = std::env::temp_dir().join(format!("cb-cmd-test-{}", Uuid::new_v4()));
        let ws = MatchWorkspace::create(&base, "m1").await.unwrap();

        let runner = SandboxRunner::new(
            JudgeConfig {
                program: "docker".into(),
                base_args: vec!["run".into(), "--rm".into()],
                image: Some("code-battle-engine".into()),
                entrypoint: vec!["python3".into(), "referee.py".into()],
                timeout: Duration::from_secs(5),
            },
            Arc::new(NoHarness),
            base.clone(),
        );

        let cmd = runner.build_command(&ws, "land_grab", JudgePhase::Run);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "run");
        assert_eq!(args[1], "--rm");
        assert_eq!(args[2], "-v");
        assert!(args[3].ends_with(DATA_MOUNT));
        assert_eq!(args[4], "-v");
        assert!(args[5].ends_with(PLAYERS_MOUNT));
        assert_eq!(args[6], "code-battle-engine");

        let tail: Vec<&str> = args[7..].iter().map(String::as_str).collect();
        assert_eq!(tail, vec!["python3", "referee.py", "land_grab", "run"]);

        ws.cleanup().await;
        let _ = std::fs::remove_dir_all(&base);
    }
}
