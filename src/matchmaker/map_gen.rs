use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::room::model::GameMap;
use crate::sandbox::runner::SandboxRunner;

/// Produces a fresh map for a new match.
///
/// Generation is fallible and occasionally yields degenerate maps; the
/// matcher applies a bounded retry budget and validates playability on
/// top of this contract.
#[async_trait]
pub trait MapGenerator: Send + Sync {
    async fn generate(&self, game_type: &str) -> Result<GameMap>;
}

/// Production generator: the judge's `init` phase in a throwaway
/// workspace.
pub struct JudgeMapGenerator {
    runner: Arc<SandboxRunner>,
}

impl JudgeMapGenerator {
    pub fn new(runner: Arc<SandboxRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl MapGenerator for JudgeMapGenerator {
    async fn generate(&self, game_type: &str) -> Result<GameMap> {
        Ok(self.runner.generate_map(game_type).await?)
    }
}
