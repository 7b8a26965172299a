use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::room::model::{GameMap, PlayerRole};
use crate::sandbox::harness::Language;

/// Ephemeral per-invocation working directory.
///
/// Layout:
/// ```text
/// <work_dir>/<match_id>/
///   data/map.json          judge map I/O
///   players/p1/<source>    harnessed player sources
///   players/p2/<source>
/// ```
///
/// The directory is removed on every exit path: `cleanup()` is the normal
/// route, and `Drop` removes it best-effort if the owner bailed early.
pub struct MatchWorkspace {
    root: PathBuf,
    cleaned: bool,
}

impl MatchWorkspace {
    pub async fn create(work_dir: &Path, invocation_id: &str) -> Result<Self> {
        let root = work_dir.join(invocation_id);

        tokio::fs::create_dir_all(root.join("data"))
            .await
            .with_context(|| format!("creating data dir under {}", root.display()))?;
        tokio::fs::create_dir_all(root.join("players"))
            .await
            .with_context(|| format!("creating players dir under {}", root.display()))?;

        debug!(root = %root.display(), "sandbox workspace created");
        Ok(Self {
            root,
            cleaned: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn players_dir(&self) -> PathBuf {
        self.root.join("players")
    }

    pub async fn write_map(&self, map: &GameMap) -> Result<()> {
        let bytes = serde_json::to_vec(map).context("encoding map blob")?;
        tokio::fs::write(self.data_dir().join("map.json"), bytes)
            .await
            .context("writing map.json")?;
        Ok(())
    }

    /// Writes an already-harnessed source under `players/<role>/`.
    pub async fn write_player_source(
        &self,
        role: PlayerRole,
        language: Language,
        full_source: &str,
    ) -> Result<()> {
        let dir = self.players_dir().join(role.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {} source dir", role.as_str()))?;

        let file = dir.join(language.source_file_name(role));
        tokio::fs::write(&file, full_source)
            .await
            .with_context(|| format!("writing {}", file.display()))?;
        Ok(())
    }

    /// Removes the workspace. Consumes self so a cleaned workspace cannot
    /// be invoked against.
    pub async fn cleanup(mut self) {
        self.cleaned = true;
        if let Err(e) = tokio::fs::remove_dir_all(&self.root).await {
            warn!(root = %self.root.display(), error = %e, "failed to remove sandbox workspace");
        }
    }
}

impl Drop for MatchWorkspace {
    fn drop(&mut self) {
        if !self.cleaned {
            // Early-bail path; blocking removal is acceptable for a small tree.
            if let Err(e) = std::fs::remove_dir_all(&self.root) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(root = %self.root.display(), error = %e, "leaked sandbox workspace");
                }
            }
        }
    }
}
