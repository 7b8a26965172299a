//! Sandboxed judge execution.
//!
//! The judge is an external, isolated process consumed purely through its
//! process/IO contract: positional `<game_variant> <phase>` arguments, two
//! mounted directories (`data` for map I/O, `players` for sources), and
//! one structured result block on its combined output stream. Everything
//! here is about invoking it safely: scoped per-match workspaces, a hard
//! wall-clock limit, and judge failures surfaced as recoverable values.

pub mod dispatcher;
pub mod harness;
pub mod runner;
pub mod workspace;

pub use dispatcher::{RunDispatcher, RunRequest};
pub use harness::{HarnessTemplater, Language};
pub use runner::{JudgeConfig, JudgePhase, SandboxRunner};
pub use workspace::MatchWorkspace;
