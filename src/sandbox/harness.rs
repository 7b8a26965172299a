use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::room::model::PlayerRole;

/// Languages the judge image can compile and run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    C,
    Cpp,
    Javascript,
}

impl Language {
    /// Lenient parse of client-supplied language tags.
    pub fn parse(s: &str) -> Option<Language> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Some(Language::Python),
            "java" => Some(Language::Java),
            "c" => Some(Language::C),
            "cpp" => Some(Language::Cpp),
            "javascript" | "node" | "nodejs" => Some(Language::Javascript),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Javascript => "javascript",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Language::Python => ".py",
            Language::Java => ".java",
            Language::C => ".c",
            Language::Cpp => ".cpp",
            Language::Javascript => ".js",
        }
    }

    /// File name the judge expects for a player source.
    /// Java compiles from a fixed class name; everything else is named
    /// after the role.
    pub fn source_file_name(self, role: PlayerRole) -> String {
        match self {
            Language::Java => "Main.java".to_string(),
            other => format!("{}{}", role.as_str(), other.extension()),
        }
    }
}

/// Per-language harness templating, an external collaborator.
///
/// Implementations wrap a raw submission into the full source the judge
/// runs (stdin/stdout plumbing, entry point, etc.). The orchestration
/// layer only needs the contract `(language, source) -> full source`.
#[async_trait]
pub trait HarnessTemplater: Send + Sync {
    async fn render(&self, language: Language, source: &str) -> anyhow::Result<String>;
}
