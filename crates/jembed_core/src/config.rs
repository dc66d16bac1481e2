//! Engine configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options passed to an engine when a runtime instance is started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start without GUI support
    pub headless: bool,
    /// Extra class path entries (JVM engine)
    pub class_path: Vec<PathBuf>,
    /// Raw JVM options such as `-Xmx256m`
    pub jvm_options: Vec<String>,
    /// Script engine name looked up inside the runtime
    pub script_engine: String,
    /// Print each headless evaluation result to stdout
    pub echo_result: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            class_path: Vec::new(),
            jvm_options: Vec::new(),
            script_engine: "javascript".to_string(),
            echo_result: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// `-Djava.class.path=...` when class path entries are configured.
    pub fn class_path_option(&self) -> Option<String> {
        if self.class_path.is_empty() {
            return None;
        }
        let separator = if cfg!(windows) { ";" } else { ":" };
        let joined = self
            .class_path
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(separator);
        Some(format!("-Djava.class.path={joined}"))
    }

    /// Full option list for booting a JVM.
    pub fn jvm_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.jvm_options.len() + 2);
        args.extend(self.class_path_option());
        if self.headless {
            args.push("-Djava.awt.headless=true".to_string());
        }
        args.extend(self.jvm_options.iter().cloned());
        args
    }
}
