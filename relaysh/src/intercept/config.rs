//! Interception settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::engine::DEFAULT_SETTLE_DELAY;
use crate::channel::DEFAULT_MAX_LINE;

/// Settings for the interactive session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Local directory downloads land in, also substituted for a remote `~`.
    pub work_dir: PathBuf,

    /// How long to wait after a transfer before draining stale output.
    pub settle_delay: Duration,

    /// Longest line the line buffer assembles.
    pub max_line: usize,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./"),
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_line: DEFAULT_MAX_LINE,
        }
    }
}
