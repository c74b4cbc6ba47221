use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::FrameworkConfig;
use crate::report::ArtifactLayout;

pub struct CliContext {
    config: Arc<FrameworkConfig>,
    config_path: PathBuf,
}

impl CliContext {
    pub fn new(config: FrameworkConfig, config_path: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn config(&self) -> &FrameworkConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Artifact layout; per-device directories only when devices run in parallel.
    pub fn artifacts(&self, parallel: bool) -> ArtifactLayout {
        ArtifactLayout::new(self.config.core.artifacts_root.clone(), parallel)
    }
}
