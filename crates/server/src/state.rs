use std::sync::Arc;

use platewatch_core::{Config, JobManager, LookupPipeline, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    pipeline: Arc<LookupPipeline>,
    jobs: Arc<JobManager>,
}

impl AppState {
    pub fn new(config: Config, pipeline: Arc<LookupPipeline>, jobs: Arc<JobManager>) -> Self {
        Self {
            config,
            pipeline,
            jobs,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn pipeline(&self) -> &LookupPipeline {
        &self.pipeline
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }
}
