//! Aggregate runtime configuration: the environment/config surface enumerated
//! in the external interfaces contract, loaded from YAML with environment
//! variable overrides in the same style as the rest of the stack's configs.

use crate::llm_router::{LlmRouterConfig, ProviderKind, TaskKind};
use crate::translation_batcher::TranslationBatcherConfig;
use pipeline_core::{RetryPolicy, ResourceGateConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Location of checkpoints and per-run temp directories.
    pub state_root: PathBuf,

    #[serde(default)]
    pub llm: LlmConfigSection,

    #[serde(default)]
    pub resource: ResourceConfigSection,

    #[serde(default)]
    pub translation: TranslationConfigSection,

    #[serde(default)]
    pub stage: StageConfigSection,

    #[serde(default)]
    pub checkpoint: CheckpointConfigSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfigSection {
    #[serde(default = "default_routing")]
    pub routing: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default = "default_rpm")]
    pub rpm: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
}

impl Default for LlmConfigSection {
    fn default() -> Self {
        Self {
            routing: default_routing(),
            fallback_enabled: true,
            rpm: default_rpm(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

fn default_routing() -> HashMap<String, String> {
    [
        ("highlight_detection", "local"),
        ("chapter_detection", "local"),
        ("translation", "remote"),
        ("title_generation", "local"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_rpm() -> u32 {
    60
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> usize {
    2048
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfigSection {
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: f32,
    #[serde(default = "default_max_memory_percent")]
    pub max_memory_percent: f32,
    #[serde(default = "default_max_gpu_percent")]
    pub max_gpu_percent: f32,
    #[serde(default = "default_max_parallel_exports")]
    pub max_parallel_exports: usize,
    #[serde(default = "default_max_parallel_encodes")]
    pub max_parallel_encodes: usize,
}

impl Default for ResourceConfigSection {
    fn default() -> Self {
        Self {
            max_cpu_percent: default_max_cpu_percent(),
            max_memory_percent: default_max_memory_percent(),
            max_gpu_percent: default_max_gpu_percent(),
            max_parallel_exports: default_max_parallel_exports(),
            max_parallel_encodes: default_max_parallel_encodes(),
        }
    }
}

fn default_max_cpu_percent() -> f32 {
    80.0
}
fn default_max_memory_percent() -> f32 {
    70.0
}
fn default_max_gpu_percent() -> f32 {
    90.0
}
fn default_max_parallel_exports() -> usize {
    2
}
fn default_max_parallel_encodes() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfigSection {
    #[serde(default = "default_max_tokens_per_request")]
    pub max_tokens_per_request: usize,
    #[serde(default = "default_overlap_segments")]
    pub overlap_segments: usize,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
}

impl Default for TranslationConfigSection {
    fn default() -> Self {
        Self {
            max_tokens_per_request: default_max_tokens_per_request(),
            overlap_segments: default_overlap_segments(),
            min_success_rate: default_min_success_rate(),
        }
    }
}

fn default_max_tokens_per_request() -> usize {
    4000
}
fn default_overlap_segments() -> usize {
    2
}
fn default_min_success_rate() -> f64 {
    0.90
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfigSection {
    #[serde(default = "default_retry_budget")]
    pub retry_budget: usize,
    #[serde(default = "default_stage_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StageConfigSection {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            timeout_secs: default_stage_timeout_secs(),
        }
    }
}

fn default_retry_budget() -> usize {
    3
}
fn default_stage_timeout_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfigSection {
    #[serde(default = "default_true")]
    pub cleanup_on_success: bool,
}

impl Default for CheckpointConfigSection {
    fn default() -> Self {
        Self {
            cleanup_on_success: true,
        }
    }
}

impl PipelineConfig {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
            llm: LlmConfigSection::default(),
            resource: ResourceConfigSection::default(),
            translation: TranslationConfigSection::default(),
            stage: StageConfigSection::default(),
            checkpoint: CheckpointConfigSection::default(),
        }
    }

    /// Loads configuration from a YAML file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from a YAML file, then applies `PIPELINE_*` environment
    /// variable overrides for the keys that commonly need per-deployment
    /// tuning.
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("PIPELINE_STATE_ROOT") {
            self.state_root = PathBuf::from(root);
        }
        if let Ok(rpm) = std::env::var("PIPELINE_LLM_RPM") {
            if let Ok(parsed) = rpm.parse() {
                self.llm.rpm = parsed;
            }
        }
        if let Ok(fallback) = std::env::var("PIPELINE_LLM_FALLBACK_ENABLED") {
            if let Ok(parsed) = fallback.parse() {
                self.llm.fallback_enabled = parsed;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.llm.rpm == 0 {
            return Err(ConfigError::Invalid("llm.rpm must be positive".into()));
        }
        if self.translation.min_success_rate < 0.0 || self.translation.min_success_rate > 1.0 {
            return Err(ConfigError::Invalid(
                "translation.min_success_rate must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn resource_gate_config(&self) -> ResourceGateConfig {
        ResourceGateConfig {
            max_cpu_percent: self.resource.max_cpu_percent,
            max_memory_percent: self.resource.max_memory_percent,
            max_gpu_percent: self.resource.max_gpu_percent,
            max_parallel_exports: self.resource.max_parallel_exports,
            max_parallel_encodes: self.resource.max_parallel_encodes,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn translation_batcher_config(&self) -> TranslationBatcherConfig {
        TranslationBatcherConfig {
            max_tokens_per_request: self.translation.max_tokens_per_request,
            overlap_segments: self.translation.overlap_segments,
            min_success_rate: self.translation.min_success_rate,
            ..TranslationBatcherConfig::default()
        }
    }

    pub fn llm_router_config(&self) -> LlmRouterConfig {
        let mut routing = HashMap::new();
        for (task_name, provider_name) in &self.llm.routing {
            if let (Some(task), Some(provider)) = (parse_task_kind(task_name), parse_provider_kind(provider_name)) {
                routing.insert(task, provider);
            }
        }
        LlmRouterConfig {
            routing,
            fallback_enabled: self.llm.fallback_enabled,
            rpm: self.llm.rpm,
            temperature: self.llm.temperature,
            retry_policy: RetryPolicy::new(self.stage.retry_budget),
        }
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage.timeout_secs)
    }
}

fn parse_task_kind(name: &str) -> Option<TaskKind> {
    match name {
        "highlight_detection" => Some(TaskKind::HighlightDetection),
        "chapter_detection" => Some(TaskKind::ChapterDetection),
        "translation" => Some(TaskKind::Translation),
        "title_generation" => Some(TaskKind::TitleGeneration),
        _ => None,
    }
}

fn parse_provider_kind(name: &str) -> Option<ProviderKind> {
    match name {
        "local" => Some(ProviderKind::Local),
        "remote" => Some(ProviderKind::Remote),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_surface() {
        let config = PipelineConfig::new("/tmp/pipeline-state");
        assert_eq!(config.llm.rpm, 60);
        assert_eq!(config.resource.max_parallel_exports, 2);
        assert_eq!(config.translation.max_tokens_per_request, 4000);
        assert_eq!(config.stage.retry_budget, 3);
        assert!(config.checkpoint.cleanup_on_success);
    }

    #[test]
    fn rejects_zero_rpm() {
        let mut config = PipelineConfig::new("/tmp/pipeline-state");
        config.llm.rpm = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn routing_table_parses_into_task_kinds() {
        let config = PipelineConfig::new("/tmp/pipeline-state");
        let router_config = config.llm_router_config();
        assert_eq!(
            router_config.routing.get(&TaskKind::Translation),
            Some(&ProviderKind::Remote)
        );
    }
}
