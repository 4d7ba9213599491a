//! TOML run configuration.
//!
//! ```toml
//! [model]
//! model_id = "gpt-4o-mini"
//!
//! [batch]
//! columns = ["reply"]
//! mode = "multi"          # or "single"
//! max_concurrent = 10
//! samples = 1
//! failure_policy = "exclude"  # or "substitute"
//!
//! [[guidelines]]
//! title = "Greeting"
//! instruction = "Thank the reviewer by name."
//! ```
//!
//! The API key is never read from this file.

use std::path::Path;

use replyguide_llm::ModelConfig;
use serde::{Deserialize, Serialize};

use crate::batch::{BatchConfig, FailurePolicy};
use crate::error::{EvalError, Result};
use crate::guideline::GuidelineSet;
use crate::metric::ScoreBatching;

pub const DEFAULT_MODEL_ID: &str = "gpt-4o-mini";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSection {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Overrides the per-mode output token cap.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            base_url: None,
            max_tokens: None,
        }
    }
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSection {
    pub columns: Vec<String>,
    pub mode: ScoreBatching,
    pub max_concurrent: usize,
    pub samples: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for BatchSection {
    fn default() -> Self {
        let defaults = BatchConfig::default();
        Self {
            columns: Vec::new(),
            mode: ScoreBatching::default(),
            max_concurrent: defaults.max_concurrent,
            samples: defaults.samples,
            failure_policy: defaults.failure_policy,
        }
    }
}

impl BatchSection {
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_concurrent: self.max_concurrent,
            samples: self.samples,
            failure_policy: self.failure_policy,
        }
    }
}

/// A complete scoring run: model, batch settings and guidelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub batch: BatchSection,
    pub guidelines: GuidelineSet,
}

impl RunConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Checks that parsing alone cannot express. Columns may still be
    /// empty here; they can be supplied at run time.
    pub fn validate(&self) -> Result<()> {
        if self.model.model_id.trim().is_empty() {
            return Err(EvalError::InvalidConfig("model_id is empty".to_string()));
        }
        if self.model.max_tokens == Some(0) {
            return Err(EvalError::InvalidConfig(
                "max_tokens must be at least 1".to_string(),
            ));
        }
        self.batch.batch_config().validate()
    }

    /// Client configuration for this run with the given key.
    pub fn model_config(&self, api_key: impl Into<String>) -> ModelConfig {
        let config = ModelConfig::new(api_key, self.model.model_id.clone());
        match &self.model.base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }
}
