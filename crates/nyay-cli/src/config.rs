use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use nyay_providers::{DEFAULT_EMBEDDING_MODEL, GROQ_BASE_URL, GROQ_DEFAULT_MODEL};

const PROJECT_CONFIG: &str = "nyay.toml";
const ENV_PREFIX: &str = "NYAY_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub web: WebConfig,

    #[serde(default)]
    pub agent: AgentSection,

    /// Log level used when neither --log-level nor --debug is given
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Chat-completions endpoint (Groq by default)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Embeddings endpoint used to vectorise queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Path to the section index JSON (supports $HOME, ~)
    #[serde(default)]
    pub index_path: Option<String>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            top_k: default_top_k(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_web_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_web_results")]
    pub max_results: usize,

    /// Domains trusted in addition to the built-in whitelist
    #[serde(default)]
    pub extra_domains: Vec<String>,

    /// Let `explain` consult the web when retrieval scores are low
    #[serde(default)]
    pub supplement_explanations: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_web_timeout(),
            max_results: default_web_results(),
            extra_domains: Vec::new(),
            supplement_explanations: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_llm_base_url() -> String {
    GROQ_BASE_URL.to_string()
}

fn default_llm_model() -> String {
    GROQ_DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_embedding_base_url() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_confidence_threshold() -> f32 {
    0.60
}

fn default_web_timeout() -> u64 {
    10
}

fn default_web_results() -> usize {
    3
}

fn default_max_iterations() -> usize {
    5
}

/// Expand `~`, `$VAR` and `${VAR}` in a path string
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = result.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            result = home.join(rest).display().to_string();
        }
    }

    let Ok(re) = regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") else {
        return PathBuf::from(result);
    };
    let expanded = re.replace_all(&result, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.into_owned())
}

impl Config {
    /// Load configuration from every source.
    ///
    /// Priority (highest to lowest):
    /// 1. `NYAY_*` environment variables (`NYAY_LLM__MODEL` sets `llm.model`)
    /// 2. `GROQ_API_KEY` / `GROQ_MODEL`
    /// 3. Explicit `--config` path
    /// 4. `./nyay.toml`
    /// 5. `~/.config/nyay/config.toml`
    /// 6. Built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Self::file_figment(explicit)?;

        figment = figment
            .merge(
                Env::raw()
                    .only(&["GROQ_API_KEY"])
                    .map(|_| "llm.api_key".into()),
            )
            .merge(Env::raw().only(&["GROQ_MODEL"]).map(|_| "llm.model".into()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::extract(figment)
    }

    fn file_figment(explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(global) = Self::config_path() {
            if global.exists() {
                figment = figment.merge(Toml::file(global));
            }
        }

        let project = PathBuf::from(PROJECT_CONFIG);
        if project.exists() {
            figment = figment.merge(Toml::file(project));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        Ok(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.retrieval.confidence_threshold) {
            anyhow::bail!(
                "retrieval.confidence_threshold must be within 0.0..=1.0, got {}",
                self.retrieval.confidence_threshold
            );
        }
        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be at least 1");
        }
        if self.agent.max_iterations == 0 {
            anyhow::bail!("agent.max_iterations must be at least 1");
        }
        Ok(())
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("nyay"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    pub fn index_path(&self) -> Option<PathBuf> {
        self.retrieval.index_path.as_deref().map(expand_path)
    }

    /// The effective configuration as TOML, with API keys masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        for key in [&mut redacted.llm.api_key, &mut redacted.embedding.api_key] {
            if key.is_some() {
                *key = Some("****".to_string());
            }
        }
        toml::to_string_pretty(&redacted).context("Failed to render configuration")
    }

    /// The LLM key, treating a blank value as missing.
    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
