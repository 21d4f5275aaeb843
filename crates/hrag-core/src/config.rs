//! Configuration loading and the typed settings tree.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_RETRIEVAL__TOP_PARENTS`).
//! Credentials never live in the settings tree; `ApiCredentials` reads them
//! from the environment variables the settings name.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Load one explicit TOML file, still overridable by `APP_*` env vars.
    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        let figment = Figment::new().merge(Toml::file(path)).merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Extract and validate the typed settings.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::config(format!("failed to parse settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub corpus: CorpusSettings,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalSettings,
    pub orchestrator: OrchestratorSettings,
    pub models: ModelSettings,
    pub index: IndexSettings,
    pub eval: EvalSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub dir: String,
    pub extensions: Vec<String>,
    pub limit: Option<usize>,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self { dir: "data/corpus".to_string(), extensions: vec!["txt".to_string(), "md".to_string()], limit: None }
    }
}

/// Word-window sizes for the two chunk granularities.
///
/// `parent_words = 0` keeps the whole document as a single parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub parent_words: usize,
    pub parent_overlap: usize,
    pub child_words: usize,
    pub child_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { parent_words: 0, parent_overlap: 0, child_words: 120, child_overlap: 20 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.child_words == 0 {
            return Err(Error::config("chunking.child_words must be > 0"));
        }
        if self.child_overlap >= self.child_words {
            return Err(Error::config("chunking.child_overlap must be smaller than child_words"));
        }
        if self.parent_words > 0 && self.parent_overlap >= self.parent_words {
            return Err(Error::config("chunking.parent_overlap must be smaller than parent_words"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_parents: usize,
    pub top_children: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_parents: 2, top_children: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Maximum number of in-flight external calls.
    pub concurrency: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub strict: bool,
    /// Messages kept per failure category in the run report.
    pub report_errors: usize,
    pub embed_batch_size: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            strict: false,
            report_errors: 5,
            embed_batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Azure,
    /// Deterministic local models, no network.
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub provider: ProviderKind,
    pub endpoint: Option<String>,
    pub api_version: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
    pub embedding_dim: usize,
    pub api_key_env: String,
    pub endpoint_env: String,
    pub request_timeout_secs: u64,
    pub summary_max_words: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Azure,
            endpoint: None,
            api_version: "2024-02-01".to_string(),
            chat_deployment: "gpt-4o-mini".to_string(),
            embedding_deployment: "text-embedding-ada-002".to_string(),
            embedding_dim: 1536,
            api_key_env: "AZURE_OPENAI_API_KEY".to_string(),
            endpoint_env: "AZURE_OPENAI_ENDPOINT".to_string(),
            request_timeout_secs: 60,
            summary_max_words: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub dir: String,
    pub cache: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { dir: "data/index".to_string(), cache: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSettings {
    pub testset_size: usize,
    pub raise_exceptions: bool,
    pub testset_path: String,
    pub output: String,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            testset_size: 10,
            raise_exceptions: false,
            testset_path: "data/eval/testset.jsonl".to_string(),
            output: "data/eval/results.csv".to_string(),
        }
    }
}

impl Settings {
    /// Anchor the relative corpus, index and eval paths at `base`, usually
    /// the directory of the config file they came from.
    pub fn rebase_paths(&mut self, base: &Path) {
        for path in [&mut self.corpus.dir, &mut self.index.dir, &mut self.eval.testset_path, &mut self.eval.output] {
            *path = resolve_with_base(base, path.as_str()).to_string_lossy().into_owned();
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.retrieval.top_parents == 0 || self.retrieval.top_children == 0 {
            return Err(Error::config("retrieval.top_parents and top_children must be > 0"));
        }
        if self.orchestrator.concurrency == 0 {
            return Err(Error::config("orchestrator.concurrency must be > 0"));
        }
        if self.orchestrator.max_attempts == 0 {
            return Err(Error::config("orchestrator.max_attempts must be >= 1"));
        }
        if self.orchestrator.embed_batch_size == 0 {
            return Err(Error::config("orchestrator.embed_batch_size must be > 0"));
        }
        if self.models.embedding_dim == 0 {
            return Err(Error::config("models.embedding_dim must be > 0"));
        }
        if self.corpus.extensions.is_empty() {
            return Err(Error::config("corpus.extensions must list at least one extension"));
        }
        if self.models.provider == ProviderKind::Azure {
            if self.models.chat_deployment.trim().is_empty() || self.models.embedding_deployment.trim().is_empty() {
                return Err(Error::config("models.chat_deployment and embedding_deployment are required"));
            }
        }
        Ok(())
    }
}

/// Endpoint and key for the hosted models, resolved once at startup and
/// handed to each client explicitly.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub endpoint: String,
    pub api_key: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials").field("endpoint", &self.endpoint).field("api_key", &"<redacted>").finish()
    }
}

impl ApiCredentials {
    pub fn resolve(models: &ModelSettings) -> Result<Self> {
        Self::resolve_with(models, |name| env::var(name).ok())
    }

    pub fn resolve_with<F>(models: &ModelSettings, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = models
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| lookup(&models.endpoint_env))
            .ok_or_else(|| Error::config(format!("no endpoint configured and env var '{}' not set", models.endpoint_env)))?;
        let api_key = lookup(&models.api_key_env)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::config(format!("env var '{}' not set", models.api_key_env)))?;
        Ok(Self { endpoint: endpoint.trim_end_matches('/').to_string(), api_key })
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}


/// Resolve a possibly relative path against `base` after expansion.
/// Absolute paths are returned as-is.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
