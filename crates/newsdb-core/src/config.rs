use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::ChunkParams;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_in(Path::new("."))
    }

    /// Loads `config.toml` and the env-specific overlay from `base_dir`, then
    /// `APP_*` variables (`__` separates nested keys).
    pub fn load_in(base_dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base_dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir: base_dir.to_path_buf() })
    }

    pub fn from_figment(figment: Figment, base_dir: &Path) -> Self {
        Self { figment, base_dir: base_dir.to_path_buf() }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Extracts the typed settings, resolves paths against the config
    /// directory and validates cross-field constraints.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.paths.archive_dir = resolve_with_base(&self.base_dir, settings.paths.archive_dir.to_string_lossy());
        settings.paths.index_dir = resolve_with_base(&self.base_dir, settings.paths.index_dir.to_string_lossy());
        if let Some(dir) = settings.embedding.model_dir.take() {
            settings.embedding.model_dir = Some(resolve_with_base(&self.base_dir, dir.to_string_lossy()));
        }
        if use_fake_embeddings() {
            settings.embedding.provider = EmbeddingProvider::Hash;
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub archive_dir: PathBuf,
    /// Local-only location for state, keyword and vector indexes.
    pub index_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("~/newsletters/archives"),
            index_dir: PathBuf::from("~/.local/share/newsdb"),
        }
    }
}

impl PathsConfig {
    pub fn state_file(&self) -> PathBuf {
        self.index_dir.join("state.json")
    }

    pub fn keyword_dir(&self) -> PathBuf {
        self.index_dir.join("keyword")
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.index_dir.join("vector")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: 1500, overlap_chars: 300 }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams { max_chars: self.max_chars, overlap_chars: self.overlap_chars }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub keyword_weight: f32,
    pub vector_weight: f32,
    pub default_limit: usize,
    /// Each side of a hybrid query fetches `limit * candidate_multiplier`.
    pub candidate_multiplier: usize,
    pub reconcile_on_query: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 0.5,
            vector_weight: 0.5,
            default_limit: 20,
            candidate_multiplier: 3,
            reconcile_on_query: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// BGE-M3 loaded from `model_dir` with candle.
    Local,
    /// Deterministic feature hashing; no model files needed.
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model_dir: Option<PathBuf>,
    pub dim: usize,
    pub max_tokens: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            model_dir: None,
            dim: 384,
            max_tokens: 256,
            batch_size: 16,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Row count above which an IVF_PQ index is (re)built after a build.
    pub ann_threshold: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { ann_threshold: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub api_key_env: String,
    pub endpoint: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            endpoint: "https://api.anthropic.com/v1".to_string(),
            max_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.max_chars == 0 || c.overlap_chars >= c.max_chars {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
                c.overlap_chars, c.max_chars
            )));
        }
        let r = &self.retrieval;
        if r.keyword_weight < 0.0 || r.vector_weight < 0.0 || r.keyword_weight + r.vector_weight <= 0.0 {
            return Err(Error::InvalidConfig(
                "retrieval weights must be non-negative with a positive sum".into(),
            ));
        }
        if r.candidate_multiplier == 0 {
            return Err(Error::InvalidConfig("retrieval.candidate_multiplier must be at least 1".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be at least 1".into()));
        }
        if is_within(&self.paths.index_dir, &self.paths.archive_dir) {
            return Err(Error::InvalidConfig(format!(
                "paths.index_dir ({}) must not live inside the synchronized archive ({})",
                self.paths.index_dir.display(),
                self.paths.archive_dir.display()
            )));
        }
        Ok(())
    }
}

fn is_within(child: &Path, parent: &Path) -> bool {
    if child.starts_with(parent) {
        return true;
    }
    match (child.canonicalize(), parent.canonicalize()) {
        (Ok(c), Ok(p)) => c.starts_with(p),
        _ => false,
    }
}

pub fn use_fake_embeddings() -> bool {
    env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
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

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
