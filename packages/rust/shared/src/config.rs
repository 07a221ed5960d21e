//! Application configuration for heirdesk.
//!
//! User config lives at `~/.heirdesk/heirdesk.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HeirdeskError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "heirdesk.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".heirdesk";

// ---------------------------------------------------------------------------
// Config structs (matching heirdesk.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Completion backend and rotation settings.
    #[serde(default)]
    pub completion: CompletionSection,

    /// Web search settings.
    #[serde(default)]
    pub search: SearchSection,

    /// Content fetch settings.
    #[serde(default)]
    pub fetch: FetchSection,

    /// Batch refresh settings.
    #[serde(default)]
    pub batch: BatchSection,

    /// Entity resolver settings.
    #[serde(default)]
    pub resolver: ResolverSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Registry database path.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.heirdesk/registry.db".into()
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSection {
    /// Name of the env var holding comma-separated API keys (never store keys here).
    #[serde(default = "default_api_keys_env")]
    pub api_keys_env: String,

    /// Model candidates in priority order.
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Completion API base URL.
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    /// Character budget for source text sent to the model.
    #[serde(default = "default_max_source_chars")]
    pub max_source_chars: usize,
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self {
            api_keys_env: default_api_keys_env(),
            models: default_models(),
            base_url: default_completion_base_url(),
            timeout_secs: default_completion_timeout(),
            max_source_chars: default_max_source_chars(),
        }
    }
}

fn default_api_keys_env() -> String {
    "GOOGLE_API_KEYS".into()
}
fn default_models() -> Vec<String> {
    vec![
        "models/gemini-2.0-flash-exp".into(),
        "models/gemini-1.5-flash".into(),
    ]
}
fn default_completion_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_completion_timeout() -> u64 {
    90
}
fn default_max_source_chars() -> usize {
    30_000
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    /// Search endpoint base URL.
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Domain qualifier appended to every entity name.
    #[serde(default = "default_qualifier")]
    pub qualifier: String,

    /// Results requested per query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Minimum ms between two requests to the search host.
    #[serde(default = "default_search_spacing")]
    pub min_spacing_ms: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            qualifier: default_qualifier(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout(),
            min_spacing_ms: default_search_spacing(),
        }
    }
}

fn default_search_base_url() -> String {
    "https://html.duckduckgo.com".into()
}
fn default_qualifier() -> String {
    "相続手続き".into()
}
fn default_max_results() -> usize {
    3
}
fn default_search_timeout() -> u64 {
    15
}
fn default_search_spacing() -> u64 {
    2_000
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Page-load (single HTTP request) timeout in seconds.
    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,

    /// Whole-operation timeout in seconds, covering the request and rendering.
    /// Waiting for a per-host slot happens before this clock starts.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Minimum ms between requests to the same host.
    #[serde(default = "default_host_spacing")]
    pub min_host_spacing_ms: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            page_load_timeout_secs: default_page_load_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            min_host_spacing_ms: default_host_spacing(),
        }
    }
}

fn default_page_load_timeout() -> u64 {
    45
}
fn default_operation_timeout() -> u64 {
    60
}
fn default_host_spacing() -> u64 {
    3_000
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Entities refreshed concurrently (1 = sequential).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause between entities in ms.
    #[serde(default = "default_pause")]
    pub pause_ms: u64,

    /// Save a checkpoint after this many processed entities.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pause_ms: default_pause(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}
fn default_pause() -> u64 {
    2_000
}
fn default_checkpoint_every() -> usize {
    3
}

/// `[resolver]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSection {
    /// Boilerplate stripped from queries before substring matching.
    #[serde(default = "default_stopwords")]
    pub stopwords: Vec<String>,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            stopwords: default_stopwords(),
        }
    }
}

fn default_stopwords() -> Vec<String> {
    ["手続き", "教えて", "銀行", "please explain", "procedures", "procedure", "bank"]
        .into_iter()
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub page_load_timeout: Duration,
    pub operation_timeout: Duration,
    pub min_host_spacing: Duration,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            page_load_timeout: Duration::from_secs(config.fetch.page_load_timeout_secs),
            operation_timeout: Duration::from_secs(config.fetch.operation_timeout_secs),
            min_host_spacing: Duration::from_millis(config.fetch.min_host_spacing_ms),
        }
    }
}

/// Runtime search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub qualifier: String,
    pub max_results: usize,
    pub timeout: Duration,
    /// Spacing between requests to the search host; zero disables it.
    pub min_spacing: Duration,
}

impl From<&AppConfig> for SearchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.search.base_url.clone(),
            qualifier: config.search.qualifier.clone(),
            max_results: config.search.max_results,
            timeout: Duration::from_secs(config.search.timeout_secs),
            min_spacing: Duration::from_millis(config.search.min_spacing_ms),
        }
    }
}

/// Runtime completion configuration (keys are resolved separately).
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub models: Vec<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub max_source_chars: usize,
}

impl From<&AppConfig> for CompletionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            models: config.completion.models.clone(),
            base_url: config.completion.base_url.clone(),
            timeout: Duration::from_secs(config.completion.timeout_secs),
            max_source_chars: config.completion.max_source_chars,
        }
    }
}

/// Runtime batch refresh configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub pause: Duration,
    pub checkpoint_every: usize,
}

impl From<&AppConfig> for BatchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.batch.concurrency.max(1),
            pause: Duration::from_millis(config.batch.pause_ms),
            checkpoint_every: config.batch.checkpoint_every.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.heirdesk/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HeirdeskError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.heirdesk/heirdesk.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HeirdeskError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HeirdeskError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HeirdeskError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HeirdeskError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HeirdeskError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| HeirdeskError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read the comma-separated API keys from the configured env var.
///
/// Blank entries are dropped. An unset or empty variable is an error.
pub fn load_api_keys(config: &AppConfig) -> Result<Vec<String>> {
    let var_name = &config.completion.api_keys_env;
    let raw = std::env::var(var_name).unwrap_or_default();
    let keys = parse_key_list(&raw);
    if keys.is_empty() {
        return Err(HeirdeskError::config(format!(
            "no completion API keys found. Set the {var_name} environment variable \
             (comma-separated for rotation)."
        )));
    }
    Ok(keys)
}

fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("GOOGLE_API_KEYS"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[search]
qualifier = "inheritance procedure"

[batch]
concurrency = 4
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.search.qualifier, "inheritance procedure");
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.search.min_spacing_ms, 2_000);
        assert_eq!(config.batch.concurrency, 4);
        assert_eq!(config.batch.checkpoint_every, 3);
        assert_eq!(config.completion.models.len(), 2);
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let fetch = FetchConfig::from(&app);
        assert_eq!(fetch.page_load_timeout, Duration::from_secs(45));
        assert_eq!(fetch.min_host_spacing, Duration::from_millis(3_000));

        let completion = CompletionConfig::from(&app);
        assert_eq!(completion.max_source_chars, 30_000);

        let batch = BatchConfig::from(&app);
        assert_eq!(batch.concurrency, 1);
    }

    #[test]
    fn batch_config_clamps_zero() {
        let mut app = AppConfig::default();
        app.batch.concurrency = 0;
        app.batch.checkpoint_every = 0;
        let batch = BatchConfig::from(&app);
        assert_eq!(batch.concurrency, 1);
        assert_eq!(batch.checkpoint_every, 1);
    }

    #[test]
    fn key_list_parsing() {
        assert_eq!(parse_key_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_key_list(" , ").is_empty());
    }

    #[test]
    fn missing_api_keys_is_config_error() {
        let mut config = AppConfig::default();
        // Unique env var name to avoid interfering with other tests
        config.completion.api_keys_env = "HEIRDESK_TEST_NONEXISTENT_KEYS_12345".into();
        let result = load_api_keys(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no completion API keys"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(
            expand_home("/var/lib/heirdesk.db").unwrap(),
            PathBuf::from("/var/lib/heirdesk.db")
        );
    }
}
