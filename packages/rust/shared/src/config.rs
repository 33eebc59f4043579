//! Application configuration for notefold.
//!
//! User config lives at `~/.notefold/notefold.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NotefoldError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "notefold.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".notefold";

// ---------------------------------------------------------------------------
// Config structs (matching notefold.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Classifier thresholds.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Retry policy for transient filesystem errors.
    #[serde(default)]
    pub retry: RetryConfig,

    /// External collaborator commands.
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root of the markdown note tree.
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    /// Directory receiving the corpus, split outputs and copied assets.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Concurrent consolidation workers.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// File name of the intermediate merged corpus.
    #[serde(default = "default_corpus_file")]
    pub corpus_file: String,

    /// Sub-directory of the output directory for copied assets.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// File name of the persisted pipeline state (inside the output dir).
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Text attachments larger than this are linked instead of inlined.
    #[serde(default = "default_max_inline_bytes")]
    pub max_inline_bytes: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            workers: default_workers(),
            corpus_file: default_corpus_file(),
            assets_dir: default_assets_dir(),
            state_file: default_state_file(),
            max_inline_bytes: default_max_inline_bytes(),
        }
    }
}

fn default_input_dir() -> String {
    ".".into()
}
fn default_output_dir() -> String {
    "./notefold-out".into()
}
fn default_workers() -> u32 {
    4
}
fn default_corpus_file() -> String {
    "corpus.md".into()
}
fn default_assets_dir() -> String {
    "assets".into()
}
fn default_state_file() -> String {
    ".notefold-state.json".into()
}
fn default_max_inline_bytes() -> u64 {
    256 * 1024
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Unmarked content classified as summary below this confidence is
    /// routed to raw notes instead.
    #[serde(default = "default_min_summary_confidence")]
    pub min_summary_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_summary_confidence: default_min_summary_confidence(),
        }
    }
}

fn default_min_summary_confidence() -> f64 {
    0.35
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Symmetric jitter range, 0.0–1.0.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    2000
}
fn default_jitter_factor() -> f64 {
    0.2
}

/// `[collaborators]` section. Each command is an argv array; empty disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    /// Office/PDF → markdown converter. Receives file bytes on stdin.
    #[serde(default)]
    pub converter_command: Vec<String>,

    /// Image transcoder. `{from}` and `{to}` are replaced by extensions.
    #[serde(default)]
    pub image_codec_command: Vec<String>,

    /// Image description generator. Receives image bytes on stdin.
    #[serde(default)]
    pub describer_command: Vec<String>,

    /// Transcode HEIC/HEIF images to PNG when a codec command is set.
    #[serde(default = "default_true")]
    pub convert_heic: bool,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            converter_command: Vec::new(),
            image_codec_command: Vec::new(),
            describer_command: Vec::new(),
            convert_heic: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root of the markdown note tree.
    pub input_dir: PathBuf,
    /// Output directory.
    pub output_dir: PathBuf,
    /// Concurrent consolidation workers.
    pub workers: usize,
    /// Corpus file name inside the output directory.
    pub corpus_file: String,
    /// Assets directory name inside the output directory.
    pub assets_dir: String,
    /// State file name inside the output directory.
    pub state_file: String,
    /// Inline limit for text attachments.
    pub max_inline_bytes: u64,
    /// Summary confidence floor for unmarked content.
    pub min_summary_confidence: f64,
    /// Retry policy.
    pub retry: RetryConfig,
    /// Collaborator commands.
    pub collaborators: CollaboratorsConfig,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            input_dir: PathBuf::from(&config.defaults.input_dir),
            output_dir: PathBuf::from(&config.defaults.output_dir),
            workers: config.defaults.workers as usize,
            corpus_file: config.defaults.corpus_file.clone(),
            assets_dir: config.defaults.assets_dir.clone(),
            state_file: config.defaults.state_file.clone(),
            max_inline_bytes: config.defaults.max_inline_bytes,
            min_summary_confidence: config.classifier.min_summary_confidence,
            retry: config.retry.clone(),
            collaborators: config.collaborators.clone(),
        }
    }
}

impl RunConfig {
    /// Absolute path of the merged corpus file.
    pub fn corpus_path(&self) -> PathBuf {
        self.output_dir.join(&self.corpus_file)
    }

    /// Absolute path of the copied-assets directory.
    pub fn assets_path(&self) -> PathBuf {
        self.output_dir.join(&self.assets_dir)
    }

    /// Absolute path of the persisted state file.
    pub fn state_path(&self) -> PathBuf {
        self.output_dir.join(&self.state_file)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(NotefoldError::config("workers must be greater than zero"));
        }
        if !self.input_dir.is_dir() {
            return Err(NotefoldError::config(format!(
                "input directory {} does not exist",
                self.input_dir.display()
            )));
        }
        if self.input_dir == self.output_dir {
            return Err(NotefoldError::config(
                "output directory must differ from the input directory",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_summary_confidence) {
            return Err(NotefoldError::config(
                "min_summary_confidence must be within 0.0..=1.0",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.notefold/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NotefoldError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.notefold/notefold.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| NotefoldError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        NotefoldError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NotefoldError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NotefoldError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NotefoldError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
