//! Configuration for a handwrite run.
//!
//! All behaviour is controlled through [`Config`], loaded once from a YAML
//! file and never mutated afterwards. Every field is optional in the file;
//! anything missing takes the documented default, and a missing file is
//! simply the all-defaults config.
//!
//! ```yaml
//! gemini:
//!   model: gemini-1.5-pro
//!   prompt: |-
//!     Extract the handwritten text from this image.
//! template:
//!   path: templates/note_template.md   # relative to this file's directory
//!   variables:
//!     author: Ada
//! output:
//!   format: markdown
//!   encoding: utf-8
//! ```

use crate::error::HandwriteError;
use crate::pipeline::render::{lookup_encoding, DEFAULT_NOTE_TEMPLATE};
use crate::prompts::{DEFAULT_MODEL, DEFAULT_PROMPT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Template path used when the config does not set one.
pub const DEFAULT_TEMPLATE_PATH: &str = "templates/note_template.md";

/// The file written by `handwrite config --setup`.
///
/// Parses to exactly [`Config::default`].
pub const DEFAULT_CONFIG_YAML: &str = r#"gemini:
  model: "gemini-1.5-pro"
  prompt: |-
    Extract the handwritten text from this image.
    - Use $ for LaTeX, not ```latex.
    - Transcribe the text exactly as it appears.
    - The output must be only the transcribed Markdown, with no additional commentary.

template:
  path: "templates/note_template.md"
  variables: {}

output:
  format: "markdown"
  encoding: "utf-8"
"#;

/// Configuration for a handwrite run.
///
/// Built via [`Config::load`], [`Config::builder`] or [`Config::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OCR model settings.
    pub gemini: GeminiConfig,
    /// Output template settings.
    pub template: TemplateConfig,
    /// Output file settings.
    pub output: OutputConfig,

    /// Directory relative template paths resolve against: the directory of
    /// the config file this was loaded from (whether or not it existed).
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// `gemini.*` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Model identifier, e.g. `gemini-1.5-pro`, `gemini-2.0-flash`.
    pub model: String,
    /// Prompt sent with every page image.
    pub prompt: String,
}

/// `template.*` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Path to a Jinja-syntax template file.
    pub path: PathBuf,
    /// Extra values exposed to the template. They override built-in keys.
    pub variables: BTreeMap<String, serde_json::Value>,
}

/// `output.*` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format. Only `markdown` is supported.
    pub format: String,
    /// Text encoding label for the written file (`utf-8`, `utf-16le`, `latin1`, …).
    pub encoding: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig::default(),
            template: TemplateConfig::default(),
            output: OutputConfig::default(),
            base_dir: None,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            variables: BTreeMap::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "markdown".to_string(),
            encoding: "utf-8".to_string(),
        }
    }
}

impl Config {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load the config at `path`.
    ///
    /// A missing file yields [`Config::default`] (with a warning), not an
    /// error. An empty file is treated the same way.
    pub fn load(path: &Path) -> Result<Self, HandwriteError> {
        let base_dir = path.parent().map(Path::to_path_buf);

        if !path.exists() {
            warn!(
                "Config file not found at {}. Using default settings.",
                path.display()
            );
            return Ok(Self {
                base_dir,
                ..Self::default()
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| HandwriteError::ConfigRead {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut config: Config = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&contents).map_err(|e| HandwriteError::ConfigParse {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?
        };
        config.base_dir = base_dir;
        config.validate()?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise the default config location.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, HandwriteError> {
        match path {
            Some(p) => Self::load(p),
            None => Self::load(&default_config_path()?),
        }
    }

    /// Check field constraints. Called by [`Config::load`] and the builder.
    pub fn validate(&self) -> Result<(), HandwriteError> {
        if self.gemini.model.trim().is_empty() {
            return Err(HandwriteError::InvalidConfig(
                "gemini.model must not be empty".into(),
            ));
        }
        if self.gemini.prompt.trim().is_empty() {
            return Err(HandwriteError::InvalidConfig(
                "gemini.prompt must not be empty".into(),
            ));
        }
        if self.template.path.as_os_str().is_empty() {
            return Err(HandwriteError::InvalidConfig(
                "template.path must not be empty".into(),
            ));
        }
        if !self.output.format.eq_ignore_ascii_case("markdown") {
            return Err(HandwriteError::InvalidConfig(format!(
                "output.format must be 'markdown', got '{}'",
                self.output.format
            )));
        }
        if lookup_encoding(&self.output.encoding).is_none() {
            return Err(HandwriteError::InvalidConfig(format!(
                "output.encoding '{}' is not a known encoding",
                self.output.encoding
            )));
        }
        Ok(())
    }

    /// The template file to render, with relative paths resolved against
    /// the config file's directory.
    pub fn template_path(&self) -> PathBuf {
        let path = &self.template.path;
        if path.is_absolute() {
            return path.clone();
        }
        match &self.base_dir {
            Some(base) => base.join(path),
            None => path.clone(),
        }
    }

    /// Whether `template.path` is still the default one. An absent default
    /// template falls back to the built-in note template when rendering.
    pub fn uses_default_template(&self) -> bool {
        self.template.path == Path::new(DEFAULT_TEMPLATE_PATH)
    }

    /// Serialise the effective config back to YAML.
    pub fn to_yaml(&self) -> Result<String, HandwriteError> {
        serde_yaml::to_string(self).map_err(|e| HandwriteError::InvalidConfig(e.to_string()))
    }
}

/// Builder for [`Config`].
#[derive(Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.gemini.model = model.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.gemini.prompt = prompt.into();
        self
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template.path = path.into();
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.template.variables.insert(key.into(), value.into());
        self
    }

    pub fn encoding(mut self, label: impl Into<String>) -> Self {
        self.config.output.encoding = label.into();
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.base_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<Config, HandwriteError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Locations & setup ────────────────────────────────────────────────────

/// `$HOME/.config/handwrite/config.yaml`.
pub fn default_config_path() -> Result<PathBuf, HandwriteError> {
    let home = dirs::home_dir().ok_or(HandwriteError::NoConfigDir)?;
    Ok(home.join(".config").join("handwrite").join("config.yaml"))
}

/// Result of [`setup_default_config_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// A new config file was written.
    Created,
    /// A file already existed and was left untouched.
    AlreadyExists,
}

/// Write the default config to [`default_config_path`] if it is absent.
pub fn setup_default_config() -> Result<(PathBuf, SetupOutcome), HandwriteError> {
    let path = default_config_path()?;
    let outcome = setup_default_config_at(&path)?;
    Ok((path, outcome))
}

/// Write [`DEFAULT_CONFIG_YAML`] to `path` unless a file is already there.
///
/// On creation the default note template is also written to
/// `templates/note_template.md` next to the config, unless present. An
/// existing config file is never modified.
pub fn setup_default_config_at(path: &Path) -> Result<SetupOutcome, HandwriteError> {
    let write_err = |p: &Path| {
        let p = p.to_path_buf();
        move |e: std::io::Error| HandwriteError::ConfigWrite { path: p, source: e }
    };

    if path.exists() {
        info!("Config file already exists at {}", path.display());
        return Ok(SetupOutcome::AlreadyExists);
    }

    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir).map_err(write_err(dir))?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            info!("Config file already exists at {}", path.display());
            return Ok(SetupOutcome::AlreadyExists);
        }
        Err(e) => return Err(write_err(path)(e)),
    };
    file.write_all(DEFAULT_CONFIG_YAML.as_bytes())
        .map_err(write_err(path))?;
    info!("Created default config at {}", path.display());

    let template = dir.join(DEFAULT_TEMPLATE_PATH);
    if !template.exists() {
        if let Some(template_dir) = template.parent() {
            std::fs::create_dir_all(template_dir).map_err(write_err(template_dir))?;
        }
        std::fs::write(&template, DEFAULT_NOTE_TEMPLATE).map_err(write_err(template.as_path()))?;
        info!("Created default note template at {}", template.display());
    }

    Ok(SetupOutcome::Created)
}

/// Read the Gemini API key from the environment, after loading a local
/// `.env` file if one exists.
pub fn api_key_from_env() -> Result<String, HandwriteError> {
    let _ = dotenvy::dotenv();
    api_key_from(std::env::var(API_KEY_ENV).ok())
}

fn api_key_from(value: Option<String>) -> Result<String, HandwriteError> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(HandwriteError::MissingApiKey),
    }
}
