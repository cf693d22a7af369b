use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;
use toml_edit::{Array, DocumentMut, Item, Table};

use crate::error::ConfigError;
use crate::model::{AssetLabels, ThresholdSet};
use crate::storage::json_file::write_atomically;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_state_file() -> String {
    "state.json".into()
}

fn default_asset() -> String {
    "Gold".into()
}

fn default_currency() -> String {
    "EUR".into()
}

fn default_symbol() -> String {
    "GC=F".into()
}

fn default_fx_symbol() -> Option<String> {
    Some("EURUSD=X".into())
}

fn default_yahoo_url() -> String {
    "https://query1.finance.yahoo.com".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_whatsapp_url() -> String {
    "https://api.callmebot.com/whatsapp.php".into()
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}

fn default_smtp_port() -> u16 {
    465
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub thresholds: Option<ThresholdsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            state_file: default_state_file(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_asset")]
    pub asset: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Quote symbol of the asset, e.g. gold futures in USD.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// When set, the asset quote is divided by this FX quote.
    #[serde(default = "default_fx_symbol")]
    pub fx_symbol: Option<String>,
    #[serde(default = "default_yahoo_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            asset: default_asset(),
            currency: default_currency(),
            symbol: default_symbol(),
            fx_symbol: default_fx_symbol(),
            base_url: default_yahoo_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SourceConfig {
    pub fn labels(&self) -> AssetLabels {
        AssetLabels {
            asset: self.asset.clone(),
            currency: self.currency.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_whatsapp_url")]
    pub whatsapp_url: String,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            whatsapp_url: default_whatsapp_url(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
        }
    }
}

/// Both threshold shapes found in config files.
///
/// The flat list predates upward alerts and means "below only".
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ThresholdsConfig {
    Flat(Vec<f64>),
    Split {
        #[serde(default)]
        below: Vec<f64>,
        #[serde(default)]
        above: Vec<f64>,
    },
}

impl From<ThresholdsConfig> for ThresholdSet {
    fn from(config: ThresholdsConfig) -> Self {
        match config {
            ThresholdsConfig::Flat(levels) => ThresholdSet::from_flat(levels),
            ThresholdsConfig::Split { below, above } => ThresholdSet { below, above },
        }
    }
}

impl AppConfig {
    /// Thresholds in the canonical two-list shape (possibly empty).
    pub fn threshold_set(&self) -> ThresholdSet {
        self.thresholds
            .clone()
            .map(ThresholdSet::from)
            .unwrap_or_default()
    }

    /// Thresholds for an alerting run; an empty configuration is an error.
    pub fn require_thresholds(&self) -> Result<ThresholdSet, Report<ConfigError>> {
        let set = self.threshold_set();
        if set.is_empty() {
            return Err(Report::new(ConfigError::MissingThresholds));
        }
        Ok(set)
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config = parse(&content)?;
    validate(&config)?;

    Ok(config)
}

fn parse(content: &str) -> Result<AppConfig, Report<ConfigError>> {
    toml::from_str(content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_levels(&config.threshold_set())?;
    validate_log_format(config)?;
    Ok(())
}

fn validate_levels(set: &ThresholdSet) -> Result<(), Report<ConfigError>> {
    let lists = [("below", &set.below), ("above", &set.above)];
    for (name, levels) in lists {
        if let Some(bad) = levels.iter().find(|l| !l.is_finite() || **l <= 0.0) {
            return Err(Report::new(ConfigError::Validation {
                field: format!("thresholds.{name}: {bad} is not a positive price"),
            }));
        }
    }
    Ok(())
}

fn validate_log_format(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    match config.general.log_format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(Report::new(ConfigError::Validation {
            field: format!("general.log_format \"{other}\" must be \"text\" or \"json\""),
        })),
    }
}

/// Rewrite the thresholds of the config file at `path`, leaving every other
/// key as it was.
///
/// Levels are stored in the two-list shape, below descending and above
/// ascending.
pub fn save_thresholds(path: &Path, set: &ThresholdSet) -> Result<(), Report<ConfigError>> {
    validate_levels(set)?;

    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let updated = replace_thresholds(&content, set)?;

    write_atomically(path, updated.as_bytes())
        .change_context(ConfigError::Write)
        .attach_with(|| format!("path: {}", path.display()))?;
    Ok(())
}

/// Edit only the `thresholds` entry of `content`; comments, key order and the
/// rest of the document are kept as written.
fn replace_thresholds(content: &str, set: &ThresholdSet) -> Result<String, Report<ConfigError>> {
    let mut doc: DocumentMut = content.parse().change_context(ConfigError::Parse {
        reason: "invalid TOML syntax".into(),
    })?;

    let normalized = set.normalized();
    let below = levels_value(&normalized.below);
    let above = levels_value(&normalized.above);

    match doc.get_mut("thresholds").and_then(Item::as_table_mut) {
        Some(table) => {
            table.insert("below", below);
            table.insert("above", above);
        }
        // Legacy flat list, inline table or no entry at all.
        None => {
            let mut table = Table::new();
            table.insert("below", below);
            table.insert("above", above);
            doc.insert("thresholds", Item::Table(table));
        }
    }

    Ok(doc.to_string())
}

fn levels_value(levels: &[f64]) -> Item {
    toml_edit::value(levels.iter().copied().collect::<Array>())
}
