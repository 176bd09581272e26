use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::biome::RuleSet;
use crate::report::NumberFormat;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_event_buffer() -> usize {
    256
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_api_key_env() -> String {
    "API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.95
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_news_count() -> u32 {
    6
}

fn default_entry_rule_set() -> RuleSet {
    RuleSet::Primary
}

fn default_map_rule_set() -> RuleSet {
    RuleSet::MapClick
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_thousands_separator() -> char {
    '.'
}

fn default_decimal_separator() -> char {
    ','
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub generator: GeneratorSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub report: ReportSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Capacity of the state-update broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_news_count")]
    pub news_count: u32,
}

impl GeneratorSettings {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_timeout_secs(),
            news_count: default_news_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    /// Fixed seed for alerts and metric draws; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_entry_rule_set")]
    pub entry_rule_set: RuleSet,
    #[serde(default = "default_map_rule_set")]
    pub map_rule_set: RuleSet,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: None,
            entry_rule_set: default_entry_rule_set(),
            map_rule_set: default_map_rule_set(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_thousands_separator")]
    pub thousands_separator: char,
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: char,
}

impl ReportSettings {
    pub fn number_format(&self) -> NumberFormat {
        NumberFormat {
            thousands: self.thousands_separator,
            decimal: self.decimal_separator,
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            thousands_separator: default_thousands_separator(),
            decimal_separator: default_decimal_separator(),
        }
    }
}

pub struct SettingsLoader {
    base_dir: PathBuf,
}

impl SettingsLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Settings> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Loads `file` when it exists, otherwise returns the defaults.
    pub fn load_or_default(&self, file: impl AsRef<Path>) -> Result<Settings> {
        if self.base_dir.join(file.as_ref()).exists() {
            self.load(file)
        } else {
            Ok(Settings::default())
        }
    }

    pub fn parse(text: &str) -> Result<Settings> {
        let settings: Settings = serde_yaml::from_str(text)?;
        Ok(settings)
    }
}
