// Batch configuration.
//
// Everything the converter needs is read from one JSON file at startup and
// validated before any graph is built. Unknown fields are rejected so typos
// surface immediately. Search tuning lives in named `ExpressionConfig` and
// `PerformanceConfig` tables; `config_overrides` picks a named table for
// matching songs and difficulties, first match wins, falling back to the
// `default_*` names.
//
// Regexes are compiled once in `Config::validate`, which returns the
// compiled `Filters` used for the rest of the run.

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use stepshift_core::expressed::ExpressionConfig;
use stepshift_core::performed::PerformanceConfig;
use tracing::level_filters::LevelFilter;

/// When an existing output chart may be replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverwriteBehavior {
    DoNotOverwrite,
    /// Replace charts that carry a generated-chart marker.
    IfGenerated,
    /// Replace generated charts whose marker is older than this build.
    IfGeneratedAndNewerVersion,
    Always,
}

/// Whether files next to a song (audio, images) are copied to the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonChartFileCopyBehavior {
    DoNotCopy,
    /// Copy when the destination is missing or older than the source.
    IfNewer,
    Always,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// One of error, warn, info, debug, trace, off.
    pub level: String,
    pub log_to_console: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            log_to_console: true,
            log_file: None,
        }
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

/// Named search configs for songs matching `file_regex` and, when given,
/// a difficulty matching `difficulty_regex`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverride {
    pub file_regex: String,
    #[serde(default)]
    pub difficulty_regex: Option<String>,
    #[serde(default)]
    pub expressed_chart_config: Option<String>,
    #[serde(default)]
    pub performed_chart_config: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input_directory: PathBuf,
    /// May equal `input_directory` to add charts in place.
    pub output_directory: PathBuf,
    /// Only song files whose name matches are converted.
    pub input_name_regex: Option<String>,
    pub input_chart_type: String,
    pub output_chart_type: String,
    /// Only charts whose difficulty type matches are converted.
    pub difficulty_regex: Option<String>,
    /// Directory of `<steps_type>.json` pad definitions.
    pub pad_data_directory: Option<PathBuf>,
    /// Fallback table; the built-in table is used when absent.
    pub fallbacks_file: Option<PathBuf>,
    pub expressed_chart_configs: BTreeMap<String, ExpressionConfig>,
    pub performed_chart_configs: BTreeMap<String, PerformanceConfig>,
    pub default_expressed_chart_config: String,
    pub default_performed_chart_config: String,
    pub config_overrides: Vec<ConfigOverride>,
    /// Songs processed at once; 0 uses the number of CPUs.
    pub concurrent_song_count: usize,
    /// Scheduler poll delay once every worker slot has been used.
    pub min_poll_delay_ms: u64,
    /// Scheduler poll delay at startup.
    pub max_poll_delay_ms: u64,
    pub overwrite_behavior: OverwriteBehavior,
    pub non_chart_file_copy_behavior: NonChartFileCopyBehavior,
    pub warn_on_dropped_steps: bool,
    pub log: LogConfig,
}

pub const DEFAULT_CONFIG_NAME: &str = "Default";

impl Default for Config {
    fn default() -> Self {
        Config {
            input_directory: PathBuf::from("songs"),
            output_directory: PathBuf::from("songs"),
            input_name_regex: None,
            input_chart_type: "dance-single".to_string(),
            output_chart_type: "dance-double".to_string(),
            difficulty_regex: None,
            pad_data_directory: None,
            fallbacks_file: None,
            expressed_chart_configs: BTreeMap::from([(
                DEFAULT_CONFIG_NAME.to_string(),
                ExpressionConfig::default(),
            )]),
            performed_chart_configs: BTreeMap::from([(
                DEFAULT_CONFIG_NAME.to_string(),
                PerformanceConfig::default(),
            )]),
            default_expressed_chart_config: DEFAULT_CONFIG_NAME.to_string(),
            default_performed_chart_config: DEFAULT_CONFIG_NAME.to_string(),
            config_overrides: Vec::new(),
            concurrent_song_count: 0,
            min_poll_delay_ms: 10,
            max_poll_delay_ms: 100,
            overwrite_behavior: OverwriteBehavior::IfGeneratedAndNewerVersion,
            non_chart_file_copy_behavior: NonChartFileCopyBehavior::IfNewer,
            warn_on_dropped_steps: true,
            log: LogConfig::default(),
        }
    }
}

/// Compiled regexes from a validated `Config`.
#[derive(Debug, Clone)]
pub struct Filters {
    input_name: Option<Regex>,
    difficulty: Option<Regex>,
    overrides: Vec<(Regex, Option<Regex>)>,
}

fn compile(field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
        field: field.to_string(),
        source,
    })
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every cross reference and compile the regexes.
    pub fn validate(&self) -> Result<Filters, ConfigError> {
        if self.input_directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "input_directory must not be empty".to_string(),
            ));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "output_directory must not be empty".to_string(),
            ));
        }
        if self.input_chart_type.is_empty() || self.output_chart_type.is_empty() {
            return Err(ConfigError::Invalid(
                "input_chart_type and output_chart_type must be set".to_string(),
            ));
        }
        if self.min_poll_delay_ms > self.max_poll_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "min_poll_delay_ms ({}) exceeds max_poll_delay_ms ({})",
                self.min_poll_delay_ms, self.max_poll_delay_ms
            )));
        }
        self.log.level_filter()?;

        self.check_expressed(&self.default_expressed_chart_config)?;
        self.check_performed(&self.default_performed_chart_config)?;
        let mut overrides = Vec::with_capacity(self.config_overrides.len());
        for (i, o) in self.config_overrides.iter().enumerate() {
            if let Some(name) = &o.expressed_chart_config {
                self.check_expressed(name)?;
            }
            if let Some(name) = &o.performed_chart_config {
                self.check_performed(name)?;
            }
            let file = compile(&format!("config_overrides[{i}].file_regex"), &o.file_regex)?;
            let difficulty = o
                .difficulty_regex
                .as_deref()
                .map(|p| compile(&format!("config_overrides[{i}].difficulty_regex"), p))
                .transpose()?;
            overrides.push((file, difficulty));
        }

        Ok(Filters {
            input_name: self
                .input_name_regex
                .as_deref()
                .map(|p| compile("input_name_regex", p))
                .transpose()?,
            difficulty: self
                .difficulty_regex
                .as_deref()
                .map(|p| compile("difficulty_regex", p))
                .transpose()?,
            overrides,
        })
    }

    fn check_expressed(&self, name: &str) -> Result<(), ConfigError> {
        if self.expressed_chart_configs.contains_key(name) {
            Ok(())
        } else {
            Err(ConfigError::UnknownExpressedConfig(name.to_string()))
        }
    }

    fn check_performed(&self, name: &str) -> Result<(), ConfigError> {
        if self.performed_chart_configs.contains_key(name) {
            Ok(())
        } else {
            Err(ConfigError::UnknownPerformedConfig(name.to_string()))
        }
    }

    /// Worker count for the scheduler.
    pub fn concurrency(&self) -> usize {
        match self.concurrent_song_count {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }

    pub fn min_poll_delay(&self) -> Duration {
        Duration::from_millis(self.min_poll_delay_ms)
    }

    pub fn max_poll_delay(&self) -> Duration {
        Duration::from_millis(self.max_poll_delay_ms)
    }

    fn override_name<'a>(
        &'a self,
        filters: &Filters,
        file_name: &str,
        difficulty: &str,
        pick: impl Fn(&'a ConfigOverride) -> Option<&'a String>,
    ) -> Option<&'a String> {
        self.config_overrides
            .iter()
            .zip(&filters.overrides)
            .filter(|(_, (file, diff))| {
                file.is_match(file_name) && diff.as_ref().is_none_or(|d| d.is_match(difficulty))
            })
            .find_map(|(o, _)| pick(o))
    }

    pub fn expression_config_for(
        &self,
        filters: &Filters,
        file_name: &str,
        difficulty: &str,
    ) -> &ExpressionConfig {
        let name = self
            .override_name(filters, file_name, difficulty, |o| {
                o.expressed_chart_config.as_ref()
            })
            .unwrap_or(&self.default_expressed_chart_config);
        // Names were checked in `validate`.
        self.expressed_chart_configs
            .get(name)
            .or_else(|| self.expressed_chart_configs.values().next())
            .unwrap_or(&*DEFAULT_EXPRESSION)
    }

    pub fn performance_config_for(
        &self,
        filters: &Filters,
        file_name: &str,
        difficulty: &str,
    ) -> &PerformanceConfig {
        let name = self
            .override_name(filters, file_name, difficulty, |o| {
                o.performed_chart_config.as_ref()
            })
            .unwrap_or(&self.default_performed_chart_config);
        self.performed_chart_configs
            .get(name)
            .or_else(|| self.performed_chart_configs.values().next())
            .unwrap_or(&*DEFAULT_PERFORMANCE)
    }
}

static DEFAULT_EXPRESSION: LazyLock<ExpressionConfig> = LazyLock::new(ExpressionConfig::default);
static DEFAULT_PERFORMANCE: LazyLock<PerformanceConfig> =
    LazyLock::new(PerformanceConfig::default);

impl Filters {
    pub fn accepts_file(&self, file_name: &str) -> bool {
        self.input_name
            .as_ref()
            .is_none_or(|r| r.is_match(file_name))
    }

    pub fn accepts_difficulty(&self, difficulty: &str) -> bool {
        self.difficulty
            .as_ref()
            .is_none_or(|r| r.is_match(difficulty))
    }
}
