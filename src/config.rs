use chrono::FixedOffset;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use validator::Validate;

use crate::models::StageWeights;

#[derive(Debug, Clone, Deserialize, Default, Validate)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    #[validate(nested)]
    pub llm: LlmConfig,
    #[validate(nested)]
    pub storage: StorageConfig,
    #[validate(nested)]
    pub pipeline: PipelineConfig,
    #[validate(nested)]
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct LlmConfig {
    /// Leave empty to disable every assisted path
    pub api_base: String,
    pub api_key: Option<String>,
    #[validate(length(min = 1))]
    pub model: String,
    #[validate(range(min = 1))]
    pub max_tokens: u32,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

/// Storage reachable over the MySQL wire protocol
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    pub user: String,
    pub password: String,
    #[validate(length(min = 1))]
    pub database: String,
    #[validate(length(min = 1))]
    pub table: String,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub connect_timeout_secs: u64,
}

impl StorageConfig {
    /// Fully qualified table name (database.table)
    pub fn full_table_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    /// Largest row cap a query may carry, also the cap appended when none is present
    #[validate(range(min = 1))]
    pub max_rows: u64,
    /// Cap appended to assisted SQL that carries none
    #[validate(range(min = 1))]
    pub assisted_row_cap: u64,
    #[validate(length(min = 1))]
    pub default_time_range: String,
    pub assisted_planning: bool,
    pub assisted_sql: bool,
    pub schema_context: bool,
    #[validate(range(min = 1))]
    pub schema_context_top_k: usize,
    /// Wall-clock offset for datetime and day-anchored expressions, e.g. "+08:00"
    pub utc_offset: String,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    #[validate(range(min = 1))]
    pub query_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn offset(&self) -> Result<FixedOffset, anyhow::Error> {
        parse_utc_offset(&self.utc_offset)
            .map_err(|e| anyhow::anyhow!("invalid pipeline.utc_offset '{}': {}", self.utc_offset, e))
    }
}

/// Tuning knobs for the quality guard
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct QualityConfig {
    pub weights: StageWeights,
    #[validate(range(min = 0.0, max = 100.0))]
    pub passing_score: f64,

    // SQL shape
    pub max_joins: usize,
    pub join_penalty: f64,
    pub max_subquery_depth: usize,
    pub subquery_penalty: f64,
    pub max_aggregates: usize,
    pub aggregate_penalty: f64,
    pub missing_time_filter_penalty: f64,
    pub missing_limit_penalty: f64,
    pub oversized_limit_penalty: f64,
    pub select_star_penalty: f64,

    // Relevance judgment
    pub relevance_check: bool,
    #[validate(range(min = 0.0, max = 100.0))]
    pub neutral_relevance: f64,
    pub relevance_issue_below: f64,

    // Execution
    pub empty_rows_penalty: f64,
    pub low_volume_rows: usize,
    pub high_volume_rows: usize,
    pub volume_penalty: f64,

    // Result quality
    #[validate(range(min = 0.0, max = 1.0))]
    pub missing_rate_high: f64,
    pub missing_high_penalty: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub missing_rate_moderate: f64,
    pub missing_moderate_penalty: f64,
    pub key_fields: Vec<String>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub key_missing_rate: f64,
    pub key_missing_penalty: f64,
    pub loss_out_of_range_cap: f64,
    pub negative_latency_cap: f64,
    pub cv_low: f64,
    pub cv_low_penalty: f64,
    pub cv_high: f64,
    pub cv_high_penalty: f64,
    pub missing_metric_penalty: f64,
    pub missing_group_penalty: f64,
    pub empty_result_penalty: f64,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "netprobe-insight")]
#[command(version, about = "Question-to-SQL pipeline for network probe measurements")]
pub struct CommandLineArgs {
    /// Analytic question, e.g. "各运营商近1小时丢包率"
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (overrides config file, e.g., "info,netprobe_insight=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Maximum row cap (overrides config file)
    #[arg(long, value_name = "ROWS")]
    pub max_rows: Option<u64>,

    /// Enable/disable assisted plan extraction (overrides config file)
    #[arg(long, value_name = "BOOL")]
    pub assisted_planning: Option<bool>,

    /// Enable/disable assisted SQL generation (overrides config file)
    #[arg(long, value_name = "BOOL")]
    pub assisted_sql: Option<bool>,

    /// Query timeout (overrides config file, e.g., "30s", "1m")
    #[arg(long, value_name = "DURATION")]
    pub query_timeout: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_LOG_LEVEL: Logging level
    /// - APP_LLM_API_BASE / APP_LLM_API_KEY / APP_LLM_MODEL: text-generation endpoint
    /// - APP_STORAGE_HOST / APP_STORAGE_PORT / APP_STORAGE_USER / APP_STORAGE_PASSWORD
    /// - APP_STORAGE_DATABASE / APP_STORAGE_TABLE: dataset location
    /// - APP_MAX_QUERY_ROWS: Maximum row cap
    /// - APP_ASSISTED_PLANNING / APP_ASSISTED_SQL: assisted paths (true/false)
    /// - APP_QUERY_TIMEOUT: Query timeout (accepts "30s", "1m")
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Some(api_base) = lookup("APP_LLM_API_BASE") {
            self.llm.api_base = api_base;
            tracing::info!("Override llm.api_base from env: {}", self.llm.api_base);
        }

        if let Some(api_key) = lookup("APP_LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
            tracing::info!("Override llm.api_key from env");
        }

        if let Some(model) = lookup("APP_LLM_MODEL") {
            self.llm.model = model;
            tracing::info!("Override llm.model from env: {}", self.llm.model);
        }

        if let Some(host) = lookup("APP_STORAGE_HOST") {
            self.storage.host = host;
            tracing::info!("Override storage.host from env: {}", self.storage.host);
        }

        if let Some(port) = lookup("APP_STORAGE_PORT") {
            match port.parse() {
                Ok(val) => {
                    self.storage.port = val;
                    tracing::info!("Override storage.port from env: {}", self.storage.port);
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_STORAGE_PORT '{}': {} (keep {})",
                    port,
                    e,
                    self.storage.port
                ),
            }
        }

        if let Some(user) = lookup("APP_STORAGE_USER") {
            self.storage.user = user;
            tracing::info!("Override storage.user from env: {}", self.storage.user);
        }

        if let Some(password) = lookup("APP_STORAGE_PASSWORD") {
            self.storage.password = password;
            tracing::info!("Override storage.password from env");
        }

        if let Some(database) = lookup("APP_STORAGE_DATABASE") {
            self.storage.database = database;
            tracing::info!("Override storage.database from env: {}", self.storage.database);
        }

        if let Some(table) = lookup("APP_STORAGE_TABLE") {
            self.storage.table = table;
            tracing::info!("Override storage.table from env: {}", self.storage.table);
        }

        if let Some(rows) = lookup("APP_MAX_QUERY_ROWS") {
            match rows.parse() {
                Ok(val) => {
                    self.pipeline.max_rows = val;
                    tracing::info!("Override pipeline.max_rows from env: {}", self.pipeline.max_rows);
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_MAX_QUERY_ROWS '{}': {} (keep {})",
                    rows,
                    e,
                    self.pipeline.max_rows
                ),
            }
        }

        if let Some(enabled) = lookup("APP_ASSISTED_PLANNING") {
            match enabled.parse() {
                Ok(val) => {
                    self.pipeline.assisted_planning = val;
                    tracing::info!(
                        "Override pipeline.assisted_planning from env: {}",
                        self.pipeline.assisted_planning
                    );
                },
                Err(e) => tracing::warn!("Invalid APP_ASSISTED_PLANNING '{}': {}", enabled, e),
            }
        }

        if let Some(enabled) = lookup("APP_ASSISTED_SQL") {
            match enabled.parse() {
                Ok(val) => {
                    self.pipeline.assisted_sql = val;
                    tracing::info!(
                        "Override pipeline.assisted_sql from env: {}",
                        self.pipeline.assisted_sql
                    );
                },
                Err(e) => tracing::warn!("Invalid APP_ASSISTED_SQL '{}': {}", enabled, e),
            }
        }

        if let Some(timeout) = lookup("APP_QUERY_TIMEOUT") {
            match parse_duration_to_secs(&timeout) {
                Ok(val) => {
                    self.pipeline.query_timeout_secs = val;
                    tracing::info!(
                        "Override pipeline.query_timeout_secs from env: {}",
                        self.pipeline.query_timeout_secs
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_QUERY_TIMEOUT '{}': {} (keep {})",
                    timeout,
                    e,
                    self.pipeline.query_timeout_secs
                ),
            }
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(rows) = args.max_rows {
            self.pipeline.max_rows = rows;
            tracing::info!("Override pipeline.max_rows from CLI: {}", self.pipeline.max_rows);
        }

        if let Some(enabled) = args.assisted_planning {
            self.pipeline.assisted_planning = enabled;
            tracing::info!("Override pipeline.assisted_planning from CLI: {}", enabled);
        }

        if let Some(enabled) = args.assisted_sql {
            self.pipeline.assisted_sql = enabled;
            tracing::info!("Override pipeline.assisted_sql from CLI: {}", enabled);
        }

        if let Some(timeout) = &args.query_timeout {
            match parse_duration_to_secs(timeout) {
                Ok(val) => {
                    self.pipeline.query_timeout_secs = val;
                    tracing::info!("Override pipeline.query_timeout_secs from CLI: {}", val);
                },
                Err(e) => tracing::warn!(
                    "Invalid --query-timeout '{}': {} (keep {})",
                    timeout,
                    e,
                    self.pipeline.query_timeout_secs
                ),
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        Validate::validate(self).map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

        self.pipeline.offset()?;

        let weights = &self.quality.weights;
        if weights.sql_generation < 0.0 || weights.execution < 0.0 || weights.result_quality < 0.0
        {
            anyhow::bail!("quality.weights must not be negative");
        }
        if weights.total() <= 0.0 {
            anyhow::bail!("at least one quality weight must be > 0");
        }

        if self.quality.missing_rate_moderate > self.quality.missing_rate_high {
            anyhow::bail!("quality.missing_rate_moderate must not exceed quality.missing_rate_high");
        }

        if self.quality.low_volume_rows > self.quality.high_volume_rows {
            anyhow::bail!("quality.low_volume_rows must not exceed quality.high_volume_rows");
        }

        if self.llm.api_base.is_empty()
            && (self.pipeline.assisted_planning || self.pipeline.assisted_sql)
        {
            tracing::warn!("Assisted paths enabled but llm.api_base is empty, rule path only");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, anyhow::Error> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,netprobe_insight=debug".to_string(), file: None }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: None,
            model: "deepseek-chat".to_string(),
            max_tokens: 2048,
            temperature: 0.1,
            timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9004,
            user: "default".to_string(),
            password: String::new(),
            database: "detect".to_string(),
            table: "detect_ping_log".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_rows: 1_000_000,
            assisted_row_cap: 1_000_000,
            default_time_range: "last_1_hour".to_string(),
            assisted_planning: false,
            assisted_sql: false,
            schema_context: true,
            schema_context_top_k: 5,
            utc_offset: "+08:00".to_string(),
            query_timeout_secs: 30,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: StageWeights::default(),
            passing_score: 70.0,
            max_joins: 3,
            join_penalty: 20.0,
            max_subquery_depth: 2,
            subquery_penalty: 15.0,
            max_aggregates: 10,
            aggregate_penalty: 10.0,
            missing_time_filter_penalty: 30.0,
            missing_limit_penalty: 20.0,
            oversized_limit_penalty: 15.0,
            select_star_penalty: 10.0,
            relevance_check: true,
            neutral_relevance: 75.0,
            relevance_issue_below: 70.0,
            empty_rows_penalty: 40.0,
            low_volume_rows: 10,
            high_volume_rows: 100_000,
            volume_penalty: 10.0,
            missing_rate_high: 0.5,
            missing_high_penalty: 20.0,
            missing_rate_moderate: 0.1,
            missing_moderate_penalty: 10.0,
            key_fields: ["avg_rtt", "avg_lost", "hostname", "target_node"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            key_missing_rate: 0.2,
            key_missing_penalty: 15.0,
            loss_out_of_range_cap: 30.0,
            negative_latency_cap: 25.0,
            cv_low: 0.01,
            cv_low_penalty: 15.0,
            cv_high: 5.0,
            cv_high_penalty: 10.0,
            missing_metric_penalty: 20.0,
            missing_group_penalty: 15.0,
            empty_result_penalty: 50.0,
        }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    // Accept plain numbers (treated as seconds)
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

/// Parse "+08:00", "-0530" or "Z" into a fixed offset
fn parse_utc_offset(input: &str) -> Result<FixedOffset, String> {
    let s = input.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| "offset out of range".to_string());
    }

    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err("offset must start with '+' or '-'".into()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("expected +HH:MM".into());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| "invalid hours".to_string())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| "invalid minutes".to_string())?;
    if minutes >= 60 {
        return Err("invalid minutes".into());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| "offset out of range".to_string())
}

// Custom serde deserializer to support numeric or human-friendly string values
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}
