//! Configuration module for the order-processing service.
//!
//! This module provides structures and utilities for managing service
//! configuration. It supports loading configuration from TOML files and
//! provides validation to ensure all required configuration values are
//! properly set.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the order-processing service.
///
/// Grouped by concern the way the KV store, logging, listen address,
/// cluster membership, and pipeline layout each need their own section
/// (spec.md §6's "Recognised options").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration for the KV store backend.
	pub kv: KvConfig,
	/// Logging configuration.
	#[serde(default)]
	pub logging: LoggingConfig,
	/// Configuration for this node's own HTTP listener.
	pub service: ServiceConfig,
	/// Configuration for the cluster coordinator.
	pub cluster: ClusterConfig,
	/// Configuration for the pipeline manager.
	pub pipeline: PipelineConfig,
}

/// Configuration for the KV store backend (spec.md §4.A, §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KvConfig {
	/// Which implementation to use ("memory" or "redis").
	pub implementation: String,
	/// Hostname of the backing store. Ignored by the memory implementation.
	#[serde(default = "default_kv_host")]
	pub host: String,
	/// Port of the backing store. Ignored by the memory implementation.
	#[serde(default = "default_kv_port")]
	pub port: u16,
}

fn default_kv_host() -> String {
	"127.0.0.1".to_string()
}

fn default_kv_port() -> u16 {
	6379
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
	/// Minimum level emitted by the tracing subscriber.
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			log_level: default_log_level(),
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

/// Configuration for this node's own HTTP listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// IP address to bind the HTTP server to.
	pub ip: String,
	/// Port to bind the HTTP server to.
	pub port: u16,
}

/// Configuration for the cluster coordinator (spec.md §4.F).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
	/// Stable identifier for this node, used as the KV store bucket prefix
	/// and as the consensus member id.
	pub service_id: String,
	/// Host the consensus transport listens on.
	pub host: String,
	/// Port the consensus transport listens on.
	pub port: u16,
	/// Directory the consensus log is persisted under.
	pub raft_log_path: String,
	/// Leader URL to join at startup. Absent means bootstrap-or-recover.
	#[serde(default)]
	pub join_addr: Option<String>,
	/// Heartbeat interval, in milliseconds, the consensus layer uses.
	#[serde(default = "default_heartbeat_interval_ms")]
	pub heartbeat_interval_ms: u64,
	/// Missed heartbeats before a peer is considered offline.
	#[serde(default = "default_max_heartbeat_fail_times")]
	pub max_heartbeat_fail_times: u32,
	/// How often, in seconds, the leader scans peer liveness.
	#[serde(default = "default_status_check_interval_secs")]
	pub status_check_interval_secs: u64,
	/// Capped retry count for a single Transfer invocation's backoff.
	#[serde(default = "default_max_transfer_attempts")]
	pub max_transfer_attempts: u32,
}

fn default_heartbeat_interval_ms() -> u64 {
	1000
}

fn default_max_heartbeat_fail_times() -> u32 {
	5
}

fn default_status_check_interval_secs() -> u64 {
	10
}

fn default_max_transfer_attempts() -> u32 {
	5
}

/// Configuration for the pipeline manager (spec.md §4.D, §4.E).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
	/// Number of Pipeline workers to run, each with its own FIFO queue.
	pub pipeline_count: usize,
	/// The fixed, ordered sequence of non-terminal step names every job
	/// passes through before one of the two terminal steps.
	pub steps: Vec<String>,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Limit input size to prevent ReDoS attacks
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file at the specified path.
	///
	/// This method reads the file content, resolves environment variables,
	/// and parses it as TOML configuration. The configuration is validated
	/// before being returned.
	///
	/// Environment variables can be referenced using:
	/// - `${VAR_NAME}` - Required environment variable
	/// - `${VAR_NAME:-default}` - With default value if not set
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		let resolved = resolve_env_vars(&content)?;
		resolved.parse()
	}

	/// Loads configuration from a file with async environment variable
	/// resolution.
	///
	/// This method is async-ready for future extensions that might need
	/// async secret resolution (e.g., from Vault, AWS KMS, etc).
	pub async fn from_file_async(path: &str) -> Result<Self, ConfigError> {
		// For now, just calls the sync version
		// In the future, this could use async resolvers
		Self::from_file(path)
	}

	/// Validates the configuration to ensure all required fields are
	/// properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.kv.implementation.is_empty() {
			return Err(ConfigError::Validation(
				"kv.implementation cannot be empty".into(),
			));
		}
		if !["memory", "redis"].contains(&self.kv.implementation.as_str()) {
			return Err(ConfigError::Validation(format!(
				"kv.implementation '{}' is not a recognised backend",
				self.kv.implementation
			)));
		}

		if self.service.ip.is_empty() {
			return Err(ConfigError::Validation("service.ip cannot be empty".into()));
		}
		if self.service.port == 0 {
			return Err(ConfigError::Validation(
				"service.port must be nonzero".into(),
			));
		}

		if self.cluster.service_id.is_empty() {
			return Err(ConfigError::Validation(
				"cluster.service_id cannot be empty".into(),
			));
		}
		if self.cluster.host.is_empty() {
			return Err(ConfigError::Validation("cluster.host cannot be empty".into()));
		}
		if self.cluster.port == 0 {
			return Err(ConfigError::Validation(
				"cluster.port must be nonzero".into(),
			));
		}
		if self.cluster.raft_log_path.is_empty() {
			return Err(ConfigError::Validation(
				"cluster.raft_log_path cannot be empty".into(),
			));
		}
		if self.cluster.max_heartbeat_fail_times == 0 {
			return Err(ConfigError::Validation(
				"cluster.max_heartbeat_fail_times must be at least 1".into(),
			));
		}
		if self.cluster.status_check_interval_secs == 0 {
			return Err(ConfigError::Validation(
				"cluster.status_check_interval_secs must be at least 1".into(),
			));
		}

		if self.pipeline.pipeline_count == 0 {
			return Err(ConfigError::Validation(
				"pipeline.pipeline_count must be at least 1".into(),
			));
		}
		if self.pipeline.steps.is_empty() {
			return Err(ConfigError::Validation(
				"pipeline.steps must list at least one non-terminal step".into(),
			));
		}
		for terminal in ["Completed", "Failed"] {
			if self.pipeline.steps.iter().any(|s| s == terminal) {
				return Err(ConfigError::Validation(format!(
					"pipeline.steps must not list the terminal step '{}'",
					terminal
				)));
			}
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// This allows configuration to be parsed from TOML strings using the
/// standard string parsing interface. Environment variables are resolved
/// and the configuration is automatically validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_config_str() -> &'static str {
		r#"
[kv]
implementation = "memory"

[logging]
log_level = "debug"

[service]
ip = "0.0.0.0"
port = 8080

[cluster]
service_id = "node-a"
host = "127.0.0.1"
port = 9000
raft_log_path = "/tmp/node-a/raft"

[pipeline]
pipeline_count = 4
steps = ["Validate", "Reserve", "Settle"]
"#
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_HOST", "localhost");
		std::env::set_var("TEST_PORT", "5432");

		let input = "host = \"${TEST_HOST}:${TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("TEST_HOST");
		std::env::remove_var("TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("TEST_SERVICE_ID", "node-env");

		let config_str = format!(
			r#"
[kv]
implementation = "memory"

[service]
ip = "0.0.0.0"
port = 8080

[cluster]
service_id = "${{TEST_SERVICE_ID}}"
host = "127.0.0.1"
port = 9000
raft_log_path = "/tmp/node-env/raft"

[pipeline]
pipeline_count = 2
steps = ["Validate"]
"#
		);

		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.cluster.service_id, "node-env");

		std::env::remove_var("TEST_SERVICE_ID");
	}

	#[test]
	fn rejects_empty_pipeline_steps() {
		let config_str = sample_config_str().replace(
			r#"steps = ["Validate", "Reserve", "Settle"]"#,
			"steps = []",
		);
		let result: Result<Config, _> = config_str.parse();
		assert!(result.is_err());
	}

	#[test]
	fn rejects_terminal_step_name_in_pipeline_steps() {
		let config_str = sample_config_str().replace(
			r#"steps = ["Validate", "Reserve", "Settle"]"#,
			r#"steps = ["Validate", "Completed"]"#,
		);
		let result: Result<Config, _> = config_str.parse();
		assert!(result.is_err());
	}

	#[test]
	fn rejects_unknown_kv_implementation() {
		let config_str = sample_config_str().replace(
			r#"implementation = "memory""#,
			r#"implementation = "sqlite""#,
		);
		let result: Result<Config, _> = config_str.parse();
		assert!(result.is_err());
	}

	#[test]
	fn accepts_well_formed_config() {
		let config: Config = sample_config_str().parse().unwrap();
		assert_eq!(config.service.port, 8080);
		assert_eq!(config.cluster.max_heartbeat_fail_times, 5);
		assert_eq!(config.pipeline.pipeline_count, 4);
	}
}
