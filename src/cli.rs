//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Boardroom - AI executive analysis for business documents
///
/// Submit a business-data file to three parallel executive analysts
/// (CFO, CMO, COO) and receive one synthesized report.
///
/// Examples:
///   boardroom --file q3_results.csv --user alice
///   boardroom --file q3_results.csv --user alice --format json -o report.json
///   boardroom --file q3_results.csv --user alice --model llama3.1:70b
///   boardroom --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Business-data file to analyze
    ///
    /// Not required when using --init-config.
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub file: Option<PathBuf>,

    /// User id the request is submitted as (rate limits apply per user)
    #[arg(short, long, default_value = "local", value_name = "ID")]
    pub user: String,

    /// Model identifier sent to the inference backend
    ///
    /// Can also be set via BOARDROOM_MODEL env var or .boardroom.toml config.
    #[arg(short, long, default_value = "gpt-4o-mini", env = "BOARDROOM_MODEL")]
    pub model: String,

    /// Chat-completions endpoint URL
    #[arg(
        long,
        default_value = "http://localhost:11434/v1/chat/completions",
        env = "BOARDROOM_BACKEND_URL"
    )]
    pub backend_url: String,

    /// API key for the inference backend, if it requires one
    #[arg(long, env = "BOARDROOM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// SQLite database path for the request ledger
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .boardroom.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Temperature for LLM responses (0.0 - 1.0)
    ///
    /// Lower values produce more consistent/deterministic output
    #[arg(long, default_value = "0.2")]
    pub temperature: f32,

    /// Per-attempt request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Additional attempts per role after the first failure
    #[arg(long, value_name = "COUNT")]
    pub retries: Option<u32>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .boardroom.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Validate backend URL format
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            return Err("Backend URL must start with 'http://' or 'https://'".to_string());
        }

        // Validate temperature range
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err("Temperature must be between 0.0 and 1.0".to_string());
        }

        // Validate user id
        if self.user.trim().is_empty() {
            return Err("User id must not be empty".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Validate input file
        if let Some(ref file) = self.file {
            if !file.exists() {
                return Err(format!("Input file does not exist: {}", file.display()));
            }
            if !file.is_file() {
                return Err(format!("Input path is not a file: {}", file.display()));
            }
            if file.file_name().is_none() {
                return Err(format!("Input path has no filename: {}", file.display()));
            }
        }

        Ok(())
    }

    /// Log level derived from the verbosity flags.
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["boardroom", "--file", "Cargo.toml", "--user", "alice"])
    }

    #[test]
    fn test_defaults() {
        let args = base_args();
        assert_eq!(args.format, OutputFormat::Markdown);
        assert_eq!(args.temperature, 0.2);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_temperature() {
        let mut args = base_args();
        args.temperature = 1.5;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_backend_url() {
        let mut args = base_args();
        args.backend_url = "localhost:11434".to_string();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_rejects_verbose_and_quiet() {
        let mut args = base_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_rejects_missing_file() {
        let mut args = base_args();
        args.file = Some(PathBuf::from("definitely/not/here.csv"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = base_args();
        args.init_config = true;
        args.temperature = 9.0;
        assert!(args.validate().is_ok());
    }
}
