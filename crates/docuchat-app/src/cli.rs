//! CLI argument definitions for the docuchat client.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use docuchat_core::DocuchatConfig;

/// docuchat: ask questions about a project's documents from the terminal.
#[derive(Parser, Debug)]
#[command(name = "docuchat", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Answering backend base URL.
    #[arg(short = 'b', long = "base-url")]
    pub base_url: Option<String>,

    /// Project whose documents are queried.
    #[arg(short = 'p', long = "project-id")]
    pub project_id: Option<i64>,

    /// Answer and speech language code (en, fr, ja, ...).
    #[arg(long = "language")]
    pub language: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > DOCUCHAT_CONFIG env var > ~/.docuchat/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("DOCUCHAT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Overwrite config values given on the command line.
    pub fn apply_overrides(&self, config: &mut DocuchatConfig) {
        if let Some(ref url) = self.base_url {
            config.backend.base_url = url.clone();
        }
        if let Some(id) = self.project_id {
            config.chat.project_id = id;
        }
        if let Some(ref language) = self.language {
            config.general.language = language.clone();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".docuchat").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".docuchat").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_path_wins() {
        let args = CliArgs::parse_from(["docuchat", "--config", "/tmp/dc.toml"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/dc.toml"));
    }

    #[test]
    fn test_overrides_applied() {
        let args = CliArgs::parse_from([
            "docuchat",
            "--base-url",
            "http://backend:9000",
            "-p",
            "7",
            "--language",
            "fr",
            "-l",
            "debug",
        ]);
        let mut config = DocuchatConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.backend.base_url, "http://backend:9000");
        assert_eq!(config.chat.project_id, 7);
        assert_eq!(config.general.language, "fr");
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_no_flags_leave_config_untouched() {
        let args = CliArgs::parse_from(["docuchat"]);
        let mut config = DocuchatConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.chat.project_id, 1);
        assert_eq!(config.general.language, "");
    }
}
