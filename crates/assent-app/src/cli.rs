//! CLI argument definitions for the assent binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// assent: pending intents and their confirmation.
#[derive(Parser, Debug)]
#[command(name = "assent", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the expiry sweeper until Ctrl-C.
    Serve,
    /// Run a single sweep pass and print what it did.
    Sweep,
    /// List the intents of a session, newest first.
    List {
        #[arg(short = 's', long = "session")]
        session: String,
        #[arg(short = 'n', long = "limit", default_value_t = 20)]
        limit: u32,
    },
    /// Show one intent.
    Show { intent_id: Uuid },
    /// Resolve a confirmation reply for a session using dry-run gateways.
    Reply {
        #[arg(short = 's', long = "session")]
        session: String,
        /// Kind hint ("email", "declaration", "payment").
        #[arg(short = 'k', long = "kind", default_value = "email")]
        kind: String,
        /// The user's reply, e.g. "yes" or "2".
        text: String,
    },
    /// List intents stuck in `executing`.
    Stuck {
        /// Move them to `cancelled`.
        #[arg(long = "cancel")]
        cancel: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > ASSENT_CONFIG env var > ~/.assent/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("ASSENT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory.
    ///
    /// Returns `None` if not overridden (use config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level.
    ///
    /// Returns `None` if not overridden.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".assent").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".assent").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let args =
            CliArgs::try_parse_from(["assent", "list", "--session", "s1", "--limit", "5"]).unwrap();
        assert_eq!(
            args.command,
            Command::List {
                session: "s1".to_string(),
                limit: 5
            }
        );
    }

    #[test]
    fn test_parse_globals_and_stuck() {
        let args = CliArgs::try_parse_from([
            "assent",
            "--data-dir",
            "/tmp/assent",
            "-l",
            "debug",
            "stuck",
            "--cancel",
        ])
        .unwrap();
        assert_eq!(args.command, Command::Stuck { cancel: true });
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/tmp/assent"));
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
    }

    #[test]
    fn test_show_requires_uuid() {
        assert!(CliArgs::try_parse_from(["assent", "show", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4();
        let args = CliArgs::try_parse_from(["assent", "show", &id.to_string()]).unwrap();
        assert_eq!(args.command, Command::Show { intent_id: id });
    }

    #[test]
    fn test_parse_reply() {
        let args =
            CliArgs::try_parse_from(["assent", "reply", "-s", "s1", "-k", "payment", "sim"])
                .unwrap();
        assert_eq!(
            args.command,
            Command::Reply {
                session: "s1".to_string(),
                kind: "payment".to_string(),
                text: "sim".to_string()
            }
        );

        let args = CliArgs::try_parse_from(["assent", "reply", "--session", "s1", "2"]).unwrap();
        assert!(matches!(args.command, Command::Reply { ref kind, .. } if kind == "email"));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let args =
            CliArgs::try_parse_from(["assent", "-c", "/etc/assent.toml", "sweep"]).unwrap();
        assert_eq!(
            args.resolve_config_path(),
            PathBuf::from("/etc/assent.toml")
        );
    }
}
