//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tabnap_core::TabId;
use tabnap_host::power::DEFAULT_POWER_SUPPLY_DIR;

use crate::census::{DEFAULT_DEBOUNCE_MS, DEFAULT_INTRODUCE_TIMEOUT_MS};
use crate::coordinator::DEFAULT_PROBE_TIMEOUT_MS;

#[derive(Parser)]
#[command(name = "tabnap", about = "automatic browser tab discarder")]
pub struct Cli {
    /// UDS socket path (default: /tmp/tabnap-$USER/tabnapd.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (coordinator + UDS server)
    Daemon(DaemonOpts),
    /// Show daemon status summary
    Status,
    /// List known tabs
    Tabs,
    /// Ask a tab's agent to discard it
    Discard(DiscardOpts),
    /// Print current preferences (JSON)
    Prefs,
    /// Change one preference
    Set(SetOpts),
    /// Run the tab census now
    Census,
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// Preferences file (default: $XDG_CONFIG_HOME/tabnap/prefs.toml)
    #[arg(long, env = "TABNAP_PREFS")]
    pub prefs: Option<PathBuf>,

    /// Quiet period before a census runs
    #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
    pub census_debounce_ms: u64,

    /// Per-tab answer timeout during a census
    #[arg(long, default_value_t = DEFAULT_INTRODUCE_TIMEOUT_MS)]
    pub introduce_timeout_ms: u64,

    /// Reload reactivated tabs that do not come back on their own
    #[arg(long)]
    pub restore_probe: bool,

    /// Restore probe delay and ping timeout
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_MS)]
    pub probe_timeout_ms: u64,

    /// sysfs power_supply class directory
    #[arg(long, default_value = DEFAULT_POWER_SUPPLY_DIR)]
    pub power_supply_dir: PathBuf,
}

#[derive(clap::Args)]
pub struct DiscardOpts {
    pub tab_id: TabId,

    /// Ignore exceptions and discard mode (census-style bypass)
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args)]
pub struct SetOpts {
    /// Storage key, e.g. `period` or `whitelist-url`
    pub key: String,
    /// JSON value; bare words are taken as strings
    pub value: String,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/tabnap/tabnapd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/tabnap-{user}/tabnapd.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_defaults() {
        let cli = Cli::try_parse_from(["tabnap", "daemon"]).expect("parse");
        let Command::Daemon(opts) = cli.command else {
            panic!("expected daemon");
        };
        assert_eq!(opts.census_debounce_ms, 500);
        assert_eq!(opts.introduce_timeout_ms, 1_000);
        assert_eq!(opts.probe_timeout_ms, 1_500);
        assert!(!opts.restore_probe);
        assert_eq!(opts.power_supply_dir, PathBuf::from("/sys/class/power_supply"));
    }

    #[test]
    fn global_socket_flag() {
        let cli = Cli::try_parse_from(["tabnap", "discard", "12", "--force", "-s", "/tmp/x.sock"])
            .expect("parse");
        assert_eq!(cli.socket_path.as_deref(), Some("/tmp/x.sock"));
        let Command::Discard(opts) = cli.command else {
            panic!("expected discard");
        };
        assert_eq!(opts.tab_id, TabId(12));
        assert!(opts.force);
    }

    #[test]
    fn malformed_tab_id_is_rejected() {
        let err = Cli::try_parse_from(["tabnap", "discard", "tab-12"])
            .err()
            .expect("not a tab id");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(err.to_string().contains("invalid tab id"));
    }

    #[test]
    fn set_takes_key_and_value() {
        let cli = Cli::try_parse_from(["tabnap", "set", "period", "120"]).expect("parse");
        let Command::Set(opts) = cli.command else {
            panic!("expected set");
        };
        assert_eq!(opts.key, "period");
        assert_eq!(opts.value, "120");
    }
}
