//! tabnap: automatic tab discarding daemon and its CLI.
//!
//! The daemon keeps one agent task per browser tab and discards tabs that
//! stay hidden past the configured period, or the oldest ones when too many
//! are open. A browser bridge feeds tab events in and pulls the resulting
//! discard commands over the control socket.

use clap::Parser;

/// Per-tab decision log: `debug` normally, `info` when the `log`
/// preference is on.
macro_rules! decision {
    ($log:expr, $tab_id:expr, $($arg:tt)+) => {
        if $log {
            tracing::info!("tab {}: {}", $tab_id, format_args!($($arg)+))
        } else {
            tracing::debug!("tab {}: {}", $tab_id, format_args!($($arg)+))
        }
    };
}

mod agent;
mod census;
mod cli;
mod client;
mod clock;
mod coordinator;
mod daemon;
mod prefs_store;
mod probe;
mod protocol;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("TABNAP_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("tabnap daemon starting");
            daemon::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Status => client::cmd_status(&socket_path).await?,
        cli::Command::Tabs => client::cmd_tabs(&socket_path).await?,
        cli::Command::Discard(opts) => {
            client::cmd_discard(&socket_path, opts.tab_id, opts.force).await?;
        }
        cli::Command::Prefs => client::cmd_prefs(&socket_path).await?,
        cli::Command::Set(opts) => client::cmd_set(&socket_path, &opts.key, &opts.value).await?,
        cli::Command::Census => client::cmd_census(&socket_path).await?,
    }

    Ok(())
}
