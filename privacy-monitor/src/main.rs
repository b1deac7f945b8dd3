/*!
Privacy Monitor: watches a browser's cookie store and activity feed,
classifies cookies, counts trackers and deletes harmful cookies on request
*/

use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, crate_version};
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::core::{
    config::MonitorConfig,
    console::{self, ConsoleCommand},
    error::{MonitorError, Result},
    tracker::{PrivacyMonitor, command_channel},
};
use privacy_engine::{CookieFilter, CookieKey};

mod browser;
mod core;

fn cli() -> Command {
    Command::new("privacy-monitor")
        .version(crate_version!())
        .about("Monitors browser cookies and trackers in real-time")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the TOML config file")
                .value_name("PATH")
                .global(true)
        )
        .arg(
            Arg::new("cookie-db")
                .short('p')
                .long("cookie-db")
                .help("Path to the browser cookie database")
                .value_name("PATH")
                .global(true)
        )
        .arg(
            Arg::new("state-db")
                .long("state-db")
                .help("Path to the monitor state database")
                .value_name("PATH")
                .global(true)
        )
        .arg(
            Arg::new("activity-log")
                .long("activity-log")
                .help("JSON-lines feed of browser requests, navigations, pixels and scripts")
                .value_name("PATH")
                .global(true)
        )
        .arg(
            Arg::new("domain")
                .short('d')
                .long("domain")
                .help("Only track cookies for this host")
                .value_name("HOST")
                .global(true)
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log at debug level unless RUST_LOG is set")
                .action(ArgAction::SetTrue)
                .global(true)
        )
        .subcommand(
            Command::new("run")
                .about("Watch the browser until interrupted")
                .arg(
                    Arg::new("interactive")
                        .short('i')
                        .long("interactive")
                        .help("Accept console commands on stdin")
                        .action(ArgAction::SetTrue)
                )
        )
        .subcommand(Command::new("scan").about("Read the cookie store once and report"))
        .subcommand(Command::new("status").about("Show saved registry statistics"))
        .subcommand(Command::new("score").about("Print the privacy score"))
        .subcommand(
            Command::new("cookies")
                .about("List classified cookies")
                .arg(
                    Arg::new("filter")
                        .value_parser(["all", "harmful", "tracking", "essential"])
                        .default_value("all")
                )
        )
        .subcommand(Command::new("trackers").about("List observed trackers"))
        .subcommand(
            Command::new("block")
                .about("Block a tracker domain")
                .arg(Arg::new("target").value_name("DOMAIN").required(true))
        )
        .subcommand(
            Command::new("unblock")
                .about("Unblock a tracker domain")
                .arg(Arg::new("target").value_name("DOMAIN").required(true))
        )
        .subcommand(
            Command::new("delete")
                .about("Delete one cookie from the browser")
                .arg(Arg::new("cookie-domain").value_name("COOKIE_DOMAIN").required(true))
                .arg(Arg::new("name").value_name("NAME").required(true))
                .arg(Arg::new("path").value_name("PATH"))
        )
        .subcommand(Command::new("purge").about("Delete every harmful cookie from the browser"))
        .subcommand(
            Command::new("init-config")
                .about("Write the default config file")
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help("Overwrite an existing file")
                        .action(ArgAction::SetTrue)
                )
        )
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn load_config(matches: &ArgMatches) -> Result<(PathBuf, MonitorConfig)> {
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(MonitorConfig::default_path);
    let mut config = MonitorConfig::load(&config_path).await?;

    if let Some(path) = matches.get_one::<String>("cookie-db") {
        config.source.cookie_db_path = PathBuf::from(path);
    }
    if let Some(path) = matches.get_one::<String>("state-db") {
        config.state.state_db_path = PathBuf::from(path);
    }
    if let Some(path) = matches.get_one::<String>("activity-log") {
        config.source.activity_log_path = Some(PathBuf::from(path));
    }
    if let Some(domain) = matches.get_one::<String>("domain") {
        config.source.domain_filter = Some(domain.clone());
    }
    Ok((config_path, config))
}

/// Serve `commands` from a short-lived monitor loop, then shut it down
async fn run_once(monitor: &mut PrivacyMonitor, commands: Vec<ConsoleCommand>) -> Result<()> {
    let (handle, receiver) = command_channel(commands.len().max(1));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let client = async move {
        let mut outcome = Ok(());
        for command in commands {
            match command.execute(&handle).await {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        let _ = stop_tx.send(());
        outcome
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };

    let (served, outcome) = tokio::join!(monitor.run(receiver, shutdown), client);
    served?;
    outcome
}

async fn run_forever(mut monitor: PrivacyMonitor, interactive: bool) -> Result<()> {
    let (handle, commands) = command_channel(32);
    if interactive {
        tokio::spawn(console::run_stdin(handle));
    } else {
        drop(handle);
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown");
    };
    monitor.run(commands, shutdown).await
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let (config_path, mut config) = load_config(&matches).await?;

    let Some((name, sub)) = matches.subcommand() else {
        return Ok(());
    };

    if name == "init-config" {
        if config_path.exists() && !sub.get_flag("force") {
            return Err(format!("{:?} already exists (use --force to overwrite)", config_path).into());
        }
        MonitorConfig::default().save(&config_path).await?;
        println!("Wrote default config to {:?}", config_path);
        return Ok(());
    }

    if name == "run" {
        let monitor = PrivacyMonitor::new(config).await?;
        let interactive = sub.get_flag("interactive");
        run_forever(monitor, interactive).await?;
        if interactive {
            // A pending stdin read would otherwise keep the runtime alive
            std::process::exit(0);
        }
        return Ok(());
    }

    // One-shot commands report on stdout; keep the notification outputs quiet
    config.outputs.clear();
    config.source.activity_log_path = None;
    let mut monitor = PrivacyMonitor::new(config).await?;

    let commands = match name {
        "scan" => {
            let filter = matches.get_one::<String>("domain").cloned();
            let found = monitor.refresh_cookies(filter.as_deref()).await?;
            println!("Read {} cookies from the browser", found);
            vec![ConsoleCommand::Status, ConsoleCommand::Cookies(CookieFilter::Harmful)]
        }
        "status" => vec![ConsoleCommand::Status],
        "score" => vec![ConsoleCommand::Score],
        "cookies" => {
            let filter = match sub.get_one::<String>("filter").map(String::as_str) {
                Some("harmful") => CookieFilter::Harmful,
                Some("tracking") => CookieFilter::Tracking,
                Some("essential") => CookieFilter::Essential,
                _ => CookieFilter::All,
            };
            vec![ConsoleCommand::Cookies(filter)]
        }
        "trackers" => vec![ConsoleCommand::Trackers],
        "block" | "unblock" => {
            let domain = sub
                .get_one::<String>("target")
                .cloned()
                .ok_or_else(|| MonitorError::Other("missing domain".to_string()))?;
            if name == "block" {
                vec![ConsoleCommand::Block(domain)]
            } else {
                vec![ConsoleCommand::Unblock(domain)]
            }
        }
        "delete" => {
            let (Some(domain), Some(cookie_name)) = (
                sub.get_one::<String>("cookie-domain"),
                sub.get_one::<String>("name"),
            ) else {
                return Err("delete needs a cookie domain and name".into());
            };
            let path = sub.get_one::<String>("path").map(String::as_str);
            vec![ConsoleCommand::Delete(CookieKey::new(domain.as_str(), cookie_name.as_str(), path))]
        }
        "purge" => vec![ConsoleCommand::Purge],
        other => return Err(format!("unknown command {}", other).into()),
    };

    run_once(&mut monitor, commands).await?;
    Ok(())
}
