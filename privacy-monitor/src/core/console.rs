/*!
Line-oriented control console for a running monitor
*/

use privacy_engine::{CookieFilter, CookieKey};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::core::{
    error::{MonitorError, Result},
    tracker::{ActionResult, MonitorHandle},
};

pub const HELP: &str = "commands: status | score | cookies [all|harmful|tracking|essential] | trackers \
| block <domain> | unblock <domain> | delete <domain> <name> [path] | purge | start | stop | help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Score,
    Cookies(CookieFilter),
    Trackers,
    Block(String),
    Unblock(String),
    Delete(CookieKey),
    Purge,
    Monitoring(bool),
    Help,
}

impl ConsoleCommand {
    /// None for blank lines
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("status", []) => ConsoleCommand::Status,
            ("score", []) => ConsoleCommand::Score,
            ("cookies", []) => ConsoleCommand::Cookies(CookieFilter::All),
            ("cookies", [filter]) => ConsoleCommand::Cookies(parse_filter(filter)?),
            ("trackers", []) => ConsoleCommand::Trackers,
            ("block", [domain]) => ConsoleCommand::Block(domain.to_string()),
            ("unblock", [domain]) => ConsoleCommand::Unblock(domain.to_string()),
            ("delete", [domain, name]) => ConsoleCommand::Delete(CookieKey::new(*domain, *name, None)),
            ("delete", [domain, name, path]) => {
                ConsoleCommand::Delete(CookieKey::new(*domain, *name, Some(*path)))
            }
            ("purge", []) => ConsoleCommand::Purge,
            ("start", []) => ConsoleCommand::Monitoring(true),
            ("stop", []) => ConsoleCommand::Monitoring(false),
            ("help", _) => ConsoleCommand::Help,
            _ => return Err(format!("unrecognised command: {}", line.trim())),
        };
        Ok(Some(command))
    }

    /// Run the command against the monitor and render the reply
    pub async fn execute(self, handle: &MonitorHandle) -> Result<String> {
        let output = match self {
            ConsoleCommand::Status => {
                let stats = handle.stats().await?;
                format!(
                    "monitoring {} | score {} | threats {} | cookies {} ({} harmful, {} tracking) | trackers {} | blocked {} | events {}",
                    if stats.monitoring_enabled { "ON" } else { "OFF" },
                    stats.privacy_score,
                    stats.threats,
                    stats.cookies,
                    stats.harmful_cookies,
                    stats.tracking_cookies,
                    stats.trackers,
                    stats.blocked_domains,
                    stats.events_processed
                )
            }
            ConsoleCommand::Score => format!("privacy score: {}", handle.privacy_score().await?),
            ConsoleCommand::Cookies(filter) => {
                let cookies = handle.cookies(filter).await?;
                let mut lines = vec![format!("{} cookies", cookies.len())];
                for record in cookies {
                    let risks: Vec<String> = record
                        .classification
                        .risk_factors
                        .iter()
                        .map(|risk| risk.to_string())
                        .collect();
                    lines.push(format!(
                        "  {} [{}] {}",
                        record.key,
                        record.classification.purpose,
                        risks.join(", ")
                    ));
                }
                lines.join("\n")
            }
            ConsoleCommand::Trackers => {
                let trackers = handle.trackers().await?;
                let mut lines = vec![format!("{} trackers", trackers.len())];
                for tracker in trackers {
                    lines.push(format!(
                        "  {} ({}) {} {} risk, {} requests{}",
                        tracker.name,
                        tracker.domain,
                        tracker.category,
                        tracker.risk_level,
                        tracker.request_count,
                        if tracker.blocked { ", blocked" } else { "" }
                    ));
                }
                lines.join("\n")
            }
            ConsoleCommand::Block(domain) => render(handle.block_domain(domain).await?),
            ConsoleCommand::Unblock(domain) => render(handle.unblock_domain(domain).await?),
            ConsoleCommand::Delete(key) => render(handle.delete_cookie(key).await?),
            ConsoleCommand::Purge => {
                let report = handle.delete_harmful_cookies().await?;
                match report.error {
                    Some(error) => format!("purge failed: {}", error),
                    None => {
                        let mut text = format!(
                            "deleted {} of {} harmful cookies",
                            report.deleted_count, report.total_harmful
                        );
                        for failure in report.errors {
                            text.push_str(&format!("\n  {}", failure));
                        }
                        text
                    }
                }
            }
            ConsoleCommand::Monitoring(enabled) => render(handle.set_monitoring(enabled).await?),
            ConsoleCommand::Help => HELP.to_string(),
        };
        Ok(output)
    }
}

fn parse_filter(word: &str) -> std::result::Result<CookieFilter, String> {
    match word.to_ascii_lowercase().as_str() {
        "all" => Ok(CookieFilter::All),
        "harmful" => Ok(CookieFilter::Harmful),
        "tracking" => Ok(CookieFilter::Tracking),
        "essential" => Ok(CookieFilter::Essential),
        other => Err(format!("unknown cookie filter: {}", other)),
    }
}

fn render(result: ActionResult) -> String {
    match result.error {
        None => "ok".to_string(),
        Some(error) => format!("failed: {}", error),
    }
}

/// Read commands from stdin until it closes or the monitor stops
pub async fn run_stdin(handle: MonitorHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Console input closed");
                return;
            }
            Err(e) => {
                warn!("Console read error: {}", e);
                return;
            }
        };

        match ConsoleCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(command)) => match command.execute(&handle).await {
                Ok(output) => println!("{}", output),
                Err(MonitorError::MonitorStopped) => return,
                Err(e) => println!("error: {}", e),
            },
            Err(message) => println!("{}\n{}", message, HELP),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(ConsoleCommand::parse("   "), Ok(None));
        assert_eq!(ConsoleCommand::parse("SCORE"), Ok(Some(ConsoleCommand::Score)));
        assert_eq!(
            ConsoleCommand::parse("cookies harmful"),
            Ok(Some(ConsoleCommand::Cookies(CookieFilter::Harmful)))
        );
        assert_eq!(
            ConsoleCommand::parse("block doubleclick.net"),
            Ok(Some(ConsoleCommand::Block("doubleclick.net".into())))
        );
        assert_eq!(
            ConsoleCommand::parse("delete .criteo.com uid /x"),
            Ok(Some(ConsoleCommand::Delete(CookieKey::new(".criteo.com", "uid", Some("/x")))))
        );
        assert_eq!(ConsoleCommand::parse("stop"), Ok(Some(ConsoleCommand::Monitoring(false))));
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(ConsoleCommand::parse("cookies tasty").is_err());
        assert!(ConsoleCommand::parse("block").is_err());
        assert!(ConsoleCommand::parse("launch rockets").is_err());
    }

    #[test]
    fn renders_action_results() {
        assert_eq!(render(ActionResult::ok()), "ok");
        assert_eq!(
            render(ActionResult::failure("Cookie not found in cache")),
            "failed: Cookie not found in cache"
        );
    }
}
