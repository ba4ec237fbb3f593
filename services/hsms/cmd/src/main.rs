//! HSMS endpoint binary.
//!
//! Runs one HSMS session in active or passive mode, logs every session event
//! and optionally answers primary messages with an empty reply.

use clap::Parser;
use hsms_session::{Role, Session, SessionEvent, SessionHandle};
use hsms_wire::Message;
use std::{net::IpAddr, path::PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::HsmsConfig;
use logging::HsmsLogFormatter;

/// HSMS (SEMI E37) endpoint
#[derive(Parser, Debug)]
#[command(name = "hsms", version, about = "HSMS endpoint in active or passive mode")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Peer address (active) or listen address (passive)
    #[arg(long)]
    ip: Option<IpAddr>,

    /// TCP port
    #[arg(long)]
    port: Option<u16>,

    /// Session id
    #[arg(long)]
    device: Option<u16>,

    /// Connection mode: active or passive
    #[arg(long)]
    mode: Option<Role>,

    /// Answer primary messages with an empty reply
    #[arg(long)]
    echo: bool,

    /// Linktest interval in seconds, 0 disables
    #[arg(long)]
    link_test: Option<u64>,

    /// Stop after this long, e.g. 30s
    #[arg(long)]
    run_for: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Command line flags take precedence over file and environment
    fn apply(&self, config: &mut HsmsConfig) {
        if let Some(ip) = self.ip {
            config.ip = ip;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(interval) = self.link_test {
            config.timers = config.timers.with_link_test(interval);
        }
        if self.echo {
            config.echo = true;
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("hsms={}", args.log_level).parse()?)
        .add_directive(format!("hsms_session={}", args.log_level).parse()?)
        .add_directive(format!("hsms_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(true)
        .event_format(HsmsLogFormatter::new("hsms"))
        .init();

    info!("Starting HSMS endpoint v{}", env!("CARGO_PKG_VERSION"));

    let mut config = HsmsConfig::load_from_file(&args.config)?;
    args.apply(&mut config);

    let mut handle = Session::new(config.session_config()).start()?;
    info!(
        "Session started ({:?} {} device {})",
        config.mode,
        config.address(),
        config.device
    );

    let deadline = args.run_for.map(|d| tokio::time::Instant::now() + *d);
    let run_limit = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(run_limit);

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGINT handler: {}", e))?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT signal, shutting down");
                break;
            }

            _ = &mut run_limit => {
                info!("Run time elapsed, shutting down");
                break;
            }

            event = handle.next_event() => {
                match event {
                    Some(event) => handle_event(&handle, &config, event).await,
                    None => {
                        info!("Event channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    handle.stop().await?;
    info!("HSMS endpoint shutdown complete");
    Ok(())
}

async fn handle_event(handle: &SessionHandle, config: &HsmsConfig, event: SessionEvent) {
    match event {
        SessionEvent::Connected => info!("Connected, state {}", handle.state().as_str()),
        SessionEvent::Established => info!("Session selected"),
        SessionEvent::Deselected => info!("Session deselected"),
        SessionEvent::SelectFailed { status } => warn!("Select refused with status {}", status),
        SessionEvent::DeselectFailed { status } => warn!("Deselect refused with status {}", status),
        SessionEvent::Dropped { reason } => warn!("Connection dropped: {}", reason),
        SessionEvent::Timeout { timer, message } => match message {
            Some(message) => warn!("{} expired waiting on {}", timer, message),
            None => warn!("{} expired", timer),
        },
        SessionEvent::Alive => debug!("Linktest answered"),
        SessionEvent::Sent(message) => debug!("Sent {}", message),
        SessionEvent::Received(message) => {
            info!("Received {}", message);
            for item in message.as_data().map(|d| d.items()).unwrap_or_default() {
                debug!("  {:?}", item);
            }
            if config.echo && message.as_data().is_some() && message.is_reply_required() {
                echo(handle, &message).await;
            }
        }
    }
}

async fn echo(handle: &SessionHandle, primary: &Message) {
    let reply = match Message::reply_to(primary, Vec::new()) {
        Ok(reply) => reply,
        Err(e) => {
            component_warn!("echo", "Cannot build reply to {}: {}", primary, e);
            return;
        }
    };
    match handle.send(reply).await {
        Ok(sent) => component_debug!("echo", "Replied with {}", sent),
        Err(e) => component_info!("echo", "Reply to {} not sent: {}", primary, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "hsms",
            "--ip",
            "10.1.1.1",
            "--port",
            "7000",
            "--mode",
            "passive",
            "--link-test",
            "20",
            "--echo",
            "--run-for",
            "30s",
        ]);
        let mut config = HsmsConfig::default();
        config.device = 9;
        args.apply(&mut config);

        assert_eq!(config.address(), "10.1.1.1:7000".parse().unwrap());
        assert_eq!(config.mode, Role::Passive);
        assert_eq!(config.device, 9);
        assert!(config.echo);
        assert_eq!(config.timers.link_test(), Some(Duration::from_secs(20)));
        assert_eq!(args.run_for.map(Duration::from), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(Args::try_parse_from(["hsms", "--mode", "sideways"]).is_err());
    }
}
