//! field_node - Reacts to detection summaries and keeps itself connected.
//!
//! This daemon:
//! 1. Brings up the local link (bounded wait) and a broker session
//! 2. Dispatches each inbound summary by category keyword
//! 3. Publishes a heartbeat on the status topic at a fixed interval
//! 4. On any session error: backs off, repairs the link, reconnects
//!
//! Startup exits if the link or the first session cannot be brought up.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use vision_relay::config::RelayConfig;
use vision_relay::field::{
    ConfiguredLink, ConnectivityManager, FieldNode, HeartbeatScheduler, LinkDriver, MessageRouter,
};
use vision_relay::transport::MqttConnector;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Field node: category reactions over MQTT")]
struct Args {
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = "VISION_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Network interface to supervise (overrides config).
    #[arg(long)]
    interface: Option<String>,

    /// sysfs network root, for containers that remount it.
    #[arg(long, default_value = vision_relay::field::link::DEFAULT_SYSFS_NET)]
    sysfs_root: PathBuf,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        RelayConfig::load_from(args.config.as_deref())?
    };
    if let Some(interface) = &args.interface {
        cfg.field.link_interface = Some(interface.clone());
    }

    let link = ConfiguredLink::from_interface(
        cfg.field.link_interface.as_deref(),
        Some(args.sysfs_root.as_path()),
        cfg.field.link_up_command.clone(),
    );
    log::info!("Link: {}", link.describe());

    let connector = MqttConnector::new(cfg.mqtt_settings()?);
    log::info!("Broker: {}", connector.endpoint());

    let mut connectivity = ConnectivityManager::new(
        link,
        connector,
        cfg.link_settings(),
        cfg.session_settings(),
        cfg.field.reconnect_backoff,
    );
    {
        let _stage = ui.stage("Bring up link and session");
        connectivity
            .start()
            .context("failed to bring up link and broker session")?;
    }

    let router = MessageRouter::from_keywords(cfg.field.keywords.iter().cloned());
    let heartbeat = HeartbeatScheduler::new(
        cfg.field.heartbeat_interval,
        cfg.field.status_topic.clone(),
        cfg.field.heartbeat_message.clone(),
        Instant::now(),
    );
    let mut node = FieldNode::new(connectivity, router, heartbeat, cfg.field.loop_poll);

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        ctrlc::set_handler(move || quit.store(true, std::sync::atomic::Ordering::Relaxed))
            .context("error setting Ctrl-C handler")?;
    }

    let status = ui.status_line();
    node.run(&quit, |state| status.update(format!("Connection: {state}")));
    status.finish();
    Ok(())
}
