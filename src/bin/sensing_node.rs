//! sensing_node - Camera object detection relayed over MQTT.
//!
//! Each cycle:
//! 1. Pulls a snapshot from the camera
//! 2. Scores it and decodes detections
//! 3. Publishes a JSON event and a plain-text summary, at most once per interval
//!
//! Ctrl-C stops the loop at the next cycle boundary and disconnects.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use vision_relay::config::RelayConfig;
use vision_relay::detect::{DetectionPipeline, Scorer, StubScorer};
use vision_relay::ingest::{open_source, FrameSource};
use vision_relay::publish::{EventPublisher, PublishOutcome};
use vision_relay::sensing::SensingNode;
use vision_relay::transport::{BrokerSession, LoopbackBroker, MqttConnector, ReconnectingSession};

#[path = "../ui.rs"]
mod ui;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    /// Scripted scorer that never detects anything.
    Stub,
    /// ONNX model via tract (needs the `backend-tract` feature).
    Tract,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Camera object detection relayed over MQTT")]
struct Args {
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = "VISION_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Camera snapshot URL (overrides config).
    #[arg(long)]
    camera_url: Option<String>,

    /// Scorer backend. Defaults to tract when a model is configured.
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Publish into an in-process broker instead of MQTT.
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many cycles.
    #[arg(long)]
    max_cycles: Option<u64>,

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
    if let Some(url) = &args.camera_url {
        cfg.sensing.camera_url = url.clone();
    }

    let source = open_source(&cfg.sensing.camera_url, cfg.sensing.fetch_timeout)
        .with_context(|| format!("invalid camera url {}", cfg.sensing.camera_url))?;
    log::info!("Frame source: {}", source.describe());

    let mut scorer = {
        let _stage = ui.stage("Load scorer");
        build_scorer(args.backend, &cfg)?
    };
    scorer.warm_up().context("scorer warm-up failed")?;
    log::info!("Scorer backend: {}", scorer.name());

    let pipeline = DetectionPipeline::new(cfg.pipeline_config(), cfg.vocabulary()?);
    let publisher = EventPublisher::new(cfg.publisher_topics(), cfg.rate_gate());
    let mut node = SensingNode::new(source, scorer, pipeline, publisher, cfg.sensing_settings());

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        ctrlc::set_handler(move || quit.store(true, Ordering::Relaxed))
            .context("error setting Ctrl-C handler")?;
    }

    let backoff = node.settings().connection_retry;
    if args.dry_run {
        let broker = LoopbackBroker::new();
        let mut session =
            ReconnectingSession::connect(broker.connector(), &cfg.sensing.client_id, backoff)?;
        log::info!("Dry run: publishing to the in-process broker");
        run_loop(&mut node, &mut session, &ui, &quit, args.max_cycles);
        log::info!("Dry run published {} messages", broker.published().len());
        return Ok(());
    }

    let connector = MqttConnector::new(cfg.mqtt_settings()?);
    let endpoint = connector.endpoint().to_string();
    let mut session = {
        let _stage = ui.stage("Connect to MQTT broker");
        ReconnectingSession::connect(connector, &cfg.sensing.client_id, backoff)
            .with_context(|| format!("failed to connect to {}", endpoint))?
    };
    log::info!("Connected to MQTT broker: {}", endpoint);

    run_loop(&mut node, &mut session, &ui, &quit, args.max_cycles);
    session.close();
    Ok(())
}

fn build_scorer(backend: Option<BackendKind>, cfg: &RelayConfig) -> Result<Box<dyn Scorer>> {
    let backend = backend.unwrap_or(if cfg.sensing.model_path.is_some() {
        BackendKind::Tract
    } else {
        BackendKind::Stub
    });
    match backend {
        BackendKind::Stub => {
            log::warn!("Using the stub scorer: no objects will be detected");
            Ok(Box::new(StubScorer::new()))
        }
        BackendKind::Tract => build_tract(cfg),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(cfg: &RelayConfig) -> Result<Box<dyn Scorer>> {
    let path = cfg
        .sensing
        .model_path
        .as_deref()
        .ok_or_else(|| anyhow!("the tract backend needs sensing.model_path"))?;
    let scorer = vision_relay::detect::TractScorer::new(path, cfg.sensing.input_size)?;
    Ok(Box::new(scorer))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_cfg: &RelayConfig) -> Result<Box<dyn Scorer>> {
    Err(anyhow!(
        "sensing_node was built without the backend-tract feature"
    ))
}

fn run_loop<F, S, B>(
    node: &mut SensingNode<F, S>,
    session: &mut B,
    ui: &ui::Ui,
    quit: &AtomicBool,
    max_cycles: Option<u64>,
) where
    F: FrameSource,
    S: Scorer,
    B: BrokerSession,
{
    log::info!("Starting object detection (Ctrl-C to quit)");
    let status = ui.status_line();
    let mut cycles = 0u64;
    while !quit.load(Ordering::Relaxed) && max_cycles.map_or(true, |max| cycles < max) {
        cycles += 1;
        match node.cycle(session, Instant::now(), SystemTime::now()) {
            Ok(report) => {
                let note = match report.outcome {
                    PublishOutcome::Emitted { .. } => " (sent)",
                    PublishOutcome::RateLimited => " (held)",
                    PublishOutcome::NothingDetected => "",
                };
                status.update(format!("Objects: {}{}", report.detections.len(), note));
            }
            Err(e) => {
                if e.is_connection_error() {
                    log::warn!("Connection error: {}", e);
                } else {
                    log::warn!("Error: {}", e);
                }
                std::thread::sleep(e.retry_delay(node.settings()));
            }
        }
    }
    status.finish();
    log::info!(
        "Stopped after {} cycles ({} frames captured)",
        cycles,
        node.source().frames_captured()
    );
}
