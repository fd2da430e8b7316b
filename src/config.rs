//! Layered configuration for both nodes.
//!
//! Defaults → optional config file (JSON, or TOML for `.toml`) →
//! `VISION_RELAY_*` environment overrides → validation.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{
    ClassVocabulary, PipelineConfig, SuppressionMode, DEFAULT_CONF_THRESHOLD,
    DEFAULT_NMS_THRESHOLD,
};
use crate::field::{
    LinkSettings, SessionSettings, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_KEYWORDS,
    DEFAULT_LINK_ATTEMPTS, DEFAULT_LINK_POLL, DEFAULT_LOOP_POLL, DEFAULT_RECONNECT_BACKOFF,
};
use crate::ingest::HttpSnapshotConfig;
use crate::publish::{AlertPolicy, PublisherTopics, RateGate, DEFAULT_DETECTION_INTERVAL};
use crate::sensing::{SensingSettings, DEFAULT_CONNECTION_RETRY, DEFAULT_ERROR_RETRY};
use crate::transport::{parse_mqtt_endpoint, validate_publish_topic, MqttSettings, TlsMaterials};

const DEFAULT_BROKER_ADDR: &str = "broker.hivemq.com:1883";
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_CAMERA_URL: &str = "http://192.168.8.157:8080/shot.jpg";
const DEFAULT_SENSING_CLIENT_ID: &str = "object-detector-pc";
const DEFAULT_RESULTS_TOPIC: &str = "camera/results";
const DEFAULT_SUMMARY_TOPIC: &str = "esp32/detections";
const DEFAULT_INPUT_SIZE: u32 = 320;

const DEFAULT_CLIENT_ID_PREFIX: &str = "field-node-";
const DEFAULT_STATUS_TOPIC: &str = "esp32/status";
const DEFAULT_READY_MESSAGE: &str = "Field node connected and ready";
const DEFAULT_HEARTBEAT_MESSAGE: &str = "Field node online";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RelayConfigFile {
    broker: Option<BrokerConfigFile>,
    sensing: Option<SensingConfigFile>,
    field: Option<FieldConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BrokerConfigFile {
    addr: Option<String>,
    use_tls: Option<bool>,
    username: Option<String>,
    password: Option<String>,
    tls_ca_path: Option<PathBuf>,
    tls_client_cert_path: Option<PathBuf>,
    tls_client_key_path: Option<PathBuf>,
    keep_alive_secs: Option<u64>,
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SensingConfigFile {
    camera_url: Option<String>,
    fetch_timeout_ms: Option<u64>,
    client_id: Option<String>,
    results_topic: Option<String>,
    summary_topic: Option<String>,
    detection_interval_ms: Option<u64>,
    alert_policy: Option<AlertPolicy>,
    conf_threshold: Option<f32>,
    nms_threshold: Option<f32>,
    suppression: Option<SuppressionMode>,
    labels_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    connection_retry_ms: Option<u64>,
    error_retry_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FieldConfigFile {
    client_id_prefix: Option<String>,
    inbound_topic: Option<String>,
    status_topic: Option<String>,
    ready_message: Option<String>,
    heartbeat_message: Option<String>,
    heartbeat_interval_ms: Option<u64>,
    link_interface: Option<String>,
    link_up_command: Option<Vec<String>>,
    link_attempts: Option<u32>,
    link_poll_ms: Option<u64>,
    reconnect_backoff_ms: Option<u64>,
    loop_poll_ms: Option<u64>,
    keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub broker: BrokerConfig,
    pub sensing: SensingConfig,
    pub field: FieldConfig,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub addr: String,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls_ca_path: Option<PathBuf>,
    pub tls_client_cert_path: Option<PathBuf>,
    pub tls_client_key_path: Option<PathBuf>,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SensingConfig {
    pub camera_url: String,
    pub fetch_timeout: Duration,
    pub client_id: String,
    pub results_topic: String,
    pub summary_topic: String,
    pub detection_interval: Duration,
    pub alert_policy: AlertPolicy,
    pub conf_threshold: f32,
    pub nms_threshold: f32,
    pub suppression: SuppressionMode,
    pub labels_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub connection_retry: Duration,
    pub error_retry: Duration,
}

#[derive(Debug, Clone)]
pub struct FieldConfig {
    pub client_id_prefix: String,
    pub inbound_topic: String,
    pub status_topic: String,
    pub ready_message: String,
    pub heartbeat_message: String,
    pub heartbeat_interval: Duration,
    /// `None` means the host manages the network.
    pub link_interface: Option<String>,
    pub link_up_command: Vec<String>,
    pub link_attempts: u32,
    pub link_poll: Duration,
    pub reconnect_backoff: Duration,
    pub loop_poll: Duration,
    pub keywords: Vec<String>,
}

impl RelayConfig {
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => RelayConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RelayConfigFile) -> Self {
        let broker = file.broker.unwrap_or_default();
        let sensing = file.sensing.unwrap_or_default();
        let field = file.field.unwrap_or_default();

        let broker = BrokerConfig {
            addr: broker
                .addr
                .unwrap_or_else(|| DEFAULT_BROKER_ADDR.to_string()),
            use_tls: broker.use_tls.unwrap_or(false),
            username: broker.username,
            password: broker.password,
            tls_ca_path: broker.tls_ca_path,
            tls_client_cert_path: broker.tls_client_cert_path,
            tls_client_key_path: broker.tls_client_key_path,
            keep_alive: broker
                .keep_alive_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_KEEP_ALIVE),
            connect_timeout: millis_or(broker.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT),
        };

        let sensing = SensingConfig {
            camera_url: sensing
                .camera_url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            fetch_timeout: millis_or(
                sensing.fetch_timeout_ms,
                HttpSnapshotConfig::default().timeout,
            ),
            client_id: sensing
                .client_id
                .unwrap_or_else(|| DEFAULT_SENSING_CLIENT_ID.to_string()),
            results_topic: sensing
                .results_topic
                .unwrap_or_else(|| DEFAULT_RESULTS_TOPIC.to_string()),
            summary_topic: sensing
                .summary_topic
                .unwrap_or_else(|| DEFAULT_SUMMARY_TOPIC.to_string()),
            detection_interval: millis_or(
                sensing.detection_interval_ms,
                DEFAULT_DETECTION_INTERVAL,
            ),
            alert_policy: sensing.alert_policy.unwrap_or_default(),
            conf_threshold: sensing.conf_threshold.unwrap_or(DEFAULT_CONF_THRESHOLD),
            nms_threshold: sensing.nms_threshold.unwrap_or(DEFAULT_NMS_THRESHOLD),
            suppression: sensing.suppression.unwrap_or_default(),
            labels_path: sensing.labels_path,
            model_path: sensing.model_path,
            input_size: sensing.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            connection_retry: millis_or(sensing.connection_retry_ms, DEFAULT_CONNECTION_RETRY),
            error_retry: millis_or(sensing.error_retry_ms, DEFAULT_ERROR_RETRY),
        };

        let field = FieldConfig {
            client_id_prefix: field
                .client_id_prefix
                .unwrap_or_else(|| DEFAULT_CLIENT_ID_PREFIX.to_string()),
            inbound_topic: field
                .inbound_topic
                .unwrap_or_else(|| DEFAULT_SUMMARY_TOPIC.to_string()),
            status_topic: field
                .status_topic
                .unwrap_or_else(|| DEFAULT_STATUS_TOPIC.to_string()),
            ready_message: field
                .ready_message
                .unwrap_or_else(|| DEFAULT_READY_MESSAGE.to_string()),
            heartbeat_message: field
                .heartbeat_message
                .unwrap_or_else(|| DEFAULT_HEARTBEAT_MESSAGE.to_string()),
            heartbeat_interval: millis_or(field.heartbeat_interval_ms, DEFAULT_HEARTBEAT_INTERVAL),
            link_interface: field.link_interface,
            link_up_command: field.link_up_command.unwrap_or_default(),
            link_attempts: field.link_attempts.unwrap_or(DEFAULT_LINK_ATTEMPTS),
            link_poll: millis_or(field.link_poll_ms, DEFAULT_LINK_POLL),
            reconnect_backoff: millis_or(field.reconnect_backoff_ms, DEFAULT_RECONNECT_BACKOFF),
            loop_poll: millis_or(field.loop_poll_ms, DEFAULT_LOOP_POLL),
            keywords: field
                .keywords
                .unwrap_or_else(|| DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()),
        };

        Self {
            broker,
            sensing,
            field,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_string("VISION_RELAY_BROKER_ADDR") {
            self.broker.addr = addr;
        }
        if let Some(value) = env_string("VISION_RELAY_MQTT_USE_TLS") {
            self.broker.use_tls = parse_bool("VISION_RELAY_MQTT_USE_TLS", &value)?;
        }
        if let Some(user) = env_string("VISION_RELAY_MQTT_USERNAME") {
            self.broker.username = Some(user);
        }
        if let Some(password) = env_string("VISION_RELAY_MQTT_PASSWORD") {
            self.broker.password = Some(password);
        }
        if let Some(path) = env_string("VISION_RELAY_MQTT_TLS_CA_PATH") {
            self.broker.tls_ca_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("VISION_RELAY_MQTT_TLS_CLIENT_CERT_PATH") {
            self.broker.tls_client_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("VISION_RELAY_MQTT_TLS_CLIENT_KEY_PATH") {
            self.broker.tls_client_key_path = Some(PathBuf::from(path));
        }

        if let Some(url) = env_string("VISION_RELAY_CAMERA_URL") {
            self.sensing.camera_url = url;
        }
        if let Some(value) = env_string("VISION_RELAY_CONF_THRESHOLD") {
            self.sensing.conf_threshold = value
                .parse()
                .map_err(|_| anyhow!("VISION_RELAY_CONF_THRESHOLD must be a number"))?;
        }
        if let Some(value) = env_string("VISION_RELAY_NMS_THRESHOLD") {
            self.sensing.nms_threshold = value
                .parse()
                .map_err(|_| anyhow!("VISION_RELAY_NMS_THRESHOLD must be a number"))?;
        }
        if let Some(value) = env_string("VISION_RELAY_SUPPRESSION") {
            self.sensing.suppression = value.parse()?;
        }
        if let Some(value) = env_string("VISION_RELAY_DETECTION_INTERVAL_MS") {
            self.sensing.detection_interval = env_millis("VISION_RELAY_DETECTION_INTERVAL_MS", &value)?;
        }
        if let Some(value) = env_string("VISION_RELAY_ALERT_POLICY") {
            self.sensing.alert_policy = parse_alert_policy(&value)?;
        }
        if let Some(path) = env_string("VISION_RELAY_MODEL_PATH") {
            self.sensing.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("VISION_RELAY_LABELS_PATH") {
            self.sensing.labels_path = Some(PathBuf::from(path));
        }

        if let Some(interface) = env_string("VISION_RELAY_LINK_INTERFACE") {
            self.field.link_interface = Some(interface);
        }
        if let Some(value) = env_string("VISION_RELAY_KEYWORDS") {
            let parsed = split_csv(&value);
            if !parsed.is_empty() {
                self.field.keywords = parsed;
            }
        }
        if let Some(value) = env_string("VISION_RELAY_HEARTBEAT_INTERVAL_MS") {
            self.field.heartbeat_interval = env_millis("VISION_RELAY_HEARTBEAT_INTERVAL_MS", &value)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        parse_mqtt_endpoint(&self.broker.addr, self.broker.use_tls)?;
        if self.broker.tls_client_cert_path.is_some() != self.broker.tls_client_key_path.is_some() {
            return Err(anyhow!(
                "MQTT TLS client certificate and key must be configured together"
            ));
        }
        if self.broker.keep_alive < MIN_KEEP_ALIVE {
            return Err(anyhow!(
                "broker keep-alive must be at least {} seconds",
                MIN_KEEP_ALIVE.as_secs()
            ));
        }

        let sensing = &self.sensing;
        unit_interval("conf_threshold", sensing.conf_threshold)?;
        unit_interval("nms_threshold", sensing.nms_threshold)?;
        if sensing.input_size == 0 {
            return Err(anyhow!("input_size must be greater than zero"));
        }
        if sensing.detection_interval.is_zero() {
            return Err(anyhow!("detection interval must be greater than zero"));
        }
        if sensing.fetch_timeout.is_zero() {
            return Err(anyhow!("fetch timeout must be greater than zero"));
        }
        if let AlertPolicy::RequireQuiet { empty_cycles: 0 } = sensing.alert_policy {
            return Err(anyhow!("require_quiet alert policy needs at least one empty cycle"));
        }
        if sensing.client_id.trim().is_empty() {
            return Err(anyhow!("sensing client id must not be empty"));
        }
        validate_publish_topic(&sensing.results_topic).context("results_topic")?;
        validate_publish_topic(&sensing.summary_topic).context("summary_topic")?;

        let field = &self.field;
        if field.inbound_topic.trim().is_empty() {
            return Err(anyhow!("inbound_topic must not be empty"));
        }
        validate_publish_topic(&field.status_topic).context("status_topic")?;
        if field.link_attempts == 0 {
            return Err(anyhow!("link_attempts must be greater than zero"));
        }
        if field.heartbeat_interval.is_zero() {
            return Err(anyhow!("heartbeat interval must be greater than zero"));
        }
        if field.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(anyhow!("category keywords must not be empty"));
        }
        Ok(())
    }

    pub fn mqtt_settings(&self) -> Result<MqttSettings> {
        let endpoint = parse_mqtt_endpoint(&self.broker.addr, self.broker.use_tls)?;
        let tls = TlsMaterials::load(
            self.broker.tls_ca_path.as_deref(),
            self.broker.tls_client_cert_path.as_deref(),
            self.broker.tls_client_key_path.as_deref(),
        )?;
        Ok(MqttSettings {
            endpoint,
            tls,
            username: self.broker.username.clone(),
            password: self.broker.password.clone(),
            keep_alive: self.broker.keep_alive,
            connect_timeout: self.broker.connect_timeout,
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            conf_threshold: self.sensing.conf_threshold,
            nms_threshold: self.sensing.nms_threshold,
            suppression: self.sensing.suppression,
        }
    }

    /// Labels file if configured, built-in COCO labels otherwise.
    pub fn vocabulary(&self) -> Result<ClassVocabulary> {
        match self.sensing.labels_path.as_deref() {
            Some(path) => ClassVocabulary::load(path),
            None => Ok(ClassVocabulary::coco()),
        }
    }

    pub fn publisher_topics(&self) -> PublisherTopics {
        PublisherTopics {
            results: self.sensing.results_topic.clone(),
            summary: self.sensing.summary_topic.clone(),
        }
    }

    pub fn rate_gate(&self) -> RateGate {
        RateGate::new(self.sensing.detection_interval, self.sensing.alert_policy)
    }

    pub fn sensing_settings(&self) -> SensingSettings {
        SensingSettings {
            connection_retry: self.sensing.connection_retry,
            error_retry: self.sensing.error_retry,
            ..SensingSettings::default()
        }
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            attempts: self.field.link_attempts,
            poll_interval: self.field.link_poll,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            client_id_prefix: self.field.client_id_prefix.clone(),
            inbound_topic: self.field.inbound_topic.clone(),
            status_topic: self.field.status_topic.clone(),
            ready_message: self.field.ready_message.clone(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<RelayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn env_millis(key: &str, value: &str) -> Result<Duration> {
    let ms: u64 = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be an integer number of milliseconds", key))?;
    Ok(Duration::from_millis(ms))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean", key)),
    }
}

/// `every_interval` or `require_quiet:<N>`.
fn parse_alert_policy(value: &str) -> Result<AlertPolicy> {
    let value = value.trim();
    if value == "every_interval" {
        return Ok(AlertPolicy::EveryInterval);
    }
    if let Some(n) = value.strip_prefix("require_quiet:") {
        let empty_cycles = n
            .trim()
            .parse()
            .map_err(|_| anyhow!("require_quiet needs a cycle count, got '{}'", n))?;
        return Ok(AlertPolicy::RequireQuiet { empty_cycles });
    }
    Err(anyhow!(
        "unknown alert policy '{}': expected 'every_interval' or 'require_quiet:<N>'",
        value
    ))
}

fn unit_interval(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
