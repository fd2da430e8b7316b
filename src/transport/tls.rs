//! Broker endpoint parsing and TLS materials.
//!
//! Accepted address forms:
//! - `host` or `host:port` (plain TCP unless TLS is forced)
//! - `mqtt://host[:port]`, `tcp://host[:port]` (plain TCP)
//! - `mqtts://host[:port]`, `ssl://host[:port]` (TLS)
//! - `[ipv6]:port`
//!
//! A missing port defaults to 1883, or 8883 when TLS is in effect.

use anyhow::{anyhow, Context, Result};
use rumqttc::Transport;
use std::path::Path;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_MQTTS_PORT: u16 = 8883;

/// Broker host, port and whether to wrap the connection in TLS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl std::fmt::Display for MqttEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.use_tls { "mqtts" } else { "mqtt" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

/// PEM materials for TLS sessions.
///
/// With no CA configured the platform/webpki roots are used.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    pub ca: Option<Vec<u8>>,
    /// Client certificate and key for mutual TLS, always together.
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    pub fn load(
        ca_path: Option<&Path>,
        client_cert_path: Option<&Path>,
        client_key_path: Option<&Path>,
    ) -> Result<Self> {
        let ca = match ca_path {
            Some(path) => Some(
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA '{}'", path.display()))?,
            ),
            None => None,
        };

        let client_auth = match (client_cert_path, client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path).with_context(|| {
                    format!("failed to read MQTT TLS client cert '{}'", cert_path.display())
                })?;
                let key = std::fs::read(key_path).with_context(|| {
                    format!("failed to read MQTT TLS client key '{}'", key_path.display())
                })?;
                Some((cert, key))
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(anyhow!("MQTT TLS client certificate provided without key"))
            }
            (None, Some(_)) => {
                return Err(anyhow!("MQTT TLS client key provided without certificate"))
            }
        };

        Ok(Self { ca, client_auth })
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }

    /// Build the rumqttc transport for `endpoint`.
    ///
    /// Fails when TLS materials are supplied for a plain-TCP endpoint, or
    /// when client auth is supplied without a CA.
    pub fn build_transport(&self, endpoint: &MqttEndpoint) -> Result<Transport> {
        if !endpoint.use_tls {
            if self.is_configured() {
                return Err(anyhow!(
                    "MQTT TLS materials provided but TLS is disabled; use an mqtts:// broker address"
                ));
            }
            return Ok(Transport::tcp());
        }

        if !self.is_configured() {
            return Ok(Transport::tls_with_default_config());
        }

        let ca = self.ca.clone().ok_or_else(|| {
            anyhow!("MQTT TLS CA certificate is required when providing client certificates")
        })?;
        Ok(Transport::tls(ca, self.client_auth.clone(), None))
    }
}

pub fn parse_mqtt_endpoint(addr: &str, tls_override: bool) -> Result<MqttEndpoint> {
    let mut use_tls = tls_override;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }
    if remainder.is_empty() {
        return Err(anyhow!("MQTT broker address is empty"));
    }

    let default_port = if use_tls {
        DEFAULT_MQTTS_PORT
    } else {
        DEFAULT_MQTT_PORT
    };
    let (host, port) = split_host_port(remainder, default_port)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str, default_port: u16) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = match rest.strip_prefix(':') {
            Some(port) => parse_port(port, addr)?,
            None if rest.is_empty() => default_port,
            None => return Err(anyhow!("invalid MQTT address: {}", addr)),
        };
        return Ok((host.to_string(), port));
    }

    match addr.rsplit_once(':') {
        // More than one colon without brackets: bare IPv6 literal.
        Some((host, _)) if host.contains(':') => Ok((addr.to_string(), default_port)),
        Some((host, port)) => Ok((host.to_string(), parse_port(port, addr)?)),
        None => Ok((addr.to_string(), default_port)),
    }
}

fn parse_port(port: &str, addr: &str) -> Result<u16> {
    port.parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))
}
