use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::{AsciiFrameCodec, FrameCodec, LengthPrefixedCodec};
use crate::diagnostics::DumpOptions;

use super::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    pub max_connection: usize,
    pub udp_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "127.0.0.1".to_string(),
            port: 9000,
            max_connection: 1024,
            udp_port: 9001,
        }
    }
}

impl NetworkConfig {
    pub fn tcp_address(&self) -> AppResult<SocketAddr> {
        Self::parse_address(&self.ip, self.port)
    }

    pub fn udp_address(&self) -> AppResult<SocketAddr> {
        Self::parse_address(&self.ip, self.udp_port)
    }

    fn parse_address(ip: &str, port: u16) -> AppResult<SocketAddr> {
        format!("{}:{}", ip, port)
            .parse()
            .map_err(|e| AppError::InvalidValue(format!("network address {}:{}: {}", ip, port, e)))
    }
}

/// Wire framing spoken by peers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    /// `0x0A` + 5-digit length + payload + `0x0D`
    #[default]
    Ascii,
    /// 4-byte big-endian length + payload
    LengthPrefixed,
}

/// Framing and receive-side tuning for a peer.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PeerConfig {
    pub codec: CodecKind,
    /// Bytes requested from the connection per read.
    pub read_buffer_size: usize,
    pub initial_buffer_capacity: usize,
    /// Upper bound for the length-prefixed codec.
    pub max_frame_size: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            codec: CodecKind::default(),
            read_buffer_size: 8 * 1024,
            initial_buffer_capacity: 8 * 1024,
            max_frame_size: 1024 * 1024,
        }
    }
}

impl PeerConfig {
    pub fn build_codec(&self) -> Arc<dyn FrameCodec> {
        match self.codec {
            CodecKind::Ascii => Arc::new(AsciiFrameCodec),
            CodecKind::LengthPrefixed => Arc::new(LengthPrefixedCodec::new(self.max_frame_size)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port_name: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub peer: PeerConfig,
    pub serial: SerialConfig,
    pub dump: DumpOptions,
}

impl AppConfig {
    /// Loads the configuration file at `path`, then applies `FRAMELINK__*`
    /// environment overrides (e.g. `FRAMELINK__NETWORK__PORT=9100`).
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<AppConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(
                config::Environment::with_prefix("FRAMELINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }
}
