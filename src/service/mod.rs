pub use app_error::{AppError, AppResult};
pub use config::{AppConfig, CodecKind, NetworkConfig, PeerConfig, SerialConfig};
pub use server::{AckHandler, FrameHandler, Server};
pub use tracing_config::{env_filter, setup_local_tracing, setup_tracing, verbosity_directive};

mod app_error;
mod config;
mod server;
mod tracing_config;
