//! Frame and wire diagnostics.
//!
//! A [`FrameTap`] observes every decoded (or sent) frame of a peer without
//! being able to influence its control flow. [`FrameDumper`] is the stock
//! tap: it renders a hex dump and emits it through `tracing` under the
//! `framelink::dump` target, so dumps land wherever logging is routed.
//! [`WireTapConnection`] dumps raw transport chunks instead of frames.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use dumper::{hex_dump, DumpOptions, FrameDumper};
pub use wiretap::WireTapConnection;

mod dumper;
mod wiretap;

/// `tracing` target every dump is emitted under.
pub const DUMP_TARGET: &str = "framelink::dump";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

/// Which directions a dump filter lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpDirection {
    None,
    Rx,
    Tx,
    #[default]
    Both,
}

impl DumpDirection {
    pub fn allows(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (DumpDirection::Both, _)
                | (DumpDirection::Rx, Direction::Rx)
                | (DumpDirection::Tx, Direction::Tx)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpFilter {
    pub direction: DumpDirection,
    pub min_bytes: Option<usize>,
    pub max_bytes: Option<usize>,
    /// Case-insensitive substrings; when non-empty the endpoint must contain one.
    pub allow_endpoint_contains: Vec<String>,
    /// Case-insensitive substrings; an endpoint containing any is rejected.
    pub deny_endpoint_contains: Vec<String>,
}

impl DumpFilter {
    pub fn matches(&self, direction: Direction, endpoint: &str, len: usize) -> bool {
        if !self.direction.allows(direction) {
            return false;
        }
        if self.min_bytes.is_some_and(|min| len < min) {
            return false;
        }
        if self.max_bytes.is_some_and(|max| len > max) {
            return false;
        }

        let endpoint = endpoint.to_lowercase();
        let contains = |needle: &String| !needle.is_empty() && endpoint.contains(&needle.to_lowercase());

        if !self.allow_endpoint_contains.is_empty()
            && !self.allow_endpoint_contains.iter().any(contains)
        {
            return false;
        }
        !self.deny_endpoint_contains.iter().any(contains)
    }
}

/// Observer of frames flowing through a peer.
///
/// Called at most once per frame, in frame order, before the frame reaches
/// the application. Implementations cannot fail the peer.
#[async_trait]
pub trait FrameTap: Send + Sync {
    async fn observe(&self, direction: Direction, remote: &str, frame_index: u64, frame: &[u8]);
}
