// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Write;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Direction, DumpFilter, FrameTap, DUMP_TARGET};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpOptions {
    pub enabled: bool,
    /// Longer frames are dumped only up to this many bytes.
    pub max_bytes_per_message: usize,
    pub bytes_per_line: usize,
    pub include_timestamp: bool,
    pub include_direction: bool,
    pub filter: DumpFilter,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            enabled: false,
            max_bytes_per_message: 4096,
            bytes_per_line: 16,
            include_timestamp: true,
            include_direction: true,
            filter: DumpFilter::default(),
        }
    }
}

impl DumpOptions {
    /// Header plus hex dump for `data`, or `None` when disabled or filtered out.
    pub(crate) fn render(
        &self,
        direction: Direction,
        remote: &str,
        label: &str,
        data: &[u8],
    ) -> Option<String> {
        if !self.enabled || !self.filter.matches(direction, remote, data.len()) {
            return None;
        }

        let mut parts = Vec::with_capacity(5);
        if self.include_timestamp {
            parts.push(
                chrono::Local::now()
                    .format("%Y-%m-%d %H:%M:%S%.3f")
                    .to_string(),
            );
        }
        if self.include_direction {
            parts.push(direction.to_string());
        }
        parts.push(remote.to_string());
        parts.push(label.to_string());

        let shown = &data[..data.len().min(self.max_bytes_per_message)];
        Some(format!(
            "{}\n{}",
            parts.join(" | "),
            hex_dump(shown, self.bytes_per_line)
        ))
    }
}

/// Classic offset / hex / ASCII dump, one line per `bytes_per_line` bytes:
///
/// ```text
/// 00000000  0A 30 30 30 30 39 50 49  4E 47 0D                 |.00009PING.|
/// ```
pub fn hex_dump(data: &[u8], bytes_per_line: usize) -> String {
    let bytes_per_line = bytes_per_line.max(1);
    let mut out = String::with_capacity(data.len() * 4);

    for (line_no, line) in data.chunks(bytes_per_line).enumerate() {
        let _ = write!(out, "{:08X}  ", line_no * bytes_per_line);
        for j in 0..bytes_per_line {
            match line.get(j) {
                Some(b) => {
                    let _ = write!(out, "{:02X} ", b);
                }
                None => out.push_str("   "),
            }
            if j == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        out.extend(line.iter().map(|&b| {
            if (32..=126).contains(&b) {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    out
}

/// Frame tap that logs a hex dump of every frame through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct FrameDumper {
    options: DumpOptions,
}

impl FrameDumper {
    pub fn new(options: DumpOptions) -> FrameDumper {
        FrameDumper { options }
    }

    pub fn render(
        &self,
        direction: Direction,
        remote: &str,
        frame_index: u64,
        frame: &[u8],
    ) -> Option<String> {
        let label = format!("frame#{} | frameBytes={}", frame_index, frame.len());
        self.options.render(direction, remote, &label, frame)
    }
}

#[async_trait]
impl FrameTap for FrameDumper {
    async fn observe(&self, direction: Direction, remote: &str, frame_index: u64, frame: &[u8]) {
        if let Some(text) = self.render(direction, remote, frame_index, frame) {
            info!(target: DUMP_TARGET, "{}", text);
        }
    }
}
