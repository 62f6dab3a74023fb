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

use std::io::ErrorKind;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    DetailedIoError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("serial port error: {0}")]
    SerialError(#[from] tokio_serial::Error),

    #[error("Accept error = {0}")]
    Accept(String),

    /// framing errors, only produced by `encode`
    #[error("frame too large: {len} bytes exceeds the maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("frame too small: {len} bytes is below the minimum of {min}")]
    FrameTooSmall { len: usize, min: usize },

    /// lifecycle errors
    #[error("use after close: {0}")]
    UseAfterClose(String),

    #[error("operation aborted")]
    OperationAborted,
}

impl AppError {
    /// Whether this error means the counterpart went away (reset, abort,
    /// shutdown) rather than a local fault.
    ///
    /// A receive loop treats these the same as an orderly end of stream.
    pub fn is_disconnect(&self) -> bool {
        match self {
            AppError::OperationAborted => true,
            AppError::IoError(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionRefused
            ),
            _ => false,
        }
    }
}
