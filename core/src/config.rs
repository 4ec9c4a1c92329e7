//! Fetch options.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Absent timeouts mean "block indefinitely".

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::reader::DEFAULT_BUFFER_SIZE;

/// Socket timeouts in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub connect_ms: Option<u64>,
    pub read_ms: Option<u64>,
    pub write_ms: Option<u64>,
}

impl Timeouts {
    pub fn connect(&self) -> Option<Duration> {
        self.connect_ms.map(Duration::from_millis)
    }

    pub fn read(&self) -> Option<Duration> {
        self.read_ms.map(Duration::from_millis)
    }

    pub fn write(&self) -> Option<Duration> {
        self.write_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsOptions {
    /// Accept any server certificate chain and name. Handshake signatures
    /// are still checked.
    pub insecure_skip_verify: bool,

    /// PEM files whose certificates are trusted in addition to the
    /// bundled web PKI roots.
    pub extra_root_certificates: Vec<PathBuf>,

    /// Treat a peer that closes TCP without sending close_notify as a
    /// truncated response (`ReadError`) instead of a normal end of stream.
    pub require_close_notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchOptions {
    pub timeouts: Timeouts,
    pub buffer_size: usize,
    pub tls: TlsOptions,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            tls: TlsOptions::default(),
        }
    }
}

impl FetchOptions {
    pub fn from_json_str(json: &str) -> Result<Self, FetchError> {
        let options: FetchOptions =
            serde_json::from_str(json).map_err(|e| FetchError::InvalidConfig(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, FetchError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| FetchError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Reject values the socket layer cannot honour.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.buffer_size == 0 {
            return Err(FetchError::InvalidConfig("buffer_size must be positive".into()));
        }
        let timeouts = [
            ("connect_ms", self.timeouts.connect_ms),
            ("read_ms", self.timeouts.read_ms),
            ("write_ms", self.timeouts.write_ms),
        ];
        for (name, value) in timeouts {
            if value == Some(0) {
                return Err(FetchError::InvalidConfig(format!(
                    "timeouts.{name} must be positive; omit it to disable the timeout"
                )));
            }
        }
        Ok(())
    }
}
