use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};
use crate::tpdu::MAX_TSAP_LEN;

/// Where and how to reach one PLC.
///
/// The TSAP fields and `shutdown` only matter to the ISO-on-TCP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub source_tsap: String,
    #[serde(default)]
    pub destination_tsap: String,
    /// Send a disconnect request to the peer before closing.
    #[serde(default)]
    pub shutdown: bool,
}

impl ConnectionParameters {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            source_tsap: String::new(),
            destination_tsap: String::new(),
            shutdown: false,
        }
    }

    pub fn with_tsaps(mut self, source: impl Into<String>, destination: impl Into<String>) -> Self {
        self.source_tsap = source.into();
        self.destination_tsap = destination.into();
        self
    }

    pub fn with_shutdown(mut self, shutdown: bool) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// `host:port` form used in logs and errors.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check host and TSAP lengths.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidConfig("host must not be empty".into()));
        }
        for (which, tsap) in [
            ("source", &self.source_tsap),
            ("destination", &self.destination_tsap),
        ] {
            if tsap.len() > MAX_TSAP_LEN {
                return Err(TransportError::InvalidTsap {
                    which,
                    len: tsap.len(),
                    max: MAX_TSAP_LEN,
                });
            }
        }
        Ok(())
    }
}
