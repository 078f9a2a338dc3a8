use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Parameters of the single control loop that owns discovery and the accessors
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControlConfig {
    /// Capacity of the request channel feeding the control loop
    #[serde(default = "default_request_channel_capacity")]
    pub request_channel_capacity: usize,

    /// How long an accessor waits for the control loop to answer (milliseconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            request_channel_capacity: default_request_channel_capacity(),
            request_timeout_in_ms: default_request_timeout(),
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.request_channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "request_channel_capacity must be greater than 0".into(),
            ));
        }

        if self.request_timeout_in_ms < 1 {
            return Err(Error::InvalidConfig(
                "request_timeout_in_ms must be at least 1ms".into(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }
}

fn default_request_channel_capacity() -> usize {
    128
}
// in ms
fn default_request_timeout() -> u64 {
    10_000
}
