use crate::error::{ErrorKind, Result};
use crate::{DEFAULT_HWM, DEFAULT_MAX_WM_DELTA};

/// Settings shared by every pipe pair built from it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on `hwm - lwm` for large watermarks.
    pub max_wm_delta: u64,

    /// High watermark used by `PipeOptions::from_config`.
    pub default_hwm: u64,
}

impl Config {
    pub fn new() -> Self {
        Self {
            max_wm_delta: DEFAULT_MAX_WM_DELTA,
            default_hwm: DEFAULT_HWM,
        }
    }

    pub fn with_max_wm_delta(mut self, delta: u64) -> Self {
        self.max_wm_delta = delta;
        self
    }

    pub fn with_default_hwm(mut self, hwm: u64) -> Self {
        self.default_hwm = hwm;
        self
    }

    /// Checks the settings before any pipe is built from them.
    pub fn validate(&self) -> Result<()> {
        // A zero delta would put the low watermark on top of the high one.
        if self.max_wm_delta == 0 {
            return Err(ErrorKind::InvalidConfig.into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-endpoint options handed to the pair factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    /// Inbound high watermark in messages; 0 means unbounded.
    pub hwm: u64,

    /// Read pending inbound messages before honouring a peer's termination.
    pub delay: bool,
}

impl PipeOptions {
    pub fn new() -> Self {
        Self {
            hwm: DEFAULT_HWM,
            delay: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new().with_hwm(config.default_hwm)
    }

    pub fn with_hwm(mut self, hwm: u64) -> Self {
        self.hwm = hwm;
        self
    }

    pub fn with_delay(mut self, delay: bool) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.max_wm_delta, DEFAULT_MAX_WM_DELTA);
        assert!(config.validate().is_ok());

        let options = PipeOptions::from_config(&config.with_default_hwm(16));
        assert_eq!(options.hwm, 16);
        assert!(options.delay);
    }

    #[test]
    fn test_config_rejects_zero_delta() {
        let config = Config::default().with_max_wm_delta(0);
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }
}
