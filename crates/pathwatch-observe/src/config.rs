#![forbid(unsafe_code)]

//! Dirty-check scheduler configuration.

/// Default bound on re-check cycles per scheduled run.
pub const DEFAULT_MAX_CHECK_CYCLES: u32 = 10;

/// Environment variable read by [`SchedulerConfig::from_env`].
pub const MAX_CHECK_CYCLES_ENV: &str = "PATHWATCH_MAX_CHECK_CYCLES";

/// Tunables for the dirty-check scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How many times one scheduled run may re-run its pass because callbacks
    /// requested another check. The first pass is not counted, so a run does
    /// at most `max_check_cycles + 1` passes. Exceeding it logs an error and
    /// stops the run.
    pub max_check_cycles: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_check_cycles: DEFAULT_MAX_CHECK_CYCLES,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_check_cycles(mut self, cycles: u32) -> Self {
        self.max_check_cycles = cycles;
        self
    }

    /// Defaults overridden by `PATHWATCH_MAX_CHECK_CYCLES` when it parses.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(MAX_CHECK_CYCLES_ENV).ok().as_deref())
    }

    /// Resolve from a raw variable value. Unparsable input keeps the default.
    #[must_use]
    pub fn from_env_value(raw: Option<&str>) -> Self {
        let config = Self::default();
        match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(cycles) => config.with_max_check_cycles(cycles),
                Err(_) => {
                    tracing::warn!(
                        value = raw,
                        env = MAX_CHECK_CYCLES_ENV,
                        "ignoring unparsable check-cycle bound"
                    );
                    config
                }
            },
            None => config,
        }
    }
}
