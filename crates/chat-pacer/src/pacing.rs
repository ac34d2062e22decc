//! Release cadence for paced streams.
//!
//! The controller observes a single signal, the backlog depth after each
//! release, and picks one of four delay regimes:
//!
//! | regime    | condition                                  | delay                         |
//! |-----------|--------------------------------------------|-------------------------------|
//! | ramp-up   | `T < ramp_up_chars`, `B >= ramp_up_headroom` | `base / 3`                  |
//! | slow-down | `B < low_watermark`                        | `base + step * (low - B)`     |
//! | overflow  | `B > high_watermark`                       | `base / 2`                    |
//! | steady    | otherwise                                  | `base`                        |
//!
//! `B` is the backlog depth and `T` the characters released so far. Every
//! delay is capped at [`MAX_PACING_DELAY`].

use std::time::Duration;

use crate::errors::ClientError;

/// Unit delay between two releases in the steady regime.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(15);
/// Liveness wait while the backlog is empty and upstream is still producing.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Below this depth the backlog is at risk of running dry.
pub const DEFAULT_LOW_WATERMARK: usize = 5;
/// Above this depth the backlog is overflowing.
pub const DEFAULT_HIGH_WATERMARK: usize = 20;
/// Depth considered comfortable enough to catch up during ramp-up.
pub const DEFAULT_RAMP_UP_HEADROOM: usize = 10;
/// Released characters after which ramp-up ends.
pub const DEFAULT_RAMP_UP_CHARS: usize = 100;
/// Extra delay per missing chunk below the low watermark.
pub const DEFAULT_SLOW_DOWN_STEP: Duration = Duration::from_millis(5);
/// Upper bound on any single pacing delay.
pub const MAX_PACING_DELAY: Duration = Duration::from_secs(60);

const ENV_BASE_DELAY_MS: &str = "CHAT_PACER_BASE_DELAY_MS";
const ENV_POLL_INTERVAL_MS: &str = "CHAT_PACER_POLL_INTERVAL_MS";
const ENV_LOW_WATERMARK: &str = "CHAT_PACER_LOW_WATERMARK";
const ENV_HIGH_WATERMARK: &str = "CHAT_PACER_HIGH_WATERMARK";

/// Tunable thresholds for the pacing controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacingConfig {
    /// Delay between releases in the steady regime; the other regimes scale it.
    pub base_delay: Duration,
    /// How long the loop waits on an empty backlog before counting a liveness wait.
    pub poll_interval: Duration,
    /// Depth below which releases slow down.
    pub low_watermark: usize,
    /// Depth above which releases speed up to half the base delay.
    pub high_watermark: usize,
    /// Minimum depth for the ramp-up regime.
    pub ramp_up_headroom: usize,
    /// Released characters after which ramp-up no longer applies.
    pub ramp_up_chars: usize,
    /// Extra delay added per chunk missing below `low_watermark`.
    pub slow_down_step: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            low_watermark: DEFAULT_LOW_WATERMARK,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            ramp_up_headroom: DEFAULT_RAMP_UP_HEADROOM,
            ramp_up_chars: DEFAULT_RAMP_UP_CHARS,
            slow_down_step: DEFAULT_SLOW_DOWN_STEP,
        }
    }
}

impl PacingConfig {
    /// Defaults overridden by `CHAT_PACER_*` environment variables when set.
    ///
    /// Recognized keys: `CHAT_PACER_BASE_DELAY_MS`, `CHAT_PACER_POLL_INTERVAL_MS`,
    /// `CHAT_PACER_LOW_WATERMARK`, `CHAT_PACER_HIGH_WATERMARK`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(ms) = parse_var(&lookup, ENV_BASE_DELAY_MS)? {
            config.base_delay = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = parse_var(&lookup, ENV_POLL_INTERVAL_MS)? {
            config.poll_interval = Duration::from_millis(ms as u64);
        }
        if let Some(depth) = parse_var(&lookup, ENV_LOW_WATERMARK)? {
            config.low_watermark = depth;
        }
        if let Some(depth) = parse_var(&lookup, ENV_HIGH_WATERMARK)? {
            config.high_watermark = depth;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the steady-state delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Overrides the liveness wait used while the backlog is empty.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the low/high depth watermarks.
    pub fn watermarks(mut self, low: usize, high: usize) -> Self {
        self.low_watermark = low;
        self.high_watermark = high;
        self
    }

    /// Overrides the ramp-up thresholds.
    pub fn ramp_up(mut self, headroom: usize, chars: usize) -> Self {
        self.ramp_up_headroom = headroom;
        self.ramp_up_chars = chars;
        self
    }

    /// Overrides the per-chunk slow-down increment.
    pub fn slow_down_step(mut self, step: Duration) -> Self {
        self.slow_down_step = step;
        self
    }

    /// Checks that thresholds are usable.
    ///
    /// The slowest possible delay (empty backlog) must not exceed
    /// [`MAX_PACING_DELAY`].
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.poll_interval.is_zero() {
            return Err(ClientError::Config(
                "pacing poll_interval must be greater than 0".into(),
            ));
        }
        if self.low_watermark > self.high_watermark {
            return Err(ClientError::Config(format!(
                "pacing low_watermark ({}) must not exceed high_watermark ({})",
                self.low_watermark, self.high_watermark
            )));
        }
        match self.slow_down_delay(0) {
            Some(slowest) if slowest <= MAX_PACING_DELAY => Ok(()),
            _ => Err(ClientError::Config(format!(
                "pacing slow-down delay with an empty backlog exceeds {MAX_PACING_DELAY:?} \
                 (base_delay {:?}, slow_down_step {:?}, low_watermark {})",
                self.base_delay, self.slow_down_step, self.low_watermark
            ))),
        }
    }

    /// Delay before the next release, given the backlog depth left after the
    /// release just made and the characters released so far.
    ///
    /// Never panics; results saturate at [`MAX_PACING_DELAY`].
    pub fn next_delay(&self, depth: usize, tokens_output: usize) -> Duration {
        let delay = if tokens_output < self.ramp_up_chars && depth >= self.ramp_up_headroom {
            self.base_delay / 3
        } else if depth < self.low_watermark {
            self.slow_down_delay(depth).unwrap_or(MAX_PACING_DELAY)
        } else if depth > self.high_watermark {
            self.base_delay / 2
        } else {
            self.base_delay
        };
        delay.min(MAX_PACING_DELAY)
    }

    /// `base + step * (low - depth)`, or `None` on overflow.
    fn slow_down_delay(&self, depth: usize) -> Option<Duration> {
        let missing = u32::try_from(self.low_watermark.saturating_sub(depth)).ok()?;
        self.base_delay.checked_add(self.slow_down_step.checked_mul(missing)?)
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<usize>, ClientError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<usize>()
        .map(Some)
        .map_err(|e| ClientError::Config(format!("invalid {key}={raw:?}: {e}")))
}

/// Per-stream pacing counters. Created with the stream, dropped with it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PacingState {
    /// Characters released so far.
    pub tokens_output: usize,
    /// Set once the upstream sequence is exhausted.
    pub finished: bool,
    /// Chunks released so far.
    pub released: usize,
    /// Poll intervals spent waiting on an empty backlog.
    pub liveness_waits: usize,
}
