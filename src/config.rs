// src/config.rs
//! Pool configuration: immutable value type plus the builder that
//! validates it.
//!
//! The pool's core only ever consumes a [`PoolConfig`] that has already
//! passed [`PoolConfigBuilder::build`]; nothing in `pool.rs`,
//! `ring_buffer.rs`, `fast_path.rs`, or `controller.rs` re-validates these
//! values at runtime.

use crate::error::{PoolError, Result};
use std::time::Duration;

/// Presets for the shrink controller's aggressiveness, from disabled (0)
/// to most eager (5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggressivenessLevel {
    /// Auto-shrink disabled entirely.
    Off,
    /// Conservative: long idle window, small steps.
    Low,
    /// Default production behaviour.
    Moderate,
    /// Slightly more eager than `Moderate`.
    Aggressive,
    /// Shrinks quickly and in larger steps.
    VeryAggressive,
    /// Shrinks as fast as the cooldown allows.
    Extreme,
}

impl AggressivenessLevel {
    /// Numeric level, from `0` (`Off`) to `5` (`Extreme`).
    pub fn level(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Low => 1,
            Self::Moderate => 2,
            Self::Aggressive => 3,
            Self::VeryAggressive => 4,
            Self::Extreme => 5,
        }
    }

    /// Expands this level into a concrete shrink parameter bundle.
    ///
    /// `initial_capacity` and `min_capacity` seed `idle_threshold` and
    /// `shrink_cooldown` scaling for presets that are otherwise
    /// capacity-agnostic.
    pub fn preset(self) -> ShrinkPreset {
        match self {
            Self::Off => ShrinkPreset {
                check_interval: Duration::from_secs(30),
                idle_threshold: Duration::from_secs(300),
                min_idle_before_shrink: 1,
                shrink_cooldown: Duration::from_secs(300),
                min_util_before_shrink: 0.1,
                stable_underutil_rounds: 10,
                shrink_percent: 0.0,
                max_consecutive_shrinks: 0,
            },
            Self::Low => ShrinkPreset {
                check_interval: Duration::from_secs(15),
                idle_threshold: Duration::from_secs(120),
                min_idle_before_shrink: 4,
                shrink_cooldown: Duration::from_secs(60),
                min_util_before_shrink: 0.15,
                stable_underutil_rounds: 6,
                shrink_percent: 0.1,
                max_consecutive_shrinks: 3,
            },
            Self::Moderate => ShrinkPreset {
                check_interval: Duration::from_secs(10),
                idle_threshold: Duration::from_secs(60),
                min_idle_before_shrink: 3,
                shrink_cooldown: Duration::from_secs(30),
                min_util_before_shrink: 0.25,
                stable_underutil_rounds: 4,
                shrink_percent: 0.2,
                max_consecutive_shrinks: 5,
            },
            Self::Aggressive => ShrinkPreset {
                check_interval: Duration::from_secs(5),
                idle_threshold: Duration::from_secs(30),
                min_idle_before_shrink: 2,
                shrink_cooldown: Duration::from_secs(15),
                min_util_before_shrink: 0.35,
                stable_underutil_rounds: 3,
                shrink_percent: 0.3,
                max_consecutive_shrinks: 8,
            },
            Self::VeryAggressive => ShrinkPreset {
                check_interval: Duration::from_secs(2),
                idle_threshold: Duration::from_secs(10),
                min_idle_before_shrink: 2,
                shrink_cooldown: Duration::from_secs(5),
                min_util_before_shrink: 0.45,
                stable_underutil_rounds: 2,
                shrink_percent: 0.4,
                max_consecutive_shrinks: 12,
            },
            Self::Extreme => ShrinkPreset {
                check_interval: Duration::from_millis(500),
                idle_threshold: Duration::from_secs(3),
                min_idle_before_shrink: 1,
                shrink_cooldown: Duration::from_secs(1),
                min_util_before_shrink: 0.5,
                stable_underutil_rounds: 1,
                shrink_percent: 0.5,
                max_consecutive_shrinks: 20,
            },
        }
    }
}

/// A concrete bundle of shrink parameters produced by
/// [`AggressivenessLevel::preset`].
#[derive(Debug, Clone, Copy)]
pub struct ShrinkPreset {
    pub check_interval: Duration,
    pub idle_threshold: Duration,
    pub min_idle_before_shrink: u32,
    pub shrink_cooldown: Duration,
    pub min_util_before_shrink: f64,
    pub stable_underutil_rounds: u32,
    pub shrink_percent: f64,
    pub max_consecutive_shrinks: u32,
}

/// Basic pool sizing and diagnostics options.
#[derive(Debug, Clone)]
pub struct BasicConfig {
    /// L2 starting size; also informs controller thresholds.
    pub initial_capacity: usize,
    /// Maximum total object count (L1 + L2 + in-use).
    pub hard_limit: usize,
    /// Enables diagnostic log emission.
    pub verbose: bool,
    /// Enables non-critical counters (hit/miss breakdowns).
    pub enable_stats: bool,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            hard_limit: 1024,
            verbose: false,
            enable_stats: true,
        }
    }
}

/// Growth behaviour, shared in shape between the main pool and the fast
/// path: the fast path grows and shrinks with its own thresholds, but
/// the same growth/shrink config shape as L2.
#[derive(Debug, Clone, Copy)]
pub struct GrowthConfig {
    /// Switches from exponential to fixed growth at `initial * factor`.
    pub exp_threshold_factor: f64,
    /// Exponential step as a fraction of current capacity.
    pub growth_percent: f64,
    /// Fixed step as a fraction of the initial capacity.
    pub fixed_growth_factor: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            exp_threshold_factor: 4.0,
            growth_percent: 0.5,
            fixed_growth_factor: 0.25,
        }
    }
}

/// Shrink behaviour, shared in shape between the main pool and the fast
/// path.
#[derive(Debug, Clone, Copy)]
pub struct ShrinkConfig {
    pub aggressiveness_level: AggressivenessLevel,
    pub check_interval: Duration,
    pub idle_threshold: Duration,
    pub min_idle_before_shrink: u32,
    pub shrink_cooldown: Duration,
    pub min_util_before_shrink: f64,
    pub stable_underutil_rounds: u32,
    pub shrink_percent: f64,
    pub max_consecutive_shrinks: u32,
    pub min_capacity: usize,
}

impl ShrinkConfig {
    /// Builds a `ShrinkConfig` from an [`AggressivenessLevel`] preset and a
    /// floor capacity.
    pub fn from_level(level: AggressivenessLevel, min_capacity: usize) -> Self {
        let p = level.preset();
        Self {
            aggressiveness_level: level,
            check_interval: p.check_interval,
            idle_threshold: p.idle_threshold,
            min_idle_before_shrink: p.min_idle_before_shrink,
            shrink_cooldown: p.shrink_cooldown,
            min_util_before_shrink: p.min_util_before_shrink,
            stable_underutil_rounds: p.stable_underutil_rounds,
            shrink_percent: p.shrink_percent,
            max_consecutive_shrinks: p.max_consecutive_shrinks,
            min_capacity,
        }
    }
}

impl Default for ShrinkConfig {
    fn default() -> Self {
        Self::from_level(AggressivenessLevel::Moderate, 4)
    }
}

/// Fast-path (L1) specific options.
#[derive(Debug, Clone)]
pub struct FastPathConfig {
    /// L1 starting capacity.
    pub initial_size: usize,
    /// Target fill ratio after a refill (0..1).
    pub fill_aggressiveness: f64,
    /// Refill triggers when L1 occupancy drops to or below this fraction.
    pub refill_percent: f64,
    /// L1 grows after this many L2 growth events.
    pub growth_events_trigger: u32,
    /// L1 shrinks after this many L2 shrink events.
    pub shrink_events_trigger: u32,
    /// Growth parameters applied to L1.
    pub growth: GrowthConfig,
    /// Shrink parameters applied to L1.
    pub shrink: ShrinkConfig,
    /// Retry count inside the pre-read block hook.
    pub pre_read_block_hook_attempts: u32,
}

impl Default for FastPathConfig {
    fn default() -> Self {
        Self {
            initial_size: 8,
            fill_aggressiveness: 0.75,
            refill_percent: 0.25,
            growth_events_trigger: 3,
            shrink_events_trigger: 3,
            growth: GrowthConfig::default(),
            shrink: ShrinkConfig::from_level(AggressivenessLevel::Moderate, 2),
            pre_read_block_hook_attempts: 3,
        }
    }
}

/// Ring buffer (L2) blocking-mode options.
#[derive(Debug, Clone, Copy)]
pub struct RingBufferConfig {
    /// Blocking vs non-blocking mode.
    pub block: bool,
    /// Maximum wait for a blocking read.
    pub read_timeout: Duration,
    /// Maximum wait for a blocking write.
    pub write_timeout: Duration,
    /// Budget for asynchronous close to wait for outstanding releases.
    pub close_drain_timeout: Duration,
    /// Poll interval while asynchronous close waits for releases.
    pub close_poll_interval: Duration,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            block: true,
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            close_drain_timeout: Duration::from_secs(10),
            close_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Complete, immutable pool configuration.
///
/// Build one with [`PoolConfigBuilder`] rather than constructing this
/// directly; the builder is what enforces the validation rules below.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub basic: BasicConfig,
    pub growth: GrowthConfig,
    pub shrink: ShrinkConfig,
    pub fast_path: FastPathConfig,
    pub ring_buffer: RingBufferConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let basic = BasicConfig::default();
        Self {
            shrink: ShrinkConfig::from_level(AggressivenessLevel::Moderate, basic.initial_capacity / 4),
            basic,
            growth: GrowthConfig::default(),
            fast_path: FastPathConfig::default(),
            ring_buffer: RingBufferConfig::default(),
        }
    }
}

/// Builder that validates a [`PoolConfig`] before it reaches the pool core.
///
/// # Examples
///
/// ```
/// use adapool::config::PoolConfigBuilder;
///
/// let config = PoolConfigBuilder::new()
///     .initial_capacity(32)
///     .hard_limit(256)
///     .build()
///     .unwrap();
/// assert_eq!(config.basic.initial_capacity, 32);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolConfigBuilder {
    /// Starts from [`PoolConfig::default`].
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Starts from an already-assembled config (e.g. to tweak one field of
    /// a preset before validating it).
    pub fn from_config(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn initial_capacity(mut self, value: usize) -> Self {
        self.config.basic.initial_capacity = value;
        self
    }

    pub fn hard_limit(mut self, value: usize) -> Self {
        self.config.basic.hard_limit = value;
        self
    }

    pub fn verbose(mut self, value: bool) -> Self {
        self.config.basic.verbose = value;
        self
    }

    pub fn enable_stats(mut self, value: bool) -> Self {
        self.config.basic.enable_stats = value;
        self
    }

    pub fn growth(mut self, value: GrowthConfig) -> Self {
        self.config.growth = value;
        self
    }

    pub fn shrink(mut self, value: ShrinkConfig) -> Self {
        self.config.shrink = value;
        self
    }

    pub fn aggressiveness(mut self, level: AggressivenessLevel) -> Self {
        let min_capacity = self.config.shrink.min_capacity;
        self.config.shrink = ShrinkConfig::from_level(level, min_capacity);
        self
    }

    pub fn min_capacity(mut self, value: usize) -> Self {
        self.config.shrink.min_capacity = value;
        self
    }

    pub fn fast_path(mut self, value: FastPathConfig) -> Self {
        self.config.fast_path = value;
        self
    }

    pub fn ring_buffer(mut self, value: RingBufferConfig) -> Self {
        self.config.ring_buffer = value;
        self
    }

    pub fn blocking(mut self, value: bool) -> Self {
        self.config.ring_buffer.block = value;
        self
    }

    /// Validates every field and returns the finished config.
    pub fn build(self) -> Result<PoolConfig> {
        let c = &self.config;

        if c.basic.initial_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "initial_capacity must be > 0".into(),
            ));
        }
        if c.basic.hard_limit < c.basic.initial_capacity {
            return Err(PoolError::InvalidConfig(
                "hard_limit must be >= initial_capacity".into(),
            ));
        }
        if c.basic.hard_limit < c.shrink.min_capacity {
            return Err(PoolError::InvalidConfig(
                "hard_limit must be >= min_capacity".into(),
            ));
        }

        if c.growth.exp_threshold_factor <= 0.0 {
            return Err(PoolError::InvalidConfig(
                "exp_threshold_factor must be > 0".into(),
            ));
        }
        if c.growth.growth_percent <= 0.0 {
            return Err(PoolError::InvalidConfig("growth_percent must be > 0".into()));
        }
        if c.growth.fixed_growth_factor <= 0.0 {
            return Err(PoolError::InvalidConfig(
                "fixed_growth_factor must be > 0".into(),
            ));
        }

        validate_shrink(&c.shrink)?;

        if c.fast_path.initial_size == 0 {
            return Err(PoolError::InvalidConfig(
                "fast_path.initial_size must be > 0".into(),
            ));
        }
        if !(c.fast_path.fill_aggressiveness > 0.0 && c.fast_path.fill_aggressiveness <= 1.0) {
            return Err(PoolError::InvalidConfig(
                "fast_path.fill_aggressiveness must be in (0, 1]".into(),
            ));
        }
        if !(c.fast_path.refill_percent > 0.0 && c.fast_path.refill_percent < 1.0) {
            return Err(PoolError::InvalidConfig(
                "fast_path.refill_percent must be in (0, 1)".into(),
            ));
        }
        if c.fast_path.growth_events_trigger == 0 {
            return Err(PoolError::InvalidConfig(
                "fast_path.growth_events_trigger must be > 0".into(),
            ));
        }
        if c.fast_path.shrink_events_trigger == 0 {
            return Err(PoolError::InvalidConfig(
                "fast_path.shrink_events_trigger must be > 0".into(),
            ));
        }
        if c.fast_path.growth.exp_threshold_factor <= 0.0
            || c.fast_path.growth.growth_percent <= 0.0
            || c.fast_path.growth.fixed_growth_factor <= 0.0
        {
            return Err(PoolError::InvalidConfig(
                "fast_path.growth sub-block failed validation".into(),
            ));
        }
        validate_shrink(&c.fast_path.shrink)?;

        Ok(self.config)
    }
}

/// Computes the next L2/L1 capacity for a growth step: exponential
/// (a percentage of current capacity) until `initial * exp_threshold_factor`
/// is reached, then fixed-size steps (a percentage of the initial
/// capacity) afterward. Always grows by at least one slot and never past
/// `hard_limit`.
pub(crate) fn compute_growth(current: usize, initial: usize, cfg: &GrowthConfig, hard_limit: usize) -> usize {
    let threshold = (initial as f64 * cfg.exp_threshold_factor).ceil() as usize;
    let step = if current < threshold {
        ((current as f64) * cfg.growth_percent).ceil() as usize
    } else {
        ((initial as f64) * cfg.fixed_growth_factor).ceil() as usize
    };
    let step = step.max(1);
    (current + step).min(hard_limit.max(current))
}

fn validate_shrink(s: &ShrinkConfig) -> Result<()> {
    if s.check_interval.is_zero() {
        return Err(PoolError::InvalidConfig("check_interval must be > 0".into()));
    }
    if s.idle_threshold < s.check_interval {
        return Err(PoolError::InvalidConfig(
            "idle_threshold must be >= check_interval".into(),
        ));
    }
    // aggressiveness 0 (Off) disables auto-shrink; the remaining rules
    // still apply so a later re-enable via `aggressiveness()` is safe.
    if s.min_idle_before_shrink == 0 && s.aggressiveness_level.level() != 0 {
        return Err(PoolError::InvalidConfig(
            "min_idle_before_shrink must be > 0".into(),
        ));
    }
    if s.shrink_cooldown.is_zero() {
        return Err(PoolError::InvalidConfig("shrink_cooldown must be > 0".into()));
    }
    if !(s.min_util_before_shrink > 0.0 && s.min_util_before_shrink <= 1.0) {
        return Err(PoolError::InvalidConfig(
            "min_util_before_shrink must be in (0, 1]".into(),
        ));
    }
    if s.stable_underutil_rounds == 0 && s.aggressiveness_level.level() != 0 {
        return Err(PoolError::InvalidConfig(
            "stable_underutil_rounds must be > 0".into(),
        ));
    }
    if s.aggressiveness_level.level() != 0 && !(s.shrink_percent > 0.0 && s.shrink_percent <= 1.0) {
        return Err(PoolError::InvalidConfig(
            "shrink_percent must be in (0, 1]".into(),
        ));
    }
    if s.min_capacity == 0 {
        return Err(PoolError::InvalidConfig("min_capacity must be > 0".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_builds() {
        let config = PoolConfigBuilder::new().build().unwrap();
        assert_eq!(config.basic.initial_capacity, 16);
    }

    #[test]
    fn test_rejects_zero_initial_capacity() {
        let err = PoolConfigBuilder::new()
            .initial_capacity(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_hard_limit_below_initial() {
        let err = PoolConfigBuilder::new()
            .initial_capacity(10)
            .hard_limit(5)
            .build()
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_bad_util_threshold() {
        let mut shrink = ShrinkConfig::default();
        shrink.min_util_before_shrink = 0.0;
        let err = PoolConfigBuilder::new().shrink(shrink).build().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_off_aggressiveness_skips_idle_rules() {
        let config = PoolConfigBuilder::new()
            .aggressiveness(AggressivenessLevel::Off)
            .build()
            .unwrap();
        assert_eq!(config.shrink.aggressiveness_level.level(), 0);
    }

    #[test]
    fn test_presets_are_monotonically_more_eager() {
        let low = AggressivenessLevel::Low.preset();
        let extreme = AggressivenessLevel::Extreme.preset();
        assert!(extreme.shrink_percent > low.shrink_percent);
        assert!(extreme.check_interval < low.check_interval);
    }

    #[test]
    fn test_compute_growth_exponential_then_fixed() {
        let cfg = GrowthConfig::default();
        let first = compute_growth(16, 16, &cfg, 1024);
        assert!(first > 16);
        // push past the exponential threshold (16 * 4.0 = 64)
        let past_threshold = compute_growth(100, 16, &cfg, 1024);
        let expected_fixed_step = ((16_f64) * cfg.fixed_growth_factor).ceil() as usize;
        assert_eq!(past_threshold, 100 + expected_fixed_step);
    }

    #[test]
    fn test_compute_growth_respects_hard_limit() {
        let cfg = GrowthConfig::default();
        let grown = compute_growth(1000, 16, &cfg, 1024);
        assert_eq!(grown, 1024);
    }
}
