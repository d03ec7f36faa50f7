/// Default number of simultaneously live allocations a tracker can hold.
pub const DEFAULT_CAPACITY: usize = 600;

/// Build-time thresholds of a [`Tracker`](crate::Tracker).
///
/// Values are fixed when the tracker's `static` is initialised; there is no runtime knob.
///
/// ```rust
/// use heaptrace::TrackerConfig;
///
/// const CONFIG: TrackerConfig = TrackerConfig::DEFAULT
///     .with_snapshot_floor(32 * 1024)
///     .with_ceiling(256 * 1024);
/// assert_eq!(CONFIG.ceiling, 256 * 1024);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Tracked bytes must exceed this before peak snapshots are taken.
    pub snapshot_floor: usize,
    /// Platform heap usage above this forces a dump of the peak snapshot and a halt.
    pub ceiling: usize,
}

impl TrackerConfig {
    pub const DEFAULT: Self = Self {
        snapshot_floor: 100_000,
        ceiling: 100_000,
    };

    pub const fn with_snapshot_floor(mut self, bytes: usize) -> Self {
        self.snapshot_floor = bytes;
        self
    }

    pub const fn with_ceiling(mut self, bytes: usize) -> Self {
        self.ceiling = bytes;
        self
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
