//! Configuration and constants for the profiler.

/// Current JSON summary schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

// Pooled storage: records live in fixed power-of-two pages
pub const PAGE_BITS: u32 = 14;

// At every frame boundary the recorder reserves this many times the largest
// per-frame record count seen so far
pub const RESERVE_FACTOR: usize = 3;

// Overhead self-calibration
pub const DEFAULT_CALIBRATION_SAMPLES: u32 = 100_000;
pub const DEFAULT_CALIBRATION_TRIALS: u32 = 5;
pub const CALIBRATION_SAMPLES_ENV: &str = "FPSPROF_CALIBRATION_SAMPLES";
pub const CALIBRATION_TRIALS_ENV: &str = "FPSPROF_CALIBRATION_TRIALS";

// Shutdown outputs of the global registry
pub const SERIALIZE_FILE_ENV: &str = "FPSPROF_SERIALIZE_FILE";
pub const REPORT_FILE_ENV: &str = "FPSPROF_REPORT_FILE";

/// Name given to the synthetic per-thread root node
pub const ROOT_NAME: &str = "<root>";

// Wire format line prefixes
pub const FORMAT_PREFIX: &str = "F:";
pub const PROPS_PREFIX: &str = "P:";
pub const NAME_PREFIX: &str = "N:";
pub const THREAD_PREFIX: &str = "T:";
pub const EVENT_PREFIX: &str = "E:";

/// Format 0 writes names inline, format 1 writes a name table.
pub const FORMAT_INLINE_NAMES: u32 = 0;
pub const FORMAT_NAME_TABLE: u32 = 1;

/// Nanoseconds per tick when a log declares the coarse time resolution
pub const COARSE_TICK_NS: u64 = 100;

/// Report section bits understood by the CLI
pub const REPORT_THREAD_ROOTS: u32 = 1;
pub const REPORT_DETAILED: u32 = 2;
pub const REPORT_NO_RECURSION: u32 = 4;
pub const REPORT_FUNCTIONS: u32 = 8;
pub const REPORT_ALL: u32 = 0xf;
