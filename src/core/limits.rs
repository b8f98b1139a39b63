/*!
 * System Limits and Constants
 *
 * Engine identifier ranges and worker execution budgets.
 * Ranges follow the engine's default server options; changing them here
 * must match the options the engine is booted with.
 */

use super::types::RawId;
use std::time::Duration;

// =============================================================================
// ENGINE IDENTIFIER RANGES
// =============================================================================

/// First node ID handed to clients
/// IDs below this are reserved for groups the engine creates itself
pub const NODE_ID_START: RawId = 1000;

/// Number of node IDs available to the broker
pub const NODE_ID_COUNT: RawId = 1 << 20;

/// First sample buffer ID
pub const BUFFER_ID_START: RawId = 0;

/// Sample buffers available (engine default buffer table size)
pub const BUFFER_ID_COUNT: RawId = 1024;

/// First private audio bus
/// Buses below this are hardware output and input channels
pub const AUDIO_BUS_START: RawId = 16;

/// Private audio buses (1024 audio bus channels minus hardware I/O)
pub const AUDIO_BUS_COUNT: RawId = 1024 - AUDIO_BUS_START;

/// First control bus
pub const CONTROL_BUS_START: RawId = 0;

/// Control buses (engine default control bus channel count)
pub const CONTROL_BUS_COUNT: RawId = 16384;

// =============================================================================
// WORKER EXECUTION
// =============================================================================

/// Default wall-clock budget for one interpreter worker
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared wall-clock budget for a batch run
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-worker wait after a kill signal during shutdown
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Bound on reaping a worker that was just force-terminated
pub const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interpreter executable
pub const DEFAULT_INTERPRETER: &str = "sclang";

/// Scratch file extension expected by the default interpreter
pub const DEFAULT_SCRATCH_EXTENSION: &str = "scd";

/// Prefix for scratch files and batch artifact directories
pub const SCRATCH_PREFIX: &str = "broker";

/// Environment variable carrying a batch item's artifact path to the worker
pub const ARTIFACT_PATH_ENV: &str = "BROKER_ARTIFACT_PATH";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_do_not_overflow() {
        assert!(u64::from(NODE_ID_START) + u64::from(NODE_ID_COUNT) <= u64::from(RawId::MAX));
        assert!(AUDIO_BUS_START + AUDIO_BUS_COUNT == 1024);
    }

    #[test]
    fn test_timeout_ordering() {
        assert!(DEFAULT_EXEC_TIMEOUT < DEFAULT_BATCH_TIMEOUT);
        assert!(DEFAULT_KILL_GRACE < DEFAULT_EXEC_TIMEOUT);
    }
}
