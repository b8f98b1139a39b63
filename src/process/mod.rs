/*!
 * Process Module
 * Interpreter workers: execution, cleanup, tracking and shutdown
 */

pub mod batch;
pub mod cleanup;
pub mod executor;
pub mod registry;
pub mod scratch;
pub mod signaler;
pub mod termination;
pub mod types;

// Re-export for convenience
pub use batch::{BatchExecutor, BatchItem, BatchItemError, BatchOutcome, BatchResult};
pub use cleanup::WorkerCleanup;
pub use executor::ScriptExecutor;
pub use registry::ProcessRegistry;
pub use scratch::ScratchFile;
pub use signaler::{GroupSignaler, ProcessSignaler};
pub use termination::{HostSignal, HostTermination, ManualTermination, TerminationSource};
pub use types::{
    CleanupReport, CleanupState, ScriptRequest, ShutdownReport, WorkerHandle, WorkerOutput,
};
