/*!
 * Engine Broker Library
 *
 * Brokers work between a control layer and an external signal-processing
 * engine plus its scripting interpreter:
 * - Recyclable identifiers for engine nodes, buffers and buses
 * - Interpreter source execution in isolated, time-bounded workers
 * - Tracking and bulk termination of in-flight workers at shutdown
 */

pub mod config;
pub mod core;
pub mod engine;
pub mod monitoring;
pub mod process;

// Re-exports
pub use config::BrokerConfig;
pub use crate::core::errors::{BrokerError, ConfigError, ProcessError, ProcessResult};
pub use crate::core::id::IdAllocator;
pub use crate::core::types::{BufferId, BusId, NodeId, OsPid, RawId, ResourceId};
pub use engine::{EngineAllocators, ResourceKind, SharedAllocators};
pub use monitoring::init_tracing;
pub use process::{
    BatchExecutor, BatchItem, BatchOutcome, GroupSignaler, HostSignal, ProcessRegistry,
    ScriptExecutor, ScriptRequest, ShutdownReport,
};
