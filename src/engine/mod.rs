/*!
 * Engine Module
 * Identifier bookkeeping for resources living inside the engine
 */

pub mod allocators;

pub use allocators::{AllocatorStats, EngineAllocators, ResourceKind, SharedAllocators};
