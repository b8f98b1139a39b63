/*!
 * Engine Allocators
 * One identifier allocator per addressable engine resource kind
 */

use crate::core::id::IdAllocator;
use crate::core::limits::*;
use crate::core::types::{BufferId, BusId, NodeId, RawId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Resource kinds the broker hands identifiers out for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Node,
    Buffer,
    AudioBus,
    ControlBus,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Node,
        ResourceKind::Buffer,
        ResourceKind::AudioBus,
        ResourceKind::ControlBus,
    ];

    /// `(start, size)` of the identifier range for this kind
    pub const fn range(self) -> (RawId, RawId) {
        match self {
            ResourceKind::Node => (NODE_ID_START, NODE_ID_COUNT),
            ResourceKind::Buffer => (BUFFER_ID_START, BUFFER_ID_COUNT),
            ResourceKind::AudioBus => (AUDIO_BUS_START, AUDIO_BUS_COUNT),
            ResourceKind::ControlBus => (CONTROL_BUS_START, CONTROL_BUS_COUNT),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Node => "node",
            ResourceKind::Buffer => "buffer",
            ResourceKind::AudioBus => "audio_bus",
            ResourceKind::ControlBus => "control_bus",
        }
    }

    fn allocator<T: crate::core::types::ResourceId>(self) -> IdAllocator<T> {
        let (start, size) = self.range();
        IdAllocator::new(start, size).named(self.as_str())
    }
}

/// Live-count snapshot for one allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorStats {
    pub kind: ResourceKind,
    pub allocated: usize,
    pub recycled: usize,
    pub capacity: u64,
}

/// The four engine allocators
///
/// Created once when the host starts. Every ID becomes meaningless when the
/// engine process goes away, so `reset_all` is called on engine teardown.
#[derive(Debug)]
pub struct EngineAllocators {
    pub nodes: IdAllocator<NodeId>,
    pub buffers: IdAllocator<BufferId>,
    pub audio_buses: IdAllocator<BusId>,
    pub control_buses: IdAllocator<BusId>,
}

/// Allocators shared between request handlers
pub type SharedAllocators = Arc<Mutex<EngineAllocators>>;

impl EngineAllocators {
    pub fn new() -> Self {
        Self {
            nodes: ResourceKind::Node.allocator(),
            buffers: ResourceKind::Buffer.allocator(),
            audio_buses: ResourceKind::AudioBus.allocator(),
            control_buses: ResourceKind::ControlBus.allocator(),
        }
    }

    /// Wrap in a mutex so concurrent handlers take turns
    pub fn shared() -> SharedAllocators {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Forget every issued ID after the engine was torn down
    pub fn reset_all(&mut self) {
        self.nodes.reset();
        self.buffers.reset();
        self.audio_buses.reset();
        self.control_buses.reset();
        info!("All engine allocators reset");
    }

    pub fn stats(&self) -> Vec<AllocatorStats> {
        ResourceKind::ALL
            .iter()
            .map(|&kind| {
                let (allocated, recycled, capacity) = match kind {
                    ResourceKind::Node => counts(&self.nodes),
                    ResourceKind::Buffer => counts(&self.buffers),
                    ResourceKind::AudioBus => counts(&self.audio_buses),
                    ResourceKind::ControlBus => counts(&self.control_buses),
                };
                AllocatorStats {
                    kind,
                    allocated,
                    recycled,
                    capacity,
                }
            })
            .collect()
    }
}

fn counts<T: crate::core::types::ResourceId>(ids: &IdAllocator<T>) -> (usize, usize, u64) {
    (ids.allocated_count(), ids.recycled_count(), ids.capacity())
}

impl Default for EngineAllocators {
    fn default() -> Self {
        Self::new()
    }
}
