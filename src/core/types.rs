/*!
 * Core Types
 * Typed identifiers for engine-side resources
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw identifier value as it appears in engine commands
pub type RawId = u32;

/// OS process identifier of an interpreter worker
pub type OsPid = u32;

/// Processing node (synth or group) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub RawId);

/// Sample buffer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferId(pub RawId);

/// Signal bus identifier (audio or control rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(pub RawId);

/// Conversion between a typed identifier and its raw engine value
///
/// Implemented by every identifier the allocator can hand out, so one
/// allocator implementation serves all resource kinds.
pub trait ResourceId: Copy + Eq + Ord + std::hash::Hash + fmt::Debug {
    fn from_raw(raw: RawId) -> Self;
    fn raw(self) -> RawId;
}

macro_rules! impl_resource_id {
    ($($ty:ident),* $(,)?) => {
        $(
            impl ResourceId for $ty {
                #[inline]
                fn from_raw(raw: RawId) -> Self {
                    Self(raw)
                }

                #[inline]
                fn raw(self) -> RawId {
                    self.0
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<$ty> for RawId {
                #[inline]
                fn from(id: $ty) -> RawId {
                    id.0
                }
            }
        )*
    };
}

impl_resource_id!(NodeId, BufferId, BusId);

impl ResourceId for RawId {
    #[inline]
    fn from_raw(raw: RawId) -> Self {
        raw
    }

    #[inline]
    fn raw(self) -> RawId {
        self
    }
}
