/*!
 * Identifier Allocator Tests
 * Range, recycling, reset and invariant checks
 */

use engine_broker::{EngineAllocators, IdAllocator, NodeId, RawId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;

#[test]
fn test_small_range_sequence() {
    let mut ids = IdAllocator::<RawId>::new(1000, 3);

    assert_eq!(ids.alloc(), Some(1000));
    assert_eq!(ids.alloc(), Some(1001));
    assert_eq!(ids.alloc(), Some(1002));
    assert_eq!(ids.alloc(), None);

    ids.free(1001);
    assert_eq!(ids.alloc(), Some(1001));
}

#[test]
fn test_exhaustion_recovers_after_free() {
    let mut ids = IdAllocator::<RawId>::new(0, 2);
    let a = ids.alloc().unwrap();
    ids.alloc().unwrap();
    assert_eq!(ids.alloc(), None);

    ids.free(a);
    assert_eq!(ids.alloc(), Some(a));
}

#[test]
fn test_free_is_idempotent() {
    let mut once = IdAllocator::<RawId>::new(10, 5);
    let mut twice = IdAllocator::<RawId>::new(10, 5);
    for ids in [&mut once, &mut twice] {
        ids.alloc();
        ids.alloc();
    }

    once.free(11);
    twice.free(11);
    twice.free(11);

    assert_eq!(once.allocated_ids(), twice.allocated_ids());
    assert_eq!(once.recycled_count(), twice.recycled_count());
    assert_eq!(once.alloc(), twice.alloc());
}

#[test]
fn test_reset_after_history() {
    let mut ids = IdAllocator::<NodeId>::new(1000, 50);
    let issued: Vec<NodeId> = (0..20).filter_map(|_| ids.alloc()).collect();
    for id in issued.iter().step_by(3) {
        ids.free(*id);
    }

    ids.reset();

    for raw in 1000..1050 {
        assert!(!ids.is_allocated(NodeId(raw)));
    }
    assert_eq!(ids.allocated_ids(), Vec::<NodeId>::new());
    assert_eq!(ids.alloc(), Some(NodeId(1000)));
}

#[test]
fn test_engine_allocators_reset_on_teardown() {
    let mut allocators = EngineAllocators::new();
    let node = allocators.nodes.alloc().unwrap();
    let buffer = allocators.buffers.alloc().unwrap();

    allocators.reset_all();

    assert!(!allocators.nodes.is_allocated(node));
    assert!(!allocators.buffers.is_allocated(buffer));
}

#[derive(Debug, Clone)]
enum Op {
    Alloc,
    Free(RawId),
    Reset,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => Just(Op::Alloc),
        4 => (0u32..40).prop_map(Op::Free),
        1 => Just(Op::Reset),
    ]
}

proptest! {
    #[test]
    fn prop_allocator_invariants(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let start: RawId = 10;
        let size: RawId = 16;
        let mut ids = IdAllocator::<RawId>::new(start, size);
        let mut live: HashSet<RawId> = HashSet::new();

        for op in ops {
            match op {
                Op::Alloc => {
                    match ids.alloc() {
                        Some(id) => {
                            prop_assert!(id >= start && id < start + size);
                            prop_assert!(live.insert(id), "id {} issued twice", id);
                        }
                        None => prop_assert_eq!(live.len(), size as usize),
                    }
                }
                Op::Free(id) => {
                    let was_live = live.remove(&id);
                    prop_assert_eq!(ids.free(id), was_live);
                }
                Op::Reset => {
                    ids.reset();
                    live.clear();
                }
            }

            prop_assert_eq!(ids.allocated_count(), live.len());
            prop_assert!(ids.watermark() <= u64::from(start + size));
            // allocated, free and the untouched tail partition the range
            let issued = (ids.watermark() - u64::from(start)) as usize;
            prop_assert_eq!(ids.allocated_count() + ids.recycled_count(), issued);
        }
    }
}
