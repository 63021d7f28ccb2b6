use rstest::rstest;
use serial_test::serial;
use courier_core::common_tests::container_core_tests::*;
use courier_core::common_tests::container_stress_tests::*;
use courier_core::data_structures::{ConcurrentQueue, ConcurrentStack, TakeContainer};
use courier_core::guard::DeferredGuard;

type DeferredQueue<T> = ConcurrentQueue<T, DeferredGuard>;
type DeferredStack<T> = ConcurrentStack<T, DeferredGuard>;

// Type-level parametrization over the two take-containers
trait TestContainer {
    type Container<T: Send + 'static>: TakeContainer<T> + Default + Send + Sync + 'static;
}

struct UseQueue;
struct UseStack;

impl TestContainer for UseQueue {
    type Container<T: Send + 'static> = DeferredQueue<T>;
}

impl TestContainer for UseStack {
    type Container<T: Send + 'static> = DeferredStack<T>;
}

#[test]
fn queue_fifo() {
    test_fifo_order(&DeferredQueue::default());
}

#[test]
fn stack_lifo() {
    test_lifo_order(&DeferredStack::default());
}

#[test]
fn queue_per_producer_fifo() {
    test_per_producer_fifo::<DeferredQueue<(usize, usize)>>();
}

#[rstest]
#[case::queue(UseQueue)]
#[case::stack(UseStack)]
fn refill_after_empty<C: TestContainer>(#[case] _type: C) {
    test_refill_after_empty(&<C::Container<i32> as Default>::default());
}

#[rstest]
#[serial]
#[case::queue(UseQueue)]
#[case::stack(UseStack)]
fn concurrent_inserts<C: TestContainer>(#[case] _type: C) {
    test_concurrent_inserts::<C::Container<usize>>();
}

#[rstest]
#[serial(stress_tests)]
#[case::queue_1x1(UseQueue, 1)]
#[case::queue_4x4(UseQueue, 4)]
#[case::queue_8x8(UseQueue, 8)]
#[case::stack_1x1(UseStack, 1)]
#[case::stack_4x4(UseStack, 4)]
#[case::stack_8x8(UseStack, 8)]
fn stress_conservation<C: TestContainer>(#[case] _type: C, #[case] pairs: usize) {
    test_conservation::<C::Container<u64>>(pairs, 10_000);
}

#[rstest]
#[serial(stress_tests)]
#[case::queue(UseQueue)]
#[case::stack(UseStack)]
fn stress_mixed_churn<C: TestContainer>(#[case] _type: C) {
    test_mixed_churn::<C::Container<u64>>();
}

#[test]
fn list_basic() {
    test_list_basic_operations::<DeferredGuard>();
}

#[test]
#[serial]
fn list_concurrent_inserts() {
    test_list_concurrent_inserts::<DeferredGuard>();
}

#[test]
#[serial(stress_tests)]
fn stress_list_remove_same_value() {
    test_list_concurrent_remove_same_value::<DeferredGuard>();
}

#[test]
#[serial(stress_tests)]
fn stress_list_adjacent_removes() {
    test_list_adjacent_removes::<DeferredGuard>();
}

#[test]
#[serial(stress_tests)]
fn stress_list_find_during_modifications() {
    test_list_find_during_modifications::<DeferredGuard>();
}

#[test]
#[serial(stress_tests)]
fn stress_list_shared_key_consistency() {
    test_list_shared_key_consistency::<DeferredGuard>();
}
