// crates/convoy-core/tests/proptest_plan.rs
// ============================================================================
// Module: Planning Property Tests
// Description: Property tests for batch partitioning and progress bounds.
// Purpose: Detect partition and counter invariant violations across wide inputs.
// ============================================================================

//! Property-based tests for batch-plan partitioning invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use convoy_core::BatchPlan;
use convoy_core::DeploymentStrategy;
use convoy_core::InstanceId;
use proptest::prelude::*;

fn strategy_strategy() -> impl Strategy<Value = DeploymentStrategy> {
    prop_oneof![
        Just(DeploymentStrategy::AllAtOnce),
        Just(DeploymentStrategy::Rolling),
        Just(DeploymentStrategy::Canary),
    ]
}

proptest! {
    #[test]
    fn batches_partition_targets_in_order(
        strategy in strategy_strategy(),
        batch_size in 1_usize .. 16,
        count in 1_usize .. 64,
    ) {
        let targets: Vec<InstanceId> =
            (0 .. count).map(|n| InstanceId::new(format!("i-{n}"))).collect();
        let plan = BatchPlan::build(strategy, batch_size, &targets).unwrap();

        let flattened: Vec<InstanceId> =
            plan.batches().iter().flat_map(|batch| batch.iter().cloned()).collect();
        prop_assert_eq!(flattened, targets);
        prop_assert!(plan.batches().iter().all(|batch| !batch.is_empty()));
        prop_assert_eq!(plan.target_count(), count);
    }

    #[test]
    fn canary_always_leads_with_one(
        batch_size in 1_usize .. 16,
        count in 1_usize .. 64,
    ) {
        let targets: Vec<InstanceId> =
            (0 .. count).map(|n| InstanceId::new(format!("i-{n}"))).collect();
        let plan = BatchPlan::build(DeploymentStrategy::Canary, batch_size, &targets).unwrap();
        prop_assert_eq!(plan.batches()[0].len(), 1);
    }

    #[test]
    fn rolling_batches_never_exceed_batch_size(
        batch_size in 1_usize .. 16,
        count in 1_usize .. 64,
    ) {
        let targets: Vec<InstanceId> =
            (0 .. count).map(|n| InstanceId::new(format!("i-{n}"))).collect();
        let plan = BatchPlan::build(DeploymentStrategy::Rolling, batch_size, &targets).unwrap();
        prop_assert!(plan.batches().iter().all(|batch| batch.len() <= batch_size));
    }
}
