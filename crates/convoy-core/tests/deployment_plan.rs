// crates/convoy-core/tests/deployment_plan.rs
// ============================================================================
// Module: Deployment Planning Tests
// Description: Tests for strategy normalization and batch partitioning.
// Purpose: Validate the fixed plans runners execute.
// Dependencies: convoy-core
// ============================================================================

//! ## Overview
//! Ensures batch plans cover the target set in order, canary always leads
//! with a single instance, and batch-size normalization follows strategy
//! defaults.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

use convoy_core::BatchPlan;
use convoy_core::DeploymentStrategy;
use convoy_core::InstanceId;

fn targets(count: usize) -> Vec<InstanceId> {
    (0 .. count).map(|n| InstanceId::new(format!("i-{n}"))).collect()
}

/// Verifies all-at-once produces a single batch covering every target.
#[test]
fn all_at_once_is_a_single_batch() {
    let targets = targets(5);
    let plan = BatchPlan::build(DeploymentStrategy::AllAtOnce, 5, &targets).unwrap();
    assert_eq!(plan.batch_count(), 1);
    assert_eq!(plan.batches()[0], targets);
}

/// Verifies rolling partitions targets into fixed-size chunks in order.
#[test]
fn rolling_chunks_in_order() {
    let targets = targets(5);
    let plan = BatchPlan::build(DeploymentStrategy::Rolling, 2, &targets).unwrap();
    assert_eq!(plan.batch_count(), 3);
    assert_eq!(plan.batches()[0], targets[.. 2]);
    assert_eq!(plan.batches()[1], targets[2 .. 4]);
    assert_eq!(plan.batches()[2], targets[4 ..]);
}

/// Verifies canary leads with one instance regardless of batch size.
#[test]
fn canary_first_batch_is_one_instance() {
    let targets = targets(6);
    let plan = BatchPlan::build(DeploymentStrategy::Canary, 4, &targets).unwrap();
    assert_eq!(plan.batches()[0].len(), 1);
    assert_eq!(plan.batches()[1].len(), 4);
    assert_eq!(plan.batches()[2].len(), 1);
    assert_eq!(plan.target_count(), 6);
}

/// Verifies a canary over a single target is just the canary batch.
#[test]
fn canary_single_target_has_one_batch() {
    let targets = targets(1);
    let plan = BatchPlan::build(DeploymentStrategy::Canary, 3, &targets).unwrap();
    assert_eq!(plan.batch_count(), 1);
    assert_eq!(plan.batches()[0].len(), 1);
}

/// Verifies a rolling plan with batch size equal to the target count matches
/// the all-at-once plan.
#[test]
fn rolling_full_batch_equals_all_at_once() {
    let targets = targets(4);
    let rolling = BatchPlan::build(DeploymentStrategy::Rolling, 4, &targets).unwrap();
    let all = BatchPlan::build(DeploymentStrategy::AllAtOnce, 4, &targets).unwrap();
    assert_eq!(rolling, all);
}

/// Verifies empty target sets are rejected at planning time.
#[test]
fn empty_targets_are_rejected() {
    let result = BatchPlan::build(DeploymentStrategy::Rolling, 1, &[]);
    assert!(result.is_err());
}

/// Verifies batch-size normalization per strategy.
#[test]
fn batch_size_normalization_defaults() {
    assert_eq!(DeploymentStrategy::Rolling.normalized_batch_size(None, 7), 1);
    assert_eq!(DeploymentStrategy::Canary.normalized_batch_size(None, 7), 1);
    assert_eq!(DeploymentStrategy::AllAtOnce.normalized_batch_size(None, 7), 7);
    assert_eq!(DeploymentStrategy::AllAtOnce.normalized_batch_size(Some(2), 7), 7);
    assert_eq!(DeploymentStrategy::Rolling.normalized_batch_size(Some(0), 7), 1);
    assert_eq!(DeploymentStrategy::Rolling.normalized_batch_size(Some(3), 7), 3);
}
