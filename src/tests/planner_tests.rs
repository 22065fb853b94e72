//! Planner scenario tests
//!
//! Validates:
//! - Greedy packing into open candidates (parallel and sequential)
//! - Non-divisible groups stay together or fail with the exact deficit
//! - Flattening and collapse of nested groups
//! - Message packers under parallel and sequential parents
//! - Hooks, abort and empty plans

use async_trait::async_trait;
use solana_sdk::{hash::Hash, instruction::Instruction};
use tokio_util::sync::CancellationToken;

use crate::test_utils::{message_tags, sized_instruction, FixedOverheadOracle};
use crate::tx_planner::{
    message_packer_instruction_plan_from_instructions, non_divisible_sequential_instruction_plan,
    parallel_instruction_plan, sequential_instruction_plan, single_instruction_plan,
    CapacityOracle, InstructionPlan, MessageFactory, PlanningError, StaticMessageFactory,
    TransactionMessage, TransactionPlan, TransactionPlanner, WireSizeOracle,
};

fn planner(overhead: usize, size_limit: usize) -> TransactionPlanner<StaticMessageFactory> {
    TransactionPlanner::new(StaticMessageFactory::new(TransactionMessage::v0()))
        .with_oracle(FixedOverheadOracle::new(overhead, size_limit))
}

fn ix(tag: u8, size: usize) -> Instruction {
    sized_instruction(tag, size)
}

fn leaf(instructions: &[Instruction]) -> TransactionPlan {
    TransactionPlan::single(TransactionMessage::v0().append_instructions(instructions.iter().cloned()))
}

fn leaf_tags(plan: &TransactionPlan) -> Vec<Vec<u8>> {
    plan.messages().into_iter().map(message_tags).collect()
}

#[tokio::test]
async fn test_parallel_pair_shares_one_message_when_it_fits() {
    let plan = parallel_instruction_plan(vec![ix(1, 50), ix(2, 50)]);
    let planner = planner(20, 200);

    let result = planner.plan(&plan).await.unwrap();

    assert_eq!(result, leaf(&[ix(1, 50), ix(2, 50)]));
    let message = result.messages()[0];
    assert_eq!(planner.oracle().message_size(message).unwrap(), 120);
}

#[tokio::test]
async fn test_parallel_pair_splits_when_ceiling_is_lower() {
    let plan = parallel_instruction_plan(vec![ix(1, 50), ix(2, 50)]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::parallel(vec![leaf(&[ix(1, 50)]), leaf(&[ix(2, 50)])])
    );
}

#[tokio::test]
async fn test_non_divisible_pair_that_never_fits_reports_deficit() {
    let plan = non_divisible_sequential_instruction_plan(vec![ix(1, 180), ix(2, 180)]);

    let err = planner(30, 200).plan(&plan).await.unwrap_err();

    match err {
        PlanningError::MessageCannotAccommodatePlan {
            bytes_required,
            bytes_free,
        } => {
            assert_eq!(bytes_required, 180);
            assert_eq!(bytes_free, 170);
        }
        other => panic!("expected capacity error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_divisible_pair_of_fitting_halves_splits_into_nested_group() {
    // Each half fits a message on its own; together they exceed the ceiling
    let plan = non_divisible_sequential_instruction_plan(vec![ix(1, 180), ix(2, 180)]);

    let result = planner(20, 200).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::non_divisible_sequential(vec![leaf(&[ix(1, 180)]), leaf(&[ix(2, 180)])])
    );
}

#[tokio::test]
async fn test_non_divisible_pair_whose_total_overflows_stays_one_group() {
    let plan = non_divisible_sequential_instruction_plan(vec![ix(1, 150), ix(2, 150)]);

    let result = planner(20, 200).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::non_divisible_sequential(vec![leaf(&[ix(1, 150)]), leaf(&[ix(2, 150)])])
    );
}

#[tokio::test]
async fn test_sequential_packs_greedily_in_order() {
    let plan = sequential_instruction_plan(vec![ix(1, 40), ix(2, 40), ix(3, 40)]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::sequential(vec![leaf(&[ix(1, 40), ix(2, 40)]), leaf(&[ix(3, 40)])])
    );
}

#[tokio::test]
async fn test_divisible_nested_sequential_is_flattened() {
    let plan = sequential_instruction_plan(vec![
        sequential_instruction_plan(vec![ix(1, 60), ix(2, 60)]),
        single_instruction_plan(ix(3, 60)),
    ]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::sequential(vec![
            leaf(&[ix(1, 60)]),
            leaf(&[ix(2, 60)]),
            leaf(&[ix(3, 60)]),
        ])
    );
}

#[tokio::test]
async fn test_non_divisible_child_stays_nested_in_divisible_parent() {
    let plan = sequential_instruction_plan(vec![
        single_instruction_plan(ix(1, 10)),
        non_divisible_sequential_instruction_plan(vec![ix(2, 60), ix(3, 60)]),
        single_instruction_plan(ix(4, 10)),
    ]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::sequential(vec![
            leaf(&[ix(1, 10)]),
            TransactionPlan::non_divisible_sequential(vec![
                leaf(&[ix(2, 60)]),
                leaf(&[ix(3, 60), ix(4, 10)]),
            ]),
        ])
    );
}

#[tokio::test]
async fn test_non_divisible_group_absorbed_when_it_fits_entirely() {
    let plan = sequential_instruction_plan(vec![
        single_instruction_plan(ix(1, 10)),
        non_divisible_sequential_instruction_plan(vec![ix(2, 20), ix(3, 20)]),
    ]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(result, leaf(&[ix(1, 10), ix(2, 20), ix(3, 20)]));
}

#[tokio::test]
async fn test_parallel_keeps_non_divisible_group_apart_from_siblings() {
    let plan = parallel_instruction_plan(vec![
        single_instruction_plan(ix(1, 10)),
        non_divisible_sequential_instruction_plan(vec![ix(2, 100), ix(3, 100)]),
    ]);

    let result = planner(20, 150).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::parallel(vec![
            leaf(&[ix(1, 10)]),
            TransactionPlan::non_divisible_sequential(vec![
                leaf(&[ix(2, 100)]),
                leaf(&[ix(3, 100)]),
            ]),
        ])
    );
}

#[tokio::test]
async fn test_parallel_sequential_child_fills_earlier_candidate() {
    let plan = parallel_instruction_plan(vec![
        single_instruction_plan(ix(1, 70)),
        single_instruction_plan(ix(2, 50)),
        sequential_instruction_plan(vec![ix(3, 10), ix(4, 10)]),
    ]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::parallel(vec![
            leaf(&[ix(1, 70)]),
            leaf(&[ix(2, 50), ix(3, 10), ix(4, 10)]),
        ])
    );
}

#[tokio::test]
async fn test_parallel_defers_message_packers() {
    let plan = parallel_instruction_plan(vec![
        message_packer_instruction_plan_from_instructions(vec![ix(1, 30), ix(2, 30)]),
        single_instruction_plan(ix(3, 30)),
    ]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::parallel(vec![leaf(&[ix(3, 30), ix(1, 30)]), leaf(&[ix(2, 30)])])
    );
}

#[tokio::test]
async fn test_message_packer_inherits_sequential_divisibility() {
    let plan = non_divisible_sequential_instruction_plan(vec![
        message_packer_instruction_plan_from_instructions(vec![ix(1, 60), ix(2, 60), ix(3, 60)]),
    ]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::non_divisible_sequential(vec![
            leaf(&[ix(1, 60)]),
            leaf(&[ix(2, 60)]),
            leaf(&[ix(3, 60)]),
        ])
    );
}

#[tokio::test]
async fn test_sequential_packer_never_returns_to_earlier_message() {
    // The third instruction would fit next to the first sibling, but the
    // packer has already moved on to newer messages
    let plan = sequential_instruction_plan(vec![
        single_instruction_plan(ix(9, 60)),
        message_packer_instruction_plan_from_instructions(vec![ix(1, 30), ix(2, 70), ix(3, 15)]),
    ]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(leaf_tags(&result), vec![vec![9], vec![1], vec![2], vec![3]]);
    let order: Vec<u8> = result.instructions().iter().map(|ix| ix.data[0]).collect();
    assert_eq!(order, vec![9, 1, 2, 3]);
}

#[tokio::test]
async fn test_message_packer_under_parallel_is_grouped_in_parallel() {
    let plan = parallel_instruction_plan(vec![message_packer_instruction_plan_from_instructions(
        vec![ix(1, 60), ix(2, 60)],
    )]);

    let result = planner(20, 100).plan(&plan).await.unwrap();

    assert_eq!(
        result,
        TransactionPlan::parallel(vec![leaf(&[ix(1, 60)]), leaf(&[ix(2, 60)])])
    );
}

#[tokio::test]
async fn test_empty_plans_are_rejected() {
    let planner = planner(20, 100);

    let empty = sequential_instruction_plan(Vec::<InstructionPlan>::new());
    assert!(matches!(
        planner.plan(&empty).await,
        Err(PlanningError::EmptyInstructionPlan)
    ));

    let nested = parallel_instruction_plan(vec![
        sequential_instruction_plan(Vec::<InstructionPlan>::new()),
        parallel_instruction_plan(Vec::<InstructionPlan>::new()),
    ]);
    assert!(matches!(
        planner.plan(&nested).await,
        Err(PlanningError::EmptyInstructionPlan)
    ));
}

#[tokio::test]
async fn test_single_child_groups_collapse() {
    let planner = planner(20, 100);
    let direct = planner.plan(&single_instruction_plan(ix(1, 10))).await.unwrap();
    let wrapped = planner
        .plan(&parallel_instruction_plan(vec![sequential_instruction_plan(vec![ix(1, 10)])]))
        .await
        .unwrap();

    assert_eq!(direct, leaf(&[ix(1, 10)]));
    assert_eq!(wrapped, direct);
}

#[tokio::test]
async fn test_cancelled_token_aborts_planning() {
    let abort = CancellationToken::new();
    abort.cancel();

    let err = planner(20, 100)
        .plan_with_abort(&single_instruction_plan(ix(1, 10)), &abort)
        .await
        .unwrap_err();

    assert!(matches!(err, PlanningError::Aborted));
}

/// Factory attaching a lifetime on every update, or failing to create messages
struct LifetimeFactory {
    fail_create: bool,
}

#[async_trait]
impl MessageFactory for LifetimeFactory {
    async fn create_message(&self, _abort: &CancellationToken) -> anyhow::Result<TransactionMessage> {
        if self.fail_create {
            anyhow::bail!("blockhash unavailable");
        }
        Ok(TransactionMessage::v0())
    }

    async fn on_message_updated(
        &self,
        message: TransactionMessage,
        _abort: &CancellationToken,
    ) -> anyhow::Result<TransactionMessage> {
        Ok(message.with_blockhash_lifetime(Hash::default(), 42))
    }
}

#[tokio::test]
async fn test_on_message_updated_applies_to_every_message() {
    let planner = TransactionPlanner::new(LifetimeFactory { fail_create: false })
        .with_oracle(FixedOverheadOracle::new(20, 100));
    let plan = parallel_instruction_plan(vec![ix(1, 50), ix(2, 50), ix(3, 20)]);

    let result = planner.plan(&plan).await.unwrap();

    assert_eq!(leaf_tags(&result), vec![vec![1, 3], vec![2]]);
    assert!(result.messages().iter().all(|message| message.lifetime().is_some()));
}

#[tokio::test]
async fn test_create_message_failure_is_a_hook_error() {
    let planner = TransactionPlanner::new(LifetimeFactory { fail_create: true })
        .with_oracle(FixedOverheadOracle::new(20, 100));

    let err = planner.plan(&single_instruction_plan(ix(1, 10))).await.unwrap_err();

    assert_eq!(err.category(), "hook");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_wire_size_plan_respects_packet_limit() {
    let payer = solana_sdk::pubkey::Pubkey::new_unique();
    let template = TransactionMessage::v0()
        .with_fee_payer(payer)
        .with_blockhash_lifetime(Hash::new_unique(), 1_000);
    let planner = TransactionPlanner::new(StaticMessageFactory::new(template));
    let instructions: Vec<Instruction> = (0..40u8).map(|tag| ix(tag, 100)).collect();

    let result = planner
        .plan(&sequential_instruction_plan(instructions.clone()))
        .await
        .unwrap();

    let oracle = WireSizeOracle::new();
    assert!(result.transaction_count() > 1);
    for message in result.messages() {
        assert!(oracle.message_size(message).unwrap() <= 1232);
    }
    let planned: Vec<Instruction> = result.instructions().into_iter().cloned().collect();
    assert_eq!(planned, instructions);
}
