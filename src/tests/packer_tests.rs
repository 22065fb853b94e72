//! Message packer tests
//!
//! Validates:
//! - Linear packer splitting arithmetic and its one-byte leeway
//! - Instruction list packer stopping before the overflowing instruction
//! - Realloc plans splitting size increases into permitted steps
//! - Packers driven through the planner

#[cfg(test)]
mod packer_tests {
    use solana_sdk::instruction::Instruction;

    use crate::test_utils::{message_tags, sized_instruction, FixedOverheadOracle, TEST_PROGRAM};
    use crate::tx_planner::{
        linear_message_packer_instruction_plan, realloc_message_packer_instruction_plan,
        InstructionListMessagePacker, InstructionPlan, LinearMessagePacker, MessagePacker, MessagePackerFactory,
        PlanningError, StaticMessageFactory, TransactionMessage, TransactionPlanner, REALLOC_LIMIT,
    };

    /// Instruction covering `length` bytes at `offset`; data is the chunk itself
    fn chunk(offset: usize, length: usize) -> Instruction {
        let data: Vec<u8> = (offset..offset + length).map(|i| (i % 251) as u8).collect();
        Instruction::new_with_bytes(TEST_PROGRAM, &data, vec![])
    }

    #[test]
    fn test_linear_packer_fills_to_capacity_minus_leeway() {
        let oracle = FixedOverheadOracle::new(20, 100);
        let mut packer = LinearMessagePacker::new(200, chunk);

        let first = packer
            .pack_message_to_capacity(&TransactionMessage::v0(), &oracle)
            .unwrap();
        assert_eq!(first.instructions()[0].data.len(), 79);
        assert_eq!(packer.offset(), 79);

        let second = packer
            .pack_message_to_capacity(&TransactionMessage::v0(), &oracle)
            .unwrap();
        assert_eq!(second.instructions()[0].data.len(), 79);

        let third = packer
            .pack_message_to_capacity(&TransactionMessage::v0(), &oracle)
            .unwrap();
        assert_eq!(third.instructions()[0].data.len(), 42);
        assert!(packer.done());

        assert!(matches!(
            packer.pack_message_to_capacity(&TransactionMessage::v0(), &oracle),
            Err(PlanningError::MessagePackerAlreadyComplete)
        ));
    }

    #[test]
    fn test_linear_packer_reports_missing_room() {
        let oracle = FixedOverheadOracle::new(20, 100);
        let mut packer = LinearMessagePacker::new(10, chunk);
        let full = TransactionMessage::v0().append_instruction(sized_instruction(1, 79));

        match packer.pack_message_to_capacity(&full, &oracle) {
            Err(PlanningError::MessageCannotAccommodatePlan {
                bytes_required,
                bytes_free,
            }) => {
                assert_eq!(bytes_required, 1);
                assert_eq!(bytes_free, 0);
            }
            other => panic!("expected capacity error, got {other:?}"),
        }
        assert_eq!(packer.offset(), 0);
    }

    #[test]
    fn test_instruction_list_packer_stops_before_overflow() {
        let oracle = FixedOverheadOracle::new(20, 100);
        let mut packer = InstructionListMessagePacker::new(vec![
            sized_instruction(1, 30),
            sized_instruction(2, 30),
            sized_instruction(3, 30),
        ]);

        let first = packer
            .pack_message_to_capacity(&TransactionMessage::v0(), &oracle)
            .unwrap();
        assert_eq!(message_tags(&first), vec![1, 2]);
        assert_eq!(packer.remaining(), 1);

        let second = packer
            .pack_message_to_capacity(&TransactionMessage::v0(), &oracle)
            .unwrap();
        assert_eq!(message_tags(&second), vec![3]);
        assert!(packer.done());
    }

    #[test]
    fn test_instruction_list_packer_rejects_oversized_first_instruction() {
        let oracle = FixedOverheadOracle::new(20, 100);
        let mut packer = InstructionListMessagePacker::new(vec![sized_instruction(1, 90)]);

        match packer.pack_message_to_capacity(&TransactionMessage::v0(), &oracle) {
            Err(PlanningError::MessageCannotAccommodatePlan {
                bytes_required,
                bytes_free,
            }) => {
                assert_eq!(bytes_required, 90);
                assert_eq!(bytes_free, 80);
            }
            other => panic!("expected capacity error, got {other:?}"),
        }
        assert_eq!(packer.remaining(), 1);
    }

    #[test]
    fn test_boxed_clone_snapshots_cursor() {
        let oracle = FixedOverheadOracle::new(20, 100);
        let packer = InstructionListMessagePacker::new(vec![sized_instruction(1, 50), sized_instruction(2, 50)]);
        let mut attempt = packer.boxed_clone();

        attempt
            .pack_message_to_capacity(&TransactionMessage::v0(), &oracle)
            .unwrap();

        assert_eq!(packer.remaining(), 2);
        assert!(!attempt.done());
    }

    #[test]
    fn test_realloc_plan_splits_into_limit_sized_steps() {
        let plan = realloc_message_packer_instruction_plan(25_000, |size| {
            Instruction::new_with_bytes(TEST_PROGRAM, &(size as u32).to_le_bytes(), vec![])
        });
        let InstructionPlan::MessagePacker(factory) = &plan else {
            panic!("expected a message packer plan");
        };

        let oracle = FixedOverheadOracle::new(20, 1232);
        let mut packer = factory.message_packer();
        let message = packer
            .pack_message_to_capacity(&TransactionMessage::v0(), &oracle)
            .unwrap();
        assert!(packer.done());

        let sizes: Vec<u32> = message
            .instructions()
            .iter()
            .map(|ix| u32::from_le_bytes(ix.data[..4].try_into().unwrap()))
            .collect();
        assert_eq!(sizes, vec![REALLOC_LIMIT as u32, REALLOC_LIMIT as u32, 4_520]);
    }

    #[tokio::test]
    async fn test_linear_plan_reassembles_payload() {
        let planner = TransactionPlanner::new(StaticMessageFactory::new(TransactionMessage::v0()))
            .with_oracle(FixedOverheadOracle::new(20, 100));

        let plan = planner
            .plan(&linear_message_packer_instruction_plan(200, chunk))
            .await
            .unwrap();

        assert_eq!(plan.transaction_count(), 3);
        let payload: Vec<u8> = plan
            .instructions()
            .iter()
            .flat_map(|ix| ix.data.iter().copied())
            .collect();
        let expected: Vec<u8> = (0..200).map(|i| (i % 251) as u8).collect();
        assert_eq!(payload, expected);
    }

    #[tokio::test]
    async fn test_linear_plan_fills_room_left_by_earlier_sibling() {
        let planner = TransactionPlanner::new(StaticMessageFactory::new(TransactionMessage::v0()))
            .with_oracle(FixedOverheadOracle::new(20, 100));
        let plan = crate::tx_planner::sequential_instruction_plan(vec![
            crate::tx_planner::single_instruction_plan(sized_instruction(9, 40)),
            linear_message_packer_instruction_plan(60, chunk),
        ]);

        let result = planner.plan(&plan).await.unwrap();

        let lengths: Vec<Vec<usize>> = result
            .messages()
            .iter()
            .map(|message| message.instructions().iter().map(|ix| ix.data.len()).collect())
            .collect();
        assert_eq!(lengths, vec![vec![40, 39], vec![21]]);
    }
}
