//! Transaction planner
//!
//! Turns an `InstructionPlan` into a `TransactionPlan` by greedily packing
//! instructions into messages that are still open ("candidates") before
//! opening new ones.
//!
//! ## Candidate pool
//! Candidate messages live in an arena owned by the planning run; plan
//! nodes under construction refer to them by index. A traversal frame
//! receives the candidates it may pack into from its parent:
//! - `Sequential` children only see the running candidate (the last message
//!   of the previous child), so output order mirrors input order
//! - `Parallel` children see every candidate opened so far, since siblings
//!   may land in any transaction
//!
//! A node absorbed entirely into an existing candidate produces no plan node.
//! Groups with a single child collapse into that child.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use solana_sdk::instruction::Instruction;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::metrics::{metrics, Timer};
use crate::tx_planner::capacity::{CapacityOracle, WireSizeOracle};
use crate::tx_planner::errors::PlanningError;
use crate::tx_planner::instructions::InstructionPlan;
use crate::tx_planner::message::TransactionMessage;
use crate::tx_planner::packers::{MessagePacker, MessagePackerFactory};
use crate::tx_planner::plan::TransactionPlan;

/// Supplies candidate messages to the planner
///
/// Both hooks may suspend (e.g. to fetch a fresh blockhash); the planner
/// awaits them before measuring the message.
#[async_trait]
pub trait MessageFactory: Send + Sync {
    /// Open a new, empty candidate message
    async fn create_message(&self, abort: &CancellationToken) -> anyhow::Result<TransactionMessage>;

    /// Transform a message after work was appended to it
    ///
    /// Must be idempotent for the same logical append.
    async fn on_message_updated(
        &self,
        message: TransactionMessage,
        _abort: &CancellationToken,
    ) -> anyhow::Result<TransactionMessage> {
        Ok(message)
    }
}

/// Factory cloning a template message (fee payer, lifetime, compute budget, ...)
#[derive(Debug, Clone)]
pub struct StaticMessageFactory {
    template: TransactionMessage,
}

impl StaticMessageFactory {
    pub fn new(template: TransactionMessage) -> Self {
        Self { template }
    }
}

#[async_trait]
impl MessageFactory for StaticMessageFactory {
    async fn create_message(&self, _abort: &CancellationToken) -> anyhow::Result<TransactionMessage> {
        Ok(self.template.clone())
    }
}

/// Plans instruction plans into size-bounded transaction plans
pub struct TransactionPlanner<F> {
    factory: F,
    oracle: Arc<dyn CapacityOracle>,
}

impl<F: MessageFactory> TransactionPlanner<F> {
    /// Planner measuring messages with their real wire size
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            oracle: Arc::new(WireSizeOracle::new()),
        }
    }

    pub fn with_oracle(mut self, oracle: impl CapacityOracle + 'static) -> Self {
        self.oracle = Arc::new(oracle);
        self
    }

    pub fn oracle(&self) -> &dyn CapacityOracle {
        self.oracle.as_ref()
    }

    pub async fn plan(&self, plan: &InstructionPlan) -> Result<TransactionPlan, PlanningError> {
        self.plan_with_abort(plan, &CancellationToken::new()).await
    }

    /// Plan, failing with `PlanningError::Aborted` once `abort` is cancelled
    pub async fn plan_with_abort(
        &self,
        plan: &InstructionPlan,
        abort: &CancellationToken,
    ) -> Result<TransactionPlan, PlanningError> {
        let timer = Timer::new();
        let result = self.plan_inner(plan, abort).await;
        timer.observe_duration(&metrics().planning_latency);

        match &result {
            Ok(transaction_plan) => {
                let count = transaction_plan.transaction_count();
                metrics().plans_total.inc();
                metrics().transactions_planned.inc_by(count as u64);
                info!(
                    transactions = count,
                    instructions = plan.instruction_count(),
                    elapsed_ms = timer.elapsed_secs() * 1000.0,
                    "Instruction plan planned"
                );
            }
            Err(err) => {
                metrics().planning_failures.inc();
                warn!(category = err.category(), error = %err, "Instruction plan failed to plan");
            }
        }
        result
    }

    async fn plan_inner(
        &self,
        plan: &InstructionPlan,
        abort: &CancellationToken,
    ) -> Result<TransactionPlan, PlanningError> {
        if plan.is_empty_hint() {
            return Err(PlanningError::EmptyInstructionPlan);
        }
        let mut run = PlanningRun {
            factory: &self.factory,
            oracle: self.oracle.as_ref(),
            abort,
            arena: Vec::new(),
        };
        let draft = run
            .traverse(plan, Parent::Root, Vec::new())
            .await?
            .ok_or(PlanningError::EmptyInstructionPlan)?;
        run.freeze(draft)
    }
}

/// Index of a candidate message in the run's arena
type CandidateId = usize;

/// Plan node under construction; leaves point into the arena
#[derive(Debug)]
enum DraftPlan {
    Single(CandidateId),
    Sequential { divisible: bool, plans: Vec<DraftPlan> },
    Parallel { plans: Vec<DraftPlan> },
}

impl DraftPlan {
    /// The message a following sequential sibling may keep packing into
    fn last_sequential_candidate(&self) -> Option<CandidateId> {
        match self {
            Self::Single(id) => Some(*id),
            Self::Sequential { plans, .. } => plans.last().and_then(Self::last_sequential_candidate),
            Self::Parallel { .. } => None,
        }
    }

    fn collect_candidates(&self, out: &mut Vec<CandidateId>) {
        match self {
            Self::Single(id) => out.push(*id),
            Self::Sequential { plans, .. } | Self::Parallel { plans } => {
                for plan in plans {
                    plan.collect_candidates(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Parent {
    Root,
    Sequential { divisible: bool },
    Parallel,
}

/// Unwrap single-child groups, drop empty ones
fn collapse(mut plans: Vec<DraftPlan>, wrap: impl FnOnce(Vec<DraftPlan>) -> DraftPlan) -> Option<DraftPlan> {
    match plans.len() {
        0 => None,
        1 => plans.pop(),
        _ => Some(wrap(plans)),
    }
}

struct PlanningRun<'a, F> {
    factory: &'a F,
    oracle: &'a dyn CapacityOracle,
    abort: &'a CancellationToken,
    arena: Vec<TransactionMessage>,
}

impl<'a, F: MessageFactory> PlanningRun<'a, F> {
    fn traverse<'b>(
        &'b mut self,
        plan: &'b InstructionPlan,
        parent: Parent,
        candidates: Vec<CandidateId>,
    ) -> BoxFuture<'b, Result<Option<DraftPlan>, PlanningError>> {
        async move {
            if self.abort.is_cancelled() {
                return Err(PlanningError::Aborted);
            }
            match plan {
                InstructionPlan::Single(instruction) => {
                    self.traverse_single(instruction, &candidates).await
                }
                InstructionPlan::Sequential { divisible, plans } => {
                    self.traverse_sequential(plan, *divisible, plans, parent, candidates)
                        .await
                }
                InstructionPlan::Parallel { plans } => self.traverse_parallel(plans, candidates).await,
                InstructionPlan::MessagePacker(factory) => {
                    self.traverse_message_packer(factory.as_ref(), parent, candidates)
                        .await
                }
            }
        }
        .boxed()
    }

    async fn traverse_single(
        &mut self,
        instruction: &Instruction,
        candidates: &[CandidateId],
    ) -> Result<Option<DraftPlan>, PlanningError> {
        let append = |message: &TransactionMessage| -> Result<(TransactionMessage, ()), PlanningError> {
            Ok((message.append_instruction(instruction.clone()), ()))
        };

        if let Some((id, ())) = self.select_and_mutate_candidate(candidates, &append).await? {
            trace!(candidate = id, "Instruction absorbed into existing message");
            return Ok(None);
        }
        let (id, ()) = self.create_candidate(&append).await?;
        Ok(Some(DraftPlan::Single(id)))
    }

    async fn traverse_sequential(
        &mut self,
        plan: &InstructionPlan,
        divisible: bool,
        children: &[InstructionPlan],
        parent: Parent,
        parent_candidates: Vec<CandidateId>,
    ) -> Result<Option<DraftPlan>, PlanningError> {
        let must_fit_entirely = match parent {
            Parent::Root => false,
            Parent::Parallel => true,
            Parent::Sequential { .. } => !divisible,
        };

        let mut candidate = None;
        if must_fit_entirely {
            let oracle = self.oracle;
            let whole = |message: &TransactionMessage| -> Result<(TransactionMessage, ()), PlanningError> {
                Ok((fit_entire_plan_inside_message(plan, message, oracle)?, ()))
            };
            if let Some((id, ())) = self
                .select_and_mutate_candidate(&parent_candidates, &whole)
                .await?
            {
                trace!(candidate = id, "Sequential group absorbed into existing message");
                return Ok(None);
            }
        } else {
            candidate = parent_candidates.first().copied();
        }

        let mut plans = Vec::new();
        for child in children {
            let child_plan = self
                .traverse(child, Parent::Sequential { divisible }, candidate.into_iter().collect())
                .await?;
            let Some(child_plan) = child_plan else {
                continue;
            };
            candidate = child_plan.last_sequential_candidate();
            match child_plan {
                DraftPlan::Sequential {
                    divisible: child_divisible,
                    plans: nested,
                } if child_divisible || !divisible => plans.extend(nested),
                other => plans.push(other),
            }
        }

        Ok(collapse(plans, |plans| DraftPlan::Sequential { divisible, plans }))
    }

    async fn traverse_parallel(
        &mut self,
        children: &[InstructionPlan],
        parent_candidates: Vec<CandidateId>,
    ) -> Result<Option<DraftPlan>, PlanningError> {
        let mut candidates = parent_candidates;
        let mut plans = Vec::new();

        // Fixed-size work first; packers then fill whatever room is left.
        let mut ordered: Vec<&InstructionPlan> = children.iter().collect();
        ordered.sort_by_key(|child| child.is_message_packer());

        for child in ordered {
            let child_plan = self
                .traverse(child, Parent::Parallel, candidates.clone())
                .await?;
            let Some(child_plan) = child_plan else {
                continue;
            };
            child_plan.collect_candidates(&mut candidates);
            match child_plan {
                DraftPlan::Parallel { plans: nested } => plans.extend(nested),
                other => plans.push(other),
            }
        }

        Ok(collapse(plans, |plans| DraftPlan::Parallel { plans }))
    }

    async fn traverse_message_packer(
        &mut self,
        factory: &dyn MessagePackerFactory,
        parent: Parent,
        mut candidates: Vec<CandidateId>,
    ) -> Result<Option<DraftPlan>, PlanningError> {
        let oracle = self.oracle;
        let mut packer = factory.message_packer();
        let mut emitted = Vec::new();

        while !packer.done() {
            if self.abort.is_cancelled() {
                return Err(PlanningError::Aborted);
            }
            let pack = |message: &TransactionMessage| -> Result<(TransactionMessage, Box<dyn MessagePacker>), PlanningError> {
                let mut attempt = packer.boxed_clone();
                let packed = attempt.pack_message_to_capacity(message, oracle)?;
                Ok((packed, attempt))
            };
            let selected = self.select_and_mutate_candidate(&candidates, &pack).await?;
            match selected {
                Some((_, advanced)) => packer = advanced,
                None => {
                    let (id, advanced) = self.create_candidate(&pack).await?;
                    packer = advanced;
                    emitted.push(DraftPlan::Single(id));
                    // Outside a parallel parent only the newest message may take further chunks
                    if !matches!(parent, Parent::Parallel) {
                        candidates = vec![id];
                    }
                }
            }
        }

        debug!(transactions = emitted.len(), "Message packer drained");
        Ok(collapse(emitted, |plans| match parent {
            Parent::Parallel => DraftPlan::Parallel { plans },
            Parent::Sequential { divisible } => DraftPlan::Sequential { divisible, plans },
            Parent::Root => DraftPlan::Sequential {
                divisible: true,
                plans,
            },
        }))
    }

    /// Apply `append` to the first candidate that still fits afterwards
    ///
    /// Candidates that cannot accommodate the addition are skipped; any other
    /// error aborts planning.
    async fn select_and_mutate_candidate<T, A>(
        &mut self,
        candidates: &[CandidateId],
        append: &A,
    ) -> Result<Option<(CandidateId, T)>, PlanningError>
    where
        A: Fn(&TransactionMessage) -> Result<(TransactionMessage, T), PlanningError> + Sync,
        T: Send,
    {
        for &id in candidates {
            let (message, extra) = match append(&self.arena[id]) {
                Ok(appended) => appended,
                Err(PlanningError::MessageCannotAccommodatePlan { .. }) => continue,
                Err(err) => return Err(err),
            };
            let message = self
                .factory
                .on_message_updated(message, self.abort)
                .await
                .map_err(PlanningError::MessageHook)?;
            if self.oracle.fits(&message)? {
                self.arena[id] = message;
                return Ok(Some((id, extra)));
            }
        }
        Ok(None)
    }

    /// Open a new candidate and apply `append` to it
    async fn create_candidate<T, A>(&mut self, append: &A) -> Result<(CandidateId, T), PlanningError>
    where
        A: Fn(&TransactionMessage) -> Result<(TransactionMessage, T), PlanningError> + Sync,
        T: Send,
    {
        let base = self
            .factory
            .create_message(self.abort)
            .await
            .map_err(PlanningError::MessageHook)?;
        let (updated, extra) = append(&base)?;
        let updated = self
            .factory
            .on_message_updated(updated, self.abort)
            .await
            .map_err(PlanningError::MessageHook)?;
        let size = self.oracle.ensure_fits(&base, &updated)?;

        self.arena.push(updated);
        let id = self.arena.len() - 1;
        debug!(candidate = id, size, "Opened new transaction message");
        Ok((id, extra))
    }

    /// Move the finished messages out of the arena into the final plan
    fn freeze(self, draft: DraftPlan) -> Result<TransactionPlan, PlanningError> {
        let mut slots: Vec<Option<TransactionMessage>> = self.arena.into_iter().map(Some).collect();
        freeze_node(draft, &mut slots)
    }
}

fn freeze_node(
    draft: DraftPlan,
    slots: &mut [Option<TransactionMessage>],
) -> Result<TransactionPlan, PlanningError> {
    match draft {
        DraftPlan::Single(id) => slots
            .get_mut(id)
            .and_then(Option::take)
            .map(TransactionPlan::Single)
            .ok_or_else(|| PlanningError::Internal(format!("candidate {} adopted twice", id))),
        DraftPlan::Sequential { divisible, plans } => Ok(TransactionPlan::Sequential {
            divisible,
            plans: plans
                .into_iter()
                .map(|plan| freeze_node(plan, slots))
                .collect::<Result<_, _>>()?,
        }),
        DraftPlan::Parallel { plans } => Ok(TransactionPlan::Parallel {
            plans: plans
                .into_iter()
                .map(|plan| freeze_node(plan, slots))
                .collect::<Result<_, _>>()?,
        }),
    }
}

/// Append every instruction of `plan` to `message`, failing if any step overflows
fn fit_entire_plan_inside_message(
    plan: &InstructionPlan,
    message: &TransactionMessage,
    oracle: &dyn CapacityOracle,
) -> Result<TransactionMessage, PlanningError> {
    match plan {
        InstructionPlan::Single(instruction) => {
            let updated = message.append_instruction(instruction.clone());
            oracle.ensure_fits(message, &updated)?;
            Ok(updated)
        }
        InstructionPlan::Sequential { plans, .. } | InstructionPlan::Parallel { plans } => plans
            .iter()
            .try_fold(message.clone(), |acc, child| {
                fit_entire_plan_inside_message(child, &acc, oracle)
            }),
        InstructionPlan::MessagePacker(factory) => {
            let mut packer = factory.message_packer();
            let mut packed = message.clone();
            while !packer.done() {
                packed = packer.pack_message_to_capacity(&packed, oracle)?;
            }
            Ok(packed)
        }
    }
}
