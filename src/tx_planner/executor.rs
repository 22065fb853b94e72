//! Transaction plan executor
//!
//! Walks a `TransactionPlan` and hands each message to an injected
//! `TransactionMessageExecutor`:
//! - `Sequential` children run strictly in order
//! - `Parallel` children are all started together and awaited together
//!
//! A single cancellation flag is shared by the whole run. It is set by the
//! first failing transaction or by the caller's abort token, and is never
//! cleared. Once set, every transaction that has not started yet is recorded
//! as `Canceled` without being executed; transactions already in flight are
//! left to finish. Nothing is retried here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::metrics::{metrics, Timer};
use crate::tx_planner::errors::{ExecutionAborted, ExecutionCause, TransactionPlanExecutionError};
use crate::tx_planner::message::TransactionMessage;
use crate::tx_planner::plan::TransactionPlan;
use crate::tx_planner::result::{SuccessfulTransaction, TransactionPlanResult};

/// Executes one transaction message (sign, send, confirm, ...)
///
/// Errors are recorded as-is in the result tree. Retry policy, if any,
/// belongs in the implementation.
#[async_trait]
pub trait TransactionMessageExecutor: Send + Sync {
    async fn execute_transaction_message(
        &self,
        message: &TransactionMessage,
        abort: &CancellationToken,
    ) -> anyhow::Result<SuccessfulTransaction>;
}

#[async_trait]
impl<E: TransactionMessageExecutor + ?Sized> TransactionMessageExecutor for Arc<E> {
    async fn execute_transaction_message(
        &self,
        message: &TransactionMessage,
        abort: &CancellationToken,
    ) -> anyhow::Result<SuccessfulTransaction> {
        (**self).execute_transaction_message(message, abort).await
    }
}

/// Executes transaction plans with a shared cancellation flag
pub struct TransactionPlanExecutor<E> {
    executor: E,
}

impl<E: TransactionMessageExecutor> TransactionPlanExecutor<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub async fn execute(
        &self,
        plan: &TransactionPlan,
    ) -> Result<TransactionPlanResult, TransactionPlanExecutionError> {
        self.execute_with_abort(plan, &CancellationToken::new()).await
    }

    /// Execute the plan; `abort` cancels transactions not yet started and is
    /// handed to every in-flight execution
    ///
    /// On any failure or abort the returned error carries the complete
    /// result tree.
    pub async fn execute_with_abort(
        &self,
        plan: &TransactionPlan,
        abort: &CancellationToken,
    ) -> Result<TransactionPlanResult, TransactionPlanExecutionError> {
        let execution_id = Uuid::new_v4();
        let span = info_span!("execute_transaction_plan", %execution_id);
        let timer = Timer::new();

        let run = ExecutionRun {
            executor: &self.executor,
            abort,
            canceled: AtomicBool::new(abort.is_cancelled()),
        };
        let result = run.traverse(plan).instrument(span.clone()).await;
        let canceled = run.is_canceled();

        timer.observe_duration(&metrics().execution_latency);
        metrics().executions_total.inc();

        let summary = result.summarize();
        let _entered = span.enter();
        if !canceled {
            info!(
                transactions = summary.successful,
                elapsed_ms = timer.elapsed_secs() * 1000.0,
                "Transaction plan executed"
            );
            return Ok(result);
        }

        metrics().executions_failed.inc();
        let cause = match result.first_error() {
            Some(error) if !error.is::<ExecutionAborted>() => ExecutionCause::Transaction(Arc::clone(error)),
            _ => ExecutionCause::Aborted,
        };
        warn!(
            successful = summary.successful,
            failed = summary.failed,
            canceled = summary.canceled,
            cause = %cause,
            "Transaction plan execution failed"
        );
        Err(TransactionPlanExecutionError::new(cause, result))
    }
}

struct ExecutionRun<'a, E> {
    executor: &'a E,
    abort: &'a CancellationToken,
    canceled: AtomicBool,
}

impl<'a, E: TransactionMessageExecutor> ExecutionRun<'a, E> {
    fn is_canceled(&self) -> bool {
        if self.abort.is_cancelled() {
            self.cancel();
        }
        self.canceled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    fn traverse<'b>(&'b self, plan: &'b TransactionPlan) -> BoxFuture<'b, TransactionPlanResult> {
        async move {
            match plan {
                TransactionPlan::Single(message) => self.traverse_single(message).await,
                TransactionPlan::Sequential { divisible, plans } => {
                    let mut results = Vec::with_capacity(plans.len());
                    for child in plans {
                        results.push(self.traverse(child).await);
                    }
                    TransactionPlanResult::Sequential {
                        divisible: *divisible,
                        plans: results,
                    }
                }
                TransactionPlan::Parallel { plans } => TransactionPlanResult::Parallel {
                    plans: join_all(plans.iter().map(|child| self.traverse(child))).await,
                },
            }
        }
        .boxed()
    }

    async fn traverse_single(&self, message: &TransactionMessage) -> TransactionPlanResult {
        if self.is_canceled() {
            metrics().transactions_canceled.inc();
            debug!("Transaction canceled before execution");
            return TransactionPlanResult::canceled(message.clone());
        }

        let outcome = tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(anyhow::Error::new(ExecutionAborted)),
            outcome = self.executor.execute_transaction_message(message, self.abort) => outcome,
        };

        match outcome {
            Ok(transaction) => {
                metrics().transactions_successful.inc();
                debug!(signature = %transaction.signature, "Transaction executed");
                TransactionPlanResult::successful(message.clone(), transaction)
            }
            Err(error) => {
                self.cancel();
                metrics().transactions_failed.inc();
                warn!(error = %error, "Transaction failed, canceling remaining transactions");
                TransactionPlanResult::failed(message.clone(), Arc::new(error))
            }
        }
    }
}
