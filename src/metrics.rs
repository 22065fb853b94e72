//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Planning counters
    pub plans_total: IntCounter,
    pub planning_failures: IntCounter,
    pub transactions_planned: IntCounter,

    // Execution counters
    pub executions_total: IntCounter,
    pub executions_failed: IntCounter,
    pub transactions_successful: IntCounter,
    pub transactions_failed: IntCounter,
    pub transactions_canceled: IntCounter,

    // Compute budget
    pub compute_unit_estimates: IntCounter,
    pub compute_unit_estimate_failures: IntCounter,

    // Histograms
    pub planning_latency: Histogram,
    pub execution_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let plans_total = IntCounter::with_opts(Opts::new(
            "txplan_plans_total",
            "Number of instruction plans planned successfully",
        ))?;

        let planning_failures = IntCounter::with_opts(Opts::new(
            "txplan_planning_failures_total",
            "Number of instruction plans that failed to plan",
        ))?;

        let transactions_planned = IntCounter::with_opts(Opts::new(
            "txplan_transactions_planned_total",
            "Number of transaction messages emitted by the planner",
        ))?;

        let executions_total = IntCounter::with_opts(Opts::new(
            "txplan_executions_total",
            "Number of transaction plan executions",
        ))?;

        let executions_failed = IntCounter::with_opts(Opts::new(
            "txplan_executions_failed_total",
            "Number of transaction plan executions that failed or were aborted",
        ))?;

        let transactions_successful = IntCounter::with_opts(Opts::new(
            "txplan_transactions_successful_total",
            "Number of transactions executed successfully",
        ))?;

        let transactions_failed = IntCounter::with_opts(Opts::new(
            "txplan_transactions_failed_total",
            "Number of transactions whose execution failed",
        ))?;

        let transactions_canceled = IntCounter::with_opts(Opts::new(
            "txplan_transactions_canceled_total",
            "Number of transactions skipped after cancellation",
        ))?;

        let compute_unit_estimates = IntCounter::with_opts(Opts::new(
            "txplan_compute_unit_estimates_total",
            "Number of compute unit limits estimated by simulation",
        ))?;

        let compute_unit_estimate_failures = IntCounter::with_opts(Opts::new(
            "txplan_compute_unit_estimate_failures_total",
            "Number of compute unit estimations that failed",
        ))?;

        let planning_latency = Histogram::with_opts(
            HistogramOpts::new("txplan_planning_latency_seconds", "Instruction plan planning latency")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;

        let execution_latency = Histogram::with_opts(
            HistogramOpts::new("txplan_execution_latency_seconds", "Transaction plan execution latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(plans_total.clone()))?;
        registry.register(Box::new(planning_failures.clone()))?;
        registry.register(Box::new(transactions_planned.clone()))?;
        registry.register(Box::new(executions_total.clone()))?;
        registry.register(Box::new(executions_failed.clone()))?;
        registry.register(Box::new(transactions_successful.clone()))?;
        registry.register(Box::new(transactions_failed.clone()))?;
        registry.register(Box::new(transactions_canceled.clone()))?;
        registry.register(Box::new(compute_unit_estimates.clone()))?;
        registry.register(Box::new(compute_unit_estimate_failures.clone()))?;
        registry.register(Box::new(planning_latency.clone()))?;
        registry.register(Box::new(execution_latency.clone()))?;

        Ok(Self {
            registry,
            plans_total,
            planning_failures,
            transactions_planned,
            executions_total,
            executions_failed,
            transactions_successful,
            transactions_failed,
            transactions_canceled,
            compute_unit_estimates,
            compute_unit_estimate_failures,
            planning_latency,
            execution_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn export_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
