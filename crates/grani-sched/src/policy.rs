//! Scheduling policies: choose the next dispatchable job from a queue.
//!
//! Policies are a closed sum type constructed from configuration —
//! [`SchedulingPolicy::from_name`] is the single name→variant mapping.
//! They are pure: they read a queue snapshot and return a choice,
//! never touching persistent state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use grani_types::{Job, JobQueue, PolicyName, Resources};

/// Inputs a policy may consult beyond the pending set itself.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    /// Recent resource-hours per user within the fair-share lookback.
    pub recent_usage: rustc_hash::FxHashMap<Uuid, f64>,

    /// Remaining quota capacity, when known; backfill uses it to judge
    /// whether the primary choice can start now.
    pub available: Option<Resources>,
}

impl PolicyContext {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A scheduling policy variant with its parameters.
#[derive(Debug, Clone)]
pub enum SchedulingPolicy {
    /// Strict submission order.
    Fifo,

    /// Highest job priority first, FIFO tie-break; arms preemption.
    Priority {
        /// Gap required before a victim is nominated. Tuned to avoid
        /// preemption thrash.
        preemption_threshold: i64,
    },

    /// Users with the least recent usage go first.
    FairShare {
        /// Resource-hours considered a full share.
        target: f64,
    },

    /// Wraps a base policy; lets short bounded jobs run while the base
    /// choice waits for capacity.
    Backfill { base: Box<SchedulingPolicy> },
}

impl SchedulingPolicy {
    /// Construct the variant a policy name denotes.
    pub fn from_name(name: PolicyName, preemption_threshold: i64, fair_share_target: f64) -> Self {
        match name {
            PolicyName::Fifo => SchedulingPolicy::Fifo,
            PolicyName::Priority => SchedulingPolicy::Priority {
                preemption_threshold,
            },
            PolicyName::Fairshare => SchedulingPolicy::FairShare {
                target: fair_share_target,
            },
            PolicyName::Backfill => SchedulingPolicy::Backfill {
                base: Box::new(SchedulingPolicy::Fifo),
            },
        }
    }

    /// Select the job to dispatch next, or `None` when nothing should
    /// start this cycle.
    pub fn select_next<'a>(
        &self,
        queue: &JobQueue,
        pending: &'a [Job],
        ctx: &PolicyContext,
    ) -> Option<&'a Job> {
        if pending.is_empty() || !queue.has_capacity() {
            return None;
        }

        match self {
            SchedulingPolicy::Fifo => pending.iter().min_by_key(|job| fifo_key(job)),

            SchedulingPolicy::Priority { .. } => pending
                .iter()
                .min_by_key(|job| (std::cmp::Reverse(job.priority), fifo_key(job))),

            SchedulingPolicy::FairShare { target } => {
                let score = |job: &Job| {
                    let usage = ctx.recent_usage.get(&job.user_id).copied().unwrap_or(0.0);
                    usage / target.max(f64::MIN_POSITIVE)
                };
                pending.iter().min_by(|a, b| {
                    score(a)
                        .total_cmp(&score(b))
                        .then_with(|| fifo_key(a).cmp(&fifo_key(b)))
                })
            }

            SchedulingPolicy::Backfill { base } => {
                let primary = base.select_next(queue, pending, ctx)?;
                let Some(available) = ctx.available else {
                    return Some(primary);
                };
                if primary.request.fits(&available) {
                    return Some(primary);
                }

                // Capacity stays reserved for the primary; only jobs
                // that fit the gap and declare a bounded runtime may
                // jump ahead, shortest first.
                pending
                    .iter()
                    .filter(|job| job.id != primary.id && job.request.fits(&available))
                    .filter_map(|job| expected_runtime_minutes(job).map(|runtime| (runtime, job)))
                    .min_by_key(|(runtime, job)| (*runtime, fifo_key(job)))
                    .map(|(_, job)| job)
            }
        }
    }

    /// Nominate a running job to preempt for `incoming`, if this
    /// policy arms preemption.
    pub fn should_preempt<'a>(&self, running: &'a [Job], incoming: &Job) -> Option<&'a Job> {
        match self {
            SchedulingPolicy::Priority {
                preemption_threshold,
            } => {
                let victim = running
                    .iter()
                    .min_by_key(|job| (job.priority, fifo_key(job)))?;
                if incoming.priority >= victim.priority + preemption_threshold {
                    tracing::info!(
                        victim = %victim.id,
                        victim_priority = victim.priority,
                        incoming = %incoming.id,
                        incoming_priority = incoming.priority,
                        "preemption candidate nominated"
                    );
                    Some(victim)
                } else {
                    None
                }
            }
            SchedulingPolicy::Backfill { base } => base.should_preempt(running, incoming),
            _ => None,
        }
    }
}

/// Deterministic FIFO ordering: queue position, then enqueue time,
/// then id as the final tie-break.
fn fifo_key(job: &Job) -> (i64, DateTime<Utc>, Uuid) {
    (
        job.queue_position.unwrap_or(i64::MAX),
        job.enqueued_at.unwrap_or(DateTime::<Utc>::MAX_UTC),
        job.id.0,
    )
}

/// A job's declared runtime bound in minutes, when it has one.
fn expected_runtime_minutes(job: &Job) -> Option<u64> {
    if let Some(time) = job.executor_config.get("time").and_then(|v| v.as_str()) {
        return grani_exec::slurm::spec::parse_time_limit(time)
            .ok()
            .filter(|&minutes| minutes > 0);
    }
    job.executor_config
        .get("activeDeadlineSeconds")
        .and_then(|v| v.as_u64())
        .map(|secs| secs.div_ceil(60))
}
