//! Cluster selection within a VDC.
//!
//! Filters the VDC's clusters down to candidates that can actually
//! host the job, then applies the configured strategy. Ties always
//! break on cluster id so selection is deterministic for a fixed
//! snapshot.

use uuid::Uuid;

use grani_types::{Cluster, Job, SelectionStrategy};

/// Load-balancing weights: GPUs are the scarce dimension.
const CPU_WEIGHT: f64 = 0.3;
const MEMORY_WEIGHT: f64 = 0.3;
const GPU_WEIGHT: f64 = 0.4;

/// Choose a cluster for a job under the given strategy.
///
/// `user_running` carries the submitting user's running-job count per
/// cluster, for per-user concurrency caps. Returns `None` when no
/// candidate survives filtering.
pub fn select_cluster<'a>(
    job: &Job,
    clusters: &'a [Cluster],
    strategy: SelectionStrategy,
    user_running: &rustc_hash::FxHashMap<Uuid, u32>,
) -> Option<&'a Cluster> {
    let candidates = candidate_clusters(job, clusters, user_running);
    if candidates.is_empty() {
        tracing::warn!(job = %job.id, "no candidate clusters");
        return None;
    }

    let selected = apply_strategy(job, &candidates, strategy)?;
    tracing::info!(
        job = %job.id,
        cluster = %selected.name,
        strategy = ?strategy,
        "selected cluster"
    );
    Some(selected)
}

/// Filter to clusters that can host the job right now.
fn candidate_clusters<'a>(
    job: &Job,
    clusters: &'a [Cluster],
    user_running: &rustc_hash::FxHashMap<Uuid, u32>,
) -> Vec<&'a Cluster> {
    clusters
        .iter()
        .filter(|cluster| {
            if !cluster.can_accept_job() {
                return false;
            }
            if cluster.cluster_type != job.executor {
                return false;
            }
            if !cluster.has_available_resources(&job.request) {
                return false;
            }
            if !cluster.labels_match(&job.required_labels) {
                return false;
            }
            if let Some(cap) = cluster.max_jobs_per_user {
                let running = user_running.get(&cluster.id).copied().unwrap_or(0);
                if running >= cap {
                    return false;
                }
            }
            true
        })
        .collect()
}

fn apply_strategy<'a>(
    job: &Job,
    candidates: &[&'a Cluster],
    strategy: SelectionStrategy,
) -> Option<&'a Cluster> {
    match strategy {
        SelectionStrategy::LoadBalancing => pick_min(candidates, load_score),
        SelectionStrategy::ResourceFit => pick_min(candidates, |c| fit_score(c, job)),
        SelectionStrategy::Priority => pick_min(candidates, |c| -priority_score(c)),
        SelectionStrategy::Affinity => {
            let preferred: Vec<&Cluster> = candidates
                .iter()
                .copied()
                .filter(|c| job.preferred_cluster_ids.contains(&c.id))
                .collect();
            if preferred.is_empty() {
                // None of the preferred clusters survived filtering.
                pick_min(candidates, load_score)
            } else {
                pick_min(&preferred, |c| -(c.priority as f64))
            }
        }
        SelectionStrategy::CostOptimized => {
            let priced: Vec<&Cluster> = candidates
                .iter()
                .copied()
                .filter(|c| c.cost_per_cpu_hour.is_some())
                .collect();
            if priced.is_empty() {
                pick_min(candidates, load_score)
            } else {
                pick_min(&priced, |c| cost_score(c, job))
            }
        }
    }
}

/// Minimum by score, ties broken by cluster id.
fn pick_min<'a>(
    candidates: &[&'a Cluster],
    score: impl Fn(&Cluster) -> f64,
) -> Option<&'a Cluster> {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| score(a).total_cmp(&score(b)).then_with(|| a.id.cmp(&b.id)))
}

/// Weighted usage percentage; lower is less loaded.
fn load_score(cluster: &Cluster) -> f64 {
    let (cpu, memory, gpu) = cluster.usage_percentage();
    cpu * CPU_WEIGHT + memory * MEMORY_WEIGHT + gpu * GPU_WEIGHT
}

/// Relative leftover per requested dimension; lower means the cluster
/// is closer to a snug fit. Dimensions the job does not request are
/// omitted.
fn fit_score(cluster: &Cluster, job: &Job) -> f64 {
    let available = cluster.available();
    let request = &job.request;
    let mut score = 0.0;

    if request.cpu > 0.0 {
        score += ((available.cpu - request.cpu) / request.cpu).abs();
    }
    if request.memory > 0.0 {
        score += ((available.memory - request.memory) / request.memory).abs();
    }
    if request.gpu > 0 {
        let gpu_request = f64::from(request.gpu);
        score += ((f64::from(available.gpu) - gpu_request) / gpu_request).abs();
    }
    score
}

fn priority_score(cluster: &Cluster) -> f64 {
    cluster.priority as f64 * cluster.weight
}

/// Estimated hourly cost of the request on this cluster. Dimensions
/// without a declared cost are free.
fn cost_score(cluster: &Cluster, job: &Job) -> f64 {
    let request = &job.request;
    let mut cost = 0.0;

    if let Some(per_cpu) = cluster.cost_per_cpu_hour {
        cost += request.cpu * per_cpu;
    }
    if let Some(per_gib) = cluster.cost_per_memory_gib_hour {
        cost += request.memory * per_gib;
    }
    if let Some(per_gpu) = cluster.cost_per_gpu_hour {
        if request.gpu > 0 {
            cost += f64::from(request.gpu) * per_gpu;
        }
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use grani_types::{ClusterStatus, ExecutorKind, JobType, Resources};
    use serde_json::json;

    fn make_job(request: Resources) -> Job {
        Job::new(
            "j",
            JobType::Training,
            ExecutorKind::Kubernetes,
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({"image": "x"}),
        )
        .with_request(request)
    }

    fn make_cluster(name: &str, capacity: Resources, used: Resources) -> Cluster {
        let mut cluster = Cluster::new(Uuid::new_v4(), name, ExecutorKind::Kubernetes, capacity);
        cluster.used = used;
        cluster
    }

    fn no_user_caps() -> rustc_hash::FxHashMap<Uuid, u32> {
        rustc_hash::FxHashMap::default()
    }

    #[test]
    fn test_load_balancing_picks_least_loaded() {
        let busy = make_cluster("busy", Resources::new(100.0, 100.0, 0), Resources::new(80.0, 80.0, 0));
        let idle = make_cluster("idle", Resources::new(100.0, 100.0, 0), Resources::new(20.0, 20.0, 0));
        let clusters = vec![busy, idle];

        let job = make_job(Resources::new(2.0, 4.0, 0));
        let selected = select_cluster(&job, &clusters, SelectionStrategy::LoadBalancing, &no_user_caps())
            .unwrap();
        assert_eq!(selected.name, "idle");
    }

    #[test]
    fn test_candidate_filtering() {
        let job = make_job(Resources::new(4.0, 8.0, 0));

        let mut disabled = make_cluster("disabled", Resources::new(100.0, 100.0, 0), Resources::zero());
        disabled.enabled = false;

        let mut degraded = make_cluster("degraded", Resources::new(100.0, 100.0, 0), Resources::zero());
        degraded.status = ClusterStatus::Degraded;

        let mut slurm = make_cluster("slurm", Resources::new(100.0, 100.0, 0), Resources::zero());
        slurm.cluster_type = ExecutorKind::Slurm;

        let cramped = make_cluster("cramped", Resources::new(2.0, 2.0, 0), Resources::zero());

        let mut labelled = make_cluster("labelled", Resources::new(100.0, 100.0, 0), Resources::zero());
        labelled.labels.insert("region".into(), "us-east".into());

        let clusters = vec![disabled, degraded, slurm, cramped, labelled];

        // Only the labelled cluster survives; no labels are required.
        let selected =
            select_cluster(&job, &clusters, SelectionStrategy::LoadBalancing, &no_user_caps())
                .unwrap();
        assert_eq!(selected.name, "labelled");

        // Requiring an absent label empties the candidate set.
        let picky = make_job(Resources::new(4.0, 8.0, 0)).with_required_label("region", "eu-west");
        assert!(
            select_cluster(&picky, &clusters, SelectionStrategy::LoadBalancing, &no_user_caps())
                .is_none()
        );
    }

    #[test]
    fn test_per_user_cap_filters() {
        let mut capped = make_cluster("capped", Resources::new(100.0, 100.0, 0), Resources::zero());
        capped.max_jobs_per_user = Some(2);
        let open = make_cluster("open", Resources::new(100.0, 100.0, 0), Resources::new(50.0, 50.0, 0));
        let capped_id = capped.id;
        let clusters = vec![capped, open];

        let job = make_job(Resources::new(1.0, 1.0, 0));

        // Under the cap the less-loaded capped cluster wins.
        let mut running = no_user_caps();
        running.insert(capped_id, 1);
        let selected =
            select_cluster(&job, &clusters, SelectionStrategy::LoadBalancing, &running).unwrap();
        assert_eq!(selected.name, "capped");

        // At the cap it is filtered out.
        running.insert(capped_id, 2);
        let selected =
            select_cluster(&job, &clusters, SelectionStrategy::LoadBalancing, &running).unwrap();
        assert_eq!(selected.name, "open");
    }

    #[test]
    fn test_resource_fit_prefers_snug_cluster() {
        let snug = make_cluster("snug", Resources::new(8.0, 16.0, 0), Resources::new(3.0, 6.0, 0));
        let roomy = make_cluster("roomy", Resources::new(100.0, 200.0, 0), Resources::zero());
        let clusters = vec![roomy, snug];

        let job = make_job(Resources::new(4.0, 8.0, 0));
        let selected =
            select_cluster(&job, &clusters, SelectionStrategy::ResourceFit, &no_user_caps()).unwrap();
        assert_eq!(selected.name, "snug");
    }

    #[test]
    fn test_priority_strategy_uses_weight() {
        let mut heavy = make_cluster("heavy", Resources::new(100.0, 100.0, 0), Resources::zero());
        heavy.priority = 5;
        heavy.weight = 3.0;
        let mut high = make_cluster("high", Resources::new(100.0, 100.0, 0), Resources::zero());
        high.priority = 10;
        high.weight = 1.0;
        let clusters = vec![high, heavy];

        let job = make_job(Resources::new(1.0, 1.0, 0));
        let selected =
            select_cluster(&job, &clusters, SelectionStrategy::Priority, &no_user_caps()).unwrap();
        // 5 × 3.0 beats 10 × 1.0.
        assert_eq!(selected.name, "heavy");
    }

    #[test]
    fn test_affinity_prefers_preferred_cluster() {
        let mut preferred = make_cluster("preferred", Resources::new(100.0, 100.0, 0), Resources::new(90.0, 90.0, 0));
        preferred.priority = 1;
        let idle = make_cluster("idle", Resources::new(100.0, 100.0, 0), Resources::zero());
        let preferred_id = preferred.id;
        let clusters = vec![preferred, idle];

        let mut job = make_job(Resources::new(1.0, 1.0, 0));
        job.preferred_cluster_ids = vec![preferred_id];

        // Preferred wins despite heavier load.
        let selected =
            select_cluster(&job, &clusters, SelectionStrategy::Affinity, &no_user_caps()).unwrap();
        assert_eq!(selected.id, preferred_id);
    }

    #[test]
    fn test_affinity_falls_back_to_load_balancing() {
        let mut unavailable = make_cluster("preferred", Resources::new(100.0, 100.0, 0), Resources::zero());
        unavailable.status = ClusterStatus::Unavailable;
        let busy = make_cluster("busy", Resources::new(100.0, 100.0, 0), Resources::new(70.0, 70.0, 0));
        let idle = make_cluster("idle", Resources::new(100.0, 100.0, 0), Resources::new(10.0, 10.0, 0));
        let unavailable_id = unavailable.id;
        let clusters = vec![unavailable, busy, idle];

        let mut job = make_job(Resources::new(1.0, 1.0, 0));
        job.preferred_cluster_ids = vec![unavailable_id];

        // The preferred cluster is filtered out, so least-loaded wins.
        let selected =
            select_cluster(&job, &clusters, SelectionStrategy::Affinity, &no_user_caps()).unwrap();
        assert_eq!(selected.name, "idle");
        assert_ne!(selected.id, unavailable_id);
    }

    #[test]
    fn test_cost_optimized_picks_cheapest() {
        let mut cheap = make_cluster("cheap", Resources::new(100.0, 100.0, 4), Resources::zero());
        cheap.cost_per_cpu_hour = Some(0.02);
        cheap.cost_per_gpu_hour = Some(1.0);
        let mut pricey = make_cluster("pricey", Resources::new(100.0, 100.0, 4), Resources::zero());
        pricey.cost_per_cpu_hour = Some(0.10);
        pricey.cost_per_gpu_hour = Some(3.0);
        let clusters = vec![pricey, cheap];

        let job = make_job(Resources::new(4.0, 8.0, 1));
        let selected =
            select_cluster(&job, &clusters, SelectionStrategy::CostOptimized, &no_user_caps())
                .unwrap();
        assert_eq!(selected.name, "cheap");
    }

    #[test]
    fn test_cost_optimized_falls_back_without_prices() {
        let busy = make_cluster("busy", Resources::new(100.0, 100.0, 0), Resources::new(80.0, 80.0, 0));
        let idle = make_cluster("idle", Resources::new(100.0, 100.0, 0), Resources::zero());
        let clusters = vec![busy, idle];

        let job = make_job(Resources::new(1.0, 1.0, 0));
        let selected =
            select_cluster(&job, &clusters, SelectionStrategy::CostOptimized, &no_user_caps())
                .unwrap();
        assert_eq!(selected.name, "idle");
    }

    #[test]
    fn test_ties_break_on_cluster_id() {
        let a = make_cluster("a", Resources::new(100.0, 100.0, 0), Resources::zero());
        let b = make_cluster("b", Resources::new(100.0, 100.0, 0), Resources::zero());
        let smaller = a.id.min(b.id);
        let clusters = vec![a, b];

        let job = make_job(Resources::new(1.0, 1.0, 0));
        for _ in 0..10 {
            let selected =
                select_cluster(&job, &clusters, SelectionStrategy::LoadBalancing, &no_user_caps())
                    .unwrap();
            assert_eq!(selected.id, smaller);
        }
    }
}
