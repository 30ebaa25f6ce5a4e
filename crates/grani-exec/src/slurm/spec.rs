//! Slurm job document and script construction.

use serde_json::{Value, json};

use grani_types::Job;

use crate::error::{ExecError, ExecResult};

/// Defaults applied when the job config leaves fields unset.
#[derive(Debug, Clone)]
pub struct SlurmDefaults {
    pub partition: String,
    pub account: Option<String>,
}

/// Parse a Slurm time limit into whole minutes.
///
/// Accepts `HH:MM:SS`, `MM:SS`, a bare minute count, or `UNLIMITED`
/// (which maps to 0, Slurm's "no limit"). Partial minutes round up.
pub fn parse_time_limit(s: &str) -> ExecResult<u64> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("UNLIMITED") {
        return Ok(0);
    }

    let parts: Vec<&str> = s.split(':').collect();
    let parse =
        |p: &str| -> ExecResult<u64> {
            p.parse()
                .map_err(|_| ExecError::ConfigInvalid(format!("invalid time limit {s:?}")))
        };

    match parts.as_slice() {
        [hours, minutes, seconds] => {
            let (h, m, sec) = (parse(hours)?, parse(minutes)?, parse(seconds)?);
            Ok(h * 60 + m + u64::from(sec > 0))
        }
        [minutes, seconds] => {
            let (m, sec) = (parse(minutes)?, parse(seconds)?);
            Ok(m + u64::from(sec > 0))
        }
        [minutes] => parse(minutes),
        _ => Err(ExecError::ConfigInvalid(format!("invalid time limit {s:?}"))),
    }
}

/// Parse a memory string with GB/MB/TB suffixes into MiB (Slurm's
/// native unit). Bare values are MiB already.
pub fn parse_memory_mib(s: &str) -> ExecResult<u64> {
    let upper = s.trim().to_uppercase();
    let (number, factor) = if let Some(n) = upper.strip_suffix("TB") {
        (n.to_string(), 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("GB") {
        (n.to_string(), 1024)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n.to_string(), 1)
    } else {
        (upper, 1)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| ExecError::ConfigInvalid(format!("invalid memory {s:?}")))?;
    Ok(value * factor)
}

/// Build the submit document for a training job.
pub fn build_training_doc(job: &Job, defaults: &SlurmDefaults) -> ExecResult<Value> {
    let config = &job.executor_config;
    let script = generate_batch_script(job)?;

    let mut doc = json!({
        "job": {
            "name": job.name,
            "partition": partition(config, defaults),
            "nodes": config.get("nodes").cloned().unwrap_or_else(|| json!(1)),
            "ntasks_per_node": config.get("ntasks_per_node").cloned().unwrap_or_else(|| json!(1)),
            "cpus_per_task": config.get("cpus_per_task").cloned().unwrap_or_else(|| json!(1)),
            "time_limit": parse_time_limit(
                config.get("time").and_then(Value::as_str).unwrap_or("01:00:00"),
            )?,
            "standard_output": config
                .get("output")
                .cloned()
                .unwrap_or_else(|| json!(format!("/tmp/slurm-{}-%j.out", job.id))),
            "standard_error": config
                .get("error")
                .cloned()
                .unwrap_or_else(|| json!(format!("/tmp/slurm-{}-%j.err", job.id))),
            "current_working_directory": config
                .get("working_dir")
                .cloned()
                .unwrap_or_else(|| json!("/scratch")),
            "environment": config.get("env").cloned().unwrap_or_else(|| json!({})),
        },
        "script": script,
    });

    apply_common_fields(&mut doc, config, defaults)?;
    Ok(doc)
}

/// Build the submit document for an inference service. Inference jobs
/// run without a time limit.
pub fn build_inference_doc(job: &Job, defaults: &SlurmDefaults) -> ExecResult<Value> {
    let config = &job.executor_config;
    let script = match config.get("script").and_then(Value::as_str) {
        Some(script) => script.to_string(),
        None => generate_inference_script(job)?,
    };

    let mut doc = json!({
        "job": {
            "name": format!("{}-inference", job.name),
            "partition": partition(config, defaults),
            "nodes": config.get("nodes").cloned().unwrap_or_else(|| json!(1)),
            "ntasks": config.get("ntasks").cloned().unwrap_or_else(|| json!(1)),
            "cpus_per_task": config.get("cpus_per_task").cloned().unwrap_or_else(|| json!(4)),
            "time_limit": parse_time_limit(
                config.get("time").and_then(Value::as_str).unwrap_or("UNLIMITED"),
            )?,
            "standard_output": format!("/tmp/slurm-inference-{}-%j.out", job.id),
            "standard_error": format!("/tmp/slurm-inference-{}-%j.err", job.id),
            "environment": config.get("env").cloned().unwrap_or_else(|| json!({})),
        },
        "script": script,
    });

    apply_common_fields(&mut doc, config, defaults)?;
    Ok(doc)
}

/// Build the submit document for a workflow controller job.
pub fn build_workflow_doc(job: &Job, defaults: &SlurmDefaults) -> ExecResult<Value> {
    let config = &job.executor_config;
    let script = generate_workflow_script(job)?;

    let mut doc = json!({
        "job": {
            "name": format!("{}-workflow", job.name),
            "partition": partition(config, defaults),
            "nodes": 1,
            "ntasks": 1,
            "cpus_per_task": 2,
            "time_limit": parse_time_limit(
                config.get("time").and_then(Value::as_str).unwrap_or("24:00:00"),
            )?,
            "standard_output": format!("/tmp/slurm-workflow-{}-%j.out", job.id),
            "environment": config.get("env").cloned().unwrap_or_else(|| json!({})),
        },
        "script": script,
    });

    apply_common_fields(&mut doc, config, defaults)?;
    Ok(doc)
}

fn partition(config: &Value, defaults: &SlurmDefaults) -> String {
    config
        .get("partition")
        .and_then(Value::as_str)
        .unwrap_or(&defaults.partition)
        .to_string()
}

/// GPU, memory, and account fields shared by all job shapes.
fn apply_common_fields(
    doc: &mut Value,
    config: &Value,
    defaults: &SlurmDefaults,
) -> ExecResult<()> {
    let job = &mut doc["job"];

    let gpus = config
        .get("gpus_per_node")
        .or_else(|| config.get("gpus"))
        .and_then(Value::as_u64);
    if let Some(gpus) = gpus {
        if gpus > 0 {
            job["gres"] = json!(format!("gpu:{gpus}"));
        }
    }

    if let Some(mem) = config.get("mem").and_then(Value::as_str) {
        job["memory_per_node"] = json!(parse_memory_mib(mem)?);
    }

    let account = config
        .get("account")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| defaults.account.clone());
    if let Some(account) = account {
        job["account"] = json!(account);
    }

    Ok(())
}

/// Assemble the sbatch script for a training job: module loads, env
/// exports, working directory, then the user's script or command.
pub fn generate_batch_script(job: &Job) -> ExecResult<String> {
    let config = &job.executor_config;
    let mut lines = vec!["#!/bin/bash".to_string()];

    if let Some(modules) = config.get("modules").and_then(Value::as_array) {
        for module in modules.iter().filter_map(Value::as_str) {
            lines.push(format!("module load {module}"));
        }
    }

    if let Some(env) = config.get("env").and_then(Value::as_object) {
        for (key, value) in env {
            if let Some(value) = value.as_str() {
                lines.push(format!("export {key}={value}"));
            }
        }
    }

    if let Some(dir) = config.get("working_dir").and_then(Value::as_str) {
        lines.push(format!("cd {dir}"));
    }

    if let Some(script) = config.get("script").and_then(Value::as_str) {
        lines.push(script.to_string());
    } else if let Some(command) = config.get("command").and_then(Value::as_array) {
        let command: Vec<&str> = command.iter().filter_map(Value::as_str).collect();
        lines.push(command.join(" "));
    } else {
        return Err(ExecError::ConfigInvalid(
            "either 'script' or 'command' must be specified".into(),
        ));
    }

    Ok(lines.join("\n"))
}

fn generate_inference_script(job: &Job) -> ExecResult<String> {
    let config = &job.executor_config;
    let mut lines = vec!["#!/bin/bash".to_string()];

    if let Some(modules) = config.get("modules").and_then(Value::as_array) {
        for module in modules.iter().filter_map(Value::as_str) {
            lines.push(format!("module load {module}"));
        }
    }

    let command = match config.get("command") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        _ => {
            return Err(ExecError::ConfigInvalid(
                "inference jobs need a 'command' or 'script'".into(),
            ));
        }
    };
    lines.push(command);

    Ok(lines.join("\n"))
}

/// The workflow controller script runs template steps sequentially.
/// Dependency ordering within a `dag` template was validated before
/// submission; the controller relies on template order.
fn generate_workflow_script(job: &Job) -> ExecResult<String> {
    let config = &job.executor_config;
    let templates = config
        .get("templates")
        .and_then(Value::as_array)
        .ok_or_else(|| ExecError::ConfigInvalid("workflow jobs need 'templates'".into()))?;

    let mut lines = vec![
        "#!/bin/bash".to_string(),
        "set -e".to_string(),
        format!("# workflow: {}", job.name),
    ];

    for (i, template) in templates.iter().enumerate() {
        let Some(container) = template.get("container") else {
            continue;
        };
        let name = template.get("name").and_then(Value::as_str).unwrap_or("step");
        let command = container
            .get("command")
            .and_then(Value::as_array)
            .map(|c| c.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" "))
            .unwrap_or_default();

        lines.push(format!("echo 'Running step {}: {name}'", i + 1));
        lines.push(command);
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grani_types::{ExecutorKind, JobType};
    use serde_json::json;
    use uuid::Uuid;

    fn defaults() -> SlurmDefaults {
        SlurmDefaults {
            partition: "compute".to_string(),
            account: Some("ml_team".to_string()),
        }
    }

    fn slurm_job(job_type: JobType, config: Value) -> Job {
        Job::new("train", job_type, ExecutorKind::Slurm, Uuid::new_v4(), Uuid::new_v4(), config)
    }

    #[test]
    fn test_parse_time_limit() {
        assert_eq!(parse_time_limit("24:00:00").unwrap(), 1440);
        assert_eq!(parse_time_limit("01:30:00").unwrap(), 90);
        assert_eq!(parse_time_limit("00:00:30").unwrap(), 1);
        assert_eq!(parse_time_limit("30:00").unwrap(), 30);
        assert_eq!(parse_time_limit("30:01").unwrap(), 31);
        assert_eq!(parse_time_limit("45").unwrap(), 45);
        assert_eq!(parse_time_limit("UNLIMITED").unwrap(), 0);
        assert_eq!(parse_time_limit("unlimited").unwrap(), 0);
        assert!(parse_time_limit("1:2:3:4").is_err());
        assert!(parse_time_limit("abc").is_err());
    }

    #[test]
    fn test_parse_memory_mib() {
        assert_eq!(parse_memory_mib("256GB").unwrap(), 262144);
        assert_eq!(parse_memory_mib("512MB").unwrap(), 512);
        assert_eq!(parse_memory_mib("1TB").unwrap(), 1048576);
        assert_eq!(parse_memory_mib("2048").unwrap(), 2048);
        assert_eq!(parse_memory_mib("4gb").unwrap(), 4096);
        assert!(parse_memory_mib("lots").is_err());
    }

    #[test]
    fn test_training_doc() {
        let job = slurm_job(
            JobType::Training,
            json!({
                "partition": "gpu",
                "nodes": 4,
                "cpus_per_task": 8,
                "gpus_per_node": 8,
                "time": "24:00:00",
                "mem": "256GB",
                "command": ["srun", "python", "train.py"],
                "modules": ["cuda/12.1"],
                "env": {"OMP_NUM_THREADS": "8"},
                "working_dir": "/scratch/proj",
            }),
        );

        let doc = build_training_doc(&job, &defaults()).unwrap();
        assert_eq!(doc["job"]["partition"], "gpu");
        assert_eq!(doc["job"]["nodes"], 4);
        assert_eq!(doc["job"]["time_limit"], 1440);
        assert_eq!(doc["job"]["gres"], "gpu:8");
        assert_eq!(doc["job"]["memory_per_node"], 262144);
        assert_eq!(doc["job"]["account"], "ml_team");

        let script = doc["script"].as_str().unwrap();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("module load cuda/12.1"));
        assert!(script.contains("export OMP_NUM_THREADS=8"));
        assert!(script.contains("cd /scratch/proj"));
        assert!(script.contains("srun python train.py"));
    }

    #[test]
    fn test_training_doc_defaults() {
        let job = slurm_job(JobType::Training, json!({"script": "srun python t.py"}));
        let doc = build_training_doc(&job, &defaults()).unwrap();

        assert_eq!(doc["job"]["partition"], "compute");
        assert_eq!(doc["job"]["nodes"], 1);
        assert_eq!(doc["job"]["time_limit"], 60);
        assert!(doc["job"].get("gres").is_none());
    }

    #[test]
    fn test_inference_doc_is_unlimited() {
        let job = slurm_job(JobType::Inference, json!({"command": "python serve.py", "gpus": 1}));
        let doc = build_inference_doc(&job, &defaults()).unwrap();

        assert_eq!(doc["job"]["name"], "train-inference");
        assert_eq!(doc["job"]["time_limit"], 0);
        assert_eq!(doc["job"]["gres"], "gpu:1");
    }

    #[test]
    fn test_workflow_doc_sequences_steps() {
        let job = slurm_job(
            JobType::Workflow,
            json!({"templates": [
                {"name": "prep", "container": {"command": ["python", "prep.py"]}},
                {"name": "train", "container": {"command": ["python", "train.py"]}},
            ]}),
        );
        let doc = build_workflow_doc(&job, &defaults()).unwrap();

        let script = doc["script"].as_str().unwrap();
        let prep = script.find("python prep.py").unwrap();
        let train = script.find("python train.py").unwrap();
        assert!(prep < train);
        assert_eq!(doc["job"]["time_limit"], 1440);
    }

    #[test]
    fn test_batch_script_requires_payload() {
        let job = slurm_job(JobType::Training, json!({"partition": "gpu"}));
        assert!(generate_batch_script(&job).is_err());
    }
}
