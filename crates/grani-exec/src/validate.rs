//! Pre-dispatch validation of `executor_config` documents.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde_json::Value;

use grani_types::{ExecutorKind, Job, JobType};

use crate::error::{ExecError, ExecResult};

/// Validate that a job carries the configuration its driver needs.
pub fn validate(job: &Job) -> ExecResult<()> {
    let config = config_object(job)?;

    match job.executor {
        ExecutorKind::Kubernetes => validate_kubernetes(job, config),
        ExecutorKind::Slurm => validate_slurm(job, config),
    }
}

fn config_object(job: &Job) -> ExecResult<&serde_json::Map<String, Value>> {
    job.executor_config
        .as_object()
        .ok_or_else(|| ExecError::ConfigInvalid("executor_config must be a JSON object".into()))
}

fn validate_kubernetes(job: &Job, config: &serde_json::Map<String, Value>) -> ExecResult<()> {
    match job.job_type {
        JobType::Training | JobType::Inference => {
            require_string(config, "image")?;
        }
        JobType::Workflow => {
            validate_workflow_templates(&job.executor_config)?;
        }
    }
    Ok(())
}

fn validate_slurm(job: &Job, config: &serde_json::Map<String, Value>) -> ExecResult<()> {
    match job.job_type {
        JobType::Training => {
            if !config.contains_key("script") && !config.contains_key("command") {
                return Err(ExecError::ConfigInvalid(
                    "slurm training jobs need either 'script' or 'command'".into(),
                ));
            }
        }
        JobType::Inference => {
            if !config.contains_key("script") && !config.contains_key("command") {
                return Err(ExecError::ConfigInvalid(
                    "slurm inference jobs need either 'script' or 'command'".into(),
                ));
            }
        }
        JobType::Workflow => {
            validate_workflow_templates(&job.executor_config)?;
        }
    }
    Ok(())
}

fn require_string(config: &serde_json::Map<String, Value>, key: &str) -> ExecResult<()> {
    match config.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(()),
        _ => Err(ExecError::ConfigInvalid(format!("missing required field '{key}'"))),
    }
}

/// Validate a workflow definition: templates must exist, be uniquely
/// named, reference only known templates from DAG tasks, and the task
/// dependency graph must be acyclic.
pub fn validate_workflow_templates(config: &Value) -> ExecResult<()> {
    let templates = config
        .get("templates")
        .and_then(Value::as_array)
        .ok_or_else(|| ExecError::ConfigInvalid("workflow jobs need a 'templates' array".into()))?;

    if templates.is_empty() {
        return Err(ExecError::ConfigInvalid("'templates' must not be empty".into()));
    }

    let mut names = rustc_hash::FxHashSet::default();
    for template in templates {
        let name = template
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecError::ConfigInvalid("every template needs a 'name'".into()))?;
        if !names.insert(name.to_string()) {
            return Err(ExecError::ConfigInvalid(format!("duplicate template name '{name}'")));
        }
    }

    for template in templates {
        if let Some(dag) = template.get("dag") {
            validate_dag(dag, &names)?;
        }
    }

    Ok(())
}

fn validate_dag(dag: &Value, template_names: &rustc_hash::FxHashSet<String>) -> ExecResult<()> {
    let tasks = dag
        .get("tasks")
        .and_then(Value::as_array)
        .ok_or_else(|| ExecError::ConfigInvalid("'dag' needs a 'tasks' array".into()))?;

    let mut graph = DiGraph::<&str, ()>::new();
    let mut index = rustc_hash::FxHashMap::default();

    for task in tasks {
        let name = task
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecError::ConfigInvalid("every dag task needs a 'name'".into()))?;

        let template = task
            .get("template")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecError::ConfigInvalid(format!("task '{name}' needs a 'template'")))?;
        if !template_names.contains(template) {
            return Err(ExecError::ConfigInvalid(format!(
                "task '{name}' references unknown template '{template}'"
            )));
        }

        if index.insert(name, graph.add_node(name)).is_some() {
            return Err(ExecError::ConfigInvalid(format!("duplicate task name '{name}'")));
        }
    }

    for task in tasks {
        let name = task.get("name").and_then(Value::as_str).unwrap_or_default();
        let Some(deps) = task.get("dependencies").and_then(Value::as_array) else {
            continue;
        };
        for dep in deps {
            let dep = dep
                .as_str()
                .ok_or_else(|| ExecError::ConfigInvalid("dependencies must be strings".into()))?;
            let from = *index.get(dep).ok_or_else(|| {
                ExecError::ConfigInvalid(format!("task '{name}' depends on unknown task '{dep}'"))
            })?;
            let to = index[name];
            graph.add_edge(from, to, ());
        }
    }

    if is_cyclic_directed(&graph) {
        return Err(ExecError::ConfigInvalid("workflow task graph contains a cycle".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn job(executor: ExecutorKind, job_type: JobType, config: Value) -> Job {
        Job::new("j", job_type, executor, Uuid::new_v4(), Uuid::new_v4(), config)
    }

    #[test]
    fn test_kubernetes_requires_image() {
        let ok = job(
            ExecutorKind::Kubernetes,
            JobType::Training,
            json!({"image": "pytorch:2.1"}),
        );
        assert!(validate(&ok).is_ok());

        let missing = job(ExecutorKind::Kubernetes, JobType::Training, json!({}));
        assert!(matches!(validate(&missing), Err(ExecError::ConfigInvalid(_))));

        let null = job(ExecutorKind::Kubernetes, JobType::Training, Value::Null);
        assert!(matches!(validate(&null), Err(ExecError::ConfigInvalid(_))));
    }

    #[test]
    fn test_slurm_requires_script_or_command() {
        let with_script = job(
            ExecutorKind::Slurm,
            JobType::Training,
            json!({"script": "#!/bin/bash\nsrun python train.py"}),
        );
        assert!(validate(&with_script).is_ok());

        let with_command = job(
            ExecutorKind::Slurm,
            JobType::Training,
            json!({"command": ["python", "train.py"]}),
        );
        assert!(validate(&with_command).is_ok());

        let neither = job(ExecutorKind::Slurm, JobType::Training, json!({"partition": "gpu"}));
        assert!(validate(&neither).is_err());
    }

    #[test]
    fn test_workflow_dag_validation() {
        let valid = json!({
            "entrypoint": "main",
            "templates": [
                {"name": "main", "dag": {"tasks": [
                    {"name": "prep", "template": "step"},
                    {"name": "train", "template": "step", "dependencies": ["prep"]},
                ]}},
                {"name": "step", "container": {"image": "python:3.12"}},
            ]
        });
        assert!(validate_workflow_templates(&valid).is_ok());

        let cyclic = json!({
            "templates": [
                {"name": "main", "dag": {"tasks": [
                    {"name": "a", "template": "step", "dependencies": ["b"]},
                    {"name": "b", "template": "step", "dependencies": ["a"]},
                ]}},
                {"name": "step", "container": {}},
            ]
        });
        assert!(validate_workflow_templates(&cyclic).is_err());

        let unknown_template = json!({
            "templates": [
                {"name": "main", "dag": {"tasks": [
                    {"name": "a", "template": "ghost"},
                ]}},
            ]
        });
        assert!(validate_workflow_templates(&unknown_template).is_err());

        let unknown_dep = json!({
            "templates": [
                {"name": "main", "dag": {"tasks": [
                    {"name": "a", "template": "main", "dependencies": ["ghost"]},
                ]}},
            ]
        });
        assert!(validate_workflow_templates(&unknown_dep).is_err());

        assert!(validate_workflow_templates(&json!({"templates": []})).is_err());
        assert!(validate_workflow_templates(&json!({})).is_err());
    }
}
