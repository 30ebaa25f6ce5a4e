//! Kubernetes object construction from generic job configuration.
//!
//! Objects are built as raw JSON documents in the shape the API server
//! expects; only the fields the scheduler sets are emitted.

use serde_json::{Value, json};

use grani_types::Job;

/// Maximum length of the slug portion of a generated name.
const NAME_SLUG_MAX: usize = 50;

/// Generate the backend object name for a job.
///
/// DNS-1123: lowercased, non-alphanumerics folded to `-`, slug capped
/// at 50 chars, suffixed with the first 8 hex chars of the job id so
/// resubmissions of the same job are idempotent.
pub fn generate_name(job: &Job) -> String {
    let mut slug: String = job
        .name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    slug.truncate(NAME_SLUG_MAX);
    let slug = slug.trim_matches('-');
    let id = job.id.to_string();
    let short = &id[..8];
    if slug.is_empty() {
        format!("job-{short}")
    } else {
        format!("{slug}-{short}")
    }
}

/// Build a batch/v1 Job for a training workload.
pub fn build_training_job(job: &Job, service_account: &str, image_pull_secrets: &[String]) -> Value {
    let config = &job.executor_config;
    let name = generate_name(job);

    let container = json!({
        "name": "training",
        "image": config["image"],
        "command": config.get("command"),
        "args": config.get("args"),
        "env": build_env(config.get("env")),
        "resources": config.get("resources"),
        "volumeMounts": config.get("volumeMounts"),
    });

    let pod_spec = json!({
        "containers": [prune(container)],
        "restartPolicy": config.get("restartPolicy").cloned().unwrap_or_else(|| json!("OnFailure")),
        "serviceAccountName": config
            .get("serviceAccount")
            .and_then(Value::as_str)
            .unwrap_or(service_account),
        "nodeSelector": config.get("nodeSelector"),
        "tolerations": config.get("tolerations"),
        "volumes": config.get("volumes"),
        "imagePullSecrets": pull_secret_refs(image_pull_secrets),
    });

    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": name,
            "labels": job_labels(job, "training", &name),
        },
        "spec": {
            "template": {
                "metadata": { "labels": job_labels(job, "training", &name) },
                "spec": prune(pod_spec),
            },
            "backoffLimit": config.get("backoffLimit").cloned().unwrap_or_else(|| json!(3)),
            "ttlSecondsAfterFinished": config
                .get("ttlSecondsAfterFinished")
                .cloned()
                .unwrap_or_else(|| json!(86400)),
        }
    })
}

/// Build an apps/v1 Deployment for an inference workload.
pub fn build_inference_deployment(job: &Job, image_pull_secrets: &[String]) -> Value {
    let config = &job.executor_config;
    let name = generate_name(job);
    let port = config.get("port").and_then(Value::as_u64).unwrap_or(8080);

    let container = json!({
        "name": "inference",
        "image": config["image"],
        "ports": [{"containerPort": port}],
        "env": build_env(config.get("env")),
        "resources": config.get("resources"),
    });

    let pod_spec = json!({
        "containers": [prune(container)],
        "imagePullSecrets": pull_secret_refs(image_pull_secrets),
    });

    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "labels": {"app": name, "job-type": "inference"},
        },
        "spec": {
            "replicas": config.get("replicas").cloned().unwrap_or_else(|| json!(1)),
            "selector": {"matchLabels": {"app": name}},
            "template": {
                "metadata": {"labels": {"app": name}},
                "spec": prune(pod_spec),
            },
        }
    })
}

/// Build a core/v1 Service fronting an inference Deployment, when the
/// job config declares one.
pub fn build_service(job: &Job, deployment_name: &str) -> Option<Value> {
    let service = job.executor_config.get("service")?;

    Some(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": deployment_name},
        "spec": {
            "type": service.get("type").cloned().unwrap_or_else(|| json!("ClusterIP")),
            "selector": {"app": deployment_name},
            "ports": [{
                "port": service.get("port").cloned().unwrap_or_else(|| json!(80)),
                "targetPort": service.get("targetPort").cloned().unwrap_or_else(|| json!(8080)),
            }],
        }
    }))
}

/// Build the ConfigMap carrying a workflow definition.
pub fn build_workflow_configmap(job: &Job, workflow_name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": format!("{workflow_name}-config")},
        "data": {
            "workflow.json": job.executor_config.to_string(),
        }
    })
}

/// Build the controller Job that reads the workflow ConfigMap and
/// sequences its steps.
pub fn build_workflow_controller(job: &Job, workflow_name: &str) -> Value {
    let controller_image = job
        .executor_config
        .get("controllerImage")
        .and_then(Value::as_str)
        .unwrap_or("python:3.12-slim");

    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": workflow_name,
            "labels": job_labels(job, "workflow", workflow_name),
        },
        "spec": {
            "template": {
                "metadata": {"labels": {"app": workflow_name}},
                "spec": {
                    "containers": [{
                        "name": "workflow-controller",
                        "image": controller_image,
                        "command": ["python", "/scripts/workflow_executor.py"],
                        "volumeMounts": [{"name": "workflow-config", "mountPath": "/config"}],
                    }],
                    "restartPolicy": "OnFailure",
                    "volumes": [{
                        "name": "workflow-config",
                        "configMap": {"name": format!("{workflow_name}-config")},
                    }],
                }
            }
        }
    })
}

fn job_labels(job: &Job, job_type: &str, name: &str) -> Value {
    json!({
        "app": "grani",
        "job-type": job_type,
        "job-id": job.id.to_string(),
        "job-name": name,
    })
}

/// Normalize env entries: literal `{name, value}` pairs pass through,
/// `{name, valueFrom.secretKeyRef}` references are preserved. Anything
/// else is dropped rather than sent malformed.
fn build_env(env: Option<&Value>) -> Value {
    let Some(entries) = env.and_then(Value::as_array) else {
        return Value::Null;
    };

    let vars: Vec<Value> = entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?;
            if let Some(value) = entry.get("value") {
                Some(json!({"name": name, "value": value}))
            } else if let Some(secret) = entry.pointer("/valueFrom/secretKeyRef") {
                Some(json!({
                    "name": name,
                    "valueFrom": {"secretKeyRef": {
                        "name": secret.get("name"),
                        "key": secret.get("key"),
                    }}
                }))
            } else {
                None
            }
        })
        .collect();

    Value::Array(vars)
}

fn pull_secret_refs(secrets: &[String]) -> Value {
    if secrets.is_empty() {
        return Value::Null;
    }
    Value::Array(secrets.iter().map(|s| json!({"name": s})).collect())
}

/// Drop null-valued keys so optional fields are omitted from the
/// serialized object instead of being sent as explicit nulls.
fn prune(mut value: Value) -> Value {
    if let Value::Object(ref mut map) = value {
        map.retain(|_, v| !v.is_null());
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use grani_types::{ExecutorKind, JobType};
    use serde_json::json;
    use uuid::Uuid;

    fn training_job(name: &str) -> Job {
        Job::new(
            name,
            JobType::Training,
            ExecutorKind::Kubernetes,
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({
                "image": "pytorch/pytorch:2.1.0",
                "command": ["python", "train.py"],
                "env": [
                    {"name": "EPOCHS", "value": "100"},
                    {"name": "API_KEY", "valueFrom": {"secretKeyRef": {"name": "secrets", "key": "api_key"}}},
                    {"name": "broken"},
                ],
                "nodeSelector": {"node-type": "gpu"},
            }),
        )
    }

    #[test]
    fn test_generate_name() {
        let job = training_job("Train ResNet 50!");
        let name = generate_name(&job);

        let short = &job.id.to_string()[..8];
        assert!(name.ends_with(short));
        assert!(name.starts_with("train-resnet-50"));
        assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));

        // Generated names are deterministic per job.
        assert_eq!(name, generate_name(&job));
    }

    #[test]
    fn test_generate_name_truncates() {
        let job = training_job(&"x".repeat(200));
        let name = generate_name(&job);
        // 50-char slug + '-' + 8-char id suffix.
        assert_eq!(name.len(), 50 + 1 + 8);
    }

    #[test]
    fn test_training_job_shape() {
        let job = training_job("train");
        let object = build_training_job(&job, "job-runner", &["regcred".to_string()]);

        assert_eq!(object["kind"], "Job");
        assert_eq!(object["spec"]["backoffLimit"], 3);
        assert_eq!(object["spec"]["ttlSecondsAfterFinished"], 86400);

        let pod = &object["spec"]["template"]["spec"];
        assert_eq!(pod["restartPolicy"], "OnFailure");
        assert_eq!(pod["serviceAccountName"], "job-runner");
        assert_eq!(pod["imagePullSecrets"][0]["name"], "regcred");

        // Malformed env entries are dropped; literal and secret refs kept.
        let env = pod["containers"][0]["env"].as_array().unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env[1]["valueFrom"]["secretKeyRef"]["key"], "api_key");
    }

    #[test]
    fn test_training_job_config_overrides() {
        let mut job = training_job("train");
        job.executor_config["backoffLimit"] = json!(0);
        job.executor_config["restartPolicy"] = json!("Never");

        let object = build_training_job(&job, "default", &[]);
        assert_eq!(object["spec"]["backoffLimit"], 0);
        assert_eq!(object["spec"]["template"]["spec"]["restartPolicy"], "Never");
        // No secrets configured: the field is pruned, not null.
        assert!(object["spec"]["template"]["spec"].get("imagePullSecrets").is_none());
    }

    #[test]
    fn test_inference_deployment_and_service() {
        let job = Job::new(
            "serve",
            JobType::Inference,
            ExecutorKind::Kubernetes,
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({
                "image": "mymodel:latest",
                "replicas": 3,
                "port": 9000,
                "service": {"type": "LoadBalancer", "port": 80, "targetPort": 9000},
            }),
        );

        let deployment = build_inference_deployment(&job, &[]);
        let name = generate_name(&job);
        assert_eq!(deployment["kind"], "Deployment");
        assert_eq!(deployment["spec"]["replicas"], 3);
        assert_eq!(deployment["spec"]["selector"]["matchLabels"]["app"], name.as_str());
        assert_eq!(
            deployment["spec"]["template"]["spec"]["containers"][0]["ports"][0]["containerPort"],
            9000
        );

        let service = build_service(&job, &name).unwrap();
        assert_eq!(service["spec"]["type"], "LoadBalancer");
        assert_eq!(service["spec"]["ports"][0]["targetPort"], 9000);

        // No service block, no Service object.
        let bare = Job::new(
            "serve2",
            JobType::Inference,
            ExecutorKind::Kubernetes,
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({"image": "mymodel:latest"}),
        );
        assert!(build_service(&bare, "serve2-x").is_none());
    }

    #[test]
    fn test_workflow_objects() {
        let job = Job::new(
            "pipeline",
            JobType::Workflow,
            ExecutorKind::Kubernetes,
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({"templates": [{"name": "main", "container": {"image": "python:3.12"}}]}),
        );
        let name = generate_name(&job);

        let configmap = build_workflow_configmap(&job, &name);
        assert_eq!(configmap["kind"], "ConfigMap");
        assert_eq!(configmap["metadata"]["name"], format!("{name}-config"));
        // The full definition travels in the ConfigMap payload.
        let payload: Value =
            serde_json::from_str(configmap["data"]["workflow.json"].as_str().unwrap()).unwrap();
        assert_eq!(payload, job.executor_config);

        let controller = build_workflow_controller(&job, &name);
        assert_eq!(controller["kind"], "Job");
        assert_eq!(
            controller["spec"]["template"]["spec"]["volumes"][0]["configMap"]["name"],
            format!("{name}-config")
        );
    }
}
