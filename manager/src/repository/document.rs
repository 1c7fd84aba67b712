//! Persisted representation of a deploy
//!
//! One document per deploy. `status` and `step` are stored as small integers
//! and environment variables as a list of key/value pairs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::RepositoryError;
use crate::models::deploy::{Build, BuildStep, Deploy, Status, Step, Workload};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvDocument {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStepDocument {
    pub step: i64,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDocument {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub job_name: String,
    #[serde(default)]
    pub image_name: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub steps: Vec<BuildStepDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadDocument {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub job_name: String,
    #[serde(default)]
    pub envs: Vec<EnvDocument>,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub git_repo: String,
    #[serde(default)]
    pub build: BuildDocument,
    #[serde(default)]
    pub workload: WorkloadDocument,
}

/// Envs are sorted by key so the same map always produces the same document
pub fn encode_envs(envs: &HashMap<String, String>) -> Vec<EnvDocument> {
    let mut encoded: Vec<EnvDocument> = envs
        .iter()
        .map(|(key, value)| EnvDocument {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();
    encoded.sort_by(|a, b| a.key.cmp(&b.key));
    encoded
}

pub fn decode_envs(envs: &[EnvDocument]) -> HashMap<String, String> {
    envs.iter()
        .map(|env| (env.key.clone(), env.value.clone()))
        .collect()
}

impl From<&BuildStep> for BuildStepDocument {
    fn from(step: &BuildStep) -> Self {
        Self {
            step: step.step.ordinal() as i64,
            error: step.error.clone(),
        }
    }
}

impl From<&BuildStepDocument> for BuildStep {
    fn from(doc: &BuildStepDocument) -> Self {
        BuildStep {
            step: Step::from_ordinal(doc.step),
            error: doc.error.clone(),
        }
    }
}

impl From<&Deploy> for DeployDocument {
    fn from(deploy: &Deploy) -> Self {
        Self {
            id: deploy.id.clone(),
            name: deploy.name.clone(),
            git_repo: deploy.git_repo.clone(),
            build: BuildDocument {
                job_id: deploy.build.job_id.clone(),
                job_name: deploy.build.job_name.clone(),
                image_name: deploy.build.image_name.clone(),
                status: deploy.build.status.map(|s| s.ordinal() as i64).unwrap_or(0),
                steps: deploy.build.steps.iter().map(BuildStepDocument::from).collect(),
            },
            workload: WorkloadDocument {
                job_id: deploy.workload.job_id.clone(),
                job_name: deploy.workload.job_name.clone(),
                envs: encode_envs(&deploy.workload.envs),
                url: deploy.workload.url.clone(),
            },
        }
    }
}

impl TryFrom<&DeployDocument> for Deploy {
    type Error = RepositoryError;

    fn try_from(doc: &DeployDocument) -> Result<Self, Self::Error> {
        let status = Status::from_ordinal(doc.build.status).map_err(|ordinal| {
            RepositoryError::Corrupt(format!(
                "deploy {} has out-of-range build status {}",
                doc.id, ordinal
            ))
        })?;

        Ok(Deploy {
            id: doc.id.clone(),
            name: doc.name.clone(),
            git_repo: doc.git_repo.clone(),
            build: Build {
                job_id: doc.build.job_id.clone(),
                job_name: doc.build.job_name.clone(),
                image_name: doc.build.image_name.clone(),
                status,
                steps: doc.build.steps.iter().map(BuildStep::from).collect(),
            },
            workload: Workload {
                job_id: doc.workload.job_id.clone(),
                job_name: doc.workload.job_name.clone(),
                envs: decode_envs(&doc.workload.envs),
                url: doc.workload.url.clone(),
            },
        })
    }
}
