//! Deploy aggregate models

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Terminal-or-not status of the build phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Error,
    Loading,
    Completed,
}

impl Status {
    /// Storage ordinal. `0` is reserved for "not set yet".
    pub fn ordinal(self) -> u8 {
        match self {
            Status::Error => 1,
            Status::Loading => 2,
            Status::Completed => 3,
        }
    }

    /// Decode a storage ordinal. `Ok(None)` means no status has been set;
    /// an out-of-range value is returned as the error.
    pub fn from_ordinal(ordinal: i64) -> Result<Option<Status>, i64> {
        match ordinal {
            0 => Ok(None),
            1 => Ok(Some(Status::Error)),
            2 => Ok(Some(Status::Loading)),
            3 => Ok(Some(Status::Completed)),
            other => Err(other),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Error | Status::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Error => "error",
            Status::Loading => "loading",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build stage reported by the image builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Init,
    Clone,
    Build,
    Push,
    Unknown,
}

impl Step {
    pub fn ordinal(self) -> u8 {
        match self {
            Step::Init => 0,
            Step::Clone => 1,
            Step::Build => 2,
            Step::Push => 3,
            Step::Unknown => 4,
        }
    }

    /// Anything outside the known range decodes to `Unknown`
    pub fn from_ordinal(ordinal: i64) -> Step {
        match ordinal {
            0 => Step::Init,
            1 => Step::Clone,
            2 => Step::Build,
            3 => Step::Push,
            _ => Step::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::Clone => "clone",
            Step::Build => "build",
            Step::Push => "push",
            Step::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed build-progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub step: Step,

    /// Empty when the step succeeded
    #[serde(default)]
    pub error: String,
}

impl BuildStep {
    pub fn ok(step: Step) -> Self {
        Self {
            step,
            error: String::new(),
        }
    }

    pub fn failed(step: Step, error: impl Into<String>) -> Self {
        Self {
            step,
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Build phase state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub job_id: String,
    pub job_name: String,
    pub image_name: String,

    /// `None` until the orchestrator marks the build as loading
    pub status: Option<Status>,

    pub steps: Vec<BuildStep>,
}

/// Run phase state, populated once the build completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub job_id: String,
    pub job_name: String,
    pub envs: HashMap<String, String>,
    pub url: String,
}

/// Deploy aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deploy {
    /// Assigned by the repository on creation
    pub id: String,
    pub name: String,
    pub git_repo: String,
    pub build: Build,
    pub workload: Workload,
}

impl Deploy {
    /// A fresh deploy as stored before anything is scheduled
    pub fn new(
        name: impl Into<String>,
        git_repo: impl Into<String>,
        envs: HashMap<String, String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            git_repo: git_repo.into(),
            build: Build::default(),
            workload: Workload {
                envs,
                ..Default::default()
            },
        }
    }
}
