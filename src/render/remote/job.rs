//! Render farm job state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Job lifecycle as reported by the render farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Canceled,
    Errored,
}

impl JobStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Canceled | Self::Errored)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Canceled => "canceled",
            Self::Errored => "errored",
        })
    }
}

/// A submitted job and its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderJob {
    #[serde(alias = "_id")]
    pub id: String,
    /// Samples rendered so far.
    #[serde(default)]
    pub spp: u32,
    #[serde(rename = "targetSpp")]
    pub target_spp: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<JobStatus>,
}

impl RenderJob {
    pub fn new(id: impl Into<String>, spp: u32, target_spp: u32) -> Self {
        Self { id: id.into(), spp, target_spp, status: None }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Reported status, or one derived from the sample count.
    pub fn status(&self) -> JobStatus {
        match self.status {
            Some(status) => status,
            None if self.spp >= self.target_spp => JobStatus::Done,
            None if self.spp > 0 => JobStatus::Running,
            None => JobStatus::Pending,
        }
    }

    /// Target sample count reached.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.spp >= self.target_spp
    }

    /// Take over a freshly polled state.
    ///
    /// Terminal jobs never change; the sample count never decreases.
    pub fn advance(&mut self, polled: RenderJob) {
        if self.status().is_terminal() {
            return;
        }
        self.spp = self.spp.max(polled.spp);
        self.status = polled.status;
    }
}
