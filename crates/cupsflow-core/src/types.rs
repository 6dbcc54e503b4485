// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: the printer roster entries and job states reported by a
// CUPS server.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// IPP `printer-state` (RFC 8011 §5.4.11).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterState {
    #[default]
    Idle,
    Processing,
    Stopped,
}

impl PrinterState {
    /// Map the IPP enum value; unknown values are treated as idle.
    pub fn from_ipp(value: i32) -> Self {
        match value {
            4 => Self::Processing,
            5 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// IPP `job-state` (RFC 8011 §5.3.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Held,
    Processing,
    Stopped,
    Canceled,
    Aborted,
    Completed,
}

impl JobState {
    pub fn from_ipp(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Pending),
            4 => Some(Self::Held),
            5 => Some(Self::Processing),
            6 => Some(Self::Stopped),
            7 => Some(Self::Canceled),
            8 => Some(Self::Aborted),
            9 => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn to_ipp(self) -> i32 {
        match self {
            Self::Pending => 3,
            Self::Held => 4,
            Self::Processing => 5,
            Self::Stopped => 6,
            Self::Canceled => 7,
            Self::Aborted => 8,
            Self::Completed => 9,
        }
    }

    /// The server will not report any further change for this job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Aborted | Self::Completed)
    }
}

/// Client-side view of a job's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Created locally, not yet accepted by the server.
    Initial,
    /// Document is being streamed to the server.
    Sending,
    /// Accepted; the server reported the contained state.
    Server(JobState),
    /// Submission failed before the server assigned a job id.
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        match self {
            Self::Server(state) => state.is_terminal(),
            Self::Failed => true,
            Self::Initial | Self::Sending => false,
        }
    }
}

/// A queue or class known to the print server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Printer {
    /// Queue name (`printer-name`), matched case-insensitively.
    pub name: String,
    /// `printer-uri-supported`.
    pub printer_uri: Option<String>,
    /// `device-uri`.
    pub device_uri: Option<String>,
    /// `printer-info`.
    pub description: Option<String>,
    /// `printer-location`.
    pub location: Option<String>,
    pub state: PrinterState,
    /// `printer-state-message`.
    pub state_message: Option<String>,
    /// `queued-job-count`.
    pub job_count: i32,
    /// `printer-is-accepting-jobs`.
    pub accepting_jobs: bool,
    /// `member-names` of a printer class (empty for plain queues).
    pub members: Vec<String>,
    /// False once the server stops listing this queue.
    pub is_active: bool,
    pub is_default: bool,
    /// True until the first enumeration after the one that added it.
    pub is_new: bool,
    /// The PPD for this printer has been fetched (successfully or not).
    pub has_details: bool,
    pub last_seen: DateTime<Utc>,
}

impl Printer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            printer_uri: None,
            device_uri: None,
            description: None,
            location: None,
            state: PrinterState::Idle,
            state_message: None,
            job_count: 0,
            accepting_jobs: true,
            members: Vec::new(),
            is_active: true,
            is_default: false,
            is_new: true,
            has_details: false,
            last_seen: Utc::now(),
        }
    }

    pub fn is_class(&self) -> bool {
        !self.members.is_empty()
    }

    /// Whether two roster snapshots differ in anything a caller displays.
    pub fn status_differs(&self, other: &Printer) -> bool {
        self.state != other.state
            || self.state_message != other.state_message
            || self.job_count != other.job_count
            || self.accepting_jobs != other.accepting_jobs
            || self.location != other.location
            || self.description != other.description
    }
}

/// Per-job submission settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSettings {
    /// `job-name`.
    pub title: String,
    /// `document-format`; `None` lets the server auto-detect.
    pub document_format: Option<String>,
    /// Print settings.  Keys prefixed with `cups-` become IPP job options.
    pub options: BTreeMap<String, String>,
    /// Poll the server for job state after submission.
    pub track_status: bool,
}

impl JobSettings {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// The options destined for the server, with the `cups-` prefix removed.
    pub fn cups_options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options
            .iter()
            .filter_map(|(k, v)| k.strip_prefix("cups-").map(|name| (name, v.as_str())))
    }
}
