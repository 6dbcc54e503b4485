// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Caller-side handle for a submitted print job.
//
// The backend's status poller only holds a weak reference.  When the last
// `PrintJob` clone is dropped the shared state notifies the poller, which
// stops at its next wakeup instead of polling a job nobody is watching.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{Notify, watch};

use cupsflow_core::types::{JobSettings, JobStatus};

struct JobShared {
    printer: String,
    settings: JobSettings,
    /// Server-assigned id; 0 until the job is accepted.
    job_id: AtomicI32,
    status: watch::Sender<JobStatus>,
    released: Arc<Notify>,
}

impl Drop for JobShared {
    fn drop(&mut self) {
        self.released.notify_one();
    }
}

/// A print job submitted through [`CupsBackend::print_stream`].
///
/// [`CupsBackend::print_stream`]: crate::backend::CupsBackend::print_stream
#[derive(Clone)]
pub struct PrintJob {
    shared: Arc<JobShared>,
}

impl PrintJob {
    pub fn new(printer: impl Into<String>, settings: JobSettings) -> Self {
        let (status, _) = watch::channel(JobStatus::Initial);
        Self {
            shared: Arc::new(JobShared {
                printer: printer.into(),
                settings,
                job_id: AtomicI32::new(0),
                status,
                released: Arc::new(Notify::new()),
            }),
        }
    }

    pub fn printer(&self) -> &str {
        &self.shared.printer
    }

    pub fn title(&self) -> &str {
        &self.shared.settings.title
    }

    pub fn settings(&self) -> &JobSettings {
        &self.shared.settings
    }

    pub fn job_id(&self) -> Option<i32> {
        match self.shared.job_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn status(&self) -> JobStatus {
        *self.shared.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.shared.status.subscribe()
    }

    pub(crate) fn set_job_id(&self, id: i32) {
        self.shared.job_id.store(id, Ordering::Release);
    }

    /// Returns true if the status actually changed.
    pub(crate) fn set_status(&self, status: JobStatus) -> bool {
        self.shared.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }

    pub(crate) fn downgrade(&self) -> JobRef {
        JobRef {
            job: Arc::downgrade(&self.shared),
            released: self.shared.released.clone(),
        }
    }
}

/// Non-owning reference held by the status poller.
pub(crate) struct JobRef {
    job: Weak<JobShared>,
    released: Arc<Notify>,
}

impl JobRef {
    pub(crate) fn upgrade(&self) -> Option<PrintJob> {
        self.job.upgrade().map(|shared| PrintJob { shared })
    }

    /// Resolves once every `PrintJob` clone has been dropped.
    pub(crate) async fn released(&self) {
        if self.job.strong_count() == 0 {
            return;
        }
        self.released.notified().await;
    }
}
