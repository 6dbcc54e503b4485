// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cupsflow print — the non-blocking CUPS client.  `request` holds the
// resumable per-request state machine, `watch` binds it to the tokio
// reactor, and `backend` coordinates printer enumeration, PPD retrieval, job
// submission and job tracking on top of both.  `settings` turns a printer's
// PPD into dialog options and job settings into server-side job options.

pub mod backend;
pub mod job;
pub mod ppd;
pub mod request;
pub mod result;
pub mod settings;
pub mod transport;
pub mod watch;

pub use backend::{BackendEvent, CupsBackend, PollingGuard};
pub use job::PrintJob;
pub use ppd::PpdFile;
pub use request::{CupsRequest, Phase, RequestKind};
pub use result::{CupsError, CupsResult, ErrorKind};
pub use settings::{Capabilities, OptionSet, Paper, PreparedJob, prepare_for_print};
pub use transport::{Connector, NetConnector, PollState, Transport};
pub use watch::DispatchWatch;
