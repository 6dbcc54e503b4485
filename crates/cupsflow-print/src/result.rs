// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Outcome of a single request: either the parsed IPP response (possibly
// absent, for GETs) or a classified error.

use std::fmt;

use thiserror::Error;

use cupsflow_ipp::IppMessage;

/// HTTP status recorded when the failure happened below HTTP (socket errors,
/// truncated responses).
pub const HTTP_STATUS_ERROR: i32 = -1;

/// Layer at which a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Not tied to a protocol layer (attempt budget, local I/O).
    General,
    /// Transport or HTTP status failure.
    Http,
    /// The server answered with an IPP error status.
    Ipp,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::General => "general",
            Self::Http => "HTTP",
            Self::Ipp => "IPP",
        })
    }
}

/// A classified request failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error (status {status}, code {code}): {message}")]
pub struct CupsError {
    pub kind: ErrorKind,
    pub status: i32,
    pub code: i32,
    pub message: String,
}

/// Everything a completed request hands to its callback.
#[derive(Debug, Clone, Default)]
pub struct CupsResult {
    error: Option<CupsError>,
    response: Option<IppMessage>,
}

impl CupsResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&CupsError> {
        self.error.as_ref()
    }

    /// Parsed IPP response; `None` on error and for GET requests.
    pub fn response(&self) -> Option<&IppMessage> {
        self.response.as_ref()
    }

    /// Split into the standard `Result` shape.
    pub fn into_result(self) -> Result<Option<IppMessage>, CupsError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.response),
        }
    }

    /// Record a failure.  Any response stored earlier is discarded so the
    /// error flag and the response are never both meaningful.
    pub(crate) fn set_error(
        &mut self,
        kind: ErrorKind,
        status: i32,
        code: i32,
        message: impl Into<String>,
    ) {
        self.response = None;
        self.error = Some(CupsError {
            kind,
            status,
            code,
            message: message.into(),
        });
    }

    pub(crate) fn set_response(&mut self, response: IppMessage) {
        self.error = None;
        self.response = Some(response);
    }
}
