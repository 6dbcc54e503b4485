// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP status codes (RFC 8011 §4.1.8, CUPS Implementation of IPP §3).
//
// Status codes stay raw `u16`s here: CUPS answers with codes the ipp crate's
// `StatusCode` enum does not model, and the raw value is what ends up in
// error reports.

/// First status code that signals a client error.  Anything at or above this
/// value is a failed request.
pub const STATUS_ERROR_THRESHOLD: u16 = 0x0400;

/// Successful completion.
pub const STATUS_OK: u16 = 0x0000;

/// `client-error-not-found`; CUPS-Get-Default uses it for "no default".
pub const STATUS_NOT_FOUND: u16 = 0x0406;

/// Keyword for a status code, for error messages.
pub fn status_name(code: u16) -> &'static str {
    match code {
        0x0000 => "successful-ok",
        0x0001 => "successful-ok-ignored-or-substituted-attributes",
        0x0002 => "successful-ok-conflicting-attributes",
        0x0400 => "client-error-bad-request",
        0x0401 => "client-error-forbidden",
        0x0402 => "client-error-not-authenticated",
        0x0403 => "client-error-not-authorized",
        0x0404 => "client-error-not-possible",
        0x0405 => "client-error-timeout",
        0x0406 => "client-error-not-found",
        0x0407 => "client-error-gone",
        0x0408 => "client-error-request-entity-too-large",
        0x040A => "client-error-document-format-not-supported",
        0x040B => "client-error-attributes-or-values-not-supported",
        0x0500 => "server-error-internal-error",
        0x0501 => "server-error-operation-not-supported",
        0x0502 => "server-error-service-unavailable",
        0x0503 => "server-error-version-not-supported",
        0x0504 => "server-error-device-error",
        0x0506 => "server-error-not-accepting-jobs",
        0x0507 => "server-error-busy",
        0x0508 => "server-error-job-canceled",
        c if c < 0x0100 => "successful-ok",
        c if c < STATUS_ERROR_THRESHOLD => "redirection",
        c if c < 0x0500 => "client-error",
        _ => "server-error",
    }
}

/// Whether an IPP status code reports failure.
pub fn is_error_status(code: u16) -> bool {
    code >= STATUS_ERROR_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_threshold() {
        assert!(!is_error_status(STATUS_OK));
        assert!(!is_error_status(0x0001));
        assert!(is_error_status(STATUS_NOT_FOUND));
        assert!(is_error_status(0x0500));
        assert_eq!(status_name(STATUS_NOT_FOUND), "client-error-not-found");
        assert_eq!(status_name(0x04FF), "client-error");
        assert_eq!(status_name(0x0302), "redirection");
    }
}
