// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for cupsflow.

use thiserror::Error;

/// Top-level error type for all cupsflow operations.
#[derive(Debug, Error)]
pub enum CupsflowError {
    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Connection layer --
    #[error("connection to {server} failed: {detail}")]
    Connect { server: String, detail: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("HTTP framing error: {0}")]
    Http(String),

    // -- Structured documents --
    #[error("IPP encoding failed: {0}")]
    IppEncode(String),

    #[error("IPP decoding failed: {0}")]
    IppDecode(String),

    #[error("PPD parse error at line {line}: {detail}")]
    Ppd { line: usize, detail: String },

    // -- Backend --
    #[error("printer not found: {0}")]
    PrinterNotFound(String),

    #[error("request failed: {0}")]
    Request(String),

    // -- Storage / serialization --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CupsflowError>;
