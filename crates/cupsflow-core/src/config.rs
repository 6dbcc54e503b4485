// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend configuration.
//
// Defaults follow libcups: server `localhost`, IPP port 631, encryption only
// when the server asks for it.  The environment variables honoured by
// `BackendConfig::from_env` are the ones libcups clients already respect.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CupsflowError, Result};

/// IANA-assigned IPP port.
pub const DEFAULT_IPP_PORT: u16 = 631;

/// Transport encryption policy for connections to the print server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encryption {
    /// Plain TCP, never negotiate TLS.
    Never,
    /// Plain TCP; TLS only if the server demands an upgrade.
    #[default]
    IfRequested,
    /// TLS is mandatory.
    Required,
    /// TLS from the first byte (ipps).
    Always,
}

impl Encryption {
    /// Whether a TLS session must be established before the first request.
    pub fn uses_tls(&self) -> bool {
        matches!(self, Self::Required | Self::Always)
    }
}

impl FromStr for Encryption {
    type Err = CupsflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "never" => Ok(Self::Never),
            "ifrequested" => Ok(Self::IfRequested),
            "required" => Ok(Self::Required),
            "always" => Ok(Self::Always),
            other => Err(CupsflowError::Config(format!(
                "unknown encryption mode '{other}'"
            ))),
        }
    }
}

/// Settings for the CUPS backend and every request it issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Print server host name, or an absolute Unix-domain socket path.
    pub server: String,
    /// Print server port (ignored for Unix-domain sockets).
    pub port: u16,
    /// Transport encryption policy.
    pub encryption: Encryption,
    /// `requesting-user-name`; `None` falls back to `$USER` at request time.
    pub user: Option<String>,
    /// `attributes-natural-language` sent with every request.
    pub language: String,
    /// Upper bound on a single connection attempt.
    pub connect_timeout_ms: u64,
    /// Delay between connection attempts while no socket exists.
    pub connect_retry_ms: u64,
    /// Interval between job-status polls.
    pub job_poll_interval_ms: u64,
    /// Maximum number of job-status polls per job.
    pub max_job_polls: u32,
    /// PEM bundle of trusted roots for TLS connections.
    pub tls_ca_file: Option<PathBuf>,
    /// Verify the server certificate (CUPS commonly uses self-signed ones).
    pub tls_verify: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            server: "localhost".into(),
            port: DEFAULT_IPP_PORT,
            encryption: Encryption::IfRequested,
            user: None,
            language: "en".into(),
            connect_timeout_ms: 1_000,
            connect_retry_ms: 100,
            job_poll_interval_ms: 500,
            max_job_polls: 120,
            tls_ca_file: None,
            tls_verify: false,
        }
    }
}

impl BackendConfig {
    /// Defaults overridden by `CUPS_SERVER`, `IPP_PORT`, `CUPS_ENCRYPTION`
    /// and `CUPS_USER`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(server) = lookup("CUPS_SERVER").filter(|s| !s.is_empty()) {
            // "host:port" overrides the port as well.
            match server.rsplit_once(':') {
                Some((host, port)) if !server.starts_with('/') => {
                    config.port = port.parse().map_err(|_| {
                        CupsflowError::Config(format!("invalid port in CUPS_SERVER '{server}'"))
                    })?;
                    config.server = host.to_string();
                }
                _ => config.server = server,
            }
        }

        if let Some(port) = lookup("IPP_PORT") {
            config.port = port
                .parse()
                .map_err(|_| CupsflowError::Config(format!("invalid IPP_PORT '{port}'")))?;
        }

        if let Some(mode) = lookup("CUPS_ENCRYPTION") {
            config.encryption = mode.parse()?;
        }

        config.user = lookup("CUPS_USER").filter(|u| !u.is_empty());
        Ok(config)
    }

    /// Load a JSON configuration file.  Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        if self.server.is_empty() {
            return Err(CupsflowError::Config("server must not be empty".into()));
        }
        if self.port == 0 && !self.is_local_socket() {
            return Err(CupsflowError::Config("port must not be 0".into()));
        }
        if self.job_poll_interval_ms == 0 {
            return Err(CupsflowError::Config(
                "job_poll_interval_ms must be positive".into(),
            ));
        }
        if self.encryption.uses_tls() && self.tls_verify && self.tls_ca_file.is_none() {
            return Err(CupsflowError::Config(
                "tls_verify requires tls_ca_file".into(),
            ));
        }
        Ok(())
    }

    /// Whether `server` names a Unix-domain socket.
    pub fn is_local_socket(&self) -> bool {
        self.server.starts_with('/')
    }

    /// The user name sent as `requesting-user-name`.
    pub fn requesting_user(&self) -> Option<String> {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|u| !u.is_empty())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }
}
