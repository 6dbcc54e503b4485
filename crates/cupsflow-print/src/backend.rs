// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS backend coordinator.
//
// Turns domain operations (enumerate printers, resolve the default printer,
// fetch a PPD, submit a job, follow a job's state) into requests, runs each
// request as its own tokio task, and folds the results into a cached roster.
// Changes are announced on a broadcast channel.  A failed request leaves the
// cached state as it was.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use cupsflow_core::config::BackendConfig;
use cupsflow_core::error::{CupsflowError, Result};
use cupsflow_core::types::{JobSettings, JobState, JobStatus, Printer, PrinterState};
use cupsflow_ipp::http::path_segment;
use cupsflow_ipp::status::{STATUS_NOT_FOUND, STATUS_OK};
use cupsflow_ipp::{AttributeGroupExt, DelimiterTag, IppAttributeGroup, IppValue, Operation};

use crate::job::PrintJob;
use crate::ppd::PpdFile;
use crate::request::CupsRequest;
use crate::result::{CupsError, CupsResult, ErrorKind, HTTP_STATUS_ERROR};
use crate::settings::{self, Capabilities, OptionSet};
use crate::transport::{Connector, NetConnector};
use crate::watch::DispatchWatch;

/// Attributes asked for when enumerating printers.
const PRINTER_ATTRIBUTES: &[&str] = &[
    "printer-name",
    "printer-uri-supported",
    "device-uri",
    "printer-info",
    "printer-location",
    "printer-state",
    "printer-state-message",
    "queued-job-count",
    "printer-is-accepting-jobs",
    "member-names",
];

const EVENT_CAPACITY: usize = 64;

/// Change notifications emitted by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    PrinterAdded(Printer),
    /// The server stopped listing this printer; it is kept, marked inactive.
    PrinterRemoved(Printer),
    PrinterStatusChanged(Printer),
    /// An enumeration finished and the roster is up to date.
    PrinterListDone,
    DefaultPrinterChanged(Option<String>),
    DetailsAcquired { printer: String, success: bool },
    JobStatusChanged { job_id: i32, status: JobStatus },
}

#[derive(Default)]
struct BackendState {
    /// Keyed by lower-cased printer name.
    printers: HashMap<String, Printer>,
    default_printer: Option<String>,
    got_default_printer: bool,
    list_printers_pending: bool,
    /// Bumped for every enumeration; tells a stale guard from the live one.
    enumeration: u64,
    ppd_cache: HashMap<String, Arc<PpdFile>>,
}

struct Inner {
    config: BackendConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<BackendState>,
    events: broadcast::Sender<BackendEvent>,
}

/// Cheaply clonable handle to one print server.
#[derive(Clone)]
pub struct CupsBackend {
    inner: Arc<Inner>,
}

/// Keeps periodic printer enumeration running; dropping it stops the polls.
pub struct PollingGuard {
    task: JoinHandle<()>,
}

impl Drop for PollingGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Travels with an enumeration's callback.  If the request is dropped
/// before it completes (its task aborted, say) the pending flag is cleared
/// so the next enumeration is not refused forever.
struct PendingEnumeration {
    backend: CupsBackend,
    token: u64,
}

impl Drop for PendingEnumeration {
    fn drop(&mut self) {
        let mut state = self.backend.state();
        if state.list_printers_pending && state.enumeration == self.token {
            debug!(token = self.token, "printer enumeration abandoned");
            state.list_printers_pending = false;
        }
    }
}

impl CupsBackend {
    /// Backend using the default network connector.
    pub fn new(config: BackendConfig) -> Result<Self> {
        config.validate()?;
        let connector = NetConnector::new(&config)?;
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    pub fn with_connector(config: BackendConfig, connector: Arc<dyn Connector>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                state: Mutex::new(BackendState::default()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of every known printer, sorted by name.
    pub fn printers(&self) -> Vec<Printer> {
        let mut printers: Vec<Printer> = self
            .state()
            .printers
            .values()
            .cloned()
            .collect();
        printers.sort_by(|a, b| a.name.cmp(&b.name));
        printers
    }

    /// Look up a printer by name, ignoring ASCII case.
    pub fn printer(&self, name: &str) -> Option<Printer> {
        self.state().printers.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn default_printer(&self) -> Option<String> {
        self.state().default_printer.clone()
    }

    /// Cached PPD for a printer, once [`request_details`] has fetched it.
    ///
    /// [`request_details`]: Self::request_details
    pub fn ppd(&self, printer: &str) -> Option<Arc<PpdFile>> {
        self.state().ppd_cache.get(&printer.to_ascii_lowercase()).cloned()
    }

    /// Work CUPS does server-side for every printer.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::CUPS
    }

    /// Dialog options for a printer: the CUPS job options plus those of its
    /// cached PPD, preset from `job_settings`.
    pub fn printer_options(&self, printer: &str, job_settings: Option<&JobSettings>) -> OptionSet {
        let ppd = self.ppd(printer);
        settings::printer_options(ppd.as_deref(), job_settings)
    }

    /// Flag options that violate the printer's PPD constraints.  `false`
    /// when there is no conflict or no PPD.
    pub fn mark_conflicts(&self, printer: &str, options: &mut OptionSet) -> bool {
        self.ppd(printer)
            .is_some_and(|ppd| options.mark_conflicts(&ppd))
    }

    /// Fold chosen options back into job settings.  Nothing happens until
    /// the printer's PPD has been fetched.
    pub fn settings_from_options(
        &self,
        printer: &str,
        options: &OptionSet,
        job_settings: &mut JobSettings,
    ) {
        if self.ppd(printer).is_some() {
            settings::settings_from_options(options, job_settings);
        } else {
            debug!(printer, "no PPD; settings left unchanged");
        }
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: BackendEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// A POST request with the target URI attribute and the requesting user
    /// already filled in.
    fn new_post(
        &self,
        resource: &str,
        operation: Operation,
        target: Option<(&str, String)>,
    ) -> CupsRequest {
        let mut request = CupsRequest::post(
            &self.inner.config,
            self.inner.connector.clone(),
            resource,
            operation,
        );
        if let Some(message) = request.message_mut() {
            if let Some((name, uri)) = target {
                message.add_value(DelimiterTag::OperationAttributes, name, IppValue::Uri(uri));
            }
            if let Some(user) = self.inner.config.requesting_user() {
                message.add_name(DelimiterTag::OperationAttributes, "requesting-user-name", &user);
            }
        }
        request
    }

    /// Map a request failure onto the crate error.  Failures below HTTP mean
    /// the server could not be reached.
    fn request_error(&self, e: CupsError) -> CupsflowError {
        let unreachable = e.kind == ErrorKind::General
            || (e.kind == ErrorKind::Http && e.status == HTTP_STATUS_ERROR);
        if unreachable {
            CupsflowError::Connect {
                server: self.inner.config.server.clone(),
                detail: e.message,
            }
        } else {
            CupsflowError::Request(e.to_string())
        }
    }

    /// Run `request` on its own task and hand the result to `callback`.
    /// Aborting the returned handle cancels the request without calling
    /// back.
    pub fn request_execute<F>(&self, request: CupsRequest, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(&CupsBackend, CupsResult) + Send + 'static,
    {
        let backend = self.clone();
        let watch = DispatchWatch::new(request, self.inner.config.connect_retry(), move |result| {
            callback(&backend, result)
        });
        tokio::spawn(async move {
            watch.await;
        })
    }

    /// Run `request` to completion in the current task.
    async fn execute(&self, request: CupsRequest) -> CupsResult {
        let (tx, rx) = tokio::sync::oneshot::channel();
        DispatchWatch::new(request, self.inner.config.connect_retry(), move |result| {
            let _ = tx.send(result);
        })
        .await;
        rx.await.unwrap_or_default()
    }

    // -- printer roster -----------------------------------------------------

    /// Start a CUPS-Get-Printers enumeration.  Returns `None` if one is
    /// already in flight.
    #[instrument(skip(self), fields(server = %self.inner.config.server))]
    pub fn request_printer_list(&self) -> Option<JoinHandle<()>> {
        let token = {
            let mut state = self.state();
            if state.list_printers_pending {
                debug!("printer enumeration already pending");
                return None;
            }
            state.list_printers_pending = true;
            state.enumeration += 1;
            state.enumeration
        };
        let pending = PendingEnumeration {
            backend: self.clone(),
            token,
        };

        let mut request = self.new_post("/", Operation::CupsGetPrinters, None);
        if let Some(message) = request.message_mut() {
            message.add_keywords(
                DelimiterTag::OperationAttributes,
                "requested-attributes",
                PRINTER_ATTRIBUTES,
            );
        }
        Some(self.request_execute(request, move |backend, result| {
            backend.printer_list_done(result);
            drop(pending);
        }))
    }

    fn printer_list_done(&self, result: CupsResult) {
        let response = match result.into_result() {
            Ok(Some(response)) => response,
            Ok(None) => {
                warn!("printer enumeration returned no response");
                self.state().list_printers_pending = false;
                return;
            }
            Err(e) => {
                warn!(error = %e, "printer enumeration failed");
                self.state().list_printers_pending = false;
                return;
            }
        };

        let mut events = Vec::new();
        let need_default = {
            let mut state = self.state();
            let default_key = state.default_printer.as_deref().map(str::to_ascii_lowercase);
            let mut seen = HashSet::new();

            for group in response.groups_of(DelimiterTag::PrinterAttributes) {
                let Some(mut listed) = printer_from_attributes(group) else {
                    continue;
                };
                let key = listed.name.to_ascii_lowercase();
                seen.insert(key.clone());

                match state.printers.get_mut(&key) {
                    Some(existing) => {
                        let reappeared = !existing.is_active;
                        let changed = existing.status_differs(&listed);
                        listed.is_default = existing.is_default;
                        listed.has_details = existing.has_details;
                        listed.is_new = false;
                        *existing = listed;
                        if reappeared {
                            events.push(BackendEvent::PrinterAdded(existing.clone()));
                        } else if changed {
                            events.push(BackendEvent::PrinterStatusChanged(existing.clone()));
                        }
                    }
                    None => {
                        listed.is_default = default_key.as_deref() == Some(key.as_str());
                        debug!(printer = %listed.name, "printer added");
                        events.push(BackendEvent::PrinterAdded(listed.clone()));
                        state.printers.insert(key, listed);
                    }
                }
            }

            for (key, printer) in state.printers.iter_mut() {
                if printer.is_active && !seen.contains(key) {
                    printer.is_active = false;
                    debug!(printer = %printer.name, "printer removed");
                    events.push(BackendEvent::PrinterRemoved(printer.clone()));
                }
            }

            state.list_printers_pending = false;
            !state.got_default_printer
        };

        info!(changes = events.len(), "printer list updated");
        for event in events {
            self.emit(event);
        }
        self.emit(BackendEvent::PrinterListDone);

        if need_default {
            self.request_default_printer();
        }
    }

    /// Enumerate printers every `interval` while the guard lives.
    pub fn start_printer_list_polling(&self, interval: Duration) -> PollingGuard {
        let backend = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                backend.request_printer_list();
            }
        });
        PollingGuard { task }
    }

    /// Resolve the server's default destination with CUPS-Get-Default.
    #[instrument(skip(self), fields(server = %self.inner.config.server))]
    pub fn request_default_printer(&self) -> JoinHandle<()> {
        let mut request = self.new_post("/", Operation::CupsGetDefault, None);
        if let Some(message) = request.message_mut() {
            message.add_keywords(
                DelimiterTag::OperationAttributes,
                "requested-attributes",
                &["printer-name"],
            );
        }
        self.request_execute(request, |backend, result| {
            backend.default_printer_done(result)
        })
    }

    fn default_printer_done(&self, result: CupsResult) {
        let name = match result.into_result() {
            Ok(response) => response.as_ref().and_then(|r| {
                r.group(DelimiterTag::PrinterAttributes)
                    .and_then(|g| g.get_string("printer-name"))
                    .map(str::to_string)
            }),
            Err(e) if e.kind == ErrorKind::Ipp && e.code == i32::from(STATUS_NOT_FOUND) => None,
            Err(e) => {
                warn!(error = %e, "default printer request failed");
                return;
            }
        };

        let changed = {
            let mut state = self.state();
            state.got_default_printer = true;
            let key = name.as_deref().map(str::to_ascii_lowercase);
            for (k, printer) in state.printers.iter_mut() {
                printer.is_default = key.as_deref() == Some(k.as_str());
            }
            let changed = state.default_printer != name;
            state.default_printer = name.clone();
            changed
        };

        if changed {
            info!(default = ?name, "default printer changed");
            self.emit(BackendEvent::DefaultPrinterChanged(name));
        }
    }

    /// Refresh one known printer with Get-Printer-Attributes.  A status
    /// change is announced like one found by enumeration.
    #[instrument(skip(self))]
    pub fn request_printer_attributes(&self, printer: &str) -> Result<JoinHandle<()>> {
        let Some(known) = self.printer(printer) else {
            return Err(CupsflowError::PrinterNotFound(printer.to_string()));
        };
        let segment = path_segment(&known.name);
        let mut request = self.new_post(
            &format!("/printers/{segment}"),
            Operation::GetPrinterAttributes,
            Some(("printer-uri", format!("ipp://localhost/printers/{segment}"))),
        );
        if let Some(message) = request.message_mut() {
            message.add_keywords(
                DelimiterTag::OperationAttributes,
                "requested-attributes",
                PRINTER_ATTRIBUTES,
            );
        }
        Ok(self.request_execute(request, |backend, result| {
            backend.printer_attributes_done(result)
        }))
    }

    fn printer_attributes_done(&self, result: CupsResult) {
        let response = match result.into_result() {
            Ok(Some(response)) => response,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "printer attribute refresh failed");
                return;
            }
        };
        let Some(mut fresh) = response
            .group(DelimiterTag::PrinterAttributes)
            .and_then(printer_from_attributes)
        else {
            warn!("printer attribute refresh carried no printer-name");
            return;
        };

        let event = {
            let mut state = self.state();
            match state.printers.get_mut(&fresh.name.to_ascii_lowercase()) {
                Some(existing) => {
                    let changed = existing.status_differs(&fresh);
                    fresh.is_default = existing.is_default;
                    fresh.has_details = existing.has_details;
                    fresh.is_new = existing.is_new;
                    fresh.is_active = existing.is_active;
                    *existing = fresh;
                    changed.then(|| BackendEvent::PrinterStatusChanged(existing.clone()))
                }
                None => None,
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }

    // -- printer details (PPD) ----------------------------------------------

    /// Download and parse a printer's PPD.  The outcome is cached and
    /// announced with [`BackendEvent::DetailsAcquired`].
    #[instrument(skip(self))]
    pub fn request_ppd(&self, printer: &str) -> Result<JoinHandle<()>> {
        let file = tempfile::tempfile()?;
        let sink = file.try_clone()?;
        let resource = format!("/printers/{}.ppd", path_segment(printer));
        let request = CupsRequest::get(&self.inner.config, self.inner.connector.clone(), &resource)
            .with_data_sink(Box::new(sink));

        let printer = printer.to_string();
        Ok(self.request_execute(request, move |backend, result| {
            backend.ppd_done(&printer, file, result)
        }))
    }

    /// Fetch capability details for a printer (its PPD).
    pub fn request_details(&self, printer: &str) -> Result<JoinHandle<()>> {
        self.request_ppd(printer)
    }

    fn ppd_done(&self, printer: &str, mut file: std::fs::File, result: CupsResult) {
        let parsed = match result.into_result() {
            Err(e) => {
                warn!(printer, error = %e, "PPD download failed");
                None
            }
            Ok(_) => match rewind_and_parse(&mut file) {
                Ok(ppd) => Some(ppd),
                Err(e) => {
                    warn!(printer, error = %e, "PPD could not be parsed");
                    None
                }
            },
        };

        let success = parsed.is_some();
        {
            let mut state = self.state();
            let key = printer.to_ascii_lowercase();
            if let Some(ppd) = parsed {
                state.ppd_cache.insert(key.clone(), Arc::new(ppd));
            }
            if let Some(entry) = state.printers.get_mut(&key) {
                entry.has_details = true;
            }
        }
        debug!(printer, success, "printer details acquired");
        self.emit(BackendEvent::DetailsAcquired {
            printer: printer.to_string(),
            success,
        });
    }

    // -- jobs ---------------------------------------------------------------

    /// Submit `document` as a Print-Job to the job's printer.
    ///
    /// `callback` receives the server's job id.  If the job asks for status
    /// tracking, polling starts once the job is accepted.
    #[instrument(skip(self, job, document, callback), fields(printer = %job.printer()))]
    pub fn print_stream<F>(
        &self,
        job: &PrintJob,
        document: impl Read + Send + 'static,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(&CupsBackend, std::result::Result<i32, CupsError>) + Send + 'static,
    {
        let segment = path_segment(job.printer());
        let mut request = self
            .new_post(
                &format!("/printers/{segment}"),
                Operation::PrintJob,
                Some(("printer-uri", format!("ipp://localhost/printers/{segment}"))),
            )
            .with_data_source(Box::new(document));

        let settings = job.settings();
        if let Some(message) = request.message_mut() {
            message.add_name(DelimiterTag::OperationAttributes, "job-name", &settings.title);
            if let Some(format) = &settings.document_format {
                message.add_value(
                    DelimiterTag::OperationAttributes,
                    "document-format",
                    IppValue::MimeMediaType(format.clone()),
                );
            }
        }
        for (name, value) in settings.cups_options() {
            request.encode_option(name, value);
        }

        job.set_status(JobStatus::Sending);
        let job = job.clone();
        self.request_execute(request, move |backend, result| {
            let outcome = backend.print_done(&job, result);
            callback(backend, outcome);
        })
    }

    fn print_done(
        &self,
        job: &PrintJob,
        result: CupsResult,
    ) -> std::result::Result<i32, CupsError> {
        let response = match result.into_result() {
            Ok(response) => response,
            Err(e) => {
                warn!(printer = %job.printer(), error = %e, "print job failed");
                job.set_status(JobStatus::Failed);
                return Err(e);
            }
        };

        let job_group = response
            .as_ref()
            .and_then(|r| r.group(DelimiterTag::JobAttributes));
        let Some(job_id) = job_group.and_then(|g| g.get_integer("job-id")) else {
            job.set_status(JobStatus::Failed);
            return Err(CupsError {
                kind: ErrorKind::Ipp,
                status: i32::from(STATUS_OK),
                code: i32::from(STATUS_OK),
                message: "response carried no job-id".into(),
            });
        };

        let state = job_group
            .and_then(|g| g.get_integer("job-state"))
            .and_then(JobState::from_ipp)
            .unwrap_or(JobState::Pending);
        job.set_job_id(job_id);
        job.set_status(JobStatus::Server(state));
        info!(printer = %job.printer(), job_id, "job submitted");

        if job.settings().track_status && !state.is_terminal() {
            self.begin_polling_info(job, job_id);
        }
        Ok(job_id)
    }

    /// Poll Get-Job-Attributes until the job reaches a terminal state, the
    /// poll budget runs out, or every handle to `job` has been dropped.
    pub fn begin_polling_info(&self, job: &PrintJob, job_id: i32) -> JoinHandle<()> {
        let backend = self.clone();
        let job_ref = job.downgrade();
        let interval = self.inner.config.job_poll_interval();
        let max_polls = self.inner.config.max_job_polls;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for _ in 0..max_polls {
                tokio::select! {
                    _ = job_ref.released() => {
                        debug!(job_id, "job released, polling stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let state = backend.request_job_state(job_id).await;
                let Some(job) = job_ref.upgrade() else {
                    return;
                };
                let Some(state) = state else {
                    continue;
                };
                let status = JobStatus::Server(state);
                if job.set_status(status) {
                    backend.emit(BackendEvent::JobStatusChanged { job_id, status });
                }
                if state.is_terminal() {
                    debug!(job_id, ?state, "job finished");
                    return;
                }
            }
            debug!(job_id, max_polls, "job poll budget exhausted");
        })
    }

    async fn request_job_state(&self, job_id: i32) -> Option<JobState> {
        let mut request = self.new_post(
            "/",
            Operation::GetJobAttributes,
            Some(("job-uri", format!("ipp://localhost/jobs/{job_id}"))),
        );
        if let Some(message) = request.message_mut() {
            message.add_keywords(
                DelimiterTag::OperationAttributes,
                "requested-attributes",
                &["job-state"],
            );
        }

        match self.execute(request).await.into_result() {
            Ok(response) => response
                .as_ref()
                .and_then(|r| r.group(DelimiterTag::JobAttributes))
                .and_then(|g| g.get_integer("job-state"))
                .and_then(JobState::from_ipp),
            Err(e) => {
                warn!(job_id, error = %e, "job status request failed");
                None
            }
        }
    }

    /// Cancel a job with Cancel-Job.  A job being followed picks up the
    /// `canceled` state on its next poll.
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: i32) -> Result<()> {
        let request = self.new_post(
            "/jobs",
            Operation::CancelJob,
            Some(("job-uri", format!("ipp://localhost/jobs/{job_id}"))),
        );
        match self.execute(request).await.into_result() {
            Ok(_) => {
                info!(job_id, "job cancelled");
                Ok(())
            }
            Err(e) => {
                warn!(job_id, error = %e, "cancel request failed");
                Err(self.request_error(e))
            }
        }
    }
}

fn rewind_and_parse(file: &mut std::fs::File) -> Result<PpdFile> {
    file.seek(SeekFrom::Start(0))?;
    PpdFile::parse(std::io::BufReader::new(file))
}

/// Build a roster entry from one printer attribute group.
fn printer_from_attributes(group: &IppAttributeGroup) -> Option<Printer> {
    let name = group.get_string("printer-name")?;
    let mut printer = Printer::new(name);
    printer.printer_uri = group.get_string("printer-uri-supported").map(str::to_string);
    printer.device_uri = group.get_string("device-uri").map(str::to_string);
    printer.description = group.get_string("printer-info").map(str::to_string);
    printer.location = group.get_string("printer-location").map(str::to_string);
    printer.state = group
        .get_integer("printer-state")
        .map(PrinterState::from_ipp)
        .unwrap_or_default();
    printer.state_message = group
        .get_string("printer-state-message")
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    printer.job_count = group.get_integer("queued-job-count").unwrap_or(0);
    printer.accepting_jobs = group.get_bool("printer-is-accepting-jobs").unwrap_or(true);
    printer.members = group.get_strings("member-names");
    printer.last_seen = Utc::now();
    Some(printer)
}
