// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A single HTTP conversation with the print server, driven one step at a
// time.
//
// POST:  connect -> send -> write-request -> write-data -> check -> read-response
// GET:   connect -> send -> check -> read-data
//
// Each call to `advance` runs exactly one phase function from the table for
// the request's kind.  Phase functions never block: they move at most one
// chunk of bytes, record which readiness they need next in `poll_state`, and
// return.  The phase index only ever increases; reaching the end of the table
// means done, successful or not.
//
// Connecting is the one step that cannot be a single non-blocking call.  The
// connect phase starts a `ConnectFuture` and waits with `NeedWrite`; the
// driver polls it through `poll_connect` and advances again once it settles.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::task::{Context, Poll};

use tracing::{debug, warn};

use cupsflow_core::config::{BackendConfig, Encryption};
use cupsflow_ipp::http::{
    BodyDecoder, BodyFraming, LAST_CHUNK, RequestHead, ResponseHead, encode_chunk,
    parse_response_head,
};
use cupsflow_ipp::status::{is_error_status, status_name};
use cupsflow_ipp::{DelimiterTag, IppAttribute, IppMessage, Operation, encode_option};

use crate::result::{CupsResult, ErrorKind, HTTP_STATUS_ERROR};
use crate::transport::{ConnectFuture, Connector, PollState, Transport};

/// Failed steps tolerated before the request is abandoned.
pub const MAX_ATTEMPTS: u32 = 10;

/// Largest number of bytes moved by one driver step.
pub const MAX_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// IPP operation, optionally followed by document data.
    Post,
    /// Plain file download (PPDs).
    Get,
}

/// Conversation phases, ordered so both phase tables are increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Connect,
    Send,
    WriteRequest,
    WriteData,
    Check,
    ReadResponse,
    ReadData,
    Done,
}

type PhaseFn = fn(&mut CupsRequest);

const POST_PHASES: &[(Phase, PhaseFn)] = &[
    (Phase::Connect, CupsRequest::connect),
    (Phase::Send, CupsRequest::send),
    (Phase::WriteRequest, CupsRequest::write_request),
    (Phase::WriteData, CupsRequest::write_data),
    (Phase::Check, CupsRequest::check),
    (Phase::ReadResponse, CupsRequest::read_response),
];

const GET_PHASES: &[(Phase, PhaseFn)] = &[
    (Phase::Connect, CupsRequest::connect),
    (Phase::Send, CupsRequest::send),
    (Phase::Check, CupsRequest::check),
    (Phase::ReadData, CupsRequest::read_data),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Complete,
    Pending,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadOutcome {
    Data,
    Eof,
    WouldBlock,
    Failed,
}

/// One POST or GET exchange with the print server.
pub struct CupsRequest {
    kind: RequestKind,
    /// Index into the phase table; equal to its length once done.
    state: usize,
    attempts: u32,
    poll_state: PollState,

    server: String,
    port: u16,
    encryption: Encryption,
    resource: String,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    own_connection: bool,
    /// Connection attempt in flight.
    connecting: Option<ConnectFuture>,
    /// Settled attempt, picked up by the next connect step.
    connected: Option<io::Result<Box<dyn Transport>>>,

    message: Option<IppMessage>,
    data_source: Option<Box<dyn Read + Send>>,
    data_sink: Option<Box<dyn Write + Send>>,

    /// Set once the current phase has queued its output.
    phase_started: bool,
    ipp_bytes: Vec<u8>,
    out_buf: Vec<u8>,
    out_pos: usize,
    data_done: bool,
    in_buf: Vec<u8>,
    body: Option<BodyDecoder>,
    body_buf: Vec<u8>,
    bytes_sent: usize,

    result: CupsResult,
}

impl CupsRequest {
    /// An IPP operation POSTed to `resource`.  The operation group already
    /// holds `attributes-charset` and `attributes-natural-language`.
    pub fn post(
        config: &BackendConfig,
        connector: Arc<dyn Connector>,
        resource: &str,
        operation: Operation,
    ) -> Self {
        let message = IppMessage::new_request(operation, &config.language);
        Self::new(RequestKind::Post, config, connector, resource, Some(message))
    }

    /// A GET of `resource`; the body goes to the data sink.
    pub fn get(config: &BackendConfig, connector: Arc<dyn Connector>, resource: &str) -> Self {
        Self::new(RequestKind::Get, config, connector, resource, None)
    }

    fn new(
        kind: RequestKind,
        config: &BackendConfig,
        connector: Arc<dyn Connector>,
        resource: &str,
        message: Option<IppMessage>,
    ) -> Self {
        Self {
            kind,
            state: 0,
            attempts: 0,
            poll_state: PollState::Idle,
            server: config.server.clone(),
            port: config.port,
            encryption: config.encryption,
            resource: resource.to_string(),
            connector,
            transport: None,
            own_connection: true,
            connecting: None,
            connected: None,
            message,
            data_source: None,
            data_sink: None,
            phase_started: false,
            ipp_bytes: Vec::new(),
            out_buf: Vec::new(),
            out_pos: 0,
            data_done: false,
            in_buf: Vec::new(),
            body: None,
            body_buf: Vec::new(),
            bytes_sent: 0,
            result: CupsResult::default(),
        }
    }

    /// Use an existing connection instead of opening one.  It is not closed
    /// when the request finishes; take it back with [`take_connection`].
    ///
    /// [`take_connection`]: Self::take_connection
    pub fn with_connection(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self.own_connection = false;
        self
    }

    /// Document streamed after the IPP message (POST only).
    pub fn with_data_source(mut self, source: Box<dyn Read + Send>) -> Self {
        self.data_source = Some(source);
        self
    }

    /// Destination for a GET body.
    pub fn with_data_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.data_sink = Some(sink);
        self
    }

    /// The outgoing IPP message; `None` for GET requests.
    pub fn message_mut(&mut self) -> Option<&mut IppMessage> {
        self.message.as_mut()
    }

    pub fn add_attribute(&mut self, group: DelimiterTag, attribute: IppAttribute) {
        match self.message.as_mut() {
            Some(message) => {
                message.add(group, attribute);
            }
            None => warn!(name = %attribute.name(), "attribute ignored on GET request"),
        }
    }

    /// Encode a CUPS option string and add it to the job attributes.
    pub fn encode_option(&mut self, option: &str, value: &str) {
        self.add_attribute(DelimiterTag::JobAttributes, encode_option(option, value));
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn phase(&self) -> Phase {
        self.phases()
            .get(self.state)
            .map_or(Phase::Done, |&(phase, _)| phase)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn poll_state(&self) -> PollState {
        self.poll_state
    }

    pub fn is_done(&self) -> bool {
        self.state >= self.phases().len()
    }

    pub fn has_connection(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether a connection attempt is waiting to be polled.
    pub fn is_connecting(&self) -> bool {
        self.connecting.is_some()
    }

    /// Poll the connection attempt.  Ready once it has settled (or when none
    /// is in flight); the next `advance` then consumes the outcome.
    pub fn poll_connect(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(attempt) = self.connecting.as_mut() else {
            return Poll::Ready(());
        };
        match attempt.as_mut().poll(cx) {
            Poll::Ready(outcome) => {
                self.connecting = None;
                self.connected = Some(outcome);
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }

    /// Document bytes handed to the socket so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn result(&self) -> &CupsResult {
        &self.result
    }

    pub fn take_result(&mut self) -> CupsResult {
        std::mem::take(&mut self.result)
    }

    /// Hand back a connection supplied with [`with_connection`].
    ///
    /// [`with_connection`]: Self::with_connection
    pub fn take_connection(&mut self) -> Option<Box<dyn Transport>> {
        if self.own_connection {
            None
        } else {
            self.transport.take()
        }
    }

    pub(crate) fn transport_mut(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        self.transport.as_deref_mut()
    }

    /// Run the current phase once.  Returns true when the request is done,
    /// whether it succeeded or failed.
    pub fn advance(&mut self) -> bool {
        if let Some(&(_, step)) = self.phases().get(self.state) {
            step(self);
        }

        if self.attempts > MAX_ATTEMPTS && !self.is_done() {
            warn!(
                resource = %self.resource,
                attempts = self.attempts,
                phase = ?self.phase(),
                "giving up on request"
            );
            self.result
                .set_error(ErrorKind::General, 0, 0, "too many failed attempts");
            self.finish();
        }

        if self.is_done() {
            self.poll_state = PollState::Idle;
            true
        } else {
            false
        }
    }

    fn phases(&self) -> &'static [(Phase, PhaseFn)] {
        match self.kind {
            RequestKind::Post => POST_PHASES,
            RequestKind::Get => GET_PHASES,
        }
    }

    // -- state bookkeeping --------------------------------------------------

    fn next_phase(&mut self, poll: PollState) {
        self.state += 1;
        self.phase_started = false;
        self.poll_state = poll;
        debug!(resource = %self.resource, phase = ?self.phase(), "request phase");
    }

    fn finish(&mut self) {
        self.state = self.phases().len();
        self.poll_state = PollState::Idle;
        self.connecting = None;
        self.connected = None;
        if self.own_connection {
            self.transport = None;
        }
    }

    fn fail(&mut self, kind: ErrorKind, status: i32, code: i32, message: String) {
        debug!(resource = %self.resource, %kind, status, code, %message, "request failed");
        self.result.set_error(kind, status, code, message);
        self.finish();
    }

    fn fail_io(&mut self, what: &str, err: io::Error) {
        let code = err.raw_os_error().unwrap_or(0);
        self.fail(ErrorKind::Http, HTTP_STATUS_ERROR, code, format!("{what}: {err}"));
    }

    fn host_header(&self) -> String {
        if self.server.starts_with('/') {
            "localhost".to_string()
        } else if self.server.contains(':') {
            format!("[{}]:{}", self.server, self.port)
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }

    // -- socket helpers -----------------------------------------------------

    /// Write the next slice of `out_buf`.
    fn flush(&mut self) -> Progress {
        if self.out_pos >= self.out_buf.len() {
            self.out_buf.clear();
            self.out_pos = 0;
            return Progress::Complete;
        }
        let end = self.out_buf.len().min(self.out_pos + MAX_CHUNK_SIZE);
        let written = match self.transport.as_mut() {
            Some(transport) => transport.try_write(&self.out_buf[self.out_pos..end]),
            None => Err(io::ErrorKind::NotConnected.into()),
        };
        match written {
            Ok(0) => {
                self.fail_io("write failed", io::ErrorKind::WriteZero.into());
                Progress::Failed
            }
            Ok(n) => {
                self.out_pos += n;
                if self.out_pos >= self.out_buf.len() {
                    self.out_buf.clear();
                    self.out_pos = 0;
                    Progress::Complete
                } else {
                    self.poll_state = PollState::NeedWrite;
                    Progress::Pending
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                self.poll_state = PollState::NeedWrite;
                Progress::Pending
            }
            Err(e) => {
                self.fail_io("write failed", e);
                Progress::Failed
            }
        }
    }

    /// Read at most one chunk into `in_buf`.
    fn read_some(&mut self) -> ReadOutcome {
        let mut chunk = [0u8; MAX_CHUNK_SIZE];
        let read = match self.transport.as_mut() {
            Some(transport) => transport.try_read(&mut chunk),
            None => Err(io::ErrorKind::NotConnected.into()),
        };
        match read {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => {
                self.in_buf.extend_from_slice(&chunk[..n]);
                ReadOutcome::Data
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                self.poll_state = PollState::NeedRead;
                ReadOutcome::WouldBlock
            }
            Err(e) => {
                self.fail_io("read failed", e);
                ReadOutcome::Failed
            }
        }
    }

    /// Feed buffered input to the body decoder.  Returns whether the body is
    /// complete.
    fn decode_buffered(&mut self, out: &mut Vec<u8>) -> cupsflow_core::error::Result<bool> {
        let Some(decoder) = self.body.as_mut() else {
            return Ok(true);
        };
        if !self.in_buf.is_empty() {
            decoder.decode(&self.in_buf, out)?;
            self.in_buf.clear();
        }
        Ok(decoder.is_complete())
    }

    /// Move body bytes from the socket into `out`.
    fn pump_body(&mut self, out: &mut Vec<u8>) -> Progress {
        match self.decode_buffered(out) {
            Ok(true) => return Progress::Complete,
            Ok(false) => {}
            Err(e) => {
                self.fail(ErrorKind::Http, HTTP_STATUS_ERROR, 0, e.to_string());
                return Progress::Failed;
            }
        }
        match self.read_some() {
            ReadOutcome::Data => match self.decode_buffered(out) {
                Ok(true) => Progress::Complete,
                Ok(false) => {
                    self.poll_state = PollState::NeedRead;
                    Progress::Pending
                }
                Err(e) => {
                    self.fail(ErrorKind::Http, HTTP_STATUS_ERROR, 0, e.to_string());
                    Progress::Failed
                }
            },
            ReadOutcome::Eof => match self.body.as_mut().map(BodyDecoder::finish) {
                Some(Err(e)) => {
                    self.fail(ErrorKind::Http, HTTP_STATUS_ERROR, 0, e.to_string());
                    Progress::Failed
                }
                _ => Progress::Complete,
            },
            ReadOutcome::WouldBlock => Progress::Pending,
            ReadOutcome::Failed => Progress::Failed,
        }
    }

    // -- phases -------------------------------------------------------------

    fn connect(&mut self) {
        if self.transport.is_none() {
            match self.connected.take() {
                None => {
                    if self.connecting.is_none() {
                        debug!(server = %self.server, port = self.port, "connecting");
                        self.connecting =
                            Some(self.connector.connect(&self.server, self.port, self.encryption));
                    }
                    self.poll_state = PollState::NeedWrite;
                    return;
                }
                Some(Ok(transport)) => {
                    debug!(server = %self.server, port = self.port, "connection established");
                    self.transport = Some(transport);
                    self.own_connection = true;
                }
                Some(Err(e)) => {
                    self.attempts += 1;
                    self.poll_state = PollState::Idle;
                    debug!(
                        server = %self.server,
                        port = self.port,
                        attempts = self.attempts,
                        error = %e,
                        "connection attempt failed"
                    );
                    return;
                }
            }
        }
        self.attempts = 0;
        self.next_phase(PollState::NeedWrite);
    }

    fn send(&mut self) {
        if !self.phase_started {
            self.phase_started = true;
            if let Some(message) = &self.message {
                match message.encode() {
                    Ok(bytes) => self.ipp_bytes = bytes,
                    Err(e) => {
                        self.fail(ErrorKind::General, 0, 0, e.to_string());
                        return;
                    }
                }
            }
            let host = self.host_header();
            let head = match self.kind {
                RequestKind::Get => RequestHead::get(&self.resource, &host),
                RequestKind::Post => {
                    let framing = if self.data_source.is_some() {
                        BodyFraming::Chunked
                    } else {
                        BodyFraming::Length(self.ipp_bytes.len())
                    };
                    RequestHead::post_ipp(&self.resource, &host, framing)
                }
            };
            self.out_buf.extend_from_slice(&head.encode());
        }

        if self.flush() == Progress::Complete {
            let next = match self.kind {
                RequestKind::Post => PollState::NeedWrite,
                RequestKind::Get => PollState::NeedRead,
            };
            self.next_phase(next);
        }
    }

    fn write_request(&mut self) {
        if !self.phase_started {
            self.phase_started = true;
            let body = std::mem::take(&mut self.ipp_bytes);
            if self.data_source.is_some() {
                self.out_buf.extend_from_slice(&encode_chunk(&body));
            } else {
                self.out_buf.extend_from_slice(&body);
            }
        }

        if self.flush() == Progress::Complete {
            self.next_phase(PollState::NeedWrite);
        }
    }

    fn write_data(&mut self) {
        if self.out_pos < self.out_buf.len() && self.flush() != Progress::Complete {
            return;
        }
        if self.data_done {
            self.next_phase(PollState::NeedRead);
            return;
        }
        let Some(source) = self.data_source.as_mut() else {
            self.next_phase(PollState::NeedRead);
            return;
        };

        let mut chunk = [0u8; MAX_CHUNK_SIZE];
        match source.read(&mut chunk) {
            Ok(0) => {
                self.out_buf.extend_from_slice(LAST_CHUNK);
                self.data_done = true;
                self.data_source = None;
            }
            Ok(n) => {
                self.out_buf.extend_from_slice(&encode_chunk(&chunk[..n]));
                self.bytes_sent += n;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                self.poll_state = PollState::NeedWrite;
                return;
            }
            Err(e) => {
                let code = e.raw_os_error().unwrap_or(0);
                self.fail(ErrorKind::General, 0, code, format!("reading document: {e}"));
                return;
            }
        }

        match self.flush() {
            Progress::Complete if self.data_done => self.next_phase(PollState::NeedRead),
            Progress::Complete | Progress::Pending => self.poll_state = PollState::NeedWrite,
            Progress::Failed => {}
        }
    }

    fn check(&mut self) {
        if self.take_response_head() {
            return;
        }
        match self.read_some() {
            ReadOutcome::Data => {
                if !self.take_response_head() {
                    self.poll_state = PollState::NeedRead;
                }
            }
            ReadOutcome::Eof => self.fail(
                ErrorKind::Http,
                HTTP_STATUS_ERROR,
                0,
                "connection closed before the response arrived".into(),
            ),
            ReadOutcome::WouldBlock | ReadOutcome::Failed => {}
        }
    }

    /// Parse a buffered response head, skipping interim 1xx heads.  Returns
    /// true once the check phase is over.
    fn take_response_head(&mut self) -> bool {
        loop {
            match parse_response_head(&self.in_buf) {
                Ok(None) => return false,
                Err(e) => {
                    self.fail(ErrorKind::Http, HTTP_STATUS_ERROR, 0, e.to_string());
                    return true;
                }
                Ok(Some((head, used))) => {
                    self.in_buf.drain(..used);
                    if head.is_informational() {
                        debug!(status = head.status, "skipping interim response");
                        continue;
                    }
                    self.accept_head(head);
                    return true;
                }
            }
        }
    }

    fn accept_head(&mut self, head: ResponseHead) {
        let status = i32::from(head.status);
        debug!(resource = %self.resource, status, "response head");
        if !head.is_success() {
            self.fail(
                ErrorKind::Http,
                status,
                0,
                format!("HTTP {} {}", head.status, head.reason),
            );
            return;
        }
        match head.body_decoder() {
            Ok(decoder) => {
                self.body = Some(decoder);
                // Body bytes that arrived with the head need no readiness.
                let next = if self.in_buf.is_empty() {
                    PollState::NeedRead
                } else {
                    PollState::Idle
                };
                self.next_phase(next);
            }
            Err(e) => self.fail(ErrorKind::Http, status, 0, e.to_string()),
        }
    }

    fn read_response(&mut self) {
        let mut body = std::mem::take(&mut self.body_buf);
        let progress = self.pump_body(&mut body);
        if progress != Progress::Complete {
            self.body_buf = body;
            return;
        }

        let response = match IppMessage::decode(&body) {
            Ok(response) => response,
            Err(e) => {
                self.fail(ErrorKind::General, 0, 0, format!("malformed IPP response: {e}"));
                return;
            }
        };

        let status = response.status_code();
        if is_error_status(status) {
            let message = response
                .status_message()
                .unwrap_or_else(|| status_name(status))
                .to_string();
            self.fail(ErrorKind::Ipp, i32::from(status), i32::from(status), message);
            return;
        }

        self.result.set_response(response);
        self.finish();
    }

    fn read_data(&mut self) {
        let mut data = Vec::new();
        let progress = self.pump_body(&mut data);
        if progress == Progress::Failed {
            return;
        }
        if let Some(sink) = self.data_sink.as_mut() {
            let written = sink.write_all(&data).and_then(|()| {
                if progress == Progress::Complete {
                    sink.flush()
                } else {
                    Ok(())
                }
            });
            if let Err(e) = written {
                let code = e.raw_os_error().unwrap_or(0);
                self.fail(ErrorKind::General, 0, code, format!("writing data: {e}"));
                return;
            }
        }
        if progress == Progress::Complete {
            self.finish();
        }
    }
}
