// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end tests of the backend against an in-process CUPS stand-in that
// speaks HTTP/1.1 and IPP on a loopback port.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use cupsflow_core::BackendConfig;
use cupsflow_core::error::CupsflowError;
use cupsflow_core::types::{JobSettings, JobState, JobStatus, PrinterState};
use cupsflow_ipp::http::{BodyDecoder, find_subsequence, path_segment};
use cupsflow_ipp::status::{STATUS_NOT_FOUND, STATUS_OK};
use cupsflow_ipp::{AttributeGroupExt, DelimiterTag, IppMessage, IppValue};
use cupsflow_print::{BackendEvent, CupsBackend, PrintJob};

const PPD: &str = r#"*PPD-Adobe: "4.3"
*ModelName: "Acme Laser"
*NickName: "Acme Laser, 2.0"
*OpenUI *PageSize/Media Size: PickOne
*DefaultPageSize: A4
*PageSize A4/A4: "<</PageSize[595 842]>>setpagedevice"
*PageSize Letter/US Letter: "<</PageSize[612 792]>>setpagedevice"
*CloseUI: *PageSize
*PaperDimension A4/A4: "595 842"
*PaperDimension Letter/US Letter: "612 792"
"#;

const TIMEOUT: Duration = Duration::from_secs(5);

const OPERATION: DelimiterTag = DelimiterTag::OperationAttributes;
const PRINTER: DelimiterTag = DelimiterTag::PrinterAttributes;
const JOB: DelimiterTag = DelimiterTag::JobAttributes;

/// One request as the stand-in server saw it.
struct Received {
    resource: String,
    message: Option<IppMessage>,
    /// The whole request body; the document follows the IPP message.
    body: Vec<u8>,
}

struct MockCups {
    printers: Mutex<Vec<(&'static str, i32)>>,
    default: Option<&'static str>,
    /// `job-state` values handed out by successive Get-Job-Attributes.
    job_states: Mutex<VecDeque<i32>>,
    received: Mutex<Vec<Received>>,
    /// Hold each connection open after replying instead of closing it.
    keep_alive: bool,
}

impl MockCups {
    fn new() -> Self {
        Self {
            printers: Mutex::new(vec![("Laser", 3), ("Inkjet", 5)]),
            default: Some("Laser"),
            job_states: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
            keep_alive: false,
        }
    }

    async fn start(self) -> (Arc<Self>, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(self);
        let server = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(server.clone().handle(stream));
            }
        });
        (state, port)
    }

    async fn handle(self: Arc<Self>, mut stream: TcpStream) {
        let Some((method, resource, body)) = read_request(&mut stream).await else {
            return;
        };

        let reply = if method == "GET" {
            if resource == "/printers/Laser.ppd" {
                http_reply("200 OK", "text/plain", PPD.as_bytes())
            } else {
                http_reply("404 Not Found", "text/plain", b"")
            }
        } else {
            let message = IppMessage::decode(&body).unwrap();
            let response = self.respond(&message);
            self.received.lock().unwrap().push(Received {
                resource: resource.clone(),
                message: Some(message),
                body,
            });
            http_reply("200 OK", "application/ipp", &response.encode().unwrap())
        };

        if method == "GET" {
            self.received.lock().unwrap().push(Received {
                resource,
                message: None,
                body: Vec::new(),
            });
        }
        let _ = stream.write_all(&reply).await;
        if self.keep_alive {
            // Idle until the client hangs up.
            let mut sink = [0u8; 64];
            while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
        } else {
            let _ = stream.shutdown().await;
        }
    }

    fn printer_group(response: &mut IppMessage, name: &str, state: i32) {
        response.begin_group(PRINTER);
        response
            .add_name(PRINTER, "printer-name", name)
            .add_enum(PRINTER, "printer-state", state)
            .add_boolean(PRINTER, "printer-is-accepting-jobs", true);
    }

    fn respond(&self, request: &IppMessage) -> IppMessage {
        let mut response = IppMessage::new_response(STATUS_OK, request.request_id);
        response.add_value(OPERATION, "attributes-charset", IppValue::Charset("utf-8".into()));
        let target = request
            .group(OPERATION)
            .and_then(|g| g.get_string("printer-uri").or_else(|| g.get_string("job-uri")))
            .and_then(|uri| uri.rsplit('/').next())
            .unwrap_or_default()
            .to_string();

        match request.code {
            // CUPS-Get-Printers
            0x4002 => {
                for (name, state) in self.printers.lock().unwrap().iter() {
                    Self::printer_group(&mut response, name, *state);
                }
            }
            // CUPS-Get-Default
            0x4001 => match self.default {
                Some(name) => {
                    response.add_name(PRINTER, "printer-name", name);
                }
                None => response.code = STATUS_NOT_FOUND,
            },
            // Get-Printer-Attributes
            0x000B => {
                let printers = self.printers.lock().unwrap();
                match printers.iter().find(|(name, _)| path_segment(name) == target) {
                    Some((name, state)) => Self::printer_group(&mut response, name, *state),
                    None => response.code = STATUS_NOT_FOUND,
                }
            }
            // Print-Job
            0x0002 => {
                response
                    .add_integer(JOB, "job-id", 42)
                    .add_enum(JOB, "job-state", 3);
            }
            // Cancel-Job
            0x0008 => {
                if target != "42" {
                    response.code = STATUS_NOT_FOUND;
                }
            }
            // Get-Job-Attributes
            0x0009 => {
                let state = self.job_states.lock().unwrap().pop_front().unwrap_or(9);
                response.add_enum(JOB, "job-state", state);
            }
            _ => response.code = 0x0501,
        }
        response
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<(String, String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];

    let head_end = loop {
        if let Some(end) = find_subsequence(&buf, b"\r\n\r\n") {
            break end + 4;
        }
        let n = stream.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let resource = request_line.next()?.to_string();

    let mut decoder = BodyDecoder::length(0);
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => decoder = BodyDecoder::length(value.trim().parse().ok()?),
            "transfer-encoding" if value.contains("chunked") => decoder = BodyDecoder::chunked(),
            _ => {}
        }
    }

    let mut body = Vec::new();
    decoder.decode(&buf[head_end..], &mut body).ok()?;
    while !decoder.is_complete() {
        let n = stream.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        decoder.decode(&tmp[..n], &mut body).ok()?;
    }
    Some((method, resource, body))
}

fn http_reply(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut reply = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    reply.extend_from_slice(body);
    reply
}

fn config(port: u16) -> BackendConfig {
    BackendConfig {
        server: "127.0.0.1".into(),
        port,
        user: Some("alice".into()),
        connect_retry_ms: 1,
        job_poll_interval_ms: 10,
        ..Default::default()
    }
}

async fn next_event(
    rx: &mut broadcast::Receiver<BackendEvent>,
    wanted: impl Fn(&BackendEvent) -> bool,
) -> BackendEvent {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel open");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected backend event")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enumeration_resolves_roster_and_default() {
    let (_server, port) = MockCups::new().start().await;
    let backend = CupsBackend::new(config(port)).unwrap();
    let mut rx = backend.subscribe();

    backend.request_printer_list().expect("not pending").await.unwrap();
    let event = next_event(&mut rx, |e| {
        matches!(e, BackendEvent::DefaultPrinterChanged(_))
    })
    .await;

    assert_eq!(event, BackendEvent::DefaultPrinterChanged(Some("Laser".into())));
    let names: Vec<_> = backend.printers().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Inkjet", "Laser"]);
    assert!(backend.printer("LASER").unwrap().is_default);
    assert!(!backend.printer("inkjet").unwrap().is_default);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ppd_is_downloaded_and_parsed() {
    let (_server, port) = MockCups::new().start().await;
    let backend = CupsBackend::new(config(port)).unwrap();
    let mut rx = backend.subscribe();

    backend.request_details("Laser").unwrap().await.unwrap();
    let event = next_event(&mut rx, |e| matches!(e, BackendEvent::DetailsAcquired { .. })).await;
    assert_eq!(
        event,
        BackendEvent::DetailsAcquired { printer: "Laser".into(), success: true }
    );

    let ppd = backend.ppd("laser").expect("cached PPD");
    assert_eq!(ppd.model_name.as_deref(), Some("Acme Laser"));
    let page_size = ppd.find_option("PageSize").unwrap();
    assert_eq!(page_size.default_choice.as_deref(), Some("A4"));
    assert_eq!(ppd.papers().len(), 2);

    // PageSize comes from the job's paper, so only the job options remain.
    let options = backend.printer_options("Laser", None);
    assert!(options.lookup("cups-PageSize").is_none());
    assert_eq!(options.len(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_ppd_reports_failure() {
    let (_server, port) = MockCups::new().start().await;
    let backend = CupsBackend::new(config(port)).unwrap();
    let mut rx = backend.subscribe();

    backend.request_details("Nowhere").unwrap().await.unwrap();
    let event = next_event(&mut rx, |e| matches!(e, BackendEvent::DetailsAcquired { .. })).await;
    assert_eq!(
        event,
        BackendEvent::DetailsAcquired { printer: "Nowhere".into(), success: false }
    );
    assert!(backend.ppd("Nowhere").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn print_job_is_streamed_and_tracked() {
    let server = MockCups::new();
    server.job_states.lock().unwrap().extend([5, 9]);
    let (server, port) = server.start().await;
    let backend = CupsBackend::new(config(port)).unwrap();

    let mut settings = JobSettings::new("quarterly report");
    settings.document_format = Some("application/pdf".into());
    settings.options.insert("cups-copies".into(), "2".into());
    settings.options.insert("cups-sides".into(), "two-sided-long-edge".into());
    settings.track_status = true;
    let job = PrintJob::new("Laser", settings);
    let mut status = job.subscribe();

    let document: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let (tx, rx) = tokio::sync::oneshot::channel();
    backend
        .print_stream(&job, Cursor::new(document.clone()), move |_, outcome| {
            let _ = tx.send(outcome);
        })
        .await
        .unwrap();

    assert_eq!(rx.await.unwrap(), Ok(42));
    assert_eq!(job.job_id(), Some(42));

    tokio::time::timeout(
        TIMEOUT,
        status.wait_for(|s| *s == JobStatus::Server(JobState::Completed)),
    )
    .await
    .expect("job completes")
    .unwrap();

    let received = server.received.lock().unwrap();
    let print = received
        .iter()
        .find(|r| r.resource == "/printers/Laser")
        .expect("Print-Job request");
    assert!(print.body.len() > document.len());
    assert!(print.body.ends_with(&document));

    let message = print.message.as_ref().unwrap();
    let operation = message.group(OPERATION).unwrap();
    assert_eq!(
        operation.get_string("printer-uri"),
        Some("ipp://localhost/printers/Laser")
    );
    assert_eq!(operation.get_string("requesting-user-name"), Some("alice"));
    assert_eq!(operation.get_string("job-name"), Some("quarterly report"));
    assert_eq!(operation.get_string("document-format"), Some("application/pdf"));

    let job_attrs = message.group(JOB).unwrap();
    assert_eq!(job_attrs.get_integer("copies"), Some(2));
    assert_eq!(job_attrs.get_string("sides"), Some("two-sided-long-edge"));

    let polls = received.iter().filter(|r| r.resource == "/").count();
    assert_eq!(polls, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_server_leaves_roster_empty() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let backend = CupsBackend::new(config(port)).unwrap();
    let mut rx = backend.subscribe();

    tokio::time::timeout(TIMEOUT, backend.request_printer_list().unwrap())
        .await
        .expect("gives up")
        .unwrap();

    assert!(backend.printers().is_empty());
    assert!(rx.try_recv().is_err());
    // A failed enumeration does not block the next one.
    let retry = backend.request_printer_list();
    assert!(retry.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn printer_names_are_escaped_in_paths_and_uris() {
    let server = MockCups::new();
    server.printers.lock().unwrap().push(("Office Laser", 3));
    let (server, port) = server.start().await;
    let backend = CupsBackend::new(config(port)).unwrap();

    let job = PrintJob::new("Office Laser", JobSettings::new("memo"));
    let (tx, rx) = tokio::sync::oneshot::channel();
    backend
        .print_stream(&job, Cursor::new(b"hello".to_vec()), move |_, outcome| {
            let _ = tx.send(outcome);
        })
        .await
        .unwrap();
    assert_eq!(rx.await.unwrap(), Ok(42));

    let received = server.received.lock().unwrap();
    let print = received
        .iter()
        .find(|r| r.resource == "/printers/Office%20Laser")
        .expect("Print-Job on the escaped resource");
    let operation = print.message.as_ref().unwrap().group(OPERATION).unwrap();
    assert_eq!(
        operation.get_string("printer-uri"),
        Some("ipp://localhost/printers/Office%20Laser")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn printer_attributes_refresh_one_printer() {
    let (server, port) = MockCups::new().start().await;
    let backend = CupsBackend::new(config(port)).unwrap();
    let mut rx = backend.subscribe();
    backend.request_printer_list().expect("not pending").await.unwrap();
    next_event(&mut rx, |e| matches!(e, BackendEvent::DefaultPrinterChanged(_))).await;

    server.printers.lock().unwrap()[0].1 = 4;
    backend.request_printer_attributes("laser").unwrap().await.unwrap();

    let event = next_event(&mut rx, |e| {
        matches!(e, BackendEvent::PrinterStatusChanged(p) if p.name == "Laser")
    })
    .await;
    let BackendEvent::PrinterStatusChanged(laser) = event else {
        unreachable!();
    };
    assert_eq!(laser.state, PrinterState::Processing);
    assert!(backend.printer("laser").unwrap().is_default);

    let received = server.received.lock().unwrap();
    assert!(received.iter().any(|r| r.resource == "/printers/Laser"
        && r.message.as_ref().is_some_and(|m| m.code == 0x000B)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_job_reaches_server() {
    let (server, port) = MockCups::new().start().await;
    let backend = CupsBackend::new(config(port)).unwrap();

    backend.cancel_job(42).await.unwrap();
    assert!(matches!(backend.cancel_job(7).await, Err(CupsflowError::Request(_))));

    let received = server.received.lock().unwrap();
    let cancel = received
        .iter()
        .filter_map(|r| r.message.as_ref())
        .find(|m| m.code == 0x0008)
        .expect("Cancel-Job request");
    let operation = cancel.group(OPERATION).unwrap();
    assert_eq!(operation.get_string("job-uri"), Some("ipp://localhost/jobs/42"));
    assert_eq!(operation.get_string("requesting-user-name"), Some("alice"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_against_unreachable_server_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let backend = CupsBackend::new(config(port)).unwrap();
    let outcome = tokio::time::timeout(TIMEOUT, backend.cancel_job(42))
        .await
        .expect("gives up");
    assert!(matches!(outcome, Err(CupsflowError::Connect { server, .. }) if server == "127.0.0.1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sized_reply_completes_without_connection_close() {
    let mut server = MockCups::new();
    server.keep_alive = true;
    let (_server, port) = server.start().await;
    let backend = CupsBackend::new(config(port)).unwrap();
    let mut rx = backend.subscribe();

    tokio::time::timeout(TIMEOUT, backend.request_default_printer())
        .await
        .expect("reply framed by Content-Length")
        .unwrap();
    let event = next_event(&mut rx, |e| matches!(e, BackendEvent::DefaultPrinterChanged(_))).await;
    assert_eq!(event, BackendEvent::DefaultPrinterChanged(Some("Laser".into())));
}

#[tokio::test(flavor = "current_thread")]
async fn enumeration_against_silent_host_does_not_stall_runtime() {
    let mut config = config(631);
    // Non-routable; the SYN goes unanswered.
    config.server = "10.255.255.1".into();
    config.connect_timeout_ms = 2_000;
    let backend = CupsBackend::new(config).unwrap();

    let enumeration = backend.request_printer_list().expect("not pending");
    let started = Instant::now();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(started.elapsed() < Duration::from_millis(500));

    enumeration.abort();
    let _ = enumeration.await;
    assert!(backend.request_printer_list().is_some());
}
