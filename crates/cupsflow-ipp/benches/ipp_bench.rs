// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for option encoding, IPP message encode/decode, and
// chunked body decoding in the cupsflow-ipp crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use cupsflow_ipp::http::{BodyDecoder, LAST_CHUNK, encode_chunk};
use cupsflow_ipp::status::STATUS_OK;
use cupsflow_ipp::{DelimiterTag, IppMessage, IppValue, Operation, encode_option};

/// A Print-Job request with a typical set of job options.
fn build_print_job() -> IppMessage {
    let mut msg = IppMessage::new_request(Operation::PrintJob, "en");
    msg.add_value(
        DelimiterTag::OperationAttributes,
        "printer-uri",
        IppValue::Uri("ipp://localhost/printers/laser".into()),
    )
    .add_name(DelimiterTag::OperationAttributes, "requesting-user-name", "bench")
    .add_name(DelimiterTag::OperationAttributes, "job-name", "Benchmark Print Job");
    for (name, value) in [
        ("copies", "2"),
        ("sides", "two-sided-long-edge"),
        ("page-ranges", "1-5"),
        ("printer-resolution", "600dpi"),
        ("media", "a4,tray1"),
    ] {
        msg.add(DelimiterTag::JobAttributes, encode_option(name, value));
    }
    msg
}

/// A CUPS-Get-Printers response listing many queues.
fn build_printer_list(count: usize) -> Vec<u8> {
    let printer = DelimiterTag::PrinterAttributes;
    let mut msg = IppMessage::new_response(STATUS_OK, 1);
    msg.add_value(
        DelimiterTag::OperationAttributes,
        "attributes-charset",
        IppValue::Charset("utf-8".into()),
    );
    for i in 0..count {
        let name = format!("printer-{i}");
        msg.begin_group(printer);
        msg.add_name(printer, "printer-name", &name)
            .add_enum(printer, "printer-state", 3)
            .add_value(printer, "printer-location", IppValue::TextWithoutLanguage("Lab".into()))
            .add_integer(printer, "queued-job-count", 0)
            .add_boolean(printer, "printer-is-accepting-jobs", true);
    }
    msg.encode().unwrap_or_default()
}

fn bench_encode_option(c: &mut Criterion) {
    c.bench_function("encode_option (range list)", |b| {
        b.iter(|| black_box(encode_option(black_box("page-ranges"), black_box("1-3,5,7-"))));
    });

    c.bench_function("encode_option (unknown name)", |b| {
        b.iter(|| black_box(encode_option(black_box("x-vendor-thing"), black_box("a,b,c"))));
    });
}

fn bench_message_codec(c: &mut Criterion) {
    let request = build_print_job();
    c.bench_function("encode Print-Job request", |b| {
        b.iter(|| {
            let bytes = black_box(&request).encode();
            assert!(bytes.is_ok());
        });
    });

    let list = build_printer_list(100);
    c.bench_function("decode CUPS-Get-Printers response (100 printers)", |b| {
        b.iter(|| {
            let result = IppMessage::decode(black_box(&list));
            assert!(result.is_ok());
        });
    });
}

fn bench_chunked_body(c: &mut Criterion) {
    let payload = vec![0x42u8; 8192];
    let mut wire = Vec::new();
    for _ in 0..128 {
        wire.extend_from_slice(&encode_chunk(&payload));
    }
    wire.extend_from_slice(LAST_CHUNK);

    c.bench_function("decode chunked body (1 MiB)", |b| {
        b.iter(|| {
            let mut decoder = BodyDecoder::chunked();
            let mut out = Vec::with_capacity(1024 * 1024);
            for piece in black_box(&wire).chunks(4096) {
                let _ = decoder.decode(piece, &mut out);
            }
            assert!(decoder.is_complete());
            black_box(out);
        });
    });
}

criterion_group!(benches, bench_encode_option, bench_message_codec, bench_chunked_body);
criterion_main!(benches);
