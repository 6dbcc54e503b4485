// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal HTTP/1.1 framing for IPP.
//
// IPP rides on HTTP POST (RFC 8010 §4) and CUPS serves PPDs over plain GET.
// Only what a client needs is implemented: serialising a request head,
// parsing a response head once it has fully arrived, and incrementally
// decoding a body framed by Content-Length, chunked transfer coding, or
// connection close.  All of it is push-based so a non-blocking reader can
// feed whatever bytes it happens to have.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use cupsflow_core::error::{CupsflowError, Result};

/// Everything but RFC 3986 unreserved characters is escaped in a segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Maximum size of a response head before the response is rejected.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Terminator written after the last chunk of a chunked body.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

const USER_AGENT: &str = concat!("cupsflow/", env!("CARGO_PKG_VERSION"));

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// How a request body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body at all.
    None,
    /// Exact length known up front.
    Length(usize),
    /// Streamed with chunked transfer coding.
    Chunked,
}

/// Serialised request line and headers.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub resource: String,
    pub host: String,
    pub framing: BodyFraming,
    pub content_type: Option<&'static str>,
}

impl RequestHead {
    pub fn post_ipp(resource: &str, host: &str, framing: BodyFraming) -> Self {
        Self {
            method: Method::Post,
            resource: resource.to_string(),
            host: host.to_string(),
            framing,
            content_type: Some("application/ipp"),
        }
    }

    pub fn get(resource: &str, host: &str) -> Self {
        Self {
            method: Method::Get,
            resource: resource.to_string(),
            host: host.to_string(),
            framing: BodyFraming::None,
            content_type: None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\n",
            self.method.as_str(),
            self.resource,
            self.host,
            USER_AGENT
        );
        if let Some(content_type) = self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        match self.framing {
            BodyFraming::None => {}
            BodyFraming::Length(len) => head.push_str(&format!("Content-Length: {len}\r\n")),
            BodyFraming::Chunked => head.push_str("Transfer-Encoding: chunked\r\n"),
        }
        head.push_str("\r\n");
        head.into_bytes()
    }
}

/// Frame `data` as one chunk of a chunked body.
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut buf = format!("{:x}\r\n", data.len()).into_bytes();
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
    buf
}

// ---------------------------------------------------------------------------
// Response head
// ---------------------------------------------------------------------------

/// Parsed status line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// First header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 1xx heads precede the real response and carry no body.
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    /// The body decoder this response calls for.
    pub fn body_decoder(&self) -> Result<BodyDecoder> {
        if matches!(self.status, 204 | 304) {
            return Ok(BodyDecoder::length(0));
        }
        let chunked = self
            .header("Transfer-Encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
        if chunked {
            return Ok(BodyDecoder::chunked());
        }
        match self.header("Content-Length") {
            Some(len) => len
                .trim()
                .parse()
                .map(BodyDecoder::length)
                .map_err(|_| CupsflowError::Http(format!("invalid Content-Length '{len}'"))),
            None => Ok(BodyDecoder::until_close()),
        }
    }
}

/// Try to parse a response head from the start of `buf`.
///
/// Returns `Ok(None)` until the blank line ending the head has arrived, and
/// otherwise the head plus the number of bytes it occupied.
pub fn parse_response_head(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>> {
    let Some(header_end) = find_subsequence(buf, b"\r\n\r\n") else {
        if buf.len() > MAX_HEAD_BYTES {
            return Err(CupsflowError::Http(format!(
                "response head exceeds {MAX_HEAD_BYTES} bytes"
            )));
        }
        return Ok(None);
    };

    let text = String::from_utf8_lossy(&buf[..header_end]);
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(CupsflowError::Http(format!("bad status line '{status_line}'")));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| CupsflowError::Http(format!("bad status line '{status_line}'")))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    Ok(Some((ResponseHead { status, reason, headers }, header_end + 4)))
}

/// Escape one path segment (a printer or class name) for a request target
/// or an `ipp://` URI.
pub fn path_segment(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Find the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ---------------------------------------------------------------------------
// Body decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChunkState {
    /// Accumulating a chunk-size line.
    Size(Vec<u8>),
    /// Inside chunk data with this many bytes left.
    Data(usize),
    /// Expecting the CRLF after chunk data; holds how many of it were seen.
    DataEnd(usize),
    /// Reading trailer lines after the last chunk.
    Trailer(Vec<u8>),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Framing {
    Length(usize),
    Chunked(ChunkState),
    UntilClose,
}

/// Incremental body decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDecoder {
    framing: Framing,
    eof: bool,
}

impl BodyDecoder {
    pub fn length(len: usize) -> Self {
        Self { framing: Framing::Length(len), eof: false }
    }

    pub fn chunked() -> Self {
        Self { framing: Framing::Chunked(ChunkState::Size(Vec::new())), eof: false }
    }

    pub fn until_close() -> Self {
        Self { framing: Framing::UntilClose, eof: false }
    }

    /// Whether the whole body has been seen.
    pub fn is_complete(&self) -> bool {
        match &self.framing {
            Framing::Length(remaining) => *remaining == 0,
            Framing::Chunked(state) => *state == ChunkState::Done,
            Framing::UntilClose => self.eof,
        }
    }

    /// Feed raw bytes, appending decoded body bytes to `out`.  Bytes past
    /// the end of the body are ignored.
    pub fn decode(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match &mut self.framing {
            Framing::Length(remaining) => {
                let take = input.len().min(*remaining);
                out.extend_from_slice(&input[..take]);
                *remaining -= take;
                Ok(())
            }
            Framing::UntilClose => {
                out.extend_from_slice(input);
                Ok(())
            }
            Framing::Chunked(state) => {
                while !input.is_empty() && *state != ChunkState::Done {
                    input = step_chunked(state, input, out)?;
                }
                Ok(())
            }
        }
    }

    /// The peer closed the connection.  Only bodies framed by close may end
    /// this way.
    pub fn finish(&mut self) -> Result<()> {
        self.eof = true;
        if self.is_complete() {
            Ok(())
        } else {
            Err(CupsflowError::Http("connection closed before end of body".into()))
        }
    }
}

/// Advance the chunked decoder by one step, returning the unread input.
fn step_chunked<'a>(
    state: &mut ChunkState,
    input: &'a [u8],
    out: &mut Vec<u8>,
) -> Result<&'a [u8]> {
    match state {
        ChunkState::Size(line) => {
            let Some(nl) = input.iter().position(|&b| b == b'\n') else {
                line.extend_from_slice(input);
                return Ok(&[]);
            };
            line.extend_from_slice(&input[..nl]);
            let text = String::from_utf8_lossy(line);
            // Chunk extensions follow a ';' and are ignored.
            let size_text = text.trim().split(';').next().unwrap_or_default().trim();
            let size = usize::from_str_radix(size_text, 16)
                .map_err(|_| CupsflowError::Http(format!("bad chunk size '{size_text}'")))?;
            *state = if size == 0 {
                ChunkState::Trailer(Vec::new())
            } else {
                ChunkState::Data(size)
            };
            Ok(&input[nl + 1..])
        }
        ChunkState::Data(remaining) => {
            let take = input.len().min(*remaining);
            out.extend_from_slice(&input[..take]);
            *remaining -= take;
            if *remaining == 0 {
                *state = ChunkState::DataEnd(0);
            }
            Ok(&input[take..])
        }
        ChunkState::DataEnd(seen) => {
            let expected = b"\r\n";
            if input[0] != expected[*seen] {
                return Err(CupsflowError::Http("missing CRLF after chunk data".into()));
            }
            *seen += 1;
            if *seen == expected.len() {
                *state = ChunkState::Size(Vec::new());
            }
            Ok(&input[1..])
        }
        ChunkState::Trailer(line) => {
            let Some(nl) = input.iter().position(|&b| b == b'\n') else {
                line.extend_from_slice(input);
                return Ok(&[]);
            };
            line.extend_from_slice(&input[..nl]);
            let blank = line.iter().all(|&b| b == b'\r');
            line.clear();
            if blank {
                *state = ChunkState::Done;
            }
            Ok(&input[nl + 1..])
        }
        ChunkState::Done => Ok(&[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_escape_reserved_characters() {
        assert_eq!(path_segment("Laser_Jet-2.0~a"), "Laser_Jet-2.0~a");
        assert_eq!(path_segment("Office Laser"), "Office%20Laser");
        assert_eq!(path_segment("a/b?c#d"), "a%2Fb%3Fc%23d");
        assert_eq!(path_segment("Büro"), "B%C3%BCro");
    }

    #[test]
    fn post_head_uses_chunked_or_length() {
        let head = RequestHead::post_ipp("/", "localhost:631", BodyFraming::Length(42)).encode();
        let text = String::from_utf8(head).unwrap();
        assert!(text.starts_with("POST / HTTP/1.1\r\n"));
        assert!(text.contains("Host: localhost:631\r\n"));
        assert!(text.contains("Content-Type: application/ipp\r\n"));
        assert!(text.contains("Content-Length: 42\r\n"));
        assert!(text.ends_with("\r\n\r\n"));

        let head = RequestHead::post_ipp("/printers/a", "h", BodyFraming::Chunked).encode();
        let text = String::from_utf8(head).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!text.contains("Content-Length"));
    }

    #[test]
    fn get_head_has_no_body_headers() {
        let text = String::from_utf8(RequestHead::get("/printers/a.ppd", "h").encode()).unwrap();
        assert!(text.starts_with("GET /printers/a.ppd HTTP/1.1\r\n"));
        assert!(!text.contains("Content-"));
    }

    #[test]
    fn head_incomplete_until_blank_line() {
        assert_eq!(parse_response_head(b"HTTP/1.1 200 OK\r\nServer: x\r\n").unwrap(), None);
    }

    #[test]
    fn head_parses_status_and_headers() {
        let raw = b"HTTP/1.1 404 Not Found\r\nContent-Length: 3\r\n\r\nabc";
        let (head, used) = parse_response_head(raw).unwrap().unwrap();
        assert_eq!(head.status, 404);
        assert_eq!(head.reason, "Not Found");
        assert_eq!(head.header("content-length"), Some("3"));
        assert_eq!(&raw[used..], b"abc");
        assert!(!head.is_success());
    }

    #[test]
    fn head_rejects_garbage() {
        assert!(parse_response_head(b"SMTP ready\r\n\r\n").is_err());
        let huge = vec![b'a'; MAX_HEAD_BYTES + 1];
        assert!(parse_response_head(&huge).is_err());
    }

    #[test]
    fn length_body_stops_at_length() {
        let mut dec = BodyDecoder::length(4);
        let mut out = Vec::new();
        dec.decode(b"ab", &mut out).unwrap();
        assert!(!dec.is_complete());
        dec.decode(b"cdEXTRA", &mut out).unwrap();
        assert!(dec.is_complete());
        assert_eq!(out, b"abcd");
    }

    #[test]
    fn chunked_body_across_arbitrary_splits() {
        let wire = b"4;ext=1\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Trailer: y\r\n\r\n";
        for split in 1..wire.len() {
            let mut dec = BodyDecoder::chunked();
            let mut out = Vec::new();
            dec.decode(&wire[..split], &mut out).unwrap();
            dec.decode(&wire[split..], &mut out).unwrap();
            assert!(dec.is_complete(), "split at {split}");
            assert_eq!(out, b"Wikipedia", "split at {split}");
        }
    }

    #[test]
    fn chunk_encoding_matches_decoder() {
        let mut wire = encode_chunk(b"hello");
        wire.extend_from_slice(LAST_CHUNK);
        let mut dec = BodyDecoder::chunked();
        let mut out = Vec::new();
        dec.decode(&wire, &mut out).unwrap();
        assert!(dec.is_complete());
        assert_eq!(out, b"hello");
    }

    #[test]
    fn bad_chunk_size_is_an_error() {
        let mut dec = BodyDecoder::chunked();
        assert!(dec.decode(b"zz\r\n", &mut Vec::new()).is_err());
    }

    #[test]
    fn close_delimited_body_completes_on_finish() {
        let mut dec = BodyDecoder::until_close();
        let mut out = Vec::new();
        dec.decode(b"data", &mut out).unwrap();
        assert!(!dec.is_complete());
        assert!(dec.finish().is_ok());
        assert!(dec.is_complete());

        let mut short = BodyDecoder::length(10);
        assert!(short.finish().is_err());
    }

    #[test]
    fn decoder_choice_follows_headers() {
        let (head, _) = parse_response_head(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .unwrap()
        .unwrap();
        assert_eq!(head.body_decoder().unwrap(), BodyDecoder::chunked());

        let (head, _) = parse_response_head(b"HTTP/1.0 200 OK\r\n\r\n").unwrap().unwrap();
        assert_eq!(head.body_decoder().unwrap(), BodyDecoder::until_close());
    }
}
