// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP message model on top of the `ipp` crate.
//
// The wire encoding (RFC 8010 §3) is the ipp crate's: `IppRequestResponse`
// serialises the header and attribute groups, `IppParser` reads them back.
// `IppMessage` keeps the parts the request state machine needs in a form it
// can clone into a `CupsResult` and hand to callbacks: the raw 16-bit code
// (CUPS answers with status codes the crate's `StatusCode` enum lacks) and
// the attribute groups.

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};

use ipp::attribute::{IppAttribute, IppAttributeGroup, IppAttributes};
use ipp::model::{DelimiterTag, IppVersion, Operation, StatusCode};
use ipp::parser::IppParser;
use ipp::reader::IppReader;
use ipp::request::IppRequestResponse;
use ipp::value::IppValue;
use tracing::debug;

use cupsflow_core::error::{CupsflowError, Result};

/// Largest name or value a 2-byte length prefix can describe.
const MAX_FIELD: usize = u16::MAX as usize;

static NEXT_REQUEST_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate a request-id.  Ids are unique per process and never zero.
pub fn next_request_id() -> u32 {
    loop {
        let id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        if id != 0 {
            return id;
        }
    }
}

/// A complete IPP request or response (without document data).
#[derive(Debug, Clone)]
pub struct IppMessage {
    /// Operation-id in requests, status-code in responses.
    pub code: u16,
    pub request_id: u32,
    attributes: IppAttributes,
}

impl IppMessage {
    /// A request with the mandatory charset and language attributes.
    pub fn new_request(operation: Operation, language: &str) -> Self {
        let mut msg = Self {
            code: operation as u16,
            request_id: next_request_id(),
            attributes: IppAttributes::new(),
        };
        msg.add_value(
            DelimiterTag::OperationAttributes,
            "attributes-charset",
            IppValue::Charset("utf-8".to_string()),
        )
        .add_value(
            DelimiterTag::OperationAttributes,
            "attributes-natural-language",
            IppValue::NaturalLanguage(language.to_string()),
        );
        msg
    }

    /// A response shell with the given status code.
    pub fn new_response(status: u16, request_id: u32) -> Self {
        Self {
            code: status,
            request_id,
            attributes: IppAttributes::new(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.code
    }

    pub fn groups(&self) -> &[IppAttributeGroup] {
        self.attributes.groups()
    }

    /// First group with the given delimiter.
    pub fn group(&self, tag: DelimiterTag) -> Option<&IppAttributeGroup> {
        self.groups().iter().find(|g| g.tag() == tag)
    }

    /// All groups with the given delimiter, in order.
    pub fn groups_of(&self, tag: DelimiterTag) -> impl Iterator<Item = &IppAttributeGroup> {
        self.groups().iter().filter(move |g| g.tag() == tag)
    }

    /// `status-message` from the operation attributes, if present.
    pub fn status_message(&self) -> Option<&str> {
        self.group(DelimiterTag::OperationAttributes)
            .and_then(|g| g.get_string("status-message"))
    }

    /// Add an attribute to the most recent group with this delimiter, or to
    /// a new group if there is none.  A second attribute with the same name
    /// replaces the first.
    pub fn add(&mut self, group: DelimiterTag, attribute: IppAttribute) -> &mut Self {
        let groups = self.attributes.groups_mut();
        let index = match groups.iter().rposition(|g| g.tag() == group) {
            Some(index) => index,
            None => {
                groups.push(IppAttributeGroup::new(group));
                groups.len() - 1
            }
        };
        groups[index]
            .attributes_mut()
            .insert(attribute.name().to_string(), attribute);
        self
    }

    /// Start a new, empty group even if one with the same tag exists.
    /// Used by responses that list several jobs or printers.
    pub fn begin_group(&mut self, group: DelimiterTag) -> &mut Self {
        self.attributes.groups_mut().push(IppAttributeGroup::new(group));
        self
    }

    pub fn add_value(&mut self, group: DelimiterTag, name: &str, value: IppValue) -> &mut Self {
        self.add(group, IppAttribute::new(name, value))
    }

    pub fn add_name(&mut self, group: DelimiterTag, name: &str, value: &str) -> &mut Self {
        self.add_value(group, name, IppValue::NameWithoutLanguage(value.to_string()))
    }

    /// A 1setOf keyword; a single keyword is sent as a plain value.
    pub fn add_keywords(&mut self, group: DelimiterTag, name: &str, values: &[&str]) -> &mut Self {
        let mut keywords: Vec<IppValue> = values
            .iter()
            .map(|v| IppValue::Keyword((*v).to_string()))
            .collect();
        let value = if keywords.len() == 1 {
            keywords.remove(0)
        } else {
            IppValue::Array(keywords)
        };
        self.add_value(group, name, value)
    }

    pub fn add_integer(&mut self, group: DelimiterTag, name: &str, value: i32) -> &mut Self {
        self.add_value(group, name, IppValue::Integer(value))
    }

    pub fn add_enum(&mut self, group: DelimiterTag, name: &str, value: i32) -> &mut Self {
        self.add_value(group, name, IppValue::Enum(value))
    }

    pub fn add_boolean(&mut self, group: DelimiterTag, name: &str, value: bool) -> &mut Self {
        self.add_value(group, name, IppValue::Boolean(value))
    }

    /// Serialise header and attribute groups.  Document data is not part of
    /// the message; the request state machine streams it afterwards.
    ///
    /// Names and string values longer than a 2-byte length field are
    /// rejected rather than truncated on the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        for group in self.groups() {
            for attribute in group.attributes().values() {
                let too_long = attribute.name().len() > MAX_FIELD
                    || value_str(attribute.value()).is_some_and(|s| s.len() > MAX_FIELD);
                if too_long {
                    return Err(CupsflowError::IppEncode(format!(
                        "attribute '{}' exceeds {MAX_FIELD} bytes",
                        attribute.name()
                    )));
                }
            }
        }

        let mut wire = IppRequestResponse::new_response(
            IppVersion::v1_1(),
            StatusCode::SuccessfulOk,
            self.request_id,
        );
        wire.header_mut().operation_or_status = self.code;
        *wire.attributes_mut() = self.attributes.clone();
        Ok(wire.to_bytes().to_vec())
    }

    /// Parse a message from the start of `data`.  Trailing document data is
    /// left to the caller.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let parser = IppParser::new(IppReader::new(Cursor::new(data.to_vec())));
        let parsed = parser.parse().map_err(|e| {
            debug!(error = %e, len = data.len(), "IPP message did not parse");
            CupsflowError::IppDecode(e.to_string())
        })?;
        let header = parsed.header();
        Ok(Self {
            code: header.operation_or_status,
            request_id: header.request_id,
            attributes: parsed.attributes().clone(),
        })
    }
}

/// Typed lookups on an attribute group.
pub trait AttributeGroupExt {
    fn get(&self, name: &str) -> Option<&IppAttribute>;

    /// First textual value, whatever its string type.
    fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|a| value_str(a.value()))
    }

    /// Integer or enum value.
    fn get_integer(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(|a| value_integer(a.value()))
    }

    fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name).map(IppAttribute::value) {
            Some(IppValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Every string value of a 1setOf attribute.
    fn get_strings(&self, name: &str) -> Vec<String> {
        match self.get(name).map(IppAttribute::value) {
            Some(IppValue::Array(values)) => values
                .iter()
                .filter_map(value_str)
                .map(str::to_string)
                .collect(),
            Some(value) => value_str(value).map(str::to_string).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl AttributeGroupExt for IppAttributeGroup {
    fn get(&self, name: &str) -> Option<&IppAttribute> {
        self.attributes().get(name)
    }
}

/// Text of any string-typed value; the first element of a 1setOf.
pub fn value_str(value: &IppValue) -> Option<&str> {
    match value {
        IppValue::TextWithoutLanguage(s)
        | IppValue::NameWithoutLanguage(s)
        | IppValue::Keyword(s)
        | IppValue::Uri(s)
        | IppValue::Charset(s)
        | IppValue::NaturalLanguage(s)
        | IppValue::MimeMediaType(s) => Some(s),
        IppValue::TextWithLanguage { text, .. } => Some(text),
        IppValue::NameWithLanguage { name, .. } => Some(name),
        IppValue::Array(values) => values.first().and_then(value_str),
        _ => None,
    }
}

fn value_integer(value: &IppValue) -> Option<i32> {
    match value {
        IppValue::Integer(v) | IppValue::Enum(v) => Some(*v),
        IppValue::Array(values) => values.first().and_then(value_integer),
        _ => None,
    }
}
