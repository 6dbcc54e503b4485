// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS option encoder.
//
// Print settings arrive as flat `name=value` strings (the `-o` syntax of
// `lp`).  Well-known option names have a fixed IPP type; everything else is
// a boolean when the value spells one, otherwise a name or a list of names.
// Numeric parsing is deliberately permissive: malformed input yields 0, the
// way `strtol` does, instead of an error.

use std::cmp::Ordering;

use ipp::attribute::IppAttribute;
use ipp::value::IppValue;

/// Resolution units on the wire (RFC 8010 §3.9).
pub const UNITS_PER_INCH: i8 = 3;
pub const UNITS_PER_CM: i8 = 4;

/// IPP type of a well-known option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionTag {
    Integer,
    Enum,
    Boolean,
    Keyword,
    RangeOfInteger,
    Resolution,
    /// Not in the table; the value decides between boolean and name.
    Unknown,
}

/// Option name → IPP type.  Must stay sorted by ASCII-lowercase name.
static IPP_OPTIONS: &[(&str, OptionTag)] = &[
    ("blackplot", OptionTag::Boolean),
    ("brightness", OptionTag::Integer),
    ("columns", OptionTag::Integer),
    ("copies", OptionTag::Integer),
    ("finishings", OptionTag::Enum),
    ("fitplot", OptionTag::Boolean),
    ("gamma", OptionTag::Integer),
    ("hue", OptionTag::Integer),
    ("job-k-limit", OptionTag::Integer),
    ("job-page-limit", OptionTag::Integer),
    ("job-priority", OptionTag::Integer),
    ("job-quota-period", OptionTag::Integer),
    ("landscape", OptionTag::Boolean),
    ("media", OptionTag::Keyword),
    ("mirror", OptionTag::Boolean),
    ("natural-scaling", OptionTag::Integer),
    ("number-up", OptionTag::Integer),
    ("orientation-requested", OptionTag::Enum),
    ("page-bottom", OptionTag::Integer),
    ("page-left", OptionTag::Integer),
    ("page-ranges", OptionTag::RangeOfInteger),
    ("page-right", OptionTag::Integer),
    ("page-top", OptionTag::Integer),
    ("penwidth", OptionTag::Integer),
    ("ppi", OptionTag::Integer),
    ("prettyprint", OptionTag::Boolean),
    ("print-quality", OptionTag::Enum),
    ("printer-resolution", OptionTag::Resolution),
    ("saturation", OptionTag::Integer),
    ("scaling", OptionTag::Integer),
    ("sides", OptionTag::Keyword),
    ("wrap", OptionTag::Boolean),
];

fn cmp_ignore_ascii_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// Look up the IPP type of a well-known option.  Unknown names yield
/// [`OptionTag::Unknown`].
pub fn find_option_tag(option: &str) -> OptionTag {
    IPP_OPTIONS
        .binary_search_by(|(name, _)| cmp_ignore_ascii_case(name, option))
        .map(|i| IPP_OPTIONS[i].1)
        .unwrap_or(OptionTag::Unknown)
}

/// Encode `option=value` as a job attribute of the proper wire type.
pub fn encode_option(option: &str, value: &str) -> IppAttribute {
    let tag = match find_option_tag(option) {
        OptionTag::Unknown
            if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") =>
        {
            OptionTag::Boolean
        }
        tag => tag,
    };

    let value = match tag {
        OptionTag::Integer => IppValue::Integer(parse_integer(value).0),
        OptionTag::Enum => IppValue::Enum(parse_integer(value).0),
        OptionTag::Boolean => IppValue::Boolean(parse_boolean(value)),
        OptionTag::RangeOfInteger => {
            let (min, max) = parse_range(value);
            IppValue::RangeOfInteger { min, max }
        }
        OptionTag::Resolution => {
            let (cross_feed, feed, units) = parse_resolution(value);
            IppValue::Resolution { cross_feed, feed, units }
        }
        OptionTag::Keyword => string_values(value, IppValue::Keyword),
        OptionTag::Unknown => string_values(value, IppValue::NameWithoutLanguage),
    };
    IppAttribute::new(option, value)
}

/// One value, or a 1setOf when the input lists several.
fn string_values(value: &str, make: fn(String) -> IppValue) -> IppValue {
    let mut values: Vec<IppValue> = split_values(value).into_iter().map(make).collect();
    if values.len() == 1 {
        values.remove(0)
    } else {
        IppValue::Array(values)
    }
}

/// `true`, `on`, and `yes` (any case) are true; everything else is false.
pub fn parse_boolean(value: &str) -> bool {
    ["true", "on", "yes"]
        .iter()
        .any(|t| value.eq_ignore_ascii_case(t))
}

/// Parse a leading integer the way `strtol(value, &end, 0)` does: optional
/// whitespace and sign, then `0x` hex, `0` octal, or decimal digits.
///
/// Returns the value and the unparsed remainder.  When no digits are found
/// the value is 0 and the remainder is the whole input.  Out-of-range values
/// saturate at the `i32` bounds.
pub fn parse_integer(value: &str) -> (i32, &str) {
    let bytes = value.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }

    let mut negative = false;
    if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
        negative = bytes[pos] == b'-';
        pos += 1;
    }

    let has_hex_prefix = bytes.len() > pos + 2
        && bytes[pos] == b'0'
        && (bytes[pos + 1] | 0x20) == b'x'
        && bytes[pos + 2].is_ascii_hexdigit();

    let (radix, start) = if has_hex_prefix {
        (16, pos + 2)
    } else if pos < bytes.len() && bytes[pos] == b'0' {
        (8, pos)
    } else {
        (10, pos)
    };

    let mut end = start;
    let mut acc: i64 = 0;
    while end < bytes.len() {
        let Some(digit) = (bytes[end] as char).to_digit(radix) else {
            break;
        };
        acc = acc.saturating_mul(i64::from(radix)).saturating_add(i64::from(digit));
        end += 1;
    }

    if end == start {
        return (0, value);
    }

    let signed = if negative { -acc } else { acc };
    let clamped = signed.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    (clamped, &value[end..])
}

/// Parse `N`, `N-`, `N-M`, or `-M`.  An open lower bound is 1, an open upper
/// bound is `i32::MAX`.
pub fn parse_range(value: &str) -> (i32, i32) {
    let (lower, rest) = if value.starts_with('-') {
        (1, value)
    } else {
        parse_integer(value)
    };

    let upper = match rest.strip_prefix('-') {
        Some("") => i32::MAX,
        Some(tail) => parse_integer(tail).0,
        None => lower,
    };

    (lower, upper)
}

/// Parse `NxM` or `N` followed by an optional unit suffix.  `dpc` selects
/// dots per centimetre; anything else means dots per inch.
pub fn parse_resolution(value: &str) -> (i32, i32, i8) {
    let (xres, rest) = parse_integer(value);

    let (yres, rest) = match rest.strip_prefix('x') {
        Some(tail) => parse_integer(tail),
        None => (xres, rest),
    };

    let units = if rest.eq_ignore_ascii_case("dpc") {
        UNITS_PER_CM
    } else {
        UNITS_PER_INCH
    };

    (xres, yres, units)
}

/// Split a value list on commas that are neither quoted nor escaped.
///
/// Single and double quotes group text (and are removed); outside quotes a
/// backslash takes the next character literally.
pub fn split_values(value: &str) -> Vec<String> {
    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut values = Vec::new();
    let mut current = String::new();
    let mut quote = Quote::None;
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' if quote != Quote::Double => {
                quote = if quote == Quote::Single { Quote::None } else { Quote::Single };
            }
            '"' if quote != Quote::Single => {
                quote = if quote == Quote::Double { Quote::None } else { Quote::Double };
            }
            ',' if quote == Quote::None => values.push(std::mem::take(&mut current)),
            '\\' if quote == Quote::None => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push('\\'),
            },
            other => current.push(other),
        }
    }

    values.push(current);
    values
}
