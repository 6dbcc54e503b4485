// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cupsflow IPP: the wire formats spoken to a CUPS server.  IPP messages are
// encoded by the `ipp` crate; this crate adds the CUPS option-string grammar
// and just enough HTTP/1.1 framing to carry both over a non-blocking socket.

pub mod http;
pub mod message;
pub mod options;
pub mod status;

pub use ipp::attribute::{IppAttribute, IppAttributeGroup};
pub use ipp::model::{DelimiterTag, Operation};
pub use ipp::value::IppValue;
pub use message::{AttributeGroupExt, IppMessage};
pub use options::{OptionTag, encode_option, find_option_tag};
