//! # Wire Protocol
//!
//! Purpose: Shared constants for the line-based request protocol spoken between
//! clients and the server.
//!
//! ## Framing
//!
//! ```text
//! one connection = one request line + one response line
//!
//! request : <verb>[;<field>]*\n
//! response: <text>\n
//! ```
//!
//! | Verb | Request                          | Response                               |
//! |------|----------------------------------|----------------------------------------|
//! | `q`  | `q;<country>;<indicator>[;year]` | `<country>;<indicator>[;year];<values>`|
//! | `r`  | `r;<indicator>`                  | `<country>;<mean>;...`                 |
//! | `s`  | `s`                              | server status text                     |
//! | `z`  | `z`                              | shutdown confirmation                  |

/// Separator between fields of a request or response line.
pub const FIELD_SEPARATOR: char = ';';

/// Terminator of request and response lines.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Upper bound on the length of a single request line, in bytes.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Verb for a single-indicator query.
pub const VERB_QUERY: &str = "q";
/// Verb for a per-country mean report.
pub const VERB_REPORT: &str = "r";
/// Verb for the server status summary.
pub const VERB_STATUS: &str = "s";
/// Verb that stops the server.
pub const VERB_SHUTDOWN: &str = "z";

/// Response to an unknown verb.
pub const RESPONSE_ERROR: &str = "Error";

/// Response to a known verb carrying the wrong number of fields.
///
/// The leading space is part of the wire format.
pub const RESPONSE_BAD_ARGUMENTS: &str = " Bad arguments";

/// Splits a request line into fields.
///
/// A trailing line terminator is stripped and trailing empty fields are
/// dropped, so `"q;DEU;\r\n"` yields `["q", "DEU"]`.
pub fn split_fields(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields: Vec<String> = line.split(FIELD_SEPARATOR).map(str::to_owned).collect();
    while fields.last().is_some_and(|field| field.is_empty()) {
        fields.pop();
    }
    fields
}
