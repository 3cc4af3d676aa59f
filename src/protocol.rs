//!
//! ferry wire protocol
//! -------------------
//! The request side of the protocol is plain whitespace-tokenized text,
//! newline-insensitive: clients send `ls`, `get <name>` or
//! `put <name> <size>` in a single write, with or without a trailing
//! newline. Responses are newline-terminated lines; the multi-line `ls`
//! listing is terminated by a sentinel line containing a single `.` so a
//! client never has to infer completion from a quiet socket. Blob names may
//! contain spaces; the trailing token of `put` is always the size.

use chrono::{DateTime, Utc};

use crate::error::Error;

/// Maximum bytes moved per socket read/write during payload streaming, and
/// the bound on a single command read.
pub const CHUNK_SIZE: usize = 4096;

/// Sentinel line closing every non-error `ls` response. Listing rows always
/// begin with a 12-column size field, so the sentinel cannot collide.
pub const END_OF_LISTING: &str = ".";

/// One parsed command. Never outlives the servicing of a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List,
    Get { name: String },
    Put { name: String, size: u64 },
}

/// Parse one command line. Failures carry the exact wire reason.
pub fn parse_request(line: &str) -> Result<Request, Error> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let command = match parts.first() {
        Some(t) => t.to_ascii_lowercase(),
        None => return Err(Error::protocol("Unknown command")),
    };
    match command.as_str() {
        "ls" => Ok(Request::List),
        "get" => {
            if parts.len() < 2 {
                return Err(Error::protocol("Invalid GET format"));
            }
            Ok(Request::Get { name: parts[1..].join(" ") })
        }
        "put" => {
            if parts.len() < 3 {
                return Err(Error::protocol("Invalid PUT format"));
            }
            let size = parts[parts.len() - 1]
                .parse::<u64>()
                .map_err(|_| Error::protocol("Invalid filesize"))?;
            Ok(Request::Put { name: parts[1..parts.len() - 1].join(" "), size })
        }
        _ => Err(Error::protocol("Unknown command")),
    }
}

/// Reduce a caller-supplied name to a single path segment. Both separator
/// styles are stripped; names that reduce to nothing (or to a dot entry)
/// are rejected so a blob can never address outside the storage root.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let segment = raw
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    if segment.is_empty() || segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// One `ls` row: fixed-width size, formatted timestamp, name.
pub fn format_listing_row(size: u64, modified: DateTime<Utc>, name: &str) -> String {
    format!("{:>12} {} {}", size, modified.format("%Y-%m-%d %H:%M:%S"), name)
}
