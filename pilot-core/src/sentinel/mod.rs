//! Sentinel address resolution and configuration rendering.
//!
//! - [`SentinelQuery`]: asks a running sentinel quorum where the primary is
//! - [`RedisCliSentinel`]: the query implemented by shelling out to `redis-cli`
//! - [`SentinelConf`]: renders and writes `sentinel.conf`

mod cli;
mod conf;

pub use cli::RedisCliSentinel;
pub use conf::SentinelConf;

use crate::error::{PilotError, PilotResult};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Primary address as reported by sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MasterRecord {
    /// Primary host.
    pub host: String,
    /// Primary port.
    pub port: u16,
}

impl MasterRecord {
    /// Create a new record.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for MasterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A boxed future for async sentinel queries.
pub type SentinelFuture<'a, T> = Pin<Box<dyn Future<Output = PilotResult<T>> + Send + 'a>>;

/// Resolves the current primary address from a sentinel quorum.
pub trait SentinelQuery: Send + Sync {
    /// Ask sentinel for the address of `master_name`.
    ///
    /// `Ok(None)` means sentinel answered but knows no primary by that name.
    /// Implementations must bound the call; a hung query is reported as
    /// [`PilotError::SentinelTimeout`].
    fn master_addr<'a>(&'a self, master_name: &'a str) -> SentinelFuture<'a, Option<MasterRecord>>;
}

/// Parse the CSV reply of `SENTINEL get-master-addr-by-name`.
///
/// An empty reply or a nil reply means no primary is known. Otherwise the
/// first line must hold exactly two fields, host and port.
pub fn parse_reply(output: &str) -> PilotResult<Option<MasterRecord>> {
    let line = match output.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => line,
        None => return Ok(None),
    };

    if line.eq_ignore_ascii_case("NULL") || line == "(nil)" {
        return Ok(None);
    }
    if line.starts_with("ERR") || line.starts_with("(error)") {
        return Err(PilotError::SentinelReply(line.to_string()));
    }

    let fields = split_csv(line)?;
    if fields.len() != 2 {
        return Err(PilotError::SentinelReply(format!(
            "expected 2 fields, got {}: {}",
            fields.len(),
            line
        )));
    }

    let host = fields[0].clone();
    if host.is_empty() {
        return Err(PilotError::SentinelReply(format!("empty host: {}", line)));
    }
    let port = fields[1]
        .parse::<u16>()
        .map_err(|e| PilotError::SentinelReply(format!("invalid port {:?}: {}", fields[1], e)))?;

    Ok(Some(MasterRecord { host, port }))
}

/// Split one CSV record. Fields may be double-quoted; `""` escapes a quote.
fn split_csv(line: &str) -> PilotResult<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', false) if field.is_empty() => quoted = true,
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => {
                quoted = false;
                match chars.peek() {
                    None | Some(',') => {}
                    Some(other) => {
                        return Err(PilotError::SentinelReply(format!(
                            "unexpected {:?} after closing quote: {}",
                            other, line
                        )));
                    }
                }
            }
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }

    if quoted {
        return Err(PilotError::SentinelReply(format!(
            "unterminated quote: {}",
            line
        )));
    }
    fields.push(field);
    Ok(fields)
}
