//! Scripted sentinel.

use crate::error::PilotError;
use crate::sentinel::{MasterRecord, SentinelFuture, SentinelQuery};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
enum Reply {
    Known(Option<MasterRecord>),
    Failing(String),
}

/// Sentinel that returns whatever the test last set.
///
/// Starts out unreachable.
#[derive(Debug)]
pub struct StaticSentinel {
    reply: Mutex<Reply>,
    calls: AtomicUsize,
}

impl Default for StaticSentinel {
    fn default() -> Self {
        Self::unreachable()
    }
}

impl StaticSentinel {
    /// Sentinel that reports `host:port` as the primary.
    pub fn reporting(host: impl Into<String>, port: u16) -> Self {
        Self::with_reply(Reply::Known(Some(MasterRecord::new(host, port))))
    }

    /// Sentinel that knows no primary.
    pub fn empty() -> Self {
        Self::with_reply(Reply::Known(None))
    }

    /// Sentinel whose queries fail.
    pub fn unreachable() -> Self {
        Self::with_reply(Reply::Failing("connection refused".into()))
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
        }
    }

    /// Change the reported primary.
    pub fn set_master(&self, record: Option<MasterRecord>) {
        *self.reply.lock() = Reply::Known(record);
    }

    /// Make subsequent queries fail.
    pub fn set_unreachable(&self) {
        *self.reply.lock() = Reply::Failing("connection refused".into());
    }

    /// Number of queries served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SentinelQuery for StaticSentinel {
    fn master_addr<'a>(&'a self, _master_name: &'a str) -> SentinelFuture<'a, Option<MasterRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.reply.lock().clone() {
            Reply::Known(record) => Ok(record),
            Reply::Failing(msg) => Err(PilotError::SentinelTransport(msg)),
        };
        Box::pin(std::future::ready(result))
    }
}
