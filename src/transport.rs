//! Directory transport seam.
//!
//! Connection establishment, encoding and network I/O live behind these
//! traits. The dispatcher, pending operations and search cursors only see
//! message ids and decoded messages.

use crate::changeset::ChangeSet;
use crate::protocol::{
    CompareRequest, MessageId, ModifyDNRequest, OperationResult, SearchRequest, SearchResultEntry,
};
use std::fmt;
use std::time::Duration;

#[cfg(test)]
pub(crate) mod scripted;

/// Options applied while establishing a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Negotiate StartTLS right after connect.
    pub starttls: bool,
    /// Connect timeout and default poll timeout. `None` blocks.
    pub timeout: Option<Duration>,
}

/// A failed connect, bind or submit, with the server result code when one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub code: Option<u32>,
    pub message: String,
}

impl TransportFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportFailure {}

/// Outcome of one blocking poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Message(T),
    Timeout,
    /// Local failure while polling, not a server result.
    Error(String),
}

/// One message from a search response chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMessage {
    Entry(SearchResultEntry),
    Referral(Vec<String>),
    Done(OperationResult),
    /// Anything the chain should never carry; the string names it.
    Unexpected(String),
}

pub trait Connector {
    /// Connect to the first reachable URI of a whitespace separated list.
    fn connect(
        &self,
        uris: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Transport + Send>, TransportFailure>;
}

pub trait Transport {
    fn set_protocol_version(&mut self, version: i32) -> Result<(), TransportFailure>;

    /// Blocking simple bind.
    fn bind_simple(&mut self, who: &str, password: &str) -> Result<(), TransportFailure>;

    fn submit_add(&mut self, dn: &str, changes: &ChangeSet<'_>) -> Result<MessageId, TransportFailure>;

    fn submit_delete(&mut self, dn: &str) -> Result<MessageId, TransportFailure>;

    fn submit_compare(&mut self, request: &CompareRequest) -> Result<MessageId, TransportFailure>;

    fn submit_modify(&mut self, dn: &str, changes: &ChangeSet<'_>) -> Result<MessageId, TransportFailure>;

    fn submit_rename(&mut self, request: &ModifyDNRequest) -> Result<MessageId, TransportFailure>;

    fn submit_search(&mut self, request: &SearchRequest) -> Result<MessageId, TransportFailure>;

    /// Retrieve exactly the result for `id`. `None` falls back to the
    /// transport's own request timeout, if it has one. A timeout keeps the
    /// result retrievable.
    fn poll_result(&mut self, id: MessageId, timeout: Option<Duration>) -> PollOutcome<OperationResult>;

    /// Retrieve the next message of search `id`.
    fn poll_next_message(&mut self, id: MessageId, timeout: Option<Duration>) -> PollOutcome<SearchMessage>;

    /// Stop delivering messages for a search that will not be drained.
    fn abandon(&mut self, id: MessageId);

    fn unbind(&mut self);
}
