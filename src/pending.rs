//! Single-shot handle on a submitted non-search operation.

use crate::connection::{lock_state, ConnState};
use crate::error::{Error, Result};
use crate::protocol::{result_code, MessageId, OperationKind};
use crate::transport::PollOutcome;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Result of an add, compare, delete, modify or rename that has been sent
/// but not yet read back.
///
/// The server result is only consumed when [`fetch`](Self::fetch) is called.
/// A handle that is never fetched leaves its result buffered in the
/// transport until the connection is closed.
pub struct PendingOperation {
    conn: Arc<Mutex<ConnState>>,
    message_id: MessageId,
    kind: OperationKind,
    resolved: bool,
}

impl PendingOperation {
    pub(crate) fn new(conn: Arc<Mutex<ConnState>>, message_id: MessageId, kind: OperationKind) -> Self {
        Self {
            conn,
            message_id,
            kind,
            resolved: false,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Wait up to `timeout` for the result. `None` falls back to the
    /// connection's request timeout and blocks when the connection has none.
    ///
    /// Returns `Ok(true)` for success and compare-true, `Ok(false)` for
    /// compare-false, and a soft error for timeouts, local polling failures
    /// and server rejections. A timeout or polling failure leaves the handle
    /// open so the caller may try again; any server result resolves it.
    pub fn fetch(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if self.resolved {
            return Err(Error::AlreadyResolved);
        }
        let outcome = {
            let mut state = lock_state(&self.conn);
            let transport = state.transport.as_mut().ok_or(Error::ConnectionClosed)?;
            transport.poll_result(self.message_id, timeout)
        };
        let result = match outcome {
            PollOutcome::Message(result) => result,
            PollOutcome::Timeout => return Err(Error::Timeout),
            PollOutcome::Error(message) => {
                debug!("Poll failed for msgid={}: {}", self.message_id, message);
                return Err(Error::Transport(message));
            }
        };
        self.resolved = true;
        debug!(
            "Fetched {} result: msgid={} rc={}",
            self.kind, self.message_id, result.result_code
        );
        if result.kind != self.kind {
            return Err(Error::ResultKindMismatch {
                expected: self.kind.name(),
                got: result.kind.name(),
            });
        }
        match result.result_code {
            result_code::SUCCESS | result_code::COMPARE_TRUE => Ok(true),
            result_code::COMPARE_FALSE => Ok(false),
            code => Err(Error::Rejected {
                code,
                text: result.error_text(),
            }),
        }
    }

    /// Block until the result arrives, consuming the handle.
    pub fn wait(mut self) -> Result<bool> {
        self.fetch(None)
    }
}

impl std::fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperation")
            .field("message_id", &self.message_id)
            .field("kind", &self.kind)
            .field("resolved", &self.resolved)
            .finish()
    }
}
