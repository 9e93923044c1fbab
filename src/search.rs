//! Search criteria and the pull-based cursor over a search response.

use crate::changeset::AttributeValue;
use crate::connection::{lock_state, timeout_from_secs, ConnState};
use crate::error::{Error, Result};
use crate::protocol::{MessageId, OperationResult, SearchRequest, SearchResultEntry, SearchScope};
use crate::transport::{PollOutcome, SearchMessage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, Weak};
use std::time::Duration;
use tracing::debug;

/// Filter used when the caller supplies none.
pub const DEFAULT_FILTER: &str = "(objectClass=*)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrList {
    One(String),
    Many(Vec<String>),
}

impl AttrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            AttrList::One(a) => vec![a],
            AttrList::Many(v) => v,
        }
    }
}

/// Search options. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    /// Base DN (default empty, the root DSE's naming context is up to the server).
    pub base: Option<String>,
    /// "base", "onelevel" or "subtree"; only the first character is significant.
    pub scope: Option<String>,
    /// Default `(objectClass=*)`.
    pub filter: Option<String>,
    /// Attributes to return. None means all user attributes.
    pub attrs: Option<AttrList>,
    /// Return attribute names without values.
    pub attrsonly: bool,
    /// Maximum entries; 0 or none means no limit.
    pub sizelimit: Option<i32>,
    /// Server-side time limit in seconds, rounded up; 0 or none means no limit.
    pub timeout: Option<f64>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn attrs<S: Into<String>>(mut self, attrs: impl IntoIterator<Item = S>) -> Self {
        self.attrs = Some(AttrList::Many(attrs.into_iter().map(Into::into).collect()));
        self
    }

    /// Resolve defaults and validate into a wire request.
    pub fn to_request(&self, default_scope: SearchScope, max_attrs: usize) -> Result<SearchRequest> {
        let scope = parse_scope(self.scope.as_deref())?.unwrap_or(default_scope);
        let attributes = self.attrs.clone().map(AttrList::into_vec).unwrap_or_default();
        if attributes.len() + 1 > max_attrs {
            return Err(Error::TooManyArguments);
        }
        let time_limit = self
            .timeout
            .and_then(timeout_from_secs)
            .map(|d| d.as_secs_f64().ceil().min(i32::MAX as f64) as i32)
            .unwrap_or(0);
        Ok(SearchRequest {
            base_object: self.base.clone().unwrap_or_default(),
            scope,
            size_limit: self.sizelimit.unwrap_or(0).max(0),
            time_limit,
            types_only: self.attrsonly,
            filter: self.filter.clone().unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            attributes,
        })
    }
}

/// Map a scope name to a scope by its first character.
///
/// `None` or an empty string selects the connection default.
pub fn parse_scope(scope: Option<&str>) -> Result<Option<SearchScope>> {
    let scope = match scope {
        None => return Ok(None),
        Some(s) => s,
    };
    match scope.chars().next() {
        None => Ok(None),
        Some('b') => Ok(Some(SearchScope::BaseObject)),
        Some('o') => Ok(Some(SearchScope::SingleLevel)),
        Some('s') => Ok(Some(SearchScope::WholeSubtree)),
        Some(_) => Err(Error::InvalidScope(scope.to_string())),
    }
}

/// Decoded search entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attributes: BTreeMap<String, AttributeValue<'static>>,
}

impl Entry {
    pub fn get(&self, name: &str) -> Option<&AttributeValue<'static>> {
        self.attributes.get(name)
    }
}

/// No values decode to `Absent`, one to `Single`, more to `Multi` in server order.
pub fn decode_entry(entry: SearchResultEntry) -> Entry {
    let attributes = entry
        .attributes
        .into_iter()
        .map(|attr| (attr.attr_type, AttributeValue::from_values(attr.attr_values)))
        .collect();
    Entry {
        dn: entry.object_name,
        attributes,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchItem {
    Entry(Entry),
    Referral(Vec<String>),
    Done,
}

/// Cursor over one search response. Holds the connection weakly.
pub struct SearchCursor {
    conn: Option<Weak<Mutex<ConnState>>>,
    message_id: MessageId,
    summary: Option<OperationResult>,
}

impl SearchCursor {
    pub(crate) fn new(conn: Weak<Mutex<ConnState>>, message_id: MessageId) -> Self {
        Self {
            conn: Some(conn),
            message_id,
            summary: None,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Terminal search result, once the chain has been drained.
    pub fn summary(&self) -> Option<&OperationResult> {
        self.summary.as_ref()
    }

    /// Pull the next entry, referral or the terminal `Done`.
    pub fn next_item(&mut self, timeout: Option<Duration>) -> Result<SearchItem> {
        let weak = self.conn.as_ref().ok_or(Error::SearchClosed)?;
        let conn = weak.upgrade().ok_or(Error::ConnectionClosed)?;
        let outcome = {
            let mut state = lock_state(&conn);
            let transport = state.transport.as_mut().ok_or(Error::ConnectionClosed)?;
            transport.poll_next_message(self.message_id, timeout)
        };
        match outcome {
            PollOutcome::Timeout => Err(Error::Timeout),
            PollOutcome::Error(message) => {
                debug!("Search poll failed for msgid={}: {}", self.message_id, message);
                Err(Error::Transport(message))
            }
            PollOutcome::Message(SearchMessage::Entry(entry)) => Ok(SearchItem::Entry(decode_entry(entry))),
            PollOutcome::Message(SearchMessage::Referral(uris)) => Ok(SearchItem::Referral(uris)),
            PollOutcome::Message(SearchMessage::Done(result)) => {
                debug!(
                    "Search done: msgid={} rc={}",
                    self.message_id, result.result_code
                );
                self.conn = None;
                self.summary = Some(result);
                Ok(SearchItem::Done)
            }
            PollOutcome::Message(SearchMessage::Unexpected(what)) => Err(Error::SearchChain(what)),
        }
    }

    /// Close early. Returns `false` when there was nothing to do.
    pub fn close(&mut self) -> bool {
        let weak = match self.conn.take() {
            Some(weak) => weak,
            None => return false,
        };
        if let Some(conn) = weak.upgrade() {
            let mut state = lock_state(&conn);
            if let Some(transport) = state.transport.as_mut() {
                transport.abandon(self.message_id);
            }
        }
        debug!("Search closed early: msgid={}", self.message_id);
        true
    }
}

impl Drop for SearchCursor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Yields entries and referrals, ending at `Done`. Each poll waits up to the
/// connection's request timeout.
impl Iterator for SearchCursor {
    type Item = Result<SearchItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_closed() {
            return None;
        }
        match self.next_item(None) {
            Ok(SearchItem::Done) => None,
            other => Some(other),
        }
    }
}

impl fmt::Display for SearchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_closed() {
            write!(f, "LDAP search (closed)")
        } else {
            write!(f, "LDAP search ({})", self.message_id)
        }
    }
}

impl fmt::Debug for SearchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchCursor")
            .field("message_id", &self.message_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
