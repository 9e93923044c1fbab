//! Connections and the operation dispatcher.
//!
//! Every operation checks that the connection is open, validates its
//! arguments, builds a change-set where needed, submits through the
//! transport and hands back a [`PendingOperation`] or [`SearchCursor`].
//! Nothing waits for the server except [`Connection::bind_simple`].

use crate::backend::Ldap3Connector;
use crate::changeset::{ChangeSet, MAX_ATTRS};
use crate::error::{Error, Result};
use crate::pending::PendingOperation;
use crate::protocol::{
    result_code, CompareRequest, ModifyDNRequest, ModifyOperation, OperationKind, SearchScope,
    LDAP_VERSION3,
};
use crate::search::{SearchCriteria, SearchCursor};
use crate::transport::{ConnectOptions, Connector, Transport, TransportFailure};
use crate::value::Table;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(1);

/// State shared by a connection and the handles created from it.
pub(crate) struct ConnState {
    /// `None` once closed.
    pub(crate) transport: Option<Box<dyn Transport + Send>>,
    pub(crate) version: i32,
    pub(crate) max_attrs: usize,
    pub(crate) default_scope: SearchScope,
}

/// Unbinds a connection that was never closed explicitly. Runs once the
/// `Connection` and every `PendingOperation` made from it are gone.
impl Drop for ConnState {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            debug!("Unbinding dropped LDAP connection");
            transport.unbind();
        }
    }
}

/// Lock the shared state. A poisoned lock still guards consistent data
/// because no operation leaves it half-updated.
pub(crate) fn lock_state(state: &Mutex<ConnState>) -> MutexGuard<'_, ConnState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Seconds to a duration; zero, negative or non-finite means block.
pub(crate) fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Bare host names become `ldap://` URIs; anything with a scheme passes through.
pub fn normalize_uris(host_or_uri: &str) -> String {
    if host_or_uri.contains("://") {
        return host_or_uri.to_string();
    }
    host_or_uri
        .split_whitespace()
        .map(|host| format!("ldap://{}", host))
        .collect::<Vec<_>>()
        .join(" ")
}

fn submission_error(failure: TransportFailure) -> Error {
    Error::Rejected {
        code: failure.code.unwrap_or(result_code::OTHER),
        text: failure.message,
    }
}

/// Optional parts of a rename.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameOptions<'a> {
    /// New parent DN; `None` keeps the entry under its current parent.
    pub new_parent: Option<&'a str>,
    /// Drop the old RDN value from the entry.
    pub delete_old_rdn: bool,
}

pub struct Connection {
    inner: Arc<Mutex<ConnState>>,
    id: usize,
}

impl Connection {
    /// Connect to `host_or_uri`, set protocol version 3 and optionally StartTLS.
    pub fn open(host_or_uri: &str, use_tls: bool, timeout_secs: Option<f64>) -> Result<Self> {
        Self::open_with(&Ldap3Connector::default(), host_or_uri, use_tls, timeout_secs)
    }

    pub fn open_with(
        connector: &dyn Connector,
        host_or_uri: &str,
        use_tls: bool,
        timeout_secs: Option<f64>,
    ) -> Result<Self> {
        let options = ConnectOptions {
            starttls: use_tls,
            timeout: timeout_secs.and_then(timeout_from_secs),
        };
        Self::establish(connector, &normalize_uris(host_or_uri), &options)
    }

    /// `open` followed by `bind_simple`. Missing credentials bind anonymously.
    pub fn open_simple(
        host_or_uri: &str,
        who: Option<&str>,
        password: Option<&str>,
        use_tls: bool,
        timeout_secs: Option<f64>,
    ) -> Result<Self> {
        Self::open_simple_with(
            &Ldap3Connector::default(),
            host_or_uri,
            who,
            password,
            use_tls,
            timeout_secs,
        )
    }

    pub fn open_simple_with(
        connector: &dyn Connector,
        host_or_uri: &str,
        who: Option<&str>,
        password: Option<&str>,
        use_tls: bool,
        timeout_secs: Option<f64>,
    ) -> Result<Self> {
        let conn = Self::open_with(connector, host_or_uri, use_tls, timeout_secs)?;
        conn.bind_simple(who.unwrap_or(""), password.unwrap_or(""))?;
        Ok(conn)
    }

    /// Connect to `uri` exactly as given, without host normalization or StartTLS.
    pub fn initialize(uri: &str) -> Result<Self> {
        Self::initialize_with(&Ldap3Connector::default(), uri)
    }

    pub fn initialize_with(connector: &dyn Connector, uri: &str) -> Result<Self> {
        Self::establish(connector, uri, &ConnectOptions::default())
    }

    fn establish(connector: &dyn Connector, uris: &str, options: &ConnectOptions) -> Result<Self> {
        let mut transport = connector
            .connect(uris, options)
            .map_err(|f| Error::Connect(f.message))?;
        transport
            .set_protocol_version(LDAP_VERSION3)
            .map_err(|f| Error::Connect(format!("Error setting LDAP version: {}", f.message)))?;
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        info!("LDAP connection {} established to {}", id, uris);
        Ok(Self {
            inner: Arc::new(Mutex::new(ConnState {
                transport: Some(transport),
                version: LDAP_VERSION3,
                max_attrs: MAX_ATTRS,
                default_scope: SearchScope::WholeSubtree,
            })),
            id,
        })
    }

    pub fn is_closed(&self) -> bool {
        lock_state(&self.inner).transport.is_none()
    }

    pub fn protocol_version(&self) -> i32 {
        lock_state(&self.inner).version
    }

    /// Ceiling on modifications per add/modify and on requested search attributes.
    pub fn set_max_attrs(&self, max_attrs: usize) {
        lock_state(&self.inner).max_attrs = max_attrs.max(1);
    }

    pub fn set_default_scope(&self, scope: SearchScope) {
        lock_state(&self.inner).default_scope = scope;
    }

    /// Unbind and release the transport. `false` when already closed.
    pub fn close(&self) -> bool {
        let transport = lock_state(&self.inner).transport.take();
        match transport {
            Some(mut transport) => {
                transport.unbind();
                info!("LDAP connection {} closed", self.id);
                true
            }
            None => false,
        }
    }

    /// Synchronous simple bind; returns the connection for chaining.
    pub fn bind_simple(&self, who: &str, password: &str) -> Result<&Self> {
        let mut state = lock_state(&self.inner);
        let transport = state.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        debug!("Simple bind: who={}", who);
        transport
            .bind_simple(who, password)
            .map_err(|f| Error::Bind(f.message))?;
        Ok(self)
    }

    /// Add `dn` with the attributes in `attrs`. An empty table is allowed.
    ///
    /// The change-set keeps the caller's value order, but the ldap3 transport
    /// sends each attribute's values as a set: duplicates collapse and the
    /// wire order is unspecified.
    pub fn add(&self, dn: &str, attrs: &Table) -> Result<PendingOperation> {
        let mut state = lock_state(&self.inner);
        let max_attrs = state.max_attrs;
        let transport = state.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        let changes = ChangeSet::build(&[(ModifyOperation::Add, attrs)], max_attrs)?;
        let id = transport.submit_add(dn, &changes).map_err(submission_error)?;
        debug!("Submitted ADD: dn={} attrs={} msgid={}", dn, changes.len(), id);
        Ok(PendingOperation::new(Arc::clone(&self.inner), id, OperationKind::Add))
    }

    pub fn compare(&self, dn: &str, attribute: &str, value: impl AsRef<[u8]>) -> Result<PendingOperation> {
        let mut state = lock_state(&self.inner);
        let transport = state.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        let request = CompareRequest {
            entry: dn.to_string(),
            attribute: attribute.to_string(),
            value: value.as_ref().to_vec(),
        };
        let id = transport.submit_compare(&request).map_err(submission_error)?;
        debug!("Submitted COMPARE: dn={} attr={} msgid={}", dn, attribute, id);
        Ok(PendingOperation::new(Arc::clone(&self.inner), id, OperationKind::Compare))
    }

    pub fn delete(&self, dn: &str) -> Result<PendingOperation> {
        let mut state = lock_state(&self.inner);
        let transport = state.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        let id = transport.submit_delete(dn).map_err(submission_error)?;
        debug!("Submitted DELETE: dn={} msgid={}", dn, id);
        Ok(PendingOperation::new(Arc::clone(&self.inner), id, OperationKind::Delete))
    }

    /// Apply modification groups to `dn`.
    ///
    /// Each group carries its sigil (`+`, `-` or `=`) at positional index 1
    /// and attributes under named keys. Groups are numbered from 1 in
    /// [`Error::MissingOperation`]. As with [`add`](Self::add), the ldap3
    /// transport sends values as a set, so duplicates collapse.
    pub fn modify(&self, dn: &str, groups: &[Table]) -> Result<PendingOperation> {
        let mut state = lock_state(&self.inner);
        let max_attrs = state.max_attrs;
        let transport = state.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        if groups.is_empty() {
            return Err(Error::MissingOperation { position: 1 });
        }
        let pairs = groups
            .iter()
            .enumerate()
            .map(|(i, group)| {
                group
                    .get_index(1)
                    .and_then(|v| v.as_bytes())
                    .and_then(ModifyOperation::from_sigil)
                    .map(|op| (op, group))
                    .ok_or(Error::MissingOperation { position: i + 1 })
            })
            .collect::<Result<Vec<_>>>()?;
        let changes = ChangeSet::build(&pairs, max_attrs)?;
        let id = transport.submit_modify(dn, &changes).map_err(submission_error)?;
        debug!("Submitted MODIFY: dn={} mods={} msgid={}", dn, changes.len(), id);
        Ok(PendingOperation::new(Arc::clone(&self.inner), id, OperationKind::Modify))
    }

    pub fn rename(&self, dn: &str, new_rdn: &str, options: RenameOptions<'_>) -> Result<PendingOperation> {
        let mut state = lock_state(&self.inner);
        let transport = state.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        let request = ModifyDNRequest {
            entry: dn.to_string(),
            new_rdn: new_rdn.to_string(),
            delete_old_rdn: options.delete_old_rdn,
            new_superior: options.new_parent.map(str::to_string),
        };
        let id = transport.submit_rename(&request).map_err(submission_error)?;
        debug!("Submitted MODDN: dn={} newrdn={} msgid={}", dn, new_rdn, id);
        Ok(PendingOperation::new(Arc::clone(&self.inner), id, OperationKind::Rename))
    }

    /// Start a search. A submission failure is fatal here, unlike the other verbs.
    pub fn search(&self, criteria: &SearchCriteria) -> Result<SearchCursor> {
        let mut state = lock_state(&self.inner);
        let (max_attrs, default_scope) = (state.max_attrs, state.default_scope);
        let transport = state.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        let request = criteria.to_request(default_scope, max_attrs)?;
        let id = transport
            .submit_search(&request)
            .map_err(|f| Error::Submit(f.message))?;
        debug!(
            "Submitted SEARCH: base={} scope={:?} filter={} msgid={}",
            request.base_object, request.scope, request.filter, id
        );
        Ok(SearchCursor::new(Arc::downgrade(&self.inner), id))
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_closed() {
            write!(f, "LDAP connection (closed)")
        } else {
            write!(f, "LDAP connection ({})", self.id)
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::AttributeValue;
    use crate::protocol::OperationResult;
    use crate::transport::scripted::{ScriptedConnector, Submitted};
    use crate::transport::PollOutcome;
    use crate::value::Value;
    use std::borrow::Cow;

    fn connect() -> (ScriptedConnector, Connection) {
        let connector = ScriptedConnector::new();
        let conn = Connection::open_with(&connector, "localhost", false, None).unwrap();
        (connector, conn)
    }

    #[test]
    fn test_normalize_uris() {
        assert_eq!(normalize_uris("localhost"), "ldap://localhost");
        assert_eq!(normalize_uris("a.example:389 b.example"), "ldap://a.example:389 ldap://b.example");
        assert_eq!(normalize_uris("ldaps://secure.example"), "ldaps://secure.example");
        assert_eq!(normalize_uris("ldapi://%2Fvar%2Frun%2Fslapd"), "ldapi://%2Fvar%2Frun%2Fslapd");
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(timeout_from_secs(0.0), None);
        assert_eq!(timeout_from_secs(-1.0), None);
        assert_eq!(timeout_from_secs(f64::NAN), None);
        assert_eq!(timeout_from_secs(1.5), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_open_sets_version_and_options() {
        let connector = ScriptedConnector::new();
        let conn = Connection::open_with(&connector, "ldap1 ldap2", true, Some(2.0)).unwrap();
        assert_eq!(conn.protocol_version(), 3);
        let state = connector.state();
        assert_eq!(state.version, Some(3));
        let (uris, options) = &state.connected[0];
        assert_eq!(uris, "ldap://ldap1 ldap://ldap2");
        assert!(options.starttls);
        assert_eq!(options.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_open_failures() {
        let connector = ScriptedConnector::new();
        connector.state().connect_failure = Some(TransportFailure::new("Can't contact LDAP server"));
        let err = Connection::open_with(&connector, "nowhere", false, None).unwrap_err();
        assert_eq!(err, Error::Connect("Can't contact LDAP server".into()));

        let connector = ScriptedConnector::new();
        connector.state().version_failure = Some(TransportFailure::new("unsupported"));
        let err = Connection::open_with(&connector, "localhost", false, None).unwrap_err();
        assert!(err.to_string().starts_with("Error setting LDAP version"));
    }

    #[test]
    fn test_initialize_skips_normalization() {
        let connector = ScriptedConnector::new();
        let conn = Connection::initialize_with(&connector, "localhost").unwrap();
        assert!(!conn.is_closed());
        let state = connector.state();
        assert_eq!(state.connected[0].0, "localhost");
        assert!(!state.connected[0].1.starttls);
    }

    #[test]
    fn test_open_simple_binds_with_defaults() {
        let connector = ScriptedConnector::new();
        Connection::open_simple_with(&connector, "localhost", None, None, false, None).unwrap();
        assert_eq!(connector.state().binds, vec![(String::new(), String::new())]);
    }

    #[test]
    fn test_open_simple_bind_failure() {
        let connector = ScriptedConnector::new();
        connector.state().bind_failure = Some(TransportFailure::with_code(49, "Invalid credentials"));
        let err = Connection::open_simple_with(
            &connector,
            "localhost",
            Some("cn=admin,dc=example"),
            Some("wrong"),
            false,
            None,
        )
        .unwrap_err();
        assert_eq!(err, Error::Bind("Invalid credentials".into()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_open_simple_stops_on_connect_failure() {
        let connector = ScriptedConnector::new();
        connector.state().connect_failure = Some(TransportFailure::new("down"));
        assert!(Connection::open_simple_with(&connector, "x", Some("a"), Some("b"), false, None).is_err());
        assert!(connector.state().binds.is_empty());
    }

    #[test]
    fn test_bind_chains() {
        let (connector, conn) = connect();
        let same = conn.bind_simple("cn=a", "pw").unwrap();
        assert!(std::ptr::eq(same, &conn));
        assert_eq!(connector.state().binds[0], ("cn=a".to_string(), "pw".to_string()));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (connector, conn) = connect();
        assert!(conn.to_string().starts_with("LDAP connection ("));
        assert!(conn.close());
        assert!(connector.state().unbound);
        assert!(!conn.close());
        assert!(conn.is_closed());
        assert_eq!(conn.to_string(), "LDAP connection (closed)");
    }

    #[test]
    fn test_operations_on_closed_connection() {
        let (_connector, conn) = connect();
        conn.close();
        assert_eq!(conn.add("cn=x", &Table::new()).unwrap_err(), Error::ConnectionClosed);
        assert_eq!(conn.delete("cn=x").unwrap_err(), Error::ConnectionClosed);
        assert_eq!(conn.compare("cn=x", "cn", "x").unwrap_err(), Error::ConnectionClosed);
        assert_eq!(conn.modify("cn=x", &[]).unwrap_err(), Error::ConnectionClosed);
        assert_eq!(
            conn.rename("cn=x", "cn=y", RenameOptions::default()).unwrap_err(),
            Error::ConnectionClosed
        );
        assert_eq!(conn.search(&SearchCriteria::new()).unwrap_err(), Error::ConnectionClosed);
        assert_eq!(conn.bind_simple("", "").unwrap_err(), Error::ConnectionClosed);
    }

    #[test]
    fn test_add_end_to_end() {
        let (connector, conn) = connect();
        let attrs = Table::new()
            .with("cn", "test")
            .with("objectClass", vec!["top", "person"]);
        let op = conn.add("cn=test,dc=example", &attrs).unwrap();
        assert!(op.wait().unwrap());

        let state = connector.state();
        match &state.submitted[0] {
            Submitted::Add { dn, changes } => {
                assert_eq!(dn, "cn=test,dc=example");
                assert_eq!(changes.len(), 2);
                assert_eq!(
                    changes[0],
                    (
                        ModifyOperation::Add,
                        "cn".to_string(),
                        AttributeValue::Single(Cow::Owned(b"test".to_vec()))
                    )
                );
                assert_eq!(changes[1].1, "objectClass");
                assert_eq!(changes[1].2.values(), vec![&b"top"[..], &b"person"[..]]);
            }
            other => panic!("unexpected submission {:?}", other),
        }
    }

    #[test]
    fn test_add_invalid_value_is_not_submitted() {
        let (connector, conn) = connect();
        let attrs = Table::new().with("uidNumber", Value::Int(1000));
        let err = conn.add("cn=x", &attrs).unwrap_err();
        assert!(err.is_fatal());
        assert!(connector.state().submitted.is_empty());
    }

    #[test]
    fn test_modify_groups() {
        let (connector, conn) = connect();
        let groups = [
            Table::new().push("=").with("mail", "new@example.com"),
            Table::new().push("-").with("description", true),
            Table::new().push("+").with("member", vec!["cn=a", "cn=b"]),
        ];
        assert!(conn.modify("cn=x", &groups).unwrap().wait().unwrap());
        let state = connector.state();
        match &state.submitted[0] {
            Submitted::Modify { changes, .. } => {
                let ops: Vec<_> = changes.iter().map(|(op, name, _)| (*op, name.as_str())).collect();
                assert_eq!(
                    ops,
                    vec![
                        (ModifyOperation::Replace, "mail"),
                        (ModifyOperation::Delete, "description"),
                        (ModifyOperation::Add, "member"),
                    ]
                );
                assert_eq!(changes[1].2, AttributeValue::Absent);
            }
            other => panic!("unexpected submission {:?}", other),
        }
    }

    #[test]
    fn test_modify_missing_sigil() {
        let (connector, conn) = connect();
        assert_eq!(conn.modify("cn=x", &[]).unwrap_err(), Error::MissingOperation { position: 1 });

        let groups = [
            Table::new().push("+").with("mail", "a@example.com"),
            Table::new().with("mail", "b@example.com"),
        ];
        assert_eq!(
            conn.modify("cn=x", &groups).unwrap_err(),
            Error::MissingOperation { position: 2 }
        );

        let groups = [Table::new().push("?").with("mail", "a@example.com")];
        assert_eq!(
            conn.modify("cn=x", &groups).unwrap_err(),
            Error::MissingOperation { position: 1 }
        );
        assert!(connector.state().submitted.is_empty());
    }

    #[test]
    fn test_modify_capacity_across_groups() {
        let (_connector, conn) = connect();
        conn.set_max_attrs(3);
        let groups = [
            Table::new().push("-").with("a", true).with("b", true),
            Table::new().push("-").with("c", true).with("d", true),
        ];
        assert_eq!(conn.modify("cn=x", &groups).unwrap_err(), Error::TooManyAttributes);
    }

    #[test]
    fn test_rename_defaults_and_parent() {
        let (connector, conn) = connect();
        conn.rename("cn=a,dc=example", "cn=b", RenameOptions::default()).unwrap();
        conn.rename(
            "cn=a,dc=example",
            "cn=b",
            RenameOptions { new_parent: Some("ou=moved,dc=example"), delete_old_rdn: true },
        )
        .unwrap();
        let state = connector.state();
        assert_eq!(
            state.submitted[0],
            Submitted::Rename(ModifyDNRequest {
                entry: "cn=a,dc=example".into(),
                new_rdn: "cn=b".into(),
                delete_old_rdn: false,
                new_superior: None,
            })
        );
        match &state.submitted[1] {
            Submitted::Rename(req) => {
                assert!(req.delete_old_rdn);
                assert_eq!(req.new_superior.as_deref(), Some("ou=moved,dc=example"));
            }
            other => panic!("unexpected submission {:?}", other),
        }
    }

    #[test]
    fn test_compare_is_binary_safe() {
        let (connector, conn) = connect();
        conn.compare("cn=x", "userCertificate", [0u8, 1, 2]).unwrap();
        match &connector.state().submitted[0] {
            Submitted::Compare(req) => assert_eq!(req.value, vec![0u8, 1, 2]),
            other => panic!("unexpected submission {:?}", other),
        };
    }

    #[test]
    fn test_submission_failure_is_soft_except_search() {
        let (connector, conn) = connect();
        connector.state().submit_failure = Some(TransportFailure::with_code(52, "Server is unavailable"));
        let err = conn.delete("cn=x").unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.result_code(), Some(52));
        let err = conn.search(&SearchCriteria::new()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_search_default_scope_and_invalid_scope() {
        let (connector, conn) = connect();
        conn.set_default_scope(SearchScope::SingleLevel);
        conn.search(&SearchCriteria::new()).unwrap();
        match &connector.state().submitted[0] {
            Submitted::Search(req) => assert_eq!(req.scope, SearchScope::SingleLevel),
            other => panic!("unexpected submission {:?}", other),
        }
        let err = conn.search(&SearchCriteria::new().scope("tree")).unwrap_err();
        assert_eq!(err, Error::InvalidScope("tree".into()));
    }

    #[test]
    fn test_interleaved_operations_keep_their_ids() {
        let (connector, conn) = connect();
        let mut first = conn.delete("cn=a").unwrap();
        let mut second = conn.delete("cn=b").unwrap();
        assert_ne!(first.message_id(), second.message_id());
        connector.push_result(
            first.message_id(),
            PollOutcome::Message(OperationResult::new(OperationKind::Delete, 32)),
        );
        connector.push_result(
            second.message_id(),
            PollOutcome::Message(OperationResult::new(OperationKind::Delete, result_code::SUCCESS)),
        );

        assert!(second.fetch(None).unwrap());
        let err = first.fetch(None).unwrap_err();
        assert_eq!(err.result_code(), Some(32));
        assert_eq!(err.to_string(), "No such object");
        let polled: Vec<_> = connector.state().polls.iter().map(|(id, _)| *id).collect();
        assert_eq!(polled, vec![second.message_id(), first.message_id()]);
    }

    #[test]
    fn test_drop_unbinds_once_handles_are_gone() {
        let (connector, conn) = connect();
        let op = conn.delete("cn=a").unwrap();
        drop(conn);
        assert!(!connector.state().unbound);
        assert!(op.wait().unwrap());
        assert!(connector.state().unbound);

        let (connector, conn) = connect();
        conn.close();
        connector.state().unbound = false;
        drop(conn);
        assert!(!connector.state().unbound);
    }
}
