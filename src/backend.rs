use crate::changeset::ChangeSet;
use crate::protocol::{
    Attribute, CompareRequest, MessageId, ModifyDNRequest, ModifyOperation, OperationKind,
    OperationResult, SearchRequest, SearchResultEntry, APP_SEARCH_RESULT_ENTRY,
    APP_SEARCH_RESULT_REFERENCE, LDAP_VERSION3,
};
use crate::transport::{ConnectOptions, Connector, PollOutcome, SearchMessage, Transport, TransportFailure};
use ldap3::asn1::StructureTag;
use ldap3::result::LdapError;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, SearchOptions};
use rustls::ClientConfig;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type OpReply = std::result::Result<OperationResult, String>;
type SearchReply = std::result::Result<SearchMessage, String>;

/// Opens ldap3 connections. Holds the TLS settings used for ldaps:// and StartTLS.
#[derive(Clone, Default)]
pub struct Ldap3Connector {
    tls_config: Option<Arc<ClientConfig>>,
    /// When true, server certificates are not verified (internal/test only).
    skip_verify: bool,
}

impl Ldap3Connector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    pub fn with_skip_verify(mut self, skip_verify: bool) -> Self {
        self.skip_verify = skip_verify;
        self
    }

    fn settings(&self, options: &ConnectOptions) -> LdapConnSettings {
        let mut settings = LdapConnSettings::new()
            .set_starttls(options.starttls)
            .set_no_tls_verify(self.skip_verify);
        if let Some(timeout) = options.timeout {
            settings = settings.set_conn_timeout(timeout);
        }
        if let Some(config) = &self.tls_config {
            settings = settings.set_config(Arc::clone(config));
        }
        settings
    }
}

impl Connector for Ldap3Connector {
    fn connect(
        &self,
        uris: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Transport + Send>, TransportFailure> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ldap-ops-io")
            .enable_all()
            .build()
            .map_err(|e| TransportFailure::new(format!("Failed to start I/O runtime: {}", e)))?;
        let mut last_failure = TransportFailure::new("No LDAP URI given");
        for uri in uris.split_whitespace() {
            debug!("Connecting to {} (starttls={})", uri, options.starttls);
            match runtime.block_on(connect_one(uri, self.settings(options))) {
                Ok(ldap) => {
                    info!("Connected to {}", uri);
                    return Ok(Box::new(Ldap3Transport::new(runtime, ldap, options.timeout)));
                }
                Err(failure) => {
                    warn!("Failed to connect to {}: {}", uri, failure);
                    last_failure = failure;
                }
            }
        }
        Err(last_failure)
    }
}

async fn connect_one(uri: &str, settings: LdapConnSettings) -> Result<Ldap, TransportFailure> {
    let (conn, ldap) = LdapConnAsync::with_settings(settings, uri)
        .await
        .map_err(ldap_failure)?;
    tokio::spawn(async move {
        if let Err(e) = conn.drive().await {
            warn!("LDAP connection error: {}", e);
        }
    });
    Ok(ldap)
}

/// Decoded failure text for an ldap3 error; server results keep their code.
fn ldap_failure(err: LdapError) -> TransportFailure {
    match err {
        LdapError::LdapResult { result } => {
            let text = OperationResult::new(OperationKind::Add, result.rc)
                .with_diagnostic(result.text)
                .error_text();
            TransportFailure::with_code(result.rc, text)
        }
        other => TransportFailure::new(other.to_string()),
    }
}

fn operation_result(kind: OperationKind, res: LdapResult) -> OperationResult {
    OperationResult {
        kind,
        result_code: res.rc,
        matched_dn: res.matched,
        diagnostic_message: res.text,
        referrals: res.refs,
    }
}

/// SearchResultEntry ::= [APPLICATION 4] SEQUENCE { objectName, attributes }.
/// Values stay binary and in server order.
fn entry_from_tag(tag: StructureTag) -> Option<SearchResultEntry> {
    let mut parts = tag.match_id(APP_SEARCH_RESULT_ENTRY)?.expect_constructed()?.into_iter();
    let object_name = String::from_utf8(parts.next()?.expect_primitive()?).ok()?;
    let mut attributes = Vec::new();
    if let Some(list) = parts.next() {
        for attr in list.expect_constructed()? {
            let mut attr = attr.expect_constructed()?.into_iter();
            let attr_type = String::from_utf8(attr.next()?.expect_primitive()?).ok()?;
            let attr_values = attr
                .next()?
                .expect_constructed()?
                .into_iter()
                .map(StructureTag::expect_primitive)
                .collect::<Option<Vec<_>>>()?;
            attributes.push(Attribute { attr_type, attr_values });
        }
    }
    Some(SearchResultEntry { object_name, attributes })
}

/// SearchResultReference ::= [APPLICATION 19] SEQUENCE OF URI.
fn referral_uris(tag: StructureTag) -> Option<Vec<String>> {
    tag.match_id(APP_SEARCH_RESULT_REFERENCE)?
        .expect_constructed()?
        .into_iter()
        .map(|uri| uri.expect_primitive().and_then(|b| String::from_utf8(b).ok()))
        .collect()
}

/// ldap3 takes values as a set; order and duplicates are lost here.
fn attribute_values(values: Vec<&[u8]>) -> HashSet<Vec<u8>> {
    values.into_iter().map(<[u8]>::to_vec).collect()
}

struct SearchChannel {
    rx: mpsc::UnboundedReceiver<SearchReply>,
    cancel: Option<oneshot::Sender<()>>,
}

/// ldap3 handle driven on a private runtime so callers can block on it.
///
/// Message ids are allocated locally; each submitted request runs as its own
/// task and parks its result until polled for that id. The request timeout
/// bounds each poll, never the request itself, so a timed out result can
/// still be fetched later.
pub struct Ldap3Transport {
    runtime: Runtime,
    ldap: Ldap,
    request_timeout: Option<Duration>,
    next_id: MessageId,
    pending: HashMap<MessageId, oneshot::Receiver<OpReply>>,
    searches: HashMap<MessageId, SearchChannel>,
    failed_searches: HashMap<MessageId, String>,
}

impl Ldap3Transport {
    fn new(runtime: Runtime, ldap: Ldap, request_timeout: Option<Duration>) -> Self {
        Self {
            runtime,
            ldap,
            request_timeout,
            next_id: 0,
            pending: HashMap::new(),
            searches: HashMap::new(),
            failed_searches: HashMap::new(),
        }
    }

    fn allocate_id(&mut self) -> MessageId {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }

    /// Run `op` to completion in the background and park its result under a new id.
    fn spawn_op<F>(&mut self, kind: OperationKind, op: F) -> MessageId
    where
        F: Future<Output = ldap3::result::Result<LdapResult>> + Send + 'static,
    {
        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.runtime.spawn(async move {
            let res = op.await;
            let _ = tx.send(res.map(|r| operation_result(kind, r)).map_err(|e| e.to_string()));
        });
        self.pending.insert(id, rx);
        id
    }

    /// The caller's timeout, else the connection's request timeout.
    fn poll_timeout(&self, timeout: Option<Duration>) -> Option<Duration> {
        timeout.or(self.request_timeout)
    }

    /// Remember why a search chain broke so later polls report the same thing.
    fn fail_search(&mut self, id: MessageId, message: String) -> PollOutcome<SearchMessage> {
        self.searches.remove(&id);
        self.failed_searches.insert(id, message.clone());
        PollOutcome::Error(message)
    }
}

impl Transport for Ldap3Transport {
    fn set_protocol_version(&mut self, version: i32) -> Result<(), TransportFailure> {
        if version == LDAP_VERSION3 {
            Ok(())
        } else {
            Err(TransportFailure::new(format!("LDAP version {} not supported", version)))
        }
    }

    fn bind_simple(&mut self, who: &str, password: &str) -> Result<(), TransportFailure> {
        let mut ldap = self.ldap.clone();
        let timeout = self.request_timeout;
        let res = self.runtime.block_on(async move {
            match timeout {
                Some(t) => match tokio::time::timeout(t, ldap.simple_bind(who, password)).await {
                    Ok(res) => res.map_err(ldap_failure),
                    Err(_) => Err(TransportFailure::new("bind timed out")),
                },
                None => ldap.simple_bind(who, password).await.map_err(ldap_failure),
            }
        })?;
        if res.rc == 0 {
            Ok(())
        } else {
            Err(ldap_failure(LdapError::LdapResult { result: res }))
        }
    }

    fn submit_add(&mut self, dn: &str, changes: &ChangeSet<'_>) -> Result<MessageId, TransportFailure> {
        let attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = changes
            .modifications()
            .iter()
            .map(|m| (m.attribute_name.as_bytes().to_vec(), attribute_values(m.value.values())))
            .collect();
        let mut ldap = self.ldap.clone();
        let dn = dn.to_string();
        Ok(self.spawn_op(OperationKind::Add, async move { ldap.add(&dn, attrs).await }))
    }

    fn submit_delete(&mut self, dn: &str) -> Result<MessageId, TransportFailure> {
        let mut ldap = self.ldap.clone();
        let dn = dn.to_string();
        Ok(self.spawn_op(OperationKind::Delete, async move { ldap.delete(&dn).await }))
    }

    fn submit_compare(&mut self, request: &CompareRequest) -> Result<MessageId, TransportFailure> {
        let mut ldap = self.ldap.clone();
        let request = request.clone();
        Ok(self.spawn_op(OperationKind::Compare, async move {
            ldap.compare(&request.entry, &request.attribute, request.value)
                .await
                .map(|r| r.0)
        }))
    }

    fn submit_modify(&mut self, dn: &str, changes: &ChangeSet<'_>) -> Result<MessageId, TransportFailure> {
        let mods: Vec<Mod<Vec<u8>>> = changes
            .modifications()
            .iter()
            .map(|m| {
                let name = m.attribute_name.as_bytes().to_vec();
                let values = attribute_values(m.value.values());
                match m.op {
                    ModifyOperation::Add => Mod::Add(name, values),
                    ModifyOperation::Delete => Mod::Delete(name, values),
                    ModifyOperation::Replace => Mod::Replace(name, values),
                }
            })
            .collect();
        let mut ldap = self.ldap.clone();
        let dn = dn.to_string();
        Ok(self.spawn_op(OperationKind::Modify, async move { ldap.modify(&dn, mods).await }))
    }

    fn submit_rename(&mut self, request: &ModifyDNRequest) -> Result<MessageId, TransportFailure> {
        let mut ldap = self.ldap.clone();
        let request = request.clone();
        Ok(self.spawn_op(OperationKind::Rename, async move {
            ldap.modifydn(
                &request.entry,
                &request.new_rdn,
                request.delete_old_rdn,
                request.new_superior.as_deref(),
            )
            .await
        }))
    }

    fn submit_search(&mut self, request: &SearchRequest) -> Result<MessageId, TransportFailure> {
        let mut ldap = self.ldap.clone();
        let request = request.clone();
        let mut stream = self
            .runtime
            .block_on(async move {
                ldap.with_search_options(
                    SearchOptions::new()
                        .typesonly(request.types_only)
                        .sizelimit(request.size_limit)
                        .timelimit(request.time_limit),
                );
                let scope: ldap3::Scope = request.scope.into();
                ldap.streaming_search(&request.base_object, scope, &request.filter, request.attributes)
                    .await
            })
            .map_err(ldap_failure)?;
        let server_id = stream.ldap_handle().last_id();
        let id = self.allocate_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let mut abandon_handle = self.ldap.clone();
        self.runtime.spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = &mut cancel_rx => {
                        debug!("Abandoning search: msgid={}", id);
                        let _ = abandon_handle.abandon(server_id).await;
                        return;
                    }
                    next = stream.next() => next,
                };
                let message = match next {
                    Ok(Some(entry)) if entry.is_ref() => match referral_uris(entry.0) {
                        Some(uris) => SearchMessage::Referral(uris),
                        None => SearchMessage::Unexpected("malformed search reference".to_string()),
                    },
                    Ok(Some(entry)) if entry.is_intermediate() => {
                        SearchMessage::Unexpected("intermediate response".to_string())
                    }
                    Ok(Some(entry)) => match entry_from_tag(entry.0) {
                        Some(e) => SearchMessage::Entry(e),
                        None => SearchMessage::Unexpected("malformed search entry".to_string()),
                    },
                    Ok(None) => {
                        let res = stream.finish().await;
                        let _ = tx.send(Ok(SearchMessage::Done(operation_result(OperationKind::Search, res))));
                        return;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e.to_string()));
                        return;
                    }
                };
                if tx.send(Ok(message)).is_err() {
                    return;
                }
            }
        });
        self.searches.insert(id, SearchChannel { rx, cancel: Some(cancel_tx) });
        Ok(id)
    }

    fn poll_result(&mut self, id: MessageId, timeout: Option<Duration>) -> PollOutcome<OperationResult> {
        let timeout = self.poll_timeout(timeout);
        let mut rx = match self.pending.remove(&id) {
            Some(rx) => rx,
            None => return PollOutcome::Error(format!("unknown message id {}", id)),
        };
        let received = match timeout {
            Some(t) => match self.runtime.block_on(async { tokio::time::timeout(t, &mut rx).await }) {
                Ok(received) => received,
                Err(_) => {
                    self.pending.insert(id, rx);
                    return PollOutcome::Timeout;
                }
            },
            None => self.runtime.block_on(&mut rx),
        };
        match received {
            Ok(Ok(result)) => PollOutcome::Message(result),
            Ok(Err(message)) => PollOutcome::Error(message),
            Err(_) => PollOutcome::Error("operation task ended without a result".to_string()),
        }
    }

    fn poll_next_message(&mut self, id: MessageId, timeout: Option<Duration>) -> PollOutcome<SearchMessage> {
        if let Some(message) = self.failed_searches.get(&id) {
            return PollOutcome::Error(message.clone());
        }
        let timeout = self.poll_timeout(timeout);
        let channel = match self.searches.get_mut(&id) {
            Some(channel) => channel,
            None => return PollOutcome::Error(format!("unknown search id {}", id)),
        };
        let received = match timeout {
            Some(t) => match self.runtime.block_on(async { tokio::time::timeout(t, channel.rx.recv()).await }) {
                Ok(received) => received,
                Err(_) => return PollOutcome::Timeout,
            },
            None => self.runtime.block_on(channel.rx.recv()),
        };
        match received {
            Some(Ok(SearchMessage::Done(result))) => {
                self.searches.remove(&id);
                PollOutcome::Message(SearchMessage::Done(result))
            }
            Some(Ok(message)) => PollOutcome::Message(message),
            Some(Err(message)) => self.fail_search(id, message),
            None => self.fail_search(id, "search stream ended".to_string()),
        }
    }

    fn abandon(&mut self, id: MessageId) {
        self.failed_searches.remove(&id);
        if let Some(mut channel) = self.searches.remove(&id) {
            if let Some(cancel) = channel.cancel.take() {
                let _ = cancel.send(());
            }
        }
    }

    fn unbind(&mut self) {
        let mut ldap = self.ldap.clone();
        if let Err(e) = self.runtime.block_on(async move { ldap.unbind().await }) {
            debug!("Unbind failed: {}", e);
        }
        self.pending.clear();
        self.searches.clear();
        self.failed_searches.clear();
    }
}
