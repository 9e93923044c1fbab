// In-memory transport that replays responses queued per message id and records every request.

use super::{ConnectOptions, Connector, PollOutcome, SearchMessage, Transport, TransportFailure};
use crate::changeset::{AttributeValue, ChangeSet};
use crate::protocol::{
    result_code, CompareRequest, MessageId, ModifyDNRequest, ModifyOperation, OperationKind,
    OperationResult, SearchRequest,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type RecordedChange = (ModifyOperation, String, AttributeValue<'static>);

#[derive(Debug, Clone, PartialEq)]
pub enum Submitted {
    Add { dn: String, changes: Vec<RecordedChange> },
    Delete { dn: String },
    Compare(CompareRequest),
    Modify { dn: String, changes: Vec<RecordedChange> },
    Rename(ModifyDNRequest),
    Search(SearchRequest),
}

#[derive(Debug, Default)]
pub struct ScriptState {
    next_id: MessageId,
    kinds: HashMap<MessageId, OperationKind>,
    pub submitted: Vec<Submitted>,
    pub results: HashMap<MessageId, VecDeque<PollOutcome<OperationResult>>>,
    pub search_messages: HashMap<MessageId, VecDeque<PollOutcome<SearchMessage>>>,
    pub polls: Vec<(MessageId, Option<Duration>)>,
    pub connect_failure: Option<TransportFailure>,
    pub version_failure: Option<TransportFailure>,
    pub bind_failure: Option<TransportFailure>,
    pub submit_failure: Option<TransportFailure>,
    pub connected: Vec<(String, ConnectOptions)>,
    pub version: Option<i32>,
    pub binds: Vec<(String, String)>,
    pub abandoned: Vec<MessageId>,
    pub unbound: bool,
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    pub state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap()
    }

    /// Queue a reply for request `id`. Ids are handed out from 1 in submit order.
    pub fn push_result(&self, id: MessageId, result: PollOutcome<OperationResult>) {
        self.state().results.entry(id).or_default().push_back(result);
    }

    pub fn push_search(&self, id: MessageId, message: PollOutcome<SearchMessage>) {
        self.state().search_messages.entry(id).or_default().push_back(message);
    }
}

impl Connector for ScriptedConnector {
    fn connect(
        &self,
        uris: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Transport + Send>, TransportFailure> {
        let mut state = self.state();
        state.connected.push((uris.to_string(), options.clone()));
        if let Some(failure) = state.connect_failure.clone() {
            return Err(failure);
        }
        Ok(Box::new(ScriptedTransport {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    fn submit(&mut self, kind: OperationKind, record: Submitted) -> Result<MessageId, TransportFailure> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.submit_failure.clone() {
            return Err(failure);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.kinds.insert(id, kind);
        state.submitted.push(record);
        Ok(id)
    }
}

fn record(changes: &ChangeSet<'_>) -> Vec<RecordedChange> {
    changes
        .modifications()
        .iter()
        .map(|m| (m.op, m.attribute_name.to_string(), m.value.clone().into_owned()))
        .collect()
}

impl Transport for ScriptedTransport {
    fn set_protocol_version(&mut self, version: i32) -> Result<(), TransportFailure> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.version_failure.clone() {
            return Err(failure);
        }
        state.version = Some(version);
        Ok(())
    }

    fn bind_simple(&mut self, who: &str, password: &str) -> Result<(), TransportFailure> {
        let mut state = self.state.lock().unwrap();
        state.binds.push((who.to_string(), password.to_string()));
        match state.bind_failure.clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn submit_add(&mut self, dn: &str, changes: &ChangeSet<'_>) -> Result<MessageId, TransportFailure> {
        let changes = record(changes);
        self.submit(OperationKind::Add, Submitted::Add { dn: dn.to_string(), changes })
    }

    fn submit_delete(&mut self, dn: &str) -> Result<MessageId, TransportFailure> {
        self.submit(OperationKind::Delete, Submitted::Delete { dn: dn.to_string() })
    }

    fn submit_compare(&mut self, request: &CompareRequest) -> Result<MessageId, TransportFailure> {
        self.submit(OperationKind::Compare, Submitted::Compare(request.clone()))
    }

    fn submit_modify(&mut self, dn: &str, changes: &ChangeSet<'_>) -> Result<MessageId, TransportFailure> {
        let changes = record(changes);
        self.submit(OperationKind::Modify, Submitted::Modify { dn: dn.to_string(), changes })
    }

    fn submit_rename(&mut self, request: &ModifyDNRequest) -> Result<MessageId, TransportFailure> {
        self.submit(OperationKind::Rename, Submitted::Rename(request.clone()))
    }

    fn submit_search(&mut self, request: &SearchRequest) -> Result<MessageId, TransportFailure> {
        self.submit(OperationKind::Search, Submitted::Search(request.clone()))
    }

    fn poll_result(&mut self, id: MessageId, timeout: Option<Duration>) -> PollOutcome<OperationResult> {
        let mut state = self.state.lock().unwrap();
        state.polls.push((id, timeout));
        match state.results.get_mut(&id).and_then(VecDeque::pop_front) {
            Some(outcome) => outcome,
            None => {
                let kind = state.kinds.get(&id).copied().unwrap_or(OperationKind::Add);
                PollOutcome::Message(OperationResult::new(kind, result_code::SUCCESS))
            }
        }
    }

    fn poll_next_message(&mut self, id: MessageId, timeout: Option<Duration>) -> PollOutcome<SearchMessage> {
        let mut state = self.state.lock().unwrap();
        state.polls.push((id, timeout));
        match state.search_messages.get_mut(&id).and_then(VecDeque::pop_front) {
            Some(outcome) => outcome,
            None => PollOutcome::Message(SearchMessage::Done(OperationResult::new(
                OperationKind::Search,
                result_code::SUCCESS,
            ))),
        }
    }

    fn abandon(&mut self, id: MessageId) {
        self.state.lock().unwrap().abandoned.push(id);
    }

    fn unbind(&mut self) {
        self.state.lock().unwrap().unbound = true;
    }
}
