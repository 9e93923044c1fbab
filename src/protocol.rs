// LDAP v3 protocol records as seen from the client side.
// Encoding is left to the transport; these types carry decoded results and
// the request shapes handed to it.

use std::fmt;

/// Correlation token for one submitted request.
pub type MessageId = i32;

/// Protocol version negotiated right after connect.
pub const LDAP_VERSION3: i32 = 3;

// [APPLICATION n] numbers of the search chain messages
pub const APP_SEARCH_RESULT_ENTRY: u64 = 4;
pub const APP_SEARCH_RESULT_REFERENCE: u64 = 19;

/// Request kinds that produce a single response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Add,
    Compare,
    Delete,
    Modify,
    Rename,
    Search,
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Compare => "compare",
            OperationKind::Delete => "delete",
            OperationKind::Modify => "modify",
            OperationKind::Rename => "rename",
            OperationKind::Search => "search",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// LDAPResult components of a response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub kind: OperationKind,
    pub result_code: u32,
    pub matched_dn: String,
    pub diagnostic_message: String,
    pub referrals: Vec<String>,
}

impl OperationResult {
    pub fn new(kind: OperationKind, result_code: u32) -> Self {
        Self {
            kind,
            result_code,
            matched_dn: String::new(),
            diagnostic_message: String::new(),
            referrals: Vec::new(),
        }
    }

    pub fn with_diagnostic(mut self, message: impl Into<String>) -> Self {
        self.diagnostic_message = message.into();
        self
    }

    /// Canonical error string, with the server diagnostic in parentheses when present.
    pub fn error_text(&self) -> String {
        let text = err2string(self.result_code);
        if self.diagnostic_message.is_empty() {
            text.to_string()
        } else {
            format!("{} ({})", text, self.diagnostic_message)
        }
    }
}

/// Result codes (RFC 4511 section 4.1.9) the client interprets directly.
pub mod result_code {
    pub const SUCCESS: u32 = 0;
    pub const COMPARE_FALSE: u32 = 5;
    pub const COMPARE_TRUE: u32 = 6;
    pub const OTHER: u32 = 80;
}

/// Human-readable text for a result code, worded like libldap's `ldap_err2string`.
pub fn err2string(code: u32) -> &'static str {
    match code {
        0 => "Success",
        1 => "Operations error",
        2 => "Protocol error",
        3 => "Time limit exceeded",
        4 => "Size limit exceeded",
        5 => "Compare False",
        6 => "Compare True",
        7 => "Authentication method not supported",
        8 => "Strong(er) authentication required",
        9 => "Partial results and referral received",
        10 => "Referral",
        11 => "Administrative limit exceeded",
        12 => "Critical extension is unavailable",
        13 => "Confidentiality required",
        14 => "SASL bind in progress",
        16 => "No such attribute",
        17 => "Undefined attribute type",
        18 => "Inappropriate matching",
        19 => "Constraint violation",
        20 => "Type or value exists",
        21 => "Invalid syntax",
        32 => "No such object",
        33 => "Alias problem",
        34 => "Invalid DN syntax",
        35 => "Entry is a leaf",
        36 => "Alias dereferencing problem",
        47 => "Proxy Authorization Failure",
        48 => "Inappropriate authentication",
        49 => "Invalid credentials",
        50 => "Insufficient access",
        51 => "Server is busy",
        52 => "Server is unavailable",
        53 => "Server is unwilling to perform",
        54 => "Loop detected",
        64 => "Naming violation",
        65 => "Object class violation",
        66 => "Operation not allowed on non-leaf",
        67 => "Operation not allowed on RDN",
        68 => "Already exists",
        69 => "Cannot modify object class",
        70 => "Results too large",
        71 => "Operation affects multiple DSAs",
        80 => "Internal (implementation specific) error",
        118 => "Cancelled",
        119 => "No Operation to Cancel",
        120 => "Too Late to Cancel",
        121 => "Cannot Cancel",
        122 => "Assertion Failed",
        123 => "Proxied Authorization Denied",
        _ => "Unknown error",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    BaseObject = 0,
    SingleLevel = 1,
    WholeSubtree = 2,
}

impl From<SearchScope> for ldap3::Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::BaseObject => ldap3::Scope::Base,
            SearchScope::SingleLevel => ldap3::Scope::OneLevel,
            SearchScope::WholeSubtree => ldap3::Scope::Subtree,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Add = 0,
    Delete = 1,
    Replace = 2,
}

impl ModifyOperation {
    /// `+` adds, `-` deletes, `=` replaces. Only the first character counts.
    pub fn from_sigil(sigil: &[u8]) -> Option<Self> {
        match sigil.first() {
            Some(b'+') => Some(ModifyOperation::Add),
            Some(b'-') => Some(ModifyOperation::Delete),
            Some(b'=') => Some(ModifyOperation::Replace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_object: String,
    pub scope: SearchScope,
    pub size_limit: i32,
    pub time_limit: i32,
    pub types_only: bool,
    pub filter: String,
    /// Empty means all user attributes.
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyDNRequest {
    pub entry: String,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub entry: String,
    pub attribute: String,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultEntry {
    pub object_name: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub attr_type: String,
    pub attr_values: Vec<Vec<u8>>,
}
