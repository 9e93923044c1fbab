//! Error tiers for directory operations.
//!
//! Soft failures are expected operational outcomes (timeouts, server
//! rejections, closed handles) that callers branch on. Fatal errors are
//! contract violations: bad argument shapes, capacity overflow, or a
//! transport that breaks the search message chain.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("too many attributes")]
    TooManyAttributes,

    #[error("too many values")]
    TooManyValues,

    #[error("invalid value of attribute `{attribute}' ({found})")]
    InvalidAttributeValue { attribute: String, found: &'static str },

    #[error("forgotten operation on argument #{position}")]
    MissingOperation { position: usize },

    #[error("invalid search scope `{0}'")]
    InvalidScope(String),

    #[error("too many arguments")]
    TooManyArguments,

    #[error("error on search result chain: {0}")]
    SearchChain(String),

    #[error("operation result already fetched")]
    AlreadyResolved,

    #[error("expected {expected} result, got {got}")]
    ResultKindMismatch { expected: &'static str, got: &'static str },

    #[error("{0}")]
    Submit(String),

    #[error("LDAP connection is closed")]
    ConnectionClosed,

    #[error("LDAP search is closed")]
    SearchClosed,

    #[error("result timeout expired")]
    Timeout,

    #[error("result error")]
    Transport(String),

    #[error("{text}")]
    Rejected { code: u32, text: String },

    #[error("{0}")]
    Connect(String),

    #[error("{0}")]
    Bind(String),
}

impl Error {
    /// Contract violations that must not be swallowed by callers.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::TooManyAttributes
                | Error::TooManyValues
                | Error::InvalidAttributeValue { .. }
                | Error::MissingOperation { .. }
                | Error::InvalidScope(_)
                | Error::TooManyArguments
                | Error::SearchChain(_)
                | Error::AlreadyResolved
                | Error::ResultKindMismatch { .. }
                | Error::Submit(_)
        )
    }

    /// Server result code, when the error carries one.
    pub fn result_code(&self) -> Option<u32> {
        match self {
            Error::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}
