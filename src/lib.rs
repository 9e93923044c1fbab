pub mod backend;
pub mod changeset;
pub mod config;
pub mod connection;
pub mod error;
pub mod pending;
pub mod protocol;
pub mod search;
pub mod tls;
pub mod transport;
pub mod value;

pub use backend::Ldap3Connector;
pub use changeset::{AttributeValue, ChangeSet, Modification, MAX_ATTRS};
pub use config::Config;
pub use connection::{normalize_uris, Connection, RenameOptions};
pub use error::{Error, Result};
pub use pending::PendingOperation;
pub use protocol::{ModifyOperation, OperationKind, OperationResult, SearchScope};
pub use search::{Entry, SearchCriteria, SearchCursor, SearchItem};
pub use value::{Key, Table, Value};
