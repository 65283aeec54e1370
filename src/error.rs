use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the sync core.
///
/// Storage failures indicate a device-level problem and propagate to the
/// caller of the operation that hit them; nothing retries them. Network and
/// HTTP failures are always recoverable: the affected queue entry stays
/// pending and is retried on the next sync cycle.
#[derive(Debug, Error)]
pub enum Error {
    #[error("local storage failure: {0}")]
    Storage(#[from] redb::Error),

    #[error("record (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("remote returned HTTP {status}")]
    Http { status: u16 },

    #[error("currency balance cannot go negative")]
    NegativeBalance,

    #[error("currency amount overflows the balance")]
    BalanceOverflow,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures a later sync cycle can clear (remote-side trouble).
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Http { .. })
    }
}

// redb surfaces a different error type per operation; fold them all into the
// storage variant so `?` works at call sites.
impl From<redb::DatabaseError> for Error {
    fn from(e: redb::DatabaseError) -> Self {
        Error::Storage(e.into())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(e: redb::TransactionError) -> Self {
        Error::Storage(e.into())
    }
}

impl From<redb::TableError> for Error {
    fn from(e: redb::TableError) -> Self {
        Error::Storage(e.into())
    }
}

impl From<redb::StorageError> for Error {
    fn from(e: redb::StorageError) -> Self {
        Error::Storage(e.into())
    }
}

impl From<redb::CommitError> for Error {
    fn from(e: redb::CommitError) -> Self {
        Error::Storage(e.into())
    }
}
