pub mod config;
pub mod hermes;
pub mod record;
pub mod redis;
pub mod registry;
pub mod workload;

pub use crate::record::{Field, Record};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("record not found")]
    NotFound,
    #[error("operation not implemented by this backend")]
    NotImplemented,
    #[error("backend used before init or after cleanup")]
    Uninitialized,
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("unknown backend: {0}")]
    UnknownBackend(String),
    #[error("backend already registered: {0}")]
    DuplicateBackend(String),
    #[error("config error: {0}")]
    Config(String),
}

/// Outcome of a single operation as seen by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    NotFound,
    Error,
    NotImplemented,
}

impl Status {
    pub fn of<T>(result: &Result<T, Error>) -> Status {
        match result {
            Ok(_) => Status::Ok,
            Err(Error::NotFound) => Status::NotFound,
            Err(Error::NotImplemented) => Status::NotImplemented,
            Err(_) => Status::Error,
        }
    }
}

/// Uniform CRUD interface a benchmark workload is run against.
///
/// One instance owns one backend connection. Operations take `&mut self`, so
/// callers wanting parallelism hand each thread its own instance.
pub trait Db {
    /// Acquire the backend connection. A failure here is not retried.
    fn init(&mut self) -> Result<(), Error>;

    /// Release what `init` acquired.
    fn cleanup(&mut self) -> Result<(), Error>;

    /// Fetch the whole record, or only `fields` when given.
    fn read(&mut self, table: &str, key: &str, fields: Option<&[String]>)
        -> Result<Record, Error>;

    /// Fetch `count` records following `key`.
    ///
    /// Neither backend keeps an ordered index: "following" means row ids
    /// generated as a dense numeric sequence by the workload, so this is
    /// not a general range scan.
    fn scan(
        &mut self,
        _table: &str,
        _key: &str,
        _count: usize,
        _fields: Option<&[String]>,
    ) -> Result<Vec<Record>, Error> {
        Err(Error::NotImplemented)
    }

    /// Overlay `values` onto the existing record's fields of the same name.
    fn update(&mut self, table: &str, key: &str, values: &[Field]) -> Result<(), Error>;

    /// Store a record made of exactly `values`, replacing any previous one.
    fn insert(&mut self, table: &str, key: &str, values: &[Field]) -> Result<(), Error>;

    fn delete(&mut self, table: &str, key: &str) -> Result<(), Error>;
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Codec(e.to_string())
    }
}
