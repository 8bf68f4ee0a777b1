pub mod runtime;

use crate::record::{self, Field, Record};
use crate::{Db, Error};
use log::{debug, info};
use self::runtime::{Bucket, Runtime, Session};
use std::sync::Arc;

/// Object-store adapter: the table names a bucket, the key names a blob
/// holding the serialized record.
pub struct HermesDb {
    runtime: Arc<Runtime>,
    session: Option<Session>,
}

impl HermesDb {
    /// An adapter on the process-wide runtime.
    pub fn new() -> Self {
        Self::with_runtime(Runtime::shared())
    }

    pub fn with_runtime(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            session: None,
        }
    }

    fn bucket(&self, table: &str) -> Result<Bucket, Error> {
        self.session
            .as_ref()
            .map(|session| session.bucket(table))
            .ok_or(Error::Uninitialized)
    }
}

impl Default for HermesDb {
    fn default() -> Self {
        Self::new()
    }
}

fn fetch(bucket: &Bucket, key: &str) -> Result<Record, Error> {
    match bucket.get(key) {
        Some(blob) => record::decode(&blob),
        None => Err(Error::NotFound),
    }
}

fn filter(record: Record, fields: Option<&[String]>) -> Record {
    match fields {
        Some(allowed) => record::project(record, allowed),
        None => record,
    }
}

impl Db for HermesDb {
    fn init(&mut self) -> Result<(), Error> {
        self.session = Some(self.runtime.open_session());
        info!("opened object store session");
        Ok(())
    }

    /// Clears every bucket in the runtime, not only the ones this adapter
    /// wrote to.
    fn cleanup(&mut self) -> Result<(), Error> {
        if let Some(session) = self.session.take() {
            session.clear();
            info!("cleared object store runtime");
        }
        Ok(())
    }

    fn read(&mut self, table: &str, key: &str, fields: Option<&[String]>) -> Result<Record, Error> {
        debug!("read {}/{}", table, key);
        let bucket = self.bucket(table)?;
        fetch(&bucket, key).map(|record| filter(record, fields))
    }

    /// Reads the base blob followed by `count` siblings named `key0`,
    /// `key1`, ..., skipping any that are missing.
    fn scan(
        &mut self,
        table: &str,
        key: &str,
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Record>, Error> {
        debug!("scan {}/{} count {}", table, key, count);
        let bucket = self.bucket(table)?;
        let names = std::iter::once(key.to_string())
            .chain((0..count).map(|i| format!("{}{}", key, i)));
        // Distinct names hit distinct blobs, so no scan returns more records
        // than the bucket held when it started.
        let available = bucket.len();
        let mut records = Vec::new();
        for name in names {
            if records.len() >= available {
                break;
            }
            match fetch(&bucket, &name) {
                Ok(record) => records.push(filter(record, fields)),
                Err(Error::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    fn update(&mut self, table: &str, key: &str, values: &[Field]) -> Result<(), Error> {
        debug!("update {}/{}", table, key);
        let bucket = self.bucket(table)?;
        let mut current = fetch(&bucket, key)?;
        record::merge(&mut current, values);
        bucket.put(key, record::encode(&current)?);
        Ok(())
    }

    fn insert(&mut self, table: &str, key: &str, values: &[Field]) -> Result<(), Error> {
        debug!("insert {}/{}", table, key);
        let bucket = self.bucket(table)?;
        bucket.put(key, record::encode(values)?);
        Ok(())
    }

    /// Succeeds whether or not the blob existed.
    fn delete(&mut self, table: &str, key: &str) -> Result<(), Error> {
        debug!("delete {}/{}", table, key);
        let bucket = self.bucket(table)?;
        bucket.destroy(key);
        Ok(())
    }
}
