use crate::config::RedisConfig;
use crate::record::{self, Field, Record};
use crate::{Db, Error};
use log::{debug, info};
use redis::Connection;

/// Hash commands the adapter needs from a Redis connection.
///
/// Every argument travels as a length-prefixed bulk string, so keys and
/// values may contain the `:` separator or any other byte.
pub trait HashConnection: Sized {
    fn open(config: &RedisConfig) -> Result<Self, Error>;

    /// `HGETALL key`; an absent key yields no pairs.
    fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>, Error>;

    /// `HMGET key f1 .. fn`; one slot per requested field.
    fn hmget(&mut self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>, Error>;

    /// Atomically replace the hash at `key` with exactly `fields`.
    fn replace(&mut self, key: &str, fields: &[Field]) -> Result<(), Error>;

    /// `DEL key`, returning how many keys were removed.
    fn del(&mut self, key: &str) -> Result<i64, Error>;
}

impl HashConnection for Connection {
    fn open(config: &RedisConfig) -> Result<Self, Error> {
        let client = redis::Client::open(config.url().as_str())
            .map_err(|e| Error::Connection(e.to_string()))?;
        client
            .get_connection()
            .map_err(|e| Error::Connection(e.to_string()))
    }

    fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>, Error> {
        redis::cmd("HGETALL")
            .arg(key)
            .query(self)
            .map_err(Into::into)
    }

    fn hmget(&mut self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>, Error> {
        redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query(self)
            .map_err(Into::into)
    }

    fn replace(&mut self, key: &str, fields: &[Field]) -> Result<(), Error> {
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("DEL").arg(key).ignore();
        if !fields.is_empty() {
            pipe.cmd("HMSET").arg(key);
            for field in fields {
                pipe.arg(&field.name).arg(&field.value);
            }
            pipe.ignore();
        }
        pipe.query(self).map_err(Into::into)
    }

    fn del(&mut self, key: &str) -> Result<i64, Error> {
        redis::cmd("DEL").arg(key).query(self).map_err(Into::into)
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Error {
        Error::Backend(e.to_string())
    }
}

/// Records live in one hash per row, keyed `"<table>:<key>"`.
pub struct RedisDb<C = Connection> {
    config: RedisConfig,
    conn: Option<C>,
}

impl<C: HashConnection> RedisDb<C> {
    pub fn new(config: RedisConfig) -> Self {
        Self { config, conn: None }
    }

    fn conn(&mut self) -> Result<&mut C, Error> {
        self.conn.as_mut().ok_or(Error::Uninitialized)
    }
}

pub fn full_key(table: &str, key: &str) -> String {
    format!("{}:{}", table, key)
}

fn fetch<C: HashConnection>(
    conn: &mut C,
    key: &str,
    fields: Option<&[String]>,
) -> Result<Record, Error> {
    match fields {
        None => {
            let pairs = conn.hgetall(key)?;
            if pairs.is_empty() {
                return Err(Error::NotFound);
            }
            Ok(pairs
                .into_iter()
                .map(|(name, value)| Field { name, value })
                .collect())
        }
        Some(fields) if fields.is_empty() => {
            require_record(conn, key)?;
            Ok(Record::new())
        }
        Some(fields) => {
            let values = conn.hmget(key, fields)?;
            if values.len() != fields.len() {
                return Err(Error::Backend(format!(
                    "HMGET returned {} values for {} fields",
                    values.len(),
                    fields.len()
                )));
            }
            // All nils is either a missing key or a record without any of
            // the requested fields.
            if values.iter().all(Option::is_none) {
                require_record(conn, key)?;
            }
            Ok(fields
                .iter()
                .zip(values)
                .map(|(name, value)| Field::new(name.as_str(), value.unwrap_or_default()))
                .collect())
        }
    }
}

fn require_record<C: HashConnection>(conn: &mut C, key: &str) -> Result<(), Error> {
    if conn.hgetall(key)?.is_empty() {
        Err(Error::NotFound)
    } else {
        Ok(())
    }
}

impl<C: HashConnection> Db for RedisDb<C> {
    fn init(&mut self) -> Result<(), Error> {
        let conn = C::open(&self.config)?;
        info!("connected to redis at {}", self.config.url());
        self.conn = Some(conn);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        if self.conn.take().is_some() {
            info!("closed redis connection to {}", self.config.url());
        }
        Ok(())
    }

    fn read(&mut self, table: &str, key: &str, fields: Option<&[String]>) -> Result<Record, Error> {
        let key = full_key(table, key);
        debug!("read {}", key);
        fetch(self.conn()?, &key, fields)
    }

    fn scan(
        &mut self,
        table: &str,
        key: &str,
        count: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Record>, Error> {
        let start: u64 = key
            .parse()
            .map_err(|_| Error::InvalidKey(key.to_string()))?;
        debug!("scan {}:{} count {}", table, start, count);
        let conn = self.conn()?;
        let mut records = Vec::new();
        for i in 0..count {
            // Row ids past u64::MAX cannot exist.
            let id = match start.checked_add(i as u64) {
                Some(id) => id,
                None => break,
            };
            match fetch(conn, &full_key(table, &id.to_string()), fields) {
                Ok(record) => records.push(record),
                Err(Error::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    fn update(&mut self, table: &str, key: &str, values: &[Field]) -> Result<(), Error> {
        let key = full_key(table, key);
        debug!("update {}", key);
        let conn = self.conn()?;
        let mut current = fetch(conn, &key, None)?;
        record::merge(&mut current, values);
        conn.replace(&key, &current)
    }

    fn insert(&mut self, table: &str, key: &str, values: &[Field]) -> Result<(), Error> {
        let key = full_key(table, key);
        debug!("insert {}", key);
        self.conn()?.replace(&key, values)
    }

    fn delete(&mut self, table: &str, key: &str) -> Result<(), Error> {
        let key = full_key(table, key);
        debug!("delete {}", key);
        if self.conn()?.del(&key)? > 0 {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Status;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeConnection {
        hashes: BTreeMap<String, Vec<(String, String)>>,
        commands: Vec<String>,
        broken: bool,
    }

    impl FakeConnection {
        fn check(&mut self, command: String) -> Result<(), Error> {
            self.commands.push(command);
            if self.broken {
                Err(Error::Backend("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl HashConnection for FakeConnection {
        fn open(config: &RedisConfig) -> Result<Self, Error> {
            if config.port == 0 {
                return Err(Error::Connection("refused".to_string()));
            }
            Ok(Self::default())
        }

        fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>, Error> {
            self.check(format!("HGETALL {}", key))?;
            Ok(self.hashes.get(key).cloned().unwrap_or_default())
        }

        fn hmget(&mut self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>, Error> {
            self.check(format!("HMGET {}", key))?;
            if fields.is_empty() {
                return Err(Error::Backend(
                    "wrong number of arguments for 'hmget' command".to_string(),
                ));
            }
            let hash = self.hashes.get(key);
            Ok(fields
                .iter()
                .map(|name| {
                    hash.and_then(|h| h.iter().find(|(n, _)| n == name))
                        .map(|(_, v)| v.clone())
                })
                .collect())
        }

        fn replace(&mut self, key: &str, fields: &[Field]) -> Result<(), Error> {
            self.check(format!("HMSET {}", key))?;
            self.hashes.remove(key);
            if !fields.is_empty() {
                let pairs = fields
                    .iter()
                    .map(|f| (f.name.clone(), f.value.clone()))
                    .collect();
                self.hashes.insert(key.to_string(), pairs);
            }
            Ok(())
        }

        fn del(&mut self, key: &str) -> Result<i64, Error> {
            self.check(format!("DEL {}", key))?;
            Ok(self.hashes.remove(key).map_or(0, |_| 1))
        }
    }

    fn open() -> RedisDb<FakeConnection> {
        let mut db = RedisDb::new(RedisConfig::default());
        db.init().unwrap();
        db
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().map(|(n, v)| Field::new(*n, *v)).collect()
    }

    fn sorted(mut r: Record) -> Record {
        r.sort_by(|a, b| a.name.cmp(&b.name));
        r
    }

    fn names(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn insert_and_read() {
        let mut db = open();
        let values = record(&[("b", "2"), ("a", "1")]);
        db.insert("usertable", "7", &values).unwrap();
        let got = db.read("usertable", "7", None).unwrap();
        assert_eq!(sorted(values), sorted(got));
        assert!(db.conn.as_ref().unwrap().hashes.contains_key("usertable:7"));
    }

    #[test]
    fn insert_replaces_whole_hash() {
        let mut db = open();
        db.insert("t", "1", &record(&[("a", "1"), ("b", "2")])).unwrap();
        db.insert("t", "1", &record(&[("c", "3")])).unwrap();
        assert_eq!(record(&[("c", "3")]), db.read("t", "1", None).unwrap());
    }

    #[test]
    fn read_missing_key() {
        let mut db = open();
        let result = db.read("t", "404", None);
        assert_eq!(Status::NotFound, Status::of(&result));
        let result = db.read("t", "404", Some(&names(&["a"])[..]));
        assert_eq!(Status::NotFound, Status::of(&result));
    }

    #[test]
    fn read_with_filter_fills_missing_fields() {
        let mut db = open();
        db.insert("t", "1", &record(&[("a", "1"), ("b", "2")])).unwrap();
        let got = db.read("t", "1", Some(&names(&["a", "z"])[..])).unwrap();
        assert_eq!(record(&[("a", "1"), ("z", "")]), got);
    }

    #[test]
    fn update_merges_existing_fields() {
        let mut db = open();
        db.insert("t", "1", &record(&[("a", "1"), ("b", "2")])).unwrap();
        db.update("t", "1", &record(&[("b", "9"), ("c", "5")])).unwrap();
        let got = db.read("t", "1", None).unwrap();
        assert_eq!(record(&[("a", "1"), ("b", "9")]), sorted(got));
    }

    #[test]
    fn update_missing_key() {
        let mut db = open();
        let result = db.update("t", "1", &record(&[("a", "1")]));
        assert_eq!(Status::NotFound, Status::of(&result));
        assert!(db.conn.as_ref().unwrap().hashes.is_empty());
    }

    #[test]
    fn delete_reports_not_found() {
        let mut db = open();
        db.insert("t", "1", &record(&[("a", "1")])).unwrap();
        assert!(db.delete("t", "1").is_ok());
        assert_eq!(Status::NotFound, Status::of(&db.delete("t", "1")));
    }

    #[test]
    fn scan_walks_numeric_suffixes_in_order() {
        let mut db = open();
        for id in 100..103 {
            let value = id.to_string();
            db.insert("t", &value, &record(&[("a", value.as_str())])).unwrap();
        }
        db.conn.as_mut().unwrap().commands.clear();

        let records = db.scan("t", "100", 3, None).unwrap();
        assert_eq!(
            vec![
                record(&[("a", "100")]),
                record(&[("a", "101")]),
                record(&[("a", "102")]),
            ],
            records
        );
        assert_eq!(
            vec!["HGETALL t:100", "HGETALL t:101", "HGETALL t:102"],
            db.conn.as_ref().unwrap().commands
        );
    }

    #[test]
    fn scan_skips_missing_rows() {
        let mut db = open();
        db.insert("t", "5", &record(&[("a", "x"), ("b", "y")])).unwrap();
        db.insert("t", "7", &record(&[("a", "z")])).unwrap();
        let records = db.scan("t", "5", 3, Some(&names(&["a"])[..])).unwrap();
        assert_eq!(vec![record(&[("a", "x")]), record(&[("a", "z")])], records);
    }

    #[test]
    fn read_with_filter_of_absent_fields() {
        let mut db = open();
        db.insert("t", "1", &record(&[("a", "1"), ("b", "2")])).unwrap();
        let got = db.read("t", "1", Some(&names(&["z"])[..])).unwrap();
        assert_eq!(record(&[("z", "")]), got);
        let got = db.read("t", "1", Some(&names(&["y", "z"])[..])).unwrap();
        assert_eq!(record(&[("y", ""), ("z", "")]), got);
    }

    #[test]
    fn read_with_empty_filter() {
        let mut db = open();
        db.insert("t", "1", &record(&[("a", "1")])).unwrap();
        db.conn.as_mut().unwrap().commands.clear();
        assert_eq!(Record::new(), db.read("t", "1", Some(&[][..])).unwrap());
        assert_eq!(Status::NotFound, Status::of(&db.read("t", "2", Some(&[][..]))));
        assert!(db
            .conn
            .as_ref()
            .unwrap()
            .commands
            .iter()
            .all(|c| !c.starts_with("HMGET")));
    }

    #[test]
    fn scan_stops_at_largest_row_id() {
        let mut db = open();
        let max = u64::MAX.to_string();
        db.insert("t", &max, &record(&[("a", "last")])).unwrap();
        let records = db.scan("t", &max, 1, None).unwrap();
        assert_eq!(vec![record(&[("a", "last")])], records);

        db.conn.as_mut().unwrap().commands.clear();
        let start = (u64::MAX - 2).to_string();
        let records = db.scan("t", &start, usize::MAX, None).unwrap();
        assert_eq!(vec![record(&[("a", "last")])], records);
        assert_eq!(3, db.conn.as_ref().unwrap().commands.len());
    }

    #[test]
    fn scan_rejects_non_numeric_key() {
        let mut db = open();
        match db.scan("t", "user42", 3, None) {
            Err(Error::InvalidKey(key)) => assert_eq!("user42", key),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn backend_failure_is_error() {
        let mut db = open();
        db.conn.as_mut().unwrap().broken = true;
        assert_eq!(Status::Error, Status::of(&db.read("t", "1", None)));
        assert_eq!(Status::Error, Status::of(&db.delete("t", "1")));
    }

    #[test]
    fn init_failure() {
        let config = RedisConfig {
            port: 0,
            ..RedisConfig::default()
        };
        let mut db: RedisDb<FakeConnection> = RedisDb::new(config);
        match db.init() {
            Err(Error::Connection(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn operations_need_init() {
        let mut db: RedisDb<FakeConnection> = RedisDb::new(RedisConfig::default());
        match db.read("t", "1", None) {
            Err(Error::Uninitialized) => {}
            other => panic!("unexpected {:?}", other),
        }
        db.init().unwrap();
        db.cleanup().unwrap();
        assert!(db.conn.is_none());
        match db.insert("t", "1", &[]) {
            Err(Error::Uninitialized) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    #[ignore] // needs a redis server on 127.0.0.1:6379
    fn live_server() {
        let mut db: RedisDb = RedisDb::new(RedisConfig::default());
        db.init().unwrap();
        let values = record(&[("a", "1"), ("b", "2")]);
        db.insert("ycsb_live_test", "1", &values).unwrap();
        assert_eq!(sorted(values), sorted(db.read("ycsb_live_test", "1", None).unwrap()));
        db.update("ycsb_live_test", "1", &record(&[("b", "9")])).unwrap();
        let got = db.read("ycsb_live_test", "1", Some(&names(&["b", "z"])[..])).unwrap();
        assert_eq!(record(&[("b", "9"), ("z", "")]), got);
        db.delete("ycsb_live_test", "1").unwrap();
        assert_eq!(Status::NotFound, Status::of(&db.delete("ycsb_live_test", "1")));
        db.cleanup().unwrap();
    }
}
