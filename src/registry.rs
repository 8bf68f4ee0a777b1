use crate::config::DbConfig;
use crate::hermes::HermesDb;
use crate::redis::RedisDb;
use crate::{Db, Error};
use std::collections::BTreeMap;

pub type Constructor = fn(&DbConfig) -> Box<dyn Db>;

/// Maps backend names to constructors.
///
/// Build one at startup with `Registry::builtin()` and keep it for the life
/// of the harness; dropping it releases nothing but the table itself.
#[derive(Default)]
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

fn new_redis(config: &DbConfig) -> Box<dyn Db> {
    Box::new(RedisDb::<redis::Connection>::new(config.redis.clone()))
}

fn new_hermes(_config: &DbConfig) -> Box<dyn Db> {
    Box::new(HermesDb::new())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `redis` and `hermes` backends.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.constructors.insert("redis".to_string(), new_redis);
        registry.constructors.insert("hermes".to_string(), new_hermes);
        registry
    }

    pub fn register(&mut self, name: &str, constructor: Constructor) -> Result<(), Error> {
        if self.constructors.contains_key(name) {
            return Err(Error::DuplicateBackend(name.to_string()));
        }
        self.constructors.insert(name.to_string(), constructor);
        Ok(())
    }

    /// Instantiate the backend registered as `name`. The instance still
    /// needs `init` before use.
    pub fn create(&self, name: &str, config: &DbConfig) -> Result<Box<dyn Db>, Error> {
        self.constructors
            .get(name)
            .map(|constructor| constructor(config))
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}
