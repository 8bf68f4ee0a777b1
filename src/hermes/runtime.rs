//! In-process object store: named buckets holding named blobs.
//!
//! A `Runtime` is shared by every `Session` opened on it. Buckets are created
//! on first use and live until the runtime is cleared.

use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(u64);

#[derive(Default)]
struct Blobs {
    ids: HashMap<String, BlobId>,
    data: HashMap<BlobId, Vec<u8>>,
}

struct BucketState {
    name: String,
    blobs: RwLock<Blobs>,
}

#[derive(Default)]
pub struct Runtime {
    buckets: RwLock<HashMap<String, Arc<BucketState>>>,
    next_blob_id: AtomicU64,
}

static SHARED: OnceLock<Arc<Runtime>> = OnceLock::new();

impl Runtime {
    pub fn new() -> Arc<Runtime> {
        Arc::new(Runtime::default())
    }

    /// The process-wide runtime.
    pub fn shared() -> Arc<Runtime> {
        Arc::clone(SHARED.get_or_init(Runtime::new))
    }

    pub fn open_session(self: &Arc<Self>) -> Session {
        Session {
            runtime: Arc::clone(self),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}

/// A client handle on a runtime.
pub struct Session {
    runtime: Arc<Runtime>,
}

impl Session {
    /// Resolve the bucket called `name`, creating it if needed.
    pub fn bucket(&self, name: &str) -> Bucket {
        if let Some(state) = self.runtime.buckets.read().get(name) {
            return Bucket {
                state: Arc::clone(state),
                runtime: Arc::clone(&self.runtime),
            };
        }
        let mut buckets = self.runtime.buckets.write();
        let state = buckets.entry(name.to_string()).or_insert_with(|| {
            debug!("created bucket {}", name);
            Arc::new(BucketState {
                name: name.to_string(),
                blobs: RwLock::new(Blobs::default()),
            })
        });
        Bucket {
            state: Arc::clone(state),
            runtime: Arc::clone(&self.runtime),
        }
    }

    /// Drop every bucket in the runtime, including ones other sessions use.
    pub fn clear(&self) {
        self.runtime.buckets.write().clear();
    }
}

#[derive(Clone)]
pub struct Bucket {
    state: Arc<BucketState>,
    runtime: Arc<Runtime>,
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn get(&self, blob_name: &str) -> Option<Vec<u8>> {
        let blobs = self.state.blobs.read();
        blobs
            .ids
            .get(blob_name)
            .and_then(|id| blobs.data.get(id))
            .cloned()
    }

    /// Store `blob` under `blob_name`, overwriting any previous contents.
    pub fn put(&self, blob_name: &str, blob: Vec<u8>) -> BlobId {
        let mut blobs = self.state.blobs.write();
        let existing = blobs.ids.get(blob_name).copied();
        let id = match existing {
            Some(id) => id,
            None => {
                let id = BlobId(self.runtime.next_blob_id.fetch_add(1, Ordering::Relaxed));
                blobs.ids.insert(blob_name.to_string(), id);
                id
            }
        };
        blobs.data.insert(id, blob);
        id
    }

    pub fn blob_id(&self, blob_name: &str) -> Option<BlobId> {
        self.state.blobs.read().ids.get(blob_name).copied()
    }

    /// Returns whether a blob was removed.
    pub fn destroy_blob(&self, id: BlobId) -> bool {
        let mut blobs = self.state.blobs.write();
        if blobs.data.remove(&id).is_none() {
            return false;
        }
        blobs.ids.retain(|_, v| *v != id);
        true
    }

    /// Resolve and destroy the blob named `blob_name` under one lock.
    pub fn destroy(&self, blob_name: &str) -> bool {
        let mut blobs = self.state.blobs.write();
        match blobs.ids.remove(blob_name) {
            Some(id) => blobs.data.remove(&id).is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.state.blobs.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
