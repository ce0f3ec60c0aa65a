//! In-memory object storage with failure injection, for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    folder_path, key_prefix, unique_name, ObjectStorage, ResourceKind, StorageError, StoredObject,
};
use crate::validation::Category;

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
    swept: Mutex<Vec<String>>,
    fail_delete: Mutex<HashSet<String>>,
    fail_all_deletes: AtomicBool,
    fail_uploads: AtomicBool,
    time_out_uploads: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn time_out_uploads(&self, fail: bool) {
        self.time_out_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_all_deletes(&self, fail: bool) {
        self.fail_all_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make deletes of this object report failure
    pub fn fail_delete_of(&self, object_id: &str) {
        self.fail_delete.lock().unwrap().insert(object_id.to_string());
    }

    pub fn contains(&self, object_id: &str) -> bool {
        self.objects.lock().unwrap().contains_key(object_id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn swept_folders(&self) -> Vec<String> {
        self.swept.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        data: &[u8],
        category: Category,
        organizing_key: &str,
        file_name: &str,
    ) -> Result<StoredObject, StorageError> {
        if self.time_out_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Timeout("simulated timeout".into()));
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Upload("simulated failure".into()));
        }

        let stored_name = unique_name(file_name);
        let object_id = format!("{}/{}", folder_path(organizing_key, category), stored_name);
        self.objects
            .lock()
            .unwrap()
            .insert(object_id.clone(), data.to_vec());

        Ok(StoredObject {
            url: format!("memory://{}", object_id),
            object_id,
            stored_name,
            resource_kind: ResourceKind::for_category(category),
        })
    }

    async fn delete(&self, object_id: &str, _kind: ResourceKind) -> bool {
        if self.fail_all_deletes.load(Ordering::SeqCst)
            || self.fail_delete.lock().unwrap().contains(object_id)
        {
            return false;
        }
        self.objects.lock().unwrap().remove(object_id);
        self.deleted.lock().unwrap().push(object_id.to_string());
        true
    }

    async fn delete_folder(&self, organizing_key: &str) -> bool {
        let prefix = format!("{}/", key_prefix(organizing_key));
        self.objects
            .lock()
            .unwrap()
            .retain(|id, _| !id.starts_with(&prefix));
        self.swept.lock().unwrap().push(organizing_key.to_string());
        true
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
