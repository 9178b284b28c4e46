//! File-backed stores: a JSON-array store for records with a document id,
//! and a JSON-object store for string-keyed values (rate-limit windows).

use crate::model::{HasDocId, Sortable};
use serde_json;
use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub struct StructFileDb<T>
where
    T: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone,
{
    db: Arc<Mutex<BaseFileDb<Vec<T>>>>,
}

impl<T> StructFileDb<T>
where
    T: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone,
{
    pub fn new(file_path: String) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(StructFileDb::<T> {
            db: Arc::new(Mutex::new(BaseFileDb::<Vec<T>>::new(file_path)?)),
        })
    }

    pub fn save(&self, data: Vec<T>) -> Result<(), Box<dyn std::error::Error>> {
        let mut mutex = self.db.lock().unwrap();
        mutex.data = data;
        mutex.save()
    }

    pub fn data(&self) -> Vec<T> {
        let mutex = self.db.lock().unwrap();
        mutex.data.clone()
    }

    pub fn is_data_empty(&self) -> bool {
        let mutex = self.db.lock().unwrap();
        mutex.data.is_empty()
    }

    /// Re-reads the backing file, replacing the in-memory data.
    pub fn reload(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut mutex = self.db.lock().unwrap();
        mutex.reload()
    }
}

impl<T> StructFileDb<T>
where
    T: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone + HasDocId + Sortable,
{
    fn sort_and_save(
        &self,
        mutex: &mut MutexGuard<BaseFileDb<Vec<T>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        mutex
            .data
            .sort_by(|a, b| a.sortable_value().cmp(&b.sortable_value()));
        mutex.save()
    }

    pub fn find_by_doc_id(&self, doc_id: &str) -> Option<T> {
        let mutex = self.db.lock().unwrap();
        mutex.data.iter().find(|x| x.doc_id() == doc_id).cloned()
    }

    pub fn upsert(&self, data: T) -> Result<(), Box<dyn std::error::Error>> {
        let mut mutex = self.db.lock().unwrap();
        Self::upsert_in_place(&mut mutex, data);
        self.sort_and_save(&mut mutex)
    }

    /// Batched commit: one lock, one sort, one file write for the whole
    /// slice. Callers cap batch sizes themselves (see `sync::BatchWriter`).
    pub fn upsert_many(&self, batch: Vec<T>) -> Result<(), Box<dyn std::error::Error>> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut mutex = self.db.lock().unwrap();
        for data in batch {
            Self::upsert_in_place(&mut mutex, data);
        }
        self.sort_and_save(&mut mutex)
    }

    fn upsert_in_place(mutex: &mut MutexGuard<BaseFileDb<Vec<T>>>, data: T) {
        let index = mutex.data.iter().position(|x| x.doc_id() == data.doc_id());
        if let Some(index) = index {
            debug!(
                "Update {} with doc id {}",
                std::any::type_name::<T>(),
                &data.doc_id()
            );
            mutex.data[index] = data;
        } else {
            debug!(
                "Insert {} with doc id {}",
                std::any::type_name::<T>(),
                &data.doc_id()
            );
            mutex.data.push(data);
        }
    }
}

/// String-keyed JSON-object store, one value per key. Used for the
/// rate limiter's per-action timestamp windows.
#[derive(Clone)]
pub struct KvFileDb<V>
where
    V: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone,
{
    db: Arc<Mutex<BaseFileDb<HashMap<String, V>>>>,
}

impl<V> KvFileDb<V>
where
    V: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone,
{
    pub fn new(file_path: String) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(KvFileDb::<V> {
            db: Arc::new(Mutex::new(BaseFileDb::<HashMap<String, V>>::new(
                file_path,
            )?)),
        })
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mutex = self.db.lock().unwrap();
        mutex.data.get(key).cloned()
    }

    pub fn put(&self, key: &str, value: V) -> Result<(), Box<dyn std::error::Error>> {
        let mut mutex = self.db.lock().unwrap();
        mutex.data.insert(key.to_string(), value);
        mutex.save()
    }

    pub fn remove(&self, key: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut mutex = self.db.lock().unwrap();
        mutex.data.remove(key);
        mutex.save()
    }

    pub fn reload(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut mutex = self.db.lock().unwrap();
        mutex.reload()
    }
}

trait EmptyValue {
    fn empty() -> Self;
    fn is_empty(&self) -> bool;
}

impl<T> EmptyValue for Vec<T> {
    fn empty() -> Self {
        Vec::new()
    }

    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl<V> EmptyValue for HashMap<String, V> {
    fn empty() -> Self {
        HashMap::new()
    }

    fn is_empty(&self) -> bool {
        HashMap::is_empty(self)
    }
}

struct BaseFileDb<D: serde::Serialize + for<'de> serde::Deserialize<'de> + EmptyValue> {
    file_path: String,
    data: D,
}

impl<D: serde::Serialize + for<'de> serde::Deserialize<'de> + EmptyValue> BaseFileDb<D> {
    fn new(file_path: String) -> Result<Self, Box<dyn std::error::Error>> {
        let mut content = String::new();

        if !fs::exists(&file_path)? {
            // split and get folder, create folder if necessary
            let folder_path = file_path.split("/").collect::<Vec<&str>>()
                [..(file_path.split("/").count() - 1)]
                .join("/");
            if !folder_path.is_empty() && !fs::exists(&folder_path)? {
                fs::create_dir_all(&folder_path)?;
                info!("Created folder: {}", folder_path);
            }

            File::create(&file_path)?;
            info!("Created file: {}", file_path);
        } else {
            let mut file = File::open(&file_path)?;
            file.read_to_string(&mut content)?;
        } // file closed

        let data: D = if content.is_empty() {
            D::empty()
        } else {
            serde_json::from_str(&content)?
        };

        Ok(BaseFileDb::<D> { file_path, data })
    }

    /// Re-reads the file. A missing file while data is loaded is an error;
    /// empty content means empty data.
    fn reload(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !fs::exists(&self.file_path)? {
            if !self.data.is_empty() {
                return Err(format!("db file {} is missing", self.file_path).into());
            }
            return Ok(());
        }

        let mut content = String::new();
        File::open(&self.file_path)?.read_to_string(&mut content)?;

        self.data = if content.is_empty() {
            D::empty()
        } else {
            serde_json::from_str(&content)?
        };

        debug!("Reloaded file: {}", self.file_path);
        Ok(())
    }

    fn save(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_json::to_string_pretty(&self.data)?;

        let tmp_path = format!("{}.tmp", &self.file_path);
        let mut file = File::create(&tmp_path)?; // this truncates the exiting file if any
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        fs::rename(&tmp_path, &self.file_path)?; // this replaces the existing file

        debug!("Saved file: {}", self.file_path);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Transaction, TxnKind};

    fn txn(doc_id: &str, date: &str, amount: f64) -> Transaction {
        Transaction {
            doc_id: doc_id.to_string(),
            date: date.to_string(),
            note: "Test".to_string(),
            amount,
            kind: TxnKind::Expense,
            category: Category::new("General", "💰", "#9E9E9E", false),
            payment_method: "UPI".to_string(),
            recurring: Some("none".to_string()),
            created_at: date.to_string(),
            sms_id: None,
        }
    }

    fn temp_db_path(name: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name).to_string_lossy().to_string();
        (dir, path)
    }

    #[test]
    fn upsert_overwrites_same_doc_id() {
        let (_dir, path) = temp_db_path("txns.json");
        let db = StructFileDb::<Transaction>::new(path).unwrap();

        db.upsert(txn("SMS_1", "2025-01-05T10:00:00", 450.0)).unwrap();
        db.upsert(txn("SMS_1", "2025-01-05T10:00:00", 500.0)).unwrap();

        let data = db.data();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].amount, 500.0);
    }

    #[test]
    fn upsert_many_sorts_by_date_and_persists() {
        let (_dir, path) = temp_db_path("txns.json");
        let db = StructFileDb::<Transaction>::new(path.clone()).unwrap();

        db.upsert_many(vec![
            txn("SMS_2", "2025-02-01T00:00:00", 10.0),
            txn("SMS_1", "2025-01-01T00:00:00", 20.0),
        ])
        .unwrap();

        let data = db.data();
        assert_eq!(data[0].doc_id, "SMS_1");
        assert_eq!(data[1].doc_id, "SMS_2");

        // reopen from disk
        let db2 = StructFileDb::<Transaction>::new(path).unwrap();
        assert_eq!(db2.data().len(), 2);
        assert!(db2.find_by_doc_id("SMS_2").is_some());
    }

    #[test]
    fn reload_picks_up_external_writes() {
        let (_dir, path) = temp_db_path("txns.json");
        let db = StructFileDb::<Transaction>::new(path.clone()).unwrap();
        assert!(db.is_data_empty());

        // second handle on the same file, standing in for another writer
        let writer = StructFileDb::<Transaction>::new(path).unwrap();
        writer.upsert(txn("SMS_1", "2025-01-05T10:00:00", 450.0)).unwrap();

        assert!(db.is_data_empty());
        db.reload().unwrap();
        assert_eq!(db.data().len(), 1);
        assert!(db.find_by_doc_id("SMS_1").is_some());
    }

    #[test]
    fn reload_errors_when_populated_file_disappears() {
        let (_dir, path) = temp_db_path("txns.json");
        let db = StructFileDb::<Transaction>::new(path.clone()).unwrap();
        db.upsert(txn("SMS_1", "2025-01-05T10:00:00", 450.0)).unwrap();

        fs::remove_file(&path).unwrap();
        assert!(db.reload().is_err());
    }

    #[test]
    fn kv_db_round_trips_windows() {
        let (_dir, path) = temp_db_path("limits.json");
        let db = KvFileDb::<Vec<i64>>::new(path.clone()).unwrap();

        assert!(db.get("rate_limit:ai_categorize").is_none());
        db.put("rate_limit:ai_categorize", vec![1000, 2000]).unwrap();
        assert_eq!(db.get("rate_limit:ai_categorize"), Some(vec![1000, 2000]));

        let db2 = KvFileDb::<Vec<i64>>::new(path).unwrap();
        assert_eq!(db2.get("rate_limit:ai_categorize"), Some(vec![1000, 2000]));

        db2.remove("rate_limit:ai_categorize").unwrap();
        assert!(db2.get("rate_limit:ai_categorize").is_none());
    }
}
