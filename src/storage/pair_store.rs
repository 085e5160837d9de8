use std::path::{Path, PathBuf};

use chrono::Utc;
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use super::image_pair::{ImagePair, NewImage};
use super::timestamp_index::TimestampIndex;
use crate::error::{AppError, StorageError};

pub const PAIRS_FILE: &str = "pairs.json";
const ID_SUFFIX_LEN: usize = 9;
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// On-disk layout of the single pair collection.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PairDocument {
    pairs: Vec<ImagePair>,
}

#[derive(Debug, Default)]
struct PairCollection {
    records: IndexMap<String, ImagePair>,
    by_timestamp: TimestampIndex,
}

impl PairCollection {
    fn from_document(document: PairDocument) -> Result<Self, StorageError> {
        let mut collection = Self::default();
        for pair in document.pairs {
            if collection.records.contains_key(&pair.id) {
                return Err(StorageError::Corrupt(format!("duplicate id {}", pair.id)));
            }
            collection.insert(pair);
        }
        Ok(collection)
    }

    fn to_document(&self) -> PairDocument {
        PairDocument {
            pairs: self.records.values().cloned().collect(),
        }
    }

    fn insert(&mut self, pair: ImagePair) {
        self.by_timestamp.insert(pair.timestamp, &pair.id);
        self.records.insert(pair.id.clone(), pair);
    }

    fn remove(&mut self, id: &str) -> Option<(usize, ImagePair)> {
        let (position, _, pair) = self.records.shift_remove_full(id)?;
        self.by_timestamp.remove(pair.timestamp, &pair.id);
        Some((position, pair))
    }

    fn restore(&mut self, position: usize, pair: ImagePair) {
        self.by_timestamp.insert(pair.timestamp, &pair.id);
        self.records.shift_insert(position, pair.id.clone(), pair);
    }
}

/// Key/value store of image pairs persisted as one JSON document.
///
/// Every mutation is written to a temporary file and renamed into place, so a failed
/// operation leaves both the file and the in-memory collection unchanged.
pub struct ImagePairStore {
    dir: PathBuf,
    collection: OnceCell<Mutex<PairCollection>>,
}

impl ImagePairStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            collection: OnceCell::new(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(PAIRS_FILE)
    }

    /// Opens the collection, creating the directory and an empty document if absent.
    pub async fn init(&self) -> Result<(), AppError> {
        self.collection().await?;
        Ok(())
    }

    pub async fn put(
        &self,
        image1: NewImage,
        image2: NewImage,
        description: Option<String>,
    ) -> Result<String, AppError> {
        let mut collection = self.collection().await?.lock().await;

        let timestamp = Utc::now().timestamp_millis();
        let id = generate_id(timestamp);
        if collection.records.contains_key(&id) {
            return Err(StorageError::DuplicateId(id).into());
        }

        let pair = ImagePair {
            id: id.clone(),
            timestamp,
            description: description.unwrap_or_default(),
            image1: image1.to_data_uri(),
            image2: image2.to_data_uri(),
            image1_name: image1.name,
            image2_name: image2.name,
        };

        collection.insert(pair);
        if let Err(err) = self.persist(&collection).await {
            collection.remove(&id);
            return Err(err.into());
        }

        info!("Stored image pair {}", id);
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<ImagePair, AppError> {
        let collection = self.collection().await?.lock().await;
        collection
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    /// All pairs, newest first.
    pub async fn list(&self) -> Result<Vec<ImagePair>, AppError> {
        let collection = self.collection().await?.lock().await;
        Ok(collection
            .by_timestamp
            .newest_first()
            .filter_map(|id| collection.records.get(id).cloned())
            .collect())
    }

    /// Removes a pair. Deleting an unknown id succeeds.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let mut collection = self.collection().await?.lock().await;
        let Some((position, pair)) = collection.remove(id) else {
            debug!("Delete of unknown pair {} ignored", id);
            return Ok(());
        };

        if let Err(err) = self.persist(&collection).await {
            collection.restore(position, pair);
            return Err(err.into());
        }

        info!("Deleted image pair {}", id);
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        let mut collection = self.collection().await?.lock().await;
        write_document(&self.dir, &PairDocument::default()).await?;
        collection.records.clear();
        collection.by_timestamp.clear();
        info!("Cleared all image pairs");
        Ok(())
    }

    async fn collection(&self) -> Result<&Mutex<PairCollection>, StorageError> {
        self.collection
            .get_or_try_init(|| async { open_collection(&self.dir).await.map(Mutex::new) })
            .await
    }

    async fn persist(&self, collection: &PairCollection) -> Result<(), StorageError> {
        write_document(&self.dir, &collection.to_document()).await
    }
}

async fn open_collection(dir: &Path) -> Result<PairCollection, StorageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| StorageError::io(dir, err))?;

    let path = dir.join(PAIRS_FILE);
    let document = match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let document = PairDocument::default();
            write_document(dir, &document).await?;
            document
        }
        Err(err) => return Err(StorageError::io(&path, err)),
    };

    let collection = PairCollection::from_document(document)?;
    info!(
        "Opened image pair store at {} ({} pairs)",
        path.display(),
        collection.records.len()
    );
    Ok(collection)
}

async fn write_document(dir: &Path, document: &PairDocument) -> Result<(), StorageError> {
    let path = dir.join(PAIRS_FILE);
    let tmp = dir.join(format!("{PAIRS_FILE}.tmp"));
    let bytes = serde_json::to_vec_pretty(document)?;

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|err| StorageError::io(&tmp, err))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|err| StorageError::io(&path, err))
}

/// `pair_<epoch millis>_<9 base-36 chars>`.
fn generate_id(timestamp: i64) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("pair_{timestamp}_{suffix}")
}
