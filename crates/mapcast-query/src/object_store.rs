//! Object storage the daemon reads claim batches from and publishes to.
//!
//! Backends:
//! - [`S3ObjectStore`] - any S3-compatible service (R2, MinIO, AWS)
//! - [`FsObjectStore`] - a directory per bucket under a root directory
//! - [`MemoryObjectStore`] - in-process, with per-key failure injection

use crate::config::QueryConfig;
use crate::error::{Error, Result};
use ::object_store::aws::{AmazonS3, AmazonS3Builder};
use ::object_store::path::Path as ObjectPath;
use ::object_store::{
    Attribute, Attributes, ObjectStore as RemoteStore, PutOptions as RemotePutOptions, PutPayload,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Headers attached to a published object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    pub content_type: String,
    /// `Cache-Control: max-age` in seconds
    pub cache_max_age_secs: u32,
}

impl PutOptions {
    /// JSON document with the given freshness.
    pub fn json(cache_max_age_secs: u32) -> Self {
        Self {
            content_type: "application/json".to_string(),
            cache_max_age_secs,
        }
    }

    pub fn cache_control(&self) -> String {
        format!("max-age={}", self.cache_max_age_secs)
    }
}

/// Minimal bucket/key object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every key in a bucket.
    async fn list(&self, bucket: &str) -> Result<Vec<String>>;

    /// Read an object as UTF-8 text.
    async fn get(&self, bucket: &str, key: &str) -> Result<String>;

    /// Create or overwrite an object.
    async fn put(&self, bucket: &str, key: &str, body: String, options: PutOptions) -> Result<()>;

    /// Delete an object.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

/// Build the backend named by the configured endpoint.
///
/// Supported schemes: `http(s)://` (S3-compatible), `file://<root>` and
/// `memory://`.
pub fn from_config(config: &QueryConfig) -> Result<Arc<dyn ObjectStore>> {
    let endpoint = config.endpoint.as_str();
    if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
        return Ok(Arc::new(S3ObjectStore::new(
            endpoint,
            &config.access_key_id,
            &config.secret_access_key,
            &config.region,
        )));
    }
    if let Some(root) = endpoint.strip_prefix("file://") {
        if root.is_empty() {
            return Err(Error::Config("file:// endpoint needs a root directory".into()));
        }
        return Ok(Arc::new(FsObjectStore::new(root)));
    }
    if endpoint == "memory://" {
        return Ok(Arc::new(MemoryObjectStore::new()));
    }
    Err(Error::Config(format!("unsupported object store endpoint: {endpoint}")))
}

/// Reject keys that would escape their bucket directory.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key == "." || key == ".." {
        return Err(Error::object_store("validate", key, "invalid object key"));
    }
    Ok(())
}

/// Bucket names follow key rules; a leading `.` is reserved for bookkeeping.
fn validate_bucket(bucket: &str) -> Result<()> {
    validate_key(bucket)?;
    if bucket.starts_with('.') {
        return Err(Error::object_store("validate", bucket, "reserved bucket name"));
    }
    Ok(())
}

// --- S3 backend ---

/// S3-compatible store addressed with path-style requests.
///
/// One client is built per bucket on first use and reused afterwards.
pub struct S3ObjectStore {
    endpoint: String,
    access_key_id: String,
    secret_access_key: String,
    region: String,
    clients: Mutex<HashMap<String, Arc<AmazonS3>>>,
}

impl S3ObjectStore {
    pub fn new(endpoint: &str, access_key_id: &str, secret_access_key: &str, region: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            region: region.to_string(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self, bucket: &str) -> Result<Arc<AmazonS3>> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| Error::object_store("connect", bucket, "client cache poisoned"))?;
        if let Some(client) = clients.get(bucket) {
            return Ok(Arc::clone(client));
        }

        let client = AmazonS3Builder::new()
            .with_endpoint(self.endpoint.as_str())
            .with_allow_http(self.endpoint.starts_with("http://"))
            .with_region(self.region.as_str())
            .with_access_key_id(self.access_key_id.as_str())
            .with_secret_access_key(self.secret_access_key.as_str())
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::object_store("connect", bucket, e))?;
        let client = Arc::new(client);
        clients.insert(bucket.to_string(), Arc::clone(&client));
        Ok(client)
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let client = self.client(bucket)?;
        let mut keys: Vec<String> = client
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .map_err(|e| Error::object_store("list", bucket, e))?;
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<String> {
        let client = self.client(bucket)?;
        let bytes = client
            .get(&ObjectPath::from(key))
            .await
            .map_err(|e| Error::object_store("get", key, e))?
            .bytes()
            .await
            .map_err(|e| Error::object_store("get", key, e))?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::object_store("get", key, e))
    }

    async fn put(&self, bucket: &str, key: &str, body: String, options: PutOptions) -> Result<()> {
        let client = self.client(bucket)?;
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, options.content_type.clone().into());
        attributes.insert(Attribute::CacheControl, options.cache_control().into());
        let put = RemotePutOptions {
            attributes,
            ..Default::default()
        };
        client
            .put_opts(&ObjectPath::from(key), PutPayload::from(body.into_bytes()), put)
            .await
            .map(|_| ())
            .map_err(|e| Error::object_store("put", key, e))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let client = self.client(bucket)?;
        client
            .delete(&ObjectPath::from(key))
            .await
            .map_err(|e| Error::object_store("delete", key, e))
    }
}

// --- Filesystem backend ---

/// Buckets as directories under `root`; put metadata lives in `root/.meta`
/// and in-progress writes in `root/.staging`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        validate_bucket(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    fn meta_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        Ok(self.root.join(".meta").join(bucket).join(format!("{key}.json")))
    }

    fn staging_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        Ok(self.root.join(".staging").join(bucket).join(key))
    }

    /// Headers recorded for a published object.
    pub async fn put_options(&self, bucket: &str, key: &str) -> Result<Option<PutOptions>> {
        let path = self.meta_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let dir = self.bucket_dir(bucket)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::object_store("list", bucket, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::object_store("list", bucket, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| Error::object_store("list", bucket, e))?
                .is_file();
            if let (true, Some(name)) = (is_file, entry.file_name().to_str()) {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<String> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::object_store("get", key, e))
    }

    async fn put(&self, bucket: &str, key: &str, body: String, options: PutOptions) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        let meta = self.meta_path(bucket, key)?;
        let tmp = self.staging_path(bucket, key)?;
        let write = async {
            tokio::fs::create_dir_all(self.bucket_dir(bucket)?).await?;
            for dir in [meta.parent(), tmp.parent()].into_iter().flatten() {
                tokio::fs::create_dir_all(dir).await?;
            }

            // Write then rename so readers never see a partial document.
            tokio::fs::write(&tmp, body).await?;
            tokio::fs::rename(&tmp, &path).await?;
            tokio::fs::write(&meta, serde_json::to_vec(&options)?).await?;
            Ok::<(), Error>(())
        };
        write.await.map_err(|e| Error::object_store("put", key, e))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::object_store("delete", key, e))
    }
}

// --- In-memory backend ---

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: String,
    pub options: Option<PutOptions>,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    failing_gets: HashSet<String>,
    failing_deletes: HashSet<String>,
    failing_puts: HashSet<String>,
}

/// In-process object store.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::object_store("lock", "memory", "state poisoned"))
    }

    /// Seed an object without put metadata (as an uploader would).
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<String>) -> Result<()> {
        self.lock()?.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                body: body.into(),
                options: None,
            },
        );
        Ok(())
    }

    /// Current object, if any.
    pub fn object(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>> {
        Ok(self
            .lock()?
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned())
    }

    /// Make every `get` of `key` fail.
    pub fn fail_get(&self, key: &str) -> Result<()> {
        self.lock()?.failing_gets.insert(key.to_string());
        Ok(())
    }

    /// Make every `delete` of `key` fail.
    pub fn fail_delete(&self, key: &str) -> Result<()> {
        self.lock()?.failing_deletes.insert(key.to_string());
        Ok(())
    }

    /// Make every `put` of `key` fail.
    pub fn fail_put(&self, key: &str) -> Result<()> {
        self.lock()?.failing_puts.insert(key.to_string());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<String> {
        let state = self.lock()?;
        if state.failing_gets.contains(key) {
            return Err(Error::object_store("get", key, "injected failure"));
        }
        state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.body.clone())
            .ok_or_else(|| Error::object_store("get", key, "no such key"))
    }

    async fn put(&self, bucket: &str, key: &str, body: String, options: PutOptions) -> Result<()> {
        let mut state = self.lock()?;
        if state.failing_puts.contains(key) {
            return Err(Error::object_store("put", key, "injected failure"));
        }
        state.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                body,
                options: Some(options),
            },
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.lock()?;
        if state.failing_deletes.contains(key) {
            return Err(Error::object_store("delete", key, "injected failure"));
        }
        state
            .buckets
            .get_mut(bucket)
            .and_then(|objects| objects.remove(key))
            .map(|_| ())
            .ok_or_else(|| Error::object_store("delete", key, "no such key"))
    }
}
