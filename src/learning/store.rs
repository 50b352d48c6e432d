//! 模型 Blob 存储
//!
//! PolicyModel 只通过 `BlobStore` 读写不透明的字节块；找不到条目返回 `Ok(None)`（首次启动的正常路径）。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::AgentError;

/// 外部 Blob 存储：按 key 读写字节块
pub trait BlobStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, AgentError>;

    fn save(&self, key: &str, blob: &[u8]) -> Result<(), AgentError>;
}

fn check_key(key: &str) -> Result<(), AgentError> {
    if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
        return Err(AgentError::Store(format!("invalid blob key: {key:?}")));
    }
    Ok(())
}

/// 文件存储：每个 key 对应目录下的 `<key>.blob`
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.blob"))
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, AgentError> {
        check_key(key)?;
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::Store(format!("read {key}: {e}"))),
        }
    }

    /// 先写临时文件再 rename，重复保存结果一致
    fn save(&self, key: &str, blob: &[u8]) -> Result<(), AgentError> {
        check_key(key)?;
        std::fs::create_dir_all(&self.root)
            .map_err(|e| AgentError::Store(format!("create {}: {e}", self.root.display())))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("blob.tmp");
        std::fs::write(&tmp, blob).map_err(|e| AgentError::Store(format!("write {key}: {e}")))?;
        std::fs::rename(&tmp, &path).map_err(|e| AgentError::Store(format!("rename {key}: {e}")))?;
        Ok(())
    }
}

/// 内存存储（测试与一次性运行）
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .map(|blobs| blobs.contains_key(key))
            .unwrap_or(false)
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, AgentError> {
        check_key(key)?;
        let blobs = self
            .blobs
            .lock()
            .map_err(|e| AgentError::Store(e.to_string()))?;
        Ok(blobs.get(key).cloned())
    }

    fn save(&self, key: &str, blob: &[u8]) -> Result<(), AgentError> {
        check_key(key)?;
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| AgentError::Store(e.to_string()))?;
        blobs.insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}
