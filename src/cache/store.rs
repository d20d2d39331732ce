use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Byte-level persistence behind the cache.
pub trait DurableStore: Send + Sync {
    /// `Ok(None)` when nothing has been written yet.
    fn read_all(&self) -> io::Result<Option<Vec<u8>>>;

    fn write_all(&self, bytes: &[u8]) -> io::Result<()>;
}

/// A single file, replaced atomically on every write.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cache".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DurableStore for FileStore {
    fn read_all(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)
    }
}

/// In-process store. Clones share the same buffer, so a test can keep a
/// handle and inspect what the cache wrote.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(Some(bytes.into()))),
            fail_writes: false,
        }
    }

    /// A store whose writes always fail.
    pub fn read_only(self) -> Self {
        Self {
            fail_writes: true,
            ..self
        }
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.bytes.lock().ok().and_then(|guard| guard.clone())
    }
}

impl DurableStore for MemoryStore {
    fn read_all(&self) -> io::Result<Option<Vec<u8>>> {
        self.bytes
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store poisoned"))
    }

    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "memory store is read-only",
            ));
        }
        let mut guard = self
            .bytes
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store poisoned"))?;
        *guard = Some(bytes.to_vec());
        Ok(())
    }
}
