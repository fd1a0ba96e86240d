//! Content stores: resolve a request path to a readable backing resource

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// A resource opened read-only for one task. Reads are positioned, so no
/// cursor is shared with anyone.
pub trait ContentSource: Send {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

pub trait ContentStore: Send + Sync + 'static {
    type Source: ContentSource;

    /// `Ok(None)` means the resource does not exist; `Err` means it exists
    /// but could not be inspected.
    fn resolve(&self, path: &str) -> io::Result<Option<Self::Source>>;
}

/// An open file plus the length reported by `metadata()` at open time.
pub struct FileContent {
    file: File,
    len: u64,
}

impl FileContent {
    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(FileContent { file, len })
    }

    /// Missing or unopenable file is absent; a failed stat is an error.
    fn open(path: &Path) -> io::Result<Option<Self>> {
        match File::open(path) {
            Ok(file) => FileContent::from_file(file).map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl ContentSource for FileContent {
    fn len(&self) -> u64 {
        self.len
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }
}

/// Explicit mapping from request path to local file, loaded from a content
/// file with one `key path` pair per line.
#[derive(Debug, Default)]
pub struct ContentMap {
    entries: HashMap<String, PathBuf>,
}

impl ContentMap {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read content map {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid content map {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, file) = match line.split_once(char::is_whitespace) {
                Some((k, f)) if !f.trim().is_empty() => (k, f.trim()),
                _ => bail!("line {}: expected `<key> <path>`", lineno + 1),
            };
            entries.insert(key.to_string(), PathBuf::from(file));
        }
        Ok(ContentMap { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContentStore for ContentMap {
    type Source = FileContent;

    fn resolve(&self, path: &str) -> io::Result<Option<FileContent>> {
        match self.entries.get(path) {
            Some(file) => FileContent::open(file),
            None => Ok(None),
        }
    }
}

/// Serves regular files below a root directory.
#[derive(Debug, Clone)]
pub struct RootStore {
    root: PathBuf,
}

impl RootStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            bail!("Root path is not a directory: {}", root.display());
        }
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("Failed to canonicalize root path: {}", root.display()))?;
        Ok(RootStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path onto the root. Anything that could leave the root
    /// (parent components, NUL, a symlink pointing outside) yields `None`.
    fn locate(&self, request: &str) -> Option<PathBuf> {
        if request.contains('\0') {
            return None;
        }
        let mut rel = PathBuf::new();
        for component in Path::new(request.trim_start_matches('/')).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(s) => rel.push(s),
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        if rel.as_os_str().is_empty() {
            return None;
        }
        let full = self.root.join(rel).canonicalize().ok()?;
        if !full.starts_with(&self.root) || !full.is_file() {
            return None;
        }
        Some(full)
    }
}

impl ContentStore for RootStore {
    type Source = FileContent;

    fn resolve(&self, path: &str) -> io::Result<Option<FileContent>> {
        match self.locate(path) {
            Some(full) => FileContent::open(&full),
            None => Ok(None),
        }
    }
}

/// Largest accepted `--delay`, in microseconds.
pub const MAX_DELAY_US: u64 = 5_000_000;

/// Sleeps before every lookup; used to simulate slow storage.
pub struct Delayed<S> {
    inner: S,
    delay: Duration,
}

impl<S> Delayed<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Delayed { inner, delay }
    }
}

impl<S: ContentStore> ContentStore for Delayed<S> {
    type Source = S::Source;

    fn resolve(&self, path: &str) -> io::Result<Option<S::Source>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.resolve(path)
    }
}
