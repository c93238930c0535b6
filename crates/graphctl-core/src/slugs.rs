//! Short local aliases for long remote resource identifiers.
//!
//! Graph identifiers are long base64-ish strings nobody wants to type. The
//! registry hands out an 8-character lowercase hex slug per identifier,
//! derived from a SHA-256 digest, and remembers the binding in
//! `slugs.json` so the same slug works in later invocations.
//!
//! The table is loaded lazily on first use and written back after every
//! new binding. Disk problems never fail a lookup: an unreadable table
//! starts empty, and an unwritable one leaves the registry running from
//! memory for the rest of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// Slug file name in the config directory
const SLUG_FILE: &str = "slugs.json";

/// Every slug is exactly this many lowercase hex characters.
pub const SLUG_LEN: usize = 8;

/// Input longer than this is taken to be a full identifier already.
pub const SHORT_ID_THRESHOLD: usize = SLUG_LEN;

/// Collision attempts that patch the trailing two characters before
/// falling back to rehashing.
const PATCH_ATTEMPTS: u32 = 256;

#[derive(Error, Debug)]
pub enum SlugError {
    #[error("Slug table I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Slug table is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Slug table is inconsistent: {0}")]
    Inconsistent(String),
}

/// Both directions of the id/slug binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugTable {
    #[serde(default)]
    id_to_slug: HashMap<String, String>,
    #[serde(default)]
    slug_to_id: HashMap<String, String>,
}

impl SlugTable {
    pub fn len(&self) -> usize {
        self.id_to_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_slug.is_empty()
    }

    /// Check that the two maps describe the same one-to-one binding.
    pub fn validate(&self) -> Result<(), SlugError> {
        if self.id_to_slug.len() != self.slug_to_id.len() {
            return Err(SlugError::Inconsistent(format!(
                "{} ids but {} slugs",
                self.id_to_slug.len(),
                self.slug_to_id.len()
            )));
        }
        for (id, slug) in &self.id_to_slug {
            if !is_slug(slug) {
                return Err(SlugError::Inconsistent(format!("malformed slug {:?}", slug)));
            }
            if self.slug_to_id.get(slug) != Some(id) {
                return Err(SlugError::Inconsistent(format!(
                    "slug {} does not map back to its id",
                    slug
                )));
            }
        }
        Ok(())
    }

    fn insert(&mut self, id: &str, slug: &str) {
        self.id_to_slug.insert(id.to_string(), slug.to_string());
        self.slug_to_id.insert(slug.to_string(), id.to_string());
    }

    /// Find a free slug for `id`, starting from its digest.
    fn allocate(&self, id: &str) -> String {
        let mut attempt = 0u32;
        loop {
            let slug = candidate(id, attempt);
            match self.slug_to_id.get(&slug) {
                None => return slug,
                Some(bound) if bound == id => return slug,
                Some(_) => {
                    debug!(slug = %slug, attempt, "Slug collision");
                    attempt += 1;
                }
            }
        }
    }
}

fn is_slug(s: &str) -> bool {
    s.len() == SLUG_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Candidate slug for `id` on the given collision attempt.
///
/// Attempt 0 is the digest prefix. The next attempts overwrite the last
/// two characters with the attempt number; after that the id is rehashed
/// with the attempt number appended.
fn candidate(id: &str, attempt: u32) -> String {
    let digest = if attempt < PATCH_ATTEMPTS {
        Sha256::digest(id.as_bytes())
    } else {
        Sha256::digest(format!("{}#{}", id, attempt).as_bytes())
    };
    let mut slug = hex::encode(digest);
    slug.truncate(SLUG_LEN);
    if (1..PATCH_ATTEMPTS).contains(&attempt) {
        slug.replace_range(SLUG_LEN - 2.., &format!("{:02x}", attempt));
    }
    slug
}

fn load_table(path: &Path) -> Result<SlugTable, SlugError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SlugTable::default()),
        Err(e) => return Err(e.into()),
    };
    let table: SlugTable = serde_json::from_str(&contents)?;
    table.validate()?;
    Ok(table)
}

fn save_table(path: &Path, table: &SlugTable) -> Result<(), SlugError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(table)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Process-wide id/slug registry. Construct once and share by reference.
pub struct SlugRegistry {
    path: Option<PathBuf>,
    /// `None` until the table has been read from disk.
    table: Mutex<Option<SlugTable>>,
    memory_only: AtomicBool,
}

impl SlugRegistry {
    /// Registry backed by the JSON file at `path`.
    pub fn open(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            table: Mutex::new(None),
            memory_only: AtomicBool::new(false),
        }
    }

    /// Registry backed by the default slug file inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::open(dir.join(SLUG_FILE))
    }

    /// Registry that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            table: Mutex::new(Some(SlugTable::default())),
            memory_only: AtomicBool::new(true),
        }
    }

    /// Short slug for `id`, allocating and persisting one if needed.
    pub fn compress(&self, id: &str) -> String {
        if id.is_empty() {
            return String::new();
        }

        let mut guard = self.lock();
        let table = guard.get_or_insert_with(|| self.load());
        if let Some(slug) = table.id_to_slug.get(id) {
            return slug.clone();
        }

        let slug = table.allocate(id);
        table.insert(id, &slug);
        self.persist(table);
        slug
    }

    /// Full identifier for user input that may be a slug.
    ///
    /// Long input and unknown slugs come back unchanged.
    pub fn expand(&self, token: &str) -> String {
        if token.is_empty() {
            return String::new();
        }
        if token.len() > SHORT_ID_THRESHOLD {
            return token.to_string();
        }

        let mut guard = self.lock();
        let table = guard.get_or_insert_with(|| self.load());
        table
            .slug_to_id
            .get(&token.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| token.to_string())
    }

    /// Forget every binding and persist the empty table.
    pub fn clear(&self) {
        let mut guard = self.lock();
        let table = guard.insert(SlugTable::default());
        self.persist(table);
    }

    /// Number of bound identifiers.
    pub fn len(&self) -> usize {
        let mut guard = self.lock();
        guard.get_or_insert_with(|| self.load()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when bindings are not (or no longer) reaching disk.
    pub fn is_memory_only(&self) -> bool {
        self.memory_only.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Option<SlugTable>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> SlugTable {
        let Some(path) = &self.path else {
            return SlugTable::default();
        };
        match load_table(path) {
            Ok(table) => {
                debug!(entries = table.len(), "Slug table loaded");
                table
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Ignoring unreadable slug table");
                SlugTable::default()
            }
        }
    }

    /// Write the table back. Failure switches the registry to memory-only
    /// mode instead of failing the caller.
    fn persist(&self, table: &SlugTable) {
        let Some(path) = &self.path else {
            return;
        };
        match save_table(path, table) {
            Ok(()) => self.memory_only.store(false, Ordering::Relaxed),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Slug table not saved, keeping it in memory");
                self.memory_only.store(true, Ordering::Relaxed);
            }
        }
    }
}
