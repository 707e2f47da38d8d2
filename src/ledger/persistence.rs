//! File-backed ledger storage.
//!
//! - Writes go to a temporary file that is synced and renamed into place.
//! - An advisory lock file (`<ledger>.lock`) serializes readers and writers.
//! - Each loaded document remembers the SHA-256 digest of the bytes it was
//!   parsed from. `save` re-reads the file under the exclusive lock and
//!   refuses to write if the digest moved ([`LedgerError::Conflict`]).
//! - `save` also refuses any document that would shorten a task's history,
//!   drop a task, rewrite `agent_communication`, or lower `stuck_count`
//!   without a passing testing-agent entry.
//!
//! The comment block at the top of a hand-kept ledger is carried through
//! load and save unchanged.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{Agent, Collection, Ledger, TaskRecord, Working};
use crate::error::{LedgerError, Result};

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

/// Default retries for [`LedgerStore::update`].
const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Banner written at the top of newly created ledgers.
pub const DEFAULT_PREAMBLE: &str = "\
#====================================================================================================
# LEDGER PROTOCOL - shared by the main agent and the testing agent
#====================================================================================================
#
# Main agent: update task records and set needs_retesting before handing off.
# Testing agent: test the tasks in test_plan.current_focus, append exactly one
# status_history entry per task, then add a note to agent_communication.
# status_history is append-only. Task records are never deleted.
#
#====================================================================================================

";

// ============================================================================
// Ledger Document
// ============================================================================

/// A ledger plus what is needed to write it back safely.
#[derive(Debug, Clone)]
pub struct LedgerDocument {
    /// The parsed ledger, free to mutate before saving.
    pub ledger: Ledger,
    preamble: String,
    digest: Option<String>,
}

impl LedgerDocument {
    /// Wrap a ledger that has never been written.
    #[must_use]
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            preamble: DEFAULT_PREAMBLE.to_string(),
            digest: None,
        }
    }

    /// Parse ledger text, keeping the leading comment block.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let (preamble, body) = split_preamble(text);
        let ledger = if body.trim().is_empty() {
            Ledger::default()
        } else {
            serde_yaml::from_str(body).map_err(|e| LedgerError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };
        Ok(Self {
            ledger,
            preamble: preamble.to_string(),
            digest: None,
        })
    }

    /// Leading comment block.
    #[must_use]
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Digest of the bytes this document was loaded from or last saved as.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Full file contents for this document.
    pub fn render(&self) -> Result<String> {
        let body = serde_yaml::to_string(&self.ledger)?;
        let mut out = String::with_capacity(self.preamble.len() + body.len() + 1);
        out.push_str(&self.preamble);
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&body);
        Ok(out)
    }
}

/// Split off leading blank and `#` comment lines.
fn split_preamble(text: &str) -> (&str, &str) {
    let mut end = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            end += line.len();
        } else {
            break;
        }
    }
    text.split_at(end)
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ============================================================================
// Append-only checks
// ============================================================================

/// Reject `next` if it is not an append-only successor of `previous`.
///
/// Records are paired by position within their collection: nothing removes
/// or reorders them, and names need not be unique in hand-kept files.
fn check_append_only(previous: &Ledger, next: &Ledger) -> Result<()> {
    for collection in [Collection::Backend, Collection::Frontend] {
        let successors = next.collection(collection);
        for (index, old) in previous.collection(collection).iter().enumerate() {
            let Some(new) = successors.get(index).filter(|n| n.name() == old.name()) else {
                return Err(LedgerError::TaskRemoved {
                    task: old.name().to_string(),
                });
            };
            check_record(old, new)?;
        }
    }

    let kept = previous.agent_communication.len();
    if next.agent_communication.len() < kept
        || next.agent_communication[..kept] != previous.agent_communication[..]
    {
        return Err(LedgerError::HistoryRewritten {
            task: "agent_communication".to_string(),
        });
    }

    Ok(())
}

fn check_record(old: &TaskRecord, new: &TaskRecord) -> Result<()> {
    let kept = old.status_history.len();
    if new.status_history.len() < kept || new.status_history[..kept] != old.status_history[..] {
        return Err(LedgerError::HistoryRewritten {
            task: old.name().to_string(),
        });
    }

    if new.stuck_count < old.stuck_count {
        let confirmed = new.status_history[kept..]
            .iter()
            .any(|e| e.agent == Agent::Testing && e.working == Working::Yes);
        if !confirmed {
            return Err(LedgerError::StuckCountDecrease {
                task: old.name().to_string(),
                current: old.stuck_count,
                requested: new.stuck_count,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Ledger Store
// ============================================================================

/// Reads and writes one ledger file.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    max_conflict_retries: u32,
}

impl LedgerStore {
    /// Create a store for the ledger at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    /// Set how many times [`update`](Self::update) retries after a conflict.
    #[must_use]
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn lock_file_path(&self) -> PathBuf {
        self.sibling(LOCK_SUFFIX)
    }

    /// Returns the path to the temporary file used for atomic writes.
    #[must_use]
    pub fn tmp_file_path(&self) -> PathBuf {
        self.sibling(TMP_SUFFIX)
    }

    /// Checks if the ledger file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("ledger"), |n| n.to_os_string());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn lock(&self, exclusive: bool) -> Result<File> {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_file_path())?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&lock_file)
        } else {
            FileExt::lock_shared(&lock_file)
        };
        locked.map_err(|e| LedgerError::Lock {
            message: format!("{}: {e}", self.lock_file_path().display()),
        })?;
        Ok(lock_file)
    }

    fn write_atomic(&self, contents: &str) -> Result<()> {
        let tmp_path = self.tmp_file_path();
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(contents.as_bytes())?;
        tmp_file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Write a fresh ledger.
    ///
    /// # Errors
    ///
    /// [`LedgerError::LedgerExists`] if the file exists and `force` is off.
    pub fn create(&self, ledger: Ledger, force: bool) -> Result<LedgerDocument> {
        self.ensure_parent()?;
        let _lock = self.lock(true)?;

        if self.exists() {
            if !force {
                return Err(LedgerError::LedgerExists {
                    path: self.path.clone(),
                });
            }
            warn!("Overwriting existing ledger {}", self.path.display());
        }

        let mut doc = LedgerDocument::new(ledger);
        let rendered = doc.render()?;
        self.write_atomic(&rendered)?;
        doc.digest = Some(digest(rendered.as_bytes()));
        info!("Created ledger {}", self.path.display());
        Ok(doc)
    }

    /// Load the ledger.
    ///
    /// # Errors
    ///
    /// [`LedgerError::MissingLedger`] if there is no file,
    /// [`LedgerError::Parse`] if it is not a valid ledger.
    pub fn load(&self) -> Result<LedgerDocument> {
        if !self.exists() {
            return Err(LedgerError::MissingLedger {
                path: self.path.clone(),
            });
        }

        let _lock = self.lock(false)?;
        let bytes = fs::read(&self.path)?;
        let loaded_digest = digest(&bytes);
        let text = String::from_utf8(bytes).map_err(|e| LedgerError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let mut doc = LedgerDocument::parse(&self.path, &text)?;
        doc.digest = Some(loaded_digest);
        debug!(
            "Loaded ledger {} ({} backend, {} frontend tasks)",
            self.path.display(),
            doc.ledger.backend.len(),
            doc.ledger.frontend.len()
        );
        Ok(doc)
    }

    /// Write `doc` back if nobody else changed the file since it was loaded.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Conflict`] if the file changed since `doc` was read
    /// - [`LedgerError::HistoryRewritten`], [`LedgerError::TaskRemoved`] or
    ///   [`LedgerError::StuckCountDecrease`] if `doc` is not an append-only
    ///   successor of the file on disk
    pub fn save(&self, doc: &mut LedgerDocument) -> Result<()> {
        self.ensure_parent()?;
        let _lock = self.lock(true)?;

        let on_disk = match fs::read(&self.path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let current = on_disk.as_deref().map(digest);
        if current != doc.digest {
            warn!(
                "Ledger {} changed on disk since it was loaded",
                self.path.display()
            );
            return Err(LedgerError::Conflict {
                path: self.path.clone(),
            });
        }

        if let Some(bytes) = &on_disk {
            let previous = LedgerDocument::parse(&self.path, &String::from_utf8_lossy(bytes))?;
            check_append_only(&previous.ledger, &doc.ledger)?;
        }

        let rendered = doc.render()?;
        self.write_atomic(&rendered)?;
        doc.digest = Some(digest(rendered.as_bytes()));
        debug!("Saved ledger {}", self.path.display());
        Ok(())
    }

    /// Load, apply `f`, save; on a conflict reload and try again.
    ///
    /// `f` may run more than once, so it should only describe the change
    /// (append this entry, set that flag) rather than depend on state read
    /// outside it.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use agent_ledger::ledger::{Agent, LedgerStore};
    ///
    /// let store = LedgerStore::new("test_result.md");
    /// store.update(|ledger| {
    ///     ledger.communicate(Agent::Main, "Backend ready for testing");
    ///     Ok(())
    /// })?;
    /// # Ok::<(), agent_ledger::LedgerError>(())
    /// ```
    pub fn update<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Ledger) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let mut doc = self.load()?;
            let value = f(&mut doc.ledger)?;
            match self.save(&mut doc) {
                Ok(()) => return Ok(value),
                Err(e) if e.is_conflict() && attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        "Conflict writing {}, retrying ({}/{})",
                        self.path.display(),
                        attempt,
                        self.max_conflict_retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
