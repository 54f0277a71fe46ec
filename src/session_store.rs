//! Storage for the single session token.
//!
//! Exactly one token exists at a time.  It is written on login, overwritten on re-login, and
//! cleared on logout or whenever the remote API answers 401.  There is no expiry tracking: the
//! server is the only authority on whether a token is still good.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Directory under `$HOME` that holds palaver's state.
const STATE_DIR: &str = ".palaver";

/// File name of the persisted token.
const TOKEN_FILE: &str = "token.json";

/// An opaque bearer credential issued at login.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Read/write/clear access to the persisted session token.
pub trait TokenStore: Send + Sync {
    /// Persist `token`, replacing any previous one.
    fn save(&self, token: &SessionToken) -> Result<()>;

    /// Return the stored token, if any.
    fn read(&self) -> Result<Option<SessionToken>>;

    /// Remove the stored token.  Clearing an empty store succeeds.
    fn clear(&self) -> Result<()>;
}

/////////////////////////////////////////// Memory ///////////////////////////////////////////

/// A process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<SessionToken>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(SessionToken::new(token))),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<SessionToken>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, token: &SessionToken) -> Result<()> {
        *self.slot() = Some(token.clone());
        Ok(())
    }

    fn read(&self) -> Result<Option<SessionToken>> {
        Ok(self.slot().clone())
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

//////////////////////////////////////////// File ////////////////////////////////////////////

/// A token store backed by a small JSON file.
///
/// Survives process restarts, but not an explicit [`TokenStore::clear`].
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store that keeps its token at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at the default location, `$HOME/.palaver/token.json`.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    /// The default token path.
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| Error::config("HOME is not set; pass --token-file"))?;
        Ok(PathBuf::from(home).join(STATE_DIR).join(TOKEN_FILE))
    }

    /// The path this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_for_write(&self) -> Result<File> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options
            .open(&self.path)
            .map_err(|err| Error::io("failed to create token file", err))?;
        // `mode` only applies on creation; tighten a file that predates us.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(|err| Error::io("failed to restrict token file permissions", err))?;
        }
        Ok(file)
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, token: &SessionToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| Error::io("failed to create token directory", err))?;
            }
        }
        let file = self.open_for_write()?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &TokenFile::new(token)).map_err(|err| {
            Error::serialization("failed to serialize token file", Some(Box::new(err)))
        })?;
        writer
            .flush()
            .map_err(|err| Error::io("failed to write token file", err))
    }

    fn read(&self) -> Result<Option<SessionToken>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::io("failed to open token file", err)),
        };
        let contents: TokenFile = serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            Error::serialization("failed to parse token file", Some(Box::new(err)))
        })?;
        if contents.access_token.is_empty() {
            return Ok(None);
        }
        Ok(Some(SessionToken::new(contents.access_token)))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io("failed to remove token file", err)),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TokenFile {
    version: u8,
    access_token: String,
}

impl TokenFile {
    fn new(token: &SessionToken) -> Self {
        Self {
            version: 1,
            access_token: token.as_str().to_string(),
        }
    }
}
