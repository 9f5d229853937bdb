//! Signed-in session: bearer token plus user identity.
//!
//! The session is an explicit object shared by every request instead of a
//! token read from ambient storage. [`SessionHandle`] owns the current
//! session, persists it through a [`SessionStore`], and hosts the one
//! authentication-failure handler for the whole client:
//! [`SessionHandle::handle_unauthorized`].
//!
//! Session files hold a bearer token and are treated like secrets: written
//! with mode 0600 and refused on load when group or other bits are set.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::telemetry;
use crate::{MarketError, Result};

/// Role of a marketplace user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Posts jobs and reviews proposals.
    #[serde(alias = "Customer")]
    Customer,
    /// Bids on jobs and fulfils them.
    #[serde(alias = "Artisan")]
    Artisan,
    #[serde(alias = "Admin")]
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Customer => "customer",
            Role::Artisan => "artisan",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Role {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "artisan" => Ok(Role::Artisan),
            "admin" => Ok(Role::Admin),
            other => Err(MarketError::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A signed-in session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: SessionUser,
}

impl Session {
    pub fn new(token: impl Into<String>, user: SessionUser) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }
}

// Keep bearer tokens out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// Persistent storage for the session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the stored session, if any.
    async fn load(&self) -> Result<Option<Session>>;

    /// Persist a session, replacing any previous one.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Remove the stored session.
    async fn clear(&self) -> Result<()>;
}

/// In-memory store. Nothing survives the process.
#[derive(Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a session.
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file store, one session per file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `~/.atelier/session.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".atelier")
            .join("session.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the session file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    async fn check_permissions(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            MarketError::Session(format!("failed to stat {}: {e}", self.path.display()))
        })?;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(MarketError::Session(format!(
                "session file {} has insecure permissions {:o}; must be 0600 or 0400",
                self.path.display(),
                mode & 0o777
            )));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn check_permissions(&self) -> Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    async fn restrict_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| MarketError::Session(format!("failed to chmod {}: {e}", path.display())))
    }

    #[cfg(not(unix))]
    async fn restrict_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MarketError::Session(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        self.check_permissions().await?;
        serde_json::from_str(&content).map(Some).map_err(|e| {
            MarketError::Session(format!("corrupt session file {}: {e}", self.path.display()))
        })
    }

    /// Atomic write via tmp + rename; the tmp file is restricted before the
    /// token is written to it.
    async fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MarketError::Session(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(session)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, b"")
            .await
            .map_err(|e| MarketError::Session(format!("failed to create {}: {e}", tmp.display())))?;
        Self::restrict_permissions(&tmp).await?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| MarketError::Session(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            MarketError::Session(format!("failed to rename to {}: {e}", self.path.display()))
        })
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MarketError::Session(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// Callback run when the server rejects the session.
pub type AuthFailureHook = Arc<dyn Fn(&SessionUser) + Send + Sync>;

struct HandleInner {
    current: RwLock<Option<Session>>,
    store: Arc<dyn SessionStore>,
    hooks: RwLock<Vec<AuthFailureHook>>,
}

/// Shared handle to the current session.
///
/// Cheap to clone; every clone sees the same session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    /// Handle backed by `store`, with no session loaded yet.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                current: RwLock::new(None),
                store,
                hooks: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Handle backed by an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// Load the persisted session into memory. Returns whether one was found.
    pub async fn restore(&self) -> Result<bool> {
        let session = self.inner.store.load().await?;
        let found = session.is_some();
        if let Some(ref s) = session {
            info!(user = %s.user.id, role = %s.user.role, "restored session");
        }
        *self.write() = session;
        Ok(found)
    }

    /// Sign in: persist and activate `session`.
    pub async fn login(&self, session: Session) -> Result<()> {
        self.inner.store.save(&session).await?;
        info!(user = %session.user.id, role = %session.user.role, "signed in");
        *self.write() = Some(session);
        Ok(())
    }

    /// Sign out and forget the persisted session.
    pub async fn logout(&self) -> Result<()> {
        *self.write() = None;
        self.inner.store.clear().await?;
        info!("signed out");
        Ok(())
    }

    /// Current session, if signed in.
    pub fn current(&self) -> Option<Session> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current bearer token, if signed in.
    pub fn token(&self) -> Option<String> {
        self.current().map(|s| s.token)
    }

    /// Current user, or `NotAuthenticated`.
    pub fn require_user(&self) -> Result<SessionUser> {
        self.current()
            .map(|s| s.user)
            .ok_or(MarketError::NotAuthenticated)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Register a hook to run when the server rejects the session.
    pub fn on_auth_failure(&self, hook: impl Fn(&SessionUser) + Send + Sync + 'static) {
        self.inner
            .hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// React to a 401 for a request sent with `token_used`.
    ///
    /// Clears the session in memory and in the store, then runs the
    /// registered hooks. Only the first 401 for a given token does this;
    /// later ones for the same (already cleared) token return `false`
    /// without side effects. Returns whether the session was cleared.
    pub async fn handle_unauthorized(&self, token_used: Option<&str>) -> bool {
        let cleared = {
            let mut current = self.write();
            match current.as_ref() {
                Some(s) if Some(s.token.as_str()) == token_used => current.take(),
                _ => None,
            }
        };
        let Some(session) = cleared else {
            return false;
        };

        metrics::counter!(telemetry::AUTH_FAILURES_TOTAL).increment(1);
        warn!(user = %session.user.id, "session rejected by server; signing out");
        if let Err(e) = self.inner.store.clear().await {
            warn!(error = %e, "failed to clear stored session");
        }

        let hooks = self
            .inner
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            hook(&session.user);
        }
        true
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Session>> {
        self.inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
