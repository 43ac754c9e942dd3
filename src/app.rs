use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::{Authenticator, Credentials, LocalAuth, RemoteAuth, Session};
use crate::config::{data_dir, BackendMode, Config};
use crate::error::{RebanhoError, Result};
use crate::remote::{PostgrestClient, RealtimeFeed};
use crate::storage::{Backend, BlobStore, EntityService, SqliteBlobStore};
use crate::views::{CollectionView, KnowledgeList, NoticeBoard, RadarList, TaskList};

/// Local blob holding the signed-in session.
pub const SESSION_KEY: &str = "rebanho.sessao";

/// Everything a running client needs: the chosen backend, one view per
/// entity type, and the current session.
pub struct App {
    config: Config,
    mode: BackendMode,
    blobs: Arc<dyn BlobStore>,
    auth: Arc<dyn Authenticator>,
    client: Option<Arc<PostgrestClient>>,
    session: Option<Session>,
    tasks: TaskList,
    notices: NoticeBoard,
    knowledge: KnowledgeList,
    radar: RadarList,
}

fn view<E: crate::entity::Record>(backend: &Backend, blobs: &Arc<dyn BlobStore>) -> CollectionView<E> {
    CollectionView::new(Arc::new(EntityService::new(backend.clone(), blobs.clone())))
}

impl App {
    /// Open the project at `root` with `config` (env overrides already
    /// applied). The backend is chosen here, once.
    pub fn open(root: &Path, config: Config) -> Result<Self> {
        let blobs: Arc<dyn BlobStore> = Arc::new(SqliteBlobStore::open(&data_dir(root))?);
        let mode = config.backend_mode();

        let (backend, client, auth): (Backend, _, Arc<dyn Authenticator>) = match &mode {
            BackendMode::Remote(creds) => {
                let client = Arc::new(PostgrestClient::new(&creds.url, &creds.api_key)?);
                let auth: Arc<dyn Authenticator> =
                    Arc::new(RemoteAuth::new(&creds.url, &creds.api_key)?);
                (Backend::Remote(client.clone()), Some(client), auth)
            }
            BackendMode::Local => (
                Backend::Local,
                None,
                Arc::new(LocalAuth::new(config.local_users.clone())) as Arc<dyn Authenticator>,
            ),
        };

        info!(mode = %mode, "backend selected");
        Self::assemble(config, mode, backend, client, blobs, auth)
    }

    /// Build an app around explicit parts.
    pub fn with_parts(
        config: Config,
        backend: Backend,
        blobs: Arc<dyn BlobStore>,
        auth: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        let mode = match &backend {
            Backend::Remote(_) => config.backend_mode(),
            Backend::Local => BackendMode::Local,
        };
        Self::assemble(config, mode, backend, None, blobs, auth)
    }

    fn assemble(
        config: Config,
        mode: BackendMode,
        backend: Backend,
        client: Option<Arc<PostgrestClient>>,
        blobs: Arc<dyn BlobStore>,
        auth: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        let mut app = Self {
            tasks: view(&backend, &blobs),
            notices: view(&backend, &blobs),
            knowledge: view(&backend, &blobs),
            radar: view(&backend, &blobs),
            config,
            mode,
            blobs,
            auth,
            client,
            session: None,
        };
        app.restore_session()?;
        Ok(app)
    }

    fn restore_session(&mut self) -> Result<()> {
        let Some(text) = self.blobs.read(SESSION_KEY)? else {
            return Ok(());
        };
        match serde_json::from_str::<Session>(&text) {
            Ok(session) => self.set_session(Some(session)),
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored session");
                self.blobs.remove(SESSION_KEY)?;
            }
        }
        Ok(())
    }

    fn set_session(&mut self, session: Option<Session>) {
        if let Some(client) = &self.client {
            client.set_access_token(session.as_ref().and_then(|s| s.access_token.clone()));
        }
        self.session = session;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> &BackendMode {
        &self.mode
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn require_session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(RebanhoError::NotAuthenticated)
    }

    pub async fn sign_in(&mut self, credentials: &Credentials) -> Result<&Session> {
        let session = self.auth.sign_in(credentials).await?;
        self.blobs.write(SESSION_KEY, &serde_json::to_string(&session)?)?;
        self.set_session(Some(session));
        self.require_session()
    }

    /// Drop the session and everything shown in the views. Stored
    /// collections are kept.
    pub async fn sign_out(&mut self) -> Result<()> {
        if let Some(session) = self.session.clone() {
            if let Err(e) = self.auth.sign_out(&session).await {
                warn!(error = %e, "remote sign-out failed, clearing local session anyway");
            }
            info!(email = %session.email, "signed out");
        }
        self.blobs.remove(SESSION_KEY)?;
        self.set_session(None);

        self.tasks.clear();
        self.notices.clear();
        self.knowledge.clear();
        self.radar.clear();
        Ok(())
    }

    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn knowledge(&self) -> &KnowledgeList {
        &self.knowledge
    }

    pub fn radar(&self) -> &RadarList {
        &self.radar
    }

    /// Reload every view.
    pub async fn reload_all(&self) -> Result<()> {
        self.tasks.reload().await?;
        self.notices.reload().await?;
        self.knowledge.reload().await?;
        self.radar.reload().await?;
        Ok(())
    }

    /// Open the realtime socket. `None` in local mode.
    pub async fn connect_feed(&self) -> Result<Option<RealtimeFeed>> {
        match &self.mode {
            BackendMode::Remote(creds) => {
                Ok(Some(RealtimeFeed::connect(&creds.url, &creds.api_key).await?))
            }
            BackendMode::Local => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserRole;
    use crate::config::LocalUser;
    use crate::entity::NewKnowledgeEntry;
    use crate::storage::MemoryBlobStore;

    fn config() -> Config {
        Config {
            local_users: vec![LocalUser {
                email: "maria@fazenda.com".to_string(),
                password: "segredo".to_string(),
                name: Some("Maria".to_string()),
                role: UserRole::Worker,
            }],
            ..Default::default()
        }
    }

    fn local_app(blobs: Arc<dyn BlobStore>) -> App {
        let config = config();
        let auth = Arc::new(LocalAuth::new(config.local_users.clone()));
        App::with_parts(config, Backend::Local, blobs, auth).unwrap()
    }

    #[tokio::test]
    async fn test_session_persists_until_sign_out() {
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let mut app = local_app(blobs.clone());
        assert!(matches!(app.require_session(), Err(RebanhoError::NotAuthenticated)));

        let creds = Credentials::new("maria@fazenda.com", "segredo").unwrap();
        assert_eq!(app.sign_in(&creds).await.unwrap().name, "Maria");

        let reopened = local_app(blobs.clone());
        assert_eq!(reopened.session().map(|s| s.name.as_str()), Some("Maria"));

        app.sign_out().await.unwrap();
        assert!(app.session().is_none());
        assert!(local_app(blobs).session().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_views_but_keeps_data() {
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let mut app = local_app(blobs);
        app.knowledge()
            .service()
            .create(NewKnowledgeEntry {
                title: "Verminose".to_string(),
                content: "...".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        app.reload_all().await.unwrap();
        assert_eq!(app.knowledge().snapshot().len(), 1);

        app.sign_out().await.unwrap();
        assert!(app.knowledge().snapshot().is_empty());

        app.reload_all().await.unwrap();
        assert_eq!(app.knowledge().snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_session_is_discarded() {
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        blobs.write(SESSION_KEY, "not json").unwrap();
        let app = local_app(blobs.clone());
        assert!(app.session().is_none());
        assert_eq!(blobs.read(SESSION_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_mode_has_no_feed() {
        let app = local_app(Arc::new(MemoryBlobStore::new()));
        assert!(!app.mode().is_remote());
        assert!(app.connect_feed().await.unwrap().is_none());
    }
}
