//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::crypto::PinCipher;
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::services::{AccessGuard, AttachmentsService, NotesService};
use crate::session::SessionStore;
use crate::storage::{CloudStorage, LocalStorage, ObjectStorage};
use crate::validation::FileRules;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub notes: NotesService,
    pub attachments: AttachmentsService,
    pub access: AccessGuard,
    pub sessions: SessionStore,
    /// Root of the local object store, served at `/files` when set
    pub local_files: Option<PathBuf>,
    pub max_upload_size: u64,
    pub secure_cookies: bool,
}

impl AppState {
    /// Wire the services around an existing repository and object store
    pub fn assemble(
        config: &ServerConfig,
        repo: Repository,
        storage: Arc<dyn ObjectStorage>,
        local_files: Option<PathBuf>,
    ) -> Result<Self> {
        let pins = PinCipher::new(&config.pin_secret)?;
        let sessions = SessionStore::new(config.session_idle_timeout);
        let rules = Arc::new(FileRules::standard().with_max_file_size(config.max_upload_size));

        let access = AccessGuard::new(repo.clone(), pins, sessions.clone());
        let attachments = AttachmentsService::new(repo.clone(), storage, rules);
        let notes = NotesService::new(repo, access.clone(), attachments.clone());

        Ok(Self {
            notes,
            attachments,
            access,
            sessions,
            local_files,
            max_upload_size: config.max_upload_size,
            secure_cookies: config.secure_cookies(),
        })
    }
}

/// Application setup - called once on startup
pub async fn build(config: &ServerConfig) -> Result<AppState> {
    tracing::info!("Initializing application");
    tracing::info!("Data directory: {:?}", config.data_dir);

    std::fs::create_dir_all(&config.data_dir)?;

    let pool = create_pool(&config.database_path()).await?;
    let repo = Repository::new(pool);

    let (storage, local_files): (Arc<dyn ObjectStorage>, Option<PathBuf>) =
        if config.cloud.is_valid() {
            let cloud = CloudStorage::new(
                config.cloud.clone(),
                config.cloud_api_base.clone(),
                config.upload_timeout,
            )?;
            (Arc::new(cloud), None)
        } else {
            tracing::warn!(
                "Cloud storage credentials missing, storing files locally in {:?}",
                config.files_dir()
            );
            let local = LocalStorage::new(config.files_dir(), config.public_url.clone());
            local.initialize().await?;
            (Arc::new(local), Some(config.files_dir()))
        };

    let state = AppState::assemble(config, repo, storage, local_files)?;

    tracing::info!("Application initialized successfully");

    Ok(state)
}
