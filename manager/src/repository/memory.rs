//! Document-store repository
//!
//! Keeps one `DeployDocument` per deploy in memory and, when opened on a
//! file, writes an atomic JSON snapshot after every mutation so documents
//! survive a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::filesys::file::File;
use crate::models::deploy::{BuildStep, Deploy, Status};
use crate::repository::document::{encode_envs, BuildStepDocument, DeployDocument};
use crate::repository::Repository;

#[derive(Clone)]
struct StoredDocument {
    /// Insertion sequence, keeps listings in creation order
    seq: u64,
    doc: DeployDocument,
}

#[derive(Clone, Default)]
struct Documents {
    next_seq: u64,
    by_id: HashMap<String, StoredDocument>,
}

impl Documents {
    fn ordered(&self) -> Vec<&DeployDocument> {
        let mut stored: Vec<&StoredDocument> = self.by_id.values().collect();
        stored.sort_by_key(|s| s.seq);
        stored.into_iter().map(|s| &s.doc).collect()
    }

    fn insert(&mut self, doc: DeployDocument) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_id.insert(doc.id.clone(), StoredDocument { seq, doc });
    }
}

/// In-memory document store with optional file snapshots
pub struct MemoryRepository {
    documents: RwLock<Documents>,
    snapshot: Option<File>,
}

impl MemoryRepository {
    /// Create an empty, purely in-memory repository
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Documents::default()),
            snapshot: None,
        }
    }

    /// Open a repository backed by a snapshot file, loading it if present
    pub async fn open(snapshot: File) -> Result<Self, RepositoryError> {
        let mut documents = Documents::default();

        if snapshot.exists().await {
            let loaded: Vec<DeployDocument> = snapshot
                .read_json()
                .await
                .map_err(|e| RepositoryError::Storage(e.to_string()))?;
            info!(
                "Loaded {} deploy documents from {}",
                loaded.len(),
                snapshot.path().display()
            );
            for doc in loaded {
                documents.insert(doc);
            }
        }

        Ok(Self {
            documents: RwLock::new(documents),
            snapshot: Some(snapshot),
        })
    }

    fn normalize_id(id: &str) -> Result<String, RepositoryError> {
        Uuid::parse_str(id)
            .map(|uuid| uuid.to_string())
            .map_err(|_| RepositoryError::InvalidId(id.to_string()))
    }

    /// Must be called with the write lock held so snapshots never interleave
    async fn persist(&self, documents: &Documents) -> Result<(), RepositoryError> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };

        snapshot
            .write_json(&documents.ordered())
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        debug!("Snapshot written to {}", snapshot.path().display());
        Ok(())
    }

    /// Apply `change` to a copy of the documents and keep it only once the
    /// snapshot holding it is written
    async fn mutate<T, F>(&self, change: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Documents) -> Result<T, RepositoryError> + Send,
        T: Send,
    {
        let mut documents = self.documents.write().await;
        let mut pending = documents.clone();
        let output = change(&mut pending)?;

        self.persist(&pending).await?;
        *documents = pending;
        Ok(output)
    }

    /// Apply a field-level update to one document and persist it
    async fn update<F>(&self, id: &str, apply: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut DeployDocument) + Send,
    {
        let key = Self::normalize_id(id)?;
        self.mutate(move |documents| {
            let stored = documents
                .by_id
                .get_mut(&key)
                .ok_or_else(|| RepositoryError::NotFound(key.clone()))?;
            apply(&mut stored.doc);
            Ok(())
        })
        .await
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_deploy(&self, deploy: &Deploy) -> Result<String, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        let mut doc = DeployDocument::from(deploy);
        doc.id = id.clone();

        self.mutate(move |documents| {
            documents.insert(doc);
            Ok(())
        })
        .await?;

        Ok(id)
    }

    async fn get_deploy(&self, id: &str) -> Result<Deploy, RepositoryError> {
        let key = Self::normalize_id(id)?;
        let documents = self.documents.read().await;

        let stored = documents
            .by_id
            .get(&key)
            .ok_or(RepositoryError::NotFound(key.clone()))?;
        Deploy::try_from(&stored.doc)
    }

    async fn list_deploy(&self) -> Result<Vec<Deploy>, RepositoryError> {
        let documents = self.documents.read().await;
        documents.ordered().into_iter().map(Deploy::try_from).collect()
    }

    async fn update_deploy(&self, deploy: &Deploy) -> Result<(), RepositoryError> {
        let replacement = DeployDocument::from(deploy);
        self.update(&deploy.id, move |doc| {
            doc.name = replacement.name;
            doc.git_repo = replacement.git_repo;
            doc.build = replacement.build;
            doc.workload = replacement.workload;
        })
        .await
    }

    async fn delete_deploy(&self, id: &str) -> Result<(), RepositoryError> {
        let key = Self::normalize_id(id)?;
        self.mutate(move |documents| match documents.by_id.remove(&key) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound(key)),
        })
        .await
    }

    async fn init_build(
        &self,
        id: &str,
        job_name: &str,
        job_id: &str,
        image_name: &str,
    ) -> Result<(), RepositoryError> {
        self.update(id, |doc| {
            doc.build.job_id = job_id.to_string();
            doc.build.job_name = job_name.to_string();
            doc.build.image_name = image_name.to_string();
            doc.build.steps.clear();
        })
        .await
    }

    async fn init_workload(
        &self,
        id: &str,
        job_name: &str,
        job_id: &str,
        envs: &HashMap<String, String>,
        url: &str,
    ) -> Result<(), RepositoryError> {
        let envs = encode_envs(envs);
        self.update(id, move |doc| {
            doc.workload.job_id = job_id.to_string();
            doc.workload.job_name = job_name.to_string();
            doc.workload.envs = envs;
            doc.workload.url = url.to_string();
        })
        .await
    }

    async fn set_build_status(&self, id: &str, status: Status) -> Result<(), RepositoryError> {
        self.update(id, |doc| doc.build.status = status.ordinal() as i64)
            .await
    }

    async fn record_build_step(&self, id: &str, step: &BuildStep) -> Result<(), RepositoryError> {
        let step = BuildStepDocument::from(step);
        self.update(id, move |doc| doc.build.steps.push(step)).await
    }
}
