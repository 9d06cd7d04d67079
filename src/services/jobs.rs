use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    db::SharedRepository,
    error::{AppError, AppResult},
    services::ingestion::{ingest_as, MediaType},
};

/// A saved upload waiting to be ingested
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub id: Uuid,
    pub path: PathBuf,
    pub media_type: MediaType,
}

/// Sender side of the ingestion worker
///
/// Uploads are written to `upload_dir` and queued; the request that queued
/// them never waits for the outcome. Results only show up in the logs.
#[derive(Clone)]
pub struct IngestionQueue {
    upload_dir: PathBuf,
    job_tx: mpsc::UnboundedSender<IngestJob>,
}

/// Handle for gracefully shutting down the ingestion worker
pub struct IngestionWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl IngestionWorkerHandle {
    /// Stops accepting jobs and waits until the ones already queued are done
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Ingestion worker shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Ingestion worker panicked");
        }
    }
}

impl IngestionQueue {
    /// Creates the upload directory and spawns the worker task
    pub async fn start(
        repo: SharedRepository,
        upload_dir: impl Into<PathBuf>,
    ) -> AppResult<(Self, IngestionWorkerHandle)> {
        let upload_dir = upload_dir.into();
        tokio::fs::create_dir_all(&upload_dir).await?;

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            Self::worker_task(repo, job_rx, shutdown_rx).await;
        });

        Ok((
            Self { upload_dir, job_tx },
            IngestionWorkerHandle { shutdown_tx, task },
        ))
    }

    /// Persists the upload and queues it; returns the job id
    pub async fn submit(&self, data: &[u8], media_type: MediaType) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let path = self
            .upload_dir
            .join(format!("{}.{}", id, media_type.extension()));
        tokio::fs::write(&path, data).await?;

        let job = IngestJob {
            id,
            path: path.clone(),
            media_type,
        };
        if self.job_tx.send(job).is_err() {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(AppError::Internal(
                "ingestion worker is not running".to_string(),
            ));
        }

        tracing::info!(job_id = %id, bytes = data.len(), media_type = media_type.as_str(), "Queued ingestion job");
        Ok(id)
    }

    async fn worker_task(
        repo: SharedRepository,
        mut job_rx: mpsc::UnboundedReceiver<IngestJob>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(backend = repo.name(), "Ingestion worker started");

        loop {
            tokio::select! {
                Some(job) = job_rx.recv() => {
                    Self::run_job(&repo, job).await;
                }
                _ = shutdown_rx.recv() => {
                    job_rx.close();
                    tracing::info!("Ingestion worker shutting down, draining queued jobs");

                    while let Some(job) = job_rx.recv().await {
                        Self::run_job(&repo, job).await;
                    }

                    tracing::info!("Ingestion worker stopped");
                    break;
                }
            }
        }
    }

    async fn run_job(repo: &SharedRepository, job: IngestJob) {
        match ingest_as(repo.as_ref(), &job.path, job.media_type).await {
            Ok(summary) => tracing::info!(
                job_id = %job.id,
                processed = summary.processed,
                created = summary.created,
                updated = summary.updated,
                failed = summary.failed,
                "Ingestion job completed"
            ),
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "Ingestion job failed"),
        }

        if let Err(e) = tokio::fs::remove_file(&job.path).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to remove ingested upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::{MemoryRepository, Repository};
    use crate::models::PageRequest;

    #[tokio::test]
    async fn test_submit_then_shutdown_drains_queue() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryRepository::new());
        let (queue, handle) = IngestionQueue::start(repo.clone(), dir.path()).await.unwrap();

        queue
            .submit(b"title,genres\nAlien,Horror\nHeat,Crime\n", MediaType::Csv)
            .await
            .unwrap();
        queue
            .submit(br#"[{"title": "Ran", "genres": ["Drama"]}]"#, MediaType::Json)
            .await
            .unwrap();
        handle.shutdown().await;

        let (_, count) = repo
            .list_movies(PageRequest {
                page: 1,
                page_size: 10,
            })
            .await
            .unwrap();
        assert_eq!(count, 3);

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryRepository::new());
        let (queue, handle) = IngestionQueue::start(repo, dir.path()).await.unwrap();
        handle.shutdown().await;

        let err = queue.submit(b"title\nX\n", MediaType::Csv).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
