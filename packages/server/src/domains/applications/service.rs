//! Application lifecycle service: accept, deduplicate, enqueue, cancel.

use std::sync::Arc;

use automation::{classify, AtsType, UrlValidator};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::model::{Application, ApplicationStatus};
use super::store::ApplicationStore;
use crate::kernel::jobs::{ApplyCommand, JobPriority, JobQueue};

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyRequest {
    pub user_id: Uuid,
    pub job_id: Uuid,
    pub job_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{0}")]
    InvalidUrl(String),
    #[error("application not found")]
    NotFound,
    #[error("application is {status:?} and can no longer be cancelled")]
    NotCancellable { status: ApplicationStatus },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct ApplyService {
    applications: Arc<dyn ApplicationStore>,
    queue: Arc<dyn JobQueue>,
    validator: UrlValidator,
}

impl ApplyService {
    pub fn new(applications: Arc<dyn ApplicationStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            applications,
            queue,
            validator: UrlValidator::new(),
        }
    }

    /// Accept a submission request. Returns the application and whether it
    /// was newly created; a live or already-submitted application for the
    /// same (user, job) pair is returned unchanged.
    pub async fn apply(&self, request: ApplyRequest) -> Result<(Application, bool), ApplyError> {
        let validated = self
            .validator
            .validate(&request.job_url)
            .map_err(|e| ApplyError::InvalidUrl(classify(&e.into()).user_message.to_string()))?;
        let ats: AtsType = validated.ats;

        // One application per (user, job) pair, live or settled: a repeat
        // request always gets the existing record back unchanged.
        if let Some(existing) = self
            .applications
            .find_for_user_job(request.user_id, request.job_id)
            .await?
        {
            return Ok((existing, false));
        }

        let application = Application::builder()
            .user_id(request.user_id)
            .job_id(request.job_id)
            .job_url(request.job_url.clone())
            .ats(ats.as_str().to_string())
            .build();
        let application = self.applications.create(&application).await?;

        let command = ApplyCommand {
            application_id: application.id,
            user_id: application.user_id,
            job_id: application.job_id,
            job_url: application.job_url.clone(),
            ats: application.ats.clone(),
        };
        let enqueued = self.queue.enqueue(&command, JobPriority::Normal).await?;
        info!(
            application_id = %application.id,
            ats = %application.ats,
            created = enqueued.is_created(),
            "application accepted"
        );

        Ok((application, true))
    }

    /// Cancel a queued application. Once a worker has picked it up the
    /// cancel is refused.
    pub async fn cancel(&self, id: Uuid) -> Result<Application, ApplyError> {
        let application = self
            .applications
            .find(id)
            .await?
            .ok_or(ApplyError::NotFound)?;

        if !self.applications.cancel_if_queued(id).await? {
            return Err(ApplyError::NotCancellable {
                status: application.status,
            });
        }

        // The pending queue job goes with it; a job already claimed will
        // see the cancelled status and skip.
        let command = ApplyCommand {
            application_id: application.id,
            user_id: application.user_id,
            job_id: application.job_id,
            job_url: application.job_url.clone(),
            ats: application.ats.clone(),
        };
        self.queue.cancel(&command.idempotency_key()).await?;

        info!(application_id = %id, "application cancelled");
        self.applications
            .find(id)
            .await?
            .ok_or(ApplyError::NotFound)
    }

    pub async fn get(&self, id: Uuid) -> Result<Application, ApplyError> {
        self.applications
            .find(id)
            .await?
            .ok_or(ApplyError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::applications::MemoryApplicationStore;
    use crate::kernel::jobs::{JobStatus, MemoryJobQueue};

    fn service() -> (ApplyService, Arc<MemoryApplicationStore>, MemoryJobQueue) {
        let store = Arc::new(MemoryApplicationStore::new());
        let queue = MemoryJobQueue::new();
        let service = ApplyService::new(store.clone(), Arc::new(queue.clone()));
        (service, store, queue)
    }

    fn request() -> ApplyRequest {
        ApplyRequest {
            user_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            job_url: "https://boards.greenhouse.io/acme/jobs/1".into(),
        }
    }

    #[tokio::test]
    async fn apply_creates_and_enqueues() {
        let (service, _, queue) = service();
        let (application, created) = service.apply(request()).await.unwrap();
        assert!(created);
        assert_eq!(application.status, ApplicationStatus::Queued);
        assert_eq!(application.ats, "greenhouse");
        assert_eq!(queue.jobs_with_status(JobStatus::Pending).len(), 1);
    }

    #[tokio::test]
    async fn apply_is_idempotent_per_user_job() {
        let (service, _, queue) = service();
        let req = request();
        let (first, created) = service.apply(req.clone()).await.unwrap();
        assert!(created);

        let (second, created) = service.apply(req).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(queue.jobs_with_status(JobStatus::Pending).len(), 1);
    }

    #[tokio::test]
    async fn private_address_is_rejected_up_front() {
        let (service, _, queue) = service();
        let mut req = request();
        req.job_url = "http://192.168.1.10/jobs/1".into();

        let err = service.apply(req).await.unwrap_err();
        assert!(matches!(err, ApplyError::InvalidUrl(_)));
        assert!(queue.jobs_with_status(JobStatus::Pending).is_empty());
    }

    #[tokio::test]
    async fn cancel_only_from_queued() {
        let (service, store, queue) = service();
        let (application, _) = service.apply(request()).await.unwrap();

        let cancelled = service.cancel(application.id).await.unwrap();
        assert_eq!(cancelled.status, ApplicationStatus::Cancelled);
        assert_eq!(queue.jobs_with_status(JobStatus::Cancelled).len(), 1);

        // A second cancel is refused.
        let err = service.cancel(application.id).await.unwrap_err();
        assert!(matches!(err, ApplyError::NotCancellable { .. }));

        // Once a worker holds it, cancel is refused too.
        let (other, _) = service.apply(request()).await.unwrap();
        store.mark_applying(other.id).await.unwrap().unwrap();
        let err = service.cancel(other.id).await.unwrap_err();
        assert!(matches!(
            err,
            ApplyError::NotCancellable {
                status: ApplicationStatus::Applying
            }
        ));
    }

    #[tokio::test]
    async fn terminal_application_is_returned_unchanged() {
        let (service, store, queue) = service();
        let req = request();
        let (first, _) = service.apply(req.clone()).await.unwrap();

        store.mark_applying(first.id).await.unwrap();
        store
            .persist_outcome(&crate::domains::applications::AttemptOutcome {
                application_id: first.id,
                kind: crate::domains::applications::OutcomeKind::Failed {
                    error_kind: "captcha_unsolvable".into(),
                    error_message: "This application requires a CAPTCHA we cannot solve".into(),
                },
                cost: 0.5,
                recipe: None,
            })
            .await
            .unwrap();

        let (second, created) = service.apply(req).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, ApplicationStatus::Failed);
        assert_eq!(queue.jobs_with_status(JobStatus::Pending).len(), 1);
    }
}
