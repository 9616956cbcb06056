//! Transport-neutral entry point shared by the JSON and RPC adapters.
//!
//! Input validation happens here, before the store is touched. Store calls
//! are synchronous, so they run on the blocking pool under a per-call
//! deadline; a missed deadline is reported, never retried.

use std::time::{Duration, Instant};

use mailinglist_core::{EmailAddress, InvalidArgument, PageRequest, SubscriberEntry};
use mailinglist_store::{Database, StoreError, SubscriberRepo};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The call missed its deadline. A call still waiting for the connection
    /// at the deadline gives up without writing. One that got the connection
    /// in time runs its statement to completion, so a write can still land
    /// after this error when the statement itself straddles the deadline.
    #[error("storage call exceeded {0:?}")]
    Timeout(Duration),

    #[error("storage task failed: {0}")]
    Internal(String),
}

impl ServiceError {
    /// True when the caller sent something wrong (4xx-class), false for
    /// server-side failures.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidArgument(_) => true,
            Self::Store(e) => e.is_client_error(),
            Self::Timeout(_) | Self::Internal(_) => false,
        }
    }
}

#[derive(Clone)]
pub struct SubscriberService {
    repo: SubscriberRepo,
    timeout: Duration,
}

impl SubscriberService {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self {
            repo: SubscriberRepo::new(db),
            timeout,
        }
    }

    pub async fn create(&self, email: &str) -> Result<SubscriberEntry, ServiceError> {
        let email = EmailAddress::parse(email)?;
        self.blocking(move |repo| repo.create(&email)).await
    }

    pub async fn get(&self, email: &str) -> Result<Option<SubscriberEntry>, ServiceError> {
        let email = EmailAddress::parse(email)?;
        self.blocking(move |repo| repo.get(&email)).await
    }

    pub async fn upsert(&self, entry: SubscriberEntry) -> Result<SubscriberEntry, ServiceError> {
        self.blocking(move |repo| repo.upsert(&entry)).await
    }

    pub async fn soft_delete(&self, email: &str) -> Result<(), ServiceError> {
        let email = EmailAddress::parse(email)?;
        self.blocking(move |repo| repo.soft_delete(&email)).await
    }

    pub async fn list_page(
        &self,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<SubscriberEntry>, ServiceError> {
        let page = PageRequest::new(page, page_size)?;
        self.blocking(move |repo| repo.list_page(&page)).await
    }

    pub async fn count_active(&self) -> Result<u64, ServiceError> {
        self.blocking(|repo| repo.count_active()).await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&SubscriberRepo) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let repo = self.repo.with_deadline(Instant::now() + self.timeout);
        let task = tokio::task::spawn_blocking(move || f(&repo));
        match tokio::time::timeout(self.timeout, task).await {
            Err(_) | Ok(Ok(Err(StoreError::DeadlineExceeded))) => {
                Err(ServiceError::Timeout(self.timeout))
            }
            Ok(Err(join)) => Err(ServiceError::Internal(join.to_string())),
            Ok(Ok(result)) => result.map_err(ServiceError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SubscriberService {
        SubscriberService::new(Database::in_memory().unwrap(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn create_normalizes_before_storing() {
        let svc = service();
        let entry = svc.create("  Someone@Example.com").await.unwrap();
        assert_eq!(entry.email.as_str(), "someone@example.com");
        assert_eq!(svc.get("SOMEONE@example.com").await.unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn duplicate_is_client_error() {
        let svc = service();
        svc.create("a@example.com").await.unwrap();
        let err = svc.create("a@example.com").await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::DuplicateEmail(_))));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn malformed_email_never_reaches_store() {
        let svc = service();
        let err = svc.create("not-an-address").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert!(err.is_client_error());
        assert_eq!(svc.count_active().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_pages_are_rejected() {
        let svc = service();
        for (page, size) in [(0, 10), (1, 0), (-2, 5), (1, -1)] {
            let err = svc.list_page(page, size).await.unwrap_err();
            assert!(
                matches!(err, ServiceError::InvalidArgument(_)),
                "page={page} size={size}"
            );
        }
    }

    #[tokio::test]
    async fn soft_delete_then_get() {
        let svc = service();
        svc.create("gone@example.com").await.unwrap();
        svc.soft_delete("gone@example.com").await.unwrap();
        let entry = svc.get("gone@example.com").await.unwrap().unwrap();
        assert!(entry.opt_out);
        assert!(svc.list_page(1, 10).await.unwrap().is_empty());
    }

    #[test]
    fn storage_failures_are_server_errors() {
        let err = ServiceError::Store(StoreError::Database("disk I/O error".into()));
        assert!(!err.is_client_error());
        assert!(!ServiceError::Timeout(Duration::from_millis(1)).is_client_error());
    }

    #[tokio::test]
    async fn create_that_times_out_on_a_busy_connection_writes_nothing() {
        let db = Database::in_memory().unwrap();
        let svc = SubscriberService::new(db.clone(), Duration::from_millis(50));

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder_db = db.clone();
        let holder = std::thread::spawn(move || {
            holder_db
                .with_conn(|_| {
                    locked_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();

        let err = svc.create("late@example.com").await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)), "got {err:?}");
        assert!(!err.is_client_error());

        holder.join().unwrap();
        let svc = SubscriberService::new(db, Duration::from_secs(5));
        assert_eq!(svc.get("late@example.com").await.unwrap(), None);
        let retried = svc.create("late@example.com").await.unwrap();
        assert_eq!(retried.email.as_str(), "late@example.com");
    }

    #[tokio::test]
    async fn deadline_is_reported_as_timeout() {
        let svc = SubscriberService::new(Database::in_memory().unwrap(), Duration::from_millis(20));
        let result = svc
            .blocking(|_| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout(_))));
    }
}
