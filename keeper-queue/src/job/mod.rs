pub mod registry;

pub use registry::JobRegistry;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{JobContext, JobError, JobRecord, Verdict};

/// Handler invoked for every claimed job of one type
///
/// Returning `Err` is the same as returning
/// `Verdict::Retry { after: <default backoff>, cause }`.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: JobContext, job: JobRecord) -> Result<Verdict, JobError>;
}

/// Adapter turning an async closure into a [`JobHandler`]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobContext, JobRecord) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Verdict, JobError>> + Send + 'static,
{
    async fn handle(&self, ctx: JobContext, job: JobRecord) -> Result<Verdict, JobError> {
        (self.f)(ctx, job).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(JobContext, JobRecord) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Verdict, JobError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
