//! Build-event bus port

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::warn;

use crate::errors::MessageError;
use crate::models::deploy::BuildStep;

pub mod mqtt;
pub mod topics;
pub mod wire;

pub use mqtt::MqttMessage;

/// Ordered build-step notifications for one deploy
pub type BuildEventStream = BoxStream<'static, BuildStep>;

type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), MessageError>> + Send>;

/// Tears down a build-event subscription.
///
/// Call [`ReleaseHandle::release`] once the stream is no longer needed. A
/// handle dropped without being released (an aborted task, a panic) schedules
/// the teardown on the current runtime instead.
pub struct ReleaseHandle {
    deploy_id: String,
    release: Option<ReleaseFn>,
}

impl ReleaseHandle {
    pub fn new<F, Fut>(deploy_id: impl Into<String>, release: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), MessageError>> + Send + 'static,
    {
        Self {
            deploy_id: deploy_id.into(),
            release: Some(Box::new(move || Box::pin(release()))),
        }
    }

    pub fn deploy_id(&self) -> &str {
        &self.deploy_id
    }

    /// Release the subscription
    pub async fn release(mut self) -> Result<(), MessageError> {
        match self.release.take() {
            Some(release) => release().await,
            None => Ok(()),
        }
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        let Some(release) = self.release.take() else {
            return;
        };

        let deploy_id = std::mem::take(&mut self.deploy_id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = release().await {
                        warn!("Deferred release of {} failed: {}", deploy_id, e);
                    }
                });
            }
            Err(_) => {
                warn!("No runtime to release build events of {}", deploy_id);
            }
        }
    }
}

/// A live build-event subscription: the stream plus its teardown
pub struct Subscription {
    pub events: BuildEventStream,
    pub release: ReleaseHandle,
}

/// Publish/subscribe access to build-progress notifications
#[async_trait]
pub trait Message: Send + Sync {
    /// Declare the shared build-progress exchange. Idempotent; called once at
    /// startup rather than per deploy.
    async fn init(&self) -> Result<(), MessageError>;

    /// Subscribe to the build-progress topic of one deploy. The returned
    /// stream has exactly one reader for the lifetime of the subscription.
    async fn consume_build_events(&self, deploy_id: &str) -> Result<Subscription, MessageError>;
}
