use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::http_client::DeliveredResponse;

/// Receives a copy of the raw response of a delivered log or feedback call.
#[async_trait]
pub trait ResponseHook: Send + Sync {
    async fn on_response(&self, response: DeliveredResponse);
}

#[async_trait]
impl<F, Fut> ResponseHook for F
where
    F: Fn(DeliveredResponse) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_response(&self, response: DeliveredResponse) {
        (self)(response).await
    }
}

/// Optional `on_log` / `on_feedback` hooks.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_log: Option<Arc<dyn ResponseHook>>,
    pub on_feedback: Option<Arc<dyn ResponseHook>>,
}

impl Callbacks {
    pub fn on_log(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.on_log = Some(Arc::new(hook));
        self
    }

    pub fn on_feedback(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.on_feedback = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_log", &self.on_log.is_some())
            .field("on_feedback", &self.on_feedback.is_some())
            .finish()
    }
}

/// Run a hook, containing any panic it raises.
pub(crate) async fn invoke(
    hook: &dyn ResponseHook,
    channel: &'static str,
    response: DeliveredResponse,
) {
    let outcome = AssertUnwindSafe(hook.on_response(response))
        .catch_unwind()
        .await;
    if outcome.is_err() {
        tracing::error!(channel, "rapida response callback panicked");
    }
}

/// Run a hook on its own task so the caller does not wait on it. The task
/// inherits the current span.
pub(crate) fn dispatch(
    hook: Arc<dyn ResponseHook>,
    channel: &'static str,
    response: DeliveredResponse,
) -> JoinHandle<()> {
    tokio::spawn(
        async move { invoke(hook.as_ref(), channel, response).await }
            .instrument(tracing::Span::current()),
    )
}
