//! Ambient per-call request-id propagation (C8 step 2). An embedder
//! scopes a request id around the async call tree for one inbound
//! request with [`with_request_id`]; the HTTP client reads it back via
//! [`current_request_id`] to attach an `x-request-id` header on any
//! outbound call whose caller didn't already set one explicitly.

use std::future::Future;

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Run `fut` with `request_id` available to [`current_request_id`] for
/// the lifetime of its async call tree.
pub async fn with_request_id<F: Future>(request_id: String, fut: F) -> F::Output {
    REQUEST_ID.scope(request_id, fut).await
}

/// The request id scoped by the nearest enclosing [`with_request_id`],
/// if any. Outside of a scoped call tree (e.g. a background sweeper),
/// this is `None`.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}
