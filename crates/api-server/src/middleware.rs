//! Axum middleware running the [`RequestGate`] in front of tenant routes.

use crate::error::ApiError;
use crate::gate::{RequestContext, RequestGate};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct GateState {
    gate: Arc<RequestGate>,
    exempt_paths: Arc<HashSet<String>>,
}

impl GateState {
    pub fn new(gate: Arc<RequestGate>, exempt_paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            gate,
            exempt_paths: Arc::new(exempt_paths.into_iter().collect()),
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }
}

/// Admit the request or answer with the gate's error. Admitted requests
/// carry their [`RequestContext`] in the extensions.
pub async fn domain_gate(State(state): State<GateState>, mut request: Request, next: Next) -> Response {
    if state.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    match state.gate.admit(&request) {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// Extractor for the context bound by [`domain_gate`].
pub struct Tenant(pub RequestContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(Tenant)
            .ok_or((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Domain context missing; route is not behind the domain gate",
            ))
    }
}
