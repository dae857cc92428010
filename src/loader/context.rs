use tracing::{Span, info_span};
use uuid::Uuid;

use crate::domain::KeyValues;

/// Per-request inputs shared by every loader of one resolution pass.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    keys: KeyValues,
    span: Span,
}

impl RequestContext {
    /// `keys` are the context values cache keys may draw from, e.g. `endpoint_id`.
    pub fn new(keys: KeyValues) -> Self {
        Self::with_request_id(Uuid::new_v4(), keys)
    }

    pub fn with_request_id(request_id: Uuid, keys: KeyValues) -> Self {
        let span = info_span!("loader.request", request_id = %request_id, context = %keys);
        Self {
            request_id,
            keys,
            span,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn keys(&self) -> &KeyValues {
        &self.keys
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
