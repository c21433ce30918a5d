use std::sync::Arc;

use crate::dispatch::Dispatcher;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub secret: Arc<[u8]>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(secret: impl AsRef<[u8]>, dispatcher: Dispatcher) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
            dispatcher,
        }
    }
}
