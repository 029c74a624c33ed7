use std::sync::Arc;

use crate::fallback::FallbackReader;
use crate::replication::ReplicationCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ReplicationCoordinator>,
    pub reader: Arc<FallbackReader>,
}

impl AppState {
    pub fn new(coordinator: Arc<ReplicationCoordinator>, reader: Arc<FallbackReader>) -> Self {
        Self {
            coordinator,
            reader,
        }
    }
}
