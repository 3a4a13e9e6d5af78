use crate::auth::AdminGate;
use crate::services::BackupService;
use std::sync::Arc;

pub struct AppState {
    pub gate: Arc<dyn AdminGate>,
    pub backups: Arc<BackupService>,
}

impl AppState {
    pub fn new(gate: Arc<dyn AdminGate>, backups: BackupService) -> Self {
        Self {
            gate,
            backups: Arc::new(backups),
        }
    }
}
