use std::sync::Arc;

use crate::config::Config;
use crate::connectivity::Connectivity;
use crate::registry::QueueRegistry;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub queues: QueueRegistry,
    pub connectivity: Connectivity,
}
