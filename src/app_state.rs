use std::sync::Arc;

use crate::config::Config;
use crate::service::ApprovalDesk;

#[derive(Clone)]
pub struct AppState {
    pub desk: Arc<dyn ApprovalDesk>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(desk: Arc<dyn ApprovalDesk>, config: Arc<Config>) -> Self {
        Self { desk, config }
    }
}
