//! Shared state handed to every handler

use marche_store::MessagingService;

#[derive(Clone)]
pub struct AppState {
    pub service: MessagingService,
    /// Record a heartbeat for each authenticated request
    pub touch_presence: bool,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(service: MessagingService) -> Self {
        Self {
            service,
            touch_presence: true,
            max_body_bytes: crate::config::DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_touch_presence(mut self, enabled: bool) -> Self {
        self.touch_presence = enabled;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}
