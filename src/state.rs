use crate::backend::{BackendClient, InFlight};
use crate::bus::ChangeBus;
use crate::session::SessionManager;
use crate::storage::UserStore;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    /// Held across every read-modify-write of the user table.
    pub store: Arc<Mutex<UserStore>>,
    pub sessions: Arc<SessionManager>,
    pub bus: ChangeBus,
    pub backend: BackendClient,
    pub in_flight: InFlight,
}

impl AppState {
    pub fn new(store: UserStore, sessions: SessionManager, backend: BackendClient) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            sessions: Arc::new(sessions),
            bus: ChangeBus::new(),
            backend,
            in_flight: InFlight::default(),
        }
    }
}
