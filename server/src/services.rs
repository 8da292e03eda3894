pub mod execservice;
pub mod status;

use joblib::JobCoordinator;

/// Shared by every handler. Cloning is cheap: the coordinator is an actor handle.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: JobCoordinator,
}
