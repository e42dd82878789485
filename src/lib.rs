pub mod api; // REST client and the TaxApi seam
pub mod chat; // Chat threads and agents
pub mod config;
pub mod dashboard; // Metrics, activity, alerts
pub mod documents; // Document library
pub mod error;
pub mod forms; // Forms dashboard and batch actions
pub mod models;
pub mod notify; // Toast queue
pub mod poller;
pub mod review; // Extraction review and corrections
pub mod search; // Filter/search engine
pub mod state;
pub mod upload; // Upload and processing status

pub use error::{ErrorCategory, InputError, WorkflowError};
pub use state::DeskState;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. Filter from `RUST_LOG`, else the crate default.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
