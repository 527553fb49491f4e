pub mod api;
pub mod state;
pub mod submit;

pub use api::router;
pub use state::AppState;
pub use submit::{GatewayError, RequestSubmissionService};
