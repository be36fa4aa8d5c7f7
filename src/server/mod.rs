pub mod admin;
pub mod admission;
pub mod auth;
pub mod cleanup;
pub mod client;
pub mod hub;
pub mod registry;
pub mod run;
pub mod state;
pub mod ws;

// Export commonly used types and functions
pub use auth::{Authorizer, BearerTokenAuthorizer};
pub use run::{build_router, run_server};
pub use state::AppState;
