//! HTTP API over a [`SessionManager`](crate::SessionManager).

mod routes;

pub use routes::{create_router, AppState, TipRequest};
