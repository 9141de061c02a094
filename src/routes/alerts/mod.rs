mod handlers;
mod types;

pub use handlers::{list_active_alerts, resolve_alerts};
pub use types::{AlertResponse, ResolveRequest, ResolveResponse};

// Re-export utoipa path structs for OpenAPI documentation
pub use handlers::{__path_list_active_alerts, __path_resolve_alerts};
