mod state;

pub use state::{AppState, Backend, CachedResponse, ResponseCache};
