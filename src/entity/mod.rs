//! sea-orm entities backing the database store.

pub mod alerts;
pub mod meters;
pub mod readings;
