//! Domain layer types and invariants.

pub mod error;
pub mod layout;
pub mod request;
pub mod theme;
