//! Application services: the render pipeline and the local conversion command.

pub mod convert;
pub mod error;
pub mod render;
