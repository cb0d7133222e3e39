//! Markdown to PDF rendering through headless Chromium, as a local command
//! and as an HTTP service.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
