//! HTTP surface of `md2pdf serve`.

pub mod api;
mod middleware;
mod public;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, extract::DefaultBodyLimit, middleware as axum_middleware};

use crate::{application::render::RenderDriver, domain::layout::Resolution};

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct AppState {
    pub driver: RenderDriver,
    /// Viewport used when a request does not name one.
    pub default_resolution: Resolution,
    /// Root of `style/` and `libs/`.
    pub assets_dir: Arc<PathBuf>,
    /// Browser front-end served for any other GET when set.
    pub public_dir: Option<Arc<PathBuf>>,
}

impl AppState {
    pub fn new(driver: RenderDriver, default_resolution: Resolution) -> Self {
        let assets_dir = Arc::new(driver.config().assets_dir.clone());
        Self {
            driver,
            default_resolution,
            assets_dir,
            public_dir: None,
        }
    }

    pub fn with_public_dir(mut self, public_dir: Option<PathBuf>) -> Self {
        self.public_dir = public_dir.map(Arc::new);
        self
    }
}

pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    let has_public = state.public_dir.is_some();

    let router = api::build_api_router().merge(public::build_asset_router());
    let router = if has_public {
        router.fallback(public::serve_front_end)
    } else {
        router
    };

    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
