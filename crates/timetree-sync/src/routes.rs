use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the HTTP surface. Endpoints switched off in the settings are not
/// routed at all and answer 404.
pub fn create_app(state: AppState) -> Router {
    let mut router: Router<AppState> = Router::new().route("/health", get(handlers::health_check));

    if state.settings.status_endpoint_enabled {
        router = router.route("/", get(handlers::get_status));
    }
    if state.settings.file_endpoint_enabled {
        router = router.route("/:file", get(handlers::get_calendar));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
