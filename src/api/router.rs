//! Office API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! JSON routes are nested under `/api/`, stored documents under `/media/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Auth validator (protected routes only) → 2. Audit logger

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::api::endpoints::{
    accounts, allergen_tests, allergy_templates, authorizations, health, injections, patients,
    physicians, search, service_types, vials,
};
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the office API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);
    let body_limit = ctx.core.max_upload_bytes;
    let media = ServeDir::new(ctx.core.documents.media_dir());

    // Layers apply bottom (innermost) to top (outermost):
    //   Extension → Auth → Audit → Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/me/", get(accounts::me))
        .route("/reset-password/", post(accounts::reset_password))
        .route("/search/", get(search::patients))
        .route("/vials/", get(vials::list).post(vials::create))
        .route(
            "/vials/:id/",
            get(vials::detail)
                .put(vials::update)
                .patch(vials::partial_update)
                .delete(vials::destroy),
        )
        .route(
            "/allergy-templates/",
            get(allergy_templates::list).post(allergy_templates::create),
        )
        .route(
            "/allergy-templates/:id/",
            get(allergy_templates::detail)
                .put(allergy_templates::update)
                .patch(allergy_templates::partial_update)
                .delete(allergy_templates::destroy),
        )
        .route("/missed-injections/", get(injections::missed))
        .route(
            "/allergen-tests/",
            get(allergen_tests::list).post(allergen_tests::create),
        )
        .route(
            "/allergen-tests/:id/",
            get(allergen_tests::detail)
                .put(allergen_tests::update)
                .patch(allergen_tests::partial_update)
                .delete(allergen_tests::destroy),
        )
        .route("/authorization/", post(authorizations::create_batch))
        .route("/authorization-entries/", get(authorizations::list))
        .route(
            "/authorization-entries/:id/",
            get(authorizations::detail)
                .put(authorizations::update)
                .delete(authorizations::destroy),
        )
        .route("/patients/add/", post(patients::add))
        .route("/patients/", get(patients::list))
        .route(
            "/patients/:id/",
            get(patients::detail)
                .put(patients::update)
                .patch(patients::partial_update)
                .delete(patients::destroy),
        )
        .route(
            "/service-types/",
            get(service_types::list).post(service_types::create),
        )
        .route(
            "/service-types/:id/",
            get(service_types::detail)
                .put(service_types::update)
                .patch(service_types::partial_update)
                .delete(service_types::destroy),
        )
        .route("/physicians/", get(physicians::list))
        .route(
            "/physicians/:id/",
            get(physicians::detail)
                .put(physicians::update)
                .patch(physicians::partial_update)
                .delete(physicians::destroy),
        )
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    let unprotected = Router::new()
        .route("/signup/", post(accounts::signup))
        .route("/login/", post(accounts::login))
        .route("/refresh/", post(accounts::refresh))
        .route("/health/", get(health::check))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", protected.merge(unprotected))
        .nest_service("/media", media)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
}
