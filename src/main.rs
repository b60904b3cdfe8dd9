/*!
Here we go!
*/
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use tower_http::cors::CorsLayer;

use campus::config::{self, Cfg, Glob};
use campus::inter;
use campus::log_level_from_env;
use campus::store::Store;

#[tokio::main]
async fn main() -> Result<(), String> {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("campus")
        .build();
    TermLogger::init(
        log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).map_err(|e| format!("Error initializing logging: {}", &e))?;

    let config_path: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Cfg::load(config_path.as_deref())?;
    for warning in config::startup_warnings(&cfg) {
        log::warn!("{}", &warning);
    }

    log::trace!("Checking state of DB...");
    let store = Store::new(cfg.db_connect_string.clone());
    if let Err(e) = store.ensure_db_schema().await {
        return Err(format!("Unable to ensure state of DB: {}", e.display()));
    }
    log::trace!("...DB okay.");

    let addr = cfg.addr;
    let cors_origin: HeaderValue = cfg.frontend_origin.parse()
        .map_err(|e| format!(
            "Error parsing {:?} as a CORS origin: {}",
            &cfg.frontend_origin, &e
        ))?;
    let glob = Arc::new(Glob { cfg, store });

    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let public = Router::new()
        .route("/health", get(inter::health))
        .route("/api/auth/admin/login", post(inter::auth::admin_login))
        .route("/api/auth/register", post(inter::auth::register))
        .route("/api/auth/login", post(inter::auth::login));

    // The self-profile read sits behind identity resolution but not
    // the status gate, so a pending user can see where they stand.
    let self_read = Router::new()
        .route("/api/auth/me", get(inter::auth::me))
        .route_layer(middleware::from_fn(inter::identify));

    let gated = Router::new()
        .route("/api/auth/change-password", put(inter::auth::change_password))
        .route(
            "/api/users/profile",
            get(inter::users::profile).put(inter::users::update_profile)
        )
        .route("/api/users", get(inter::users::list))
        .route("/api/users/pending", get(inter::users::pending))
        .route("/api/users/by-role", get(inter::users::by_role))
        .route("/api/users/:id/status", put(inter::users::update_status))
        .route(
            "/api/attendance",
            post(inter::attendance::mark).get(inter::attendance::list)
        )
        .route("/api/attendance/stats", get(inter::attendance::stats))
        .route(
            "/api/timetable",
            post(inter::timetable::upsert).get(inter::timetable::list)
        )
        .route("/api/timetable/:id", delete(inter::timetable::remove))
        .route("/api/exams", post(inter::exams::create).get(inter::exams::list))
        .route(
            "/api/exams/:id",
            get(inter::exams::get_one)
                .put(inter::exams::update)
                .delete(inter::exams::remove)
        )
        .route("/api/results", post(inter::results::create).get(inter::results::list))
        .route(
            "/api/results/:id",
            get(inter::results::get_one).delete(inter::results::remove)
        )
        .route(
            "/api/assignments",
            post(inter::assignments::create).get(inter::assignments::list)
        )
        .route(
            "/api/assignments/:id",
            get(inter::assignments::get_one)
                .put(inter::assignments::update)
                .delete(inter::assignments::remove)
        )
        .route(
            "/api/notifications",
            post(inter::notifications::create).get(inter::notifications::list)
        )
        .route(
            "/api/notifications/:id",
            get(inter::notifications::get_one)
                .put(inter::notifications::update)
                .delete(inter::notifications::remove)
        )
        .route(
            "/api/leave-requests",
            post(inter::leave::create).get(inter::leave::list)
        )
        .route(
            "/api/leave-requests/:id",
            get(inter::leave::get_one).delete(inter::leave::remove)
        )
        .route("/api/leave-requests/:id/status", put(inter::leave::review))
        .route("/api/dashboard/stats", get(inter::dashboard::stats))
        .route_layer(middleware::from_fn(inter::require_approved))
        .route_layer(middleware::from_fn(inter::identify));

    let app = public
        .merge(self_read)
        .merge(gated)
        .fallback(inter::not_found)
        .layer(Extension(glob))
        .layer(cors);

    log::info!("Serving campus API on {}", &addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| format!("Server error: {}", &e))
}
