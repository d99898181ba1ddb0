pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use siakad_shared::clients::db::DbPool;
use siakad_shared::middleware::{login_gate, metrics_middleware};

use crate::config::AppConfig;
use crate::routes::rate_limit::{login_rate_limit, LoginRateLimit};
use crate::routes::{
    academic_years, auth, class_levels, classrooms, dashboard, enrollment, health, ledger,
    notifications, payments, roles, students, teachers, upload, users,
};

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub login_limiter: LoginRateLimit,
    pub metrics_handle: Option<PrometheusHandle>,
}

fn api_routes(state: &AppState) -> Router<Arc<AppState>> {
    let login = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route_layer(from_fn_with_state(state.login_limiter.clone(), login_rate_limit));

    let avatar_limit = state.config.avatar_max_bytes + upload::MULTIPART_OVERHEAD;

    Router::new()
        // Auth
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/dashboard", get(dashboard::get_dashboard))
        // Students
        .route("/api/students", get(students::list_students).post(students::create_student))
        .route(
            "/api/students/:id",
            get(students::get_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .route("/api/students/:id/class-histories", get(students::class_histories))
        // Teachers
        .route("/api/teachers", get(teachers::list_teachers).post(teachers::create_teacher))
        .route(
            "/api/teachers/:id",
            get(teachers::get_teacher)
                .put(teachers::update_teacher)
                .delete(teachers::delete_teacher),
        )
        // Class levels
        .route(
            "/api/class-levels",
            get(class_levels::list_class_levels).post(class_levels::create_class_level),
        )
        .route(
            "/api/class-levels/:id",
            get(class_levels::get_class_level)
                .put(class_levels::update_class_level)
                .delete(class_levels::delete_class_level),
        )
        // Academic years
        .route(
            "/api/academic-years",
            get(academic_years::list_academic_years).post(academic_years::create_academic_year),
        )
        .route(
            "/api/academic-years/:id",
            get(academic_years::get_academic_year)
                .put(academic_years::update_academic_year)
                .delete(academic_years::delete_academic_year),
        )
        .route("/api/academic-years/:id/activate", put(academic_years::activate_academic_year))
        // Classrooms and their rosters
        .route(
            "/api/classrooms",
            get(classrooms::list_classrooms).post(classrooms::create_classroom),
        )
        .route(
            "/api/classrooms/:id",
            get(classrooms::get_classroom)
                .put(classrooms::update_classroom)
                .delete(classrooms::delete_classroom),
        )
        .route(
            "/api/classrooms/:id/students",
            get(enrollment::list_roster).post(enrollment::enroll_students),
        )
        .route(
            "/api/classrooms/:id/students/:student_id",
            axum::routing::delete(enrollment::remove_student),
        )
        .route("/api/class-histories/:id/toggle", put(enrollment::toggle_history))
        .route("/api/class-histories/:id", axum::routing::delete(enrollment::delete_history))
        // SPP
        .route("/api/spp", get(payments::list_payments))
        .route("/api/spp/generate", post(payments::generate_payments))
        .route("/api/spp/students/:id/last-payment", get(payments::last_payment))
        .route(
            "/api/spp/:id",
            get(payments::get_payment)
                .put(payments::update_payment)
                .delete(payments::delete_payment),
        )
        // Ledger
        .route("/api/incomes", get(ledger::list_incomes).post(ledger::create_income))
        .route(
            "/api/incomes/:id",
            get(ledger::get_income)
                .put(ledger::update_income)
                .delete(ledger::delete_income),
        )
        .route("/api/expenses", get(ledger::list_expenses).post(ledger::create_expense))
        .route(
            "/api/expenses/:id",
            get(ledger::get_expense)
                .put(ledger::update_expense)
                .delete(ledger::delete_expense),
        )
        .route("/api/finance/summary", get(ledger::finance_summary))
        // Access control
        .route("/api/roles", get(roles::list_roles).post(roles::create_role))
        .route(
            "/api/roles/:id",
            get(roles::get_role).put(roles::update_role).delete(roles::delete_role),
        )
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        // Notifications
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/unread-count", get(notifications::unread_count))
        .route("/api/notifications/read-all", put(notifications::mark_all_read))
        .route("/api/notifications/:id/read", put(notifications::mark_read))
        .route(
            "/api/notifications/:id",
            axum::routing::delete(notifications::delete_notification),
        )
        // Uploads
        .route(
            "/api/upload/avatar",
            post(upload::upload_avatar).layer(DefaultBodyLimit::max(avatar_limit)),
        )
        .merge(login)
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route_layer(from_fn(metrics_middleware))
}

fn cors(config: &AppConfig) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = config.allowed_origin.parse()?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
        ]))
        .allow_credentials(true))
}

/// Full application router: JSON API, the gated `/admin` pages and the
/// public static directory.
pub fn build_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let public_dir = state.config.public_dir.clone();

    let admin_pages = Router::new()
        .fallback_service(
            ServeDir::new(format!("{public_dir}/admin")).append_index_html_on_directories(true),
        )
        .layer(from_fn(login_gate));

    Ok(api_routes(&state)
        .nest("/admin", admin_pages)
        .fallback_service(ServeDir::new(public_dir).append_index_html_on_directories(true))
        .layer(cors(&state.config)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
