use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reflex_core::benchmark::BenchmarkCache;
use reflex_core::cache::{CacheManager, GenerationError};
use reflex_core::catalog::ThemeCatalog;
use reflex_core::domain::artifact::{safe_stem, ArtifactKind};
use reflex_core::storage::{DataStore, PgDataStore};
use reflex_core::time::{Clock, SystemClock};
use reflex_core::watchdog::{spawn_watchdog, ActivityClock};

const LANDING_PAGE: &str = "/main_trends.html";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = reflex_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store: Option<Arc<dyn DataStore>> = match settings.require_database_url() {
        Ok(db_url) => match PgDataStore::connect(db_url).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "db connect failed; serving cached pages only");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; serving cached pages only");
            None
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let catalog = Arc::new(ThemeCatalog::from_settings(&settings));
    let benchmark = Arc::new(BenchmarkCache::from_settings(&settings, clock.clone())?);
    let generator = reflex_core::generate::from_settings(
        &settings,
        store,
        catalog.clone(),
        benchmark,
        clock.clone(),
    )?;
    let manager = CacheManager::from_settings(&settings, generator, catalog, clock);

    let activity = Arc::new(ActivityClock::default());
    spawn_watchdog(
        activity.clone(),
        settings.inactivity_timeout,
        settings.watchdog_poll,
        || {
            std::process::exit(0);
        },
    )?;

    let state = AppState {
        manager: Arc::new(manager),
        activity,
    };
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(
        %addr,
        html_dir = %settings.html_dir.display(),
        idle_timeout_secs = settings.inactivity_timeout.as_secs(),
        "server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    manager: Arc<CacheManager>,
    activity: Arc<ActivityClock>,
}

fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(state.manager.html_dir());

    Router::new()
        .route("/", get(landing))
        .route("/healthz", get(healthz))
        .route("/profile/:symbol", get(profile))
        .route("/theme/:name", get(theme_detail))
        .route("/theme/:name/equity", get(theme_equity))
        .route("/theme/:name/breakdown", get(theme_breakdown))
        .fallback_service(static_files)
        .layer(middleware::from_fn_with_state(state.clone(), track_activity))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn track_activity(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.activity.touch();
    next.run(request).await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn landing() -> Response {
    found(LANDING_PAGE)
}

async fn profile(State(state): State<AppState>, Path(symbol): Path<String>) -> Result<Response, StatusCode> {
    serve_artifact(&state, &symbol, ArtifactKind::Profile).await
}

async fn theme_detail(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, StatusCode> {
    serve_artifact(&state, &name, ArtifactKind::ThemeDetail).await
}

async fn theme_equity(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, StatusCode> {
    serve_artifact(&state, &name, ArtifactKind::EquityChart).await
}

async fn theme_breakdown(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, StatusCode> {
    serve_artifact(&state, &name, ArtifactKind::BreakdownChart).await
}

async fn serve_artifact(state: &AppState, raw: &str, kind: ArtifactKind) -> Result<Response, StatusCode> {
    if safe_stem(raw).is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.manager.get_or_generate(raw, kind).await {
        Ok(response) => {
            tracing::debug!(
                %kind,
                identity = %response.artifact.identity,
                outcome = ?response.outcome,
                "serving artifact"
            );
            Ok(found(&response.artifact.url_path()))
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            if let Some(failure) = e.downcast_ref::<GenerationError>() {
                tracing::error!(%kind, identity = %failure.identity, stage = failure.stage, error = %failure.detail, "artifact generation failed");
            } else {
                tracing::error!(%kind, query = raw, error = %format!("{e:#}"), "artifact lookup failed");
            }
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn init_sentry(settings: &reflex_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use reflex_core::cache::MemoryIndex;
    use reflex_core::domain::artifact::Artifact;
    use reflex_core::generate::{write_atomic, GenerateRequest, Generator, UnavailableGenerator};
    use tower::ServiceExt;

    struct StubGenerator;

    #[async_trait::async_trait]
    impl Generator for StubGenerator {
        async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<Artifact> {
            write_atomic(&request.path, b"<html></html>")?;
            Ok(Artifact {
                identity: request.key.identity.clone(),
                kind: request.key.kind,
                path: request.path.clone(),
                generated_at: chrono::Utc::now(),
            })
        }
    }

    fn state(dir: &std::path::Path, generator: Arc<dyn Generator>) -> AppState {
        let manager = CacheManager::new(
            dir.to_path_buf(),
            generator,
            Arc::new(MemoryIndex::new()),
            Arc::new(SystemClock),
        );
        AppState {
            manager: Arc::new(manager),
            activity: Arc::new(ActivityClock::new(chrono::Utc::now() - chrono::Duration::hours(1))),
        }
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(HttpRequest::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn profile_redirects_to_generated_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path(), Arc::new(StubGenerator)));

        let response = get(app, "/profile/nvda").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/nvda_profile.html");
        assert!(dir.path().join("nvda_profile.html").is_file());
    }

    #[tokio::test]
    async fn theme_routes_map_to_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path(), Arc::new(StubGenerator)));

        let detail = get(app.clone(), "/theme/Accelerated_Computing").await;
        let equity = get(app.clone(), "/theme/Accelerated%20Computing/equity").await;
        let breakdown = get(app, "/theme/accelerated-computing/breakdown").await;

        assert_eq!(location(&detail), "/accelerated_computing_detail.html");
        assert_eq!(location(&equity), "/accelerated_computing_equity.html");
        assert_eq!(location(&breakdown), "/accelerated_computing_breakdown.html");
    }

    #[tokio::test]
    async fn generation_failure_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path(), Arc::new(UnavailableGenerator::new("offline"))));

        let response = get(app, "/profile/NVDA").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn root_redirects_to_landing_page() {
        let dir = tempfile::tempdir().unwrap();
        let response = get(router(state(dir.path(), Arc::new(StubGenerator))), "/").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), LANDING_PAGE);
    }

    #[tokio::test]
    async fn static_files_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main_trends.html"), "trends").unwrap();
        let app = router(state(dir.path(), Arc::new(StubGenerator)));

        assert_eq!(get(app.clone(), "/main_trends.html").await.status(), StatusCode::OK);
        assert_eq!(get(app, "/missing.html").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn requests_refresh_activity() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Arc::new(StubGenerator));
        let activity = state.activity.clone();
        let before = activity.last_activity();

        get(router(state), "/healthz").await;

        assert!(activity.last_activity() > before);
    }
}
