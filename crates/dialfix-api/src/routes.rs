use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use dialfix_core::db::{
    ContactCache, Database, LibSqlContactCache, LibSqlStagedChangeStore, StagedChangeStore,
};
use dialfix_core::gateway::{ContactGateway, PeopleApiClient};
use dialfix_core::models::StagedSummary;
use dialfix_core::push::PushEvent;
use dialfix_core::sync::{sync_contacts, SyncReport};
use dialfix_core::util::user_fingerprint;
use dialfix_core::{ChangeAction, NewStagedChange, PushEngine, PushSummary, StagedChange};
use futures::stream::Stream;
use http::{header, HeaderName, HeaderValue, Method};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::identity::{extract_user, CallerIdentity, USER_HEADER};
use crate::rate_limit::{PushGuard, RateLimitMetricsSnapshot, UserRateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    _database: Arc<Database>,
    gateway: Arc<dyn ContactGateway>,
    staged: Arc<dyn StagedChangeStore>,
    cache: Arc<dyn ContactCache>,
    engine: PushEngine,
    rate_limiter: Arc<UserRateLimiter>,
    push_guard: PushGuard,
}

impl AppState {
    pub async fn from_config(config: Arc<AppConfig>) -> dialfix_core::Result<Self> {
        let database = Arc::new(Database::open(&config.database_path).await?);
        let gateway = Arc::new(PeopleApiClient::new(
            config.people_api_url.clone(),
            config.google_access_token.clone(),
        )?);
        Ok(Self::from_parts(config, database, gateway))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        database: Arc<Database>,
        gateway: Arc<dyn ContactGateway>,
    ) -> Self {
        let staged: Arc<dyn StagedChangeStore> = Arc::new(LibSqlStagedChangeStore::new(
            database.connection().clone(),
        ));
        let cache: Arc<dyn ContactCache> =
            Arc::new(LibSqlContactCache::new(database.connection().clone()));
        let engine = PushEngine::new(gateway.clone(), staged.clone(), cache.clone())
            .with_config(config.push_config());

        Self {
            rate_limiter: Arc::new(UserRateLimiter::from_config(config.as_ref())),
            push_guard: PushGuard::default(),
            config,
            _database: database,
            gateway,
            staged,
            cache,
            engine,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let contact_routes = Router::new()
        .route("/v1/contacts", get(list_contacts))
        .route("/v1/contacts/sync", post(sync))
        .route("/v1/contacts/stage", post(stage))
        .route("/v1/contacts/pending", get(pending))
        .route("/v1/contacts/staged", delete(clear_staged))
        .route("/v1/contacts/staged/{*resource_id}", delete(unstage))
        .route("/v1/contacts/push", post(push))
        .route("/v1/contacts/push/stream", get(push_stream))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/healthz", get(healthz))
        .merge(contact_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_HEADER)])
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.rate_limiter.metrics_snapshot(),
    })
}

async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = extract_user(request.headers())?;
    state.rate_limiter.check(&identity.user_id).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[derive(Debug, Serialize)]
struct ContactView {
    resource_id: String,
    display_name: String,
    phone_number: Option<String>,
    version_token: String,
}

#[derive(Debug, Serialize)]
struct ContactsResponse {
    count: usize,
    contacts: Vec<ContactView>,
}

async fn list_contacts(
    State(state): State<AppState>,
    Extension(user): Extension<CallerIdentity>,
) -> Result<Json<ContactsResponse>, AppError> {
    let contacts: Vec<ContactView> = state
        .cache
        .list_for_user(&user.user_id)
        .await?
        .into_iter()
        .map(|record| ContactView {
            resource_id: record.resource_id,
            display_name: record.display_name,
            phone_number: record.phone_number,
            version_token: record.version_token,
        })
        .collect();

    Ok(Json(ContactsResponse {
        count: contacts.len(),
        contacts,
    }))
}

async fn sync(
    State(state): State<AppState>,
    Extension(user): Extension<CallerIdentity>,
) -> Result<Json<SyncReport>, AppError> {
    let report = sync_contacts(
        state.gateway.as_ref(),
        state.cache.as_ref(),
        &user.user_id,
    )
    .await?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct StageResponse {
    status: &'static str,
    action: ChangeAction,
    resource_id: String,
}

async fn stage(
    State(state): State<AppState>,
    Extension(user): Extension<CallerIdentity>,
    Json(request): Json<NewStagedChange>,
) -> Result<Json<StageResponse>, AppError> {
    let _edit = begin_edit(&state, &user)?;
    let staged = state.staged.stage(&user.user_id, request).await?;
    tracing::info!(
        user = user_fingerprint(&user.user_id),
        resource_id = %staged.resource_id,
        action = %staged.action,
        "Staged change"
    );
    Ok(Json(StageResponse {
        status: "staged",
        action: staged.action,
        resource_id: staged.resource_id,
    }))
}

#[derive(Debug, Serialize)]
struct PendingResponse {
    summary: StagedSummary,
    changes: Vec<StagedChange>,
    push_running: bool,
}

async fn pending(
    State(state): State<AppState>,
    Extension(user): Extension<CallerIdentity>,
) -> Result<Json<PendingResponse>, AppError> {
    let changes = state.staged.list_for_user(&user.user_id).await?;
    let summary = state.staged.summary(&user.user_id).await?;
    Ok(Json(PendingResponse {
        summary,
        changes,
        push_running: state.push_guard.is_running(&user.user_id),
    }))
}

#[derive(Debug, Serialize)]
struct UnstageResponse {
    status: &'static str,
    resource_id: String,
}

async fn unstage(
    State(state): State<AppState>,
    Extension(user): Extension<CallerIdentity>,
    Path(resource_id): Path<String>,
) -> Result<Json<UnstageResponse>, AppError> {
    let resource_id = resource_id.trim().to_string();
    if resource_id.is_empty() {
        return Err(AppError::bad_request("Resource id must not be blank"));
    }

    let _edit = begin_edit(&state, &user)?;
    if !state.staged.remove(&user.user_id, &resource_id).await? {
        return Err(AppError::NotFound(format!(
            "No staged change for {resource_id}"
        )));
    }
    Ok(Json(UnstageResponse {
        status: "removed",
        resource_id,
    }))
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    status: &'static str,
    removed: u64,
}

async fn clear_staged(
    State(state): State<AppState>,
    Extension(user): Extension<CallerIdentity>,
) -> Result<Json<ClearResponse>, AppError> {
    let _permit = acquire_push(&state, &user)?;
    let removed = state.staged.clear_for_user(&user.user_id).await?;
    Ok(Json(ClearResponse {
        status: "cleared",
        removed,
    }))
}

/// Runs the whole batch on its own task so a dropped request cannot cut it short
async fn push(
    State(state): State<AppState>,
    Extension(user): Extension<CallerIdentity>,
) -> Result<Json<PushSummary>, AppError> {
    let permit = acquire_push(&state, &user)?;
    let engine = state.engine.clone();
    let user_id = user.user_id;

    let summary = tokio::spawn(async move {
        let _permit = permit;
        engine.push(&user_id).await
    })
    .await
    .map_err(|error| AppError::internal(format!("Push task failed: {error}")))??;

    Ok(Json(summary))
}

async fn push_stream(
    State(state): State<AppState>,
    Extension(user): Extension<CallerIdentity>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let permit = acquire_push(&state, &user)?;
    let (events, worker) = state.engine.push_stream(&user.user_id).into_parts();

    // Release the per-user slot only once the worker has stopped touching the staged set
    tokio::spawn(async move {
        if let Err(error) = worker.await {
            tracing::error!("Push stream worker failed: {}", error);
        }
        drop(permit);
    });

    let stream = ReceiverStream::new(events).map(|event| Ok::<_, Infallible>(sse_event(&event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn acquire_push(
    state: &AppState,
    user: &CallerIdentity,
) -> Result<crate::rate_limit::PushPermit, AppError> {
    state.push_guard.try_acquire(&user.user_id).inspect_err(|_| {
        state.rate_limiter.record_push_conflict();
        tracing::warn!(
            user = user_fingerprint(&user.user_id),
            "Rejected concurrent push"
        );
    })
}

fn begin_edit(
    state: &AppState,
    user: &CallerIdentity,
) -> Result<crate::rate_limit::EditPermit, AppError> {
    state.push_guard.try_edit(&user.user_id).inspect_err(|_| {
        state.rate_limiter.record_push_conflict();
        tracing::warn!(
            user = user_fingerprint(&user.user_id),
            "Rejected staged edit during push"
        );
    })
}

fn sse_event(event: &PushEvent) -> Event {
    if event.is_terminal() {
        tracing::debug!(kind = event.kind(), "Push stream finished");
    }
    Event::default()
        .event(event.kind())
        .json_data(event)
        .unwrap_or_else(|error| {
            Event::default()
                .event("error")
                .data(format!("Failed to encode push event: {error}"))
        })
}
