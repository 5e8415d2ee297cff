//! HTTP surface: routes, request adaptation and error mapping.
//!
//! Handlers never make authorization decisions themselves. Each one adapts
//! the incoming request into [`SignedRequestParts`], states its requirement,
//! and hands both to the gatekeeper; business logic only runs on an
//! [`AuthorizationContext`]. Metered handlers report success back so the
//! counter moves exactly once per completed action.

use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;
use vellum_guard::request::{
    APP_KEY_HEADER, IDENTITY_OVERRIDE_HEADER, SESSION_HEADER, SIGNATURE_HEADER, SPACE_HEADER,
    TIMESTAMP_HEADER,
};
use vellum_guard::{
    AuthorizationContext, Gatekeeper, GuardError, GuardRequirement, Permission, SignedRequestParts,
};
use vellum_storage::{ActionKind, CreateSpaceParams, SpaceId, SpaceStatus, Store};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub gatekeeper: Arc<Gatekeeper>,
    pub store: Arc<dyn Store>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/me", get(me))
        .route("/v1/spaces", post(create_space))
        .route("/v1/spaces/:id/approve", post(approve_space))
        .route("/v1/spaces/:id/reject", post(reject_space))
        .route("/v1/records", post(create_record))
        .route("/v1/drafts", post(draft_assist))
        .with_state(state)
}

/// Wrapper so `GuardError` can flow out of handlers with `?`.
struct Reject(GuardError);

impl From<GuardError> for Reject {
    fn from(err: GuardError) -> Self {
        Reject(err)
    }
}

impl IntoResponse for Reject {
    fn into_response(self) -> Response {
        if let GuardError::Internal(detail) = &self.0 {
            error!(detail, "request failed with internal error");
        }
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body())).into_response()
    }
}

/// Adapt an axum request into the framework-neutral signed form.
async fn signed_parts(req: Request) -> Result<SignedRequestParts, Reject> {
    let (parts, body) = req.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| GuardError::BadRequest(format!("unreadable body: {}", e)))?;

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Ok(SignedRequestParts {
        method: parts.method.as_str().to_string(),
        path_and_query: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string()),
        timestamp_ms: header(TIMESTAMP_HEADER).and_then(|v| v.parse().ok()),
        body: body.to_vec(),
        app_key: header(APP_KEY_HEADER),
        signature: header(SIGNATURE_HEADER),
        origin: header("origin"),
        referer: header("referer"),
        space_header: header(SPACE_HEADER),
        session_token: header(SESSION_HEADER),
        identity_override: header(IDENTITY_OVERRIDE_HEADER),
    })
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn me(State(state): State<AppState>, req: Request) -> Result<Response, Reject> {
    let parts = signed_parts(req).await?;
    let ctx = state
        .gatekeeper
        .authorize(&parts, &GuardRequirement::new())
        .await?;
    Ok(Json(json!({
        "id": ctx.principal.id.to_string(),
        "email": ctx.principal.email,
        "role": ctx.principal.role.as_str(),
    }))
    .into_response())
}

#[derive(Deserialize)]
struct CreateSpaceBody {
    slug: String,
    name: String,
}

async fn create_space(State(state): State<AppState>, req: Request) -> Result<Response, Reject> {
    let parts = signed_parts(req).await?;
    let ctx = state
        .gatekeeper
        .authorize(&parts, &GuardRequirement::new())
        .await?;

    let body: CreateSpaceBody = serde_json::from_slice(&parts.body)
        .map_err(|e| GuardError::BadRequest(format!("invalid space body: {}", e)))?;
    if body.slug.is_empty() || body.name.is_empty() {
        return Err(GuardError::BadRequest("slug and name are required".into()).into());
    }

    let space_id = state
        .store
        .create_space(&CreateSpaceParams {
            slug: body.slug.clone(),
            name: body.name,
            created_by: ctx.principal.id,
        })
        .await
        .map_err(|e| match e {
            vellum_storage::StoreError::AlreadyExists => {
                GuardError::BadRequest(format!("slug already taken: {}", body.slug))
            }
            other => other.into(),
        })?;

    info!(space = %space_id, requester = %ctx.principal.id, "space requested");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": space_id.to_string(),
            "slug": body.slug,
            "status": SpaceStatus::Pending.as_str(),
        })),
    )
        .into_response())
}

async fn approve_space(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> Result<Response, Reject> {
    transition_space(state, &id, SpaceStatus::Active, req).await
}

async fn reject_space(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> Result<Response, Reject> {
    transition_space(state, &id, SpaceStatus::Rejected, req).await
}

async fn transition_space(
    state: AppState,
    id: &str,
    new_status: SpaceStatus,
    req: Request,
) -> Result<Response, Reject> {
    let parts = signed_parts(req).await?;
    let ctx = state
        .gatekeeper
        .authorize(&parts, &GuardRequirement::new())
        .await?;

    let space_id: SpaceId = id
        .parse()
        .map_err(|_| GuardError::BadRequest(format!("invalid space id: {}", id)))?;
    let space = state
        .gatekeeper
        .transition_space_status(&ctx.principal, &space_id, new_status)
        .await?;

    info!(space = %space.id, status = space.status.as_str(), actor = %ctx.principal.id, "space status changed");
    Ok(Json(json!({
        "id": space.id.to_string(),
        "slug": space.slug,
        "status": space.status.as_str(),
    }))
    .into_response())
}

async fn create_record(State(state): State<AppState>, req: Request) -> Result<Response, Reject> {
    let parts = signed_parts(req).await?;
    let requirement = GuardRequirement::new()
        .permission(Permission::RecordCreate)
        .space()
        .metered(ActionKind::RecordCreate);
    let ctx = state.gatekeeper.authorize(&parts, &requirement).await?;

    // Business logic placeholder: the record store lives outside this
    // service; the id stands in for the created row.
    let record_id = Uuid::new_v4();
    record(&state, &ctx, ActionKind::RecordCreate, 0.0).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": record_id.to_string(),
            "spaceId": space_id_string(&ctx),
        })),
    )
        .into_response())
}

async fn draft_assist(State(state): State<AppState>, req: Request) -> Result<Response, Reject> {
    let parts = signed_parts(req).await?;
    let requirement = GuardRequirement::new()
        .permission(Permission::DraftAssist)
        .space()
        .metered(ActionKind::DraftAssist);
    let ctx = state.gatekeeper.authorize(&parts, &requirement).await?;

    record(&state, &ctx, ActionKind::DraftAssist, 0.01).await?;

    Ok(Json(json!({
        "draft": "",
        "spaceId": space_id_string(&ctx),
    }))
    .into_response())
}

async fn record(
    state: &AppState,
    ctx: &AuthorizationContext,
    action: ActionKind,
    cost: f64,
) -> Result<(), Reject> {
    state.gatekeeper.record_success(ctx, action, 1, cost).await?;
    Ok(())
}

fn space_id_string(ctx: &AuthorizationContext) -> Option<String> {
    ctx.space_id.map(|id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use chrono::Utc;
    use http::Request as HttpRequest;
    use tower::ServiceExt;
    use vellum_guard::{
        GuardConfig, LimitTable, OverridePrincipalProvider, RequestAuthenticator,
    };
    use vellum_storage::{Role, UpsertPrincipalParams};
    use vellum_store_memory::MemoryStore;

    struct TestApp {
        router: Router,
        store: Arc<dyn Store>,
        signer: RequestAuthenticator,
    }

    fn test_app(limits: Option<LimitTable>) -> TestApp {
        let config = GuardConfig::new("pub-key", "top-secret").with_identity_override(true);
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let provider = OverridePrincipalProvider::new(store.clone(), &config).unwrap();
        let mut gatekeeper = Gatekeeper::new(&config, store.clone(), Arc::new(provider));
        if let Some(limits) = limits {
            gatekeeper = gatekeeper.with_limits(limits);
        }
        let signer = RequestAuthenticator::new(&config);
        let router = router(AppState {
            gatekeeper: Arc::new(gatekeeper),
            store: store.clone(),
        });
        TestApp {
            router,
            store,
            signer,
        }
    }

    fn signed_request(
        app: &TestApp,
        email: &str,
        method: &str,
        path_and_query: &str,
        body: &str,
    ) -> HttpRequest<Body> {
        let now = Utc::now().timestamp_millis();
        let signature = app.signer.sign(method, path_and_query, now, body.as_bytes());
        HttpRequest::builder()
            .method(method)
            .uri(path_and_query)
            .header(APP_KEY_HEADER, "pub-key")
            .header(TIMESTAMP_HEADER, now.to_string())
            .header(SIGNATURE_HEADER, signature)
            .header(IDENTITY_OVERRIDE_HEADER, email)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), MAX_BODY_BYTES).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_needs_no_signature() {
        let app = test_app(None);
        let response = app
            .router
            .oneshot(
                HttpRequest::builder()
                    .uri("/v1/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_unsigned_protected_request_is_forbidden() {
        let app = test_app(None);
        let response = app
            .router
            .oneshot(
                HttpRequest::builder()
                    .uri("/v1/me")
                    .header(IDENTITY_OVERRIDE_HEADER, "u@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["code"], "FORBIDDEN");
        // Uniform rejection: no hint about which check failed.
        assert_eq!(body["error"], "forbidden");
    }

    #[tokio::test]
    async fn test_me_returns_resolved_principal() {
        let app = test_app(None);
        let request = signed_request(&app, "ada@example.com", "GET", "/v1/me", "");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["email"], "ada@example.com");
        assert_eq!(body["role"], "user");
    }

    #[tokio::test]
    async fn test_space_request_and_admin_approval_flow() {
        let app = test_app(None);

        let request = signed_request(
            &app,
            "requester@example.com",
            "POST",
            "/v1/spaces",
            r#"{"slug":"team-a","name":"Team A"}"#,
        );
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "pending");
        let space_id = body["id"].as_str().unwrap().to_string();

        // A plain user cannot approve, an admin can.
        let path = format!("/v1/spaces/{}/approve", space_id);
        let request = signed_request(&app, "requester@example.com", "POST", &path, "");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let admin = app
            .store
            .upsert_principal(&UpsertPrincipalParams {
                email: "admin@example.com".into(),
                role: Role::Admin,
            })
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        let request = signed_request(&app, "admin@example.com", "POST", &path, "");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "active");
    }

    #[tokio::test]
    async fn test_record_creation_consumes_quota() {
        let app = test_app(Some(
            LimitTable::empty().with_limit(Role::User, ActionKind::RecordCreate, 2),
        ));

        // Membership comes from owning a space.
        let request = signed_request(
            &app,
            "u@example.com",
            "POST",
            "/v1/spaces",
            r#"{"slug":"mine","name":"Mine"}"#,
        );
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        for _ in 0..2 {
            let request = signed_request(&app, "u@example.com", "POST", "/v1/records", "");
            let response = app.router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let request = signed_request(&app, "u@example.com", "POST", "/v1/records", "");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json_body(response).await;
        assert_eq!(body["code"], "USAGE_LIMIT_EXCEEDED");
        assert_eq!(body["current"], 2);
        assert_eq!(body["limit"], 2);
    }

    #[tokio::test]
    async fn test_non_member_gets_not_a_member() {
        let app = test_app(None);

        let request = signed_request(
            &app,
            "owner@example.com",
            "POST",
            "/v1/spaces",
            r#"{"slug":"team-a","name":"Team A"}"#,
        );
        let response = app.router.clone().oneshot(request).await.unwrap();
        let space_id = json_body(response).await["id"].as_str().unwrap().to_string();

        let path = format!("/v1/records?spaceId={}", space_id);
        let request = signed_request(&app, "outsider@example.com", "POST", &path, "");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "NOT_A_MEMBER");
    }

    #[tokio::test]
    async fn test_draft_assist_requires_premium() {
        let app = test_app(None);

        let request = signed_request(
            &app,
            "u@example.com",
            "POST",
            "/v1/spaces",
            r#"{"slug":"mine","name":"Mine"}"#,
        );
        app.router.clone().oneshot(request).await.unwrap();

        let request = signed_request(&app, "u@example.com", "POST", "/v1/drafts", "");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let u = app
            .store
            .get_principal_by_email("u@example.com")
            .await
            .unwrap();
        app.store
            .set_principal_role(&u.id, Role::Premium)
            .await
            .unwrap();
        let request = signed_request(&app, "u@example.com", "POST", "/v1/drafts", "");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reject_flow_ends_rejected() {
        let app = test_app(None);

        let request = signed_request(
            &app,
            "requester@example.com",
            "POST",
            "/v1/spaces",
            r#"{"slug":"team-b","name":"Team B"}"#,
        );
        let response = app.router.clone().oneshot(request).await.unwrap();
        let space_id = json_body(response).await["id"].as_str().unwrap().to_string();

        app.store
            .upsert_principal(&UpsertPrincipalParams {
                email: "admin@example.com".into(),
                role: Role::Admin,
            })
            .await
            .unwrap();
        let path = format!("/v1/spaces/{}/reject", space_id);
        let request = signed_request(&app, "admin@example.com", "POST", &path, "");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "rejected");

        let id: SpaceId = space_id.parse().unwrap();
        assert_eq!(
            app.store.get_space(&id).await.unwrap().status,
            SpaceStatus::Rejected
        );
    }
}
