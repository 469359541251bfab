//! HealthPal API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Rate limiter → 2. Auth resolver → 3. Audit logger

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::{ApiContext, IdentityProvider};
use crate::core_state::CoreState;

/// Build the HealthPal API router.
///
/// Every route except `/api/health` requires a bearer token that the
/// identity provider resolves to a doctor or patient.
pub fn api_router(
    core: Arc<CoreState>,
    identity: Arc<dyn IdentityProvider>,
    rate_per_minute: u32,
) -> Router {
    build_router(ApiContext::with_rate_limit(core, identity, rate_per_minute))
}

/// Build router from a pre-constructed `ApiContext`.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn build_router(ctx: ApiContext) -> Router {
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension → Rate limit → Auth → Audit → Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/create-invitation", post(endpoints::invitations::create))
        .route("/accept-invitation", post(endpoints::invitations::accept))
        .route("/reject-invitation", post(endpoints::invitations::reject))
        .route("/invitations", get(endpoints::invitations::list))
        .route("/share-resource", post(endpoints::sharing::share))
        .route("/revoke-resource", post(endpoints::sharing::revoke))
        .route("/revoke-all-of-type", post(endpoints::sharing::revoke_all))
        .route("/shares", get(endpoints::sharing::list))
        .route("/accessible-resources", get(endpoints::access::accessible))
        .route("/relationships", get(endpoints::access::relationships))
        .route(
            "/patients/:patient_id/resources",
            get(endpoints::records::list_for_patient),
        )
        .route("/records", post(endpoints::records::register))
        .route(
            "/prescriptions",
            get(endpoints::prescriptions::list).post(endpoints::prescriptions::create),
        )
        .route("/prescriptions/:id", delete(endpoints::prescriptions::delete))
        .route("/prescriptions/:id/doses", get(endpoints::prescriptions::doses))
        .route("/doses/:id/status", post(endpoints::prescriptions::record_status))
        .route("/alerts", get(endpoints::alerts::list))
        .route("/alerts/:id/read", post(endpoints::alerts::mark_read))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::types::SessionRegistry;
    use crate::db::repository::fixtures::{seed_doctor, seed_patient};
    use crate::identity::Caller;

    struct TestApp {
        router: Router,
        doctor_id: String,
        patient_id: String,
        doctor_token: String,
        patient_token: String,
        stranger_token: String,
        _dir: tempfile::TempDir,
    }

    fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let core = Arc::new(CoreState::with_db_path(dir.path().join("api.db")));

        let conn = core.open_db().unwrap();
        let doctor = seed_doctor(&conn, "dr@clinic.io");
        let stranger = seed_doctor(&conn, "other@clinic.io");
        let patient = seed_patient(&conn, "ana@example.com");
        drop(conn);

        let registry = Arc::new(SessionRegistry::new());
        let doctor_token = registry.issue(Caller::doctor(doctor.id, &doctor.email));
        let stranger_token = registry.issue(Caller::doctor(stranger.id, &stranger.email));
        let patient_token = registry.issue(Caller::patient(patient.id, &patient.email));

        TestApp {
            router: api_router(core, registry, 1000),
            doctor_id: doctor.id.to_string(),
            patient_id: patient.id.to_string(),
            doctor_token,
            patient_token,
            stranger_token,
            _dir: dir,
        }
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
        let response: Response = app.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = test_app();
        let (status, json) = send(&app, request("GET", "/api/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["database"], true);
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let app = test_app();
        let (status, json) = send(&app, request("GET", "/api/invitations", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["success"], false);

        let (status, _) = send(&app, request("GET", "/api/invitations", Some("bogus"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authenticated_responses_are_not_cached() {
        let app = test_app();
        let response = app
            .router
            .clone()
            .oneshot(request("GET", "/api/shares", Some(&app.patient_token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
    }

    #[tokio::test]
    async fn invite_accept_share_and_resolve() {
        let app = test_app();

        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/create-invitation",
                Some(&app.doctor_token),
                Some(json!({"doctorId": app.doctor_id, "patientEmail": "Ana@Example.com"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "pending");
        let invitation_id = json["data"]["id"].as_str().unwrap().to_string();

        let accept = json!({"invitationId": invitation_id});
        let (status, json) = send(
            &app,
            request("POST", "/api/accept-invitation", Some(&app.patient_token), Some(accept.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "accepted");

        // A second resolution conflicts
        let (status, json) = send(
            &app,
            request("POST", "/api/accept-invitation", Some(&app.patient_token), Some(accept)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "CONFLICT");

        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/records",
                Some(&app.patient_token),
                Some(json!({"resourceType": "documents", "title": "MRI"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let record_id = json["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/share-resource",
                Some(&app.patient_token),
                Some(json!({
                    "doctorId": app.doctor_id,
                    "resourceType": "documents",
                    "resourceId": record_id,
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!(
            "/api/accessible-resources?doctorId={}&patientId={}&resourceType=documents",
            app.doctor_id, app.patient_id
        );
        let (status, json) = send(&app, request("GET", &uri, Some(&app.doctor_token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["scope"], "resources");
        assert_eq!(json["data"]["resourceIds"][0], record_id.as_str());

        let uri = format!("/api/patients/{}/resources?resourceType=documents", app.patient_id);
        let (status, json) = send(&app, request("GET", &uri, Some(&app.doctor_token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"][0]["title"], "MRI");

        let (status, json) = send(&app, request("GET", "/api/relationships", Some(&app.doctor_token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn third_party_doctor_is_forbidden() {
        let app = test_app();
        let uri = format!(
            "/api/accessible-resources?doctorId={}&patientId={}&resourceType=vaccines",
            app.doctor_id, app.patient_id
        );
        let (status, json) = send(&app, request("GET", &uri, Some(&app.stranger_token), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn unknown_resource_type_is_rejected() {
        let app = test_app();
        let uri = format!(
            "/api/accessible-resources?doctorId={}&patientId={}&resourceType=lab_results",
            app.doctor_id, app.patient_id
        );
        let (status, json) = send(&app, request("GET", &uri, Some(&app.doctor_token), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_RESOURCE_TYPE");
    }

    #[tokio::test]
    async fn missing_invitation_is_not_found() {
        let app = test_app();
        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/accept-invitation",
                Some(&app.patient_token),
                Some(json!({"invitationId": uuid::Uuid::new_v4()})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_error() {
        let app = test_app();
        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/create-invitation",
                Some(&app.doctor_token),
                Some(json!({"patientEmail": "ana@example.com"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn prescription_lifecycle_over_http() {
        let app = test_app();
        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/prescriptions",
                Some(&app.patient_token),
                Some(json!({
                    "diagnosis": "Infection",
                    "startDate": "2030-01-01T08:00:00Z",
                    "medicines": [{"frequencyHours": 8, "durationDays": 2}],
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["medicines"][0]["medicineName"], "Medication");
        assert_eq!(json["data"]["doses"].as_array().unwrap().len(), 6);
        let rx_id = json["data"]["prescription"]["id"].as_str().unwrap().to_string();
        let dose_id = json["data"]["doses"][0]["id"].as_str().unwrap().to_string();

        let (status, json) = send(
            &app,
            request(
                "POST",
                &format!("/api/doses/{dose_id}/status"),
                Some(&app.patient_token),
                Some(json!({"status": "taken"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "taken");

        let (status, json) = send(&app, request("GET", "/api/alerts?unreadOnly=true", Some(&app.patient_token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"][0]["title"], "Next dose: Medication");

        // Doctors without a share cannot read the doses
        let doses_uri = format!("/api/prescriptions/{rx_id}/doses");
        let (status, _) = send(&app, request("GET", &doses_uri, Some(&app.doctor_token), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            request("DELETE", &format!("/api/prescriptions/{rx_id}"), Some(&app.patient_token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, request("GET", &doses_uri, Some(&app.patient_token), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rate_limit_applies_per_token() {
        let dir = tempfile::tempdir().unwrap();
        let core = Arc::new(CoreState::with_db_path(dir.path().join("api.db")));
        let registry = Arc::new(SessionRegistry::new());
        let token = registry.issue(Caller::patient(uuid::Uuid::new_v4(), "ana@example.com"));
        let app = api_router(core, registry, 2);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request("GET", "/api/shares", Some(&token), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app
            .oneshot(request("GET", "/api/shares", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));
    }
}
