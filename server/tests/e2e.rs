use axum::{
    body::Body,
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use flock_api::{build_router, sweep_expired_invites, AppState};
use flock_config::AppConfig;
use flock_runtime::BackendServices;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct Backend {
    _temp_dir: TempDir,
    services: BackendServices,
    app: Router,
}

impl Backend {
    async fn start() -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", temp_dir.path().join("e2e.db").display());
        config.database.max_connections = 2;

        let services = BackendServices::initialise(&config).await?;
        let state = AppState::new(
            services.db_pool.clone(),
            services.authenticator.clone(),
            services.invites.clone(),
        );

        Ok(Self {
            _temp_dir: temp_dir,
            app: build_router(state),
            services,
        })
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, json))
    }
}

#[tokio::test]
async fn health_check_reports_database() -> anyhow::Result<()> {
    let backend = Backend::start().await?;
    let (status, body) = backend.call(Method::GET, "/health", None, None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");
    Ok(())
}

#[tokio::test]
async fn sunday_service_flows_into_weekly_summary() -> anyhow::Result<()> {
    let backend = Backend::start().await?;

    let (status, session) = backend
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": "pastor@example.com",
                "password": "correct horse",
                "church_name": "Grace Chapel",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{session}");
    let token = session["token"].as_str().unwrap_or_default().to_string();

    let (_, me) = backend
        .call(Method::GET, "/api/users/me", Some(&token), None)
        .await?;
    let church = me["user"]["church"]["id"].as_str().unwrap_or_default().to_string();
    let base = format!("/api/churches/{church}");

    let (status, bacenta) = backend
        .call(
            Method::POST,
            &format!("{base}/bacentas"),
            Some(&token),
            Some(json!({ "name": "Airport" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{bacenta}");
    let bacenta_id = bacenta["bacenta"]["id"].as_str().unwrap_or_default().to_string();

    let mut member_ids = Vec::new();
    for (name, phone) in [("Kofi", "0244000001"), ("Esi", "0244000002")] {
        let (status, member) = backend
            .call(
                Method::POST,
                &format!("{base}/members"),
                Some(&token),
                Some(json!({ "first_name": name, "phone": phone, "bacenta_id": bacenta_id })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "{member}");
        member_ids.push(member["member"]["id"].as_str().unwrap_or_default().to_string());
    }

    for (member_id, mark) in member_ids.iter().zip(["present", "absent"]) {
        let (status, body) = backend
            .call(
                Method::PUT,
                &format!("{base}/attendance/members/{member_id}"),
                Some(&token),
                Some(json!({ "date": "2024-03-10", "status": mark })),
            )
            .await?;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (status, body) = backend
        .call(
            Method::PUT,
            &format!("{base}/bacentas/{bacenta_id}/head-count"),
            Some(&token),
            Some(json!({ "date": "2024-03-10", "count": 40 })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");

    // Mid-week dates resolve to the preceding Sunday.
    let (status, summary) = backend
        .call(
            Method::GET,
            &format!("{base}/analytics/weekly?date=2024-03-13"),
            Some(&token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{summary}");
    assert_eq!(summary["date"], "2024-03-10");
    assert_eq!(summary["total_members"], 2);
    assert_eq!(summary["present"], 1);
    assert_eq!(summary["absent"], 1);
    assert_eq!(summary["head_count_total"], 40);
    Ok(())
}

#[tokio::test]
async fn invite_sweep_on_fresh_database_expires_nothing() -> anyhow::Result<()> {
    let backend = Backend::start().await?;
    assert_eq!(sweep_expired_invites(&backend.services.db_pool).await?, 0);
    Ok(())
}
