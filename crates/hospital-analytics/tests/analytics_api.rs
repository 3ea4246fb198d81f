//! Drives the analytics service against a mocked records API.

use std::sync::Arc;

use hospital_analytics::config::ApiConfig;
use hospital_analytics::{ApiClient, AppState, build_app};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn token_config(upstream: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: upstream.uri(),
        token: Some(TOKEN.into()),
        ..ApiConfig::default()
    }
}

fn login_config(upstream: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: upstream.uri(),
        username: Some("analyst".into()),
        password: Some("password123".into()),
        ..ApiConfig::default()
    }
}

async fn spawn(config: ApiConfig) -> String {
    let client = ApiClient::new(&config).unwrap();
    let app = build_app(AppState {
        client: Arc::new(client),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn get(url: String) -> (u16, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

/// A collection envelope as the records API serves it.
fn collection(items: Value) -> ResponseTemplate {
    let count = items.as_array().map_or(0, Vec::len);
    ResponseTemplate::new(200).set_body_json(json!({
        "data": items,
        "count": count,
        "_links": {"self": {"href": "/", "method": "GET"}}
    }))
}

async fn mount_collection(upstream: &MockServer, endpoint: &str, items: Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(collection(items))
        .mount(upstream)
        .await;
}

fn visits() -> Value {
    json!([
        {"id": 1, "patient_id": 1, "doctor_id": 1, "visit_date": "2024-03-01T09:00:00Z", "diagnosis": "Flu"},
        {"id": 2, "patient_id": 2, "doctor_id": 1, "visit_date": "2024-03-01T14:00:00Z", "diagnosis": "Migraine"},
        {"id": 3, "patient_id": 3, "doctor_id": 2, "visit_date": "2024-03-02T10:00:00Z", "diagnosis": null},
        {"id": 4, "patient_id": 3, "doctor_id": 2, "visit_date": "garbage", "diagnosis": "Flu"}
    ])
}

#[tokio::test]
async fn patient_stats_from_upstream_collection() {
    let upstream = MockServer::start().await;
    mount_collection(
        &upstream,
        "/patients",
        json!([
            {"id": 1, "name": "John Doe", "age": 45, "contact_info": "x", "_links": {}},
            {"id": 2, "name": "Jane Smith", "age": 32, "contact_info": "y", "_links": {}},
            {"id": 3, "name": "Bob Johnson", "age": 58, "contact_info": "z", "_links": {}},
            {"id": 4, "name": "Alice Brown", "age": 27, "contact_info": "w", "_links": {}}
        ]),
    )
    .await;
    let base = spawn(token_config(&upstream)).await;

    let (status, body) = get(format!("{base}/analytics/patient-stats")).await;
    assert_eq!(status, 200);
    assert_eq!(body["total_patients"], 4);
    assert_eq!(body["average_age"], 40.5);
    assert_eq!(
        body["age_distribution"],
        json!({"0-18": 0, "19-30": 1, "31-50": 2, "51-70": 1, "70+": 0})
    );
}

#[tokio::test]
async fn visit_trends_counts_every_parsable_visit() {
    let upstream = MockServer::start().await;
    mount_collection(&upstream, "/visits", visits()).await;
    let base = spawn(token_config(&upstream)).await;

    let (status, body) = get(format!("{base}/analytics/visit-trends?days=2")).await;
    assert_eq!(status, 200);
    assert_eq!(body["daily_visits"], json!({"2024-03-01": 2, "2024-03-02": 1}));
    assert_eq!(body["total_visits"], 3);
    assert_eq!(body["average_daily_visits"], 1.5);
    assert_eq!(body["period"], "Last 2 days");

    let (_, body) = get(format!("{base}/analytics/visit-trends")).await;
    assert_eq!(body["period"], "Last 30 days");
}

#[tokio::test]
async fn visit_trends_rejects_non_positive_days_without_calling_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/visits"))
        .respond_with(collection(json!([])))
        .expect(0)
        .mount(&upstream)
        .await;
    let base = spawn(token_config(&upstream)).await;

    for days in ["0", "-5", "soon"] {
        let (status, body) = get(format!("{base}/analytics/visit-trends?days={days}")).await;
        assert_eq!(status, 400, "days={days}");
        assert!(body["error"].as_str().unwrap().contains("Days parameter"));
    }
}

#[tokio::test]
async fn prescription_analysis_over_upstream_rows() {
    let upstream = MockServer::start().await;
    mount_collection(
        &upstream,
        "/prescriptions",
        json!([
            {"id": 1, "doctor_id": 1, "drug_name": "Amoxicillin", "dosage": "500mg", "duration": 7},
            {"id": 2, "doctor_id": 1, "drug_name": "Amoxicillin", "dosage": "500mg", "duration": 10},
            {"id": 3, "doctor_id": 2, "drug_name": "Metformin", "dosage": "850mg", "duration": 30},
            {"id": 4, "doctor_id": 2, "drug_name": "Ibuprofen", "dosage": "400mg", "duration": "3 days"}
        ]),
    )
    .await;
    let base = spawn(token_config(&upstream)).await;

    let (status, body) = get(format!("{base}/analytics/prescription-analysis")).await;
    assert_eq!(status, 200);
    assert_eq!(body["total_prescriptions"], 4);
    assert_eq!(body["unique_drugs"], 3);
    assert_eq!(body["most_prescribed_drugs"]["Amoxicillin"], 2);
    assert_eq!(
        body["duration_analysis"],
        json!({"1-3 days": 1, "4-7 days": 1, "8-14 days": 1, "15+ days": 1})
    );
}

#[tokio::test]
async fn doctor_workload_combines_visits_and_prescriptions() {
    let upstream = MockServer::start().await;
    mount_collection(&upstream, "/visits", visits()).await;
    mount_collection(
        &upstream,
        "/prescriptions",
        json!([
            {"id": 1, "doctor_id": 2, "drug_name": "Aspirin", "duration": 3},
            {"id": 2, "doctor_id": 7, "drug_name": "Aspirin", "duration": 3}
        ]),
    )
    .await;
    let base = spawn(token_config(&upstream)).await;

    let (status, body) = get(format!("{base}/analytics/doctor-workload")).await;
    assert_eq!(status, 200);
    assert_eq!(body["total_doctors"], 2);
    assert_eq!(body["doctor_stats"]["1"]["name"], "Doctor 1");
    assert_eq!(body["doctor_stats"]["1"]["visits"], 2);
    assert_eq!(body["doctor_stats"]["1"]["prescriptions"], 0);
    assert_eq!(body["doctor_stats"]["1"]["diagnoses"], json!(["Flu", "Migraine"]));
    assert_eq!(body["doctor_stats"]["2"]["visits"], 2);
    assert_eq!(body["doctor_stats"]["2"]["prescriptions"], 1);
    assert!(body["doctor_stats"].get("7").is_none());
}

#[tokio::test]
async fn doctor_workload_survives_prescription_outage() {
    let upstream = MockServer::start().await;
    mount_collection(&upstream, "/visits", visits()).await;
    Mock::given(method("GET"))
        .and(path("/prescriptions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&upstream)
        .await;
    let base = spawn(token_config(&upstream)).await;

    let (status, body) = get(format!("{base}/analytics/doctor-workload")).await;
    assert_eq!(status, 200);
    assert_eq!(body["doctor_stats"]["2"]["visits"], 2);
    assert_eq!(body["doctor_stats"]["2"]["prescriptions"], 0);
}

#[tokio::test]
async fn upstream_failures_are_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/patients"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/prescriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&upstream)
        .await;
    let base = spawn(token_config(&upstream)).await;

    let (status, body) = get(format!("{base}/analytics/patient-stats")).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"], "API returned status 500 for patients");

    let (status, body) = get(format!("{base}/analytics/prescription-analysis")).await;
    assert_eq!(status, 502);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to decode"));
}

#[tokio::test]
async fn logs_in_once_and_reuses_the_token() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(
            json!({"username": "analyst", "password": "password123"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TOKEN,
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&upstream)
        .await;
    mount_collection(&upstream, "/visits", visits()).await;
    let base = spawn(login_config(&upstream)).await;

    for _ in 0..2 {
        let (status, body) = get(format!("{base}/analytics/visit-trends?days=1")).await;
        assert_eq!(status, 200);
        assert_eq!(body["total_visits"], 3);
    }
}

#[tokio::test]
async fn logs_in_again_when_the_token_is_rejected() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "stale"})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": TOKEN})))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/patients"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&upstream)
        .await;
    mount_collection(&upstream, "/patients", json!([{"age": 30}])).await;
    let base = spawn(login_config(&upstream)).await;

    let (status, body) = get(format!("{base}/analytics/patient-stats")).await;
    assert_eq!(status, 200);
    assert_eq!(body["total_patients"], 1);
}

#[tokio::test]
async fn failed_login_is_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&upstream)
        .await;
    let base = spawn(login_config(&upstream)).await;

    let (status, body) = get(format!("{base}/analytics/patient-stats")).await;
    assert_eq!(status, 502);
    assert!(body["error"].as_str().unwrap().contains("Login"));
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let upstream = MockServer::start().await;
    let base = spawn(token_config(&upstream)).await;

    let (status, body) = get(format!("{base}/healthz")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(format!("{base}/analytics/nope")).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "No route for /analytics/nope");
}
