mod common;

use common::{DOCTOR, PASSWORD, start_server, start_server_with};
use hospital_server::AppConfig;
use serde_json::{Value, json};

#[tokio::test]
async fn service_endpoints_are_public() {
    let srv = start_server().await;

    let resp = srv.client.get(srv.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(
        body["_links"]["patients"]["href"],
        srv.url("/patients").as_str()
    );

    let body: Value = srv
        .client
        .get(srv.url("/healthz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");

    let body: Value = srv
        .client
        .get(srv.url("/readyz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["cache"], "local");

    let resp = srv
        .client
        .get(srv.url("/docs/validation-rules"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["count"].as_u64().unwrap() > 0);

    let resp = srv.client.get(srv.url("/metrics")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn login_returns_bearer_token() {
    let srv = start_server().await;
    srv.state
        .auth
        .register(DOCTOR, PASSWORD, hospital_storage::Role::Doctor)
        .await
        .unwrap();

    let resp = srv
        .client
        .post(srv.url("/login"))
        .json(&json!({ "username": DOCTOR, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["user"]["username"], DOCTOR);
    assert_eq!(body["user"]["role"], "doctor");
    assert!(body["user"].get("password_hash").is_none());

    let token = body["access_token"].as_str().unwrap();
    let (status, me) = srv.get(token, "/me").await;
    assert_eq!(status, 200);
    assert_eq!(me["data"]["username"], DOCTOR);

    let resp = srv
        .client
        .post(srv.url("/logout"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let srv = start_server().await;
    srv.doctor_token().await;

    let resp = srv
        .client
        .post(srv.url("/login"))
        .json(&json!({ "username": DOCTOR, "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid username or password");
    assert_eq!(body["_links"]["self"]["href"], "/login");
    assert_eq!(body["_links"]["self"]["method"], "POST");
    assert_eq!(body["_links"]["home"]["href"], "/");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let srv = start_server().await;

    let resp = srv.client.get(srv.url("/patients")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers()["www-authenticate"], "Bearer");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing bearer token");
    assert_eq!(body["_links"]["self"]["href"], "/patients");

    let (status, body) = srv.get("not-a-jwt", "/patients").await;
    assert_eq!(status, 401);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid token"));
}

#[tokio::test]
async fn unknown_patient_offers_search_link() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;

    let (status, body) = srv.get(&token, "/patients/999").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "patient 999 not found");
    assert_eq!(body["_links"]["self"]["href"], "/patients/999");
    assert_eq!(body["_links"]["self"]["method"], "GET");
    let search = &body["_links"]["hospital:search"];
    assert_eq!(search["href"], "/patients?q={search_term}");
    assert_eq!(search["templated"], true);
}

#[tokio::test]
async fn non_numeric_ids_are_not_found() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;

    for path in ["/patients/abc", "/visits/1.5", "/prescriptions/x", "/reports/-"] {
        let (status, body) = srv.get(&token, path).await;
        assert_eq!(status, 404, "{path}");
        assert_eq!(body["error"], format!("No record at {path}"));
        assert!(body["_links"]["hospital:search"].is_object());
        assert!(body["_links"].get("hospital:validation-help").is_none());
    }

    let (status, _) = srv.delete(&token, "/patients/abc").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn unknown_route_and_wrong_method_use_the_envelope() {
    let srv = start_server().await;

    let resp = srv.client.get(srv.url("/nowhere")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No route for /nowhere");
    assert!(body["_links"]["hospital:search"].is_object());

    let resp = srv.client.delete(srv.url("/login")).send().await.unwrap();
    assert_eq!(resp.status(), 405);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Method Not Allowed");
    assert_eq!(body["_links"]["self"]["method"], "DELETE");
}

#[tokio::test]
async fn malformed_and_invalid_bodies_are_bad_requests() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;

    let resp = srv
        .client
        .post(srv.url("/patients"))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["_links"]["hospital:validation-help"]["href"] == "/docs/validation-rules");

    let (status, body) = srv
        .post(
            &token,
            "/patients",
            json!({ "name": " ", "age": 200, "contact_info": "x" }),
        )
        .await;
    assert_eq!(status, 400);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("name"), "{message}");
    assert!(message.contains("age"), "{message}");
    assert!(body["_links"]["hospital:validation-help"].is_object());

    let (status, body) = srv
        .post(&token, "/visits", json!({ "patient_id": 4242 }))
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("patient"));
}

#[tokio::test]
async fn created_patient_carries_links_and_location() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;

    let resp = srv
        .client
        .post(srv.url("/patients"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Alice Johnson", "age": 30, "contact_info": "alice@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    let body: Value = resp.json().await.unwrap();
    let id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(location, srv.url(&format!("/patients/{id}")));

    let links = body["_links"].as_object().unwrap();
    let mut rels: Vec<&str> = links.keys().map(String::as_str).collect();
    rels.sort_unstable();
    assert_eq!(rels, ["prescriptions", "reports", "self", "visits"]);
    assert_eq!(
        links["visits"]["href"],
        srv.url(&format!("/visits?patient={id}")).as_str()
    );

    let (status, list) = srv.get(&token, "/patients").await;
    assert_eq!(status, 200);
    assert_eq!(list["count"], 1);
    assert_eq!(list["data"][0]["name"], "Alice Johnson");
    assert!(list["data"][0]["_links"]["self"].is_object());
    assert_eq!(list["_links"]["create"]["method"], "POST");
}

#[tokio::test]
async fn forwarded_headers_shape_links() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;
    let id = srv.create_patient(&token, "Bob Wilson", 45).await;

    let resp = srv
        .client
        .get(srv.url(&format!("/patients/{id}")))
        .bearer_auth(&token)
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-host", "records.example.org")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["_links"]["self"]["href"],
        format!("https://records.example.org/patients/{id}")
    );
}

#[tokio::test]
async fn visits_default_to_the_calling_doctor() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;
    let patient = srv.create_patient(&token, "Carol Davis", 28).await;

    let (status, body) = srv
        .post(
            &token,
            "/visits",
            json!({ "patient_id": patient, "diagnosis": "Allergy" }),
        )
        .await;
    assert_eq!(status, 201, "{body}");
    let doctor = srv.state.storage.find_user_by_username(DOCTOR).await.unwrap().unwrap();
    assert_eq!(body["data"]["doctor_id"], doctor.id);
    assert_eq!(body["_links"]["prescribe"]["method"], "POST");
    assert_eq!(body["_links"]["add_report"]["href"], srv.url("/reports").as_str());
}

#[tokio::test]
async fn visit_diagnosis_can_be_cleared() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;
    let patient = srv.create_patient(&token, "Erin Moore", 41).await;
    let (_, body) = srv
        .post(
            &token,
            "/visits",
            json!({ "patient_id": patient, "diagnosis": "Sprain" }),
        )
        .await;
    let id = body["data"]["id"].as_i64().unwrap();
    let path = format!("/visits/{id}");

    let (status, body) = srv.put(&token, &path, json!({})).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["diagnosis"], "Sprain");

    let (status, body) = srv.put(&token, &path, json!({ "diagnosis": null })).await;
    assert_eq!(status, 200, "{body}");
    assert!(body["data"]["diagnosis"].is_null());

    let (_, body) = srv.get(&token, &path).await;
    assert!(body["data"]["diagnosis"].is_null());
}

#[tokio::test]
async fn patient_search_is_case_insensitive() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;
    srv.create_patient(&token, "Alice Johnson", 30).await;
    srv.create_patient(&token, "Bob Wilson", 45).await;

    let (_, body) = srv.get(&token, "/patients?q=WIL").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["name"], "Bob Wilson");
}

#[tokio::test]
async fn deleting_a_patient_cascades_through_cached_lists() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;
    let patient = srv.create_patient(&token, "David Brown", 60).await;

    let (_, visit) = srv
        .post(&token, "/visits", json!({ "patient_id": patient, "diagnosis": "Hypertension" }))
        .await;
    let visit_id = visit["data"]["id"].as_i64().unwrap();
    let (status, _) = srv
        .post(
            &token,
            "/prescriptions",
            json!({
                "patient_id": patient,
                "visit_id": visit_id,
                "drug_name": "Lisinopril",
                "dosage": "10mg",
                "duration": 30
            }),
        )
        .await;
    assert_eq!(status, 201);
    let (status, _) = srv
        .post(
            &token,
            "/reports",
            json!({
                "patient_id": patient,
                "report_type": "Blood Pressure",
                "report_data": "140/90 mmHg"
            }),
        )
        .await;
    assert_eq!(status, 201);

    // warm the caches
    let filtered = format!("/visits?patient={patient}");
    assert_eq!(srv.get(&token, &filtered).await.1["count"], 1);
    assert_eq!(srv.get(&token, "/prescriptions").await.1["count"], 1);
    assert_eq!(srv.get(&token, "/reports").await.1["count"], 1);
    assert_eq!(srv.get(&token, &format!("/visits/{visit_id}")).await.0, 200);

    let (status, body) = srv.delete(&token, &format!("/patients/{patient}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["_links"]["self"]["href"], srv.url("/patients").as_str());

    assert_eq!(srv.get(&token, &filtered).await.1["count"], 0);
    assert_eq!(srv.get(&token, "/visits").await.1["count"], 0);
    assert_eq!(srv.get(&token, "/prescriptions").await.1["count"], 0);
    assert_eq!(srv.get(&token, "/reports").await.1["count"], 0);
    assert_eq!(srv.get(&token, &format!("/visits/{visit_id}")).await.0, 404);
    assert_eq!(srv.get(&token, &format!("/patients/{patient}")).await.0, 404);
}

#[tokio::test]
async fn deleting_a_visit_detaches_cached_prescriptions() {
    let srv = start_server().await;
    let token = srv.doctor_token().await;
    let patient = srv.create_patient(&token, "Alice Johnson", 30).await;
    let (_, visit) = srv
        .post(&token, "/visits", json!({ "patient_id": patient }))
        .await;
    let visit_id = visit["data"]["id"].as_i64().unwrap();
    let (_, prescription) = srv
        .post(
            &token,
            "/prescriptions",
            json!({
                "patient_id": patient,
                "visit_id": visit_id,
                "drug_name": "Paracetamol",
                "dosage": "500mg",
                "duration": 7
            }),
        )
        .await;
    let prescription_path = format!(
        "/prescriptions/{}",
        prescription["data"]["id"].as_i64().unwrap()
    );
    let (_, cached) = srv.get(&token, &prescription_path).await;
    assert_eq!(cached["data"]["visit_id"], visit_id);

    let (status, _) = srv.delete(&token, &format!("/visits/{visit_id}")).await;
    assert_eq!(status, 200);

    let (status, body) = srv.get(&token, &prescription_path).await;
    assert_eq!(status, 200);
    assert!(body["data"]["visit_id"].is_null());
}

#[tokio::test]
async fn auth_can_be_disabled() {
    let mut config = AppConfig::default();
    config.auth.enabled = false;
    let srv = start_server_with(config).await;

    let resp = srv.client.get(srv.url("/patients")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    // without a caller there is no default doctor
    let patient = srv.create_patient("", "Eve Adams", 41).await;
    let (status, body) = srv
        .post("", "/visits", json!({ "patient_id": patient }))
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("doctor_id"));
}
