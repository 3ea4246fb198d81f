#![allow(dead_code)]

use std::sync::Arc;

use hospital_db_memory::InMemoryStorage;
use hospital_server::{AppConfig, AppState, HospitalServer, ServerBuilder};
use hospital_storage::Role;
use serde_json::{Value, json};
use tokio::sync::oneshot;

pub const DOCTOR: &str = "dr_smith";
pub const PASSWORD: &str = "password123";

pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub storage: Arc<InMemoryStorage>,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(AppConfig::default()).await
}

pub async fn start_server_with(config: AppConfig) -> TestServer {
    let storage = Arc::new(InMemoryStorage::new());
    let server = ServerBuilder::new()
        .with_config(config)
        .with_storage(storage.clone())
        .build()
        .await
        .expect("build server");
    TestServer::serve(server, storage).await
}

impl TestServer {
    /// Serves `server` on an ephemeral port. `storage` must be the backend
    /// the server was built with.
    pub async fn serve(server: HospitalServer, storage: Arc<InMemoryStorage>) -> TestServer {
        let state = server.state().clone();
        let app = server.router();

        let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind");
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });

        TestServer {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            storage,
            state,
            shutdown: Some(tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn reads(&self) -> u64 {
        self.storage.stats().reads
    }

    /// Registers the test doctor and returns a bearer token for it.
    pub async fn doctor_token(&self) -> String {
        self.state
            .auth
            .register(DOCTOR, PASSWORD, Role::Doctor)
            .await
            .expect("register doctor");
        let resp = self
            .client
            .post(self.url("/login"))
            .json(&json!({ "username": DOCTOR, "password": PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn get(&self, token: &str, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    pub async fn post(&self, token: &str, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    pub async fn put(&self, token: &str, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    pub async fn delete(&self, token: &str, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    pub async fn create_patient(&self, token: &str, name: &str, age: i32) -> i64 {
        let (status, body) = self
            .post(
                token,
                "/patients",
                json!({ "name": name, "age": age, "contact_info": "555-0100" }),
            )
            .await;
        assert_eq!(status, 201, "{body}");
        body["data"]["id"].as_i64().unwrap()
    }
}
