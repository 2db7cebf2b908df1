//! HTTP surface over the catalog and the acquisition pipeline.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use log::{error, info};

use crate::acquisition::PlantLookup;
use crate::catalog_manager::CatalogHandle;
use crate::catalog_store::CatalogError;
use crate::plant::PlantRecord;

const MISSING_NAME: &str = "please input plant name";
const NOTHING_FOUND: &str = "no plant found";

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogHandle,
    pub lookup: Arc<dyn PlantLookup>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/healthz/", get(healthz))
        .route("/load", get(load_plants))
        .route("/load/", get(load_plants))
        .route("/find", get(missing_name))
        .route("/find/", get(missing_name))
        .route("/find/:name", get(find_plant))
        .route("/add", post(add_plant))
        .route("/add/", post(add_plant))
        .route("/del", delete(missing_name))
        .route("/del/", delete(missing_name))
        .route("/del/:name", delete(delete_plant))
        .with_state(state)
}

fn catalog_failure(err: CatalogError) -> Response {
    let status = match err {
        CatalogError::MissingName | CatalogError::Duplicate => StatusCode::BAD_REQUEST,
        CatalogError::NotFound(_) => StatusCode::OK,
        CatalogError::Persistence(_) | CatalogError::Unavailable => {
            error!("Server: catalog request failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string()).into_response()
}

async fn healthz() -> &'static str {
    "healthy"
}

async fn missing_name() -> &'static str {
    MISSING_NAME
}

async fn load_plants(State(state): State<AppState>) -> Response {
    match state.catalog.list().await {
        Ok(records) => Json(records).into_response(),
        Err(err) => catalog_failure(err),
    }
}

/// Looks the name up externally; the stored catalog is not consulted.
async fn find_plant(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    if name.is_empty() {
        return MISSING_NAME.into_response();
    }

    info!("Server: finding plant {name}");
    match state.lookup.resolve(&name).await.into_iter().next() {
        Some(record) => Json(record).into_response(),
        None => NOTHING_FOUND.into_response(),
    }
}

async fn add_plant(State(state): State<AppState>, body: Bytes) -> Response {
    let record: PlantRecord = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("unmarshalling json error: {err}"),
            )
                .into_response()
        }
    };

    match state.catalog.add(record).await {
        Ok(stored) => Json(stored).into_response(),
        Err(err) => catalog_failure(err),
    }
}

/// Always answers 200; the body says what happened.
async fn delete_plant(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    if name.is_empty() {
        return MISSING_NAME.into_response();
    }

    match state.catalog.delete(&name).await {
        Ok(_) => format!("plant {name} deleted").into_response(),
        Err(err) => {
            if !matches!(err, CatalogError::NotFound(_)) {
                error!("Server: deleting plant {name} failed: {err}");
            }
            err.to_string().into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::{SystemTime, UNIX_EPOCH};

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use futures::future::BoxFuture;
    use tower::ServiceExt;

    use super::{router, AppState};
    use crate::acquisition::PlantLookup;
    use crate::catalog_manager::{CatalogHandle, CatalogManager};
    use crate::catalog_store::{CatalogError, CatalogStore};
    use crate::plant::PlantRecord;

    #[derive(Default)]
    struct FakeLookup {
        records: Vec<PlantRecord>,
        queries: Mutex<Vec<String>>,
    }

    impl PlantLookup for FakeLookup {
        fn resolve<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Vec<PlantRecord>> {
            self.queries
                .lock()
                .expect("queries lock poisoned")
                .push(name.to_string());
            let records = self.records.clone();
            Box::pin(async move { records })
        }
    }

    fn unique_temp_catalog_path(name: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be valid")
            .as_nanos();
        std::env::temp_dir().join(format!("plantdex_server_{name}_{nonce}.json"))
    }

    fn plant(common_name: &str, latin_name: &str) -> PlantRecord {
        PlantRecord {
            common_name: common_name.to_string(),
            latin_name: latin_name.to_string(),
            toxicity: "剧毒".to_string(),
            ..PlantRecord::default()
        }
    }

    struct Fixture {
        path: PathBuf,
        catalog: CatalogHandle,
        lookup: Arc<FakeLookup>,
    }

    impl Fixture {
        fn new(name: &str, found: Vec<PlantRecord>) -> Self {
            Self::at(unique_temp_catalog_path(name), found)
        }

        fn at(path: PathBuf, found: Vec<PlantRecord>) -> Self {
            let catalog = CatalogManager::spawn(CatalogStore::load(&path))
                .expect("manager should start");
            let lookup = Arc::new(FakeLookup {
                records: found,
                ..FakeLookup::default()
            });
            Self {
                path,
                catalog,
                lookup,
            }
        }

        async fn send(&self, method: Method, uri: &str, body: Body) -> (StatusCode, String) {
            let app = router(AppState {
                catalog: self.catalog.clone(),
                lookup: self.lookup.clone(),
            });
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .expect("request should build");
            let response = app.oneshot(request).await.expect("router is infallible");
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("body should be readable");
            (
                status,
                String::from_utf8(bytes.to_vec()).expect("body should be utf-8"),
            )
        }

        async fn get(&self, uri: &str) -> (StatusCode, String) {
            self.send(Method::GET, uri, Body::empty()).await
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.catalog.shutdown();
            let _ = fs::remove_file(&self.path);
        }
    }

    #[tokio::test]
    async fn test_healthz_answers_on_both_forms() {
        let fixture = Fixture::new("healthz", Vec::new());
        assert_eq!(
            fixture.get("/healthz").await,
            (StatusCode::OK, "healthy".to_string())
        );
        assert_eq!(
            fixture.get("/healthz/").await,
            (StatusCode::OK, "healthy".to_string())
        );
    }

    #[tokio::test]
    async fn test_find_returns_first_resolved_record() {
        let fixture = Fixture::new(
            "find",
            vec![plant("绿萝", "Epipremnum aureum"), plant("黄金葛", "Scindapsus")],
        );

        let (status, body) = fixture.get("/find/%E7%BB%BF%E8%90%9D").await;
        assert_eq!(status, StatusCode::OK);
        let record: PlantRecord = serde_json::from_str(&body).expect("record json");
        assert_eq!(record.common_name, "绿萝");
        assert_eq!(
            *fixture.lookup.queries.lock().expect("queries lock poisoned"),
            vec!["绿萝".to_string()]
        );
    }

    #[tokio::test]
    async fn test_find_reports_nothing_with_ok_status() {
        let fixture = Fixture::new("find_none", Vec::new());
        assert_eq!(
            fixture.get("/find/unknown").await,
            (StatusCode::OK, "no plant found".to_string())
        );
        assert_eq!(
            fixture.get("/find/").await,
            (StatusCode::OK, "please input plant name".to_string())
        );
        assert_eq!(
            fixture.get("/find").await,
            (StatusCode::OK, "please input plant name".to_string())
        );
        assert!(fixture
            .lookup
            .queries
            .lock()
            .expect("queries lock poisoned")
            .iter()
            .all(|query| query == "unknown"));
    }

    #[tokio::test]
    async fn test_add_classifies_then_load_lists_it() {
        let fixture = Fixture::new("add", Vec::new());
        let body = serde_json::to_string(&plant("夹竹桃", "Nerium oleander"))
            .expect("record should encode");

        let (status, body) = fixture.send(Method::POST, "/add", Body::from(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"itoxicity\":\"高\""));

        let (status, body) = fixture.get("/load").await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<PlantRecord> = serde_json::from_str(&body).expect("list json");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].latin_name, "Nerium oleander");
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates_and_bad_json() {
        let fixture = Fixture::new("add_reject", Vec::new());
        let body = serde_json::to_string(&plant("月季", "Rosa chinensis"))
            .expect("record should encode");
        let (status, _) = fixture
            .send(Method::POST, "/add/", Body::from(body.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(
            fixture.send(Method::POST, "/add", Body::from(body)).await,
            (StatusCode::BAD_REQUEST, "plant already exists".to_string())
        );

        let (status, body) = fixture
            .send(Method::POST, "/add", Body::from("{\"cnname\": "))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("unmarshalling json error:"));
    }

    #[tokio::test]
    async fn test_add_rejects_nameless_record_every_time() {
        let fixture = Fixture::new("add_nameless", Vec::new());
        for _ in 0..2 {
            assert_eq!(
                fixture.send(Method::POST, "/add", Body::from("{}")).await,
                (StatusCode::BAD_REQUEST, "please input plant name".to_string())
            );
        }
        assert_eq!(fixture.get("/load").await, (StatusCode::OK, "[]".to_string()));
    }

    #[tokio::test]
    async fn test_find_passes_name_through_untrimmed() {
        let fixture = Fixture::new("find_raw", Vec::new());
        fixture.get("/find/%20%E7%BB%BF%E8%90%9D").await;
        assert_eq!(
            *fixture.lookup.queries.lock().expect("queries lock poisoned"),
            vec![" 绿萝".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_persistence_failure_still_answers_ok() {
        let path = std::env::temp_dir()
            .join(format!("plantdex_server_missing_dir_{}", std::process::id()))
            .join("plants.json");
        let fixture = Fixture::at(path, Vec::new());
        let result = fixture.catalog.add(plant("薄荷", "Mentha")).await;
        assert!(matches!(result, Err(CatalogError::Persistence(_))));

        let (status, body) = fixture
            .send(Method::DELETE, "/del/Mentha", Body::empty())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("flushing file error:"), "body={body}");
        assert_eq!(fixture.get("/load").await, (StatusCode::OK, "[]".to_string()));
    }

    #[tokio::test]
    async fn test_delete_reports_outcome_with_ok_status() {
        let fixture = Fixture::new("delete", Vec::new());
        fixture
            .catalog
            .add(plant("薄荷", "Mentha"))
            .await
            .expect("add should succeed");

        assert_eq!(
            fixture.send(Method::DELETE, "/del/Mentha", Body::empty()).await,
            (StatusCode::OK, "plant Mentha deleted".to_string())
        );
        assert_eq!(
            fixture.send(Method::DELETE, "/del/Mentha", Body::empty()).await,
            (StatusCode::OK, "plant Mentha not exist".to_string())
        );
        assert_eq!(
            fixture.send(Method::DELETE, "/del/", Body::empty()).await,
            (StatusCode::OK, "please input plant name".to_string())
        );
    }

    #[tokio::test]
    async fn test_wrong_method_is_rejected() {
        let fixture = Fixture::new("method", Vec::new());
        let (status, _) = fixture.send(Method::POST, "/load", Body::empty()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let (status, _) = fixture.get("/del/Mentha").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
