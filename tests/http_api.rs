//! HTTP API driven through the router without a socket

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use medref::server::{build_router, AppState};
use medref::{AppConfig, Catalog, MemoryStore, Storage};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type TestResult = Result<(), BoxError>;

fn app() -> medref::error::Result<Router> {
    let storage = Arc::new(Storage::with_defaults(Arc::new(MemoryStore::new())));
    let config = AppConfig::default();
    let catalog = Catalog::new(storage, &config)?;
    Ok(build_router(Arc::new(AppState::new(catalog, config))))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value), BoxError> {
    call_with(app, method, uri, body, None).await
}

async fn call_with(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    accept_language: Option<&str>,
) -> Result<(StatusCode, Value), BoxError> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(lang) = accept_language {
        builder = builder.header(header::ACCEPT_LANGUAGE, lang);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

#[tokio::test]
async fn test_record_lifecycle() -> TestResult {
    let app = app()?;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/records/drug",
        Some(json!([{"id": 1, "name_ru": "Парацетамол"}, {"id": 2, "name_en": "Aspirin"}])),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "data": {"written": 2}}));

    let (status, body) = call(&app, Method::GET, "/api/records/drug?ids=1,5,2", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([{"id": 1, "name_ru": "Парацетамол"}, null, {"id": 2, "name_en": "Aspirin"}])
    );

    let (status, body) = call(&app, Method::GET, "/api/records/drug/1", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name_ru"], "Парацетамол");

    let (status, body) = call(&app, Method::DELETE, "/api/records/drug/1", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([1]));

    let (status, body) = call(&app, Method::GET, "/api/records/drug/1", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (_, body) = call(&app, Method::GET, "/api/sync/drug?since=-1", None).await?;
    assert_eq!(body["data"], json!([1]));
    let (_, body) = call(&app, Method::GET, "/api/sync/drug?since=0&times=1", None).await?;
    assert_eq!(body["data"][0]["id"], 2);
    assert_eq!(body["data"][0]["deleted"], false);
    Ok(())
}

#[tokio::test]
async fn test_patch_merges_fields() -> TestResult {
    let app = app()?;
    call(
        &app,
        Method::POST,
        "/api/records/maker",
        Some(json!({"id": 4, "name_en": "Farmak", "site": "farmak.ua"})),
    )
    .await?;

    let (status, _) = call(
        &app,
        Method::PATCH,
        "/api/records/maker",
        Some(json!([{"id": 4, "country_en": "Ukraine"}])),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, Method::GET, "/api/records/maker/4", None).await?;
    assert_eq!(
        body["data"],
        json!({"id": 4, "name_en": "Farmak", "country_en": "Ukraine", "site": "farmak.ua"})
    );
    Ok(())
}

#[tokio::test]
async fn test_client_errors() -> TestResult {
    let app = app()?;

    let (status, body) = call(&app, Method::GET, "/api/records/pharmacy/1", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("pharmacy"));

    let (status, _) = call(&app, Method::GET, "/api/records/drug/0", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::GET, "/api/records/drug", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/api/records/drug", Some(json!([{"id": 0}]))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/api/records/drug", Some(json!("aspirin"))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/records/drug",
        Some(json!([{"id": 1, "name_en": "Aspirin"}, {"id": 1, "name_en": "Aspirin"}])),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let (status, _) = call(&app, Method::GET, "/api/records/drug/1", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::GET, "/api/sync/drug?since=yesterday", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::GET, "/api/search/drug?q=x&lang=de", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_links() -> TestResult {
    let app = app()?;

    let (status, body) = call(&app, Method::POST, "/api/links/drug/5/inn", Some(json!({"ids": [9, 7]}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([7, 9]));

    let (_, body) = call(&app, Method::GET, "/api/links/inn/7/drug", None).await?;
    assert_eq!(body["data"], json!([5]));

    let (_, body) = call(&app, Method::DELETE, "/api/links/drug/5/inn", Some(json!({"ids": [7]}))).await?;
    assert_eq!(body["data"], json!([9]));

    let (status, _) = call(&app, Method::POST, "/api/links/maker/1/inn", Some(json!({"ids": [2]}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_search_uses_request_language() -> TestResult {
    let app = app()?;
    call(
        &app,
        Method::POST,
        "/api/records/inn",
        Some(json!([
            {"id": 1, "name_en": "Ibuprofen", "name_uk": "Ібупрофен"},
            {"id": 2, "name_en": "Paracetamol", "name_uk": "Парацетамол"}
        ])),
    )
    .await?;

    let (_, body) = call(&app, Method::GET, "/api/search/inn?q=ibu&lang=en", None).await?;
    assert_eq!(body["data"], json!([{"id": 1, "name": "ibuprofen"}]));

    let (_, body) = call_with(&app, Method::GET, "/api/search/inn?q=ibu", None, Some("en-US,en;q=0.9")).await?;
    assert_eq!(body["data"][0]["id"], 1);

    // default language is Ukrainian
    let (_, body) = call(&app, Method::GET, "/api/search/inn?q=ibu", None).await?;
    assert_eq!(body["data"], json!([]));
    let (_, body) = call(&app, Method::GET, "/api/search/inn?q=%D1%96%D0%B1%D1%83", None).await?;
    assert_eq!(body["data"][0]["id"], 1);

    let (_, body) = call(&app, Method::GET, "/api/alphabet/inn?lang=en", None).await?;
    assert_eq!(body["data"], json!([{"letter": "i", "count": 1}, {"letter": "p", "count": 1}]));

    let (_, body) = call(&app, Method::GET, "/api/browse/inn/p?lang=en", None).await?;
    assert_eq!(body["data"], json!([2]));

    let (_, body) = call(&app, Method::GET, "/api/suggest?q=para&lang=en", None).await?;
    assert_eq!(body["data"], json!([{"namespace": "inn", "id": 2, "name": "paracetamol"}]));
    Ok(())
}

#[tokio::test]
async fn test_rebuild_and_health() -> TestResult {
    let app = app()?;
    call(&app, Method::POST, "/api/records/drug", Some(json!([{"id": 3, "name_en": "Citramon"}]))).await?;

    let (status, body) = call(&app, Method::POST, "/api/rebuild", Some(json!({"namespaces": ["drug"]}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["namespaces"][0]["namespace"], "drug");
    assert_eq!(body["data"]["namespaces"][0]["indexed"], 1);

    let (status, body) = call(&app, Method::POST, "/api/rebuild", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["namespaces"].as_array().map(Vec::len), Some(14));

    let (status, body) = call(&app, Method::GET, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["backend"], "memory");
    Ok(())
}
