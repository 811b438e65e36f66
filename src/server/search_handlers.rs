//! Search, suggestion and index rebuild handlers

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use super::error::{ApiError, ApiResponse};
use super::handlers::flag;
use super::lang::RequestLang;
use crate::catalog::{Hit, Letter, RebuildReport, RebuildRequest, Suggestion};
use crate::error::Error;
use crate::model::Kind;
use crate::server::AppState;

type ApiResult<T> = std::result::Result<ApiResponse<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub all: Option<String>,
}

#[instrument(skip(state))]
pub async fn search(
    Extension(state): Extension<Arc<AppState>>,
    RequestLang(lang): RequestLang,
    Path(ns): Path<String>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<Hit>> {
    let kind: Kind = ns.parse()?;
    let text = query.q.unwrap_or_default();
    let hits = state
        .catalog
        .search(kind, lang, &text, flag(query.all.as_deref()))
        .await?;
    Ok(ApiResponse::ok(hits))
}

#[instrument(skip(state))]
pub async fn alphabet(
    Extension(state): Extension<Arc<AppState>>,
    RequestLang(lang): RequestLang,
    Path(ns): Path<String>,
) -> ApiResult<Vec<Letter>> {
    let kind: Kind = ns.parse()?;
    Ok(ApiResponse::ok(state.catalog.alphabet(kind, lang).await?))
}

#[instrument(skip(state))]
pub async fn browse(
    Extension(state): Extension<Arc<AppState>>,
    RequestLang(lang): RequestLang,
    Path((ns, letter)): Path<(String, String)>,
) -> ApiResult<Vec<u64>> {
    let kind: Kind = ns.parse()?;
    let mut chars = letter.chars();
    let letter = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => {
            return Err(Error::InvalidArgument(format!("expected one letter, got {:?}", letter)).into())
        }
    };
    Ok(ApiResponse::ok(state.catalog.browse(kind, lang, letter).await?))
}

/// Suggestions across every namespace planned for the request language.
/// Namespaces whose worker fails are left out.
#[instrument(skip(state))]
pub async fn suggest(
    Extension(state): Extension<Arc<AppState>>,
    RequestLang(lang): RequestLang,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<Suggestion>> {
    let text = query.q.unwrap_or_default();
    Ok(ApiResponse::ok(state.catalog.suggest(lang, &text).await))
}

/// Run the index rebuild; an empty body rebuilds every namespace
#[instrument(skip(state, body))]
pub async fn rebuild(Extension(state): Extension<Arc<AppState>>, body: Bytes) -> ApiResult<RebuildReport> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RebuildRequest::all()
    } else {
        serde_json::from_slice::<RebuildRequest>(&body)?
    };
    if request.batch_size == 0 {
        return Err(Error::InvalidArgument("batch_size must be positive".to_string()).into());
    }
    let report = state.catalog.rebuild(&request).await?;
    info!(job_id = %report.job_id, indexed = report.indexed(), "Rebuild requested over HTTP finished");
    Ok(ApiResponse::ok(report))
}
