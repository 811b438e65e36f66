//! HTTP route handlers for records, links and the change feed

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

use super::error::{ApiError, ApiResponse};
use crate::catalog::SaveMode;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::model::Kind;
use crate::server::AppState;

type ApiResult = std::result::Result<ApiResponse<Value>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct IdsQuery {
    pub ids: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    pub since: Option<String>,
    pub times: Option<String>,
}

/// Body of link mutations
#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub ids: Vec<u64>,
    #[serde(default = "default_symmetric")]
    pub symmetric: bool,
}

fn default_symmetric() -> bool {
    true
}

pub(crate) fn parse_id(raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::InvalidArgument(format!("invalid id: {:?}", raw))),
    }
}

/// Comma separated ids, at least one
pub(crate) fn parse_ids(raw: Option<&str>) -> Result<Vec<u64>> {
    let ids = raw
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(parse_id)
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(Error::InvalidArgument("ids parameter is required".to_string()));
    }
    Ok(ids)
}

pub(crate) fn flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// A record array, or a single record object
fn decode_records<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Error::from))
            .collect(),
        object @ Value::Object(_) => Ok(vec![serde_json::from_value(object)?]),
        _ => Err(Error::InvalidArgument(
            "expected a record or an array of records".to_string(),
        )),
    }
}

/// Load records; misses are `null` in their position
#[instrument(skip(state))]
pub async fn get_records(
    Extension(state): Extension<Arc<AppState>>,
    Path(ns): Path<String>,
    Query(query): Query<IdsQuery>,
) -> ApiResult {
    let kind: Kind = ns.parse()?;
    let ids = parse_ids(query.ids.as_deref())?;
    let records = dispatch!(kind, T => serde_json::to_value(state.catalog.get::<T>(kind, &ids).await?)?);
    Ok(ApiResponse::ok(records))
}

#[instrument(skip(state))]
pub async fn get_record(
    Extension(state): Extension<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> ApiResult {
    let kind: Kind = ns.parse()?;
    let id = parse_id(&id)?;
    let record = dispatch!(kind, T => serde_json::to_value(state.catalog.get_one::<T>(kind, id).await?)?);
    Ok(ApiResponse::ok(record))
}

async fn save_records(state: &AppState, ns: &str, body: &[u8], mode: SaveMode) -> ApiResult {
    let kind: Kind = ns.parse()?;
    let written = dispatch!(kind, T => {
        let records: Vec<T> = decode_records(body)?;
        state.catalog.put(kind, records, mode).await?
    });
    info!(namespace = %kind, written, ?mode, "Saved records over HTTP");
    Ok(ApiResponse::ok(json!({ "written": written })))
}

/// Replace records
#[instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn put_records(
    Extension(state): Extension<Arc<AppState>>,
    Path(ns): Path<String>,
    body: Bytes,
) -> ApiResult {
    save_records(&state, &ns, &body, SaveMode::Replace).await
}

/// Update records, keeping stored fields the body leaves empty
#[instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn patch_records(
    Extension(state): Extension<Arc<AppState>>,
    Path(ns): Path<String>,
    body: Bytes,
) -> ApiResult {
    save_records(&state, &ns, &body, SaveMode::Merge).await
}

#[instrument(skip(state))]
pub async fn delete_records(
    Extension(state): Extension<Arc<AppState>>,
    Path(ns): Path<String>,
    Query(query): Query<IdsQuery>,
) -> ApiResult {
    let kind: Kind = ns.parse()?;
    let ids = parse_ids(query.ids.as_deref())?;
    let removed = dispatch!(kind, T => state.catalog.remove::<T>(kind, &ids).await?);
    Ok(ApiResponse::ok(json!(removed)))
}

#[instrument(skip(state))]
pub async fn delete_record(
    Extension(state): Extension<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> ApiResult {
    let kind: Kind = ns.parse()?;
    let id = parse_id(&id)?;
    let removed = dispatch!(kind, T => state.catalog.remove::<T>(kind, &[id]).await?);
    if removed.is_empty() {
        return Err(Error::NotFound(format!("{}:{}", kind, id)).into());
    }
    Ok(ApiResponse::ok(json!(removed)))
}

fn link_path(ns: &str, id: &str, target: &str) -> Result<(Kind, u64, Kind)> {
    Ok((ns.parse()?, parse_id(id)?, target.parse()?))
}

#[instrument(skip(state))]
pub async fn get_links(
    Extension(state): Extension<Arc<AppState>>,
    Path((ns, id, target)): Path<(String, String, String)>,
) -> ApiResult {
    let (kind, id, target) = link_path(&ns, &id, &target)?;
    let ids = state.catalog.links(kind, id, target).await?;
    Ok(ApiResponse::ok(json!(ids)))
}

/// Add links and return the resulting set
#[instrument(skip(state, body))]
pub async fn post_links(
    Extension(state): Extension<Arc<AppState>>,
    Path((ns, id, target)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult {
    let (kind, id, target) = link_path(&ns, &id, &target)?;
    let request: LinkRequest = serde_json::from_slice(&body)?;
    state
        .catalog
        .link(kind, id, target, &request.ids, request.symmetric)
        .await?;
    let ids = state.catalog.links(kind, id, target).await?;
    Ok(ApiResponse::ok(json!(ids)))
}

/// Remove links and return the remaining set
#[instrument(skip(state, body))]
pub async fn delete_links(
    Extension(state): Extension<Arc<AppState>>,
    Path((ns, id, target)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult {
    let (kind, id, target) = link_path(&ns, &id, &target)?;
    let request: LinkRequest = serde_json::from_slice(&body)?;
    state
        .catalog
        .unlink(kind, id, target, &request.ids, request.symmetric)
        .await?;
    let ids = state.catalog.links(kind, id, target).await?;
    Ok(ApiResponse::ok(json!(ids)))
}

/// Poll the change feed. `since >= 0` lists changes at or after it,
/// a negative cursor lists tombstones.
#[instrument(skip(state))]
pub async fn get_changes(
    Extension(state): Extension<Arc<AppState>>,
    Path(ns): Path<String>,
    Query(query): Query<SyncQuery>,
) -> ApiResult {
    let kind: Kind = ns.parse()?;
    let since = match query.since.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| Error::InvalidArgument(format!("invalid since cursor: {:?}", raw)))?,
    };
    let data = if flag(query.times.as_deref()) {
        serde_json::to_value(state.catalog.change_log(kind, since).await?)?
    } else {
        json!(state.catalog.changes(kind, since).await?)
    };
    Ok(ApiResponse::ok(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Drug;

    #[test]
    fn test_parse_ids() -> Result<()> {
        assert_eq!(parse_ids(Some("3, 1,2,"))?, vec![3, 1, 2]);
        assert!(matches!(parse_ids(None), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_ids(Some("1,0")), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_ids(Some("1,-2")), Err(Error::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn test_flag() {
        assert!(flag(Some("1")));
        assert!(flag(Some("True")));
        assert!(!flag(Some("0")));
        assert!(!flag(None));
    }

    #[test]
    fn test_decode_records_accepts_single_object() -> Result<()> {
        let one: Vec<Drug> = decode_records(br#"{"id":4,"name_en":"Aspirin"}"#)?;
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, 4);

        let many: Vec<Drug> = decode_records(br#"[{"id":1},{"id":2}]"#)?;
        assert_eq!(many.len(), 2);

        assert!(matches!(decode_records::<Drug>(b"42"), Err(Error::InvalidArgument(_))));
        assert!(matches!(decode_records::<Drug>(b"{oops"), Err(Error::Decode(_))));
        Ok(())
    }

    #[test]
    fn test_link_request_defaults_to_symmetric() -> Result<()> {
        let request: LinkRequest = serde_json::from_str(r#"{"ids":[1,2]}"#)?;
        assert!(request.symmetric);
        assert_eq!(request.ids, vec![1, 2]);
        Ok(())
    }
}
