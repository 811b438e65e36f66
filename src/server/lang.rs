//! Request language extraction
//!
//! `?lang=` wins, then the first supported `Accept-Language` tag, then the
//! configured default.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::ACCEPT_LANGUAGE, request::Parts},
};
use std::sync::Arc;

use super::{error::ApiError, AppState};
use crate::model::Lang;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLang(pub Lang);

fn query_lang(query: &str) -> Option<&str> {
    query
        .split('&')
        .filter_map(|pair| pair.strip_prefix("lang="))
        .find(|v| !v.is_empty())
}

fn header_lang(header: &str) -> Option<Lang> {
    header
        .split(',')
        .filter_map(|tag| tag.split(';').next())
        .find_map(|tag| tag.trim().parse().ok())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestLang {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(code) = parts.uri.query().and_then(query_lang) {
            return Ok(RequestLang(code.parse()?));
        }

        if let Some(lang) = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .and_then(header_lang)
        {
            return Ok(RequestLang(lang));
        }

        let fallback = parts
            .extensions
            .get::<Arc<AppState>>()
            .map(|state| state.config.server.default_lang)
            .unwrap_or(Lang::Uk);
        Ok(RequestLang(fallback))
    }
}
