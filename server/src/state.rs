// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::handlers::AppError;

/// Header carrying the id of the calling account.
pub const ACCOUNT_HEADER: &str = "x-account-id";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    pub fn max_tree_depth(&self) -> usize {
        self.config.max_tree_depth
    }
}

/// The calling account, taken from the `x-account-id` header.
///
/// Authentication happens upstream; this only checks that an id is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentAccount(pub i64);

impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(ACCOUNT_HEADER).ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "Missing x-account-id header.",
            )
        })?;

        value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(CurrentAccount)
            .ok_or_else(|| {
                AppError::new(
                    StatusCode::UNAUTHORIZED,
                    "The x-account-id header must be a numeric account id.",
                )
            })
    }
}
