//! File and session persistence endpoints.
//!
//! Everything is confined to `storage.data_dir`: request paths must be
//! relative and may not climb out with `..`. Each endpoint is gated by its
//! permission flag.

use crate::api::handlers::AppState;
use crate::api::models::{
    ErrorResponse, FsReadRequest, FsReadResponse, FsWriteRequest, FsWriteResponse,
    SessionSaveResponse,
};
use crate::core::{AppError, Result};
use axum::{body::Bytes, extract::State, Json};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub const SESSION_FILE: &str = "session.json";

fn require(allowed: bool, action: &str) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("{} is disabled", action)))
    }
}

/// Parse a JSON body, reporting failures as 400 rather than 500.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Resolve `relative` under `root`, rejecting anything that could escape it.
pub fn sandboxed_path(root: &Path, relative: &str) -> Result<PathBuf> {
    if relative.trim().is_empty() {
        return Err(AppError::BadRequest("Path is required".to_string()));
    }

    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(AppError::BadRequest(format!(
            "Path must be relative to the data directory: {}",
            relative
        )));
    }

    Ok(root.join(path))
}

/// Write a file under the data directory.
#[utoipa::path(
    post,
    path = "/api/fs/write",
    tag = "storage",
    request_body = FsWriteRequest,
    responses(
        (status = 200, description = "File written", body = FsWriteResponse),
        (status = 400, description = "Invalid path or body", body = ErrorResponse),
        (status = 403, description = "Writing is disabled", body = ErrorResponse)
    )
)]
pub async fn fs_write(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<FsWriteResponse>> {
    let storage = &state.config.storage;
    require(storage.permissions.fs_write, "File writing")?;

    let request: FsWriteRequest = parse_body(&body)?;
    let target = sandboxed_path(&storage.data_dir, &request.path)?;

    let contents = match request.content {
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other)?,
    };

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, contents.as_bytes()).await?;

    tracing::info!(path = %request.path, bytes = contents.len(), "File written");

    Ok(Json(FsWriteResponse {
        ok: true,
        path: request.path,
    }))
}

/// Read a file from the data directory.
#[utoipa::path(
    post,
    path = "/api/fs/read",
    tag = "storage",
    request_body = FsReadRequest,
    responses(
        (status = 200, description = "File contents", body = FsReadResponse),
        (status = 400, description = "Invalid path or body", body = ErrorResponse),
        (status = 403, description = "Reading is disabled", body = ErrorResponse),
        (status = 404, description = "No such file", body = ErrorResponse)
    )
)]
pub async fn fs_read(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<FsReadResponse>> {
    let storage = &state.config.storage;
    require(storage.permissions.fs_read, "File reading")?;

    let request: FsReadRequest = parse_body(&body)?;
    let target = sandboxed_path(&storage.data_dir, &request.path)?;

    let bytes = match tokio::fs::read(&target).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("File not found: {}", request.path)));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(FsReadResponse {
        path: request.path,
        content: String::from_utf8_lossy(&bytes).into_owned(),
    }))
}

/// Persist an arbitrary JSON session snapshot; the body may be any JSON value.
#[utoipa::path(
    post,
    path = "/api/session/save",
    tag = "storage",
    request_body(content = Object, description = "Any JSON value"),
    responses(
        (status = 200, description = "Snapshot saved", body = SessionSaveResponse),
        (status = 400, description = "Body is not JSON", body = ErrorResponse),
        (status = 403, description = "Sessions are disabled", body = ErrorResponse)
    )
)]
pub async fn session_save(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SessionSaveResponse>> {
    let storage = &state.config.storage;
    require(storage.permissions.session, "Session storage")?;

    let snapshot: Value = parse_body(&body)?;
    tokio::fs::create_dir_all(&storage.data_dir).await?;
    tokio::fs::write(
        storage.data_dir.join(SESSION_FILE),
        serde_json::to_vec_pretty(&snapshot)?,
    )
    .await?;

    tracing::debug!("Session snapshot saved");
    Ok(Json(SessionSaveResponse { ok: true }))
}

/// Return the last saved session snapshot.
#[utoipa::path(
    get,
    path = "/api/session/load",
    tag = "storage",
    responses(
        (status = 200, description = "Stored snapshot as saved"),
        (status = 403, description = "Sessions are disabled", body = ErrorResponse),
        (status = 404, description = "Nothing saved yet", body = ErrorResponse)
    )
)]
pub async fn session_load(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let storage = &state.config.storage;
    require(storage.permissions.session, "Session storage")?;

    let bytes = match tokio::fs::read(storage.data_dir.join(SESSION_FILE)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::NotFound("No saved session".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_sandboxed_path_accepts_relative() {
        let root = Path::new("/srv/data");
        assert_eq!(
            sandboxed_path(root, "notes/today.md").unwrap(),
            PathBuf::from("/srv/data/notes/today.md")
        );
        assert_eq!(
            sandboxed_path(root, "./a.txt").unwrap(),
            PathBuf::from("/srv/data/./a.txt")
        );
    }

    #[test]
    fn test_sandboxed_path_rejects_escapes() {
        let root = Path::new("/srv/data");
        for bad in ["/etc/passwd", "../secret", "a/../../b", "a/.."] {
            assert_matches!(sandboxed_path(root, bad), Err(AppError::BadRequest(_)), "{}", bad);
        }
    }

    #[test]
    fn test_sandboxed_path_rejects_empty() {
        assert_matches!(
            sandboxed_path(Path::new("/srv"), "  "),
            Err(AppError::BadRequest(_))
        );
    }

    #[test]
    fn test_require() {
        assert!(require(true, "Anything").is_ok());
        let err = require(false, "File writing").unwrap_err();
        assert_matches!(err, AppError::Forbidden(ref msg) if msg == "File writing is disabled");
    }
}
