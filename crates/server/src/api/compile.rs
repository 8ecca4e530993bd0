use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use quire_common::protocol::compile::{inline_disposition, CompileRequest};

use super::AppState;
use crate::error::ApiError;

/// `POST /api/compile`: renders `content` and returns the PDF inline.
pub async fn compile_document(
    State(state): State<AppState>,
    payload: Result<Json<CompileRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let artifact = state.compiler.compile(&request.content).await?;

    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.to_owned()),
            (header::CONTENT_DISPOSITION, inline_disposition()),
        ],
        artifact.bytes,
    )
        .into_response())
}
