//! Direct transfer endpoints behind the credential URLs issued by
//! `LocalBlobStore`. No bearer token is needed; the `token` query parameter is
//! the authorization.

use actix_web::{get, http::header::CONTENT_TYPE, put, web, HttpRequest, HttpResponse};
use mime_guess::from_path;
use serde::Deserialize;
use tracing::{debug, error};

use crate::services::blob::{BlobAccess, BlobError, BlobStore, LocalBlobStore};

#[derive(Deserialize)]
pub struct BlobQueryParams {
    pub token: String,
}

#[put("/blobs/{container}/{path:.*}")]
pub async fn put_blob(
    blobs: web::Data<LocalBlobStore>,
    path: web::Path<(String, String)>,
    query: web::Query<BlobQueryParams>,
    payload: web::Bytes,
    req: HttpRequest,
) -> HttpResponse {
    let (container, path) = path.into_inner();
    let claims = match blobs.verify(&query.token, &container, &path, BlobAccess::Write) {
        Ok(claims) => claims,
        Err(error) => {
            debug!("blob upload refused: {}", error);
            return HttpResponse::Forbidden().body("INVALID_CREDENTIAL");
        }
    };

    if let Some(expected) = &claims.content_type {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.eq_ignore_ascii_case(expected) {
            return HttpResponse::UnsupportedMediaType().body("CONTENT_TYPE_MISMATCH");
        }
    }
    if payload.is_empty() {
        return HttpResponse::BadRequest().body("EMPTY_BODY");
    }

    match blobs.write(&path, &container, &payload).await {
        Ok(()) => HttpResponse::Created().finish(),
        Err(error) => {
            error!("blob write failed for {}/{}: {}", container, path, error);
            HttpResponse::InternalServerError().body("INTERNAL_FAILURE")
        }
    }
}
#[get("/blobs/{container}/{path:.*}")]
pub async fn get_blob(
    blobs: web::Data<LocalBlobStore>,
    path: web::Path<(String, String)>,
    query: web::Query<BlobQueryParams>,
) -> HttpResponse {
    let (container, path) = path.into_inner();
    if let Err(error) = blobs.verify(&query.token, &container, &path, BlobAccess::Read) {
        debug!("blob read refused: {}", error);
        return HttpResponse::Forbidden().body("INVALID_CREDENTIAL");
    }

    match blobs.download(&path, &container).await {
        Ok(bytes) => {
            let mime = from_path(&path).first_or_octet_stream();
            HttpResponse::Ok().content_type(mime).body(bytes)
        }
        Err(BlobError::NotFound(_)) => HttpResponse::NotFound().body("CONTENT_NOT_FOUND"),
        Err(error) => {
            error!("blob read failed for {}/{}: {}", container, path, error);
            HttpResponse::InternalServerError().body("INTERNAL_FAILURE")
        }
    }
}
