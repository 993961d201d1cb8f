//! # Asset Handlers
//!
//! - `GET /api/assets/` with filter query parameters
//! - `GET /api/assets/mine/`, `GET /api/assets/public/`
//! - `POST /api/assets/` (multipart: `file`, optional `thumbnail`, metadata fields)
//! - `GET|PUT|PATCH|DELETE /api/assets/{id}/`

use worker::*;

use super::{authenticate, json_response, no_content, query_params, read_body, Backend};
use crate::errors::AppResult;
use crate::logging::Logger;
use crate::repository::AssetFilters;
use crate::services::{AssetService, UploadRequest};

const METADATA_FIELDS: &[&str] = &[
    "name",
    "description",
    "file_type",
    "file_size",
    "tags",
    "tags[]",
    "keywords",
    "category",
    "is_public",
    "preview_url",
    "polygon_count",
    "dimensions",
];

const FILE_FIELDS: &[&str] = &["file", "thumbnail"];

/// Which listing endpoint was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Visible,
    Mine,
    Public,
}

fn service(backend: &Backend) -> AssetService<'_> {
    AssetService::new(&backend.db, &backend.blobs, &backend.db, &backend.config)
}

async fn read_upload(req: &mut Request) -> AppResult<UploadRequest> {
    let mut body = read_body(req, METADATA_FIELDS, FILE_FIELDS).await?;
    Ok(UploadRequest {
        file: body.take_file("file"),
        thumbnail: body.take_file("thumbnail"),
        payload: body.payload,
    })
}

pub async fn list_assets(
    req: Request,
    backend: &Backend,
    logger: &Logger,
    listing: Listing,
) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let filters = AssetFilters::from_params(&query_params(&req)?);
    let service = service(backend);
    let assets = match listing {
        Listing::Visible => service.list(&ctx, filters).await?,
        Listing::Mine => service.list_mine(&ctx, filters).await?,
        Listing::Public => service.list_public(&ctx, filters).await?,
    };
    json_response(&assets, 200)
}

pub async fn create_asset(mut req: Request, backend: &Backend, logger: &Logger) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let upload = read_upload(&mut req).await?;
    let asset = service(backend).create(&ctx, upload).await?;
    json_response(&asset, 201)
}

pub async fn get_asset(req: Request, backend: &Backend, logger: &Logger, id: &str) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let asset = service(backend).get(&ctx, id).await?;
    json_response(&asset, 200)
}

pub async fn update_asset(
    mut req: Request,
    backend: &Backend,
    logger: &Logger,
    id: &str,
    partial: bool,
) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let upload = read_upload(&mut req).await?;
    let asset = service(backend).update(&ctx, id, upload, partial).await?;
    json_response(&asset, 200)
}

pub async fn delete_asset(req: Request, backend: &Backend, logger: &Logger, id: &str) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    service(backend).delete(&ctx, id).await?;
    no_content()
}
