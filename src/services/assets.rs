//! # Asset Service
//!
//! Write path for assets:
//!
//! ```text
//! RECEIVED → NORMALIZED → VALIDATED → PERSISTED → LOGGED → RESPONDED
//!     └──────────┴────────────┴───────────┴─→ ERROR
//! ```
//!
//! Validation completes before any blob is staged, so a rejected request
//! leaves neither a row nor a blob behind. The audit step runs after the
//! change is durable and cannot undo it.

use chrono::Utc;

use crate::audit::{self, AuditLog};
use crate::blob::{BlobStore, StoredBlob, UploadedFile};
use crate::config::Config;
use crate::constants::{THUMBNAIL_NAMESPACE, UPLOAD_NAMESPACE};
use crate::errors::{AppError, AppResult, FieldError};
use crate::log_data;
use crate::models::{ActionKind, Asset, EntityRef};
use crate::normalizer::{normalize_asset_fields, AssetFields, FieldDefaults, NormalizeMode, RawPayload};
use crate::policy::{self, Operation};
use crate::repository::{AssetFilters, AssetQuery, AssetRepository, Scope};
use crate::services::RequestContext;
use crate::utils::generate_id;

const MAX_NAME_LENGTH: usize = 255;
const MAX_FILE_TYPE_LENGTH: usize = 50;

/// Everything a create or update request carries.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub payload: RawPayload,
    pub file: Option<UploadedFile>,
    pub thumbnail: Option<UploadedFile>,
}

pub struct AssetService<'a> {
    assets: &'a dyn AssetRepository,
    blobs: &'a dyn BlobStore,
    audit: &'a dyn AuditLog,
    config: &'a Config,
}

fn size_label(bytes: u64) -> String {
    format!("{}MB", bytes / (1024 * 1024))
}

fn describe(asset: &Asset) -> String {
    format!("{} asset '{}' ({})", asset.file_type, asset.name, asset.id)
}

impl<'a> AssetService<'a> {
    pub fn new(
        assets: &'a dyn AssetRepository,
        blobs: &'a dyn BlobStore,
        audit: &'a dyn AuditLog,
        config: &'a Config,
    ) -> Self {
        Self {
            assets,
            blobs,
            audit,
            config,
        }
    }

    fn defaults(&self) -> FieldDefaults {
        FieldDefaults {
            is_public: self.config.default_is_public,
        }
    }

    fn validate(&self, fields: &AssetFields, request: &UploadRequest, require_file: bool) -> AppResult<()> {
        let mut errors = Vec::new();
        let max = self.config.max_file_size;

        if let Some(name) = &fields.name {
            if name.is_empty() {
                errors.push(FieldError::new("name", "This field is required"));
            } else if name.chars().count() > MAX_NAME_LENGTH {
                errors.push(FieldError::new(
                    "name",
                    format!("Ensure this field has no more than {} characters", MAX_NAME_LENGTH),
                ));
            }
        }
        if let Some(file_type) = &fields.file_type {
            if file_type.chars().count() > MAX_FILE_TYPE_LENGTH {
                errors.push(FieldError::new(
                    "file_type",
                    format!("Ensure this field has no more than {} characters", MAX_FILE_TYPE_LENGTH),
                ));
            }
        }
        match &request.file {
            None if require_file => errors.push(FieldError::new("file", "No file was submitted")),
            Some(file) if file.bytes.is_empty() => {
                errors.push(FieldError::new("file", "The submitted file is empty"))
            }
            Some(file) if file.size() > max => errors.push(FieldError::new(
                "file",
                format!("File size cannot exceed {}", size_label(max)),
            )),
            _ => {}
        }
        if let Some(thumbnail) = &request.thumbnail {
            if thumbnail.size() > max {
                errors.push(FieldError::new(
                    "thumbnail",
                    format!("File size cannot exceed {}", size_label(max)),
                ));
            }
        }
        if matches!(fields.file_size, Some(size) if size < 0) {
            errors.push(FieldError::new("file_size", "Ensure this value is greater than or equal to 0"));
        }
        if matches!(fields.polygon_count, Some(Some(count)) if count < 0) {
            errors.push(FieldError::new("polygon_count", "Ensure this value is greater than or equal to 0"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation { errors })
        }
    }

    /// Stages the file and thumbnail. A failure removes whatever was
    /// already staged.
    async fn stage(
        &self,
        ctx: &RequestContext,
        request: &UploadRequest,
    ) -> AppResult<(Option<StoredBlob>, Option<StoredBlob>)> {
        let owner = ctx.caller.id.as_str();
        let file = match &request.file {
            Some(file) => Some(self.blobs.put(UPLOAD_NAMESPACE, owner, file).await?),
            None => None,
        };
        let thumbnail = match &request.thumbnail {
            Some(thumbnail) => match self.blobs.put(THUMBNAIL_NAMESPACE, owner, thumbnail).await {
                Ok(stored) => Some(stored),
                Err(e) => {
                    self.discard(ctx, file.iter().map(|b| b.reference.as_str())).await;
                    return Err(e);
                }
            },
            None => None,
        };
        Ok((file, thumbnail))
    }

    /// Best-effort blob removal; failures are only logged.
    async fn discard<'r>(&self, ctx: &RequestContext, references: impl Iterator<Item = &'r str>) {
        for reference in references {
            if let Err(e) = self.blobs.delete(reference).await {
                ctx.logger.warn(
                    "Failed to remove blob",
                    log_data!("reference" => reference, "error" => e.to_string()),
                );
            }
        }
    }

    fn apply(asset: &mut Asset, fields: AssetFields) {
        if let Some(name) = fields.name {
            asset.name = name;
        }
        if let Some(description) = fields.description {
            asset.description = description;
        }
        if let Some(file_type) = fields.file_type {
            asset.file_type = file_type;
        }
        if let Some(tags) = fields.tags {
            asset.tags = tags;
        }
        if let Some(keywords) = fields.keywords {
            asset.keywords = keywords;
        }
        if let Some(category) = fields.category {
            asset.category = category;
        }
        if let Some(is_public) = fields.is_public {
            asset.is_public = is_public;
        }
        if let Some(preview_url) = fields.preview_url {
            asset.preview_url = preview_url;
        }
        if let Some(polygon_count) = fields.polygon_count {
            asset.polygon_count = polygon_count;
        }
        if let Some(dimensions) = fields.dimensions {
            asset.dimensions = dimensions;
        }
    }

    /// Creates an asset owned by the caller. Any owner in the payload is ignored.
    pub async fn create(&self, ctx: &RequestContext, request: UploadRequest) -> AppResult<Asset> {
        if !policy::may_attempt(Some(ctx.caller.role), Operation::Create) {
            return Err(AppError::forbidden(format!(
                "Role {} may not upload assets",
                ctx.caller.role
            )));
        }

        let fields = normalize_asset_fields(&request.payload, NormalizeMode::Complete, self.defaults());
        self.validate(&fields, &request, true)?;

        let (file, thumbnail) = self.stage(ctx, &request).await?;
        let Some(file) = file else {
            return Err(AppError::field("file", "No file was submitted"));
        };

        let now = Utc::now();
        let mut asset = Asset {
            id: generate_id(),
            owner: Some(ctx.caller.id.clone()),
            file: file.reference.clone(),
            name: String::new(),
            description: String::new(),
            file_type: String::new(),
            file_size: file.size,
            tags: Vec::new(),
            keywords: String::new(),
            category: None,
            created_at: now,
            updated_at: now,
            thumbnail: thumbnail.as_ref().map(|t| t.reference.clone()),
            is_public: self.config.default_is_public,
            preview_url: None,
            polygon_count: None,
            dimensions: None,
            version: 1,
        };
        Self::apply(&mut asset, fields);

        if let Err(e) = self.assets.insert(&asset).await {
            let staged = [Some(&file), thumbnail.as_ref()];
            self.discard(ctx, staged.iter().flatten().map(|b| b.reference.as_str()))
                .await;
            return Err(e);
        }

        ctx.logger.info(
            "Asset created",
            log_data!("asset_id" => asset.id, "owner" => ctx.caller.id, "size" => asset.file_size),
        );
        audit::record(
            self.audit,
            &ctx.logger,
            ctx.audit_entry(ActionKind::Upload, format!("Uploaded {}", describe(&asset)))
                .with_entity(EntityRef::asset(&asset.id)),
        )
        .await;

        Ok(asset)
    }

    /// Full (`partial = false`) or partial update. Owner, id and creation
    /// time never change.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        request: UploadRequest,
        partial: bool,
    ) -> AppResult<Asset> {
        let operation = if partial {
            Operation::PartialUpdate
        } else {
            Operation::Update
        };
        let existing = self.load(id).await?;
        policy::enforce(&ctx.caller, &existing, operation)?;

        let mode = if partial {
            NormalizeMode::Partial
        } else {
            NormalizeMode::Complete
        };
        let fields = normalize_asset_fields(&request.payload, mode, self.defaults());
        self.validate(&fields, &request, false)?;

        let (file, thumbnail) = self.stage(ctx, &request).await?;

        let mut asset = existing.clone();
        Self::apply(&mut asset, fields);
        if let Some(file) = &file {
            asset.file = file.reference.clone();
            asset.file_size = file.size;
        }
        if let Some(thumbnail) = &thumbnail {
            asset.thumbnail = Some(thumbnail.reference.clone());
        }
        asset.updated_at = Utc::now().max(existing.updated_at).max(existing.created_at);
        asset.version = existing.version.saturating_add(1);

        if let Err(e) = self.assets.update(&asset).await {
            let staged = [file.as_ref(), thumbnail.as_ref()];
            self.discard(ctx, staged.iter().flatten().map(|b| b.reference.as_str()))
                .await;
            return Err(e);
        }

        let replaced = [
            file.as_ref().map(|_| existing.file.as_str()),
            thumbnail.as_ref().and(existing.thumbnail.as_deref()),
        ];
        self.discard(ctx, replaced.into_iter().flatten()).await;

        ctx.logger.info(
            "Asset updated",
            log_data!("asset_id" => asset.id, "version" => asset.version, "partial" => partial),
        );
        audit::record(
            self.audit,
            &ctx.logger,
            ctx.audit_entry(ActionKind::Update, format!("Updated {}", describe(&asset)))
                .with_entity(EntityRef::asset(&asset.id)),
        )
        .await;

        Ok(asset)
    }

    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> AppResult<()> {
        if !policy::may_attempt(Some(ctx.caller.role), Operation::Delete) {
            return Err(AppError::forbidden(format!(
                "Role {} may not delete assets",
                ctx.caller.role
            )));
        }
        let existing = self.load(id).await?;
        policy::enforce(&ctx.caller, &existing, Operation::Delete)?;

        self.assets.delete(&existing.id).await?;

        ctx.logger.info("Asset deleted", log_data!("asset_id" => existing.id));
        audit::record(
            self.audit,
            &ctx.logger,
            ctx.audit_entry(ActionKind::Delete, format!("Deleted {}", describe(&existing)))
                .with_entity(EntityRef::asset(&existing.id)),
        )
        .await;

        let blobs = [Some(existing.file.as_str()), existing.thumbnail.as_deref()];
        self.discard(ctx, blobs.into_iter().flatten()).await;
        Ok(())
    }

    pub async fn get(&self, ctx: &RequestContext, id: &str) -> AppResult<Asset> {
        let asset = self.load(id).await?;
        policy::enforce(&ctx.caller, &asset, Operation::Retrieve)?;
        Ok(asset)
    }

    /// Every asset the caller may see.
    pub async fn list(&self, ctx: &RequestContext, filters: AssetFilters) -> AppResult<Vec<Asset>> {
        self.fetch(ctx, "visible", Scope::for_caller(&ctx.caller), filters).await
    }

    /// Assets owned by the caller.
    pub async fn list_mine(&self, ctx: &RequestContext, filters: AssetFilters) -> AppResult<Vec<Asset>> {
        self.fetch(ctx, "mine", Scope::OwnedBy(ctx.caller.id.clone()), filters).await
    }

    /// Public assets only, whatever the caller's role.
    pub async fn list_public(&self, ctx: &RequestContext, filters: AssetFilters) -> AppResult<Vec<Asset>> {
        self.fetch(ctx, "public", Scope::PublicOnly, filters).await
    }

    async fn fetch(
        &self,
        ctx: &RequestContext,
        listing: &str,
        scope: Scope,
        filters: AssetFilters,
    ) -> AppResult<Vec<Asset>> {
        let assets = self.assets.list(&AssetQuery::new(scope, filters)).await?;
        ctx.logger.info(
            "Assets listed",
            log_data!("listing" => listing, "caller" => ctx.caller.id.clone(), "count" => assets.len()),
        );
        Ok(assets)
    }

    async fn load(&self, id: &str) -> AppResult<Asset> {
        self.assets
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Asset not found"))
    }
}
