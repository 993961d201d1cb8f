//! In-memory implementations of the storage seams, for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;

use crate::audit::{AuditLog, AuditPage, AuditQuery};
use crate::blob::{BlobStore, StoredBlob, UploadedFile};
use crate::errors::{AppError, AppResult};
use crate::identity::{generate_salt, hash_password, SessionRecord, SessionStore, UserStore};
use crate::models::{Asset, AuditEntry, NewAuditEntry, Role, User};
use crate::repository::{AssetQuery, AssetRepository};
use crate::utils::{generate_blob_key, generate_id};

pub fn sample_asset(id: &str, owner: Option<&str>, is_public: bool) -> Asset {
    let now = Utc::now();
    Asset {
        id: id.to_string(),
        owner: owner.map(str::to_string),
        file: format!("uploads/{}", id),
        name: format!("asset {}", id),
        description: String::new(),
        file_type: "image".to_string(),
        file_size: 10,
        tags: Vec::new(),
        keywords: String::new(),
        category: None,
        created_at: now,
        updated_at: now,
        thumbnail: None,
        is_public,
        preview_url: None,
        polygon_count: None,
        dimensions: None,
        version: 1,
    }
}

pub fn sample_user(id: &str, username: &str, role: Role, password: &str) -> User {
    let salt = generate_salt();
    User {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        role,
        password_hash: hash_password(&salt, password),
        password_salt: salt,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryAssetRepository {
    rows: RefCell<BTreeMap<String, Asset>>,
    fail_writes: Cell<bool>,
}

impl MemoryAssetRepository {
    pub fn len(&self) -> usize {
        self.rows.borrow().len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.borrow().contains_key(id)
    }

    pub fn fail_writes(&self) {
        self.fail_writes.set(true);
    }

    fn check_writable(&self) -> AppResult<()> {
        if self.fail_writes.get() {
            Err(AppError::internal("simulated write failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait(?Send)]
impl AssetRepository for MemoryAssetRepository {
    async fn insert(&self, asset: &Asset) -> AppResult<()> {
        self.check_writable()?;
        self.rows.borrow_mut().insert(asset.id.clone(), asset.clone());
        Ok(())
    }

    async fn update(&self, asset: &Asset) -> AppResult<()> {
        self.check_writable()?;
        self.rows.borrow_mut().insert(asset.id.clone(), asset.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.check_writable()?;
        self.rows.borrow_mut().remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<Asset>> {
        Ok(self.rows.borrow().get(id).cloned())
    }

    async fn list(&self, query: &AssetQuery) -> AppResult<Vec<Asset>> {
        let mut rows: Vec<Asset> = self
            .rows
            .borrow()
            .values()
            .filter(|asset| query.matches(asset))
            .cloned()
            .collect();
        query.sort(&mut rows);
        Ok(rows)
    }
}

#[derive(Default)]
pub struct MemoryAuditLog {
    entries: RefCell<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.borrow().clone()
    }
}

#[async_trait(?Send)]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: NewAuditEntry) -> AppResult<AuditEntry> {
        let mut entries = self.entries.borrow_mut();
        let latest = entries
            .iter()
            .filter(|e| e.actor_id == entry.actor_id)
            .map(|e| e.created_at)
            .max();
        let now = Utc::now();
        let stored = AuditEntry {
            id: generate_id(),
            actor_id: entry.actor_id,
            actor_name: entry.actor_name,
            action: entry.action,
            description: entry.description,
            origin_address: entry.origin_address,
            entity: entry.entity,
            created_at: latest.map_or(now, |latest| latest.max(now)),
        };
        entries.push(stored.clone());
        Ok(stored)
    }

    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage> {
        let entries = self.entries.borrow();
        let mut matching: Vec<(usize, &AuditEntry)> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| query.matches(entry))
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| a.created_at.cmp(&b.created_at).then(ia.cmp(ib)));
        if !query.oldest_first {
            matching.reverse();
        }
        let count = matching.len() as u64;
        let results = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .map(|(_, entry)| entry.clone())
            .collect();
        Ok(AuditPage {
            count,
            page: query.page,
            page_size: query.page_size,
            results,
        })
    }
}

/// Audit log whose appends fail a fixed number of times.
pub struct FailingAuditLog {
    remaining_failures: Cell<u32>,
    attempts: Cell<u32>,
    inner: MemoryAuditLog,
}

impl Default for FailingAuditLog {
    fn default() -> Self {
        Self::failing_times(u32::MAX)
    }
}

impl FailingAuditLog {
    pub fn failing_times(failures: u32) -> Self {
        Self {
            remaining_failures: Cell::new(failures),
            attempts: Cell::new(0),
            inner: MemoryAuditLog::default(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }
}

#[async_trait(?Send)]
impl AuditLog for FailingAuditLog {
    async fn append(&self, entry: NewAuditEntry) -> AppResult<AuditEntry> {
        self.attempts.set(self.attempts.get() + 1);
        let remaining = self.remaining_failures.get();
        if remaining > 0 {
            self.remaining_failures.set(remaining - 1);
            return Err(AppError::internal("audit store unavailable"));
        }
        self.inner.append(entry).await
    }

    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage> {
        self.inner.query(query).await
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RefCell<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn len(&self) -> usize {
        self.blobs.borrow().len()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.blobs.borrow().contains_key(reference)
    }
}

#[async_trait(?Send)]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, namespace: &str, owner: &str, file: &UploadedFile) -> AppResult<StoredBlob> {
        let reference = generate_blob_key(namespace, owner, &file.file_name, &file.content_type);
        self.blobs
            .borrow_mut()
            .insert(reference.clone(), file.bytes.clone());
        Ok(StoredBlob {
            reference,
            size: file.size(),
        })
    }

    async fn delete(&self, reference: &str) -> AppResult<()> {
        self.blobs.borrow_mut().remove(reference);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RefCell<BTreeMap<String, User>>,
}

#[async_trait(?Send)]
impl UserStore for MemoryUserStore {
    async fn insert_user(&self, user: &User) -> AppResult<()> {
        self.users.borrow_mut().insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        Ok(self.users.borrow().get(id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .borrow()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_conflict(&self, username: &str, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .borrow()
            .values()
            .find(|u| u.username == username || u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.users.borrow().values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn update_role(&self, id: &str, role: Role) -> AppResult<()> {
        if let Some(user) = self.users.borrow_mut().get_mut(id) {
            user.role = role;
        }
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> AppResult<()> {
        self.users.borrow_mut().remove(id);
        Ok(())
    }

    async fn count_users(&self) -> AppResult<u64> {
        Ok(self.users.borrow().len() as u64)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RefCell<BTreeMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn contains_raw_token(&self, token: &str) -> bool {
        self.sessions.borrow().contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.sessions.borrow().len()
    }
}

#[async_trait(?Send)]
impl SessionStore for MemorySessionStore {
    async fn insert_session(&self, session: &SessionRecord) -> AppResult<()> {
        self.sessions
            .borrow_mut()
            .insert(session.token_digest.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, token_digest: &str) -> AppResult<Option<SessionRecord>> {
        Ok(self.sessions.borrow().get(token_digest).cloned())
    }

    async fn delete_session(&self, token_digest: &str) -> AppResult<()> {
        self.sessions.borrow_mut().remove(token_digest);
        Ok(())
    }

    async fn delete_sessions_for(&self, user_id: &str) -> AppResult<()> {
        self.sessions.borrow_mut().retain(|_, s| s.user_id != user_id);
        Ok(())
    }
}
