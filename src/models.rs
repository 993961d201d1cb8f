use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Editor, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Editor => "Editor",
            Role::Viewer => "Viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Title-cases the input ("editor", "EDITOR" -> "Editor") before matching.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let normalized: String = match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(|c| c.to_lowercase()))
                .collect(),
            None => String::new(),
        };
        match normalized.as_str() {
            "Admin" => Ok(Role::Admin),
            "Editor" => Ok(Role::Editor),
            "Viewer" => Ok(Role::Viewer),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// The authenticated identity attached to a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns(&self, asset: &Asset) -> bool {
        asset.owner.as_deref() == Some(self.id.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_salt: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn as_caller(&self) -> Caller {
        Caller {
            id: self.id.clone(),
            username: self.username.clone(),
            role: self.role,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Asset {
    pub id: String,
    /// `None` for anonymous or system assets. Never reassigned after creation.
    pub owner: Option<String>,
    /// Blob store reference of the uploaded file.
    pub file: String,
    pub name: String,
    pub description: String,
    pub file_type: String,
    pub file_size: u64,
    pub tags: Vec<String>,
    pub keywords: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub thumbnail: Option<String>,
    pub is_public: bool,
    pub preview_url: Option<String>,
    pub polygon_count: Option<i64>,
    pub dimensions: Option<Value>,
    /// Incremented on every update. Informational only, writes are last-write-wins.
    pub version: u32,
}

/// Closed set of audited actions.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Upload,
    Update,
    Delete,
    Login,
    Logout,
    View,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Upload => "upload",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Login => "login",
            ActionKind::Logout => "logout",
            ActionKind::View => "view",
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" | "create" | "add" => Ok(ActionKind::Upload),
            "update" => Ok(ActionKind::Update),
            "delete" => Ok(ActionKind::Delete),
            "login" => Ok(ActionKind::Login),
            "logout" => Ok(ActionKind::Logout),
            "view" => Ok(ActionKind::View),
            other => Err(format!("Invalid action type: {}", other)),
        }
    }
}

/// The record an audit entry is about.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: String,
    pub id: String,
}

impl EntityRef {
    pub fn asset(id: &str) -> Self {
        Self {
            kind: "asset".to_string(),
            id: id.to_string(),
        }
    }

    pub fn user(id: &str) -> Self {
        Self {
            kind: "user".to_string(),
            id: id.to_string(),
        }
    }
}

/// An audit entry before it is written. The store assigns id and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAuditEntry {
    pub actor_id: String,
    pub actor_name: String,
    pub action: ActionKind,
    pub description: String,
    pub origin_address: Option<String>,
    pub entity: Option<EntityRef>,
}

impl NewAuditEntry {
    pub fn new(actor: &Caller, action: ActionKind, description: impl Into<String>) -> Self {
        Self {
            actor_id: actor.id.clone(),
            actor_name: actor.username.clone(),
            action,
            description: description.into(),
            origin_address: None,
            entity: None,
        }
    }

    pub fn with_origin(mut self, origin: Option<&str>) -> Self {
        self.origin_address = origin.map(str::to_string);
        self
    }

    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: String,
    pub actor_name: String,
    pub action: ActionKind,
    pub description: String,
    pub origin_address: Option<String>,
    pub entity: Option<EntityRef>,
    pub created_at: DateTime<Utc>,
}
