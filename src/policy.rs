//! # Access Policy
//!
//! Pure authorization decisions for asset and user operations. Nothing here
//! touches storage: callers pass in the facts (role, ownership, visibility)
//! and receive a [`Decision`].
//!
//! ## Asset rules, in priority order
//!
//! 1. Unauthenticated callers are denied everything except [`Operation::Login`]
//! 2. Admin is allowed every operation
//! 3. Create: Editor only
//! 4. Update / PartialUpdate: Editor, or the asset's owner of any role
//! 5. Delete: Admin only
//! 6. List / Retrieve: any authenticated role, for rows the caller owns or
//!    that are public
//!
//! ## Self protection
//!
//! [`guard_self_management`] stops an Admin from deleting or demoting their
//! own account. It runs at the user-management boundary, independent of the
//! asset table above.

use crate::errors::{AppError, AppResult};
use crate::models::{Asset, Caller, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    PartialUpdate,
    Delete,
    List,
    Retrieve,
    Login,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Create,
        Operation::Update,
        Operation::PartialUpdate,
        Operation::Delete,
        Operation::List,
        Operation::Retrieve,
        Operation::Login,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::PartialUpdate => "partial_update",
            Operation::Delete => "delete",
            Operation::List => "list",
            Operation::Retrieve => "retrieve",
            Operation::Login => "login",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decides whether `role` may perform `operation` on a resource with the
/// given ownership and visibility. `role` is `None` for anonymous callers.
pub fn authorize(role: Option<Role>, is_owner: bool, is_public: bool, operation: Operation) -> Decision {
    let Some(role) = role else {
        return if operation == Operation::Login {
            Decision::Allow
        } else {
            Decision::Deny
        };
    };

    let allowed = match (role, operation) {
        (Role::Admin, _) => true,
        (_, Operation::Login) => true,
        (Role::Editor, Operation::Create) => true,
        (_, Operation::Create) => false,
        (Role::Editor, Operation::Update | Operation::PartialUpdate) => true,
        (_, Operation::Update | Operation::PartialUpdate) => is_owner,
        (_, Operation::Delete) => false,
        (_, Operation::List | Operation::Retrieve) => is_owner || is_public,
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// Role-only precheck run before any lookup. Returns `false` when no
/// combination of ownership and visibility could grant the operation, so the
/// request can be rejected without revealing whether the target exists.
pub fn may_attempt(role: Option<Role>, operation: Operation) -> bool {
    authorize(role, true, true, operation).is_allowed()
}

/// Whether `caller` can see `asset` at all. Failing this yields NotFound, not
/// Forbidden.
pub fn can_view(caller: &Caller, asset: &Asset) -> bool {
    authorize(Some(caller.role), caller.owns(asset), asset.is_public, Operation::Retrieve).is_allowed()
}

/// Applies [`authorize`] to a concrete asset and maps a denial onto the error
/// taxonomy.
pub fn enforce(caller: &Caller, asset: &Asset, operation: Operation) -> AppResult<()> {
    if !can_view(caller, asset) {
        return Err(AppError::not_found("Asset not found"));
    }
    match authorize(Some(caller.role), caller.owns(asset), asset.is_public, operation) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(AppError::forbidden(format!(
            "Role {} may not {} this asset",
            caller.role,
            operation.as_str()
        ))),
    }
}

/// Rejects operations that are restricted to Admin.
pub fn require_admin(caller: &Caller, action: &str) -> AppResult<()> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("Admin privileges required to {}", action)))
    }
}

/// User-management mutations an Admin may attempt on an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountChange {
    Delete,
    ChangeRole { from: Role, to: Role },
}

/// An Admin may never delete their own account or move it off the Admin role.
pub fn guard_self_management(caller: &Caller, target_id: &str, change: AccountChange) -> AppResult<()> {
    if caller.id != target_id {
        return Ok(());
    }
    match change {
        AccountChange::Delete => Err(AppError::forbidden("You cannot delete your own account")),
        AccountChange::ChangeRole { from, to } if from != to => {
            Err(AppError::forbidden("You cannot change your own role"))
        }
        AccountChange::ChangeRole { .. } => Ok(()),
    }
}
