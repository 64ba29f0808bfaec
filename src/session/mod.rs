//! Remote transactional session.
//!
//! `DirectorySession` is the RPC surface the upload layer drives: object
//! creation/location, field mutation, and transaction commit/abort. All
//! calls are synchronous and block the caller; the importer never overlaps
//! two mutations. `HttpSession` talks JSON over HTTP to a live server;
//! `MemorySession` backs tests and keeps the same semantics in process.

pub mod http;
pub mod memory;

pub use http::HttpSession;
pub use memory::MemorySession;

use crate::error::ImportError;
use crate::model::{FieldValue, PasswordSpec, PermissionEntry};
use crate::types::{FieldId, Invid, TypeId};

/// An object checked out for editing within the current transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub invid: Invid,
}

impl Handle {
    pub fn new(invid: Invid) -> Self {
        Self { invid }
    }
}

/// The remote call surface consumed by the upload orchestrator.
///
/// The session is implicitly inside one transaction from login until
/// `commit_transaction` or `abort_transaction`; only one import run drives
/// a session at a time.
pub trait DirectorySession: Send + Sync {
    /// Create a new object of the given type and check it out.
    fn create_object(&self, type_id: TypeId) -> Result<Handle, ImportError>;

    /// Check out a pre-existing object for editing.
    fn edit_object(&self, invid: Invid) -> Result<Handle, ImportError>;

    /// Look up an object by label. `None` means not found, not an error.
    fn locate_by_label(&self, type_id: TypeId, label: &str)
        -> Result<Option<Invid>, ImportError>;

    /// Set or clear a scalar field. `None` clears.
    fn set_scalar_field(
        &self,
        handle: &Handle,
        field: FieldId,
        value: Option<&FieldValue>,
    ) -> Result<(), ImportError>;

    /// Transmit all provided password forms; the server decides precedence.
    fn set_password(
        &self,
        handle: &Handle,
        field: FieldId,
        spec: &PasswordSpec,
    ) -> Result<(), ImportError>;

    fn add_vector_elements(
        &self,
        handle: &Handle,
        field: FieldId,
        values: &[FieldValue],
    ) -> Result<(), ImportError>;

    fn delete_vector_elements(
        &self,
        handle: &Handle,
        field: FieldId,
        values: &[FieldValue],
    ) -> Result<(), ImportError>;

    /// Replace the field's contents with exactly `values`, regardless of
    /// prior state.
    fn replace_vector_elements(
        &self,
        handle: &Handle,
        field: FieldId,
        values: &[FieldValue],
    ) -> Result<(), ImportError>;

    /// Set one permission row on a permission-matrix field.
    /// `target_field == None` addresses the type-level entry.
    fn set_permission(
        &self,
        handle: &Handle,
        field: FieldId,
        target_type: TypeId,
        target_field: Option<FieldId>,
        entry: PermissionEntry,
    ) -> Result<(), ImportError>;

    fn remove_object(&self, invid: Invid) -> Result<(), ImportError>;

    fn inactivate_object(&self, invid: Invid) -> Result<(), ImportError>;

    /// Commit the transaction, optionally with an operator comment.
    fn commit_transaction(&self, comment: Option<&str>) -> Result<(), ImportError>;

    /// Abort the transaction, undoing everything issued so far. Infallible
    /// by contract; a session that cannot abort logs and gives up.
    fn abort_transaction(&self);
}
