//! In-memory import model.
//!
//! One `ObjectRecord` per document object element, holding `FieldRecord`s
//! keyed by field name. Reference fields carry deferred `ReferenceToken`s
//! that the upload layer resolves after every object has had a chance to be
//! created.

pub mod field;
pub mod object;
pub mod perm;
pub mod refs;

use crate::catalog::SchemaCatalog;
use crate::xml::TokenSource;

pub use field::{FieldData, FieldRecord, FieldValue, PasswordSpec, VectorData, VectorValue};
pub use object::{ActionMode, ObjectRecord};
pub use perm::{PermissionEntry, PermissionTree};
pub use refs::ReferenceToken;

/// Shared context for the object and field builders: the token stream plus
/// the schema catalog, both passed explicitly.
pub struct ParseCtx<'a> {
    pub source: &'a mut TokenSource,
    pub catalog: &'a SchemaCatalog,
}

impl<'a> ParseCtx<'a> {
    pub fn new(source: &'a mut TokenSource, catalog: &'a SchemaCatalog) -> Self {
        Self { source, catalog }
    }
}
