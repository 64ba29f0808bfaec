//! Core identifier types shared across the import pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// TypeId: numeric identifier of a directory object type
pub type TypeId = u16;

/// FieldId: numeric identifier of a field within an object type
pub type FieldId = u16;

/// ObjNum: per-type numeric identifier of a directory object
pub type ObjNum = u32;

/// A typed reference to one directory object on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invid {
    pub type_id: TypeId,
    pub num: ObjNum,
}

impl Invid {
    pub fn new(type_id: TypeId, num: ObjNum) -> Self {
        Self { type_id, num }
    }
}

impl fmt::Display for Invid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_id, self.num)
    }
}
