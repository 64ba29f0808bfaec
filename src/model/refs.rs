//! Deferred object references.

use super::object::ObjectRecord;
use crate::catalog::SchemaCatalog;
use crate::error::ImportError;
use crate::types::{ObjNum, TypeId};
use crate::xml::Element;
use std::fmt;

/// A deferred pointer inside a reference-kind field. Resolution happens in
/// the upload layer, strictly after all objects have had a chance to be
/// created.
#[derive(Debug)]
pub enum ReferenceToken {
    /// Resolve by label lookup, in-document first, then on the server.
    ByLabel { target: TypeId, label: String },

    /// The identity is fully determined by (type, number); no lookup needed.
    ByNumber { target: TypeId, num: ObjNum },

    /// An inline object definition to be created and then pointed to.
    /// Replaced by `Pending` once the record is moved into the run's
    /// pending-object set.
    Embedded(Box<ObjectRecord>),

    /// Index of a hoisted embedded record in the pending-object set.
    Pending(usize),
}

impl ReferenceToken {
    /// Parse an `<invid type id|num/>` element into a label or number token.
    pub fn from_invid_element(
        el: &Element,
        field: &str,
        catalog: &SchemaCatalog,
    ) -> Result<Self, ImportError> {
        if el.name() != "invid" {
            return Err(ImportError::BadValue {
                field: field.to_string(),
                detail: format!("expected <invid>, found {}", el),
            });
        }

        let type_name = el.attr_str("type").ok_or_else(|| ImportError::BadValue {
            field: field.to_string(),
            detail: format!("missing invid type attribute in {}", el),
        })?;

        let target = catalog
            .type_id(type_name)
            .ok_or_else(|| ImportError::BadValue {
                field: field.to_string(),
                detail: format!("unknown target type \"{}\" in {}", type_name, el),
            })?;

        if let Some(label) = el.attr_str("id") {
            return Ok(ReferenceToken::ByLabel {
                target,
                label: label.to_string(),
            });
        }

        match el.attr_int("num") {
            Some(num) if num >= 0 => Ok(ReferenceToken::ByNumber {
                target,
                num: num as ObjNum,
            }),
            _ => Err(ImportError::BadValue {
                field: field.to_string(),
                detail: format!("invid element carries neither id nor num: {}", el),
            }),
        }
    }
}

impl fmt::Display for ReferenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceToken::ByLabel { target, label } => {
                write!(f, "<invid type={} id=\"{}\"/>", target, label)
            }
            ReferenceToken::ByNumber { target, num } => {
                write!(f, "<invid type={} num={}/>", target, num)
            }
            ReferenceToken::Embedded(record) => write!(f, "<embedded {}>", record.type_name),
            ReferenceToken::Pending(idx) => write!(f, "<pending object #{}>", idx),
        }
    }
}
