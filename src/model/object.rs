//! Object records and the object builder.

use super::field::FieldRecord;
use super::ParseCtx;
use crate::error::ImportError;
use crate::session::Handle;
use crate::types::{Invid, ObjNum, TypeId};
use crate::xml::{Element, XmlEvent};
use std::fmt;
use tracing::warn;

/// What the document asks to be done with an object element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionMode {
    /// No action attribute: create, or reuse a matching existing object.
    CreateOrEdit,
    /// Explicit `create`: force a new object even if the identity matches.
    Create,
    Edit,
    Delete,
    Inactivate,
}

impl ActionMode {
    fn from_attr(attr: Option<&str>) -> Result<Self, String> {
        match attr {
            None => Ok(ActionMode::CreateOrEdit),
            Some("create") => Ok(ActionMode::Create),
            Some("edit") => Ok(ActionMode::Edit),
            Some("delete") => Ok(ActionMode::Delete),
            Some("inactivate") => Ok(ActionMode::Inactivate),
            Some(other) => Err(other.to_string()),
        }
    }

    /// True when a missing server-side match is acceptable (the object will
    /// be created).
    pub fn may_create(&self) -> bool {
        matches!(self, ActionMode::CreateOrEdit | ActionMode::Create)
    }
}

/// One directory object to be created, edited, deleted or inactivated.
///
/// Built while parsing one `<object>` element; the remote handle is bound
/// by the upload layer and immutable once set; the record is discarded when
/// the import run completes.
#[derive(Debug)]
pub struct ObjectRecord {
    pub type_id: TypeId,
    pub type_name: String,

    /// Label-based identity (the `id` attribute)
    pub label: Option<String>,

    /// Numeric identity (the `num` attribute)
    pub num: Option<ObjNum>,

    pub action: ActionMode,

    /// True when this record was nested inside a reference field
    pub embedded: bool,

    /// Parsed fields, document order; one entry per distinct field name
    pub fields: Vec<FieldRecord>,

    /// Server identity, once resolved or assigned
    pub invid: Option<Invid>,

    /// Set when a label lookup has already come back empty
    pub known_non_existent: bool,

    /// Remote edit handle, bound while creating/locating
    pub handle: Option<Handle>,
}

impl ObjectRecord {
    /// Parse one `<object>` element, consuming events up to and including
    /// its close tag — also on error, so the rest of the document stays
    /// parseable.
    pub fn parse(
        ctx: &mut ParseCtx<'_>,
        open: &Element,
        embedded: bool,
    ) -> Result<ObjectRecord, ImportError> {
        let fail = |ctx: &mut ParseCtx<'_>, err: ImportError| -> Result<ObjectRecord, ImportError> {
            ctx.source.skip_to_close("object")?;
            Err(err)
        };

        let type_name = match open.attr_str("type") {
            Some(name) => name.to_string(),
            None => {
                return fail(
                    ctx,
                    ImportError::UnknownObjectType("<missing type attribute>".to_string()),
                )
            }
        };

        let type_id = match ctx.catalog.type_id(&type_name) {
            Some(id) => id,
            None => return fail(ctx, ImportError::UnknownObjectType(type_name)),
        };

        let action = match ActionMode::from_attr(open.attr_str("action")) {
            Ok(action) => action,
            Err(unknown) => {
                return fail(
                    ctx,
                    ImportError::BadValue {
                        field: "action".to_string(),
                        detail: format!("unknown action mode \"{}\"", unknown),
                    },
                )
            }
        };

        let label = open.attr_str("id").map(str::to_string);
        let num = match open.attr_str("num") {
            Some(raw) => match raw.parse::<ObjNum>() {
                Ok(n) => Some(n),
                Err(_) => {
                    return fail(
                        ctx,
                        ImportError::BadValue {
                            field: "num".to_string(),
                            detail: format!("malformed num attribute \"{}\"", raw),
                        },
                    )
                }
            },
            None => None,
        };

        if matches!(action, ActionMode::Delete | ActionMode::Inactivate) && !open.is_empty() {
            let action_name = if action == ActionMode::Delete {
                "delete"
            } else {
                "inactivate"
            };
            return fail(
                ctx,
                ImportError::NonEmptyDirective {
                    action: action_name.to_string(),
                },
            );
        }

        let mut record = ObjectRecord {
            type_id,
            type_name,
            label,
            num,
            action,
            embedded,
            fields: Vec::new(),
            invid: None,
            known_non_existent: false,
            handle: None,
        };

        loop {
            let event = ctx.source.next()?;

            if event.matches_close("object") {
                return Ok(record);
            }

            match &event {
                XmlEvent::Open(el) if el.name() == "field" => {
                    let el = el.clone();
                    match FieldRecord::parse(ctx, record.type_id, &el) {
                        Ok(Some(field)) => record.insert_field(field),
                        Ok(None) => {} // unknown field, already warned and consumed
                        Err(err) => return fail(ctx, err),
                    }
                }
                XmlEvent::Open(el) => {
                    warn!("unrecognized content in {}: {}", record, el);
                    let name = el.name().to_string();
                    ctx.source.skip_to_close(&name)?;
                }
                XmlEvent::Text(text) => {
                    warn!("unexpected character data in {}: {:?}", record, text);
                }
                XmlEvent::Close(name) => {
                    return fail(ctx, ImportError::MismatchedClose(name.clone()));
                }
                XmlEvent::EndOfDocument => {
                    return Err(ImportError::UnexpectedEnd(record.to_string()));
                }
            }
        }
    }

    /// Add a field record, replacing any earlier occurrence of the same
    /// field name.
    fn insert_field(&mut self, field: FieldRecord) {
        match self.fields.iter_mut().find(|f| f.name() == field.name()) {
            Some(slot) => *slot = field,
            None => self.fields.push(field),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldRecord> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Bind the server identity discovered for this record.
    pub fn set_invid(&mut self, invid: Invid) {
        self.invid = Some(invid);
        self.known_non_existent = false;
    }
}

impl fmt::Display for ObjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<object type=\"{}\"", self.type_name)?;
        if let Some(label) = &self.label {
            write!(f, " id=\"{}\"", label)?;
        }
        if let Some(num) = self.num {
            write!(f, " num=\"{}\"", num)?;
        }
        write!(f, ">")
    }
}
