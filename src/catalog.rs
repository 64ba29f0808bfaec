//! Schema catalog: the read-mostly mapping from object-type and field names
//! to numeric ids and declared field kinds.
//!
//! Every component of the pipeline receives the catalog as an explicit
//! shared reference; there is no process-wide lookup table. The catalog is
//! either assembled locally (tests, fixtures) or downloaded from the server
//! at login.

use crate::types::{FieldId, TypeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The declared kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Boolean,
    Numeric,
    Date,
    Float,
    String,
    Password,
    Ip,
    Invid,
    Permission,
}

impl FieldKind {
    /// Tag of the value element expected inside a field of this kind.
    pub fn value_tag(&self) -> &'static str {
        match self {
            FieldKind::Boolean => "boolean",
            FieldKind::Numeric => "int",
            FieldKind::Date => "date",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Password => "password",
            FieldKind::Ip => "ip",
            FieldKind::Invid => "invid",
            FieldKind::Permission => "permissions",
        }
    }
}

/// Declaration record for one field of an object type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTemplate {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,

    /// Whether the field holds a vector of values
    #[serde(default)]
    pub is_vector: bool,

    /// For invid fields: whether referenced objects are embedded in place
    #[serde(default)]
    pub is_embedded: bool,

    /// For invid fields: the type referenced values must carry
    #[serde(default)]
    pub target_type: Option<TypeId>,

    /// Whether the field is one of the server's built-in bookkeeping fields
    #[serde(default)]
    pub built_in: bool,
}

/// One object type: its id, name and field declarations in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectTypeDef {
    pub id: TypeId,
    pub name: String,

    /// Field templates in the type's declared display order
    pub fields: Vec<FieldTemplate>,
}

impl ObjectTypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldTemplate> {
        self.fields.iter().find(|t| t.name == name)
    }
}

/// The schema catalog shared across the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    types: Vec<ObjectTypeDef>,

    #[serde(skip)]
    by_name: HashMap<String, usize>,

    #[serde(skip)]
    by_id: HashMap<TypeId, usize>,
}

impl SchemaCatalog {
    pub fn new(types: Vec<ObjectTypeDef>) -> Self {
        let mut catalog = Self {
            types,
            by_name: HashMap::new(),
            by_id: HashMap::new(),
        };
        catalog.reindex();
        catalog
    }

    /// Rebuild the name/id indexes; required after deserialization.
    pub fn reindex(&mut self) {
        self.by_name.clear();
        self.by_id.clear();
        for (i, def) in self.types.iter().enumerate() {
            self.by_name.insert(def.name.clone(), i);
            self.by_id.insert(def.id, i);
        }
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).map(|&i| self.types[i].id)
    }

    pub fn type_name(&self, id: TypeId) -> Option<&str> {
        self.by_id.get(&id).map(|&i| self.types[i].name.as_str())
    }

    pub fn type_def(&self, id: TypeId) -> Option<&ObjectTypeDef> {
        self.by_id.get(&id).map(|&i| &self.types[i])
    }

    /// Field declaration lookup by (type id, field name).
    pub fn field_template(&self, type_id: TypeId, field_name: &str) -> Option<&FieldTemplate> {
        self.type_def(type_id).and_then(|def| def.field(field_name))
    }

    /// Field templates of a type, in declared display order.
    pub fn templates(&self, type_id: TypeId) -> &[FieldTemplate] {
        self.type_def(type_id).map(|d| d.fields.as_slice()).unwrap_or(&[])
    }

    pub fn types(&self) -> &[ObjectTypeDef] {
        &self.types
    }
}

/// Incremental catalog assembly, used by tests and fixtures.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    types: Vec<ObjectTypeDef>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_type(mut self, id: TypeId, name: &str, fields: Vec<FieldTemplate>) -> Self {
        self.types.push(ObjectTypeDef {
            id,
            name: name.to_string(),
            fields,
        });
        self
    }

    pub fn build(self) -> SchemaCatalog {
        SchemaCatalog::new(self.types)
    }
}

/// Shorthand for a scalar field template.
pub fn scalar(id: FieldId, name: &str, kind: FieldKind) -> FieldTemplate {
    FieldTemplate {
        id,
        name: name.to_string(),
        kind,
        is_vector: false,
        is_embedded: false,
        target_type: None,
        built_in: false,
    }
}

/// Shorthand for a vector field template.
pub fn vector(id: FieldId, name: &str, kind: FieldKind) -> FieldTemplate {
    FieldTemplate {
        is_vector: true,
        ..scalar(id, name, kind)
    }
}

/// Shorthand for a reference field template.
pub fn reference(id: FieldId, name: &str, target: TypeId, is_vector: bool) -> FieldTemplate {
    FieldTemplate {
        is_vector,
        target_type: Some(target),
        ..scalar(id, name, FieldKind::Invid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchemaCatalog {
        CatalogBuilder::new()
            .object_type(
                1,
                "UserBase",
                vec![
                    scalar(100, "Name", FieldKind::String),
                    scalar(101, "Login Shell", FieldKind::String),
                    reference(102, "Groups", 2, true),
                ],
            )
            .object_type(2, "Group", vec![scalar(100, "Name", FieldKind::String)])
            .build()
    }

    #[test]
    fn test_type_lookup_both_ways() {
        let catalog = sample();
        assert_eq!(catalog.type_id("UserBase"), Some(1));
        assert_eq!(catalog.type_name(2), Some("Group"));
        assert_eq!(catalog.type_id("Printer"), None);
    }

    #[test]
    fn test_field_template_lookup() {
        let catalog = sample();
        let tmpl = catalog.field_template(1, "Groups").unwrap();
        assert_eq!(tmpl.kind, FieldKind::Invid);
        assert!(tmpl.is_vector);
        assert_eq!(tmpl.target_type, Some(2));
        assert!(catalog.field_template(1, "Shoe Size").is_none());
    }

    #[test]
    fn test_templates_preserve_display_order() {
        let catalog = sample();
        let names: Vec<_> = catalog.templates(1).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Name", "Login Shell", "Groups"]);
    }

    #[test]
    fn test_reindex_after_deserialize() {
        let catalog = sample();
        let json = serde_json::to_string(&catalog).unwrap();
        let mut restored: SchemaCatalog = serde_json::from_str(&json).unwrap();
        restored.reindex();
        assert_eq!(restored.type_id("Group"), Some(2));
    }
}
