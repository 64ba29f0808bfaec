//! Permission blocks.
//!
//! A permission-kind field holds one `PermissionTree` per object type: the
//! type-level entry plus per-field entries. Field names inside a permission
//! block are recorded verbatim; the upload layer resolves them to field ids
//! lazily, so permission parsing never fails on catalog ordering.

use crate::error::ImportError;
use crate::xml::{TokenSource, XmlEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// The four-bit access descriptor for one type or field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub viewable: bool,
    pub editable: bool,
    pub creatable: bool,
    pub deletable: bool,
}

impl PermissionEntry {
    /// Read a `perm` bit-string: an uppercase flag character grants, a
    /// lowercase character or absence denies.
    pub fn from_bits(bits: &str) -> Self {
        Self {
            viewable: bits.contains('V'),
            editable: bits.contains('E'),
            creatable: bits.contains('C'),
            deletable: bits.contains('D'),
        }
    }

    pub fn to_bits(&self) -> String {
        let mut out = String::with_capacity(4);
        out.push(if self.viewable { 'V' } else { 'v' });
        out.push(if self.editable { 'E' } else { 'e' });
        out.push(if self.creatable { 'C' } else { 'c' });
        out.push(if self.deletable { 'D' } else { 'd' });
        out
    }
}

impl fmt::Display for PermissionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bits())
    }
}

/// One object type's permission block: the type-level entry plus per-field
/// entries in document order.
#[derive(Debug, Clone)]
pub struct PermissionTree {
    pub type_name: String,
    pub entry: PermissionEntry,
    pub fields: Vec<(String, PermissionEntry)>,
}

/// Parse the per-type blocks inside an open `<permissions>` element,
/// consuming events up to and including `</permissions>`.
pub fn parse_permission_blocks(
    source: &mut TokenSource,
) -> Result<Vec<PermissionTree>, ImportError> {
    let mut trees = Vec::new();

    loop {
        let event = source.next()?;

        if event.matches_close("permissions") {
            return Ok(trees);
        }
        if event.is_end() {
            return Err(ImportError::UnexpectedEnd("permissions".to_string()));
        }

        match &event {
            XmlEvent::Open(el) if el.name() == "type" => {
                trees.push(parse_type_block(source, el.attr_str("name"), el.attr_str("perm"))?);
            }
            other => {
                warn!("unrecognized content in permissions block, skipping: {}", other);
                if let Some(el) = other.as_element() {
                    let name = el.name().to_string();
                    source.skip_to_close(&name)?;
                }
            }
        }
    }
}

/// Parse one `<type name perm>` block with its one-deep `<field name perm>`
/// rows, up to and including the matching close.
fn parse_type_block(
    source: &mut TokenSource,
    name: Option<&str>,
    perm: Option<&str>,
) -> Result<PermissionTree, ImportError> {
    let type_name = name.unwrap_or_else(|| {
        warn!("permission type block without a name attribute");
        ""
    });

    let entry = match perm {
        Some(bits) => PermissionEntry::from_bits(bits),
        None => {
            warn!("no perm attribute on permission block for \"{}\"", type_name);
            PermissionEntry::default()
        }
    };

    let mut fields = Vec::new();

    loop {
        let event = source.next()?;

        if event.matches_close("type") {
            return Ok(PermissionTree {
                type_name: type_name.to_string(),
                entry,
                fields,
            });
        }
        if event.is_end() {
            return Err(ImportError::UnexpectedEnd(format!(
                "permission block for {}",
                type_name
            )));
        }

        match &event {
            XmlEvent::Open(el) if el.name() == "field" => {
                let name = el.attr_str("name").map(str::to_string);
                let field_entry = el
                    .attr_str("perm")
                    .map(PermissionEntry::from_bits)
                    .unwrap_or_default();
                source.skip_to_close("field")?;
                match name {
                    Some(field_name) => fields.push((field_name, field_entry)),
                    None => warn!("permission field row without a name attribute, skipping"),
                }
            }
            other => {
                warn!(
                    "unrecognized row in permission block for \"{}\": {}",
                    type_name, other
                );
                if let Some(el) = other.as_element() {
                    let name = el.name().to_string();
                    source.skip_to_close(&name)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::TokenSource;

    fn parse(doc: &str) -> Vec<PermissionTree> {
        let mut source = TokenSource::from_string(doc, 8);
        let open = source.next().unwrap();
        assert!(open.matches("permissions"));
        parse_permission_blocks(&mut source).unwrap()
    }

    #[test]
    fn test_bit_string_case_rules() {
        let entry = PermissionEntry::from_bits("VEcd");
        assert!(entry.viewable);
        assert!(entry.editable);
        assert!(!entry.creatable);
        assert!(!entry.deletable);

        // absence denies just like lowercase
        let entry = PermissionEntry::from_bits("V");
        assert!(entry.viewable);
        assert!(!entry.editable);
    }

    #[test]
    fn test_round_trip_bits() {
        let entry = PermissionEntry::from_bits("VeCd");
        assert_eq!(PermissionEntry::from_bits(&entry.to_bits()), entry);
    }

    #[test]
    fn test_object_and_field_levels() {
        let trees = parse(
            "<permissions>\
               <type name=\"UserBase\" perm=\"VECD\">\
                 <field name=\"Name\" perm=\"Vecd\"/>\
                 <field name=\"Login Shell\" perm=\"VEcd\"/>\
               </type>\
               <type name=\"Group\" perm=\"Vecd\"/>\
             </permissions>",
        );

        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].type_name, "UserBase");
        assert!(trees[0].entry.deletable);
        assert_eq!(trees[0].fields.len(), 2);
        assert_eq!(trees[0].fields[0].0, "Name");
        assert!(trees[0].fields[0].1.viewable);
        assert!(!trees[0].fields[0].1.editable);

        assert_eq!(trees[1].type_name, "Group");
        assert!(trees[1].fields.is_empty());
    }

    #[test]
    fn test_unknown_field_names_still_recorded() {
        // catalog resolution is deferred to upload time
        let trees = parse(
            "<permissions>\
               <type name=\"UserBase\" perm=\"Vecd\">\
                 <field name=\"No Such Field\" perm=\"VEcd\"/>\
               </type>\
             </permissions>",
        );
        assert_eq!(trees[0].fields[0].0, "No Such Field");
    }

    #[test]
    fn test_unrecognized_rows_skipped() {
        let trees = parse(
            "<permissions>\
               <type name=\"Group\" perm=\"VEcd\">\
                 <bogus><deep/></bogus>\
                 <field name=\"Name\" perm=\"Vecd\"/>\
               </type>\
             </permissions>",
        );
        assert_eq!(trees[0].fields.len(), 1);
    }
}
