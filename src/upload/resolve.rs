//! Reference resolution — phase 2 of the registration protocol.
//!
//! Runs strictly after every object (top-level and hoisted embedded) has
//! been created or located, so each token resolves to exactly one remote
//! invid or the run aborts. Label lookups are memoized in the object store;
//! each distinct (type, label) key hits the server at most once per run.

use super::store::{IdentityKey, ObjectStore, StoreEntry};
use super::UploadOrchestrator;
use crate::catalog::SchemaCatalog;
use crate::error::ImportError;
use crate::model::{FieldData, FieldValue, ObjectRecord, ReferenceToken, VectorValue};
use crate::session::{DirectorySession, Handle};
use crate::types::{Invid, TypeId};

impl UploadOrchestrator<'_> {
    /// Register every reference field of every pending object, in declared
    /// display order, resolving tokens as they are replayed.
    pub(super) fn register_reference_fields(&mut self) -> Result<(), ImportError> {
        let order: Vec<usize> = self
            .to_create
            .iter()
            .chain(self.to_edit.iter())
            .copied()
            .collect();

        for idx in order {
            self.checkpoint()?;
            let Some(handle) = self.objects[idx].handle.clone() else {
                continue;
            };
            let type_id = self.objects[idx].type_id;
            let catalog = self.catalog;

            for template in catalog.templates(type_id) {
                let Some(pos) = self.objects[idx]
                    .fields
                    .iter()
                    .position(|f| f.name() == template.name && f.is_reference())
                else {
                    continue;
                };
                self.register_reference_field(idx, pos, &handle)?;
            }
        }

        Ok(())
    }

    fn register_reference_field(
        &mut self,
        idx: usize,
        pos: usize,
        handle: &Handle,
    ) -> Result<(), ImportError> {
        let field_id = self.objects[idx].fields[pos].template.id;

        let Self {
            objects,
            store,
            session,
            catalog,
            ..
        } = self;
        let session: &dyn DirectorySession = *session;
        let catalog: &SchemaCatalog = *catalog;
        let objects: &[ObjectRecord] = objects.as_slice();

        match &objects[idx].fields[pos].data {
            FieldData::Reference(None) => session.set_scalar_field(handle, field_id, None),
            FieldData::Reference(Some(token)) => {
                let invid = resolve_token(token, objects, store, session, catalog)?;
                session.set_scalar_field(handle, field_id, Some(&FieldValue::Invid(invid)))
            }
            FieldData::Vector(data) => {
                if let Some(replace) = &data.replace {
                    let values = resolve_values(replace, objects, store, session, catalog)?;
                    return session.replace_vector_elements(handle, field_id, &values);
                }
                if !data.add.is_empty() {
                    let values = resolve_values(&data.add, objects, store, session, catalog)?;
                    session.add_vector_elements(handle, field_id, &values)?;
                }
                if !data.delete.is_empty() {
                    let values = resolve_values(&data.delete, objects, store, session, catalog)?;
                    session.delete_vector_elements(handle, field_id, &values)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Resolve one token to exactly one remote invid.
fn resolve_token(
    token: &ReferenceToken,
    objects: &[ObjectRecord],
    store: &mut ObjectStore,
    session: &dyn DirectorySession,
    catalog: &SchemaCatalog,
) -> Result<Invid, ImportError> {
    match token {
        ReferenceToken::ByNumber { target, num } => Ok(Invid::new(*target, *num)),

        ReferenceToken::Pending(index) => objects
            .get(*index)
            .and_then(|record| record.invid)
            .ok_or_else(|| {
                ImportError::Xml(format!(
                    "embedded object #{} was never created on the server",
                    index
                ))
            }),

        ReferenceToken::Embedded(record) => Err(ImportError::Xml(format!(
            "embedded {} was not hoisted into the pending set",
            record.type_name
        ))),

        ReferenceToken::ByLabel { target, label } => {
            let key = IdentityKey::Label(label.clone());

            if let Some(entry) = store.lookup(*target, &key) {
                return match entry {
                    StoreEntry::Record(index) => objects[index]
                        .invid
                        .ok_or_else(|| unresolved(catalog, *target, label)),
                    StoreEntry::Cached(invid) => Ok(invid),
                };
            }

            match session.locate_by_label(*target, label)? {
                Some(invid) => {
                    store.cache(*target, key, invid);
                    Ok(invid)
                }
                None => Err(unresolved(catalog, *target, label)),
            }
        }
    }
}

fn resolve_values(
    bucket: &[VectorValue],
    objects: &[ObjectRecord],
    store: &mut ObjectStore,
    session: &dyn DirectorySession,
    catalog: &SchemaCatalog,
) -> Result<Vec<FieldValue>, ImportError> {
    let mut values = Vec::with_capacity(bucket.len());
    for value in bucket {
        match value {
            VectorValue::Value(v) => values.push(v.clone()),
            VectorValue::Reference(token) => {
                let invid = resolve_token(token, objects, store, session, catalog)?;
                values.push(FieldValue::Invid(invid));
            }
        }
    }
    Ok(values)
}

fn unresolved(catalog: &SchemaCatalog, type_id: TypeId, label: &str) -> ImportError {
    ImportError::UnresolvedReference {
        type_name: catalog
            .type_name(type_id)
            .unwrap_or("<unknown type>")
            .to_string(),
        label: label.to_string(),
    }
}
