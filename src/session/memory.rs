//! In-process session with real transaction semantics.
//!
//! Backs the integration tests and keeps a call journal so tests can assert
//! call ordering (object creation before field registration, abort on
//! failure). Vector mutations follow the server contract: `add` is a union,
//! `delete` of a missing value is a no-op, `replace` leaves exactly the
//! given values.

use super::{DirectorySession, Handle};
use crate::error::ImportError;
use crate::model::{FieldValue, PasswordSpec, PermissionEntry};
use crate::types::{FieldId, Invid, ObjNum, TypeId};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
struct Store {
    objects: HashMap<Invid, TypeId>,
    labels: HashMap<(TypeId, String), Invid>,
    scalars: HashMap<(Invid, FieldId), Option<FieldValue>>,
    vectors: HashMap<(Invid, FieldId), Vec<FieldValue>>,
    passwords: HashMap<(Invid, FieldId), PasswordSpec>,
    perms: HashMap<(Invid, FieldId), Vec<(TypeId, Option<FieldId>, PermissionEntry)>>,
    inactive: Vec<Invid>,
}

#[derive(Debug, Default)]
struct Inner {
    next_num: HashMap<TypeId, ObjNum>,
    committed: Store,
    staged: Store,
    commit_count: usize,
    abort_count: usize,
    calls: Vec<String>,
    fail_call: Option<String>,
}

/// In-memory `DirectorySession`.
#[derive(Debug, Default)]
pub struct MemorySession {
    inner: RwLock<Inner>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-existing labeled object into the committed state, outside
    /// any transaction. Returns its invid.
    pub fn seed_object(&self, type_id: TypeId, label: &str) -> Invid {
        let mut inner = self.inner.write();
        let num = inner.next_num.entry(type_id).or_insert(1000);
        let invid = Invid::new(type_id, *num);
        *num += 1;
        inner.committed.objects.insert(invid, type_id);
        inner
            .committed
            .labels
            .insert((type_id, label.to_string()), invid);
        inner.staged = inner.committed.clone();
        invid
    }

    /// Make the named call fail with a server diagnostic.
    pub fn fail_on(&self, call: &str) {
        self.inner.write().fail_call = Some(call.to_string());
    }

    /// The journal of calls issued, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.read().calls.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.inner.read().commit_count
    }

    pub fn abort_count(&self) -> usize {
        self.inner.read().abort_count
    }

    /// Committed scalar value of a field, if any was set.
    pub fn scalar_value(&self, invid: Invid, field: FieldId) -> Option<Option<FieldValue>> {
        self.inner.read().committed.scalars.get(&(invid, field)).cloned()
    }

    /// Committed vector contents of a field.
    pub fn vector_values(&self, invid: Invid, field: FieldId) -> Vec<FieldValue> {
        self.inner
            .read()
            .committed
            .vectors
            .get(&(invid, field))
            .cloned()
            .unwrap_or_default()
    }

    pub fn password_value(&self, invid: Invid, field: FieldId) -> Option<PasswordSpec> {
        self.inner.read().committed.passwords.get(&(invid, field)).cloned()
    }

    pub fn permission_rows(
        &self,
        invid: Invid,
        field: FieldId,
    ) -> Vec<(TypeId, Option<FieldId>, PermissionEntry)> {
        self.inner
            .read()
            .committed
            .perms
            .get(&(invid, field))
            .cloned()
            .unwrap_or_default()
    }

    pub fn object_exists(&self, invid: Invid) -> bool {
        self.inner.read().committed.objects.contains_key(&invid)
    }

    pub fn is_inactive(&self, invid: Invid) -> bool {
        self.inner.read().committed.inactive.contains(&invid)
    }

    /// Invids of committed objects of a type, in creation order.
    pub fn objects_of_type(&self, type_id: TypeId) -> Vec<Invid> {
        let inner = self.inner.read();
        let mut invids: Vec<Invid> = inner
            .committed
            .objects
            .iter()
            .filter(|(_, t)| **t == type_id)
            .map(|(invid, _)| *invid)
            .collect();
        invids.sort_by_key(|i| i.num);
        invids
    }

    fn record_call(&self, name: &'static str, detail: String) -> Result<(), ImportError> {
        let mut inner = self.inner.write();
        inner.calls.push(format!("{}{}", name, detail));
        if inner.fail_call.as_deref() == Some(name) {
            return Err(ImportError::remote(name, "injected failure"));
        }
        Ok(())
    }

    fn require_object(inner: &Inner, invid: Invid, call: &'static str) -> Result<(), ImportError> {
        if inner.staged.objects.contains_key(&invid) {
            Ok(())
        } else {
            Err(ImportError::remote(call, format!("no such object {}", invid)))
        }
    }
}

impl DirectorySession for MemorySession {
    fn create_object(&self, type_id: TypeId) -> Result<Handle, ImportError> {
        self.record_call("createObject", format!("({})", type_id))?;
        let mut inner = self.inner.write();
        let num = inner.next_num.entry(type_id).or_insert(1000);
        let invid = Invid::new(type_id, *num);
        *num += 1;
        inner.staged.objects.insert(invid, type_id);
        Ok(Handle::new(invid))
    }

    fn edit_object(&self, invid: Invid) -> Result<Handle, ImportError> {
        self.record_call("editObject", format!("({})", invid))?;
        let inner = self.inner.read();
        Self::require_object(&inner, invid, "editObject")?;
        Ok(Handle::new(invid))
    }

    fn locate_by_label(
        &self,
        type_id: TypeId,
        label: &str,
    ) -> Result<Option<Invid>, ImportError> {
        self.record_call("locateByLabel", format!("({}, {})", type_id, label))?;
        let inner = self.inner.read();
        Ok(inner.staged.labels.get(&(type_id, label.to_string())).copied())
    }

    fn set_scalar_field(
        &self,
        handle: &Handle,
        field: FieldId,
        value: Option<&FieldValue>,
    ) -> Result<(), ImportError> {
        self.record_call("setScalarField", format!("({}, {})", handle.invid, field))?;
        let mut inner = self.inner.write();
        Self::require_object(&inner, handle.invid, "setScalarField")?;
        inner
            .staged
            .scalars
            .insert((handle.invid, field), value.cloned());
        Ok(())
    }

    fn set_password(
        &self,
        handle: &Handle,
        field: FieldId,
        spec: &PasswordSpec,
    ) -> Result<(), ImportError> {
        self.record_call("setPassword", format!("({}, {})", handle.invid, field))?;
        let mut inner = self.inner.write();
        Self::require_object(&inner, handle.invid, "setPassword")?;
        inner
            .staged
            .passwords
            .insert((handle.invid, field), spec.clone());
        Ok(())
    }

    fn add_vector_elements(
        &self,
        handle: &Handle,
        field: FieldId,
        values: &[FieldValue],
    ) -> Result<(), ImportError> {
        self.record_call("addVectorElements", format!("({}, {})", handle.invid, field))?;
        let mut inner = self.inner.write();
        Self::require_object(&inner, handle.invid, "addVectorElements")?;
        let vector = inner.staged.vectors.entry((handle.invid, field)).or_default();
        for value in values {
            if !vector.contains(value) {
                vector.push(value.clone());
            }
        }
        Ok(())
    }

    fn delete_vector_elements(
        &self,
        handle: &Handle,
        field: FieldId,
        values: &[FieldValue],
    ) -> Result<(), ImportError> {
        self.record_call("deleteVectorElements", format!("({}, {})", handle.invid, field))?;
        let mut inner = self.inner.write();
        Self::require_object(&inner, handle.invid, "deleteVectorElements")?;
        let vector = inner.staged.vectors.entry((handle.invid, field)).or_default();
        vector.retain(|existing| !values.contains(existing));
        Ok(())
    }

    fn replace_vector_elements(
        &self,
        handle: &Handle,
        field: FieldId,
        values: &[FieldValue],
    ) -> Result<(), ImportError> {
        self.record_call("replaceVectorElements", format!("({}, {})", handle.invid, field))?;
        let mut inner = self.inner.write();
        Self::require_object(&inner, handle.invid, "replaceVectorElements")?;
        inner
            .staged
            .vectors
            .insert((handle.invid, field), values.to_vec());
        Ok(())
    }

    fn set_permission(
        &self,
        handle: &Handle,
        field: FieldId,
        target_type: TypeId,
        target_field: Option<FieldId>,
        entry: PermissionEntry,
    ) -> Result<(), ImportError> {
        self.record_call("setPermission", format!("({}, {})", handle.invid, field))?;
        let mut inner = self.inner.write();
        Self::require_object(&inner, handle.invid, "setPermission")?;
        let rows = inner.staged.perms.entry((handle.invid, field)).or_default();
        rows.retain(|(t, f, _)| !(*t == target_type && *f == target_field));
        rows.push((target_type, target_field, entry));
        Ok(())
    }

    fn remove_object(&self, invid: Invid) -> Result<(), ImportError> {
        self.record_call("removeObject", format!("({})", invid))?;
        let mut inner = self.inner.write();
        Self::require_object(&inner, invid, "removeObject")?;
        inner.staged.objects.remove(&invid);
        inner.staged.labels.retain(|_, target| *target != invid);
        inner.staged.scalars.retain(|(owner, _), _| *owner != invid);
        inner.staged.vectors.retain(|(owner, _), _| *owner != invid);
        inner.staged.passwords.retain(|(owner, _), _| *owner != invid);
        inner.staged.perms.retain(|(owner, _), _| *owner != invid);
        Ok(())
    }

    fn inactivate_object(&self, invid: Invid) -> Result<(), ImportError> {
        self.record_call("inactivateObject", format!("({})", invid))?;
        let mut inner = self.inner.write();
        Self::require_object(&inner, invid, "inactivateObject")?;
        if !inner.staged.inactive.contains(&invid) {
            inner.staged.inactive.push(invid);
        }
        Ok(())
    }

    fn commit_transaction(&self, _comment: Option<&str>) -> Result<(), ImportError> {
        self.record_call("commitTransaction", String::new())?;
        let mut inner = self.inner.write();
        inner.committed = inner.staged.clone();
        inner.commit_count += 1;
        Ok(())
    }

    fn abort_transaction(&self) {
        let mut inner = self.inner.write();
        inner.calls.push("abortTransaction".to_string());
        inner.staged = inner.committed.clone();
        inner.abort_count += 1;
    }
}
