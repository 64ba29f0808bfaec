//! Upload orchestrator.
//!
//! Drives one import run end to end: parse the whole document into object
//! records, resolve identities, create or locate every object, register
//! non-reference fields in declared display order, then reference fields
//! once every referenced object exists, apply delete/inactivate directives,
//! and commit. The first hard failure at any step halts further calls,
//! aborts the remote transaction once, and fails the run; there is no
//! partial-commit outcome.

pub mod resolve;
pub mod store;

use crate::catalog::SchemaCatalog;
use crate::error::ImportError;
use crate::model::{
    ActionMode, FieldData, FieldRecord, FieldValue, ObjectRecord, ParseCtx, ReferenceToken,
    VectorValue,
};
use crate::session::{DirectorySession, Handle};
use crate::types::Invid;
use crate::xml::{TokenSource, XmlEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use store::{IdentityKey, ObjectStore};
use tracing::{debug, info, warn};

/// State of one import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Parsing,
    CreatingObjects,
    RegisteringNonReferenceFields,
    RegisteringReferenceFields,
    Committing,
    Committed,
    Aborted,
}

/// Per-type operation counts reported after a successful commit.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub objects_seen: usize,
    pub created: HashMap<String, usize>,
    pub edited: HashMap<String, usize>,
    pub deleted: HashMap<String, usize>,
    pub inactivated: HashMap<String, usize>,
}

pub struct UploadOrchestrator<'a> {
    session: &'a dyn DirectorySession,
    catalog: &'a SchemaCatalog,
    phase: Phase,

    /// The pending-object set: top-level records plus hoisted embedded ones
    objects: Vec<ObjectRecord>,

    to_create: Vec<usize>,
    to_edit: Vec<usize>,
    to_delete: Vec<usize>,
    to_inactivate: Vec<usize>,

    store: ObjectStore,
    comment: Option<String>,
    cancel: Arc<AtomicBool>,
    summary: ImportSummary,
}

impl<'a> UploadOrchestrator<'a> {
    pub fn new(session: &'a dyn DirectorySession, catalog: &'a SchemaCatalog) -> Self {
        Self {
            session,
            catalog,
            phase: Phase::Idle,
            objects: Vec::new(),
            to_create: Vec::new(),
            to_edit: Vec::new(),
            to_delete: Vec::new(),
            to_inactivate: Vec::new(),
            store: ObjectStore::new(),
            comment: None,
            cancel: Arc::new(AtomicBool::new(false)),
            summary: ImportSummary::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Flag an operator can raise from another thread to stop the run at
    /// the next checkpoint.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run one import to completion. Every failure path converges here:
    /// stop issuing calls, abort the remote transaction once, report the
    /// first hard error.
    pub fn run(&mut self, source: &mut TokenSource) -> Result<ImportSummary, ImportError> {
        match self.execute(source) {
            Ok(()) => {
                self.phase = Phase::Committed;
                self.log_summary();
                Ok(self.summary.clone())
            }
            Err(err) => {
                warn!("errors encountered, aborting transaction: {}", err);
                self.session.abort_transaction();
                self.phase = Phase::Aborted;
                Err(err)
            }
        }
    }

    fn execute(&mut self, source: &mut TokenSource) -> Result<(), ImportError> {
        self.phase = Phase::Parsing;
        self.parse_document(source)?;
        info!(
            "done scanning document, integrating transaction for {} object element(s)",
            self.summary.objects_seen
        );

        self.knit_identities()?;

        self.phase = Phase::CreatingObjects;
        self.create_objects()?;

        self.phase = Phase::RegisteringNonReferenceFields;
        self.register_value_fields()?;

        self.phase = Phase::RegisteringReferenceFields;
        self.register_reference_fields()?;

        self.apply_directives()?;

        self.phase = Phase::Committing;
        info!("committing transaction");
        self.session
            .commit_transaction(self.comment.as_deref())
            .map_err(|err| match err {
                ImportError::Remote { message, .. } => ImportError::CommitFailed(message),
                other => other,
            })?;

        Ok(())
    }

    fn checkpoint(&self) -> Result<(), ImportError> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive the object builder across the whole input. Fatal-object errors
    /// discard the object and keep scanning (no mutation has been issued
    /// yet); the run still fails afterwards on the first one recorded.
    fn parse_document(&mut self, source: &mut TokenSource) -> Result<(), ImportError> {
        let mut first_object_error: Option<ImportError> = None;

        loop {
            self.checkpoint()?;
            let event = source.next()?;

            match &event {
                XmlEvent::Open(el) => match el.name() {
                    "directory" | "data" => {} // section wrappers
                    "schema" => {
                        info!("schema section present; validating structure only");
                        source.skip_to_close("schema")?;
                    }
                    "comment" => {
                        self.comment = read_comment(source)?;
                    }
                    "object" => {
                        let el = el.clone();
                        let mut ctx = ParseCtx::new(source, self.catalog);
                        match ObjectRecord::parse(&mut ctx, &el, false) {
                            Ok(record) => self.enqueue_record(record)?,
                            Err(err) if err.is_object_local() => {
                                warn!("discarding object: {}", err);
                                first_object_error.get_or_insert(err);
                            }
                            Err(err) => return Err(err),
                        }
                        self.summary.objects_seen += 1;
                        if self.summary.objects_seen % 10 == 0 {
                            info!("scanned {} objects", self.summary.objects_seen);
                        }
                    }
                    other => {
                        warn!("unrecognized element at document level: <{}>", other);
                        source.skip_to_close(&other.to_string())?;
                    }
                },
                XmlEvent::Close(_) => {} // section wrappers closing
                XmlEvent::Text(text) => {
                    warn!("stray character data in document: {:?}", text);
                }
                XmlEvent::EndOfDocument => break,
            }
        }

        match first_object_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Queue a parsed record: hoist any embedded definitions into the
    /// pending set, index the record's identity, and route it by action.
    fn enqueue_record(&mut self, mut record: ObjectRecord) -> Result<(), ImportError> {
        hoist_embedded(&mut self.objects, &mut self.to_create, &mut record);

        let index = self.objects.len();
        let description = record.to_string();

        // the id attribute takes precedence as the identity key
        if let Some(label) = &record.label {
            self.store.store_record(
                record.type_id,
                IdentityKey::Label(label.clone()),
                index,
                &description,
            )?;
        } else if let Some(num) = record.num {
            self.store
                .store_record(record.type_id, IdentityKey::Num(num), index, &description)?;
        }

        match record.action {
            ActionMode::CreateOrEdit | ActionMode::Create => self.to_create.push(index),
            ActionMode::Edit => self.to_edit.push(index),
            ActionMode::Delete => self.to_delete.push(index),
            ActionMode::Inactivate => self.to_inactivate.push(index),
        }

        self.objects.push(record);
        Ok(())
    }

    /// Resolve every record's identity before any mutation is issued, so
    /// label lookups cannot be skewed by this run's own edits, and records
    /// that must pre-exist fail fast.
    fn knit_identities(&mut self) -> Result<(), ImportError> {
        for idx in 0..self.objects.len() {
            let (type_id, label, num, action) = {
                let record = &self.objects[idx];
                (
                    record.type_id,
                    record.label.clone(),
                    record.num,
                    record.action,
                )
            };

            if self.objects[idx].invid.is_some() {
                continue;
            }

            if let Some(num) = num {
                // a numeric identity is taken at face value
                self.objects[idx].set_invid(Invid::new(type_id, num));
                continue;
            }

            let Some(label) = label else { continue };

            if action == ActionMode::Create {
                // forced creation never reuses a server match
                continue;
            }

            match self.session.locate_by_label(type_id, &label)? {
                Some(invid) => self.objects[idx].set_invid(invid),
                None => {
                    self.objects[idx].known_non_existent = true;
                    if !action.may_create() {
                        return Err(ImportError::NoSuchObject {
                            type_name: self.objects[idx].type_name.clone(),
                            label,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Phase 0: bind a remote handle to every record that needs one.
    fn create_objects(&mut self) -> Result<(), ImportError> {
        for idx in self.to_create.clone() {
            self.checkpoint()?;
            let (type_id, type_name, force, invid) = {
                let record = &self.objects[idx];
                (
                    record.type_id,
                    record.type_name.clone(),
                    record.action == ActionMode::Create,
                    record.invid,
                )
            };

            match invid {
                Some(invid) if !force => {
                    debug!("editing pre-existing {}", self.objects[idx]);
                    let handle = self.session.edit_object(invid)?;
                    self.objects[idx].handle = Some(handle);
                    *self.summary.edited.entry(type_name).or_insert(0) += 1;
                }
                _ => {
                    debug!("creating {}", self.objects[idx]);
                    let handle = self.session.create_object(type_id)?;
                    self.objects[idx].set_invid(handle.invid);
                    self.objects[idx].handle = Some(handle);
                    *self.summary.created.entry(type_name).or_insert(0) += 1;
                }
            }
        }

        for idx in self.to_edit.clone() {
            self.checkpoint()?;
            let record = &self.objects[idx];
            let invid = record.invid.ok_or_else(|| ImportError::NoSuchObject {
                type_name: record.type_name.clone(),
                label: record.label.clone().unwrap_or_default(),
            })?;
            let type_name = record.type_name.clone();
            let handle = self.session.edit_object(invid)?;
            self.objects[idx].handle = Some(handle);
            *self.summary.edited.entry(type_name).or_insert(0) += 1;
        }

        Ok(())
    }

    /// Phase 1: every field that references no other object, in the owning
    /// type's declared display order — server-side validation may depend on
    /// earlier-declared fields being set first.
    fn register_value_fields(&self) -> Result<(), ImportError> {
        for &idx in self.to_create.iter().chain(self.to_edit.iter()) {
            self.checkpoint()?;
            let record = &self.objects[idx];
            let Some(handle) = record.handle.as_ref() else {
                continue;
            };

            for template in self.catalog.templates(record.type_id) {
                let Some(field) = record.field(&template.name) else {
                    continue;
                };
                if field.is_reference() {
                    continue;
                }
                self.register_value_field(handle, field)?;
            }
        }

        Ok(())
    }

    fn register_value_field(
        &self,
        handle: &Handle,
        field: &FieldRecord,
    ) -> Result<(), ImportError> {
        let field_id = field.template.id;

        match &field.data {
            FieldData::Scalar(value) => {
                self.session
                    .set_scalar_field(handle, field_id, value.as_ref())
            }
            FieldData::Password(spec) => self.session.set_password(handle, field_id, spec),
            FieldData::Vector(data) => {
                if let Some(replace) = &data.replace {
                    return self.session.replace_vector_elements(
                        handle,
                        field_id,
                        &literal_values(field, replace),
                    );
                }
                if !data.add.is_empty() {
                    self.session.add_vector_elements(
                        handle,
                        field_id,
                        &literal_values(field, &data.add),
                    )?;
                }
                if !data.delete.is_empty() {
                    self.session.delete_vector_elements(
                        handle,
                        field_id,
                        &literal_values(field, &data.delete),
                    )?;
                }
                Ok(())
            }
            FieldData::Permissions(trees) => {
                for tree in trees {
                    // type and field names were recorded verbatim at parse
                    // time; resolve them against the catalog only now
                    let target_type = self.catalog.type_id(&tree.type_name).ok_or_else(|| {
                        ImportError::UnknownPermissionTarget {
                            type_name: tree.type_name.clone(),
                            field: None,
                        }
                    })?;
                    self.session
                        .set_permission(handle, field_id, target_type, None, tree.entry)?;

                    for (field_name, entry) in &tree.fields {
                        let target_field = self
                            .catalog
                            .field_template(target_type, field_name)
                            .ok_or_else(|| ImportError::UnknownPermissionTarget {
                                type_name: tree.type_name.clone(),
                                field: Some(field_name.clone()),
                            })?;
                        self.session.set_permission(
                            handle,
                            field_id,
                            target_type,
                            Some(target_field.id),
                            *entry,
                        )?;
                    }
                }
                Ok(())
            }
            FieldData::Reference(_) => Ok(()), // phase 2
        }
    }

    /// Deletes and inactivates run last, after all field registration.
    fn apply_directives(&mut self) -> Result<(), ImportError> {
        for idx in self.to_inactivate.clone() {
            self.checkpoint()?;
            let (invid, type_name) = self.directive_target(idx)?;
            self.session.inactivate_object(invid)?;
            *self.summary.inactivated.entry(type_name).or_insert(0) += 1;
        }

        for idx in self.to_delete.clone() {
            self.checkpoint()?;
            let (invid, type_name) = self.directive_target(idx)?;
            self.session.remove_object(invid)?;
            *self.summary.deleted.entry(type_name).or_insert(0) += 1;
        }

        Ok(())
    }

    fn directive_target(&self, idx: usize) -> Result<(Invid, String), ImportError> {
        let record = &self.objects[idx];
        let invid = record.invid.ok_or_else(|| ImportError::NoSuchObject {
            type_name: record.type_name.clone(),
            label: record.label.clone().unwrap_or_default(),
        })?;
        Ok((invid, record.type_name.clone()))
    }

    fn log_summary(&self) {
        let sections: [(&str, &HashMap<String, usize>); 4] = [
            ("created", &self.summary.created),
            ("edited", &self.summary.edited),
            ("deleted", &self.summary.deleted),
            ("inactivated", &self.summary.inactivated),
        ];
        for (verb, counts) in sections {
            if !counts.is_empty() {
                let mut items: Vec<_> = counts.iter().collect();
                items.sort();
                for (type_name, count) in items {
                    info!("objects {}: {} {}", verb, count, type_name);
                }
            }
        }
        info!("transaction successfully committed");
    }
}

/// Move every embedded object definition out of `record`'s reference fields
/// into the pending set, depth-first, leaving `Pending` indexes behind.
fn hoist_embedded(
    objects: &mut Vec<ObjectRecord>,
    to_create: &mut Vec<usize>,
    record: &mut ObjectRecord,
) {
    for field in &mut record.fields {
        let FieldData::Vector(data) = &mut field.data else {
            continue;
        };

        let buckets = data
            .replace
            .iter_mut()
            .flatten()
            .chain(data.add.iter_mut())
            .chain(data.delete.iter_mut());

        for value in buckets {
            let VectorValue::Reference(token) = value else {
                continue;
            };
            if !matches!(token, ReferenceToken::Embedded(_)) {
                continue;
            }

            // placeholder index, patched right below once we know it
            let taken = std::mem::replace(token, ReferenceToken::Pending(0));
            let ReferenceToken::Embedded(boxed) = taken else {
                unreachable!("checked variant above");
            };

            let mut inner = *boxed;
            hoist_embedded(objects, to_create, &mut inner);

            let index = objects.len();
            objects.push(inner);
            to_create.push(index);
            *token = ReferenceToken::Pending(index);
        }
    }
}

/// Literal (non-reference) vector values, cloned for the wire.
fn literal_values(field: &FieldRecord, bucket: &[VectorValue]) -> Vec<FieldValue> {
    bucket
        .iter()
        .filter_map(|value| match value {
            VectorValue::Value(v) => Some(v.clone()),
            VectorValue::Reference(token) => {
                warn!(
                    "reference value {} in non-reference field \"{}\", dropping",
                    token,
                    field.name()
                );
                None
            }
        })
        .collect()
}

/// Read the text content of an open `<comment>` element.
fn read_comment(source: &mut TokenSource) -> Result<Option<String>, ImportError> {
    let mut text = None;
    loop {
        let event = source.next()?;
        match event {
            XmlEvent::Text(content) => text = Some(content),
            ref ev if ev.matches_close("comment") => return Ok(text),
            XmlEvent::EndOfDocument => {
                return Err(ImportError::UnexpectedEnd("comment".to_string()))
            }
            other => warn!("unexpected content in comment element: {}", other),
        }
    }
}

/// Structural validation for dry runs: walk the document without a catalog
/// or session, counting object and field elements and verifying required
/// attributes are present. Tokenizer errors (malformed markup, mismatched
/// tags) surface as failures.
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    pub objects: usize,
    pub fields: usize,
    pub has_schema: bool,
}

pub fn validate_structure(source: &mut TokenSource) -> Result<ValidationReport, ImportError> {
    let mut report = ValidationReport::default();

    loop {
        let event = source.next()?;
        match &event {
            XmlEvent::Open(el) => match el.name() {
                "object" => {
                    if el.attr_str("type").is_none() {
                        return Err(ImportError::UnknownObjectType(
                            "<missing type attribute>".to_string(),
                        ));
                    }
                    report.objects += 1;
                }
                "field" => {
                    if el.attr_str("name").is_none() {
                        warn!("field element without a name attribute: {}", el);
                    }
                    report.fields += 1;
                }
                "schema" => {
                    report.has_schema = true;
                }
                _ => {}
            },
            XmlEvent::EndOfDocument => return Ok(report),
            _ => {}
        }
    }
}
