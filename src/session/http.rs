//! JSON-over-HTTP session client.
//!
//! One endpoint per remote call under `/api/`. Every response carries
//! `{ "ok": bool, "message": string?, "result": value? }`; a false `ok`
//! surfaces the server's diagnostic text in the error. Credentials ride as
//! basic auth on each request, matching the server's stateless session
//! tokens.

use super::{DirectorySession, Handle};
use crate::catalog::SchemaCatalog;
use crate::config::ServerConfig;
use crate::error::ImportError;
use crate::model::{FieldValue, PasswordSpec, PermissionEntry};
use crate::types::{FieldId, Invid, TypeId};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

pub struct HttpSession {
    client: reqwest::blocking::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl HttpSession {
    /// Open a session against the configured server, verifying the
    /// credentials with a login round trip.
    pub fn login(config: &ServerConfig) -> Result<Self, ImportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ImportError::remote("login", e.to_string()))?;

        let session = Self {
            client,
            base_url: config.base_url(),
            auth: config
                .username
                .clone()
                .map(|user| (user, config.password.clone().unwrap_or_default())),
        };

        session.post("login", &json!({}))?;
        Ok(session)
    }

    /// Download the schema catalog the server was started with.
    pub fn fetch_catalog(&self) -> Result<SchemaCatalog, ImportError> {
        let result = self.post("schema", &json!({}))?;
        let mut catalog: SchemaCatalog = serde_json::from_value(result)
            .map_err(|e| ImportError::remote("schema", format!("bad catalog payload: {}", e)))?;
        catalog.reindex();
        Ok(catalog)
    }

    /// Issue one call and unwrap the response envelope.
    fn post(&self, call: &'static str, body: &Value) -> Result<Value, ImportError> {
        let url = format!("{}/api/{}", self.base_url, call);
        debug!(call, "session call");

        let mut request = self.client.post(&url).json(body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .map_err(|e| ImportError::remote(call, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImportError::remote(
                call,
                format!("HTTP {}", response.status()),
            ));
        }

        let envelope: Value = response
            .json()
            .map_err(|e| ImportError::remote(call, e.to_string()))?;

        if envelope.get("ok").and_then(Value::as_bool) != Some(true) {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no diagnostic supplied")
                .to_string();
            return Err(ImportError::Remote { call, message });
        }

        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    fn parse_invid(call: &'static str, result: &Value) -> Result<Invid, ImportError> {
        serde_json::from_value(result.clone())
            .map_err(|e| ImportError::remote(call, format!("bad invid payload: {}", e)))
    }
}

impl DirectorySession for HttpSession {
    fn create_object(&self, type_id: TypeId) -> Result<Handle, ImportError> {
        let result = self.post("createObject", &json!({ "type": type_id }))?;
        Ok(Handle::new(Self::parse_invid("createObject", &result)?))
    }

    fn edit_object(&self, invid: Invid) -> Result<Handle, ImportError> {
        let result = self.post("editObject", &json!({ "invid": invid }))?;
        Ok(Handle::new(Self::parse_invid("editObject", &result)?))
    }

    fn locate_by_label(
        &self,
        type_id: TypeId,
        label: &str,
    ) -> Result<Option<Invid>, ImportError> {
        let result = self.post("locateByLabel", &json!({ "type": type_id, "label": label }))?;
        if result.is_null() {
            Ok(None)
        } else {
            Ok(Some(Self::parse_invid("locateByLabel", &result)?))
        }
    }

    fn set_scalar_field(
        &self,
        handle: &Handle,
        field: FieldId,
        value: Option<&FieldValue>,
    ) -> Result<(), ImportError> {
        self.post(
            "setScalarField",
            &json!({ "invid": handle.invid, "field": field, "value": value }),
        )?;
        Ok(())
    }

    fn set_password(
        &self,
        handle: &Handle,
        field: FieldId,
        spec: &PasswordSpec,
    ) -> Result<(), ImportError> {
        self.post(
            "setPassword",
            &json!({ "invid": handle.invid, "field": field, "password": spec }),
        )?;
        Ok(())
    }

    fn add_vector_elements(
        &self,
        handle: &Handle,
        field: FieldId,
        values: &[FieldValue],
    ) -> Result<(), ImportError> {
        self.post(
            "addVectorElements",
            &json!({ "invid": handle.invid, "field": field, "values": values }),
        )?;
        Ok(())
    }

    fn delete_vector_elements(
        &self,
        handle: &Handle,
        field: FieldId,
        values: &[FieldValue],
    ) -> Result<(), ImportError> {
        self.post(
            "deleteVectorElements",
            &json!({ "invid": handle.invid, "field": field, "values": values }),
        )?;
        Ok(())
    }

    fn replace_vector_elements(
        &self,
        handle: &Handle,
        field: FieldId,
        values: &[FieldValue],
    ) -> Result<(), ImportError> {
        self.post(
            "replaceVectorElements",
            &json!({ "invid": handle.invid, "field": field, "values": values }),
        )?;
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
        self.post(
            "setPermission",
            &json!({
                "invid": handle.invid,
                "field": field,
                "targetType": target_type,
                "targetField": target_field,
                "entry": entry,
            }),
        )?;
        Ok(())
    }

    fn remove_object(&self, invid: Invid) -> Result<(), ImportError> {
        self.post("removeObject", &json!({ "invid": invid }))?;
        Ok(())
    }

    fn inactivate_object(&self, invid: Invid) -> Result<(), ImportError> {
        self.post("inactivateObject", &json!({ "invid": invid }))?;
        Ok(())
    }

    fn commit_transaction(&self, comment: Option<&str>) -> Result<(), ImportError> {
        self.post("commitTransaction", &json!({ "comment": comment }))?;
        Ok(())
    }

    fn abort_transaction(&self) {
        if let Err(e) = self.post("abortTransaction", &json!({})) {
            error!("abort call failed: {}", e);
        }
    }
}
