//! Error taxonomy for the import pipeline.
//!
//! Recoverable skips (unknown field names, unrecognized vector elements) are
//! not represented here; they are logged as warnings and parsing continues.
//! `ImportError` covers the conditions that discard an object or abort the
//! whole run.

use thiserror::Error;

/// Errors raised while parsing the document or driving the remote session.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The underlying XML stream was malformed or ended prematurely.
    #[error("XML error: {0}")]
    Xml(String),

    /// End of document reached inside an open element.
    #[error("ran into end of document while processing {0}")]
    UnexpectedEnd(String),

    /// The object's type attribute was missing or did not resolve in the
    /// catalog. Fatal for that object only while no mutation has been issued.
    #[error("unrecognized object type \"{0}\"")]
    UnknownObjectType(String),

    /// A value element did not match the field's declared kind.
    #[error("malformed value for field \"{field}\": {detail}")]
    BadValue { field: String, detail: String },

    /// A <set> directive was mixed with <add>/<delete> in one field body.
    #[error("can't enter {entering} mode with a previous {previous} directive in field \"{field}\"")]
    VectorModeConflict {
        field: String,
        entering: &'static str,
        previous: &'static str,
    },

    /// A close tag did not match the directive currently open.
    #[error("mismatched </{0}> while parsing a vector field")]
    MismatchedClose(String),

    /// Two objects in the document share the same identity.
    #[error("object {0} is not uniquely identified within the document")]
    DuplicateIdentity(String),

    /// A label reference found no object in the document or on the server.
    #[error("could not resolve {type_name} object with label \"{label}\"")]
    UnresolvedReference { type_name: String, label: String },

    /// An object to be edited, deleted or inactivated does not exist.
    #[error("could not look up pre-existing {type_name} object \"{label}\"; did you mean to use the create action?")]
    NoSuchObject { type_name: String, label: String },

    /// A delete/inactivate element carried field children.
    #[error("can't {action} a non-empty object element")]
    NonEmptyDirective { action: String },

    /// A permission block named a type or field the catalog doesn't know.
    #[error("can't process permissions for \"{type_name}\" (field {field:?}): not in the catalog")]
    UnknownPermissionTarget {
        type_name: String,
        field: Option<String>,
    },

    /// The remote session rejected a call. Carries the server's diagnostic.
    #[error("server error during {call}: {message}")]
    Remote { call: &'static str, message: String },

    /// The transaction commit failed.
    #[error("could not commit the import transaction: {0}")]
    CommitFailed(String),

    /// Operator cancel signal.
    #[error("import cancelled")]
    Cancelled,

    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ImportError {
    /// True for errors that discard only the enclosing object while parsing;
    /// everything else aborts the run once a mutation has been issued.
    pub fn is_object_local(&self) -> bool {
        matches!(
            self,
            ImportError::UnknownObjectType(_) | ImportError::BadValue { .. }
        )
    }

    pub fn remote(call: &'static str, message: impl Into<String>) -> Self {
        ImportError::Remote {
            call,
            message: message.into(),
        }
    }
}
