//! Field records and the field builder.
//!
//! `FieldRecord::parse` consumes the events for one `<field name>` element,
//! up to and including its close tag, dispatching on the field's declared
//! kind. Vector bodies run through the three-mode merge machine; permission
//! bodies are delegated to the permission builder.

use super::object::ObjectRecord;
use super::perm::{parse_permission_blocks, PermissionTree};
use super::refs::ReferenceToken;
use super::ParseCtx;
use crate::catalog::{FieldKind, FieldTemplate};
use crate::error::ImportError;
use crate::types::{Invid, TypeId};
use crate::xml::{Element, XmlEvent};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// One concrete field value, as sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Ip(String),
    Invid(Invid),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(v) => write!(f, "{}", v),
            FieldValue::Date(v) => write!(f, "{}", v.to_rfc3339()),
            FieldValue::Ip(v) => write!(f, "{}", v),
            FieldValue::Invid(v) => write!(f, "{}", v),
        }
    }
}

/// Up to three alternative password representations. All provided forms are
/// transmitted; the server decides precedence. All-empty means "clear".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordSpec {
    pub plaintext: Option<String>,
    pub crypt: Option<String>,
    pub md5crypt: Option<String>,
}

impl PasswordSpec {
    pub fn is_clear(&self) -> bool {
        self.plaintext.is_none() && self.crypt.is_none() && self.md5crypt.is_none()
    }
}

/// One element of a vector bucket: a literal value or a deferred reference.
#[derive(Debug)]
pub enum VectorValue {
    Value(FieldValue),
    Reference(ReferenceToken),
}

/// The three merge buckets of a vector field. `replace` is exclusive with
/// the other two; an allocated-but-empty `replace` means "clear all".
#[derive(Debug, Default)]
pub struct VectorData {
    pub replace: Option<Vec<VectorValue>>,
    pub add: Vec<VectorValue>,
    pub delete: Vec<VectorValue>,
}

/// The parsed payload of a field, by declared kind.
#[derive(Debug)]
pub enum FieldData {
    /// Scalar kinds; `None` is an explicit clear.
    Scalar(Option<FieldValue>),

    /// Scalar reference; `None` is an explicit clear.
    Reference(Option<ReferenceToken>),

    Password(PasswordSpec),

    Vector(VectorData),

    /// One tree per `<type>` block in the permission body.
    Permissions(Vec<PermissionTree>),
}

/// One field's declared new value(s).
#[derive(Debug)]
pub struct FieldRecord {
    pub template: FieldTemplate,
    pub data: FieldData,
}

impl FieldRecord {
    pub fn name(&self) -> &str {
        &self.template.name
    }

    /// True for fields whose registration must wait for reference
    /// resolution.
    pub fn is_reference(&self) -> bool {
        self.template.kind == FieldKind::Invid
    }

    /// Parse one `<field name>` element for an object of `owner_type`.
    ///
    /// Returns `Ok(None)` when the field is unknown for the owning type; the
    /// element is consumed and dropped with a warning. Errors are fatal for
    /// the enclosing object; the field element is consumed before returning
    /// so the stream stays aligned.
    pub fn parse(
        ctx: &mut ParseCtx<'_>,
        owner_type: TypeId,
        open: &Element,
    ) -> Result<Option<FieldRecord>, ImportError> {
        let field_name = match open.attr_str("name") {
            Some(name) => name.to_string(),
            None => {
                warn!("field element without a name attribute, skipping: {}", open);
                ctx.source.skip_to_close("field")?;
                return Ok(None);
            }
        };

        let template = match ctx.catalog.field_template(owner_type, &field_name) {
            Some(t) => t.clone(),
            None => {
                warn!(
                    "did not recognize field \"{}\" for object type {}, skipping",
                    field_name, owner_type
                );
                ctx.source.skip_to_close("field")?;
                return Ok(None);
            }
        };

        let data = if template.is_vector {
            FieldData::Vector(parse_vector_body(ctx, &template, &field_name)?)
        } else {
            match template.kind {
                FieldKind::Boolean
                | FieldKind::Numeric
                | FieldKind::Date
                | FieldKind::Float
                | FieldKind::String
                | FieldKind::Ip => parse_scalar_body(ctx, &template, &field_name)?,
                FieldKind::Password => parse_password_body(ctx, &field_name)?,
                FieldKind::Invid => parse_scalar_reference_body(ctx, &field_name)?,
                FieldKind::Permission => parse_permission_body(ctx, &field_name)?,
            }
        };

        Ok(Some(FieldRecord { template, data }))
    }
}

/// Consume events to the field close after a failed value parse, then
/// return the error.
fn fail_field(
    ctx: &mut ParseCtx<'_>,
    err: ImportError,
) -> Result<FieldData, ImportError> {
    ctx.source.skip_to_close("field")?;
    Err(err)
}

fn parse_scalar_body(
    ctx: &mut ParseCtx<'_>,
    template: &FieldTemplate,
    field_name: &str,
) -> Result<FieldData, ImportError> {
    let event = ctx.source.next()?;

    if event.matches_close("field") {
        // present-but-empty field: explicit clear
        return Ok(FieldData::Scalar(None));
    }
    if event.is_end() {
        return Err(ImportError::UnexpectedEnd(field_name.to_string()));
    }

    let el = match event.as_element() {
        Some(el) => el.clone(),
        None => {
            return fail_field(
                ctx,
                ImportError::BadValue {
                    field: field_name.to_string(),
                    detail: format!("expected a value element, found {}", event),
                },
            )
        }
    };

    let expected = template.kind.value_tag();
    if el.name() != expected {
        return fail_field(
            ctx,
            ImportError::BadValue {
                field: field_name.to_string(),
                detail: format!("expected <{}>, found {}", expected, el),
            },
        );
    }

    let value = match parse_scalar_value(&el, template.kind, field_name) {
        Ok(v) => v,
        Err(err) => return fail_field(ctx, err),
    };

    ctx.source.skip_to_close("field")?;
    Ok(FieldData::Scalar(value))
}

fn parse_password_body(
    ctx: &mut ParseCtx<'_>,
    field_name: &str,
) -> Result<FieldData, ImportError> {
    let event = ctx.source.next()?;

    if event.matches_close("field") {
        return Ok(FieldData::Password(PasswordSpec::default()));
    }

    let el = match event.as_element() {
        Some(el) if el.name() == "password" => el.clone(),
        Some(el) => {
            return fail_field(
                ctx,
                ImportError::BadValue {
                    field: field_name.to_string(),
                    detail: format!("expected <password>, found {}", el),
                },
            )
        }
        None => return Err(ImportError::UnexpectedEnd(field_name.to_string())),
    };

    let spec = PasswordSpec {
        plaintext: el.attr_str("plaintext").map(str::to_string),
        crypt: el.attr_str("crypt").map(str::to_string),
        md5crypt: el.attr_str("md5crypt").map(str::to_string),
    };

    ctx.source.skip_to_close("field")?;
    Ok(FieldData::Password(spec))
}

fn parse_scalar_reference_body(
    ctx: &mut ParseCtx<'_>,
    field_name: &str,
) -> Result<FieldData, ImportError> {
    let event = ctx.source.next()?;

    if event.matches_close("field") {
        return Ok(FieldData::Reference(None));
    }

    // scalar reference fields never hold embedded objects, so the value
    // must be an <invid> pointer
    let el = match event.as_element() {
        Some(el) => el.clone(),
        None => return Err(ImportError::UnexpectedEnd(field_name.to_string())),
    };

    let token = match ReferenceToken::from_invid_element(&el, field_name, ctx.catalog) {
        Ok(t) => t,
        Err(err) => return fail_field(ctx, err),
    };

    ctx.source.skip_to_close("field")?;
    Ok(FieldData::Reference(Some(token)))
}

fn parse_permission_body(
    ctx: &mut ParseCtx<'_>,
    field_name: &str,
) -> Result<FieldData, ImportError> {
    let event = ctx.source.next()?;

    if event.matches_close("field") {
        return Ok(FieldData::Permissions(Vec::new()));
    }

    if !event.matches("permissions") {
        return fail_field(
            ctx,
            ImportError::BadValue {
                field: field_name.to_string(),
                detail: format!("expected <permissions>, found {}", event),
            },
        );
    }

    let trees = parse_permission_blocks(ctx.source)?;
    ctx.source.skip_to_close("field")?;
    Ok(FieldData::Permissions(trees))
}

/// Active directive inside a vector body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeMode {
    Adding,
    Deleting,
    Set,
}

impl MergeMode {
    fn tag(&self) -> &'static str {
        match self {
            MergeMode::Adding => "add",
            MergeMode::Deleting => "delete",
            MergeMode::Set => "set",
        }
    }
}

/// The vector-merge state machine. The default mode before any directive is
/// add; `<set>` is exclusive with `<add>`/`<delete>` and with bare values
/// seen before it, while repeated `<add>`/`<delete>` blocks accumulate.
fn parse_vector_body(
    ctx: &mut ParseCtx<'_>,
    template: &FieldTemplate,
    field_name: &str,
) -> Result<VectorData, ImportError> {
    let mut data = VectorData::default();
    let mut current: Option<MergeMode> = None;
    let mut set_entered = false;
    let mut can_set = true;
    let mut last_directive: &'static str = "add";

    loop {
        let event = ctx.source.next()?;

        if event.matches_close("field") {
            return Ok(data);
        }
        if event.is_end() {
            return Err(ImportError::UnexpectedEnd(field_name.to_string()));
        }

        match &event {
            XmlEvent::Open(el) if el.name() == "add" || el.name() == "delete" => {
                let mode = if el.name() == "add" {
                    MergeMode::Adding
                } else {
                    MergeMode::Deleting
                };
                if set_entered {
                    return Err(ImportError::VectorModeConflict {
                        field: field_name.to_string(),
                        entering: mode.tag(),
                        previous: "set",
                    });
                }
                if let Some(open_mode) = current {
                    return Err(ImportError::VectorModeConflict {
                        field: field_name.to_string(),
                        entering: mode.tag(),
                        previous: open_mode.tag(),
                    });
                }
                can_set = false;
                last_directive = mode.tag();
                current = Some(mode);
            }
            XmlEvent::Open(el) if el.name() == "set" => {
                if !can_set {
                    return Err(ImportError::VectorModeConflict {
                        field: field_name.to_string(),
                        entering: "set",
                        previous: last_directive,
                    });
                }
                set_entered = true;
                // allocate even if left empty: <set></set> clears the field
                data.replace.get_or_insert_with(Vec::new);
                current = Some(MergeMode::Set);
            }
            XmlEvent::Close(name) if name == "add" || name == "delete" || name == "set" => {
                match current {
                    Some(mode) if mode.tag() == name => current = None,
                    _ => return Err(ImportError::MismatchedClose(name.clone())),
                }
            }
            XmlEvent::Open(el) => {
                let el = el.clone();
                match parse_vector_item(ctx, template, field_name, &el)? {
                    Some(value) => {
                        if set_entered {
                            data.replace.get_or_insert_with(Vec::new).push(value);
                        } else if current == Some(MergeMode::Deleting) {
                            data.delete.push(value);
                        } else {
                            if current.is_none() {
                                // bare value claimed the default add bucket
                                can_set = false;
                            }
                            data.add.push(value);
                        }
                    }
                    None => {
                        warn!(
                            "couldn't get a vector value for {} in field \"{}\"",
                            el, field_name
                        );
                    }
                }
            }
            XmlEvent::Text(text) => {
                warn!(
                    "unexpected character data in vector field \"{}\": {:?}",
                    field_name, text
                );
            }
            XmlEvent::Close(name) => {
                return Err(ImportError::MismatchedClose(name.clone()));
            }
            XmlEvent::EndOfDocument => unreachable!("handled above"),
        }
    }
}

/// Parse one inner value element of a vector body. Returns `None` for
/// unrecognized elements, which are dropped with a warning by the caller.
fn parse_vector_item(
    ctx: &mut ParseCtx<'_>,
    template: &FieldTemplate,
    field_name: &str,
    el: &Element,
) -> Result<Option<VectorValue>, ImportError> {
    let item = match template.kind {
        FieldKind::String if el.name() == "string" => {
            let value = parse_scalar_value(el, FieldKind::String, field_name)?;
            value.map(VectorValue::Value)
        }
        FieldKind::Ip if el.name() == "ip" => {
            let value = parse_scalar_value(el, FieldKind::Ip, field_name)?;
            value.map(VectorValue::Value)
        }
        FieldKind::Invid if el.name() == "object" && template.is_embedded => {
            // inline object definition: parse it in full and defer creation
            let record = ObjectRecord::parse(ctx, el, true)?;
            return Ok(Some(VectorValue::Reference(ReferenceToken::Embedded(
                Box::new(record),
            ))));
        }
        FieldKind::Invid if el.name() == "invid" => Some(VectorValue::Reference(
            ReferenceToken::from_invid_element(el, field_name, ctx.catalog)?,
        )),
        _ => None,
    };

    // consume the value element's close; the embedded-object branch above
    // already consumed its own
    let name = el.name().to_string();
    ctx.source.skip_to_close(&name)?;

    Ok(item)
}

/// Parse one scalar value element by declared kind. `Ok(None)` means the
/// value was present but unusable and degrades to a clear (a date that
/// parses from neither attribute).
fn parse_scalar_value(
    el: &Element,
    kind: FieldKind,
    field_name: &str,
) -> Result<Option<FieldValue>, ImportError> {
    let bad = |detail: String| ImportError::BadValue {
        field: field_name.to_string(),
        detail,
    };

    match kind {
        FieldKind::Boolean => Ok(Some(FieldValue::Boolean(el.attr_bool("val")))),
        FieldKind::Numeric => match el.attr_int("val") {
            Some(v) => Ok(Some(FieldValue::Int(v))),
            None => Err(bad(format!("missing or malformed int val in {}", el))),
        },
        FieldKind::Float => match el.attr_str("val") {
            Some(raw) => raw
                .parse::<f64>()
                .map(|v| Some(FieldValue::Float(v)))
                .map_err(|_| bad(format!("malformed float val \"{}\"", raw))),
            None => Err(bad(format!("missing float val in {}", el))),
        },
        FieldKind::String => match el.attr_str("val") {
            Some(v) => Ok(Some(FieldValue::String(v.to_string()))),
            None => Err(bad(format!("missing string val in {}", el))),
        },
        FieldKind::Ip => match el.attr_str("val") {
            Some(v) => Ok(Some(FieldValue::Ip(v.to_string()))),
            None => Err(bad(format!("missing ip val in {}", el))),
        },
        FieldKind::Date => Ok(parse_date_value(el, field_name).map(FieldValue::Date)),
        FieldKind::Password | FieldKind::Invid | FieldKind::Permission => {
            Err(bad(format!("{:?} is not a scalar value kind", kind)))
        }
    }
}

const DATE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",
    "%a %d %b %H:%M:%S %Y",
    "%a %d %b %Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a `<date val timecode>` element. If both attributes are present
/// and disagree, the numeric timecode wins and a warning is emitted; if
/// neither parses, the value is treated as null.
fn parse_date_value(el: &Element, field_name: &str) -> Option<DateTime<Utc>> {
    let from_string = el.attr_str("val").and_then(parse_date_string);

    if el.attr_str("val").is_some() && from_string.is_none() {
        warn!(
            "could not parse date val \"{}\" in field \"{}\"",
            el.attr_str("val").unwrap_or_default(),
            field_name
        );
    }

    let from_timecode = match el.attr_str("timecode") {
        Some(raw) => match raw.parse::<i64>() {
            Ok(millis) => Utc.timestamp_millis_opt(millis).single(),
            Err(_) => {
                warn!(
                    "could not parse date timecode \"{}\" in field \"{}\"",
                    raw, field_name
                );
                None
            }
        },
        None => None,
    };

    match (from_timecode, from_string) {
        (Some(tc), Some(parsed)) if tc != parsed => {
            warn!(
                "date element in field \"{}\" is not internally consistent; \
                 ignoring val and using timecode {}",
                field_name, tc
            );
            Some(tc)
        }
        (Some(tc), _) => Some(tc),
        (None, Some(parsed)) => Some(parsed),
        (None, None) => {
            warn!("no usable date value in field \"{}\"", field_name);
            None
        }
    }
}

fn parse_date_string(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return parsed
            .and_hms_opt(0, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt));
    }
    None
}
