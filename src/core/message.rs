//! Structured completion results.
//!
//! A [`MessageFormat`] is the schema a completion must satisfy; a [`Message`] is a
//! payload that has been validated against one. Formats can be built field by field,
//! parsed from a shorthand such as `"ProjectFile(file_name: str, file_contents: str)"`
//! or taken from the built-ins in [`formats`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::core::arguments::Arguments;
use crate::core::error::{OrchestrationError, Result};

pub const TEXT_FORMAT: &str = "TextMessage";
const TOOL_SUFFIX: &str = "WithTools";
const TOOL_FIELDS: [&str; 3] = ["tool_name", "tool_method", "tool_parameters"];

// ============================================================================
// Validation report
// ============================================================================

/// A problem found while checking a payload against a format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// The payload violates the format.
    Error(String),
    /// Tolerated deviation, e.g. an undeclared key that gets dropped.
    Warning(String),
}

/// The result of checking one payload.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Error(msg.into()));
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Warning(msg.into()));
    }

    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| matches!(i, ValidationIssue::Error(_)))
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| matches!(i, ValidationIssue::Warning(_)))
    }

    /// All errors joined into one line, used as the re-prompt feedback.
    pub fn error_summary(&self) -> String {
        self.issues
            .iter()
            .filter_map(|i| match i {
                ValidationIssue::Error(msg) => Some(msg.as_str()),
                ValidationIssue::Warning(_) => None,
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ============================================================================
// Formats
// ============================================================================

/// The type of a single format field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    List(Box<FieldKind>),
    Object(Vec<Field>),
    Any,
}

impl FieldKind {
    pub fn list_of(kind: FieldKind) -> Self {
        FieldKind::List(Box::new(kind))
    }

    /// Short human-readable name, matching the shorthand syntax.
    pub fn type_name(&self) -> String {
        match self {
            FieldKind::String => "str".into(),
            FieldKind::Integer => "int".into(),
            FieldKind::Number => "float".into(),
            FieldKind::Boolean => "bool".into(),
            FieldKind::Any => "any".into(),
            FieldKind::List(inner) => format!("[{}]", inner.type_name()),
            FieldKind::Object(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{}: {}", f.name, f.kind.type_name()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }

    pub fn json_schema(&self) -> Value {
        match self {
            FieldKind::String => json!({ "type": "string" }),
            FieldKind::Integer => json!({ "type": "integer" }),
            FieldKind::Number => json!({ "type": "number" }),
            FieldKind::Boolean => json!({ "type": "boolean" }),
            FieldKind::Any => json!({}),
            FieldKind::List(inner) => json!({ "type": "array", "items": inner.json_schema() }),
            FieldKind::Object(fields) => object_schema(fields, None),
        }
    }

    fn check(&self, path: &str, value: &Value, report: &mut ValidationReport) {
        let ok = match (self, value) {
            (FieldKind::Any, _) => true,
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::Boolean, Value::Bool(_)) => true,
            (FieldKind::List(inner), Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.check(&format!("{path}[{i}]"), item, report);
                }
                true
            }
            (FieldKind::Object(fields), Value::Object(map)) => {
                check_fields(fields, map, path, report);
                true
            }
            _ => false,
        };
        if !ok {
            report.add_error(format!(
                "field '{path}' should be {}, got {value}",
                self.type_name()
            ));
        }
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            return Ok(FieldKind::list_of(inner.parse()?));
        }
        match s {
            "str" | "string" => Ok(FieldKind::String),
            "int" | "integer" => Ok(FieldKind::Integer),
            "float" | "number" => Ok(FieldKind::Number),
            "bool" | "boolean" => Ok(FieldKind::Boolean),
            "any" => Ok(FieldKind::Any),
            other => Err(format!("Unknown field kind '{other}'")),
        }
    }
}

/// A single named field of a format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub description: String,
    pub required: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// The schema a structured completion must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFormat {
    pub name: String,
    pub fields: Vec<Field>,
}

impl MessageFormat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(Field::new(name, kind, description));
        self
    }

    /// Add an optional field.
    pub fn optional_field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(Field::new(name, kind, description).optional());
        self
    }

    /// Plain text, the default response format.
    pub fn text() -> Self {
        formats::text()
    }

    pub fn is_text(&self) -> bool {
        self.name == TEXT_FORMAT
    }

    pub fn has_tool_fields(&self) -> bool {
        self.fields.iter().any(|f| f.name == TOOL_FIELDS[0])
    }

    /// Extends the format with the optional tool-call fields a model fills in
    /// when it wants a tool invoked.
    pub fn with_tool_fields(&self) -> Self {
        if self.has_tool_fields() {
            return self.clone();
        }
        let mut extended = self.clone();
        extended.name = format!("{}{}", self.name, TOOL_SUFFIX);
        for field in formats::tool_call().fields {
            extended.fields.push(field.optional());
        }
        extended
    }

    /// JSON schema of the format, as handed to the language-model client.
    pub fn json_schema(&self) -> Value {
        object_schema(&self.fields, Some(&self.name))
    }

    /// Check a payload without building a message.
    pub fn validate(&self, payload: &Value) -> ValidationReport {
        let mut report = ValidationReport::new();
        match self.normalize(payload.clone()) {
            Ok(map) => check_fields(&self.fields, &map, "", &mut report),
            Err(reason) => report.add_error(reason),
        }
        report
    }

    /// Validate a payload and turn it into a [`Message`] of this format.
    ///
    /// String payloads are accepted for text formats as-is and otherwise parsed as JSON.
    /// Undeclared keys are dropped with a warning.
    pub fn parse(&self, payload: Value) -> Result<Message> {
        let map = self.normalize(payload).map_err(|reason| self.schema_error(reason))?;

        let mut report = ValidationReport::new();
        check_fields(&self.fields, &map, "", &mut report);
        if !report.is_valid() {
            return Err(self.schema_error(report.error_summary()));
        }

        let completed = map.get("completed").and_then(Value::as_bool);
        let mut fields = Map::new();
        for (key, value) in map {
            if self.fields.iter().any(|f| f.name == key) {
                fields.insert(key, value);
            } else if key != "completed" {
                log::debug!("Dropping undeclared key '{}' from {} payload", key, self.name);
            }
        }

        Ok(Message {
            kind: self.name.clone(),
            fields,
            completed,
        })
    }

    fn normalize(&self, payload: Value) -> Result<Map<String, Value>, String> {
        match payload {
            Value::Object(map) => Ok(map),
            Value::String(s) => {
                if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&s) {
                    return Ok(map);
                }
                if self.is_text() {
                    let mut map = Map::new();
                    map.insert("text".into(), Value::String(s));
                    Ok(map)
                } else {
                    Err(format!("expected a JSON object, got text: {s}"))
                }
            }
            other => Err(format!("expected a JSON object, got {other}")),
        }
    }

    fn schema_error(&self, reason: String) -> OrchestrationError {
        OrchestrationError::SchemaValidation {
            format: self.name.clone(),
            reason,
        }
    }
}

impl Default for MessageFormat {
    fn default() -> Self {
        formats::text()
    }
}

impl FromStr for MessageFormat {
    type Err = String;

    /// Parses shorthand syntax: `"Name(field: kind, other?: [kind])"`.
    ///
    /// A `?` after the field name marks it optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let open = s.find('(').ok_or("Format must look like Name(field: kind, ...)")?;
        let body = s[open + 1..]
            .strip_suffix(')')
            .ok_or("Format must end with ')'")?;
        let name = s[..open].trim();
        if name.is_empty() {
            return Err("Format name cannot be empty".to_string());
        }

        let mut format = MessageFormat::new(name);
        for part in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (field, kind) = part
                .split_once(':')
                .ok_or_else(|| format!("Field '{part}' is missing a kind"))?;
            let field = field.trim();
            let kind: FieldKind = kind.parse()?;
            format = match field.strip_suffix('?') {
                Some(optional) => format.optional_field(optional.trim(), kind, ""),
                None => format.field(field, kind, ""),
            };
        }
        Ok(format)
    }
}

/// Macro for quick format creation: `message_format!("Answer(text: str, score: float)")`
#[macro_export]
macro_rules! message_format {
    ($s:expr) => {
        $s.parse::<$crate::MessageFormat>()
            .expect("Invalid message format shorthand")
    };
}

fn object_schema(fields: &[Field], title: Option<&str>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in fields {
        let mut schema = field.kind.json_schema();
        if let Value::Object(ref mut obj) = schema {
            if !field.description.is_empty() {
                obj.insert("description".into(), json!(field.description));
            }
        }
        properties.insert(field.name.clone(), schema);
        if field.required {
            required.push(json!(field.name));
        }
    }
    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
    if let (Some(title), Value::Object(obj)) = (title, &mut schema) {
        obj.insert("title".into(), json!(title));
    }
    schema
}

fn check_fields(
    fields: &[Field],
    map: &Map<String, Value>,
    prefix: &str,
    report: &mut ValidationReport,
) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };
        match map.get(&field.name) {
            Some(Value::Null) | None if field.required => {
                report.add_error(format!("missing required field '{path}'"));
            }
            Some(Value::Null) | None => {}
            Some(value) => field.kind.check(&path, value, report),
        }
    }
    for key in map.keys() {
        if key != "completed" && !fields.iter().any(|f| &f.name == key) {
            report.add_warning(format!("undeclared key '{key}'"));
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A validated structured completion result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the format the payload was validated against.
    #[serde(rename = "type")]
    pub kind: String,
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl Message {
    pub fn new(kind: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            fields,
            completed: None,
        }
    }

    /// A plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("text".into(), Value::String(text.into()));
        Self::new(TEXT_FORMAT, fields)
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn is_text(&self) -> bool {
        self.kind == TEXT_FORMAT
    }

    /// The text of a plain text message.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_text() {
            self.fields.get("text").and_then(Value::as_str)
        } else {
            None
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The value forwarded along graph edges: the text of a text message,
    /// otherwise the payload object.
    pub fn content(&self) -> Value {
        match self.as_text() {
            Some(text) => Value::String(text.to_string()),
            None => Value::Object(self.fields.clone()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| OrchestrationError::Serialization(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| OrchestrationError::Serialization(e.to_string()))
    }

    /// The tool invocation this message asks for, if any.
    pub fn tool_call(&self) -> Option<ToolCall> {
        ToolCall::from_fields(&self.fields)
    }

    /// Drops the tool-call fields and renames the message back to `kind`.
    pub(crate) fn into_terminal(mut self, kind: &str) -> Self {
        for field in TOOL_FIELDS {
            self.fields.remove(field);
        }
        self.kind = kind.to_string();
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(text),
            None => {
                let rendered = serde_json::to_string_pretty(&self.fields).map_err(|_| fmt::Error)?;
                f.write_str(&rendered)
            }
        }
    }
}

/// A model's request to invoke a tool method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub tool_method: String,
    #[serde(default)]
    pub tool_parameters: Vec<Param>,
}

/// One named tool parameter as produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Value,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, tool_method: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_method: tool_method.into(),
            tool_parameters: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tool_parameters.push(Param {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Method name with call syntax and qualification stripped (`Tool.add()` → `add`).
    pub fn method(&self) -> &str {
        let method = self.tool_method.trim().trim_end_matches("()");
        method.rsplit('.').next().unwrap_or(method)
    }

    pub fn arguments(&self) -> Arguments {
        self.tool_parameters
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    fn from_fields(fields: &Map<String, Value>) -> Option<Self> {
        let name = fields.get("tool_name")?.as_str()?.trim();
        let method = fields.get("tool_method")?.as_str()?.trim();
        if name.is_empty() || method.is_empty() {
            return None;
        }
        let mut call = ToolCall::new(name, method);
        match fields.get("tool_parameters") {
            Some(Value::Array(params)) => {
                for p in params {
                    if let Some(param_name) = p.get("name").and_then(Value::as_str) {
                        let value = p.get("value").cloned().unwrap_or(Value::Null);
                        call = call.param(param_name, value);
                    }
                }
            }
            Some(Value::Object(params)) => {
                for (k, v) in params {
                    call = call.param(k.clone(), v.clone());
                }
            }
            _ => {}
        }
        Some(call)
    }
}

impl fmt::Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .tool_parameters
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect();
        write!(f, "{}.{}({})", self.tool_name, self.method(), params.join(", "))
    }
}

// ============================================================================
// Built-in formats
// ============================================================================

/// Formats used by the built-in roles and projects.
pub mod formats {
    use super::{FieldKind, MessageFormat, TEXT_FORMAT};

    pub fn text() -> MessageFormat {
        MessageFormat::new(TEXT_FORMAT).field("text", FieldKind::String, "The response text")
    }

    pub fn planned_components() -> MessageFormat {
        MessageFormat::new("PlannedComponents").field(
            "components",
            FieldKind::list_of(FieldKind::String),
            "List of planned components",
        )
    }

    pub fn summary() -> MessageFormat {
        MessageFormat::new("Summary").field(
            "summary",
            FieldKind::list_of(FieldKind::String),
            "A list of component summaries. Each item is one unbroken summary",
        )
    }

    pub fn project_file() -> MessageFormat {
        MessageFormat::new("ProjectFile")
            .field("file_name", FieldKind::String, "A file path relative to root")
            .field("file_contents", FieldKind::String, "The contents of the file")
    }

    pub fn project_directory() -> MessageFormat {
        MessageFormat::new("ProjectDirectory")
            .field("project_name", FieldKind::String, "Name of the project directory")
            .field(
                "files",
                FieldKind::list_of(FieldKind::Object(project_file().fields)),
                "The files in the project directory",
            )
    }

    pub fn tool_call() -> MessageFormat {
        let param = MessageFormat::new("Param")
            .field("name", FieldKind::String, "Name of the parameter")
            .field("value", FieldKind::Any, "Value of the parameter");
        MessageFormat::new("ToolCall")
            .field("tool_name", FieldKind::String, "Name of the tool")
            .field("tool_method", FieldKind::String, "Method to call on the tool")
            .field(
                "tool_parameters",
                FieldKind::list_of(FieldKind::Object(param.fields)),
                "Parameters for the tool method",
            )
    }

    /// Looks a built-in format up by name, ignoring case.
    pub fn builtin(name: &str) -> Option<MessageFormat> {
        match name.to_ascii_lowercase().as_str() {
            "text" | "textmessage" => Some(text()),
            "plannedcomponents" => Some(planned_components()),
            "summary" => Some(summary()),
            "projectfile" => Some(project_file()),
            "projectdirectory" => Some(project_directory()),
            "toolcall" | "tool" => Some(tool_call()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_parsing() {
        let format: MessageFormat = "Answer(text: str, score?: float, tags: [str])".parse().unwrap();
        assert_eq!(format.name, "Answer");
        assert_eq!(format.fields.len(), 3);
        assert!(format.fields[0].required);
        assert!(!format.fields[1].required);
        assert_eq!(format.fields[2].kind, FieldKind::list_of(FieldKind::String));

        assert!("NoParens".parse::<MessageFormat>().is_err());
        assert!("Bad(x: widget)".parse::<MessageFormat>().is_err());
    }

    #[test]
    fn test_message_format_macro() {
        let format = crate::message_format!("Verdict(accepted: bool, reason?: str)");
        assert_eq!(format.name, "Verdict");
        assert_eq!(format.fields.len(), 2);
        assert!(!format.fields[1].required);
    }

    #[test]
    fn test_parse_valid_payload() {
        let msg = formats::planned_components()
            .parse(json!({ "components": ["a", "b"], "completed": true, "extra": 1 }))
            .unwrap();
        assert_eq!(msg.kind, "PlannedComponents");
        assert_eq!(msg.get("components"), Some(&json!(["a", "b"])));
        assert_eq!(msg.completed, Some(true));
        assert!(msg.get("extra").is_none());
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let err = formats::planned_components()
            .parse(json!({ "components": "not a list" }))
            .unwrap_err();
        match err {
            OrchestrationError::SchemaValidation { format, reason } => {
                assert_eq!(format, "PlannedComponents");
                assert!(reason.contains("components"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let nested = formats::project_directory().validate(&json!({
            "project_name": "demo",
            "files": [{ "file_name": "main.rs" }]
        }));
        assert!(!nested.is_valid());
        assert!(nested.error_summary().contains("files[0].file_contents"));
    }

    #[test]
    fn test_text_accepts_plain_strings() {
        let msg = MessageFormat::text().parse(json!("hello")).unwrap();
        assert_eq!(msg.as_text(), Some("hello"));
        assert_eq!(msg.content(), json!("hello"));

        let err = formats::summary().parse(json!("hello"));
        assert!(err.is_err());
    }

    #[test]
    fn test_message_json_round_trip() {
        let msg = formats::project_file()
            .parse(json!({ "file_name": "app.py", "file_contents": "print(1)" }))
            .unwrap()
            .with_completed(false);
        let raw = msg.to_json().unwrap();
        let back = Message::from_json(&raw).unwrap();
        assert_eq!(msg, back);

        let err = Message::from_json("{ not json").unwrap_err();
        assert!(matches!(err, OrchestrationError::Serialization(_)));
    }

    #[test]
    fn test_tool_fields_and_call_extraction() {
        let format = MessageFormat::text().with_tool_fields();
        assert_eq!(format.name, "TextMessageWithTools");
        assert!(format.with_tool_fields() == format);

        let msg = format
            .parse(json!({
                "text": "",
                "tool_name": "Arithmetic",
                "tool_method": "Arithmetic.add()",
                "tool_parameters": [{ "name": "x", "value": "2" }, { "name": "y", "value": 3 }]
            }))
            .unwrap();
        let call = msg.tool_call().unwrap();
        assert_eq!(call.method(), "add");
        assert_eq!(call.arguments().get("x"), Some(&json!("2")));

        let terminal = format
            .parse(json!({ "text": "done", "tool_name": "", "tool_method": "" }))
            .unwrap();
        assert!(terminal.tool_call().is_none());
        let terminal = terminal.into_terminal(TEXT_FORMAT);
        assert_eq!(terminal.as_text(), Some("done"));
        assert!(terminal.get("tool_name").is_none());
    }

    #[test]
    fn test_json_schema_lists_required_fields() {
        let schema = formats::project_file().json_schema();
        assert_eq!(schema["title"], json!("ProjectFile"));
        assert_eq!(schema["required"], json!(["file_name", "file_contents"]));
        assert_eq!(schema["properties"]["file_name"]["type"], json!("string"));
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(formats::builtin("summary").unwrap().name, "Summary");
        assert_eq!(formats::builtin("TextMessage").unwrap().name, TEXT_FORMAT);
        assert!(formats::builtin("nope").is_none());
    }
}
