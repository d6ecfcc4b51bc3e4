//! Declarative tools the model can ask an operator to invoke.
//!
//! A [`Tool`] is a named group of stateless methods. Each method is registered together
//! with a [`MethodDescriptor`] (ordered parameters, return kind, description) so the
//! prompt self-description and argument checking both read the same static data.

pub mod builtin;
pub mod registry;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::core::arguments::Arguments;
use crate::core::error::{OrchestrationError, Result};

pub use builtin::Arithmetic;
pub use registry::ToolRegistry;

// ============================================================================
// Descriptors
// ============================================================================

/// Declared kind of a tool parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Int,
    Float,
    Str,
    Bool,
    List,
    Dict,
    Any,
    None,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Str => "str",
            ParamKind::Bool => "bool",
            ParamKind::List => "list",
            ParamKind::Dict => "dict",
            ParamKind::Any => "any",
            ParamKind::None => "None",
        }
    }

    /// Converts `value` to this kind.
    ///
    /// Models send most arguments as strings, so a string that parses as the declared
    /// scalar (or as JSON for `list`/`dict`) is accepted.
    pub fn coerce(&self, value: Value) -> std::result::Result<Value, String> {
        let reject = |value: &Value| format!("expected {}, got {value}", self.as_str());
        match (self, value) {
            (ParamKind::Any, v) => Ok(v),
            (ParamKind::None, Value::Null) => Ok(Value::Null),

            (ParamKind::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
            (ParamKind::Int, Value::Number(n)) => match n.as_f64().and_then(integral) {
                Some(i) => Ok(Value::from(i)),
                None => Err(reject(&Value::Number(n))),
            },
            (ParamKind::Int, Value::String(s)) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Ok(Value::from(i))
                } else {
                    match trimmed.parse::<f64>().ok().and_then(integral) {
                        Some(i) => Ok(Value::from(i)),
                        None => Err(reject(&Value::String(s))),
                    }
                }
            }

            (ParamKind::Float, Value::Number(n)) => Ok(Value::Number(n)),
            (ParamKind::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| reject(&Value::String(s))),

            (ParamKind::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ParamKind::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(reject(&Value::String(s))),
            },

            (ParamKind::Str, Value::String(s)) => Ok(Value::String(s)),
            (ParamKind::Str, v @ (Value::Number(_) | Value::Bool(_))) => {
                Ok(Value::String(v.to_string()))
            }

            (ParamKind::List, Value::Array(items)) => Ok(Value::Array(items)),
            (ParamKind::Dict, Value::Object(map)) => Ok(Value::Object(map)),
            (ParamKind::List | ParamKind::Dict, Value::String(s)) => {
                match serde_json::from_str::<Value>(&s) {
                    Ok(parsed @ Value::Array(_)) if *self == ParamKind::List => Ok(parsed),
                    Ok(parsed @ Value::Object(_)) if *self == ParamKind::Dict => Ok(parsed),
                    _ => Err(reject(&Value::String(s))),
                }
            }

            (_, v) => Err(reject(&v)),
        }
    }
}

/// The exact integer a float stands for, if it is integral and fits in an `i64`.
fn integral(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parameter of a tool method. A parameter with a default is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

impl fmt::Display for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.kind)?;
        if let Some(default) = &self.default {
            write!(f, " = {default}")?;
        }
        Ok(())
    }
}

/// Static description of a tool method, captured when the method is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub returns: ParamKind,
    pub description: String,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ParamKind::Any,
            description: description.into(),
        }
    }

    /// A required parameter.
    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            default: None,
        });
        self
    }

    /// An optional parameter filled with `default` when absent.
    pub fn optional_param(
        mut self,
        name: impl Into<String>,
        kind: ParamKind,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            default: Some(default.into()),
        });
        self
    }

    pub fn returns(mut self, kind: ParamKind) -> Self {
        self.returns = kind;
        self
    }

    /// `add(x: int, y: int) -> int`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        format!("{}({}) -> {}", self.name, params.join(", "), self.returns)
    }

    /// Checks `args` against the parameter list, coercing values and filling defaults.
    pub fn bind(&self, tool: &str, args: &Arguments) -> Result<Arguments> {
        let target = format!("{tool}.{}", self.name);
        if let Some(unknown) = args.keys().find(|k| !self.params.iter().any(|p| &p.name == *k)) {
            return Err(OrchestrationError::invalid_args(
                target,
                format!("unknown parameter '{unknown}'"),
            ));
        }

        let mut bound = Arguments::new();
        for param in &self.params {
            let value = match (args.get(&param.name), &param.default) {
                (Some(value), _) => param.kind.coerce(value.clone()).map_err(|reason| {
                    OrchestrationError::invalid_args(&target, format!("'{}': {reason}", param.name))
                })?,
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(OrchestrationError::invalid_args(
                        target,
                        format!("missing required parameter '{}'", param.name),
                    ));
                }
            };
            bound.insert(param.name.clone(), value);
        }
        Ok(bound)
    }
}

// ============================================================================
// Tool
// ============================================================================

type SyncHandler = dyn Fn(&Arguments) -> Result<Value> + Send + Sync;
type AsyncHandler = dyn Fn(Arguments) -> BoxFuture<'static, Result<Value>> + Send + Sync;

#[derive(Clone)]
enum Handler {
    Sync(Arc<SyncHandler>),
    Async(Arc<AsyncHandler>),
}

#[derive(Clone)]
struct Method {
    descriptor: MethodDescriptor,
    handler: Handler,
}

/// A named group of stateless methods.
#[derive(Clone)]
pub struct Tool {
    name: String,
    methods: Vec<Method>,
}

impl Tool {
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method descriptors in declaration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.iter().map(|m| &m.descriptor)
    }

    pub fn descriptor(&self, method: &str) -> Option<&MethodDescriptor> {
        self.find(method).map(|m| &m.descriptor)
    }

    /// Prompt self-description; identical output for identical descriptors.
    pub fn describe(&self) -> String {
        let mut out = format!("Tool Name: {}\nTool Methods:", self.name);
        for descriptor in self.descriptors() {
            out.push_str(&format!("\n   - {}", descriptor.signature()));
            let description = match descriptor.description.as_str() {
                "" => "No description provided",
                text => text,
            };
            out.push_str(&format!("\n\t{description}"));
        }
        out
    }

    /// Check the arguments against the method signature and run it.
    pub async fn invoke(&self, method: &str, args: &Arguments) -> Result<Value> {
        let found = self.find(method).ok_or_else(|| OrchestrationError::MethodNotFound {
            tool: self.name.clone(),
            method: method.to_string(),
        })?;
        let bound = found.descriptor.bind(&self.name, args)?;
        log::debug!("Invoking {}.{} with {:?}", self.name, method, bound);

        match &found.handler {
            Handler::Sync(f) => f(&bound),
            Handler::Async(f) => f(bound).await,
        }
    }

    fn find(&self, method: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.descriptor.name == method)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("methods", &self.descriptors().map(|d| &d.name).collect::<Vec<_>>())
            .finish()
    }
}

/// Collects methods for a [`Tool`].
pub struct ToolBuilder {
    name: String,
    methods: Vec<Method>,
}

impl ToolBuilder {
    /// Register a synchronous method.
    pub fn method<F>(mut self, descriptor: MethodDescriptor, f: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.push(Method {
            descriptor,
            handler: Handler::Sync(Arc::new(f)),
        });
        self
    }

    /// Register an asynchronous method. Its future is awaited on invocation.
    pub fn async_method<F, Fut>(mut self, descriptor: MethodDescriptor, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.methods.push(Method {
            descriptor,
            handler: Handler::Async(Arc::new(move |args| f(args).boxed())),
        });
        self
    }

    pub fn build(self) -> Result<Tool> {
        for (i, method) in self.methods.iter().enumerate() {
            let name = &method.descriptor.name;
            if self.methods[..i].iter().any(|m| &m.descriptor.name == name) {
                return Err(OrchestrationError::DuplicateMethod {
                    tool: self.name.clone(),
                    method: name.clone(),
                });
            }
        }
        Ok(Tool {
            name: self.name,
            methods: self.methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn greeter() -> Tool {
        Tool::builder("Greeter")
            .method(
                MethodDescriptor::new("greet", "Greets someone")
                    .param("name", ParamKind::Str)
                    .optional_param("excited", ParamKind::Bool, false)
                    .returns(ParamKind::Str),
                |args| {
                    let mark = if args.get("excited") == Some(&json!(true)) { "!" } else { "." };
                    Ok(json!(format!("Hello, {}{mark}", args.str("name")?)))
                },
            )
            .async_method(
                MethodDescriptor::new("wait", "").param("ms", ParamKind::Int),
                |args| async move {
                    let ms = args.int("ms")?;
                    tokio::time::sleep(std::time::Duration::from_millis(ms as u64)).await;
                    Ok::<_, OrchestrationError>(json!(ms))
                },
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_coercion_from_strings() {
        assert_eq!(ParamKind::Int.coerce(json!("945")).unwrap(), json!(945));
        assert_eq!(ParamKind::Int.coerce(json!("4.0")).unwrap(), json!(4));
        assert_eq!(ParamKind::Float.coerce(json!("2.5")).unwrap(), json!(2.5));
        assert_eq!(ParamKind::Bool.coerce(json!("True")).unwrap(), json!(true));
        assert_eq!(ParamKind::List.coerce(json!("[1, 2]")).unwrap(), json!([1, 2]));
        assert_eq!(ParamKind::Str.coerce(json!(12)).unwrap(), json!("12"));
        assert!(ParamKind::Int.coerce(json!("twelve")).is_err());
        assert!(ParamKind::Dict.coerce(json!("[1]")).is_err());
    }

    #[test]
    fn test_int_coercion_rejects_out_of_range() {
        assert!(ParamKind::Int.coerce(json!("1e30")).is_err());
        assert!(ParamKind::Int.coerce(json!(1e30)).is_err());
        assert!(ParamKind::Int.coerce(json!(-1e19)).is_err());
        assert_eq!(ParamKind::Int.coerce(json!("1e3")).unwrap(), json!(1000));
        assert_eq!(ParamKind::Int.coerce(json!(-2.0)).unwrap(), json!(-2));
    }

    #[test]
    fn test_describe_format() {
        let expected = "Tool Name: Greeter\nTool Methods:\n   - greet(name: str, excited: bool = false) -> str\n\tGreets someone\n   - wait(ms: int) -> any\n\tNo description provided";
        assert_eq!(greeter().describe(), expected);
        assert_eq!(greeter().describe(), greeter().describe());
    }

    #[tokio::test]
    async fn test_invoke_fills_defaults() {
        let tool = greeter();
        let out = tool
            .invoke("greet", &Arguments::new().with("name", "Ada"))
            .await
            .unwrap();
        assert_eq!(out, json!("Hello, Ada."));

        let out = tool
            .invoke("greet", &Arguments::new().with("name", "Ada").with("excited", "true"))
            .await
            .unwrap();
        assert_eq!(out, json!("Hello, Ada!"));

        let waited = tool.invoke("wait", &Arguments::new().with("ms", "1")).await.unwrap();
        assert_eq!(waited, json!(1));
    }

    #[tokio::test]
    async fn test_invoke_rejects_bad_arguments() {
        let tool = greeter();
        let missing = tool.invoke("greet", &Arguments::new()).await;
        assert!(matches!(missing, Err(OrchestrationError::InvalidArguments { .. })));

        let unknown = tool
            .invoke("greet", &Arguments::new().with("name", "Ada").with("mood", "calm"))
            .await;
        assert!(matches!(unknown, Err(OrchestrationError::InvalidArguments { .. })));

        let method = tool.invoke("wave", &Arguments::new()).await;
        assert_eq!(
            method,
            Err(OrchestrationError::MethodNotFound {
                tool: "Greeter".into(),
                method: "wave".into()
            })
        );
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let result = Tool::builder("Twice")
            .method(MethodDescriptor::new("a", ""), |_| Ok(Value::Null))
            .method(MethodDescriptor::new("a", ""), |_| Ok(Value::Null))
            .build();
        assert!(matches!(result, Err(OrchestrationError::DuplicateMethod { .. })));
    }
}
