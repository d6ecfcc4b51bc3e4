use serde_json::Value;

use crate::core::error::{OrchestrationError, Result};
use crate::core::message::{MessageFormat, formats};

/// Per-call overrides of an operator's defaults.
///
/// Unset fields fall back to the operator; when two option sets are merged the
/// right-hand side wins field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    pub response_format: Option<MessageFormat>,
    pub use_tools: Option<bool>,
    /// Explicit tool set, takes precedence over `use_tools`.
    pub tools: Option<Vec<String>>,
    pub run_async: Option<bool>,
    pub instructions: Option<String>,
    /// Name of the client to use instead of the operator's default.
    pub client: Option<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response_format(mut self, format: MessageFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_use_tools(mut self, use_tools: bool) -> Self {
        self.use_tools = Some(use_tools);
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_run_async(mut self, run_async: bool) -> Self {
        self.run_async = Some(run_async);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// `self` overlaid with every field set in `overrides`.
    pub fn merged(&self, overrides: &CallOptions) -> CallOptions {
        CallOptions {
            response_format: overrides
                .response_format
                .clone()
                .or_else(|| self.response_format.clone()),
            use_tools: overrides.use_tools.or(self.use_tools),
            tools: overrides.tools.clone().or_else(|| self.tools.clone()),
            run_async: overrides.run_async.or(self.run_async),
            instructions: overrides
                .instructions
                .clone()
                .or_else(|| self.instructions.clone()),
            client: overrides.client.clone().or_else(|| self.client.clone()),
        }
    }

    /// Reads an options object such as `{"response_format": "Summary", "use_tools": true}`.
    ///
    /// `response_format` may name a built-in format, use the shorthand syntax, or be a
    /// serialized [`MessageFormat`]. Unknown keys are ignored.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| OrchestrationError::invalid_args("options", "expected an object"))?;

        let mut options = CallOptions::new();
        for (key, value) in map {
            match key.as_str() {
                "response_format" => options.response_format = Some(parse_format(value)?),
                "use_tools" => options.use_tools = Some(expect_bool(key, value)?),
                "run_async" => options.run_async = Some(expect_bool(key, value)?),
                "instructions" => options.instructions = Some(expect_str(key, value)?.to_string()),
                "client" => options.client = Some(expect_str(key, value)?.to_string()),
                "tools" => {
                    let names = value
                        .as_array()
                        .ok_or_else(|| bad_option(key, "expected a list of tool names"))?
                        .iter()
                        .map(|v| expect_str(key, v).map(str::to_string))
                        .collect::<Result<Vec<_>>>()?;
                    options.tools = Some(names);
                }
                other => log::debug!("Ignoring unknown call option '{other}'"),
            }
        }
        Ok(options)
    }
}

fn parse_format(value: &Value) -> Result<MessageFormat> {
    match value {
        Value::String(name) => formats::builtin(name)
            .map(Ok)
            .unwrap_or_else(|| name.parse::<MessageFormat>())
            .map_err(|reason| bad_option("response_format", reason)),
        Value::Object(_) => serde_json::from_value(value.clone())
            .map_err(|e| bad_option("response_format", e.to_string())),
        other => Err(bad_option(
            "response_format",
            format!("expected a format name or object, got {other}"),
        )),
    }
}

fn expect_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| bad_option(key, format!("expected a bool, got {value}")))
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| bad_option(key, format!("expected a string, got {value}")))
}

fn bad_option(key: &str, reason: impl Into<String>) -> OrchestrationError {
    OrchestrationError::invalid_args(format!("option '{key}'"), reason)
}
