use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::core::arguments::Arguments;
use crate::core::error::{OrchestrationError, Result};
use crate::core::tool::Tool;

/// Named tools shared by every operator of an orchestrator.
///
/// Passed around as `Arc<ToolRegistry>`; registration takes `&self` so tools added after
/// an operator was built are still visible to it.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `tools`.
    pub fn with_tools(tools: impl IntoIterator<Item = Tool>) -> Result<Self> {
        let registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn register(&self, tool: Tool) -> Result<()> {
        let mut tools = self.write();
        if tools.contains_key(tool.name()) {
            return Err(OrchestrationError::DuplicateTool(tool.name().to_string()));
        }
        log::debug!("Registering tool '{}'", tool.name());
        tools.insert(tool.name().to_string(), Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn describe(&self, name: &str) -> Result<String> {
        self.require(name).map(|tool| tool.describe())
    }

    /// Descriptions of `names` in the given order, separated by blank lines.
    pub fn describe_all<S: AsRef<str>>(&self, names: &[S]) -> Result<String> {
        let descriptions = names
            .iter()
            .map(|name| self.describe(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(descriptions.join("\n\n"))
    }

    /// Resolve `(tool, method, args)` and run the method.
    pub async fn invoke(&self, name: &str, method: &str, args: &Arguments) -> Result<Value> {
        let tool = self.require(name)?;
        tool.invoke(method, args).await
    }

    fn require(&self, name: &str) -> Result<Arc<Tool>> {
        self.get(name)
            .ok_or_else(|| OrchestrationError::ToolNotFound(name.to_string()))
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<Tool>>> {
        self.tools.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<Tool>>> {
        self.tools.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tool::Arithmetic;
    use serde_json::json;

    #[tokio::test]
    async fn test_registry_dispatch() {
        let registry = ToolRegistry::with_tools([Arithmetic::tool().unwrap()]).unwrap();
        let args = Arguments::new().with("x", "945").with("y", "624");

        let sum = registry.invoke("Arithmetic", "add", &args).await.unwrap();
        assert_eq!(sum, json!(1569));

        let err = registry.invoke("Arithmetic", "divide", &args).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::MethodNotFound { .. }));

        let err = registry.invoke("Abacus", "add", &args).await.unwrap_err();
        assert_eq!(err, OrchestrationError::ToolNotFound("Abacus".into()));
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = ToolRegistry::new();
        registry.register(Arithmetic::tool().unwrap()).unwrap();
        let err = registry.register(Arithmetic::tool().unwrap()).unwrap_err();
        assert_eq!(err, OrchestrationError::DuplicateTool("Arithmetic".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_describe_all_keeps_order() {
        let registry = ToolRegistry::with_tools([Arithmetic::tool().unwrap()]).unwrap();
        let text = registry.describe_all(&["Arithmetic"]).unwrap();
        assert!(text.starts_with("Tool Name: Arithmetic"));
        assert!(registry.describe_all(&["Arithmetic", "Missing"]).is_err());
    }
}
