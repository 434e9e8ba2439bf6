//! Tool definitions and registry.

pub mod greet;
pub mod registry;

pub use greet::GreetTool;
pub use registry::{ToolContext, ToolHandler, ToolRegistry};

use crate::error::Result;

/// Create the registry with the built-in tools registered.
pub fn create_registry() -> Result<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry.register(GreetTool::new()?)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_registry_registers_greet() {
        let registry = create_registry().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("greet").is_some());
    }
}
