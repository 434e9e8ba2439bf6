//! The greet tool: says hi to the named person.

use crate::error::{SchemaError, ToolError, ToolResult};
use crate::protocol::CallToolResult;
use crate::schema::{FieldType, Shape};
use crate::tools::registry::{ToolContext, ToolHandler};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct GreetArgs {
    pub name: String,
}

pub struct GreetTool {
    input_shape: Shape,
}

impl GreetTool {
    pub fn new() -> Result<Self, SchemaError> {
        let input_shape = Shape::builder()
            .field("name", FieldType::String, "the person to greet")
            .build()?;
        Ok(Self { input_shape })
    }
}

#[async_trait]
impl ToolHandler for GreetTool {
    fn name(&self) -> &str {
        "greet"
    }

    fn description(&self) -> &str {
        "say hi"
    }

    fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    #[instrument(skip(self, _ctx, arguments), fields(tool = "greet"))]
    async fn execute(&self, _ctx: ToolContext, arguments: Value) -> ToolResult<CallToolResult> {
        let args: GreetArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        Ok(CallToolResult::text(format!("Hi {}", args.name)))
    }
}
