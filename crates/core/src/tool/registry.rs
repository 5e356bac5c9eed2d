use std::collections::HashMap;
use std::fmt::{self, Debug};

use finchat_model::ModelTool;
use serde_json::{Map, Value};

use super::object::{ToolObject, ToolObjectImpl};
use super::schema::validate;
use super::{Error, Tool, ToolResult};

/// The fixed catalog of tools offered to the model.
///
/// Tools keep their registration order, which is also the order of
/// [`definitions`](Self::definitions).
#[derive(Default)]
pub struct Registry {
    tools: Vec<Box<dyn ToolObject>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. A tool with the same name is replaced in place.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        let tool = Box::new(ToolObjectImpl(tool));
        match self.index.get(&name) {
            Some(&idx) => {
                debug!("replacing tool {name}");
                self.tools[idx] = tool;
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the definitions sent to the model.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools
            .iter()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect()
    }

    /// Validates and runs one tool call.
    ///
    /// This never fails: every problem becomes a failure [`ToolResult`]
    /// the model can read and react to.
    pub async fn execute(&self, name: &str, raw_arguments: &str) -> ToolResult {
        let operation = Some(name.to_owned());
        let Some(&idx) = self.index.get(name) else {
            warn!("tool not found: {name}");
            let reason = format!("no tool named `{name}` is available");
            return ToolResult::failure(
                operation,
                Error::unknown_tool().with_reason(reason),
            );
        };
        let tool = &self.tools[idx];

        let arguments = match parse_arguments(raw_arguments) {
            Ok(arguments) => arguments,
            Err(err) => return ToolResult::failure(operation, err),
        };
        if let Err(violation) = validate(tool.parameter_schema(), &arguments) {
            debug!("arguments of {name} break the schema: {violation}");
            return ToolResult::failure(
                operation,
                Error::schema_violation().with_reason(violation.to_string()),
            );
        }

        trace!("executing {name} with {arguments}");
        match tool.execute(arguments).await {
            Ok(data) => ToolResult::success(name, data),
            Err(err) => {
                debug!("tool {name} failed: {err}");
                ToolResult::failure(operation, err)
            }
        }
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|tool| tool.name()))
            .finish()
    }
}

fn parse_arguments(raw: &str) -> Result<Value, Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(Error::invalid_arguments().with_reason(format!(
            "arguments must be a JSON object, got `{other}`"
        ))),
        Err(err) => Err(Error::invalid_arguments()
            .with_reason(format!("arguments are not valid JSON: {err}"))),
    }
}
