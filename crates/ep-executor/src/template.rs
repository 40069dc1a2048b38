//! Per-node command templating
//!
//! Command words may reference the node they run on:
//!
//! | placeholder | value                      |
//! |-------------|----------------------------|
//! | `{{ip}}`    | node address               |
//! | `{{role}}`  | first role of the node     |
//! | `{{roles}}` | all roles, comma separated |
//!
//! Rendering is strict: an unknown name is an error, not an empty string.

use handlebars::Handlebars;
use serde::Serialize;

use ep_core::NodeInfo;

use crate::error::ExecutorError;

#[derive(Serialize)]
struct NodeContext<'a> {
    ip: &'a str,
    role: &'a str,
    roles: String,
}

impl<'a> From<&'a NodeInfo> for NodeContext<'a> {
    fn from(node: &'a NodeInfo) -> Self {
        Self {
            ip: node.ip(),
            role: node.roles().first().map(String::as_str).unwrap_or_default(),
            roles: node.roles().join(","),
        }
    }
}

/// Renders command templates against node values
pub struct CommandTemplater {
    engine: Handlebars<'static>,
}

impl Default for CommandTemplater {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTemplater {
    pub fn new() -> Self {
        let mut engine = Handlebars::new();
        engine.set_strict_mode(true);
        engine.register_escape_fn(handlebars::no_escape);
        Self { engine }
    }

    /// Copy of `command` with every placeholder filled in for `node`.
    /// `command` itself is left untouched.
    pub fn cmd_override_with_node(
        &self,
        command: &[String],
        node: &NodeInfo,
    ) -> Result<Vec<String>, ExecutorError> {
        let context = NodeContext::from(node);
        let rendered = command
            .iter()
            .map(|word| {
                if !word.contains("{{") {
                    return Ok(word.clone());
                }
                self.engine
                    .render_template(word, &context)
                    .map_err(|source| ExecutorError::Template {
                        node: node.ip().to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(node = %node.ip(), command = ?rendered, "Templated command");
        Ok(rendered)
    }
}
