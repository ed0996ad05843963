//! Built-in handlers.
//!
//! These are deliberately generic; site-specific policy belongs in handlers
//! compiled into a downstream binary and registered alongside these.

mod block_tools;
mod context_lines;

pub use block_tools::BlockTools;
pub use context_lines::ContextLines;

use crate::registry::Registration;

/// Registration table for every built-in handler.
pub const BUILTINS: &[Registration] = &[
    Registration::new(block_tools::NAME, block_tools::construct)
        .priority(10)
        .tags(&["safety"]),
    Registration::new(context_lines::NAME, context_lines::construct)
        .priority(90)
        .terminal(false)
        .tags(&["context"]),
];

/// Deserialize handler options, mapping failures to `InvalidOptions`.
pub(crate) fn parse_options<T: serde::de::DeserializeOwned>(
    handler: &str,
    options: &serde_json::Value,
) -> Result<T, crate::handler::HandlerError> {
    let options = if options.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        options.clone()
    };
    serde_json::from_value(options).map_err(|e| crate::handler::HandlerError::InvalidOptions {
        handler: handler.to_string(),
        message: e.to_string(),
    })
}
