// Agent tool calls that mutate the document.
//
// The chat agent edits a document by calling the `editFile` tool with the
// complete replacement text. The call is parsed here and staged for human
// review by the editor; it never touches the document directly.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const EDIT_FILE_TOOL: &str = "editFile";

/// Tool result reported back to the agent once its edit is staged.
pub const EDIT_STAGED_RESULT: &str = "File edited";
/// Tool result reported back when another proposal is still awaiting review.
pub const EDIT_BUSY_RESULT: &str = "Another edit is already awaiting review";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    EditFile { new_file: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToolCall {
    tool_name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditFileArgs {
    new_file: String,
}

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("malformed tool call: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unsupported tool `{0}`")]
    UnsupportedTool(String),
    #[error("invalid arguments for tool `{tool}`: {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ToolCall {
    pub fn from_value(value: Value) -> Result<Self, ToolCallError> {
        let raw: RawToolCall = serde_json::from_value(value).map_err(ToolCallError::Malformed)?;
        match raw.tool_name.as_str() {
            EDIT_FILE_TOOL => {
                let args: EditFileArgs = serde_json::from_value(raw.args).map_err(|source| {
                    ToolCallError::InvalidArguments { tool: raw.tool_name.clone(), source }
                })?;
                Ok(Self::EditFile { new_file: args.new_file })
            }
            _ => Err(ToolCallError::UnsupportedTool(raw.tool_name)),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ToolCallError> {
        let value: Value = serde_json::from_slice(bytes).map_err(ToolCallError::Malformed)?;
        Self::from_value(value)
    }
}
