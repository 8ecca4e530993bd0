// Wire types for the compile endpoint.

use serde::{Deserialize, Serialize};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const ARTIFACT_FILE_NAME: &str = "output.pdf";

/// `POST /api/compile` request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileRequest {
    pub content: String,
}

/// JSON body returned for every failed compile request.
///
/// `error` is always `true`; it lets browser clients tell an error body apart
/// from a rendered artifact without inspecting the status code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileErrorBody {
    pub error: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl CompileErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: true, message: message.into(), code: None, request_id: None }
    }
}

/// `Content-Disposition` value asking the browser to display the artifact inline.
pub fn inline_disposition() -> String {
    format!("inline; filename=\"{ARTIFACT_FILE_NAME}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_parses_from_browser_payload() {
        let request: CompileRequest =
            serde_json::from_value(json!({ "content": "\\documentclass{article}" }))
                .expect("request should parse");
        assert_eq!(request.content, "\\documentclass{article}");
    }

    #[test]
    fn error_body_always_flags_error() {
        let body = serde_json::to_value(CompileErrorBody::new("! Undefined control sequence."))
            .expect("serialize error body");
        assert_eq!(body, json!({ "error": true, "message": "! Undefined control sequence." }));
    }

    #[test]
    fn disposition_is_inline_pdf() {
        assert_eq!(inline_disposition(), "inline; filename=\"output.pdf\"");
    }
}
