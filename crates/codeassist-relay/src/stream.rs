use serde::{Deserialize, Serialize};

use crate::command::CommandKind;

/// Events emitted for one relay invocation, in wire order: one `Start`, any
/// number of `Data`, one `End`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Start {
        command: CommandKind,
    },
    Data {
        content: String,
    },
    End {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl StreamEvent {
    pub fn data(content: impl Into<String>) -> Self {
        Self::Data {
            content: content.into(),
        }
    }

    pub fn success() -> Self {
        Self::End {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::End {
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"end","success":false,"error":"event encoding failed"}"#.to_string()
        })
    }

    /// Encodes the event as one server-sent-events frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}
