use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;
use crate::model::ProviderId;

/// The fixed set of AI operations a caller can invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Explain,
    Generate,
    Fix,
    Refactor,
    Test,
    Docs,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Explain,
        CommandKind::Generate,
        CommandKind::Fix,
        CommandKind::Refactor,
        CommandKind::Test,
        CommandKind::Docs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Explain => "explain",
            CommandKind::Generate => "generate",
            CommandKind::Fix => "fix",
            CommandKind::Refactor => "refactor",
            CommandKind::Test => "test",
            CommandKind::Docs => "docs",
        }
    }

    /// Whether the command can run on file content alone, without a typed
    /// instruction.
    pub fn works_on_file(self) -> bool {
        !matches!(self, CommandKind::Generate)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| RelayError::validation(format!("unknown command: {wanted:?}")))
    }
}

/// File the user had open when invoking the command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContext {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub file_content: Option<String>,
    /// Error text pasted alongside a `fix` request.
    #[serde(default)]
    pub error: Option<String>,
}

impl FileContext {
    pub fn content(&self) -> Option<&str> {
        non_blank(self.file_content.as_deref())
    }

    pub fn error_text(&self) -> Option<&str> {
        non_blank(self.error.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// One command invocation. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandRequest {
    pub command: CommandKind,
    pub input: String,
    pub context: Option<FileContext>,
    pub provider: Option<ProviderId>,
}

impl CommandRequest {
    pub fn new(command: CommandKind, input: impl Into<String>) -> Self {
        Self {
            command,
            input: input.into(),
            context: None,
            provider: None,
        }
    }

    pub fn with_context(mut self, context: FileContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<ProviderId>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn file_content(&self) -> Option<&str> {
        self.context.as_ref().and_then(FileContext::content)
    }

    /// Rejects requests that carry nothing to act on.
    pub fn validate(&self) -> Result<(), RelayError> {
        if !self.input.trim().is_empty() {
            return Ok(());
        }
        if self.command.works_on_file() && self.file_content().is_some() {
            return Ok(());
        }
        Err(RelayError::validation(format!(
            "input is required for the {} command",
            self.command
        )))
    }
}
