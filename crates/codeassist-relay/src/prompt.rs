//! Command templates and prompt assembly.
//!
//! Each command has a handlebars template for the user turn and a fixed system
//! instruction. Placeholders: `code`, `prompt`, `error`, `language`,
//! `file_name`. Unknown placeholders render empty.

use std::collections::HashMap;

use handlebars::Handlebars;
use serde::Serialize;

use crate::command::{CommandKind, CommandRequest};
use crate::errors::RelayError;

const EXPLAIN: &str = "Explain what the following code does, how it works and any pitfalls worth knowing.\
{{#if code}}\n\n```{{language}}\n{{code}}\n```{{/if}}\
{{#if prompt}}\n\nQuestion: {{prompt}}{{/if}}";

const GENERATE: &str = "Write {{#if language}}{{language}} {{/if}}code for the following request. \
Return the code with brief comments and nothing else.\n\n{{prompt}}";

const FIX: &str = "Find and fix the bug in the following code.\
{{#if error}}\n\nError:\n{{error}}{{/if}}\
{{#if code}}\n\n```{{language}}\n{{code}}\n```{{/if}}\
{{#if prompt}}\n\nDetails: {{prompt}}{{/if}}\
\n\nReturn the corrected code followed by a short explanation of the change.";

const REFACTOR: &str = "Refactor the following code for readability and maintainability without changing its behaviour.\
{{#if code}}\n\n```{{language}}\n{{code}}\n```{{/if}}\
{{#if prompt}}\n\nFocus: {{prompt}}{{/if}}\
\n\nReturn the refactored code and list the changes you made.";

const TEST: &str = "Write thorough unit tests for the following code, covering normal cases and edge cases.\
{{#if code}}\n\n```{{language}}\n{{code}}\n```{{/if}}\
{{#if prompt}}\n\nRequirements: {{prompt}}{{/if}}";

const DOCS: &str = "Write documentation for the following code: a summary, parameters, return values and a usage example.\
{{#if code}}\n\n```{{language}}\n{{code}}\n```{{/if}}\
{{#if prompt}}\n\nNotes: {{prompt}}{{/if}}";

fn default_template(command: CommandKind) -> &'static str {
    match command {
        CommandKind::Explain => EXPLAIN,
        CommandKind::Generate => GENERATE,
        CommandKind::Fix => FIX,
        CommandKind::Refactor => REFACTOR,
        CommandKind::Test => TEST,
        CommandKind::Docs => DOCS,
    }
}

fn system_instruction(command: CommandKind) -> &'static str {
    match command {
        CommandKind::Explain => {
            "You are a senior software engineer explaining code to a colleague. Be accurate and concise."
        }
        CommandKind::Generate => {
            "You are an expert programmer. Write idiomatic, production-quality code."
        }
        CommandKind::Fix => {
            "You are an expert debugger. Identify the root cause before proposing a minimal fix."
        }
        CommandKind::Refactor => {
            "You are an expert software engineer focused on clean, maintainable code."
        }
        CommandKind::Test => {
            "You are an expert in software testing. Use the conventional test framework for the language."
        }
        CommandKind::Docs => "You are a technical writer who documents code clearly for developers.",
    }
}

/// Values available to a command template.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TemplateValues {
    pub code: String,
    pub prompt: String,
    pub error: String,
    pub language: String,
    pub file_name: String,
}

impl TemplateValues {
    pub fn from_request(request: &CommandRequest) -> Self {
        let context = request.context.as_ref();
        Self {
            code: request.file_content().unwrap_or_default().to_string(),
            prompt: request.input.trim().to_string(),
            error: context
                .and_then(|c| c.error_text())
                .unwrap_or_default()
                .to_string(),
            language: context
                .and_then(|c| c.language.clone())
                .unwrap_or_default(),
            file_name: context
                .and_then(|c| c.file_name.clone())
                .unwrap_or_default(),
        }
    }
}

/// Prompt sent to a provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Single-string form for providers without a system/user split.
    pub fn concatenated(&self) -> String {
        if self.system.is_empty() {
            return self.user.clone();
        }
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Renders command templates into prompts.
pub struct TemplateRegistry {
    handlebars: Handlebars<'static>,
    system: HashMap<CommandKind, String>,
}

impl TemplateRegistry {
    /// Registry with the built-in template for every command.
    pub fn with_defaults() -> Result<Self, RelayError> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(false);

        let mut registry = Self {
            handlebars,
            system: HashMap::new(),
        };
        for command in CommandKind::ALL {
            registry.set_template(command, default_template(command))?;
            registry
                .system
                .insert(command, system_instruction(command).to_string());
        }
        Ok(registry)
    }

    /// Replaces the user-turn template for `command`.
    pub fn set_template(&mut self, command: CommandKind, template: &str) -> Result<(), RelayError> {
        self.handlebars
            .register_template_string(command.as_str(), template)
            .map_err(|e| {
                RelayError::configuration(format!("invalid template for {command}: {e}"))
            })
    }

    /// Renders the user-turn template for `command`.
    pub fn render(&self, command: CommandKind, values: &TemplateValues) -> Result<String, RelayError> {
        self.handlebars
            .render(command.as_str(), values)
            .map_err(|e| RelayError::configuration(format!("failed to render {command} template: {e}")))
    }

    /// Builds the full prompt for a request.
    ///
    /// When the request carries file content the rendered template did not
    /// include, a delimited `File:` block is appended.
    pub fn assemble(&self, request: &CommandRequest) -> Result<Prompt, RelayError> {
        let values = TemplateValues::from_request(request);
        let mut user = self.render(request.command, &values)?;

        if let Some(content) = request.file_content()
            && !user.contains(content)
        {
            let name = if values.file_name.is_empty() {
                "untitled"
            } else {
                values.file_name.as_str()
            };
            user.push_str(&format!(
                "\n\nFile: {name}\n```{}\n{}\n```",
                values.language,
                content.trim_end_matches('\n')
            ));
        }

        let system = self
            .system
            .get(&request.command)
            .cloned()
            .unwrap_or_default();
        Ok(Prompt {
            system,
            user: user.trim().to_string(),
        })
    }
}
