//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use catastro_worker::ConvertError;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug, Serialize)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    /// Unknown record type code
    pub fn unknown_table(code: &str) -> Self {
        Self::new(format!("Unknown record type: '{}'", code))
            .with_context("Only the alphanumeric CAT record types 11, 13, 14, 15, 16 and 17 are supported")
            .with_suggestion("TRY: List supported types: catastro tables")
    }

    /// Config file could not be loaded
    pub fn config_file(path: &Path, details: &str) -> Self {
        Self::new(format!("Cannot use config file: {}", path.display()))
            .with_context(details.to_string())
            .with_suggestions([
                "TRY: Check the TOML syntax and key names (chunk, on_error, encoding, compression, pipelined, max_logged_rejections)".to_string(),
                "TRY: Run without --config to use the built-in defaults".to_string(),
            ])
    }

    /// Map a conversion failure to a message with remediation hints
    pub fn from_convert(err: &ConvertError) -> Self {
        match err {
            ConvertError::Config(message) => Self::new(message.clone())
                .with_context("The run was rejected before any record was processed")
                .with_suggestions([
                    "TRY: Check that --input points to a CAT file or a folder of .CAT files",
                    "TRY: Check that the output folder is writable",
                    "TRY: List supported record types: catastro tables",
                ]),
            ConvertError::Read { path, offset, .. } => Self::new(err.to_string())
                .with_context(format!(
                    "Reading stopped after {} bytes of {}",
                    offset,
                    path.display()
                ))
                .with_suggestion("TRY: Check that the file is readable and not being modified"),
            ConvertError::Decode { path, line, .. } => Self::new(err.to_string())
                .with_context("The run used --on-error abort, so the first bad line stops it")
                .with_suggestions([
                    format!("TRY: Inspect line {} of {}", line, path.display()),
                    "TRY: Skip malformed lines instead: --on-error skip".to_string(),
                ]),
            ConvertError::Schema(_) => Self::new(err.to_string())
                .with_context("A decoded row did not match the layout schema")
                .with_suggestion("TRY: Report this with the input line that triggered it"),
            ConvertError::Sink(_) | ConvertError::Writer(_) => Self::new(err.to_string())
                .with_context("Writing the Parquet output failed; no partial file was left behind")
                .with_suggestions([
                    "TRY: Check free disk space in the output folder",
                    "TRY: Check write permissions for the output folder",
                ]),
            ConvertError::Cancelled => Self::new(err.to_string())
                .with_context("The run was interrupted; no output was written"),
        }
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Text form of any command error.
pub fn render(err: &anyhow::Error) -> String {
    match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => helpful.to_string(),
        None => format!("ERROR: {:#}", err),
    }
}

/// Print an error as a JSON object on stdout.
pub fn print_json_error(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({ "status": "error", "error": helpful }),
        None => serde_json::json!({
            "status": "error",
            "error": { "message": format!("{:#}", err), "suggestions": [] },
        }),
    };
    println!("{}", payload);
}
