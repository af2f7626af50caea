//! Error types for template compilation.
//!
//! This module provides [`Error`], the single error type returned by every
//! fallible operation in tessel. Variants follow the failure taxonomy of the
//! compiler pipeline:
//!
//! | Variant | Raised when | Recoverable |
//! |---------|-------------|-------------|
//! | [`Error::Loader`] | a template name cannot be resolved to source | caller decides |
//! | [`Error::Syntax`] | tokenizing, parsing or emission fails | no |
//! | [`Error::Runtime`] | a compiled unit or extension cannot be provided | no |
//! | [`Error::Logic`] | the API is misused (mutating a frozen registry, ...) | no |
//! | [`Error::Configuration`] | an extension declares malformed globals | no |
//! | [`Error::InvalidArgument`] | an extension declares malformed operators | no |
//! | [`Error::CacheIo`] | the on-disk unit cache cannot be written or read | no |
//!
//! Loader, syntax and runtime errors are *template errors*: they carry the
//! template name and a best-effort source line. The environment enriches them
//! with the template name as they propagate instead of hiding them.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for tessel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all compiler, registry, loader and cache operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Template name could not be resolved to source.
    #[error("{0}")]
    Loader(TemplateError),

    /// Tokenizing, parsing or code emission failed.
    #[error("{0}")]
    Syntax(TemplateError),

    /// A compiled unit or extension could not be provided at runtime.
    #[error("{0}")]
    Runtime(TemplateError),

    /// Programmer misuse of the API.
    #[error("{0}")]
    Logic(String),

    /// An extension returned a malformed declaration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An extension declared an invalid operator table.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The persisted unit cache could not be created, written or read.
    #[error("cache error: {message} ({})", path.display())]
    CacheIo {
        /// Path that failed.
        path: PathBuf,
        /// What was being attempted.
        message: String,
        /// Underlying I/O failure, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Uncategorized I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure raised by foreign code (custom loaders, lexers, parsers).
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Creates a loader error with the given message.
    pub fn loader(message: impl Into<String>) -> Self {
        Error::Loader(TemplateError::new(message))
    }

    /// Creates a syntax error with the given message and source line.
    pub fn syntax(message: impl Into<String>, line: Option<usize>) -> Self {
        Error::Syntax(TemplateError::new(message).at_line(line))
    }

    /// Creates a runtime error with the given message.
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(TemplateError::new(message))
    }

    /// Creates a logic error with the given message.
    pub fn logic(message: impl Into<String>) -> Self {
        Error::Logic(message.into())
    }

    /// Creates a cache error for `path`.
    pub fn cache_io(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: Option<std::io::Error>,
    ) -> Self {
        Error::CacheIo {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Returns true for loader, syntax and runtime errors.
    pub fn is_template_error(&self) -> bool {
        self.template_error().is_some()
    }

    /// Returns true if this is a loader (not found) error.
    pub fn is_loader_error(&self) -> bool {
        matches!(self, Error::Loader(_))
    }

    /// Returns the template error payload, if any.
    pub fn template_error(&self) -> Option<&TemplateError> {
        match self {
            Error::Loader(err) | Error::Syntax(err) | Error::Runtime(err) => Some(err),
            _ => None,
        }
    }

    fn template_error_mut(&mut self) -> Option<&mut TemplateError> {
        match self {
            Error::Loader(err) | Error::Syntax(err) | Error::Runtime(err) => Some(err),
            _ => None,
        }
    }

    /// Annotates a template error with the template name.
    ///
    /// A name that is already set is kept. Other variants are returned
    /// unchanged.
    pub fn with_template_name(mut self, name: impl Into<String>) -> Self {
        if let Some(err) = self.template_error_mut() {
            if err.template_name.is_none() {
                err.template_name = Some(name.into());
            }
        }
        self
    }

    /// Attaches "did you mean" suggestions to a template error.
    ///
    /// Candidates within an edit distance of a third of `name`'s length, or
    /// containing `name`, are kept, closest first.
    pub fn with_suggestions<'a, I>(mut self, name: &str, candidates: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        if let Some(err) = self.template_error_mut() {
            err.suggestions = suggest(name, candidates);
        }
        self
    }
}

/// Payload shared by loader, syntax and runtime errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    message: String,
    template_name: Option<String>,
    line: Option<usize>,
    suggestions: Vec<String>,
}

impl TemplateError {
    /// Creates a template error without location information.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            template_name: None,
            line: None,
            suggestions: Vec::new(),
        }
    }

    /// Sets the source line (`None` means unknown).
    pub fn at_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }

    /// The raw message, without location.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The template the error occurred in, if known.
    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    /// The source line, if known.
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    /// The source line as a marker, `-1` when unknown.
    pub fn line_marker(&self) -> i64 {
        self.line.map_or(-1, |line| line as i64)
    }

    /// Suggested alternatives for an unknown name.
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (message, trailing_dot) = match self.message.strip_suffix('.') {
            Some(stripped) => (stripped, true),
            None => (self.message.as_str(), false),
        };
        f.write_str(message)?;
        if let Some(name) = &self.template_name {
            write!(f, " in \"{}\"", name)?;
        }
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }
        if trailing_dot {
            f.write_str(".")?;
        }
        if !self.suggestions.is_empty() {
            write!(f, " Did you mean \"{}\"?", self.suggestions.join("\", \""))?;
        }
        Ok(())
    }
}

fn suggest<'a, I>(name: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let threshold = name.chars().count() / 3;
    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance = strsim::levenshtein(name, candidate);
            (distance <= threshold || candidate.contains(name)).then_some((distance, candidate))
        })
        .collect();
    scored.sort();
    scored.dedup();
    scored.into_iter().map(|(_, c)| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_error_display_with_location() {
        let err = Error::syntax("Unexpected token.", Some(3)).with_template_name("index.tsl");
        assert_eq!(
            err.to_string(),
            "Unexpected token in \"index.tsl\" at line 3."
        );
    }

    #[test]
    fn test_template_error_unknown_line_marker() {
        let err = Error::syntax("boom", None);
        let payload = err.template_error().unwrap();
        assert_eq!(payload.line_marker(), -1);
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_with_template_name_ignores_non_template_errors() {
        let err = Error::logic("misuse").with_template_name("a");
        assert!(matches!(err, Error::Logic(ref msg) if msg == "misuse"));
    }

    #[test]
    fn test_suggestions_closest_first() {
        let err = Error::syntax("Unknown \"uper\" filter.", Some(1))
            .with_suggestions("uper", ["lower", "upper", "length"]);
        let payload = err.template_error().unwrap();
        assert_eq!(payload.suggestions(), ["upper"]);
        assert!(err.to_string().ends_with("Did you mean \"upper\"?"));
    }

    #[test]
    fn test_is_loader_error() {
        assert!(Error::loader("missing").is_loader_error());
        assert!(!Error::syntax("bad", None).is_loader_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
