use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling an `EngineConfig`.
///
/// All of these are fatal: they are reported before any URL is dispatched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read rule file at {path:?}: {source}")]
    ReadRuleFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule file {path:?}: {message}")]
    ParseRuleFile { path: PathBuf, message: String },

    /// A rule pattern did not compile. Carries the regex engine's detail.
    #[error("Regex for rule '{rule}' failed to compile: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("If --match or --replace is set, the other must be set as well")]
    IncompleteMatchReplace,

    #[error("Worker count must be at least 1")]
    NoWorkers,
}

/// Errors from parsing or decoding a query string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid semicolon separator in query")]
    Semicolon,
    #[error("invalid URL escape {0:?}")]
    MalformedEscape(String),
    #[error("decoded query is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors that end a single mutation job early.
///
/// These never leave the worker that raised them.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Failed to parse query string of {url}: {source}")]
    QueryParse {
        url: String,
        #[source]
        source: CodecError,
    },
    /// The result channel was closed underneath the job.
    #[error("Output channel closed")]
    OutputClosed,
}

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to read input URLs: {0}")]
    Input(#[source] std::io::Error),
    #[error("Failed to write results: {0}")]
    Sink(#[source] std::io::Error),
    #[error("Failed to start the worker runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("A mutation job panicked")]
    WorkerPanicked,
}
