//! Domain error types.

/// A parse or syntax error with position information.
///
/// Produced both by the expression parser (malformed input) and by the
/// validator (well-formed input using a construct outside the allow-list).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("syntax rejected at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }

    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for tacalc.
#[derive(Debug, thiserror::Error)]
pub enum TacalcError {
    #[error(transparent)]
    SyntaxRejected(#[from] ParseError),

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("unsupported implementation kind '{kind}' for function '{name}'")]
    UnsupportedFunctionKind { name: String, kind: String },

    #[error("no native implementation for function '{name}'")]
    MissingNativeImplementation { name: String },

    #[error("indicator '{indicator}' has no exec_plan")]
    MissingExecPlan { indicator: String },

    #[error("invalid indicator definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("environment error: {reason}")]
    EnvironmentError { reason: String },

    #[error("evaluation error: {reason}")]
    EvaluationError { reason: String },

    #[error("indicator_name '{name}' already exists")]
    DuplicateName { name: String },

    #[error("indicator '{id}' not found")]
    NotFound { id: String },

    #[error("invalid timeframe '{label}': {reason}")]
    InvalidTimeframe { label: String, reason: String },

    #[error("invalid price bar: {reason}")]
    InvalidBar { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TacalcError {
    pub fn evaluation(reason: impl Into<String>) -> Self {
        TacalcError::EvaluationError {
            reason: reason.into(),
        }
    }

    pub fn environment(reason: impl Into<String>) -> Self {
        TacalcError::EnvironmentError {
            reason: reason.into(),
        }
    }

    pub fn invalid_timeframe(label: &str, reason: impl Into<String>) -> Self {
        TacalcError::InvalidTimeframe {
            label: label.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&TacalcError> for std::process::ExitCode {
    fn from(err: &TacalcError) -> Self {
        let code: u8 = match err {
            TacalcError::Io(_) | TacalcError::Serialization(_) => 1,
            TacalcError::ConfigParse { .. }
            | TacalcError::ConfigMissing { .. }
            | TacalcError::ConfigInvalid { .. } => 2,
            TacalcError::Database { .. } | TacalcError::DatabaseQuery { .. } => 3,
            TacalcError::SyntaxRejected(_)
            | TacalcError::UnknownFunction { .. }
            | TacalcError::UnknownVariable { .. } => 4,
            TacalcError::MissingExecPlan { .. }
            | TacalcError::InvalidDefinition { .. }
            | TacalcError::DuplicateName { .. }
            | TacalcError::NotFound { .. } => 5,
            TacalcError::EnvironmentError { .. }
            | TacalcError::EvaluationError { .. }
            | TacalcError::InvalidTimeframe { .. }
            | TacalcError::InvalidBar { .. } => 6,
            TacalcError::UnsupportedFunctionKind { .. }
            | TacalcError::MissingNativeImplementation { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}
