use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::Code;

/// Shared, cloneable handle to an underlying failure
type SharedError = Arc<dyn Error + Send + Sync>;

/// Every underlying failure attached to a [`SemanticError`]
///
/// Attaching a second cause appends to the aggregate instead of replacing the
/// first one, so classification can still see all of them.
#[derive(Debug, Clone, Default)]
pub struct Causes(Vec<SharedError>);

impl Causes {
    /// Number of attached causes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no cause was attached
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate causes in attachment order
    pub fn iter(&self) -> impl Iterator<Item = &(dyn Error + Send + Sync + 'static)> {
        self.0.iter().map(AsRef::as_ref)
    }

    fn push(&mut self, cause: SharedError) {
        self.0.push(cause);
    }
}

impl fmt::Display for Causes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cause) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{cause}")?;
        }
        Ok(())
    }
}

impl Error for Causes {}

/// Structured failure carrying a canonical code and two separate messages
///
/// The internal message, operation, and causes are for operators. Only the
/// code, safe message, and details ever cross a transport boundary, through
/// [`SemanticError::to_wire`] or the `Serialize` impl that delegates to it.
#[derive(Debug, Clone, Default)]
pub struct SemanticError {
    code: Code,
    message: String,
    safe_message: Option<String>,
    operation: Option<String>,
    causes: Causes,
    details: Map<String, Value>,
}

impl SemanticError {
    /// Create an error with only a code
    pub fn new(code: Code) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    /// Set the internal diagnostic message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the message that is safe to show to external callers
    #[must_use]
    pub fn with_safe_message(mut self, message: impl Into<String>) -> Self {
        self.safe_message = Some(message.into());
        self
    }

    /// Label the call site that failed
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attach an underlying failure, keeping any previously attached ones
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        self.causes.push(Arc::from(cause.into()));
        self
    }

    /// Merge structured details; colliding keys take the new value
    #[must_use]
    pub fn with_details<K, V>(mut self, details: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.details
            .extend(details.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Merge a single detail
    #[must_use]
    pub fn with_detail(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_details([(key, value)])
    }

    pub const fn code(&self) -> Code {
        self.code
    }

    /// Internal diagnostic message, possibly empty
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Public message, falling back to the code symbol when none was set
    pub fn safe_message(&self) -> &str {
        self.safe_message.as_deref().unwrap_or(self.code.symbol())
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub const fn causes(&self) -> &Causes {
        &self.causes
    }

    pub const fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    /// Whether this error, or any attached cause, carries `code`
    pub fn is(&self, code: Code) -> bool {
        self.code == code || self.causes.iter().any(|cause| is(cause, code))
    }

    /// First semantic error in an error's source chain
    pub fn find<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a Self> {
        let mut current = Some(err);
        while let Some(err) = current {
            if let Some(semantic) = err.downcast_ref::<Self>() {
                return Some(semantic);
            }
            current = err.source();
        }
        None
    }

    /// The externally visible projection
    pub fn to_wire(&self) -> WireError {
        WireError {
            code: self.code,
            message: self.safe_message().to_owned(),
            details: self.details.clone(),
        }
    }
}

impl From<Code> for SemanticError {
    fn from(code: Code) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref operation) = self.operation {
            write!(f, "{operation}: ")?;
        }

        if self.message.is_empty() {
            f.write_str(self.code.symbol())?;
        } else {
            f.write_str(&self.message)?;
        }

        if !self.causes.is_empty() {
            write!(f, ": {}", self.causes)?;
        }

        Ok(())
    }
}

impl Error for SemanticError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self.causes.0.as_slice() {
            [] => None,
            [single] => Some(single.as_ref()),
            _ => Some(&self.causes),
        }
    }
}

impl Serialize for SemanticError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

/// Whether any semantic error in `err`'s chain carries `code`
pub fn is(err: &(dyn Error + 'static), code: Code) -> bool {
    SemanticError::find(err).is_some_and(|semantic| semantic.is(code))
}

/// JSON error body exchanged between services
///
/// `{"code": <symbol>, "message": <safe message>, "details": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub code: Code,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl WireError {
    /// Body sent for failures that carry no classification
    pub fn internal() -> Self {
        Self {
            code: Code::Internal,
            message: "Internal Server Error".to_owned(),
            details: Map::new(),
        }
    }

    /// Decode a body into a semantic error
    ///
    /// Returns `None` when the bytes are not a wire error or the code is
    /// missing or unrecognized.
    pub fn decode(bytes: &[u8]) -> Option<SemanticError> {
        serde_json::from_slice::<Self>(bytes)
            .ok()
            .and_then(Self::into_error)
    }

    /// Rebuild a semantic error from a received body
    pub fn into_error(self) -> Option<SemanticError> {
        if self.code == Code::Unknown {
            return None;
        }

        let message = if self.message.is_empty() {
            self.code.symbol().to_owned()
        } else {
            self.message
        };

        Some(
            SemanticError::new(self.code)
                .with_message(message.clone())
                .with_safe_message(message)
                .with_details(self.details),
        )
    }

    /// Serialize to JSON bytes
    pub fn to_json(&self) -> Vec<u8> {
        // A struct of strings and JSON values always serializes
        serde_json::to_vec(self).unwrap_or_default()
    }
}
