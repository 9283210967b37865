use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical outcome of a call, independent of the transport that carried it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Code {
    /// The call succeeded
    Ok,
    /// The caller sent an invalid argument
    Invalid,
    /// The caller is not authenticated
    Unauthorized,
    /// The caller is authenticated but not allowed to perform the call
    PermissionDenied,
    /// The requested entity does not exist
    NotFound,
    /// An invariant was broken on the serving side
    Internal,
    /// The service is temporarily unable to serve the call
    Unavailable,
    /// The call did not complete before its deadline
    DeadlineExceeded,
    /// The outcome could not be classified
    #[default]
    Unknown,
}

impl Code {
    /// Every defined code, in declaration order
    pub const ALL: [Self; 9] = [
        Self::Ok,
        Self::Invalid,
        Self::Unauthorized,
        Self::PermissionDenied,
        Self::NotFound,
        Self::Internal,
        Self::Unavailable,
        Self::DeadlineExceeded,
        Self::Unknown,
    ];

    /// Stable uppercase symbol used on the wire
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Invalid => "INVALID",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse a wire symbol
    ///
    /// Total: anything that is not an exact symbol classifies as `Unknown`.
    pub fn parse(symbol: &str) -> Self {
        match symbol {
            "OK" => Self::Ok,
            "INVALID" => Self::Invalid,
            "UNAUTHORIZED" => Self::Unauthorized,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "NOT_FOUND" => Self::NotFound,
            "INTERNAL" => Self::Internal,
            "UNAVAILABLE" => Self::Unavailable,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            _ => Self::Unknown,
        }
    }

    /// Whether this code reports a failure
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl From<&str> for Code {
    fn from(symbol: &str) -> Self {
        Self::parse(symbol)
    }
}

impl Serialize for Code {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let symbol = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        Ok(Self::parse(&symbol))
    }
}
