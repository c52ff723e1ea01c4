use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The six lock modes, ordered by increasing strength.
/// `to_index()` positions match the rows/columns of the compatibility
/// matrix in `compat.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Holds a place without blocking anyone
    #[serde(rename = "NL")]
    Null,
    /// Read that tolerates every writer short of exclusive
    #[serde(rename = "CR")]
    ConcurrentRead,
    /// Write that tolerates other unprotected writers
    #[serde(rename = "CW")]
    ConcurrentWrite,
    /// Classic shared read: no writers admitted
    #[serde(rename = "PR")]
    ProtectedRead,
    /// Sole writer, concurrent readers admitted
    #[serde(rename = "PW")]
    ProtectedWrite,
    /// Sole holder of any kind
    #[serde(rename = "EX")]
    Exclusive,
}

impl LockMode {
    /// Returns the numeric index for O(1) matrix lookup
    pub fn to_index(self) -> usize {
        match self {
            LockMode::Null => 0,
            LockMode::ConcurrentRead => 1,
            LockMode::ConcurrentWrite => 2,
            LockMode::ProtectedRead => 3,
            LockMode::ProtectedWrite => 4,
            LockMode::Exclusive => 5,
        }
    }

    /// Two-letter wire code
    pub fn code(self) -> &'static str {
        match self {
            LockMode::Null => "NL",
            LockMode::ConcurrentRead => "CR",
            LockMode::ConcurrentWrite => "CW",
            LockMode::ProtectedRead => "PR",
            LockMode::ProtectedWrite => "PW",
            LockMode::Exclusive => "EX",
        }
    }
}

impl Default for LockMode {
    fn default() -> Self {
        LockMode::Exclusive
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for LockMode {
    type Err = Error;

    /// Accepts the two-letter codes and a few spelled-out aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NL" | "NULL" => Ok(LockMode::Null),
            "CR" => Ok(LockMode::ConcurrentRead),
            "CW" => Ok(LockMode::ConcurrentWrite),
            "PR" | "SH" | "SHARED" => Ok(LockMode::ProtectedRead),
            "PW" => Ok(LockMode::ProtectedWrite),
            "EX" | "EXCLUSIVE" => Ok(LockMode::Exclusive),
            _ => Err(Error::InvalidParameter(format!("unknown lock mode '{s}'"))),
        }
    }
}
