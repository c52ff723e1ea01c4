use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Resource kinds, decided once when the name is parsed. The wire keeps the
/// sigil convention (`_s_`/`_S_` prefixes, `[n]` suffixes) because it is the
/// only kind signal clients have; inside the engine the kind is this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Plain named resource locked by mode, e.g. `Red.Blue.Green`
    Simple,
    /// `name[n]`: a pool of n interchangeable units, locked by quantity
    Numeric,
    /// `_s_name[n]`: hands out distinct elements, no rollback
    Sequence,
    /// `_S_name[n]`: hands out distinct elements, rollback supported
    TransactionalSequence,
}

impl ResourceKind {
    /// Whether `unlock` with rollback can be honored on this kind
    pub fn transactional(self) -> bool {
        matches!(self, ResourceKind::TransactionalSequence)
    }

    /// Whether locks on this kind carry an element
    pub fn sequential(self) -> bool {
        matches!(
            self,
            ResourceKind::Sequence | ResourceKind::TransactionalSequence
        )
    }
}

/// A validated resource name: the raw string clients use on the wire plus
/// the kind and total quantity decoded from it.
///
/// Grammar:
/// - simple: alphabetic first character, then alphanumerics and dots
/// - numeric: `base[n]`, base alphanumeric without dots, n >= 1
/// - sequence: `_s_base[n]` (plain) or `_S_base[n]` (transactional)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName {
    raw: String,
    kind: ResourceKind,
    total: u64,
}

impl ResourceName {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Total units (numeric) or concurrent slots (sequence); 1 for simple
    pub fn total_quantity(&self) -> u64 {
        self.total
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl std::str::FromStr for ResourceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidResourceName(s.to_string());

        let (kind, body) = if let Some(rest) = s.strip_prefix("_s_") {
            (ResourceKind::Sequence, rest)
        } else if let Some(rest) = s.strip_prefix("_S_") {
            (ResourceKind::TransactionalSequence, rest)
        } else if s.contains('[') {
            (ResourceKind::Numeric, s)
        } else {
            if !valid_simple(s) {
                return Err(invalid());
            }
            return Ok(ResourceName {
                raw: s.to_string(),
                kind: ResourceKind::Simple,
                total: 1,
            });
        };

        // body must be base[n] with an undotted base and n >= 1
        let (base, total) = split_bracketed(body).ok_or_else(invalid)?;
        if !valid_base(base) || total == 0 {
            return Err(invalid());
        }
        Ok(ResourceName {
            raw: s.to_string(),
            kind,
            total,
        })
    }
}

/// Splits `base[n]` and parses n; the bracket pair must close the string.
fn split_bracketed(s: &str) -> Option<(&str, u64)> {
    let open = s.find('[')?;
    let digits = s.strip_suffix(']')?.get(open + 1..)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&s[..open], digits.parse().ok()?))
}

fn valid_base(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric())
}

fn valid_simple(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'.')
}
