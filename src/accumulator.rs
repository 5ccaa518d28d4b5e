//! Blink sequence accumulation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Append-only record of category symbols in emission order.
///
/// There is no way to remove, reorder or overwrite a symbol once pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlinkSequence(String);

impl BlinkSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, symbol: char) {
        self.0.push(symbol);
    }

    /// Number of recorded blinks
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// How many times `symbol` was recorded
    pub fn count(&self, symbol: char) -> usize {
        self.0.chars().filter(|c| *c == symbol).count()
    }
}

impl fmt::Display for BlinkSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<BlinkSequence> for String {
    fn from(sequence: BlinkSequence) -> Self {
        sequence.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_in_order() {
        let mut sequence = BlinkSequence::new();
        assert!(sequence.is_empty());

        for symbol in ['S', 'X', 'S', 'L', 'S'] {
            sequence.push(symbol);
        }

        assert_eq!(sequence.as_str(), "SXSLS");
        assert_eq!(sequence.len(), 5);
        assert_eq!(sequence.count('S'), 3);
        assert_eq!(String::from(sequence), "SXSLS");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let mut sequence = BlinkSequence::new();
        sequence.push('L');
        assert_eq!(serde_json::to_string(&sequence).unwrap(), r#""L""#);
    }
}
