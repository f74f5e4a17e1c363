//! Half-open key ranges handed to the external scan primitive.

use serde::{Deserialize, Serialize};

/// `[start, stop)` in lexicographic key order. An empty `stop` means
/// "to the end of the table".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanRange {
    pub start: Vec<u8>,
    pub stop: Vec<u8>,
}

impl ScanRange {
    pub fn new(start: impl Into<Vec<u8>>, stop: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            stop: stop.into(),
        }
    }

    /// Every key beginning with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        Self::new(prefix.to_vec(), prefix_successor(prefix))
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && (self.stop.is_empty() || key < self.stop.as_slice())
    }

    /// Same range with `salt` prepended to both bounds.
    pub fn salted(&self, salt: u8) -> Self {
        let start = prepend(salt, &self.start);
        let stop = if self.stop.is_empty() {
            // Unbounded stop ends at the next salt bucket.
            match salt.checked_add(1) {
                Some(next) => vec![next],
                None => Vec::new(),
            }
        } else {
            prepend(salt, &self.stop)
        };
        Self { start, stop }
    }
}

/// Smallest key greater than every key starting with `prefix`; empty when
/// no such key exists (all-0xFF prefix).
fn prefix_successor(prefix: &[u8]) -> Vec<u8> {
    let mut stop = prefix.to_vec();
    while let Some(last) = stop.pop() {
        if last < u8::MAX {
            stop.push(last + 1);
            return stop;
        }
    }
    Vec::new()
}

fn prepend(byte: u8, rest: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(byte);
    out.extend_from_slice(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"ab"), b"ac".to_vec());
        assert_eq!(prefix_successor(&[0x01, 0xFF]), vec![0x02]);
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), Vec::<u8>::new());
        assert_eq!(prefix_successor(&[]), Vec::<u8>::new());
    }

    #[test]
    fn test_prefix_range_contains() {
        let range = ScanRange::prefix(b"app");
        assert!(range.contains(b"app"));
        assert!(range.contains(b"apple"));
        assert!(!range.contains(b"apq"));
        assert!(!range.contains(b"ap"));
    }

    #[test]
    fn test_salted_bounds() {
        let range = ScanRange::new(b"a".to_vec(), b"c".to_vec());
        let salted = range.salted(7);
        assert_eq!(salted.start, vec![7, b'a']);
        assert_eq!(salted.stop, vec![7, b'c']);
        assert!(salted.contains(&[7, b'b', 0]));
        assert!(!salted.contains(&[8, b'b']));
    }

    #[test]
    fn test_salted_unbounded_stop() {
        let range = ScanRange::new(b"a".to_vec(), Vec::new());
        assert_eq!(range.salted(3).stop, vec![4]);
        assert_eq!(range.salted(255).stop, Vec::<u8>::new());
    }
}
