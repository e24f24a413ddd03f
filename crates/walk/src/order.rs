//! The prefix-after-extension total order.

use std::cmp::Ordering;

/// Compares two archive paths byte-lexicographically, except that a strict
/// prefix orders *after* any string extending it.
///
/// `"a/x" < "ab" < "a"`: the directory `a` follows everything beneath it.
#[must_use]
pub fn compare_pack_paths(a: &[u8], b: &[u8]) -> Ordering {
    let shared = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    match (a.get(shared), b.get(shared)) {
        (None, None) => Ordering::Equal,
        // `a` is a strict prefix of `b`: the extension comes first.
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(y),
    }
}

/// Ordered-map key wrapping an archive path under [`compare_pack_paths`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackOrderKey(Vec<u8>);

impl PackOrderKey {
    /// Wraps an archive path.
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self(path.as_bytes().to_vec())
    }

    /// The wrapped bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Ord for PackOrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_pack_paths(&self.0, &other.0)
    }
}

impl PartialOrd for PackOrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
