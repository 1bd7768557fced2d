use std::cmp::Ordering;
use std::sync::Arc;

use crate::encoding::decode_fixed64;
use crate::key::extract_user_key;

/// A total order over keys. Blocks and tables only ever see keys through
/// this trait, so every key fed to a builder must be strictly increasing
/// according to the comparator it was configured with.
pub trait Comparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Name persisted alongside data ordered by this comparator. Two
    /// comparators with the same name must order keys identically.
    fn name(&self) -> &'static str;
}

/// Lexicographic order over raw bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &'static str {
        "cinder.BytewiseComparator"
    }
}

/// Orders internal keys: user key ascending under the wrapped comparator,
/// then sequence number descending, then value type descending. The newest
/// version of a user key therefore sorts first.
#[derive(Clone)]
pub struct InternalKeyComparator {
    user_comparator: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    pub fn new(user_comparator: Arc<dyn Comparator>) -> Self {
        Self { user_comparator }
    }

    pub fn user_comparator(&self) -> &Arc<dyn Comparator> {
        &self.user_comparator
    }
}

impl Default for InternalKeyComparator {
    fn default() -> Self {
        Self::new(Arc::new(BytewiseComparator))
    }
}

impl std::fmt::Debug for InternalKeyComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalKeyComparator")
            .field("user_comparator", &self.user_comparator.name())
            .finish()
    }
}

impl Comparator for InternalKeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user_comparator
            .compare(extract_user_key(a), extract_user_key(b))
            .then_with(|| {
                let a_trailer = decode_fixed64(&a[a.len() - 8..]);
                let b_trailer = decode_fixed64(&b[b.len() - 8..]);
                b_trailer.cmp(&a_trailer)
            })
    }

    fn name(&self) -> &'static str {
        "cinder.InternalKeyComparator"
    }
}
