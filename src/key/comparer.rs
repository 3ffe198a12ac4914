//! Ordering over internal keys, layered on a user comparer.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use bytes::BufMut;

use crate::comparer::{BasicComparer, BytewiseComparer, Comparer};

use super::{trailer_num, user_key, MAX_NUM};

/// Orders internal keys: user key ascending, then sequence and type
/// descending.
#[derive(Clone)]
pub struct InternalComparer {
    user: Arc<dyn Comparer>,
}

impl InternalComparer {
    pub fn new(user: Arc<dyn Comparer>) -> Self {
        Self { user }
    }

    pub fn user_comparer(&self) -> &Arc<dyn Comparer> {
        &self.user
    }

    /// Compare only the user-key parts of two internal keys.
    pub fn compare_user_key(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user.compare(user_key(a), user_key(b))
    }

    /// Append the max trailer to `shortened` if it is a strictly greater,
    /// strictly shorter replacement for `ukey`.
    fn finish_shortened(&self, ukey: &[u8], shortened: Option<Vec<u8>>) -> Option<Vec<u8>> {
        let mut dst = shortened?;
        if dst.len() < ukey.len() && self.user.compare(ukey, &dst) == Ordering::Less {
            dst.put_u64_le(MAX_NUM);
            Some(dst)
        } else {
            None
        }
    }
}

impl Default for InternalComparer {
    fn default() -> Self {
        Self::new(Arc::new(BytewiseComparer))
    }
}

impl fmt::Debug for InternalComparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalComparer")
            .field("user", &self.user.name())
            .finish()
    }
}

impl BasicComparer for InternalComparer {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user
            .compare(user_key(a), user_key(b))
            .then_with(|| trailer_num(b).cmp(&trailer_num(a)))
    }
}

impl Comparer for InternalComparer {
    /// Manifests record the user comparer, not this wrapper.
    fn name(&self) -> &str {
        self.user.name()
    }

    fn separator(&self, a: &[u8], b: &[u8]) -> Option<Vec<u8>> {
        let (ua, ub) = (user_key(a), user_key(b));
        self.finish_shortened(ua, self.user.separator(ua, ub))
    }

    fn successor(&self, b: &[u8]) -> Option<Vec<u8>> {
        let ub = user_key(b);
        self.finish_shortened(ub, self.user.successor(ub))
    }
}
