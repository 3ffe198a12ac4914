//! Filter adapter for internal keys.

use std::sync::Arc;

use crate::key::user_key;

use super::{Filter, FilterGenerator};

/// Applies a user-key filter to internal keys by stripping the trailer.
///
/// Every version of a user key maps to the same filter entry, so a lookup by
/// any sequence number hits.
#[derive(Clone)]
pub struct InternalFilter {
    inner: Arc<dyn Filter>,
}

impl InternalFilter {
    pub fn new(inner: Arc<dyn Filter>) -> Self {
        Self { inner }
    }
}

impl Filter for InternalFilter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn contains(&self, filter: &[u8], key: &[u8]) -> bool {
        self.inner.contains(filter, user_key(key))
    }

    fn new_generator(&self) -> Box<dyn FilterGenerator> {
        Box::new(InternalGenerator {
            inner: self.inner.new_generator(),
        })
    }
}

struct InternalGenerator {
    inner: Box<dyn FilterGenerator>,
}

impl FilterGenerator for InternalGenerator {
    fn add(&mut self, key: &[u8]) {
        self.inner.add(user_key(key));
    }

    fn generate(&mut self, dst: &mut Vec<u8>) {
        self.inner.generate(dst);
    }
}
