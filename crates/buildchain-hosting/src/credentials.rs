//! Credential pool with explicit rotation.
//!
//! The pool is a plain value: `current` is the credential in use, `available`
//! are the untouched ones in order, `exhausted` are the ones a provider has
//! already throttled. Nothing rotates implicitly; the retry policy in
//! [`crate::http`] calls [`CredentialPool::rotate_from`] when it sees a
//! rate-limit response.

use std::collections::VecDeque;

/// Ordered pool of API credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialPool {
    current: Option<String>,
    available: VecDeque<String>,
    exhausted: Vec<String>,
}

impl CredentialPool {
    /// Build a pool; the first token becomes `current`.
    pub fn new(tokens: Vec<String>) -> Self {
        let mut available: VecDeque<String> = tokens.into_iter().collect();
        let current = available.pop_front();
        Self {
            current,
            available,
            exhausted: Vec::new(),
        }
    }

    /// Credential to use for the next request (`None` means anonymous)
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.available.iter().map(String::as_str)
    }

    pub fn exhausted(&self) -> &[String] {
        &self.exhausted
    }

    /// Total number of credentials the pool has ever held
    pub fn len(&self) -> usize {
        self.current.iter().count() + self.available.len() + self.exhausted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` once there is no credential left to try
    pub fn is_exhausted(&self) -> bool {
        self.current.is_none() && self.available.is_empty()
    }

    /// Retire `current` and promote the next available credential.
    ///
    /// Returns the new current credential, or `None` when the pool is
    /// exhausted.
    pub fn rotate(&mut self) -> Option<String> {
        if let Some(retired) = self.current.take() {
            self.exhausted.push(retired);
        }
        self.current = self.available.pop_front();
        self.current.clone()
    }

    /// Rotate only if `failed` is still the current credential.
    ///
    /// Several in-flight requests can be throttled with the same credential;
    /// only the first one to report it advances the pool, the others simply
    /// pick up whatever is current now.
    pub fn rotate_from(&mut self, failed: Option<&str>) -> Option<String> {
        if self.current.as_deref() != failed {
            return self.current.clone();
        }
        if failed.is_none() {
            // Anonymous requests have nothing to rotate to.
            return None;
        }
        self.rotate()
    }
}
