//! Namespace allocation.
//!
//! The engine identifies a feature namespace by the first character of the
//! `|x` segment, so every named feature group is mapped onto one character of
//! a fixed alphabet. Assignments are made in first-seen order and never change
//! for the lifetime of the allocator.

use std::collections::HashMap;

use tracing::debug;

use crate::constants::namespaces::{DEFAULT_NAMESPACE_CHAR, NAMESPACE_CAPACITY, NAMESPACE_CHARS};
use crate::error::{Error, Result};

/// Maps namespace names to wire characters.
#[derive(Debug, Default, Clone)]
pub struct NamespaceAllocator {
    assigned: HashMap<String, char>,
    order: Vec<String>,
}

impl NamespaceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Character for `name`, allocating the next free one on first sight.
    ///
    /// `None` and the empty name map to the default namespace.
    pub fn allocate(&mut self, name: Option<&str>) -> Result<char> {
        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => return Ok(DEFAULT_NAMESPACE_CHAR),
        };

        if let Some(&ch) = self.assigned.get(name) {
            return Ok(ch);
        }

        let ch = NAMESPACE_CHARS
            .chars()
            .nth(self.order.len())
            .ok_or_else(|| Error::CapacityExceeded {
                namespace: name.to_string(),
                capacity: NAMESPACE_CAPACITY,
            })?;

        debug!("Mapping '{}' namespace to '{}' character", name, ch);
        self.assigned.insert(name.to_string(), ch);
        self.order.push(name.to_string());
        Ok(ch)
    }

    /// Character already assigned to `name`, without allocating.
    pub fn get(&self, name: &str) -> Option<char> {
        if name.is_empty() {
            return Some(DEFAULT_NAMESPACE_CHAR);
        }
        self.assigned.get(name).copied()
    }

    /// Assigned namespaces in allocation order.
    pub fn assignments(&self) -> impl Iterator<Item = (&str, char)> + '_ {
        self.order
            .iter()
            .map(move |name| (name.as_str(), self.assigned[name]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn remaining(&self) -> usize {
        NAMESPACE_CAPACITY - self.order.len()
    }
}
