use std::collections::HashMap;

use crate::types::Protocol;

/// Default preference when more than one protocol implements an interface
const DEFAULT_PRIORITY: [Protocol; 5] = [
    Protocol::Mrp,
    Protocol::Dmap,
    Protocol::Companion,
    Protocol::AirPlay,
    Protocol::Raop,
];

/// Protocol-keyed set of implementations of one interface
#[derive(Debug)]
pub struct Relayer<T> {
    instances: HashMap<Protocol, T>,
    priority: Vec<Protocol>,
}

impl<T> Relayer<T> {
    /// Create a relayer with a custom protocol priority
    #[must_use]
    pub fn with_priority(priority: Vec<Protocol>) -> Self {
        Self {
            instances: HashMap::new(),
            priority,
        }
    }

    /// Register the implementation of `protocol`, replacing any previous one
    pub fn register(&mut self, instance: T, protocol: Protocol) {
        if self.instances.insert(protocol, instance).is_some() {
            tracing::debug!("Replaced {} implementation", protocol);
        }
    }

    /// Implementation registered for `protocol`
    #[must_use]
    pub fn get(&self, protocol: Protocol) -> Option<&T> {
        self.instances.get(&protocol)
    }

    /// Highest priority implementation
    #[must_use]
    pub fn main_instance(&self) -> Option<&T> {
        self.priority
            .iter()
            .find_map(|protocol| self.instances.get(protocol))
    }

    /// Protocol of the highest priority implementation
    #[must_use]
    pub fn main_protocol(&self) -> Option<Protocol> {
        self.priority
            .iter()
            .copied()
            .find(|protocol| self.instances.contains_key(protocol))
    }

    /// Every registered implementation
    pub fn instances(&self) -> impl Iterator<Item = (Protocol, &T)> {
        self.instances.iter().map(|(protocol, t)| (*protocol, t))
    }

    /// Number of registered implementations
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl<T> Default for Relayer<T> {
    fn default() -> Self {
        Self::with_priority(DEFAULT_PRIORITY.to_vec())
    }
}
