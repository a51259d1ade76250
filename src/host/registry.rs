// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::descriptor::HostDescriptor;
use crate::error::{Error, Result};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Catalog of named hosts.
///
/// Registration does not check for duplicate names: a later definition with
/// an already-registered name is kept, but [`HostRegistry::find`] always
/// returns the first one registered.
#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: RwLock<Vec<Arc<HostDescriptor>>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<HostDescriptor>>> {
        self.hosts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<HostDescriptor>>> {
        self.hosts.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a host definition.
    pub fn register(&self, descriptor: HostDescriptor) -> Arc<HostDescriptor> {
        let descriptor = Arc::new(descriptor);
        let mut hosts = self.write();
        if hosts.iter().any(|h| h.name() == descriptor.name()) {
            warn!(
                "Host '{}' is already defined; lookups keep resolving to the first definition",
                descriptor.name()
            );
        }
        debug!("Registered host {}", descriptor);
        hosts.push(Arc::clone(&descriptor));
        descriptor
    }

    pub fn register_all<I>(&self, descriptors: I)
    where
        I: IntoIterator<Item = HostDescriptor>,
    {
        for descriptor in descriptors {
            self.register(descriptor);
        }
    }

    /// Look up a host by name.
    pub fn find(&self, name: &str) -> Result<Arc<HostDescriptor>> {
        self.read()
            .iter()
            .find(|h| h.name() == name)
            .cloned()
            .ok_or_else(|| Error::not_found(name))
    }

    /// Remove every registered host. Safe to call repeatedly.
    pub fn reset(&self) {
        let mut hosts = self.write();
        if !hosts.is_empty() {
            debug!("Clearing {} registered hosts", hosts.len());
        }
        hosts.clear();
    }

    /// Snapshot of all definitions in registration order.
    pub fn all(&self) -> Vec<Arc<HostDescriptor>> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// The `from` path of a host, starting with the host itself and ending
    /// with the directly reachable host it is ultimately tunneled through.
    ///
    /// Fails on unknown upstream names and on cyclic chains.
    pub fn chain(&self, name: &str) -> Result<Vec<Arc<HostDescriptor>>> {
        let mut chain = vec![self.find(name)?];
        while let Some(upstream) = chain.last().and_then(|h| h.from()).map(str::to_string) {
            if chain.iter().any(|h| h.name() == upstream) {
                let mut path: Vec<&str> = chain.iter().map(|h| h.name()).collect();
                path.push(&upstream);
                return Err(Error::configuration(
                    name,
                    format!("cyclic host chain: {}", path.join(" -> ")),
                ));
            }
            chain.push(self.find(&upstream)?);
        }
        Ok(chain)
    }

    /// Human-readable route to a host, e.g. `Tunnel path: web -> db`.
    pub fn path_description(&self, name: &str) -> Result<String> {
        let chain = self.chain(name)?;
        if chain.len() == 1 {
            return Ok(format!("Direct connection to {}", chain[0].address()));
        }
        let hops: Vec<&str> = chain.iter().rev().map(|h| h.name()).collect();
        Ok(format!("Tunnel path: {}", hops.join(" -> ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::descriptor::HostOptions;

    fn host(name: &str, address: &str, from: Option<&str>) -> HostDescriptor {
        HostDescriptor::new(
            name,
            address,
            HostOptions {
                from: from.map(str::to_string),
                ..HostOptions::default()
            },
        )
    }

    #[test]
    fn test_find_unknown_host() {
        let registry = HostRegistry::new();
        registry.register(host("web", "10.0.0.5", None));

        let err = registry.find("db").unwrap_err();
        assert!(matches!(err, Error::NotFound { ref name } if name == "db"));
    }

    #[test]
    fn test_duplicate_names_resolve_to_first() {
        let registry = HostRegistry::new();
        registry.register(host("web", "10.0.0.5", None));
        registry.register(host("web", "10.0.0.99", None));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find("web").unwrap().address(), "10.0.0.5");
    }

    #[test]
    fn test_reset_is_idempotent() {
        let registry = HostRegistry::new();
        registry.register(host("web", "10.0.0.5", None));
        registry.reset();
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.find("web").is_err());
    }

    #[test]
    fn test_forward_reference_allowed() {
        let registry = HostRegistry::new();
        registry.register(host("db", "10.0.0.6", Some("web")));
        assert!(registry.chain("db").is_err());

        registry.register(host("web", "10.0.0.5", None));
        let chain = registry.chain("db").unwrap();
        let names: Vec<&str> = chain.iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["db", "web"]);
    }

    #[test]
    fn test_chain_detects_cycle() {
        let registry = HostRegistry::new();
        registry.register(host("a", "10.0.0.1", Some("b")));
        registry.register(host("b", "10.0.0.2", Some("a")));

        let err = registry.chain("a").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("cyclic host chain: a -> b -> a"));

        let registry = HostRegistry::new();
        registry.register(host("self", "10.0.0.3", Some("self")));
        assert!(registry.chain("self").is_err());
    }

    #[test]
    fn test_path_description() {
        let registry = HostRegistry::new();
        registry.register(host("bastion", "203.0.113.10", None));
        registry.register(host("web", "10.0.0.5", Some("bastion")));
        registry.register(host("db", "10.0.0.6", Some("web")));

        assert_eq!(
            registry.path_description("bastion").unwrap(),
            "Direct connection to 203.0.113.10"
        );
        assert_eq!(
            registry.path_description("db").unwrap(),
            "Tunnel path: bastion -> web -> db"
        );
    }
}
