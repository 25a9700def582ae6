#![forbid(unsafe_code)]

//! Named portal targets and their contributing sources.
//!
//! A portal target is a named native container. Exactly one mounted element
//! may host it at a time; any number of portal nodes may contribute content
//! to it. The host's native child list is its own children followed by each
//! source's content, sources in the order they were mounted.
//!
//! Each source owns a distinct subrange of that list. Removing a source drops
//! its subrange on the next flush; the remaining sources keep their order.
//!
//! # Invariants
//!
//! 1. A source appears at most once per target.
//! 2. Targets with no host and no sources are dropped from the registry.

use std::collections::BTreeMap;

use dcf_core::identity::NodeId;

#[derive(Debug, Default, Clone)]
struct Target {
    host: Option<NodeId>,
    sources: Vec<NodeId>,
}

impl Target {
    fn is_vacant(&self) -> bool {
        self.host.is_none() && self.sources.is_empty()
    }
}

/// Registry of portal targets, owned by the reconciler.
#[derive(Debug, Default, Clone)]
pub struct PortalRegistry {
    targets: BTreeMap<String, Target>,
}

impl PortalRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `host` as the element hosting `target`.
    ///
    /// Returns the previously bound host if a different element held it.
    pub fn register_host(&mut self, target: &str, host: NodeId) -> Option<NodeId> {
        let entry = self.targets.entry(target.to_owned()).or_default();
        let previous = entry.host.replace(host);
        previous.filter(|prev| *prev != host)
    }

    /// Unbind `host` from `target` if it is the current host.
    pub fn unregister_host(&mut self, target: &str, host: NodeId) {
        if let Some(entry) = self.targets.get_mut(target) {
            if entry.host == Some(host) {
                entry.host = None;
            }
            if entry.is_vacant() {
                self.targets.remove(target);
            }
        }
    }

    /// Append `source` to `target`'s contributors.
    pub fn add_source(&mut self, target: &str, source: NodeId) {
        let entry = self.targets.entry(target.to_owned()).or_default();
        if !entry.sources.contains(&source) {
            entry.sources.push(source);
        }
    }

    /// Remove `source` from `target`'s contributors.
    pub fn remove_source(&mut self, target: &str, source: NodeId) {
        if let Some(entry) = self.targets.get_mut(target) {
            entry.sources.retain(|s| *s != source);
            if entry.is_vacant() {
                self.targets.remove(target);
            }
        }
    }

    /// Element currently hosting `target`.
    #[must_use]
    pub fn host(&self, target: &str) -> Option<NodeId> {
        self.targets.get(target).and_then(|t| t.host)
    }

    /// Contributors to `target`, in contribution order.
    #[must_use]
    pub fn sources(&self, target: &str) -> &[NodeId] {
        self.targets
            .get(target)
            .map_or(&[][..], |t| t.sources.as_slice())
    }

    /// Names of every known target.
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_keep_contribution_order() {
        let mut reg = PortalRegistry::new();
        let (a, b, c) = (NodeId::next(), NodeId::next(), NodeId::next());
        reg.add_source("modal", a);
        reg.add_source("modal", b);
        reg.add_source("modal", a);
        reg.add_source("modal", c);
        assert_eq!(reg.sources("modal"), &[a, b, c]);
        reg.remove_source("modal", a);
        assert_eq!(reg.sources("modal"), &[b, c]);
    }

    #[test]
    fn vacant_targets_are_dropped() {
        let mut reg = PortalRegistry::new();
        let host = NodeId::next();
        let src = NodeId::next();
        reg.register_host("toast", host);
        reg.add_source("toast", src);
        reg.unregister_host("toast", host);
        assert_eq!(reg.target_names().count(), 1);
        reg.remove_source("toast", src);
        assert_eq!(reg.target_names().count(), 0);
        assert!(reg.sources("toast").is_empty());
    }

    #[test]
    fn rebinding_host_reports_previous() {
        let mut reg = PortalRegistry::new();
        let (h1, h2) = (NodeId::next(), NodeId::next());
        assert_eq!(reg.register_host("sheet", h1), None);
        assert_eq!(reg.register_host("sheet", h1), None);
        assert_eq!(reg.register_host("sheet", h2), Some(h1));
        reg.unregister_host("sheet", h1);
        assert_eq!(reg.host("sheet"), Some(h2));
    }
}
