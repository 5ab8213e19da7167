//! Weak reference from a proxy to the node it wraps.

use std::sync::Arc;

use log::debug;

use crate::error::ConfigurationError;
use crate::host::{Catalog, Document, EvaluationTarget, NodeId, NodeInfo, NodeKind, sanitize_name};

/// A target that resolved against the document and the catalog.
#[derive(Clone)]
pub struct ResolvedTarget {
    pub info: NodeInfo,
    pub evaluator: Arc<dyn EvaluationTarget>,
}

impl ResolvedTarget {
    pub fn id(&self) -> NodeId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        self.evaluator.name()
    }
}

pub struct Resolution {
    pub target: ResolvedTarget,
    /// The target's identity differs from the last one that resolved.
    pub changed: bool,
}

/// `(persisted id, cached handle)` pair. The cache never owns the node: it is
/// re-validated against the document on every resolve and dropped on any
/// failure.
#[derive(Default)]
pub struct TargetRef {
    persisted_id: Option<NodeId>,
    cached: Option<ResolvedTarget>,
}

impl TargetRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persisted(id: Option<NodeId>) -> Self {
        Self {
            persisted_id: id,
            cached: None,
        }
    }

    pub fn persisted_id(&self) -> Option<NodeId> {
        self.persisted_id
    }

    pub fn cached(&self) -> Option<&ResolvedTarget> {
        self.cached.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Resolves the node feeding the link slot.
    ///
    /// Tries the cached handle first, then the document by id, then the
    /// catalog by the node's sanitized display name.
    pub fn resolve(
        &mut self,
        link: Option<NodeId>,
        doc: &dyn Document,
        catalog: &dyn Catalog,
    ) -> Result<Resolution, ConfigurationError> {
        let result = self.try_resolve(link, doc, catalog);
        if result.is_err() {
            self.invalidate();
        }
        result
    }

    fn try_resolve(
        &mut self,
        link: Option<NodeId>,
        doc: &dyn Document,
        catalog: &dyn Catalog,
    ) -> Result<Resolution, ConfigurationError> {
        let id = link.ok_or(ConfigurationError::NoTargetLinked)?;
        let info = doc
            .find_node(id)
            .ok_or(ConfigurationError::TargetMissing(id))?;

        if let Some(cached) = self.cached.as_mut().filter(|c| c.id() == id) {
            cached.info = info;
            return Ok(Resolution {
                target: cached.clone(),
                changed: false,
            });
        }

        if info.kind == NodeKind::Special {
            return Err(ConfigurationError::DisallowedTarget(info.display_name));
        }
        let evaluator = catalog
            .find(&sanitize_name(&info.display_name))
            .ok_or_else(|| ConfigurationError::TargetUnresolvable(info.display_name.clone()))?;

        let changed = self.persisted_id != Some(id);
        if changed {
            debug!(
                "Target changed from {:?} to {} ('{}')",
                self.persisted_id, id, info.display_name
            );
        }
        let target = ResolvedTarget { info, evaluator };
        self.persisted_id = Some(id);
        self.cached = Some(target.clone());
        Ok(Resolution { target, changed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Evaluation;
    use crate::host::sim::{FnTarget, MapCatalog, SimDocument};
    use crate::model::DataTree;

    fn catalog_with(name: &str) -> MapCatalog {
        let mut catalog = MapCatalog::new();
        catalog.register(Arc::new(FnTarget::new(name, |_: &[DataTree], _| {
            Ok(Evaluation::default())
        })));
        catalog
    }

    #[test]
    fn test_resolves_through_sanitized_name() {
        let mut doc = SimDocument::new();
        let id = doc.add_node(NodeInfo::component("Divide Curve"));
        let catalog = catalog_with("DivideCurve");

        let mut target = TargetRef::new();
        let resolution = target.resolve(Some(id), &doc, &catalog).unwrap();
        assert!(resolution.changed);
        assert_eq!(resolution.target.id(), id);
        assert_eq!(target.persisted_id(), Some(id));

        let again = target.resolve(Some(id), &doc, &catalog).unwrap();
        assert!(!again.changed);
    }

    #[test]
    fn test_failure_invalidates_cache_but_keeps_identity() {
        let mut doc = SimDocument::new();
        let id = doc.add_node(NodeInfo::component("Area"));
        let catalog = catalog_with("Area");
        let mut target = TargetRef::new();
        target.resolve(Some(id), &doc, &catalog).unwrap();

        doc.remove_node(id);
        let err = target.resolve(Some(id), &doc, &catalog).err().unwrap();
        assert_eq!(err, ConfigurationError::TargetMissing(id));
        assert!(target.cached().is_none());
        assert_eq!(target.persisted_id(), Some(id));
    }

    #[test]
    fn test_rejects_special_and_uncatalogued_nodes() {
        let mut doc = SimDocument::new();
        let panel = doc.add_node(NodeInfo::special("Panel"));
        let plugin = doc.add_node(NodeInfo::component("Third Party Solver"));
        let catalog = catalog_with("Area");
        let mut target = TargetRef::new();

        assert!(matches!(
            target.resolve(Some(panel), &doc, &catalog),
            Err(ConfigurationError::DisallowedTarget(_))
        ));
        assert!(matches!(
            target.resolve(Some(plugin), &doc, &catalog),
            Err(ConfigurationError::TargetUnresolvable(name)) if name == "Third Party Solver"
        ));
        assert!(matches!(
            target.resolve(None, &doc, &catalog),
            Err(ConfigurationError::NoTargetLinked)
        ));
        assert!(target.persisted_id().is_none());
    }

    #[test]
    fn test_persisted_identity_is_not_a_change() {
        let mut doc = SimDocument::new();
        let id = doc.add_node(NodeInfo::component("Area"));
        let catalog = catalog_with("Area");
        let mut target = TargetRef::with_persisted(Some(id));
        assert!(!target.resolve(Some(id), &doc, &catalog).unwrap().changed);
    }
}
