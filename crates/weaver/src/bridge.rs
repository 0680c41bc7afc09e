//! Bridge method resolution
//!
//! Bridges are synthetic overrides that forward to a differently typed
//! implementation (covariant returns, erased generics). The resolver reads
//! each owner's image and maps every eligible bridge to the target of the
//! first delegating call in its body.
//!
//! A bridge whose delegating call targets its own signature (visibility
//! widening) is left unresolved: resolving it would make the generated
//! access method call itself.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};
use weaver_image::{ClassReader, ClassVisitor, Insn, InvokeKind, MethodAction, MethodHeader, Signature};

use crate::metadata::ArtifactSource;

/// Collects bridges per owner and resolves their targets
pub struct BridgeResolver<'a> {
    source: &'a dyn ArtifactSource,
    bridges: BTreeMap<String, FxHashSet<Signature>>,
}

impl<'a> BridgeResolver<'a> {
    /// Resolver reading images from `source`
    pub fn new(source: &'a dyn ArtifactSource) -> Self {
        Self {
            source,
            bridges: BTreeMap::new(),
        }
    }

    /// Register a bridge declared by `owner`
    pub fn add_bridge(&mut self, owner: &str, bridge: Signature) {
        self.bridges.entry(owner.to_string()).or_default().insert(bridge);
    }

    /// Whether no bridges were registered
    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// Resolve every registered bridge to its target.
    ///
    /// Owners whose image cannot be read contribute nothing; the others are
    /// still resolved.
    #[tracing::instrument(level = "debug", skip(self), fields(owners = self.bridges.len()))]
    pub fn resolve_all(&self) -> FxHashMap<Signature, Signature> {
        let mut resolved = FxHashMap::default();
        for (owner, bridges) in &self.bridges {
            let mut visitor = BridgeVisitor {
                pending: bridges.clone(),
                current: None,
                resolved: &mut resolved,
            };
            if let Err(err) = scan(self.source, owner, &mut visitor) {
                warn!(owner = %owner, error = %err, "cannot read bridge owner, skipping");
            }
        }
        debug!(resolved = resolved.len(), "bridges resolved");
        resolved
    }
}

struct BridgeVisitor<'r> {
    pending: FxHashSet<Signature>,
    current: Option<Signature>,
    resolved: &'r mut FxHashMap<Signature, Signature>,
}

impl ClassVisitor for BridgeVisitor<'_> {
    fn visit_method(&mut self, method: &MethodHeader) -> ControlFlow<(), MethodAction> {
        if self.pending.contains(&method.signature) {
            self.current = Some(method.signature.clone());
            ControlFlow::Continue(MethodAction::VisitBody)
        } else {
            ControlFlow::Continue(MethodAction::SkipBody)
        }
    }

    fn visit_insn(&mut self, insn: &Insn) -> ControlFlow<()> {
        let Insn::Invoke {
            kind: InvokeKind::Special | InvokeKind::Interface,
            signature: target,
            ..
        } = insn
        else {
            return ControlFlow::Continue(());
        };
        let Some(bridge) = self.current.take() else {
            return ControlFlow::Continue(());
        };

        self.pending.remove(&bridge);
        if *target != bridge {
            self.resolved.insert(bridge, target.clone());
        }
        if self.pending.is_empty() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn visit_method_end(&mut self) -> ControlFlow<()> {
        self.current = None;
        ControlFlow::Continue(())
    }
}

/// Bridges of `owner` among `candidates` whose first non-virtual call
/// targets their own signature. Such a bridge only re-exposes an inherited
/// implementation and is dropped in favour of that implementation.
pub fn find_unnecessary_bridges(
    source: &dyn ArtifactSource,
    owner: &str,
    candidates: &FxHashSet<Signature>,
) -> FxHashSet<Signature> {
    let mut visitor = UnnecessaryBridgeVisitor {
        candidates,
        current: None,
        found: FxHashSet::default(),
    };
    if let Err(err) = scan(source, owner, &mut visitor) {
        warn!(owner = %owner, error = %err, "cannot read bridge owner, keeping its bridges");
        return FxHashSet::default();
    }
    visitor.found
}

struct UnnecessaryBridgeVisitor<'c> {
    candidates: &'c FxHashSet<Signature>,
    current: Option<Signature>,
    found: FxHashSet<Signature>,
}

impl ClassVisitor for UnnecessaryBridgeVisitor<'_> {
    fn visit_method(&mut self, method: &MethodHeader) -> ControlFlow<(), MethodAction> {
        if method.access.is_bridge() && self.candidates.contains(&method.signature) {
            self.current = Some(method.signature.clone());
            ControlFlow::Continue(MethodAction::VisitBody)
        } else {
            ControlFlow::Continue(MethodAction::SkipBody)
        }
    }

    fn visit_insn(&mut self, insn: &Insn) -> ControlFlow<()> {
        if let Insn::Invoke {
            kind: InvokeKind::Special,
            signature,
            ..
        } = insn
        {
            if let Some(bridge) = self.current.take() {
                if *signature == bridge {
                    self.found.insert(bridge);
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn visit_method_end(&mut self) -> ControlFlow<()> {
        self.current = None;
        ControlFlow::Continue(())
    }
}

fn scan(
    source: &dyn ArtifactSource,
    owner: &str,
    visitor: &mut dyn ClassVisitor,
) -> Result<(), crate::error::WeaverError> {
    let bytes = source
        .artifact(owner)
        .ok_or_else(|| crate::error::WeaverError::MissingArtifact(owner.to_string()))?;
    ClassReader::new(&bytes)?.accept(visitor)?;
    Ok(())
}
