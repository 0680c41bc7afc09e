//! Generation keys
//!
//! A [`GenerationKey`] is the identity of a requested proxy shape. Equal keys
//! share one generated type per loader; the callback filter and naming policy
//! take part through their value equality.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::callback::{CallbackFilter, CallbackKind};
use crate::naming::NamingPolicy;

/// Identity of a requested proxy shape
#[derive(Clone)]
pub struct GenerationKey {
    superclass: Arc<str>,
    interfaces: Vec<Arc<str>>,
    callback_kinds: Vec<CallbackKind>,
    filter: Arc<dyn CallbackFilter>,
    naming: Arc<dyn NamingPolicy>,
    use_factory: bool,
    intercept_during_construction: bool,
}

impl GenerationKey {
    /// Build a key
    pub fn new(
        superclass: &str,
        interfaces: &[String],
        callback_kinds: Vec<CallbackKind>,
        filter: Arc<dyn CallbackFilter>,
        naming: Arc<dyn NamingPolicy>,
    ) -> Self {
        Self {
            superclass: Arc::from(superclass),
            interfaces: interfaces.iter().map(|name| Arc::from(name.as_str())).collect(),
            callback_kinds,
            filter,
            naming,
            use_factory: true,
            intercept_during_construction: true,
        }
    }

    /// Set whether the generated type implements the factory interface
    pub fn with_use_factory(mut self, use_factory: bool) -> Self {
        self.use_factory = use_factory;
        self
    }

    /// Set whether calls made by base constructors are intercepted
    pub fn with_intercept_during_construction(mut self, intercept: bool) -> Self {
        self.intercept_during_construction = intercept;
        self
    }

    /// Base class name
    pub fn superclass(&self) -> &str {
        &self.superclass
    }

    /// Additional interfaces, in request order
    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.interfaces.iter().map(|name| &**name)
    }

    /// Declared kind of each callback slot
    pub fn callback_kinds(&self) -> &[CallbackKind] {
        &self.callback_kinds
    }

    /// Filter routing methods to slots
    pub fn filter(&self) -> &Arc<dyn CallbackFilter> {
        &self.filter
    }

    /// Naming policy for the generated type
    pub fn naming(&self) -> &Arc<dyn NamingPolicy> {
        &self.naming
    }

    /// Whether the generated type implements the factory interface
    pub fn use_factory(&self) -> bool {
        self.use_factory
    }

    /// Whether calls made by base constructors are intercepted
    pub fn intercept_during_construction(&self) -> bool {
        self.intercept_during_construction
    }

    /// Hash of the key; equal keys hash alike, deterministic within a build
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for GenerationKey {
    fn eq(&self, other: &Self) -> bool {
        self.superclass == other.superclass
            && self.interfaces == other.interfaces
            && self.callback_kinds == other.callback_kinds
            && self.use_factory == other.use_factory
            && self.intercept_during_construction == other.intercept_during_construction
            && self.filter.as_ref().dyn_eq(other.filter.as_ref().as_any())
            && self.naming.as_ref().dyn_eq(other.naming.as_ref().as_any())
    }
}

impl Eq for GenerationKey {}

impl Hash for GenerationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.superclass.hash(state);
        self.interfaces.hash(state);
        self.callback_kinds.hash(state);
        self.use_factory.hash(state);
        self.intercept_during_construction.hash(state);
        self.filter.as_ref().dyn_hash(state);
        self.naming.as_ref().dyn_hash(state);
    }
}

impl fmt::Debug for GenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationKey")
            .field("superclass", &self.superclass)
            .field("interfaces", &self.interfaces)
            .field("callback_kinds", &self.callback_kinds)
            .field("filter", &self.filter)
            .field("naming", &self.naming)
            .field("use_factory", &self.use_factory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{AllToFirst, RouteByName};
    use crate::naming::DefaultNamingPolicy;
    use rustc_hash::FxHashSet;

    fn key(filter: Arc<dyn CallbackFilter>) -> GenerationKey {
        GenerationKey::new(
            "pkg.Base",
            &["pkg.Greeter".to_string()],
            vec![CallbackKind::MethodInterceptor, CallbackKind::NoOp],
            filter,
            Arc::new(DefaultNamingPolicy),
        )
    }

    #[test]
    fn test_equal_keys() {
        let a = key(Arc::new(RouteByName::new(1).route("add", 0)));
        let b = key(Arc::new(RouteByName::new(1).route("add", 0)));
        assert_eq!(a, b);
        assert_eq!(a.stable_hash(), b.stable_hash());

        let mut set = FxHashSet::default();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_filter_changes_identity() {
        let a = key(Arc::new(RouteByName::new(1)));
        let b = key(Arc::new(AllToFirst));
        assert_ne!(a, b);
    }

    #[test]
    fn test_flags_change_identity() {
        let a = key(Arc::new(AllToFirst));
        let b = key(Arc::new(AllToFirst)).with_use_factory(false);
        let c = key(Arc::new(AllToFirst)).with_intercept_during_construction(false);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.use_factory());
        assert!(!c.intercept_during_construction());
    }
}
