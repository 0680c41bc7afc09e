//! Selection of the methods a generated type overrides
//!
//! Methods are gathered from the base class, its superclasses and every
//! interface in reach, in that order, then filtered:
//!
//! 1. static methods are rejected
//! 2. private methods are rejected; package-private ones are kept only when
//!    declared in the base class's package
//! 3. the first occurrence of each signature wins, except for a bridge that
//!    merely re-exposes a later concrete method of the same signature
//! 4. final methods are rejected
//!
//! Duplicates are removed before final methods, so a final override hides
//! the overridable method it overrides.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use weaver_image::descriptor::package_name;
use weaver_image::Signature;

use crate::bridge::find_unnecessary_bridges;
use crate::metadata::{ArtifactSource, MethodRecord};
use crate::runtime::RuntimeClass;

/// Methods to intercept, in walk order
pub(crate) fn collect_methods(
    source: &dyn ArtifactSource,
    superclass: &RuntimeClass,
    interfaces: &[Arc<RuntimeClass>],
) -> Vec<MethodRecord> {
    let mut all = Vec::new();
    add_all_methods(superclass, &mut all);
    for iface in interfaces {
        add_all_methods(iface, &mut all);
    }

    let package = superclass.package();
    let rejected = unnecessary_bridges(source, &all);
    let mut unique = FxHashSet::default();

    all.into_iter()
        .filter(|m| !m.access.is_static())
        .filter(|m| is_visible(m, package))
        .filter(|m| {
            !rejected.contains(&(m.owner.clone(), m.signature.clone()))
                && unique.insert(m.signature.clone())
        })
        .filter(|m| !m.access.is_final())
        .collect()
}

fn add_all_methods(class: &RuntimeClass, out: &mut Vec<MethodRecord>) {
    out.extend(
        class
            .declared_methods()
            .iter()
            .filter(|m| !m.signature.is_constructor())
            .map(|m| MethodRecord {
                owner: m.owner.clone(),
                signature: m.signature.clone(),
                access: m.access,
                exceptions: m.exceptions.clone(),
            }),
    );
    if let Some(sup) = class.superclass() {
        add_all_methods(sup, out);
    }
    for iface in class.interfaces() {
        add_all_methods(iface, out);
    }
}

fn is_visible(method: &MethodRecord, package: &str) -> bool {
    let access = method.access;
    if access.is_private() {
        return false;
    }
    if access.is_public() || access.is_protected() {
        return true;
    }
    package_name(&method.owner) == package
}

/// Bridges shadowed by a later concrete method of the same signature whose
/// body only calls that signature non-virtually
fn unnecessary_bridges(
    source: &dyn ArtifactSource,
    methods: &[MethodRecord],
) -> FxHashSet<(Arc<str>, Signature)> {
    let mut first: FxHashMap<&Signature, &MethodRecord> = FxHashMap::default();
    let mut suspects: FxHashMap<Arc<str>, FxHashSet<Signature>> = FxHashMap::default();
    for method in methods {
        match first.get(&method.signature) {
            None => {
                first.insert(&method.signature, method);
            }
            Some(existing) if existing.is_bridge() && !method.is_bridge() => {
                suspects
                    .entry(existing.owner.clone())
                    .or_default()
                    .insert(existing.signature.clone());
            }
            Some(_) => {}
        }
    }

    let mut rejected = FxHashSet::default();
    for (owner, candidates) in suspects {
        for signature in find_unnecessary_bridges(source, &owner, &candidates) {
            rejected.insert((owner.clone(), signature));
        }
    }
    rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ClassDefinition, MethodDefinition, TypeLoader, Value};

    fn names(methods: &[MethodRecord]) -> Vec<String> {
        methods
            .iter()
            .map(|m| format!("{}.{}", m.owner, m.signature.name()))
            .collect()
    }

    fn define_hierarchy(loader: &TypeLoader) {
        loader
            .define(
                ClassDefinition::interface("pkg.Named")
                    .add_method(MethodDefinition::abstract_method("String name()"))
                    .add_method(MethodDefinition::abstract_method("String label()")),
            )
            .unwrap();
        loader
            .define(
                ClassDefinition::new("pkg.Base")
                    .implements("pkg.Named")
                    .add_method(MethodDefinition::new("String name()", |_| Ok(Value::string("base"))))
                    .add_method(MethodDefinition::new("void secret()", |_| Ok(Value::Void)).as_private())
                    .add_method(MethodDefinition::new("void util()", |_| Ok(Value::Void)).as_static())
                    .add_method(MethodDefinition::new("void local()", |_| Ok(Value::Void)).as_package_private())
                    .add_method(MethodDefinition::new("int size()", |_| Ok(Value::int(1)))),
            )
            .unwrap();
        loader
            .define(
                ClassDefinition::new("pkg.Child")
                    .extends("pkg.Base")
                    .add_method(MethodDefinition::new("int size()", |_| Ok(Value::int(2))).as_final())
                    .add_method(MethodDefinition::new("void tick()", |_| Ok(Value::Void))),
            )
            .unwrap();
    }

    #[test]
    fn test_collect_filters_and_orders() {
        let loader = TypeLoader::new();
        define_hierarchy(&loader);
        let child = loader.load("pkg.Child").unwrap();

        let methods = collect_methods(&loader, &child, &[]);
        assert_eq!(
            names(&methods),
            vec!["pkg.Child.tick", "pkg.Base.name", "pkg.Base.local", "pkg.Named.label"]
        );
    }

    #[test]
    fn test_package_private_outside_package_is_hidden() {
        let loader = TypeLoader::new();
        define_hierarchy(&loader);
        loader
            .define(ClassDefinition::new("other.Sub").extends("pkg.Base"))
            .unwrap();
        let sub = loader.load("other.Sub").unwrap();

        let methods = collect_methods(&loader, &sub, &[]);
        assert!(!names(&methods).iter().any(|n| n.ends_with(".local")));
        assert!(names(&methods).iter().any(|n| n == "pkg.Base.size"));
    }

    #[test]
    fn test_visibility_bridge_is_rejected() {
        let loader = TypeLoader::new();
        loader
            .define(
                ClassDefinition::new("pkg.Hidden").add_method(
                    MethodDefinition::new("String id()", |_| Ok(Value::string("id"))).as_package_private(),
                ),
            )
            .unwrap();
        loader
            .define(
                ClassDefinition::new("pkg.Exposed")
                    .extends("pkg.Hidden")
                    .add_method(MethodDefinition::super_bridge("String id()")),
            )
            .unwrap();
        let exposed = loader.load("pkg.Exposed").unwrap();

        let methods = collect_methods(&loader, &exposed, &[]);
        assert_eq!(names(&methods), vec!["pkg.Hidden.id"]);
    }

    #[test]
    fn test_extra_interfaces_are_walked() {
        let loader = TypeLoader::new();
        loader
            .define(
                ClassDefinition::interface("pkg.Runner")
                    .add_method(MethodDefinition::abstract_method("void run()")),
            )
            .unwrap();
        let root = loader.load("java.lang.Object").unwrap();
        let runner = loader.load("pkg.Runner").unwrap();

        let methods = collect_methods(&loader, &root, &[runner]);
        assert_eq!(names(&methods), vec!["pkg.Runner.run"]);
        assert!(methods[0].is_abstract());
    }
}
