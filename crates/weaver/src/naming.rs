//! Naming of generated types

use std::fmt;

use weaver_image::descriptor::short_name;

use crate::callback::DynKey;
use crate::defaults::{NAME_SEPARATOR, NAME_TAG, PLACEHOLDER_PREFIX, RESERVED_NAMESPACE};
use crate::key::GenerationKey;

/// Chooses the class name of a generated type
///
/// Policies take part in [`GenerationKey`] equality, so they need value
/// equality and hashing (see [`DynKey`]).
pub trait NamingPolicy: DynKey + fmt::Debug {
    /// Name for a type generated from `prefix` (usually the base class) by
    /// `source`. Must not return a name for which `exists` reports `true`.
    fn class_name(
        &self,
        prefix: Option<&str>,
        source: &str,
        key: &GenerationKey,
        exists: &dyn Fn(&str) -> bool,
    ) -> String;
}

/// `<prefix>$$<Source>ByWeaver$$<hash>`, suffixed with `_2`, `_3`, ... while
/// the name is taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DefaultNamingPolicy;

impl NamingPolicy for DefaultNamingPolicy {
    fn class_name(
        &self,
        prefix: Option<&str>,
        source: &str,
        key: &GenerationKey,
        exists: &dyn Fn(&str) -> bool,
    ) -> String {
        let prefix = match prefix {
            None => PLACEHOLDER_PREFIX.to_string(),
            Some(prefix) if prefix.starts_with(RESERVED_NAMESPACE) => format!("${}", prefix),
            Some(prefix) => prefix.to_string(),
        };
        let base = format!(
            "{}{}{}{}{}{:x}",
            prefix,
            NAME_SEPARATOR,
            short_name(source),
            NAME_TAG,
            NAME_SEPARATOR,
            key.stable_hash() as u32
        );

        let mut attempt = base.clone();
        let mut index = 2;
        while exists(&attempt) {
            attempt = format!("{}_{}", base, index);
            index += 1;
        }
        attempt
    }
}
