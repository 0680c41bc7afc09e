//! Default constants for proxy generation.
//!
//! Centralizes names shared by the naming policy, the emitter and the
//! runtime bootstrap.

/// Root class every class extends.
pub const OBJECT_CLASS: &str = weaver_image::descriptor::OBJECT_CLASS;

/// Marker interface implemented by generated types with factory support.
pub const FACTORY_INTERFACE: &str = "weaver.Factory";

/// Declared type of callback slot fields.
pub const CALLBACK_TYPE: &str = "weaver.Callback";

/// Prefix used when the naming policy receives no prefix.
pub const PLACEHOLDER_PREFIX: &str = "weaver.empty.Object";

/// Reserved namespace; generated names starting with it are escaped.
pub const RESERVED_NAMESPACE: &str = "java";

/// Separator between the parts of a generated name.
pub const NAME_SEPARATOR: &str = "$$";

/// Tag appended to the source's short name.
pub const NAME_TAG: &str = "ByWeaver";

/// Source discriminator used by the enhancer.
pub const ENHANCER_SOURCE: &str = "weaver.Enhancer";

/// Prefix of callback slot field names (`WEAVER$CALLBACK_0`).
pub const CALLBACK_FIELD_PREFIX: &str = "WEAVER$CALLBACK_";

/// Prefix of access method names (`WEAVER$greet$0`).
pub const ACCESS_METHOD_PREFIX: &str = "WEAVER$";

/// Environment variable naming the debug dump directory.
pub const DEBUG_LOCATION_ENV: &str = "WEAVER_DEBUG_LOCATION";

/// File extension of dumped class images.
pub const IMAGE_EXTENSION: &str = "wci";

/// File extension of dumped disassembly.
pub const DISASSEMBLY_EXTENSION: &str = "asm";

/// Callback slot field name for `index`.
pub fn callback_field(index: usize) -> String {
    format!("{}{}", CALLBACK_FIELD_PREFIX, index)
}

/// Access method name for the intercepted method `name` at `index`.
pub fn access_method(name: &str, index: usize) -> String {
    format!("{}{}${}", ACCESS_METHOD_PREFIX, name, index)
}
