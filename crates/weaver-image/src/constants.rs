//! Constant pool for class images
//!
//! Every name, descriptor and owner referenced by an image is stored once in
//! the pool and referenced by index.

use rustc_hash::FxHashMap;

use crate::encoder::{DecodeError, ImageReader, ImageWriter};

/// Index written for an absent optional entry
pub const NO_INDEX: u32 = u32::MAX;

/// String constant pool with interning
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// String constants in index order
    pub strings: Vec<String>,
    lookup: FxHashMap<String, u32>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string (deduplicated) and return its index
    pub fn add_string(&mut self, s: &str) -> u32 {
        if let Some(&index) = self.lookup.get(s) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.lookup.insert(s.to_string(), index);
        index
    }

    /// Add an optional string; `None` maps to [`NO_INDEX`]
    pub fn add_optional(&mut self, s: Option<&str>) -> u32 {
        s.map(|s| self.add_string(s)).unwrap_or(NO_INDEX)
    }

    /// Get a string by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| s.as_str())
    }

    /// Get a string by index, failing on a bad reference
    pub fn resolve(&self, index: u32) -> Result<&str, DecodeError> {
        self.get_string(index)
            .ok_or(DecodeError::InvalidConstant(index))
    }

    /// Resolve an optional reference
    pub fn resolve_optional(&self, index: u32) -> Result<Option<&str>, DecodeError> {
        if index == NO_INDEX {
            Ok(None)
        } else {
            self.resolve(index).map(Some)
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Encode as count (u32) followed by length-prefixed strings
    pub fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
    }

    /// Decode a pool written by [`ConstantPool::encode`]
    pub fn decode(reader: &mut ImageReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut pool = ConstantPool::new();
        pool.strings.reserve(count.min(reader.remaining()));
        for _ in 0..count {
            let s = reader.read_string()?;
            let index = pool.strings.len() as u32;
            pool.lookup.entry(s.clone()).or_insert(index);
            pool.strings.push(s);
        }
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning() {
        let mut pool = ConstantPool::new();
        let a = pool.add_string("pkg/Base");
        let b = pool.add_string("run");
        let c = pool.add_string("pkg/Base");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.add_optional(None), NO_INDEX);
    }

    #[test]
    fn test_resolve_errors() {
        let pool = ConstantPool::new();
        assert_eq!(pool.resolve(3), Err(DecodeError::InvalidConstant(3)));
        assert_eq!(pool.resolve_optional(NO_INDEX), Ok(None));
    }

    #[test]
    fn test_encode_decode() {
        let mut pool = ConstantPool::new();
        pool.add_string("java/lang/Object");
        pool.add_string("<init>");
        let mut writer = ImageWriter::new();
        pool.encode(&mut writer);
        let bytes = writer.into_bytes();

        let decoded = ConstantPool::decode(&mut ImageReader::new(&bytes)).unwrap();
        assert_eq!(decoded.get_string(1), Some("<init>"));
        assert_eq!(decoded.len(), 2);
    }
}
