//! Debug dump of generated images
//!
//! When a debug location is configured, every generated image is written
//! below it as `<package dirs>/<Name>.wci` together with its disassembly in
//! `<Name>.asm`. Write failures are logged and never fail generation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::WeaverConfig;
use crate::defaults::{DISASSEMBLY_EXTENSION, IMAGE_EXTENSION};

/// Writes generated images to a directory
#[derive(Debug, Clone)]
pub struct DebugSink {
    dir: PathBuf,
}

impl DebugSink {
    /// Sink writing below `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Sink for the configured debug location, if any
    pub fn from_config(config: &WeaverConfig) -> Option<Self> {
        config.debug_location.as_ref().map(|dir| Self::new(dir.clone()))
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a class is dumped to, by extension
    pub fn path_for(&self, class_name: &str, extension: &str) -> PathBuf {
        let mut path = self.dir.join(class_name.replace('.', "/"));
        let file = format!(
            "{}.{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or(class_name),
            extension
        );
        path.set_file_name(file);
        path
    }

    /// Dump `bytes` and their disassembly
    pub fn write(&self, class_name: &str, bytes: &[u8]) {
        match self.try_write(class_name, bytes) {
            Ok(path) => debug!(class = class_name, path = %path.display(), "dumped generated image"),
            Err(err) => warn!(class = class_name, error = %err, "failed to dump generated image"),
        }
    }

    fn try_write(&self, class_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let image_path = self.path_for(class_name, IMAGE_EXTENSION);
        if let Some(parent) = image_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&image_path, bytes)?;

        let listing = weaver_image::disassemble(bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        fs::write(self.path_for(class_name, DISASSEMBLY_EXTENSION), listing)?;
        Ok(image_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weaver_image::ClassImage;

    #[test]
    fn test_path_for() {
        let sink = DebugSink::new("/tmp/dump");
        assert_eq!(
            sink.path_for("pkg.sub.Greeter$$EnhancerByWeaver$$1f", "wci"),
            PathBuf::from("/tmp/dump/pkg/sub/Greeter$$EnhancerByWeaver$$1f.wci")
        );
    }

    #[test]
    fn test_write_image_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DebugSink::new(dir.path());
        let bytes = ClassImage::new("pkg.Dumped", Some("java.lang.Object".to_string())).encode();

        sink.write("pkg.Dumped", &bytes);

        let image = fs::read(dir.path().join("pkg/Dumped.wci")).unwrap();
        assert_eq!(image, bytes);
        let listing = fs::read_to_string(dir.path().join("pkg/Dumped.asm")).unwrap();
        assert!(listing.contains("pkg.Dumped"));
    }

    #[test]
    fn test_unwritable_location_is_ignored() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let sink = DebugSink::new(file.path());
        sink.write("pkg.Dumped", &[1, 2, 3]);
        assert!(!file.path().join("pkg").exists());
    }

    #[test]
    fn test_from_config() {
        assert!(DebugSink::from_config(&WeaverConfig::new()).is_none());
        let sink = DebugSink::from_config(&WeaverConfig::new().with_debug_location("/tmp/w")).unwrap();
        assert_eq!(sink.dir(), Path::new("/tmp/w"));
    }
}
