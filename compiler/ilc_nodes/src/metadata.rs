//! Reflection metadata.
//!
//! Without a metadata file nothing is embedded. With one, the blob is read
//! in full before compilation starts and embedded verbatim; the first input
//! module carrying metadata mappings describes it.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use ilc_ir::{ModuleFlags, ModuleId, TypeSystem};

use crate::error::MetadataError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataManager {
    Empty,
    Precomputed {
        /// Module whose mapping tables describe the blob.
        module: ModuleId,
        blob: Arc<[u8]>,
    },
}

impl MetadataManager {
    /// Choose the manager for `metadata_file` over `input_modules`.
    pub fn pick(
        types: &TypeSystem,
        input_modules: &[ModuleId],
        metadata_file: Option<&Path>,
    ) -> Result<Self, MetadataError> {
        let Some(path) = metadata_file else {
            return Ok(Self::Empty);
        };
        let module = input_modules
            .iter()
            .copied()
            .find(|&m| {
                types
                    .module_desc(m)
                    .flags
                    .contains(ModuleFlags::HAS_METADATA_MAPPINGS)
            })
            .ok_or_else(|| MetadataError::NoMappingModule {
                path: path.to_path_buf(),
            })?;
        let blob = read_metadata_blob(path)?;
        tracing::debug!(path = %path.display(), bytes = blob.len(), "loaded metadata blob");
        Ok(Self::Precomputed {
            module,
            blob: blob.into(),
        })
    }

    pub fn blob(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => None,
            Self::Precomputed { blob, .. } => Some(&blob[..]),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Read the whole file at `path`; its length at open time is the declared
/// size and a shorter read is an error.
pub fn read_metadata_blob(path: &Path) -> Result<Vec<u8>, MetadataError> {
    let io_err = |source: io::Error| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let declared = file.metadata().map_err(io_err)?.len();
    read_fixed(file, declared, path)
}

/// Read exactly `declared` bytes from `reader`.
pub(crate) fn read_fixed(reader: impl Read, declared: u64, path: &Path) -> Result<Vec<u8>, MetadataError> {
    let capacity = usize::try_from(declared).map_err(|_| MetadataError::TooLarge {
        path: path.to_path_buf(),
    })?;
    let mut buf = Vec::with_capacity(capacity);
    let read = reader
        .take(declared)
        .read_to_end(&mut buf)
        .map_err(|source: io::Error| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if (read as u64) < declared {
        return Err(MetadataError::Truncated {
            path: path.to_path_buf(),
            expected: declared,
            found: read as u64,
        });
    }
    Ok(buf)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_whole_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x01\x02metadata").unwrap();
        assert_eq!(read_metadata_blob(file.path()).unwrap(), b"\x01\x02metadata");
    }

    #[test]
    fn short_source_is_truncated() {
        let err = read_fixed(Cursor::new(vec![0u8; 10]), 16, Path::new("blob")).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::Truncated {
                expected: 16,
                found: 10,
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_metadata_blob(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, MetadataError::Io { .. }));
    }

    #[test]
    fn no_file_means_empty_manager() {
        let types = TypeSystem::new();
        let manager = MetadataManager::pick(&types, &types.modules(), None).unwrap();
        assert!(manager.is_empty());
        assert_eq!(manager.blob(), None);
    }

    #[test]
    fn picks_first_module_with_mappings() {
        let types = TypeSystem::new();
        let plain = types.add_module("Plain", ModuleFlags::empty());
        let first = types.add_module("First", ModuleFlags::HAS_METADATA_MAPPINGS);
        let second = types.add_module("Second", ModuleFlags::HAS_METADATA_MAPPINGS);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"blob").unwrap();

        let manager =
            MetadataManager::pick(&types, &[plain, first, second], Some(file.path())).unwrap();
        assert_eq!(
            manager,
            MetadataManager::Precomputed {
                module: first,
                blob: Arc::from(&b"blob"[..]),
            }
        );
    }

    #[test]
    fn blob_without_mapping_module_is_rejected() {
        let types = TypeSystem::new();
        let plain = types.add_module("Plain", ModuleFlags::empty());
        let err = MetadataManager::pick(&types, &[plain], Some(Path::new("unused.bin"))).unwrap_err();
        assert!(matches!(err, MetadataError::NoMappingModule { .. }));
    }
}
