//! Factory configuration.
//!
//! Everything that used to be process-wide naming state (compilation-unit
//! prefix, TLS prefixes) lives here and is fixed once the factory exists.
//!
//! ```ignore
//! let config = FactoryConfig::new(TargetArch::from_triple("i686-pc-windows-msvc")?)
//!     .with_compilation_unit_prefix("corelib_")
//!     .with_imported_tls_index_prefix("app_");
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid target triple '{triple}': {reason}")]
    InvalidTriple { triple: String, reason: &'static str },
    #[error("unsupported architecture '{arch}'")]
    UnsupportedArch { arch: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetArch {
    X86,
    X64,
    Arm,
    Arm64,
}

impl TargetArch {
    /// Architecture of a `<arch>-<vendor>-<os>[-<env>]` triple.
    pub fn from_triple(triple: &str) -> Result<Self, ConfigError> {
        let mut parts = triple.split('-');
        let arch = parts.next().unwrap_or_default();
        if arch.is_empty() || parts.count() < 2 {
            return Err(ConfigError::InvalidTriple {
                triple: triple.to_string(),
                reason: "expected at least 3 components: <arch>-<vendor>-<os>",
            });
        }
        match arch {
            "i386" | "i586" | "i686" | "x86" => Ok(Self::X86),
            "x86_64" | "amd64" => Ok(Self::X64),
            "aarch64" | "arm64" => Ok(Self::Arm64),
            a if a.starts_with("arm") || a.starts_with("thumb") => Ok(Self::Arm),
            _ => Err(ConfigError::UnsupportedArch {
                arch: arch.to_string(),
            }),
        }
    }

    /// Pointer size in bytes.
    #[must_use]
    pub fn pointer_size(self) -> u32 {
        match self {
            Self::X86 | Self::Arm => 4,
            Self::X64 | Self::Arm64 => 8,
        }
    }

    /// Prefix of externally declared TLS symbols. 32-bit x86 decorates C
    /// symbols with a leading underscore.
    #[must_use]
    pub fn tls_symbol_prefix(self) -> &'static str {
        match self {
            Self::X86 => "_",
            Self::X64 | Self::Arm | Self::Arm64 => "",
        }
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
        })
    }
}

/// Immutable naming and input configuration of a [`NodeFactory`](crate::NodeFactory).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactoryConfig {
    target: TargetArch,
    compilation_unit_prefix: String,
    imported_tls_index_prefix: String,
    metadata_file: Option<PathBuf>,
}

impl FactoryConfig {
    #[must_use]
    pub fn new(target: TargetArch) -> Self {
        Self {
            target,
            compilation_unit_prefix: String::new(),
            imported_tls_index_prefix: String::new(),
            metadata_file: None,
        }
    }

    /// Prefix applied to this unit's region and table symbols so several
    /// units can be linked into one image.
    #[must_use]
    pub fn with_compilation_unit_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.compilation_unit_prefix = prefix.into();
        self
    }

    /// Prefix of the unit that owns the TLS index of foreign types.
    #[must_use]
    pub fn with_imported_tls_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.imported_tls_index_prefix = prefix.into();
        self
    }

    /// Embed a precomputed metadata blob read from `path`.
    #[must_use]
    pub fn with_metadata_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_file = Some(path.into());
        self
    }

    pub fn target(&self) -> TargetArch {
        self.target
    }

    pub fn compilation_unit_prefix(&self) -> &str {
        &self.compilation_unit_prefix
    }

    pub fn imported_tls_index_prefix(&self) -> &str {
        &self.imported_tls_index_prefix
    }

    pub fn metadata_file(&self) -> Option<&Path> {
        self.metadata_file.as_deref()
    }
}
