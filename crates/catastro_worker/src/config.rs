//! Conversion settings.
//!
//! [`ConvertConfig`] can be built in code, deserialised from a TOML file, or
//! assembled by the CLI from flags and environment variables. Every field
//! has a default, so a config file only needs the keys it overrides:
//!
//! ```toml
//! on_error = "abort"
//! encoding = "windows-1252"
//! compression = "zstd"
//! pipelined = true
//!
//! [chunk]
//! max_rows = 500000
//! ```

use crate::accumulate::ChunkLimits;
use catastro_sinks::Codec;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default encoding label for CAT files.
pub const DEFAULT_ENCODING_LABEL: &str = "windows-1252";

/// Rejections logged individually before the log goes quiet.
pub const DEFAULT_MAX_LOGGED_REJECTIONS: usize = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

/// What happens when a line fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record the rejection and keep going.
    #[default]
    Skip,
    /// Stop the run and discard the output.
    Abort,
}

impl std::str::FromStr for ErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ErrorPolicy::Skip),
            "abort" => Ok(ErrorPolicy::Abort),
            other => Err(ConfigError::Invalid(format!(
                "unknown error policy '{}' (expected 'skip' or 'abort')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    pub chunk: ChunkLimits,
    pub on_error: ErrorPolicy,
    /// WHATWG label of the source encoding.
    pub encoding: String,
    pub compression: Codec,
    /// Encode and write on a dedicated thread while the next chunk is read.
    pub pipelined: bool,
    pub max_logged_rejections: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkLimits::default(),
            on_error: ErrorPolicy::default(),
            encoding: DEFAULT_ENCODING_LABEL.to_string(),
            compression: Codec::default(),
            pipelined: false,
            max_logged_rejections: DEFAULT_MAX_LOGGED_REJECTIONS,
        }
    }
}

impl ConvertConfig {
    pub fn from_toml_str(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents, &path.display().to_string())
    }

    /// Resolve the encoding label.
    ///
    /// Line splitting and record-type matching work on raw bytes, so the
    /// encoding must keep ASCII as-is. UTF-16 and ISO-2022-JP are refused.
    pub fn source_encoding(&self) -> Result<&'static Encoding, ConfigError> {
        let encoding = Encoding::for_label(self.encoding.trim().as_bytes()).ok_or_else(|| {
            ConfigError::Invalid(format!("unknown source encoding '{}'", self.encoding))
        })?;
        if !encoding.is_ascii_compatible() {
            return Err(ConfigError::Invalid(format!(
                "source encoding '{}' is not ASCII-compatible",
                encoding.name()
            )));
        }
        Ok(encoding)
    }

    /// Check every setting before any input is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunk.validate().map_err(ConfigError::Invalid)?;
        self.source_encoding()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConvertConfig::default();
        assert_eq!(config.chunk.max_rows, 1_000_000);
        assert_eq!(config.on_error, ErrorPolicy::Skip);
        assert_eq!(config.compression, Codec::Snappy);
        assert_eq!(config.source_encoding().unwrap(), encoding_rs::WINDOWS_1252);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ConvertConfig::from_toml_str(
            "on_error = \"abort\"\ncompression = \"zstd\"\n[chunk]\nmax_rows = 10\n",
            "inline",
        )
        .unwrap();
        assert_eq!(config.on_error, ErrorPolicy::Abort);
        assert_eq!(config.compression, Codec::Zstd);
        assert_eq!(config.chunk.max_rows, 10);
        assert_eq!(config.chunk.max_bytes, ChunkLimits::default().max_bytes);
        assert_eq!(config.encoding, DEFAULT_ENCODING_LABEL);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ConvertConfig::from_toml_str("chunk_size = 5\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catastro.toml");
        fs::write(&path, "encoding = \"cp1252\"\npipelined = true\n").unwrap();
        let config = ConvertConfig::load(&path).unwrap();
        assert!(config.pipelined);
        assert_eq!(config.source_encoding().unwrap(), encoding_rs::WINDOWS_1252);

        assert!(matches!(
            ConvertConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_validation_failures() {
        let config = ConvertConfig {
            encoding: "klingon".into(),
            ..ConvertConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("klingon"));

        let config = ConvertConfig {
            chunk: ChunkLimits::rows(0),
            ..ConvertConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ascii_incompatible_encoding_rejected() {
        for label in ["utf-16le", "utf-16be", "iso-2022-jp"] {
            let config = ConvertConfig {
                encoding: label.into(),
                ..ConvertConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("not ASCII-compatible"), "{label}: {err}");
        }
        let config = ConvertConfig {
            encoding: "utf-8".into(),
            ..ConvertConfig::default()
        };
        assert_eq!(config.source_encoding().unwrap(), encoding_rs::UTF_8);
    }

    #[test]
    fn test_error_policy_parsing() {
        assert_eq!("ABORT".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Abort);
        assert!("ignore".parse::<ErrorPolicy>().is_err());
    }
}
