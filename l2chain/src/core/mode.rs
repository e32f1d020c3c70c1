//! Instrument modes and input file identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// SIRAL instrument mode of an L1b track file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstrumentMode {
    /// Low-resolution mode (conventional pulse-limited altimetry).
    #[serde(rename = "LRM")]
    LowResolution,
    /// SAR interferometric mode.
    #[serde(rename = "SIN")]
    Interferometric,
}

impl InstrumentMode {
    /// All supported modes, in selector order.
    pub const ALL: [Self; 2] = [Self::LowResolution, Self::Interferometric];

    /// Returns the three letter mode code used in product file names.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::LowResolution => "LRM",
            Self::Interferometric => "SIN",
        }
    }

    /// Parses a mode code; returns `None` for modes the chain does not process
    /// (e.g. "SAR").
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "LRM" => Some(Self::LowResolution),
            "SIN" => Some(Self::Interferometric),
            _ => None,
        }
    }
}

impl fmt::Display for InstrumentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for InstrumentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(&s.to_ascii_uppercase()).ok_or_else(|| format!("unknown instrument mode '{s}'"))
    }
}

/// Identifies one input file of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId {
    /// Path of the L1b file.
    pub path: PathBuf,
    /// Instrument mode, when known.
    ///
    /// File selectors always set this. Explicit file lists infer it from the
    /// file name and leave it empty for modes the chain does not process.
    pub mode: Option<InstrumentMode>,
}

impl FileId {
    /// Creates an identifier with a known mode.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, mode: InstrumentMode) -> Self {
        Self {
            path: path.into(),
            mode: Some(mode),
        }
    }

    /// Creates an identifier, inferring the mode from a CryoSat file name
    /// such as `CS_OFFL_SIR_LRM_1B_20200930T191158_20200930T191302_D001.nc`.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mode = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.get(12..15))
            .and_then(InstrumentMode::from_code);
        Self { path, mode }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name, or the full path if it has none.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_codes() {
        assert_eq!(InstrumentMode::LowResolution.code(), "LRM");
        assert_eq!(InstrumentMode::from_code("SIN"), Some(InstrumentMode::Interferometric));
        assert_eq!(InstrumentMode::from_code("SAR"), None);
        assert_eq!("lrm".parse::<InstrumentMode>(), Ok(InstrumentMode::LowResolution));
    }

    #[test]
    fn test_mode_serialize() {
        let json = serde_json::to_string(&InstrumentMode::Interferometric).unwrap();
        assert_eq!(json, r#""SIN""#);
    }

    #[test]
    fn test_file_id_infers_mode() {
        let id = FileId::from_path("/data/CS_OFFL_SIR_LRM_1B_20200930T191158_20200930T191302_D001.nc");
        assert_eq!(id.mode, Some(InstrumentMode::LowResolution));

        let sar = FileId::from_path("CS_OFFL_SIR_SAR_1B_20200930T191158_20200930T191302_D001.nc");
        assert_eq!(sar.mode, None);

        let short = FileId::from_path("x.nc");
        assert_eq!(short.mode, None);
    }

    #[test]
    fn test_file_name() {
        let id = FileId::new("/a/b/track.nc", InstrumentMode::LowResolution);
        assert_eq!(id.file_name(), "track.nc");
    }
}
