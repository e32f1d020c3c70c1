//! CryoSat-2 SIRAL L1b product file names.

use crate::core::InstrumentMode;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";

fn pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^CS_(?P<class>[A-Z0-9_]{4})_SIR_(?P<mode>[A-Z]{3})_1B_(?P<start>\d{8}T\d{6})_(?P<end>\d{8}T\d{6})_(?P<baseline>[A-Z])(?P<version>\d{3})\.nc$",
            )
            .ok()
        })
        .as_ref()
}

/// Fields encoded in a name such as
/// `CS_OFFL_SIR_LRM_1B_20200930T191158_20200930T191302_D001.nc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1bFileName {
    /// File class, e.g. "OFFL" or "LTA_".
    pub file_class: String,
    /// Raw three-letter mode code (LRM, SIN, SAR).
    pub mode_code: String,
    /// Sensing start.
    pub start: NaiveDateTime,
    /// Sensing stop.
    pub end: NaiveDateTime,
    /// Processing baseline letter.
    pub baseline: char,
    /// File version within the baseline.
    pub version: u32,
}

impl L1bFileName {
    /// Parses a bare file name. Returns `None` if it is not an L1b product.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let caps = pattern()?.captures(name)?;
        Some(Self {
            file_class: caps["class"].to_string(),
            mode_code: caps["mode"].to_string(),
            start: NaiveDateTime::parse_from_str(&caps["start"], DATETIME_FORMAT).ok()?,
            end: NaiveDateTime::parse_from_str(&caps["end"], DATETIME_FORMAT).ok()?,
            baseline: caps["baseline"].chars().next()?,
            version: caps["version"].parse().ok()?,
        })
    }

    /// Returns the instrument mode, or `None` for modes the chain does not
    /// process.
    #[must_use]
    pub fn mode(&self) -> Option<InstrumentMode> {
        InstrumentMode::from_code(&self.mode_code)
    }

    /// Returns the sensing start date.
    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }
}
