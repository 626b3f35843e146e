//! Labware definitions: plate dimensions and per-well constants.
//!
//! Built-in formats cover the common microplates and the Echo source plates.
//! Additional formats can be declared in TOML:
//!
//! ```toml
//! [labware.DeepWell24]
//! num_rows = 4
//! num_columns = 6
//! well_capacity = 1e-2
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::error::{LabError, Result};
use crate::plate::Plate;

/// Upper bound on the wells of one plate.
pub const MAX_WELLS: usize = 1 << 16;

/// Dimensions and well constants of a plate type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlateFormat {
    /// Type name used in reports, e.g. "Plate96". Filled from the table key
    /// when loaded from TOML.
    #[serde(default)]
    pub kind: String,
    pub num_rows: usize,
    pub num_columns: usize,
    /// Maximum volume of each well in liters; `None` is unrestricted.
    #[serde(default)]
    pub well_capacity: Option<f64>,
    /// Residual volume in liters that cannot be reliably aspirated.
    /// Recorded on the wells, not enforced by transfers.
    #[serde(default)]
    pub dead_volume: Option<f64>,
    /// All wells share one content (reservoirs and troughs).
    #[serde(default)]
    pub shared_content: bool,
}

impl PlateFormat {
    pub fn new(kind: impl Into<String>, num_rows: usize, num_columns: usize) -> Self {
        Self {
            kind: kind.into(),
            num_rows,
            num_columns,
            well_capacity: None,
            dead_volume: None,
            shared_content: false,
        }
    }

    pub fn with_well_capacity(mut self, capacity: f64) -> Self {
        self.well_capacity = Some(capacity);
        self
    }

    pub fn with_dead_volume(mut self, dead_volume: f64) -> Self {
        self.dead_volume = Some(dead_volume);
        self
    }

    pub fn with_shared_content(mut self) -> Self {
        self.shared_content = true;
        self
    }

    pub fn num_wells(&self) -> usize {
        self.num_rows.saturating_mul(self.num_columns)
    }

    pub fn validate(&self) -> Result<()> {
        let too_large = self
            .num_rows
            .checked_mul(self.num_columns)
            .map_or(true, |n| n > MAX_WELLS);
        if self.num_rows == 0 || self.num_columns == 0 || too_large {
            return Err(LabError::InvalidDimensions(format!(
                "{}: {} rows x {} columns",
                self.kind, self.num_rows, self.num_columns
            )));
        }
        for (field, value) in [
            ("well_capacity", self.well_capacity),
            ("dead_volume", self.dead_volume),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(LabError::InvalidVolume(format!(
                        "{}: {field} must be a non-negative number, got {v}",
                        self.kind
                    )));
                }
            }
        }
        Ok(())
    }
}

// ── Built-in labware ────────────────────────────────────────────────────────

/// Plate types known without any configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Labware {
    Plate96,
    Plate384,
    Plate1536,
    /// 8-well colony plating plate.
    Plate2x4,
    /// 4titude 96-well plate.
    Plate4ti0960,
    /// 4titude 96-well plate with 2 mL deep wells.
    Plate4ti0130,
    /// Low dead volume 384-well Echo plate.
    PlateLabcyteEchoLp0200Ldv,
    /// Polypropylene 384-well Echo plate.
    PlateLabcyteEchoP05525Pp,
    /// Eight positions sharing one reservoir.
    Trough8x1,
}

impl Labware {
    pub const ALL: [Labware; 9] = [
        Labware::Plate96,
        Labware::Plate384,
        Labware::Plate1536,
        Labware::Plate2x4,
        Labware::Plate4ti0960,
        Labware::Plate4ti0130,
        Labware::PlateLabcyteEchoLp0200Ldv,
        Labware::PlateLabcyteEchoP05525Pp,
        Labware::Trough8x1,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Labware::Plate96 => "Plate96",
            Labware::Plate384 => "Plate384",
            Labware::Plate1536 => "Plate1536",
            Labware::Plate2x4 => "Plate2x4",
            Labware::Plate4ti0960 => "Plate4ti0960",
            Labware::Plate4ti0130 => "Plate4ti0130",
            Labware::PlateLabcyteEchoLp0200Ldv => "PlateLabcyteEchoLp0200Ldv",
            Labware::PlateLabcyteEchoP05525Pp => "PlateLabcyteEchoP05525Pp",
            Labware::Trough8x1 => "Trough8x1",
        }
    }

    pub fn format(self) -> PlateFormat {
        let kind = self.name();
        match self {
            Labware::Plate96 => PlateFormat::new(kind, 8, 12),
            Labware::Plate384 => PlateFormat::new(kind, 16, 24),
            Labware::Plate1536 => PlateFormat::new(kind, 32, 48),
            Labware::Plate2x4 => PlateFormat::new(kind, 2, 4),
            Labware::Plate4ti0960 => PlateFormat::new(kind, 8, 12).with_well_capacity(150e-6),
            Labware::Plate4ti0130 => PlateFormat::new(kind, 8, 12).with_well_capacity(1900e-6),
            Labware::PlateLabcyteEchoLp0200Ldv => PlateFormat::new(kind, 16, 24)
                .with_well_capacity(12e-6)
                .with_dead_volume(3e-6),
            Labware::PlateLabcyteEchoP05525Pp => PlateFormat::new(kind, 16, 24)
                .with_well_capacity(50e-6)
                .with_dead_volume(15e-6),
            Labware::Trough8x1 => PlateFormat::new(kind, 8, 1).with_shared_content(),
        }
    }
}

impl fmt::Display for Labware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Labware {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        Labware::ALL
            .into_iter()
            .find(|l| l.name() == s)
            .ok_or_else(|| LabError::UnknownLabware(s.to_string()))
    }
}

// ── Catalog ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    labware: BTreeMap<String, PlateFormat>,
}

/// Plate formats by type name: the built-ins plus any loaded definitions.
#[derive(Debug, Clone)]
pub struct LabwareCatalog {
    formats: BTreeMap<String, PlateFormat>,
}

impl Default for LabwareCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LabwareCatalog {
    pub fn builtin() -> Self {
        let formats = Labware::ALL
            .into_iter()
            .map(|l| (l.name().to_string(), l.format()))
            .collect();
        Self { formats }
    }

    /// Built-in catalog extended with the `[labware.*]` tables of `text`.
    /// A definition with a built-in name replaces the built-in.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut catalog = Self::builtin();
        catalog.extend_from_toml_str(text)?;
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn extend_from_toml_str(&mut self, text: &str) -> Result<()> {
        let file: CatalogFile = toml::from_str(text)?;
        for (kind, mut format) in file.labware {
            format.kind = kind.clone();
            format.validate()?;
            debug!(kind = %kind, rows = format.num_rows, columns = format.num_columns, "registered labware");
            self.formats.insert(kind, format);
        }
        Ok(())
    }

    pub fn insert(&mut self, format: PlateFormat) -> Result<()> {
        format.validate()?;
        self.formats.insert(format.kind.clone(), format);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Result<&PlateFormat> {
        self.formats
            .get(kind)
            .ok_or_else(|| LabError::UnknownLabware(kind.to_string()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    /// New plate of the named type.
    pub fn plate(&self, kind: &str, name: Option<&str>) -> Result<Plate> {
        Plate::new(self.get(kind)?.clone(), name)
    }
}
