use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Insufficient volume: cannot take {requested:.2e} L from {well}, current volume {available:.2e} L")]
    InsufficientVolume {
        well: String,
        requested: f64,
        available: f64,
    },

    #[error("Capacity exceeded: {volume:.2e} L into {well} would reach {final_volume:.2e} L (capacity {capacity:.2e} L)")]
    CapacityExceeded {
        well: String,
        volume: f64,
        final_volume: f64,
        capacity: f64,
    },

    #[error("Source well {0} is empty")]
    EmptySource(String),

    #[error("No unique well: {0}")]
    NoUniqueWell(String),

    #[error("Unrecognized unit: {0}")]
    UnrecognizedUnit(String),

    #[error("Unknown well {well} on plate {plate}")]
    UnknownWell { plate: String, well: String },

    #[error("Unknown plate: {0}")]
    UnknownPlate(String),

    #[error("Component {component} not present in {well}")]
    UnknownComponent { well: String, component: String },

    #[error("Invalid well name: {0}")]
    InvalidWellName(String),

    #[error("Invalid direction: {0} (expected \"row\" or \"column\")")]
    InvalidDirection(String),

    #[error("Index {index} out of range 1..={num_wells}")]
    IndexOutOfRange { index: usize, num_wells: usize },

    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    #[error("Invalid plate dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Unknown labware: {0}")]
    UnknownLabware(String),

    #[error("Unknown sort key: {0}")]
    UnknownSortKey(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, LabError>;

#[cfg(feature = "python")]
impl From<LabError> for pyo3::PyErr {
    fn from(err: LabError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
        match err {
            LabError::UnknownWell { .. } | LabError::UnknownPlate(_) => {
                PyKeyError::new_err(err.to_string())
            }
            LabError::Polars(_) | LabError::Io(_) => PyRuntimeError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}
