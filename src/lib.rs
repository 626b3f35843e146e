//! Simulation of liquid transfers between the wells of lab plates.
//!
//! Plates live on a [`Deck`]; a [`PickList`] of [`Transfer`]s moves volume
//! and dissolved components from well to well, checking emptiness, available
//! volume and capacity on the way.

pub mod coordinates;
pub mod units;

mod content;
mod deck;
mod error;
mod labware;
mod picklist;
mod plate;
mod provenance;
pub mod schema;
mod transfer;
mod well;

#[cfg(feature = "python")]
mod python;

pub use content::{Quantities, WellContent};
pub use coordinates::Direction;
pub use deck::Deck;
pub use error::{LabError, Result};
pub use labware::{Labware, LabwareCatalog, PlateFormat};
pub use picklist::{PickList, SortKey};
pub use plate::{GroupingOptions, Plate, PlateId, RowKey};
pub use provenance::{ProvenanceGraph, TraceDirection, TraceRow};
pub use transfer::Transfer;
pub use well::{
    Metadata, Source, SourceNode, SourcesTree, WellAddress, WellMut, WellRef, DEPLETION_TOLERANCE,
};
