use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::coordinates::Direction;
use crate::deck::Deck;
use crate::labware::LabwareCatalog;
use crate::picklist::{PickList, SortKey};
use crate::provenance::ProvenanceGraph;
use crate::schema;
use crate::transfer::Transfer;
use crate::well::WellAddress;

/// Plates addressed by name, with the labware catalog used to create them.
#[pyclass(name = "Deck", unsendable)]
pub struct PyDeck {
    deck: Deck,
    catalog: LabwareCatalog,
}

impl PyDeck {
    fn address(&self, plate: &str, well: &str) -> PyResult<WellAddress> {
        Ok(self.deck.plate_named(plate)?.address(well)?)
    }
}

#[pymethods]
impl PyDeck {
    #[new]
    #[pyo3(signature = (labware_file=None))]
    fn new(labware_file: Option<&str>) -> PyResult<Self> {
        let catalog = match labware_file {
            Some(path) => LabwareCatalog::load(path)?,
            None => LabwareCatalog::builtin(),
        };
        Ok(Self {
            deck: Deck::new(),
            catalog,
        })
    }

    fn labware_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.catalog.kinds().map(str::to_string).collect();
        kinds.sort();
        kinds
    }

    /// Add a new empty plate. Plate names must be unique on a deck.
    fn add_plate(&mut self, kind: &str, name: &str) -> PyResult<()> {
        if self.deck.plate_named(name).is_ok() {
            return Err(PyValueError::new_err(format!("Plate {name} is already on the deck")));
        }
        let plate = self.catalog.plate(kind, Some(name))?;
        self.deck.add_plate(plate);
        Ok(())
    }

    fn plate_names(&self) -> Vec<String> {
        self.deck
            .plates()
            .map(|p| p.name().unwrap_or("None").to_string())
            .collect()
    }

    #[pyo3(signature = (plate, well, quantities, volume, unit="L"))]
    fn add_content(
        &mut self,
        plate: &str,
        well: &str,
        quantities: HashMap<String, f64>,
        volume: f64,
        unit: &str,
    ) -> PyResult<()> {
        let address = self.address(plate, well)?;
        self.deck
            .well_mut(&address)?
            .add_content(quantities, volume, unit)?;
        Ok(())
    }

    fn empty_well(&mut self, plate: &str, well: &str) -> PyResult<()> {
        let address = self.address(plate, well)?;
        self.deck.well_mut(&address)?.empty_completely();
        Ok(())
    }

    fn well_volume(&self, plate: &str, well: &str) -> PyResult<f64> {
        let address = self.address(plate, well)?;
        Ok(self.deck.well(&address)?.volume())
    }

    fn well_quantities(&self, plate: &str, well: &str) -> PyResult<HashMap<String, f64>> {
        let address = self.address(plate, well)?;
        let well = self.deck.well(&address)?;
        Ok(well
            .content()
            .quantities
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }

    fn well_summary(&self, plate: &str, well: &str) -> PyResult<String> {
        let address = self.address(plate, well)?;
        Ok(self.deck.well(&address)?.pretty_summary())
    }

    /// Well table of a plate, one row per well.
    #[pyo3(signature = (plate, direction="row"))]
    fn plate_dataframe(&self, plate: &str, direction: &str) -> PyResult<PyDataFrame> {
        let direction: Direction = direction.parse()?;
        let df = self.deck.plate_named(plate)?.to_dataframe(direction)?;
        Ok(PyDataFrame(df))
    }

    /// Trace the wells linked to each origin by the transfers applied so far.
    fn trace(&self, origins: Vec<(String, String)>) -> PyResult<PyDataFrame> {
        let origins = origins
            .iter()
            .map(|(plate, well)| self.address(plate, well))
            .collect::<PyResult<Vec<_>>>()?;
        let df = ProvenanceGraph::from_deck(&self.deck).trace_dataframe(&origins)?;
        Ok(PyDataFrame(df))
    }

    fn __len__(&self) -> usize {
        self.deck.len()
    }
}

#[pyclass(name = "PickList", unsendable)]
#[derive(Default)]
pub struct PyPickList {
    picklist: PickList,
}

impl From<PickList> for PyPickList {
    fn from(picklist: PickList) -> Self {
        Self { picklist }
    }
}

#[pymethods]
impl PyPickList {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    fn add_transfer(
        &mut self,
        deck: PyRef<'_, PyDeck>,
        source: (String, String),
        destination: (String, String),
        volume: f64,
    ) -> PyResult<()> {
        let source = deck.address(&source.0, &source.1)?;
        let destination = deck.address(&destination.0, &destination.1)?;
        self.picklist
            .add_transfer(Transfer::new(source, destination, volume));
        Ok(())
    }

    /// Apply the transfers to the plates of `deck`.
    fn simulate(&self, mut deck: PyRefMut<'_, PyDeck>) -> PyResult<()> {
        self.picklist.simulate(&mut deck.deck)?;
        Ok(())
    }

    /// Simulate on copies and return the resulting well tables by plate name.
    fn simulate_on_copies(&self, deck: PyRef<'_, PyDeck>) -> PyResult<HashMap<String, PyDataFrame>> {
        let copies = self.picklist.simulate_on_copies(&deck.deck)?;
        let mut frames = HashMap::with_capacity(copies.len());
        for plate in copies.values() {
            let name = plate.name().unwrap_or("None").to_string();
            frames.insert(name, PyDataFrame(plate.to_dataframe(Direction::Row)?));
        }
        Ok(frames)
    }

    fn sorted_by(&self, key: &str) -> PyResult<PyPickList> {
        let key: SortKey = key.parse()?;
        Ok(self.picklist.sorted_by(key).into())
    }

    fn enforce_maximum_dispense_volume(&self, max_dispense_volume: f64) -> PyResult<PyPickList> {
        Ok(self
            .picklist
            .enforce_maximum_dispense_volume(max_dispense_volume)?
            .into())
    }

    fn total_transferred_volume(&self) -> f64 {
        self.picklist.total_transferred_volume()
    }

    fn to_plain_string(&self) -> String {
        self.picklist.to_plain_string()
    }

    fn to_plain_textfile(&self, path: &str) -> PyResult<()> {
        self.picklist.to_plain_textfile(path)?;
        Ok(())
    }

    fn __add__(&self, other: PyRef<'_, PyPickList>) -> PyPickList {
        (&self.picklist + &other.picklist).into()
    }

    fn __len__(&self) -> usize {
        self.picklist.len()
    }
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Well
    let well = PyModule::new(m.py(), "well")?;
    well.add("NAME", schema::well::NAME)?;
    well.add("ROW", schema::well::ROW)?;
    well.add("COLUMN", schema::well::COLUMN)?;
    well.add("VOLUME", schema::well::VOLUME)?;
    well.add("CAPACITY", schema::well::CAPACITY)?;
    well.add("COMPONENTS", schema::well::COMPONENTS)?;
    well.add("QUANTITY_PREFIX", schema::well::QUANTITY_PREFIX)?;
    well.add("DATA_PREFIX", schema::well::DATA_PREFIX)?;
    m.add_submodule(&well)?;

    // Direction
    let direction = PyModule::new(m.py(), "direction")?;
    direction.add("IDENTITY", schema::direction::IDENTITY)?;
    direction.add("FORWARD", schema::direction::FORWARD)?;
    direction.add("BACKWARD", schema::direction::BACKWARD)?;
    m.add_submodule(&direction)?;

    // Traceability
    let traceability = PyModule::new(m.py(), "traceability")?;
    traceability.add("ORIGIN_WELL", schema::traceability::ORIGIN_WELL)?;
    traceability.add("TRACED_WELL", schema::traceability::TRACED_WELL)?;
    traceability.add("TRACE_DIRECTION", schema::traceability::TRACE_DIRECTION)?;
    traceability.add(
        "TRANSFERRED_VOLUME",
        schema::traceability::TRANSFERRED_VOLUME,
    )?;
    m.add_submodule(&traceability)?;

    Ok(())
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDeck>()?;
    m.add_class::<PyPickList>()?;
    add_schema_exports(m)?;
    Ok(())
}
