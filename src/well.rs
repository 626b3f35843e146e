use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::content::{Quantities, WellContent};
use crate::coordinates::{coordinates_to_wellname, Direction};
use crate::deck::Deck;
use crate::error::{LabError, Result};
use crate::plate::{Plate, PlateId};
use crate::schema::well;
use crate::transfer::Transfer;
use crate::units::volume_factor;

/// Free-form, caller-defined metadata attached to plates, wells, transfers
/// and pick-lists.
pub type Metadata = serde_json::Map<String, Value>;

/// Relative tolerance under which a quantity or volume counts as fully
/// depleted by a subtraction.
pub const DEPLETION_TOLERANCE: f64 = 1e-9;

fn is_depleted(current: f64, subtracted: f64) -> bool {
    current == subtracted
        || (current - subtracted).abs() <= DEPLETION_TOLERANCE * current.abs().max(subtracted.abs())
}

// ── Addresses ───────────────────────────────────────────────────────────────

/// Location of a well: owning plate id, plate name and well name.
///
/// Equality and hashing only consider the plate id and well name.
#[derive(Debug, Clone)]
pub struct WellAddress {
    plate: PlateId,
    plate_name: Option<String>,
    well: String,
    row: usize,
    column: usize,
}

impl WellAddress {
    pub(crate) fn new(plate: &Plate, row: usize, column: usize) -> Self {
        Self {
            plate: plate.id(),
            plate_name: plate.name().map(str::to_string),
            well: coordinates_to_wellname((row, column)),
            row,
            column,
        }
    }

    pub fn plate_id(&self) -> PlateId {
        self.plate
    }

    pub fn plate_name(&self) -> Option<&str> {
        self.plate_name.as_deref()
    }

    /// Plate name as printed in reports ("None" for unnamed plates).
    pub fn plate_label(&self) -> &str {
        self.plate_name.as_deref().unwrap_or("None")
    }

    pub fn well_name(&self) -> &str {
        &self.well
    }

    pub fn coordinates(&self) -> (usize, usize) {
        (self.row, self.column)
    }

    /// Report order: plate label, then position. Unlike `Ord`, plates with
    /// the same label compare equal.
    pub(crate) fn report_key(&self) -> (&str, usize, usize) {
        (self.plate_label(), self.row, self.column)
    }

    /// Same well position on another plate.
    pub(crate) fn on_plate(&self, plate: PlateId) -> Self {
        Self {
            plate,
            ..self.clone()
        }
    }
}

impl PartialEq for WellAddress {
    fn eq(&self, other: &Self) -> bool {
        self.plate == other.plate && self.well == other.well
    }
}

impl Eq for WellAddress {}

impl Hash for WellAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.plate.hash(state);
        self.well.hash(state);
    }
}

impl Ord for WellAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.plate_label()
            .cmp(other.plate_label())
            .then_with(|| self.plate.cmp(&other.plate))
            .then_with(|| (self.row, self.column).cmp(&(other.row, other.column)))
    }
}

impl PartialOrd for WellAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for WellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}-{})", self.plate_label(), self.well)
    }
}

// ── Provenance ──────────────────────────────────────────────────────────────

/// Something that contributed material to a well.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Another well; followed when walking the sources tree.
    Well(WellAddress),
    /// A transfer that deposited into the well.
    Transfer(Transfer),
    /// Anything outside the deck (stock bottle, vendor plate, ...).
    External(String),
}

// ── Well ────────────────────────────────────────────────────────────────────

/// A single well. Its content lives in the owning plate's content arena.
#[derive(Debug, Clone)]
pub struct Well {
    pub(crate) row: usize,
    pub(crate) column: usize,
    pub(crate) name: String,
    pub(crate) data: Metadata,
    pub(crate) capacity: Option<f64>,
    pub(crate) dead_volume: Option<f64>,
    pub(crate) content_slot: usize,
    pub(crate) sources: Vec<Source>,
}

/// Shared view of a well and its plate.
#[derive(Debug, Clone, Copy)]
pub struct WellRef<'a> {
    plate: &'a Plate,
    well: &'a Well,
}

impl<'a> WellRef<'a> {
    pub(crate) fn new(plate: &'a Plate, well: &'a Well) -> Self {
        Self { plate, well }
    }

    pub fn plate(&self) -> &'a Plate {
        self.plate
    }

    pub fn name(&self) -> &'a str {
        &self.well.name
    }

    pub fn row(&self) -> usize {
        self.well.row
    }

    pub fn column(&self) -> usize {
        self.well.column
    }

    pub fn coordinates(&self) -> (usize, usize) {
        (self.well.row, self.well.column)
    }

    pub fn data(&self) -> &'a Metadata {
        &self.well.data
    }

    pub fn capacity(&self) -> Option<f64> {
        self.well.capacity
    }

    pub fn dead_volume(&self) -> Option<f64> {
        self.well.dead_volume
    }

    pub fn content(&self) -> &'a WellContent {
        self.plate.content_at(self.well.content_slot)
    }

    pub fn volume(&self) -> f64 {
        self.content().volume
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0.0
    }

    pub fn sources(&self) -> &'a [Source] {
        &self.well.sources
    }

    pub fn address(&self) -> WellAddress {
        WellAddress::new(self.plate, self.well.row, self.well.column)
    }

    pub fn index_in_plate(&self, direction: Direction) -> usize {
        self.plate.linear_index(self.coordinates(), direction)
    }

    /// Whether this well comes strictly after `other` in the given order.
    pub fn is_after(&self, other: &WellRef<'_>, direction: Direction) -> bool {
        self.index_in_plate(direction) > other.index_in_plate(direction)
    }

    pub fn pretty_summary(&self) -> String {
        let content: String = self
            .content()
            .quantities
            .iter()
            .map(|(k, v)| format!("\n    {k}: {v}"))
            .collect();
        let data: String = self
            .well
            .data
            .iter()
            .map(|(k, v)| format!("\n    {k}: {v}"))
            .collect();
        format!(
            "{self}\n  Volume: {}\n  Content: {content}\n  Metadata: {data}",
            self.volume()
        )
    }

    /// Name, position and content, merged with the well's data fields.
    pub fn to_dict(&self, nan_replacement: &Value) -> Value {
        let mut map = Metadata::new();
        map.insert(well::NAME.into(), Value::from(self.name()));
        map.insert(
            well::CONTENT.into(),
            self.content().to_dict(nan_replacement),
        );
        map.insert(well::ROW.into(), Value::from(self.row()));
        map.insert(well::COLUMN.into(), Value::from(self.column()));
        for (key, value) in &self.well.data {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

impl fmt::Display for WellRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}-{})",
            self.plate.name().unwrap_or("None"),
            self.well.name
        )
    }
}

/// Exclusive view of a well, used for content mutation.
#[derive(Debug)]
pub struct WellMut<'a> {
    plate: &'a mut Plate,
    index: usize,
}

impl<'a> WellMut<'a> {
    pub(crate) fn new(plate: &'a mut Plate, index: usize) -> Self {
        Self { plate, index }
    }

    pub fn view(&self) -> WellRef<'_> {
        WellRef::new(&*self.plate, &self.plate.wells_slice()[self.index])
    }

    pub fn volume(&self) -> f64 {
        self.view().volume()
    }

    pub fn is_empty(&self) -> bool {
        self.view().is_empty()
    }

    pub fn content(&self) -> &WellContent {
        self.view().content()
    }

    fn well(&self) -> &Well {
        &self.plate.wells_slice()[self.index]
    }

    fn well_mut(&mut self) -> &mut Well {
        &mut self.plate.wells_slice_mut()[self.index]
    }

    fn content_mut(&mut self) -> &mut WellContent {
        let slot = self.well().content_slot;
        self.plate.content_at_mut(slot)
    }

    pub fn set_capacity(&mut self, capacity: Option<f64>) {
        self.well_mut().capacity = capacity;
    }

    pub fn set_dead_volume(&mut self, dead_volume: Option<f64>) {
        self.well_mut().dead_volume = dead_volume;
    }

    pub fn data_mut(&mut self) -> &mut Metadata {
        &mut self.well_mut().data
    }

    /// Record a contributor. Already-recorded sources are not duplicated.
    pub fn add_source(&mut self, source: Source) {
        let sources = &mut self.well_mut().sources;
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    /// Add `volume` (expressed in `unit_volume`) and component quantities.
    ///
    /// Fails without modifying the well if the volume would exceed the
    /// well's capacity.
    pub fn add_content<I, S>(&mut self, quantities: I, volume: f64, unit_volume: &str) -> Result<()>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let volume = volume * volume_factor(unit_volume)?;
        check_volume(volume)?;
        if volume > 0.0 {
            let final_volume = self.volume() + volume;
            if let Some(capacity) = self.well().capacity {
                if final_volume > capacity {
                    return Err(LabError::CapacityExceeded {
                        well: self.view().to_string(),
                        volume,
                        final_volume,
                        capacity,
                    });
                }
            }
            self.content_mut().volume = final_volume;
        }
        let content = self.content_mut();
        for (component, quantity) in quantities {
            *content.quantities.entry(component.into()).or_insert(0.0) += quantity;
        }
        Ok(())
    }

    /// Remove `volume` liters and component quantities.
    ///
    /// Components brought down to zero are removed rather than kept at 0.
    /// Fails without modifying the well if the volume exceeds what the well
    /// holds or a component is absent.
    pub fn subtract_content(&mut self, quantities: &Quantities, volume: f64) -> Result<()> {
        check_volume(volume)?;
        let current = self.volume();
        if volume > 0.0 && volume > current {
            return Err(LabError::InsufficientVolume {
                well: self.view().to_string(),
                requested: volume,
                available: current,
            });
        }
        if let Some(missing) = quantities
            .keys()
            .find(|c| !self.content().quantities.contains_key(c.as_str()))
        {
            return Err(LabError::UnknownComponent {
                well: self.view().to_string(),
                component: missing.clone(),
            });
        }

        let content = self.content_mut();
        if volume > 0.0 {
            content.volume = if is_depleted(current, volume) {
                0.0
            } else {
                current - volume
            };
        }
        for (component, quantity) in quantities {
            let depleted = match content.quantities.get_mut(component) {
                Some(held) if is_depleted(*held, *quantity) => true,
                Some(held) => {
                    *held -= quantity;
                    false
                }
                None => false,
            };
            if depleted {
                content.quantities.remove(component);
            }
        }
        Ok(())
    }

    /// Reset volume and quantities without any check.
    pub fn empty_completely(&mut self) {
        self.content_mut().make_empty();
    }
}

fn check_volume(volume: f64) -> Result<()> {
    if volume.is_nan() || volume < 0.0 {
        return Err(LabError::InvalidVolume(format!(
            "volume must be a non-negative number, got {volume}"
        )));
    }
    Ok(())
}

// ── Sources tree ────────────────────────────────────────────────────────────

/// Item of a sources-tree walk.
#[derive(Debug, Clone, Copy)]
pub enum SourceNode<'a> {
    /// A well of the tree; emitted after all of its own sources.
    Well(WellRef<'a>),
    /// A non-well source, or a well address not present on the deck.
    Leaf(&'a Source),
}

/// Lazy depth-first walk over the transitive sources of a well, ending with
/// the well itself. Provenance is assumed acyclic.
pub struct SourcesTree<'a> {
    deck: &'a Deck,
    stack: Vec<(WellRef<'a>, usize)>,
}

impl<'a> SourcesTree<'a> {
    pub(crate) fn new(deck: &'a Deck, root: WellRef<'a>) -> Self {
        Self {
            deck,
            stack: vec![(root, 0)],
        }
    }
}

impl<'a> Iterator for SourcesTree<'a> {
    type Item = SourceNode<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (well, next_source) = self.stack.last_mut()?;
            let well = *well;
            let Some(source) = well.sources().get(*next_source) else {
                self.stack.pop();
                return Some(SourceNode::Well(well));
            };
            *next_source += 1;
            match source {
                Source::Well(address) => match self.deck.well(address) {
                    Ok(parent) => self.stack.push((parent, 0)),
                    Err(_) => return Some(SourceNode::Leaf(source)),
                },
                _ => return Some(SourceNode::Leaf(source)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labware::Labware;
    use serde_json::json;

    fn plate() -> Plate {
        Plate::from_labware(Labware::Plate96, None)
    }

    #[test]
    fn fresh_well_is_empty() {
        let plate = plate();
        let well = plate.get_well_at_index(1, Direction::Row).unwrap();
        assert_eq!(well.volume(), 0.0);
        assert!(well.is_empty());
        assert_eq!(well.to_string(), "(None-A1)");
    }

    #[test]
    fn add_content_converts_units() {
        let mut plate = plate();
        {
            let mut well = plate.get_mut("A1").unwrap();
            well.add_content([("Compound_1", 5.0)], 20e-6, "L").unwrap();
            assert_eq!(well.content().quantities.get("Compound_1"), Some(&5.0));
        }
        let mut well2 = plate.get_mut("A2").unwrap();
        well2.add_content([("Compound_1", 5.0)], 20.0, "uL").unwrap();
        let c = well2.content().concentration(None, 0.0);
        assert!((c - 250_000.0).abs() < 1e-6);
        assert!(matches!(
            well2.add_content([("Compound_1", 1.0)], 1.0, "cups"),
            Err(LabError::UnrecognizedUnit(_))
        ));
    }

    #[test]
    fn add_content_respects_capacity() {
        let mut plate = Plate::from_labware(Labware::Plate4ti0960, Some("P"));
        let mut well = plate.get_mut("B3").unwrap();
        well.add_content([("dna", 1.0)], 100.0, "uL").unwrap();
        let err = well.add_content([("dna", 1.0)], 60.0, "uL").unwrap_err();
        assert!(matches!(err, LabError::CapacityExceeded { .. }));
        // Failed additions leave the well untouched.
        assert!((well.volume() - 100e-6).abs() < 1e-15);
        assert_eq!(well.content().quantities["dna"], 1.0);
    }

    #[test]
    fn subtract_more_than_present_fails() {
        let mut plate = plate();
        let mut well = plate.get_mut("A1").unwrap();
        let quantities = Quantities::from([("Compound_1".to_string(), 5.0)]);
        let err = well.subtract_content(&quantities, 30e-6).unwrap_err();
        assert!(matches!(err, LabError::InsufficientVolume { .. }));
    }

    #[test]
    fn subtract_then_add_round_trips() {
        let mut plate = plate();
        let mut well = plate.get_mut("A1").unwrap();
        well.add_content([("a", 4.0), ("b", 2.0)], 10.0, "uL").unwrap();
        let before = well.content().clone();

        let removed = Quantities::from([("a".to_string(), 1.0), ("b".to_string(), 2.0)]);
        well.subtract_content(&removed, 5e-6).unwrap();
        assert_eq!(well.content().quantities.get("a"), Some(&3.0));
        assert!(!well.content().quantities.contains_key("b"));

        well.add_content(removed, 5e-6, "L").unwrap();
        assert_eq!(well.content().quantities, before.quantities);
        assert!((well.volume() - before.volume).abs() < 1e-18);
    }

    #[test]
    fn subtracting_an_absent_component_fails() {
        let mut plate = plate();
        let mut well = plate.get_mut("A1").unwrap();
        well.add_content([("a", 1.0)], 1.0, "uL").unwrap();
        let err = well
            .subtract_content(&Quantities::from([("z".to_string(), 1.0)]), 0.0)
            .unwrap_err();
        assert!(matches!(err, LabError::UnknownComponent { .. }));
        assert_eq!(well.content().quantities["a"], 1.0);
    }

    #[test]
    fn empty_completely_resets() {
        let mut plate = plate();
        let mut well = plate.get_mut("C4").unwrap();
        well.add_content([("a", 1.0)], 1.0, "mL").unwrap();
        well.empty_completely();
        assert!(well.is_empty());
        assert!(well.content().quantities.is_empty());
    }

    #[test]
    fn summary_and_dict() {
        let plate = plate();
        let well = plate.get("A1").unwrap();
        assert_eq!(
            well.pretty_summary(),
            "(None-A1)\n  Volume: 0\n  Content: \n  Metadata: "
        );
        assert_eq!(
            well.to_dict(&Value::Null),
            json!({
                "name": "A1",
                "content": {"volume": 0.0, "quantities": {}},
                "row": 1,
                "column": 1,
            })
        );
    }

    #[test]
    fn positions() {
        let plate = plate();
        let a1 = plate.get_well_at_index(1, Direction::Row).unwrap();
        let a2 = plate.get_well_at_index(2, Direction::Row).unwrap();
        assert_eq!(a1.index_in_plate(Direction::Row), 1);
        assert!(!a1.is_after(&a2, Direction::Row));
        assert!(a2.is_after(&a1, Direction::Row));
        // A2 is index 9 column-wise, after B1.
        let b1 = plate.get("B1").unwrap();
        assert!(a2.is_after(&b1, Direction::Column));
        assert!(!a2.is_after(&b1, Direction::Row));
    }

    #[test]
    fn addresses_compare_by_plate_and_well() {
        let plate = Plate::from_labware(Labware::Plate96, Some("Source"));
        let a1 = plate.address("A1").unwrap();
        let b2 = plate.address("B2").unwrap();
        assert_eq!(a1, plate.get("A1").unwrap().address());
        assert!(a1 < b2);
        assert_eq!(b2.to_string(), "(Source-B2)");
        assert_eq!(b2.coordinates(), (2, 2));
        let other = Plate::from_labware(Labware::Plate96, Some("Source"));
        assert_ne!(a1, other.address("A1").unwrap());
    }
}
