use std::collections::HashMap;

use crate::error::{LabError, Result};
use crate::plate::{Plate, PlateId};
use crate::well::{SourcesTree, WellAddress, WellMut, WellRef};

/// The set of plates a simulation runs against.
///
/// Transfers address wells by plate id, so every plate they touch must be
/// on the deck.
#[derive(Debug, Clone, Default)]
pub struct Deck {
    plates: Vec<Plate>,
    /// Map from plate id → position in `plates`.
    by_id: HashMap<PlateId, usize>,
}

impl Deck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a plate on the deck, replacing any plate with the same id.
    pub fn add_plate(&mut self, plate: Plate) -> PlateId {
        let id = plate.id();
        match self.by_id.get(&id) {
            Some(&position) => self.plates[position] = plate,
            None => {
                self.by_id.insert(id, self.plates.len());
                self.plates.push(plate);
            }
        }
        id
    }

    pub fn remove_plate(&mut self, id: PlateId) -> Option<Plate> {
        let position = self.by_id.remove(&id)?;
        let plate = self.plates.remove(position);
        for p in self.by_id.values_mut() {
            if *p > position {
                *p -= 1;
            }
        }
        Some(plate)
    }

    pub fn contains(&self, id: PlateId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }

    /// Plates in the order they were added.
    pub fn plates(&self) -> impl Iterator<Item = &Plate> {
        self.plates.iter()
    }

    pub fn into_plates(self) -> Vec<Plate> {
        self.plates
    }

    pub fn plate(&self, id: PlateId) -> Result<&Plate> {
        self.by_id
            .get(&id)
            .map(|&p| &self.plates[p])
            .ok_or_else(|| LabError::UnknownPlate(id.to_string()))
    }

    pub fn plate_mut(&mut self, id: PlateId) -> Result<&mut Plate> {
        match self.by_id.get(&id) {
            Some(&p) => Ok(&mut self.plates[p]),
            None => Err(LabError::UnknownPlate(id.to_string())),
        }
    }

    /// The plate with the given name; fails unless exactly one matches.
    pub fn plate_named(&self, name: &str) -> Result<&Plate> {
        let mut matches = self.plates.iter().filter(|p| p.name() == Some(name));
        match (matches.next(), matches.next()) {
            (Some(plate), None) => Ok(plate),
            (None, _) => Err(LabError::UnknownPlate(name.to_string())),
            (Some(_), Some(_)) => Err(LabError::UnknownPlate(format!(
                "{name} (several plates have this name)"
            ))),
        }
    }

    pub fn well(&self, address: &WellAddress) -> Result<WellRef<'_>> {
        self.plate(address.plate_id())?.get(address.well_name())
    }

    pub fn well_mut(&mut self, address: &WellAddress) -> Result<WellMut<'_>> {
        self.plate_mut(address.plate_id())?
            .get_mut(address.well_name())
    }

    /// All transitive contributors of a well, depth first, ending with the
    /// well itself.
    pub fn iterate_sources_tree(&self, address: &WellAddress) -> Result<SourcesTree<'_>> {
        let root = self.well(address)?;
        Ok(SourcesTree::new(self, root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labware::Labware;
    use crate::well::{Source, SourceNode};

    #[test]
    fn plates_are_found_by_id_and_name() {
        let mut deck = Deck::new();
        let source = deck.add_plate(Plate::from_labware(Labware::Plate96, Some("Source")));
        let dest = deck.add_plate(Plate::from_labware(Labware::Plate384, Some("Destination")));
        assert_eq!(deck.len(), 2);
        assert_eq!(deck.plate(source).unwrap().name(), Some("Source"));
        assert_eq!(deck.plate_named("Destination").unwrap().id(), dest);
        assert!(deck.plate_named("Missing").is_err());

        let removed = deck.remove_plate(source).unwrap();
        assert_eq!(removed.id(), source);
        assert!(!deck.contains(source));
        assert_eq!(deck.plate(dest).unwrap().num_wells(), 384);
        assert!(matches!(deck.plate(source), Err(LabError::UnknownPlate(_))));
    }

    #[test]
    fn wells_resolve_through_addresses() {
        let mut deck = Deck::new();
        let plate = Plate::from_labware(Labware::Plate96, Some("P"));
        let address = plate.address("C3").unwrap();
        deck.add_plate(plate);
        deck.well_mut(&address)
            .unwrap()
            .add_content([("x", 1.0)], 2.0, "uL")
            .unwrap();
        assert!((deck.well(&address).unwrap().volume() - 2e-6).abs() < 1e-18);
    }

    #[test]
    fn sources_tree_is_depth_first_and_ends_with_the_well() {
        let mut deck = Deck::new();
        let plate = Plate::from_labware(Labware::Plate96, Some("P"));
        let [a1, a2, a3, b1] = ["A1", "A2", "A3", "B1"].map(|n| plate.address(n).unwrap());
        let id = deck.add_plate(plate);
        let other = Plate::from_labware(Labware::Plate96, Some("Gone"));
        let dangling = other.address("A1").unwrap();

        deck.well_mut(&a1)
            .unwrap()
            .add_source(Source::External("stock".into()));
        deck.well_mut(&a2).unwrap().add_source(Source::Well(a1.clone()));
        let mut b1_well = deck.well_mut(&b1).unwrap();
        b1_well.add_source(Source::Well(a2.clone()));
        b1_well.add_source(Source::Well(dangling.clone()));
        b1_well.add_source(Source::Well(a3.clone()));
        b1_well.add_source(Source::Well(a3.clone()));

        let walk: Vec<String> = deck
            .iterate_sources_tree(&b1)
            .unwrap()
            .map(|node| match node {
                SourceNode::Well(w) => w.name().to_string(),
                SourceNode::Leaf(Source::External(label)) => label.clone(),
                SourceNode::Leaf(Source::Well(address)) => format!("?{}", address.well_name()),
                SourceNode::Leaf(Source::Transfer(_)) => "transfer".to_string(),
            })
            .collect();
        assert_eq!(walk, ["stock", "A1", "A2", "?A1", "A3", "B1"]);

        let plate = deck.plate(id).unwrap();
        let fresh = plate.get("H12").unwrap().address();
        let only_self: Vec<_> = deck.iterate_sources_tree(&fresh).unwrap().collect();
        assert_eq!(only_self.len(), 1);
    }
}
