use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::content::Quantities;
use crate::deck::Deck;
use crate::error::{LabError, Result};
use crate::plate::PlateId;
use crate::units::format_scientific;
use crate::well::{Metadata, Source, WellAddress};

/// A transfer of `volume` liters from a source well to a destination well.
///
/// `data` holds anything useful later on, e.g. dispensing parameters when
/// exporting a pick-list.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    source_well: WellAddress,
    destination_well: WellAddress,
    volume: f64,
    data: Metadata,
}

impl Transfer {
    pub fn new(source_well: WellAddress, destination_well: WellAddress, volume: f64) -> Self {
        Self {
            source_well,
            destination_well,
            volume,
            data: Metadata::new(),
        }
    }

    pub fn with_data(mut self, data: Metadata) -> Self {
        self.data = data;
        self
    }

    pub fn source_well(&self) -> &WellAddress {
        &self.source_well
    }

    pub fn destination_well(&self) -> &WellAddress {
        &self.destination_well
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn data(&self) -> &Metadata {
        &self.data
    }

    /// Same wells and data, different volume.
    pub fn with_new_volume(&self, volume: f64) -> Self {
        Self {
            volume,
            ..self.clone()
        }
    }

    /// Same transfer between the corresponding wells of other plates.
    pub(crate) fn rewired(&self, plates: &HashMap<PlateId, PlateId>) -> Self {
        let remap = |address: &WellAddress| match plates.get(&address.plate_id()) {
            Some(&id) => address.on_plate(id),
            None => address.clone(),
        };
        Self {
            source_well: remap(&self.source_well),
            destination_well: remap(&self.destination_well),
            ..self.clone()
        }
    }

    /// "Transfer 2.50E-05L from Source A1 into Destination B2"
    pub fn to_plain_string(&self) -> String {
        format!(
            "Transfer {}L from {} {} into {} {}",
            format_scientific(self.volume),
            self.source_well.plate_label(),
            self.source_well.well_name(),
            self.destination_well.plate_label(),
            self.destination_well.well_name(),
        )
    }

    /// "Transfer 2.50E-05L (Source-A1) -> (Destination-B2)"
    pub fn to_short_string(&self) -> String {
        format!(
            "Transfer {}L {} -> {}",
            format_scientific(self.volume),
            self.source_well,
            self.destination_well,
        )
    }

    /// Move the liquid on `deck`.
    ///
    /// The moved fraction `volume / source volume` of every component goes
    /// along, so the source keeps its concentrations. All checks run before
    /// anything is modified; on error both wells are left as they were.
    pub fn apply(&self, deck: &mut Deck) -> Result<()> {
        if self.volume.is_nan() || self.volume < 0.0 {
            return Err(LabError::InvalidVolume(format!(
                "{}: volume must be a non-negative number",
                self.to_short_string()
            )));
        }

        let (source_volume, source_quantities) = {
            let source = deck.well(&self.source_well)?;
            if source.is_empty() {
                return Err(LabError::EmptySource(source.to_string()));
            }
            if self.volume > source.volume() {
                return Err(LabError::InsufficientVolume {
                    well: source.to_string(),
                    requested: self.volume,
                    available: source.volume(),
                });
            }
            (source.volume(), source.content().quantities.clone())
        };

        {
            let destination = deck.well(&self.destination_well)?;
            if let Some(capacity) = destination.capacity() {
                let final_volume = destination.volume() + self.volume;
                if final_volume > capacity {
                    return Err(LabError::CapacityExceeded {
                        well: destination.to_string(),
                        volume: self.volume,
                        final_volume,
                        capacity,
                    });
                }
            }
        }

        let factor = self.volume / source_volume;
        let moved: Quantities = source_quantities
            .into_iter()
            .map(|(component, quantity)| (component, quantity * factor))
            .collect();

        deck.well_mut(&self.destination_well)?
            .add_content(moved.clone(), self.volume, "L")?;
        deck.well_mut(&self.source_well)?
            .subtract_content(&moved, self.volume)?;
        deck.well_mut(&self.destination_well)?
            .add_source(Source::Transfer(self.clone()));

        debug!(
            source = %self.source_well,
            destination = %self.destination_well,
            volume = self.volume,
            factor,
            "applied transfer"
        );
        Ok(())
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labware::Labware;
    use crate::plate::Plate;

    struct Setup {
        deck: Deck,
        source: WellAddress,
        destination: WellAddress,
    }

    fn setup(source_name: &str, destination_name: &str) -> Setup {
        let mut deck = Deck::new();
        let source = Plate::from_labware(Labware::Plate96, Some(source_name));
        let destination = Plate::from_labware(Labware::Plate96, Some(destination_name));
        let source_well = source.address("A1").unwrap();
        let destination_well = destination.address("B2").unwrap();
        deck.add_plate(source);
        deck.add_plate(destination);
        Setup {
            deck,
            source: source_well,
            destination: destination_well,
        }
    }

    #[test]
    fn renders_plain_and_short_strings() {
        let s = setup("Source", "Destination");
        let transfer = Transfer::new(s.source, s.destination, 25e-6);
        assert_eq!(
            transfer.to_plain_string(),
            "Transfer 2.50E-05L from Source A1 into Destination B2"
        );
        assert_eq!(
            transfer.to_short_string(),
            "Transfer 2.50E-05L (Source-A1) -> (Destination-B2)"
        );
        assert_eq!(transfer.to_string(), transfer.to_plain_string());
    }

    #[test]
    fn with_new_volume_keeps_wells_and_data() {
        let s = setup("Source", "Destination");
        let mut data = Metadata::new();
        data.insert("speed".into(), serde_json::json!(3));
        let transfer = Transfer::new(s.source, s.destination, 25e-6).with_data(data);
        let smaller = transfer.with_new_volume(5e-6);
        assert_eq!(smaller.volume(), 5e-6);
        assert_eq!(transfer.volume(), 25e-6);
        assert_eq!(smaller.source_well(), transfer.source_well());
        assert_eq!(smaller.destination_well(), transfer.destination_well());
        assert_eq!(smaller.data(), transfer.data());
    }

    #[test]
    fn empty_source_is_rejected() {
        let mut s = setup("Source", "Destination");
        let transfer = Transfer::new(s.source, s.destination, 25e-6);
        assert!(matches!(
            transfer.apply(&mut s.deck),
            Err(LabError::EmptySource(_))
        ));
    }

    #[test]
    fn capacity_and_volume_checks() {
        let mut s = setup("Source_2", "Destination_2");
        let transfer = Transfer::new(s.source.clone(), s.destination.clone(), 25e-6);

        s.deck
            .well_mut(&s.source)
            .unwrap()
            .add_content([("Compound_1", 1.0)], 5e-6, "L")
            .unwrap();
        assert!(matches!(
            transfer.apply(&mut s.deck),
            Err(LabError::InsufficientVolume { .. })
        ));

        s.deck
            .well_mut(&s.source)
            .unwrap()
            .add_content([("Compound_1", 1.0)], 25e-6, "L")
            .unwrap();
        s.deck
            .well_mut(&s.destination)
            .unwrap()
            .set_capacity(Some(3e-6));
        assert!(matches!(
            transfer.apply(&mut s.deck),
            Err(LabError::CapacityExceeded { .. })
        ));
        // Nothing moved on failure.
        assert!(s.deck.well(&s.destination).unwrap().is_empty());

        s.deck
            .well_mut(&s.destination)
            .unwrap()
            .set_capacity(Some(50e-6));
        transfer.apply(&mut s.deck).unwrap();
        assert_eq!(s.deck.well(&s.destination).unwrap().volume(), 25e-6);
    }

    #[test]
    fn partial_transfer_preserves_concentration() {
        let mut s = setup("S", "D");
        s.deck
            .well_mut(&s.source)
            .unwrap()
            .add_content([("dye", 8.0), ("salt", 2.0)], 40.0, "uL")
            .unwrap();
        let before = s.deck.well(&s.source).unwrap().content().concentration(Some("dye"), 0.0);

        Transfer::new(s.source.clone(), s.destination.clone(), 10e-6)
            .apply(&mut s.deck)
            .unwrap();

        let source = s.deck.well(&s.source).unwrap();
        let destination = s.deck.well(&s.destination).unwrap();
        assert!((source.content().quantities["dye"] - 6.0).abs() < 1e-9);
        assert!((destination.content().quantities["dye"] - 2.0).abs() < 1e-9);
        assert!((destination.content().quantities["salt"] - 0.5).abs() < 1e-9);
        assert!((source.volume() - 30e-6).abs() < 1e-15);
        let after = source.content().concentration(Some("dye"), 0.0);
        assert!((after - before).abs() / before < 1e-9);
        assert!((destination.content().concentration(Some("dye"), 0.0) - before).abs() / before < 1e-9);
    }

    #[test]
    fn full_transfer_empties_the_source() {
        let mut s = setup("S", "D");
        s.deck
            .well_mut(&s.source)
            .unwrap()
            .add_content([("dye", 3.0)], 3.0, "uL")
            .unwrap();
        let volume = s.deck.well(&s.source).unwrap().volume();
        Transfer::new(s.source.clone(), s.destination.clone(), volume)
            .apply(&mut s.deck)
            .unwrap();
        let source = s.deck.well(&s.source).unwrap();
        assert!(source.is_empty());
        assert!(source.content().quantities.is_empty());
    }

    #[test]
    fn destination_records_the_transfer_once() {
        let mut s = setup("S", "D");
        s.deck
            .well_mut(&s.source)
            .unwrap()
            .add_content([("dye", 1.0)], 10.0, "uL")
            .unwrap();
        let transfer = Transfer::new(s.source.clone(), s.destination.clone(), 1e-6);
        transfer.apply(&mut s.deck).unwrap();
        transfer.apply(&mut s.deck).unwrap();
        let destination = s.deck.well(&s.destination).unwrap();
        assert_eq!(destination.sources(), [Source::Transfer(transfer)]);
        assert!((destination.volume() - 2e-6).abs() < 1e-18);
    }

    #[test]
    fn negative_volume_is_rejected() {
        let mut s = setup("S", "D");
        let transfer = Transfer::new(s.source, s.destination, -1e-6);
        assert!(matches!(
            transfer.apply(&mut s.deck),
            Err(LabError::InvalidVolume(_))
        ));
    }
}
