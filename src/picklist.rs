use std::collections::HashMap;
use std::ops::Add;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::deck::Deck;
use crate::error::{LabError, Result};
use crate::plate::{Plate, PlateId};
use crate::schema::picklist;
use crate::transfer::Transfer;
use crate::well::{Metadata, WellAddress, DEPLETION_TOLERANCE};

/// Named orderings for [`PickList::sorted_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    SourceWell,
    DestinationWell,
    Volume,
}

impl FromStr for SortKey {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source_well" => Ok(SortKey::SourceWell),
            "destination_well" => Ok(SortKey::DestinationWell),
            "volume" => Ok(SortKey::Volume),
            other => Err(LabError::UnknownSortKey(other.to_string())),
        }
    }
}

/// Well-to-well transfers forming one dispensing run, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PickList {
    transfers: Vec<Transfer>,
    data: Metadata,
}

impl PickList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transfers(transfers: impl IntoIterator<Item = Transfer>) -> Self {
        Self {
            transfers: transfers.into_iter().collect(),
            data: Metadata::new(),
        }
    }

    pub fn with_data(mut self, data: Metadata) -> Self {
        self.data = data;
        self
    }

    fn derived(&self, transfers: Vec<Transfer>) -> Self {
        let mut data = Metadata::new();
        data.insert(
            picklist::PARENT_TRANSFERS.into(),
            Value::from(self.transfers.len()),
        );
        Self { transfers, data }
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn data(&self) -> &Metadata {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Metadata {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transfer> {
        self.transfers.iter()
    }

    pub fn add_transfer(&mut self, transfer: Transfer) {
        self.transfers.push(transfer);
    }

    /// Build a transfer from its parts and append it.
    pub fn add_new_transfer(
        &mut self,
        source_well: WellAddress,
        destination_well: WellAddress,
        volume: f64,
        data: Option<Metadata>,
    ) {
        let transfer = Transfer::new(source_well, destination_well, volume);
        self.add_transfer(match data {
            Some(data) => transfer.with_data(data),
            None => transfer,
        });
    }

    /// One line per transfer, see [`Transfer::to_plain_string`].
    pub fn to_plain_string(&self) -> String {
        self.transfers
            .iter()
            .map(Transfer::to_plain_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_plain_textfile(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_plain_string())?;
        Ok(())
    }

    // ── Simulation ──────────────────────────────────────────────────────────

    /// Apply every transfer, in order, to the plates on `deck`.
    ///
    /// Stops at the first failing transfer; transfers applied before it stay
    /// applied.
    #[instrument(skip_all, fields(transfers = self.transfers.len()))]
    pub fn simulate(&self, deck: &mut Deck) -> Result<()> {
        for (i, transfer) in self.transfers.iter().enumerate() {
            if let Err(err) = transfer.apply(deck) {
                debug!(index = i, transfer = %transfer, error = %err, "transfer failed");
                return Err(err);
            }
        }
        info!("simulated pick-list");
        Ok(())
    }

    /// Simulate on copies of the plates involved, leaving `deck` untouched.
    ///
    /// Each distinct plate referenced by a transfer is copied once. Returns
    /// the simulated copies keyed by the id of the plate they were copied
    /// from.
    #[instrument(skip_all, fields(transfers = self.transfers.len()))]
    pub fn simulate_on_copies(&self, deck: &Deck) -> Result<HashMap<PlateId, Plate>> {
        let mut scratch = Deck::new();
        let mut copies: HashMap<PlateId, PlateId> = HashMap::new();
        for transfer in &self.transfers {
            for address in [transfer.source_well(), transfer.destination_well()] {
                let original = address.plate_id();
                if !copies.contains_key(&original) {
                    let copy = deck.plate(original)?.duplicate();
                    copies.insert(original, scratch.add_plate(copy));
                }
            }
        }
        debug!(plates = copies.len(), "copied plates for simulation");

        let rewired: PickList = self.transfers.iter().map(|t| t.rewired(&copies)).collect();
        rewired.simulate(&mut scratch)?;

        let originals: HashMap<PlateId, PlateId> =
            copies.into_iter().map(|(original, copy)| (copy, original)).collect();
        Ok(scratch
            .into_plates()
            .into_iter()
            .filter_map(|plate| originals.get(&plate.id()).map(|&original| (original, plate)))
            .collect())
    }

    // ── Derived pick-lists ──────────────────────────────────────────────────

    /// Transfers for which `transfer_filter` returns true.
    pub fn restricted_to<F>(&self, transfer_filter: F) -> PickList
    where
        F: Fn(&Transfer) -> bool,
    {
        let transfers = self
            .transfers
            .iter()
            .filter(|t| transfer_filter(t))
            .cloned()
            .collect();
        self.derived(transfers)
    }

    /// Transfers from `source_well` and into `destination_well`; `None`
    /// matches any well.
    pub fn restricted_to_wells(
        &self,
        source_well: Option<&WellAddress>,
        destination_well: Option<&WellAddress>,
    ) -> PickList {
        self.restricted_to(|t| {
            source_well.map_or(true, |w| w == t.source_well())
                && destination_well.map_or(true, |w| w == t.destination_well())
        })
    }

    /// Stable sort by a named attribute.
    ///
    /// Wells are ordered by plate name, then position; transfers between
    /// equally named plates keep their relative order.
    pub fn sorted_by(&self, key: SortKey) -> PickList {
        let mut transfers = self.transfers.clone();
        transfers.sort_by(|a, b| match key {
            SortKey::SourceWell => a.source_well().report_key().cmp(&b.source_well().report_key()),
            SortKey::DestinationWell => a
                .destination_well()
                .report_key()
                .cmp(&b.destination_well().report_key()),
            SortKey::Volume => a.volume().total_cmp(&b.volume()),
        });
        self.derived(transfers)
    }

    /// Stable sort by a caller-supplied key.
    pub fn sorted_by_key<K, F>(&self, mut key: F) -> PickList
    where
        K: Ord,
        F: FnMut(&Transfer) -> K,
    {
        let mut transfers = self.transfers.clone();
        transfers.sort_by_key(|t| key(t));
        self.derived(transfers)
    }

    pub fn total_transferred_volume(&self) -> f64 {
        self.transfers.iter().map(Transfer::volume).sum()
    }

    /// Break every transfer above `max_dispense_volume` into full-size
    /// dispenses plus one remainder. Chunks of one transfer stay together,
    /// in the original transfer order.
    pub fn enforce_maximum_dispense_volume(&self, max_dispense_volume: f64) -> Result<PickList> {
        if !(max_dispense_volume.is_finite() && max_dispense_volume > 0.0) {
            return Err(LabError::InvalidVolume(format!(
                "maximum dispense volume must be positive, got {max_dispense_volume}"
            )));
        }
        let mut transfers = Vec::with_capacity(self.transfers.len());
        for transfer in &self.transfers {
            let volume = transfer.volume();
            let ratio = volume / max_dispense_volume;
            // Exact multiples must not leave a rounding-residue dispense.
            let near_multiple =
                (ratio - ratio.round()).abs() <= DEPLETION_TOLERANCE * ratio.max(1.0);
            let (full, rest) = if near_multiple {
                (ratio.round() as usize, 0.0)
            } else {
                let full = ratio.trunc() as usize;
                (full, volume - full as f64 * max_dispense_volume)
            };
            transfers.extend((0..full).map(|_| transfer.with_new_volume(max_dispense_volume)));
            if rest > DEPLETION_TOLERANCE * volume {
                transfers.push(transfer.with_new_volume(rest));
            }
        }
        Ok(PickList::from_transfers(transfers))
    }

    /// Concatenation of the pick-lists' transfers, in the given order.
    pub fn merge_picklists<'a, I>(picklists: I) -> PickList
    where
        I: IntoIterator<Item = &'a PickList>,
    {
        picklists
            .into_iter()
            .flat_map(|p| p.transfers.iter().cloned())
            .collect()
    }
}

impl Add for PickList {
    type Output = PickList;

    fn add(mut self, other: PickList) -> PickList {
        self.transfers.extend(other.transfers);
        PickList::from_transfers(self.transfers)
    }
}

impl Add<&PickList> for &PickList {
    type Output = PickList;

    fn add(self, other: &PickList) -> PickList {
        PickList::merge_picklists([self, other])
    }
}

impl FromIterator<Transfer> for PickList {
    fn from_iter<I: IntoIterator<Item = Transfer>>(iter: I) -> Self {
        PickList::from_transfers(iter)
    }
}

impl Extend<Transfer> for PickList {
    fn extend<I: IntoIterator<Item = Transfer>>(&mut self, iter: I) {
        self.transfers.extend(iter);
    }
}

impl<'a> IntoIterator for &'a PickList {
    type Item = &'a Transfer;
    type IntoIter = std::slice::Iter<'a, Transfer>;

    fn into_iter(self) -> Self::IntoIter {
        self.transfers.iter()
    }
}
