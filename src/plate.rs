use std::collections::{BTreeSet, HashMap};
use std::fmt;

use polars::prelude::{Column, DataFrame};
use serde_json::Value;
use uuid::Uuid;

use crate::content::WellContent;
use crate::coordinates::{
    coordinates_to_wellname, index_to_coordinates, rowname_to_number, wellname_to_coordinates,
    Direction,
};
use crate::error::{LabError, Result};
use crate::labware::{Labware, PlateFormat};
use crate::schema::{plate, well};
use crate::well::{Metadata, Well, WellAddress, WellMut, WellRef};

/// Identity of a plate, independent of its (optional) name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlateId(Uuid);

impl PlateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Row selector accepting a row number (1, 2, ...) or row letters ("A", "AB").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKey {
    Number(usize),
    Name(String),
}

impl RowKey {
    fn number(&self) -> Result<usize> {
        match self {
            RowKey::Number(n) => Ok(*n),
            RowKey::Name(name) => rowname_to_number(name),
        }
    }
}

impl From<usize> for RowKey {
    fn from(n: usize) -> Self {
        RowKey::Number(n)
    }
}

impl From<&str> for RowKey {
    fn from(name: &str) -> Self {
        RowKey::Name(name.to_string())
    }
}

/// Options for [`Plate::wells_grouped_by`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupingOptions {
    /// Sort groups by key instead of first occurrence.
    pub sort_keys: bool,
    /// Drop the group of wells whose key is `None`.
    pub ignore_none: bool,
    /// Traversal order defining first occurrence and order within groups.
    pub direction: Direction,
}

/// A fixed grid of wells.
///
/// Wells are stored row by row. Their contents live in `contents`; each well
/// points at a slot, and plates with shared content point every well at
/// slot 0.
#[derive(Debug, Clone)]
pub struct Plate {
    id: PlateId,
    name: Option<String>,
    format: PlateFormat,
    data: Metadata,
    wells: Vec<Well>,
    contents: Vec<WellContent>,
    by_name: HashMap<String, usize>,
}

impl Plate {
    /// New plate with every well pre-allocated and empty.
    pub fn new(format: PlateFormat, name: Option<&str>) -> Result<Self> {
        format.validate()?;
        Ok(Self::build(format, name))
    }

    pub fn from_labware(labware: Labware, name: Option<&str>) -> Self {
        Self::build(labware.format(), name)
    }

    fn build(format: PlateFormat, name: Option<&str>) -> Self {
        let num_wells = format.num_wells();
        let mut wells = Vec::with_capacity(num_wells);
        let mut by_name = HashMap::with_capacity(num_wells);
        for row in 1..=format.num_rows {
            for column in 1..=format.num_columns {
                let name = coordinates_to_wellname((row, column));
                let position = wells.len();
                by_name.insert(name.clone(), position);
                wells.push(Well {
                    row,
                    column,
                    name,
                    data: Metadata::new(),
                    capacity: format.well_capacity,
                    dead_volume: format.dead_volume,
                    content_slot: if format.shared_content { 0 } else { position },
                    sources: Vec::new(),
                });
            }
        }
        let num_contents = if format.shared_content { 1 } else { num_wells };
        Self {
            id: PlateId::new(),
            name: name.map(str::to_string),
            format,
            data: Metadata::new(),
            wells,
            contents: vec![WellContent::default(); num_contents],
            by_name,
        }
    }

    pub fn with_data(mut self, data: Metadata) -> Self {
        self.data = data;
        self
    }

    /// Attach data to wells by name, e.g. `{"A1": {...}, "B2": {...}}`.
    pub fn with_wells_data<I, S>(mut self, wells_data: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Metadata)>,
        S: AsRef<str>,
    {
        for (name, data) in wells_data {
            let position = self.position(name.as_ref())?;
            self.wells[position].data = data;
        }
        Ok(self)
    }

    /// Copy of this plate, contents and sources included, under a fresh id.
    pub fn duplicate(&self) -> Self {
        Self {
            id: PlateId::new(),
            ..self.clone()
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn id(&self) -> PlateId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> &str {
        &self.format.kind
    }

    pub fn format(&self) -> &PlateFormat {
        &self.format
    }

    pub fn num_rows(&self) -> usize {
        self.format.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.format.num_columns
    }

    pub fn num_wells(&self) -> usize {
        self.wells.len()
    }

    pub fn data(&self) -> &Metadata {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Metadata {
        &mut self.data
    }

    pub(crate) fn wells_slice(&self) -> &[Well] {
        &self.wells
    }

    pub(crate) fn wells_slice_mut(&mut self) -> &mut [Well] {
        &mut self.wells
    }

    pub(crate) fn content_at(&self, slot: usize) -> &WellContent {
        &self.contents[slot]
    }

    pub(crate) fn content_at_mut(&mut self, slot: usize) -> &mut WellContent {
        &mut self.contents[slot]
    }

    fn position(&self, wellname: &str) -> Result<usize> {
        if let Some(&position) = self.by_name.get(wellname) {
            return Ok(position);
        }
        // Accept "a1" or "A01" for "A1".
        let (row, column) = wellname_to_coordinates(wellname)?;
        self.by_name
            .get(&coordinates_to_wellname((row, column)))
            .copied()
            .ok_or_else(|| LabError::UnknownWell {
                plate: self.to_string(),
                well: wellname.to_string(),
            })
    }

    fn position_of(&self, (row, column): (usize, usize)) -> usize {
        (row - 1) * self.num_columns() + (column - 1)
    }

    /// 1-based index of an on-plate position in the given order.
    pub(crate) fn linear_index(&self, (row, column): (usize, usize), direction: Direction) -> usize {
        match direction {
            Direction::Row => column + self.num_columns() * (row - 1),
            Direction::Column => row + self.num_rows() * (column - 1),
        }
    }

    fn well_ref(&self, position: usize) -> WellRef<'_> {
        WellRef::new(self, &self.wells[position])
    }

    pub fn get(&self, wellname: &str) -> Result<WellRef<'_>> {
        let position = self.position(wellname)?;
        Ok(self.well_ref(position))
    }

    pub fn get_mut(&mut self, wellname: &str) -> Result<WellMut<'_>> {
        let position = self.position(wellname)?;
        Ok(WellMut::new(self, position))
    }

    pub fn address(&self, wellname: &str) -> Result<WellAddress> {
        Ok(self.get(wellname)?.address())
    }

    // ── Indexing ────────────────────────────────────────────────────────────

    /// Index of a well in the given order: A1 -> 1, A2 -> 2 (row) or
    /// A1 -> 9 (column, on an 8 x 12 plate).
    pub fn wellname_to_index(&self, wellname: &str, direction: Direction) -> Result<usize> {
        let well = self.get(wellname)?;
        Ok(self.linear_index(well.coordinates(), direction))
    }

    pub fn index_to_wellname(&self, index: usize, direction: Direction) -> Result<String> {
        index_to_coordinates(index, self.num_rows(), self.num_columns(), direction)
            .map(coordinates_to_wellname)
    }

    pub fn get_well_at_index(&self, index: usize, direction: Direction) -> Result<WellRef<'_>> {
        let coords = index_to_coordinates(index, self.num_rows(), self.num_columns(), direction)?;
        Ok(self.well_ref(self.position_of(coords)))
    }

    /// Wells in the given order. Each call starts a new traversal.
    pub fn iter_wells(&self, direction: Direction) -> impl Iterator<Item = WellRef<'_>> + '_ {
        let (rows, columns) = (self.num_rows(), self.num_columns());
        (0..self.num_wells()).map(move |i| {
            let position = match direction {
                Direction::Row => i,
                Direction::Column => (i % rows) * columns + i / rows,
            };
            self.well_ref(position)
        })
    }

    pub fn wells_sorted_by<K, F>(&self, mut key: F) -> Vec<WellRef<'_>>
    where
        K: Ord,
        F: FnMut(&WellRef<'_>) -> K,
    {
        let mut wells: Vec<_> = self.iter_wells(Direction::Row).collect();
        wells.sort_by_cached_key(|w| key(w));
        wells
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// The single well satisfying `condition`; fails if none or several do.
    pub fn find_unique_well_by_condition<F>(&self, condition: F) -> Result<WellRef<'_>>
    where
        F: Fn(&WellRef<'_>) -> bool,
    {
        let matches: Vec<_> = self
            .iter_wells(Direction::Row)
            .filter(|w| condition(w))
            .collect();
        match matches.as_slice() {
            [single] => Ok(*single),
            [] => Err(LabError::NoUniqueWell(format!(
                "no well of {self} matches the condition"
            ))),
            several => Err(LabError::NoUniqueWell(format!(
                "query returned several wells: {}",
                several
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// The single well whose content holds `component`.
    pub fn find_unique_well_containing(&self, component: &str) -> Result<WellRef<'_>> {
        self.find_unique_well_by_condition(|w| w.content().quantities.contains_key(component))
    }

    /// Sorted union of the data fields used by any well.
    pub fn list_well_data_fields(&self) -> Vec<String> {
        self.wells
            .iter()
            .flat_map(|w| w.data.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn list_wells_in_column(&self, column: usize) -> Vec<WellRef<'_>> {
        self.iter_wells(Direction::Row)
            .filter(|w| w.column() == column)
            .collect()
    }

    pub fn list_wells_in_row(&self, row: impl Into<RowKey>) -> Result<Vec<WellRef<'_>>> {
        let row = row.into().number()?;
        Ok(self
            .iter_wells(Direction::Row)
            .filter(|w| w.row() == row)
            .collect())
    }

    /// Wells of a row, by position. Fails for rows outside the plate.
    pub fn return_row(&self, row: impl Into<RowKey>) -> Result<Vec<WellRef<'_>>> {
        let row = row.into().number()?;
        if row == 0 || row > self.num_rows() {
            return Err(LabError::InvalidWellName(format!(
                "row {row} is outside {self}"
            )));
        }
        Ok((1..=self.num_columns())
            .map(|column| self.well_ref(self.position_of((row, column))))
            .collect())
    }

    /// Wells of a column, by position. Fails for columns outside the plate.
    pub fn return_column(&self, column: usize) -> Result<Vec<WellRef<'_>>> {
        if column == 0 || column > self.num_columns() {
            return Err(LabError::InvalidWellName(format!(
                "column {column} is outside {self}"
            )));
        }
        Ok((1..=self.num_rows())
            .map(|row| self.well_ref(self.position_of((row, column))))
            .collect())
    }

    pub fn list_filtered_wells<F>(&self, well_filter: F) -> Vec<WellRef<'_>>
    where
        F: Fn(&WellRef<'_>) -> bool,
    {
        self.iter_wells(Direction::Row)
            .filter(|w| well_filter(w))
            .collect()
    }

    /// Group wells by `key`, in order of first occurrence along
    /// `options.direction` unless `options.sort_keys` is set.
    pub fn wells_grouped_by<K, F>(
        &self,
        key: F,
        options: GroupingOptions,
    ) -> Vec<(Option<K>, Vec<WellRef<'_>>)>
    where
        K: Ord,
        F: Fn(&WellRef<'_>) -> Option<K>,
    {
        let mut groups: Vec<(Option<K>, Vec<WellRef<'_>>)> = Vec::new();
        for well in self.iter_wells(options.direction) {
            let well_key = key(&well);
            match groups.iter_mut().find(|(k, _)| *k == well_key) {
                Some((_, wells)) => wells.push(well),
                None => groups.push((well_key, vec![well])),
            }
        }
        if options.ignore_none {
            groups.retain(|(k, _)| k.is_some());
        }
        if options.sort_keys {
            groups.sort_by(|(a, _), (b, _)| a.cmp(b));
        }
        groups
    }

    /// Group wells by the value of one data field (rendered as JSON text).
    pub fn wells_grouped_by_data_field(
        &self,
        data_field: &str,
        options: GroupingOptions,
    ) -> Vec<(Option<String>, Vec<WellRef<'_>>)> {
        self.wells_grouped_by(|w| w.data().get(data_field).map(Value::to_string), options)
    }

    /// Last well holding liquid in the given order.
    pub fn last_nonempty_well(&self, direction: Direction) -> Option<WellRef<'_>> {
        self.iter_wells(direction).filter(|w| !w.is_empty()).last()
    }

    // ── Snapshots ───────────────────────────────────────────────────────────

    /// `{"name", "kind", "num_rows", "num_columns", "data", "wells": {"A1": {...}}}`
    /// with non-finite numbers replaced by `nan_replacement`.
    pub fn to_dict(&self, nan_replacement: &Value) -> Value {
        let wells: Metadata = self
            .iter_wells(Direction::Row)
            .map(|w| (w.name().to_string(), w.to_dict(nan_replacement)))
            .collect();
        let mut map = Metadata::new();
        map.insert(
            plate::NAME.into(),
            self.name.clone().map_or(Value::Null, Value::from),
        );
        map.insert(plate::KIND.into(), Value::from(self.kind()));
        map.insert(plate::NUM_ROWS.into(), Value::from(self.num_rows()));
        map.insert(plate::NUM_COLUMNS.into(), Value::from(self.num_columns()));
        map.insert(plate::DATA.into(), Value::Object(self.data.clone()));
        map.insert(plate::WELLS.into(), Value::Object(wells));
        Value::Object(map)
    }

    /// One row per well in the given order: position, volume, capacity,
    /// component list, one column per component quantity and one per well
    /// data field.
    pub fn to_dataframe(&self, direction: Direction) -> Result<DataFrame> {
        let wells: Vec<_> = self.iter_wells(direction).collect();
        let components: BTreeSet<&str> = wells
            .iter()
            .flat_map(|w| w.content().quantities.keys().map(String::as_str))
            .collect();
        let fields = self.list_well_data_fields();

        let names: Vec<&str> = wells.iter().map(|w| w.name()).collect();
        let rows: Vec<u32> = wells.iter().map(|w| w.row() as u32).collect();
        let cols: Vec<u32> = wells.iter().map(|w| w.column() as u32).collect();
        let volumes: Vec<f64> = wells.iter().map(|w| w.volume()).collect();
        let capacities: Vec<Option<f64>> = wells.iter().map(|w| w.capacity()).collect();
        let mixes: Vec<String> = wells
            .iter()
            .map(|w| w.content().components_as_string(" "))
            .collect();

        let mut columns = vec![
            Column::new(well::NAME.into(), &names),
            Column::new(well::ROW.into(), &rows),
            Column::new(well::COLUMN.into(), &cols),
            Column::new(well::VOLUME.into(), &volumes),
            Column::new(well::CAPACITY.into(), &capacities),
            Column::new(well::COMPONENTS.into(), &mixes),
        ];
        for component in components {
            let quantities: Vec<Option<f64>> = wells
                .iter()
                .map(|w| w.content().quantities.get(component).copied())
                .collect();
            let name = format!("{}{component}", well::QUANTITY_PREFIX);
            columns.push(Column::new(name.into(), &quantities));
        }
        for field in &fields {
            let values: Vec<Option<String>> = wells
                .iter()
                .map(|w| {
                    w.data().get(field).map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                })
                .collect();
            let name = format!("{}{field}", well::DATA_PREFIX);
            columns.push(Column::new(name.into(), &values));
        }

        Ok(DataFrame::new(columns)?)
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.name().unwrap_or("None"))
    }
}
