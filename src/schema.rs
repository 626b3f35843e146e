/// Field and column-name constants for plate-tracekit snapshots.
/// Single source of truth - shared by dict snapshots, DataFrames and the
/// Python module.

// ── Well content fields ─────────────────────────────────────────────────────
pub mod content {
    pub const VOLUME: &str = "volume";
    pub const QUANTITIES: &str = "quantities";
}

// ── Well fields / columns ───────────────────────────────────────────────────
pub mod well {
    pub const NAME: &str = "name";
    pub const ROW: &str = "row";
    pub const COLUMN: &str = "column";
    pub const CONTENT: &str = "content";
    pub const VOLUME: &str = "volume";
    pub const CAPACITY: &str = "capacity";
    pub const COMPONENTS: &str = "components";
    /// Prefix of per-component quantity columns, e.g. `quantity:Compound_1`.
    pub const QUANTITY_PREFIX: &str = "quantity:";
    /// Prefix of per-field well data columns, e.g. `data:sample`.
    pub const DATA_PREFIX: &str = "data:";
}

// ── Plate fields ────────────────────────────────────────────────────────────
pub mod plate {
    pub const NAME: &str = "name";
    pub const KIND: &str = "kind";
    pub const NUM_ROWS: &str = "num_rows";
    pub const NUM_COLUMNS: &str = "num_columns";
    pub const DATA: &str = "data";
    pub const WELLS: &str = "wells";
}

// ── Pick-list data keys ─────────────────────────────────────────────────────
pub mod picklist {
    /// Number of transfers in the pick-list a derived pick-list came from.
    pub const PARENT_TRANSFERS: &str = "parent_transfers";
}

// ── Direction values ────────────────────────────────────────────────────────
pub mod direction {
    pub const IDENTITY: &str = "identity";
    pub const FORWARD: &str = "forward";
    pub const BACKWARD: &str = "backward";
}

// ── Traceability index columns ──────────────────────────────────────────────
pub mod traceability {
    pub const ORIGIN_WELL: &str = "origin_well";
    pub const TRACED_WELL: &str = "traced_well";
    pub const TRACE_DIRECTION: &str = "direction";
    pub const TRANSFERRED_VOLUME: &str = "transferred_volume";
}
