use std::collections::{HashMap, HashSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use polars::prelude::{Column, DataFrame};

use crate::coordinates::Direction as WellOrder;
use crate::deck::Deck;
use crate::error::Result;
use crate::picklist::PickList;
use crate::schema::{direction, traceability};
use crate::transfer::Transfer;
use crate::well::{Source, WellAddress};

/// Which side of the origin a traced well sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDirection {
    Identity,
    Forward,
    Backward,
}

impl TraceDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceDirection::Identity => direction::IDENTITY,
            TraceDirection::Forward => direction::FORWARD,
            TraceDirection::Backward => direction::BACKWARD,
        }
    }
}

/// One row of a trace.
///
/// `transferred_volume` is the total volume moved directly between the two
/// wells; `None` when they are only connected through other wells.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    pub origin: WellAddress,
    pub traced: WellAddress,
    pub direction: TraceDirection,
    pub transferred_volume: Option<f64>,
}

/// Directed graph of liquid movement between wells.
///
/// Nodes are wells, an edge `a → b` carries the summed volume of every
/// transfer from `a` into `b`.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceGraph {
    graph: DiGraph<WellAddress, f64>,
    /// Map from well address → NodeIndex for fast lookup.
    node_map: HashMap<WellAddress, NodeIndex>,
}

impl ProvenanceGraph {
    pub fn from_transfers<'a, I>(transfers: I) -> Self
    where
        I: IntoIterator<Item = &'a Transfer>,
    {
        let mut graph = DiGraph::new();
        let mut node_map: HashMap<WellAddress, NodeIndex> = HashMap::new();

        let get_or_insert = |map: &mut HashMap<WellAddress, NodeIndex>,
                             g: &mut DiGraph<WellAddress, f64>,
                             address: &WellAddress|
         -> NodeIndex {
            *map.entry(address.clone())
                .or_insert_with(|| g.add_node(address.clone()))
        };

        for transfer in transfers {
            let src = get_or_insert(&mut node_map, &mut graph, transfer.source_well());
            let dst = get_or_insert(&mut node_map, &mut graph, transfer.destination_well());
            match graph.find_edge(src, dst) {
                Some(edge) => graph[edge] += transfer.volume(),
                None => {
                    graph.add_edge(src, dst, transfer.volume());
                }
            }
        }

        Self { graph, node_map }
    }

    /// Graph of the transfers a pick-list would perform.
    pub fn from_picklist(picklist: &PickList) -> Self {
        Self::from_transfers(picklist)
    }

    /// Graph of the transfers already applied to the plates on `deck`, as
    /// recorded in their wells' sources.
    pub fn from_deck(deck: &Deck) -> Self {
        let applied: Vec<&Transfer> = deck
            .plates()
            .flat_map(|plate| plate.iter_wells(WellOrder::Row))
            .flat_map(|well| well.sources())
            .filter_map(|source| match source {
                Source::Transfer(transfer) => Some(transfer),
                _ => None,
            })
            .collect();
        Self::from_transfers(applied)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, address: &WellAddress) -> bool {
        self.node_map.contains_key(address)
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Total volume moved directly from `source` into `destination`.
    pub fn volume_between(&self, source: &WellAddress, destination: &WellAddress) -> f64 {
        self.direct_volume(source, destination).unwrap_or(0.0)
    }

    /// Every well connected to `origin`: the identity row, then downstream
    /// wells, then upstream wells.
    pub fn trace(&self, origin: &WellAddress) -> Vec<TraceRow> {
        let mut rows = vec![TraceRow {
            origin: origin.clone(),
            traced: origin.clone(),
            direction: TraceDirection::Identity,
            transferred_volume: None,
        }];

        let Some(&origin_idx) = self.node_map.get(origin) else {
            return rows; // not in graph, identity row only
        };

        for target_idx in self.reachable(origin_idx, Direction::Outgoing) {
            let traced = &self.graph[target_idx];
            rows.push(TraceRow {
                origin: origin.clone(),
                traced: traced.clone(),
                direction: TraceDirection::Forward,
                transferred_volume: self.direct_volume(origin, traced),
            });
        }

        for source_idx in self.reachable(origin_idx, Direction::Incoming) {
            let traced = &self.graph[source_idx];
            rows.push(TraceRow {
                origin: origin.clone(),
                traced: traced.clone(),
                direction: TraceDirection::Backward,
                transferred_volume: self.direct_volume(traced, origin),
            });
        }

        rows
    }

    /// Traces of several origins as one table.
    ///
    /// Columns: origin_well, traced_well, direction, transferred_volume.
    pub fn trace_dataframe(&self, origins: &[WellAddress]) -> Result<DataFrame> {
        let mut origin_col = Vec::new();
        let mut traced_col = Vec::new();
        let mut direction_col = Vec::new();
        let mut volume_col: Vec<Option<f64>> = Vec::new();

        for origin in origins {
            for row in self.trace(origin) {
                origin_col.push(row.origin.to_string());
                traced_col.push(row.traced.to_string());
                direction_col.push(row.direction.as_str());
                volume_col.push(row.transferred_volume);
            }
        }

        let df = DataFrame::new(vec![
            Column::new(traceability::ORIGIN_WELL.into(), &origin_col),
            Column::new(traceability::TRACED_WELL.into(), &traced_col),
            Column::new(traceability::TRACE_DIRECTION.into(), &direction_col),
            Column::new(traceability::TRANSFERRED_VOLUME.into(), &volume_col),
        ])?;

        Ok(df)
    }

    fn direct_volume(&self, source: &WellAddress, destination: &WellAddress) -> Option<f64> {
        let src = *self.node_map.get(source)?;
        let dst = *self.node_map.get(destination)?;
        self.graph.find_edge(src, dst).map(|edge| self.graph[edge])
    }

    /// Find all nodes reachable from `start` following edges in `direction`,
    /// excluding `start` itself.
    fn reachable(&self, start: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeIndex> = self.graph.neighbors_directed(start, direction).collect();
        let mut visited = HashSet::from([start]);

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            result.push(node);
            for neighbor in self.graph.neighbors_directed(node, direction) {
                if !visited.contains(&neighbor) {
                    stack.push(neighbor);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labware::Labware;
    use crate::plate::Plate;

    fn wells() -> (Deck, [WellAddress; 4]) {
        let source = Plate::from_labware(Labware::Plate96, Some("Source"));
        let destination = Plate::from_labware(Labware::Plate96, Some("Destination"));
        let addresses = [
            source.address("A1").unwrap(),
            source.address("A2").unwrap(),
            destination.address("B1").unwrap(),
            destination.address("C1").unwrap(),
        ];
        let mut deck = Deck::new();
        deck.add_plate(source);
        deck.add_plate(destination);
        (deck, addresses)
    }

    fn chain([a, b, c, d]: &[WellAddress; 4]) -> PickList {
        PickList::from_transfers([
            Transfer::new(a.clone(), c.clone(), 2e-6),
            Transfer::new(b.clone(), c.clone(), 1e-6),
            Transfer::new(a.clone(), c.clone(), 3e-6),
            Transfer::new(c.clone(), d.clone(), 4e-6),
        ])
    }

    #[test]
    fn parallel_transfers_share_one_edge() {
        let (_, wells) = wells();
        let graph = ProvenanceGraph::from_picklist(&chain(&wells));
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        assert!((graph.volume_between(&wells[0], &wells[2]) - 5e-6).abs() < 1e-18);
        assert_eq!(graph.volume_between(&wells[0], &wells[3]), 0.0);
        assert!(graph.is_acyclic());
    }

    #[test]
    fn trace_walks_both_directions() {
        let (_, wells) = wells();
        let [a, b, c, d] = &wells;
        let graph = ProvenanceGraph::from_picklist(&chain(&wells));

        let rows = graph.trace(c);
        assert_eq!(rows[0].direction, TraceDirection::Identity);
        assert_eq!(&rows[0].traced, c);

        let forward: Vec<_> = rows
            .iter()
            .filter(|r| r.direction == TraceDirection::Forward)
            .collect();
        assert_eq!(forward.len(), 1);
        assert_eq!(&forward[0].traced, d);
        assert_eq!(forward[0].transferred_volume, Some(4e-6));

        let mut backward: Vec<_> = rows
            .iter()
            .filter(|r| r.direction == TraceDirection::Backward)
            .map(|r| r.traced.clone())
            .collect();
        backward.sort();
        assert_eq!(backward, [a.clone(), b.clone()]);

        let from_a = graph.trace(a);
        let indirect = from_a.iter().find(|r| &r.traced == d).unwrap();
        assert_eq!(indirect.direction, TraceDirection::Forward);
        assert_eq!(indirect.transferred_volume, None);
    }

    #[test]
    fn unknown_origin_traces_to_itself() {
        let (_, wells) = wells();
        let graph = ProvenanceGraph::default();
        let rows = graph.trace(&wells[0]);
        assert_eq!(rows.len(), 1);
        assert!(!graph.contains(&wells[0]));
    }

    #[test]
    fn cycles_are_detected() {
        let (_, [a, b, ..]) = wells();
        let graph = ProvenanceGraph::from_transfers(&[
            Transfer::new(a.clone(), b.clone(), 1.0),
            Transfer::new(b.clone(), a.clone(), 1.0),
        ]);
        assert!(!graph.is_acyclic());
        let rows = graph.trace(&a);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn deck_graph_follows_applied_transfers() {
        let (mut deck, wells) = wells();
        let [a, b, ..] = &wells;
        for address in [a, b] {
            deck.well_mut(address)
                .unwrap()
                .add_content([("dye", 1.0)], 10.0, "uL")
                .unwrap();
        }
        chain(&wells).simulate(&mut deck).unwrap();

        let graph = ProvenanceGraph::from_deck(&deck);
        assert_eq!(graph.edge_count(), 3);
        assert!((graph.volume_between(&wells[2], &wells[3]) - 4e-6).abs() < 1e-18);

        let df = graph.trace_dataframe(&[a.clone()]).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(
            df.get_column_names_str(),
            [
                traceability::ORIGIN_WELL,
                traceability::TRACED_WELL,
                traceability::TRACE_DIRECTION,
                traceability::TRANSFERRED_VOLUME,
            ]
        );
    }
}
