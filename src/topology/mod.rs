//! Tile grids and the inter-tile optical wiring that joins their routers.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use log::{debug, info};

use crate::blocks::{Arena, Arm, Crossing, Endpoint, Tile, Waveguide};
use crate::config::{normalize, Configuration};
use crate::routing::{Grid, RoutingKind};
use crate::{NocError, Port, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyKind {
    Mesh,
    TorusUnfolded,
    TorusFolded,
}

impl TopologyKind {
    pub const ALL: [TopologyKind; 3] = [TopologyKind::Mesh, TopologyKind::TorusUnfolded, TopologyKind::TorusFolded];

    pub fn name(self) -> &'static str {
        match self {
            TopologyKind::Mesh => "Mesh",
            TopologyKind::TorusUnfolded => "TorusUnfolded",
            TopologyKind::TorusFolded => "TorusFolded",
        }
    }

    pub fn build(self, config: &Configuration) -> Result<Topology> {
        Topology::new(self, Grid::new(config.rows, config.columns), config.hop_distance())
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TopologyKind {
    type Err = NocError;

    fn from_str(s: &str) -> Result<Self> {
        TopologyKind::ALL
            .into_iter()
            .find(|kind| normalize(kind.name()) == normalize(s))
            .ok_or_else(|| NocError::Configuration(format!("unknown topology '{}'", s)))
    }
}

/// Crossings of one set, as `[north-west, north-east, south-west,
/// south-east]`.
type CrossingSet = [usize; 4];

/// Orientation of a line through a crossing set. Eastbound traffic passes
/// the northern pair, westbound the southern pair, southbound the eastern
/// pair and northbound the western pair.
#[derive(Debug, Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    fn arm(self) -> Arm {
        match self {
            Axis::Horizontal => Arm::Zero,
            Axis::Vertical => Arm::One,
        }
    }

    /// Set positions passed going east (south), then going west (north).
    fn passes(self) -> ([usize; 2], [usize; 2]) {
        match self {
            Axis::Horizontal => ([0, 1], [3, 2]),
            Axis::Vertical => ([1, 3], [2, 0]),
        }
    }
}

/// Waveguides and crossings a link runs through between two tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkTrace {
    pub waveguides: Vec<usize>,
    pub crossings: Vec<usize>,
    pub destination: usize,
    pub length: f64,
}

/// Stretch of a link between a tile and an inter-tile crossing, exclusive
/// of the crossing itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSpan {
    pub tile: usize,
    pub length: f64,
    pub crossings: usize,
}

#[derive(Debug, Clone)]
pub struct Topology {
    kind: TopologyKind,
    grid: Grid,
    hop_distance: f64,
    tiles: Vec<Tile>,
    waveguides: Arena<Waveguide>,
    crossings: Arena<Crossing>,
}

impl Topology {
    pub fn new(kind: TopologyKind, grid: Grid, hop_distance: f64) -> Result<Self> {
        if grid.rows < 2 || grid.columns < 2 {
            return Err(NocError::Configuration(format!("grid must be at least 2x2, got {}x{}", grid.rows, grid.columns)));
        }
        let tiles = (0..grid.num_tiles())
            .map(|id| {
                let (row, column) = grid.coordinates(id);
                Tile::new(id, row, column)
            })
            .collect();
        let mut topology = Self {
            kind,
            grid,
            hop_distance,
            tiles,
            waveguides: Arena::new("waveguide"),
            crossings: Arena::new("crossing"),
        };
        match kind {
            TopologyKind::Mesh => topology.wire_mesh()?,
            TopologyKind::TorusUnfolded => topology.wire_unfolded_torus()?,
            TopologyKind::TorusFolded => topology.wire_folded()?,
        }
        topology.check_crossings()?;
        info!(
            "Topology {} {}x{}: {} waveguides, {} crossings, hop {:.4} cm",
            kind,
            grid.rows,
            grid.columns,
            topology.waveguides.len(),
            topology.crossings.len(),
            hop_distance
        );
        Ok(topology)
    }

    fn owner(&self) -> String {
        format!("{} topology", self.kind)
    }

    fn claim_output(&mut self, tile: usize, port: Port, waveguide: usize) -> Result<()> {
        let slot = &mut self.tiles[tile].out_waveguides[port.index()];
        if slot.is_some() {
            return Err(NocError::Configuration(format!("{}: output port {} of tile {} is wired twice", self.kind, port, tile)));
        }
        *slot = Some(waveguide);
        Ok(())
    }

    fn claim_input(&mut self, tile: usize, port: Port, waveguide: usize) -> Result<()> {
        let slot = &mut self.tiles[tile].in_waveguides[port.index()];
        if slot.is_some() {
            return Err(NocError::Configuration(format!("{}: input port {} of tile {} is wired twice", self.kind, port, tile)));
        }
        *slot = Some(waveguide);
        Ok(())
    }

    /// Direct waveguide from `src` leaving through `output` to `dst`
    /// arriving on `input`.
    fn add_link(&mut self, src: usize, output: Port, dst: usize, input: Port, length: f64) -> Result<usize> {
        self.add_segmented_link(src, output, dst, input, &[], &[length])
    }

    /// Link cut into segments by the given inter-tile crossings, which it
    /// passes in order on the given arm. `lengths` holds one entry per
    /// segment.
    fn add_segmented_link(
        &mut self,
        src: usize,
        output: Port,
        dst: usize,
        input: Port,
        through: &[(usize, Arm)],
        lengths: &[f64],
    ) -> Result<usize> {
        let owner = self.owner();
        if lengths.len() != through.len() + 1 {
            return Err(NocError::MalformedGraph {
                owner,
                message: format!("link {} -> {} has {} segment lengths for {} crossings", src, dst, lengths.len(), through.len()),
            });
        }
        let mut previous = Endpoint::Tile(src);
        let mut segments = Vec::with_capacity(through.len() + 1);

        for (step, &length) in lengths.iter().enumerate() {
            let id = self.waveguides.push(Waveguide::with_length(0, length));
            let waveguide = self.waveguides.fetch_mut(&owner, id)?;
            waveguide.id = id;
            waveguide.input = Some(previous);
            if let Endpoint::Crossing(crossing) = previous {
                let arm = through[step - 1].1;
                self.crossings.fetch_mut(&owner, crossing)?.outputs[arm as usize] = Some(id);
            }

            let next = match through.get(step) {
                Some(&(crossing, arm)) => {
                    self.crossings.fetch_mut(&owner, crossing)?.inputs[arm as usize] = Some(id);
                    Endpoint::Crossing(crossing)
                }
                None => Endpoint::Tile(dst),
            };
            self.waveguides.fetch_mut(&owner, id)?.output = Some(next);
            segments.push(id);
            previous = next;
        }

        let (first, last) = match (segments.first(), segments.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return Err(NocError::MalformedGraph { owner, message: "empty link".to_string() }),
        };
        self.claim_output(src, output, first)?;
        self.claim_input(dst, input, last)?;
        debug!("{}: link {} --{}--> {} ({} segments)", self.kind, src, output, dst, lengths.len());
        Ok(first)
    }

    /// Both directions of a line between two tile ports. `stops` lists the
    /// crossing sets met going from `first` to `second`, each with the
    /// length run before reaching it; `tail` is the length after the last.
    fn add_line(
        &mut self,
        axis: Axis,
        first: (usize, Port),
        second: (usize, Port),
        stops: &[(CrossingSet, f64)],
        tail: f64,
    ) -> Result<()> {
        let arm = axis.arm();
        let (forward, backward) = axis.passes();

        let mut through = Vec::with_capacity(2 * stops.len());
        let mut lengths = Vec::with_capacity(2 * stops.len() + 1);
        for &(set, length) in stops {
            through.extend(forward.into_iter().map(|corner| (set[corner], arm)));
            lengths.extend([length, 0.0]);
        }
        lengths.push(tail);
        self.add_segmented_link(first.0, first.1, second.0, second.1, &through, &lengths)?;

        let through: Vec<_> = stops
            .iter()
            .rev()
            .flat_map(|&(set, _)| backward.into_iter().map(move |corner| (set[corner], arm)))
            .collect();
        lengths.reverse();
        self.add_segmented_link(second.0, second.1, first.0, first.1, &through, &lengths)?;
        Ok(())
    }

    /// Four crossings where a horizontal and a vertical line pass each
    /// other, each direction of one meeting each direction of the other.
    fn add_crossing_set(&mut self) -> CrossingSet {
        let mut set = [0; 4];
        for slot in &mut set {
            let id = self.crossings.push(Crossing::default());
            if let Some(crossing) = self.crossings.get_mut(id) {
                crossing.id = id;
            }
            *slot = id;
        }
        set
    }

    fn wire_mesh(&mut self) -> Result<()> {
        let grid = self.grid;
        let hop = self.hop_distance;
        for row in 0..grid.rows {
            for column in 0..grid.columns {
                let tile = grid.tile(row, column);
                if column + 1 < grid.columns {
                    let east = grid.tile(row, column + 1);
                    self.add_link(tile, Port::East, east, Port::West, hop)?;
                    self.add_link(east, Port::West, tile, Port::East, hop)?;
                }
                if row + 1 < grid.rows {
                    let south = grid.tile(row + 1, column);
                    self.add_link(tile, Port::South, south, Port::North, hop)?;
                    self.add_link(south, Port::North, tile, Port::South, hop)?;
                }
            }
        }
        Ok(())
    }

    /// Unfolded torus. Row `r` wraps from the west port of its first tile
    /// to the east port of its last; column `c` from the north port of its
    /// first tile to the south port of its last. Outer wraps run along the
    /// frame and meet only at the four corners. An inner column wrap runs
    /// between columns `c` and `c + 1` and crosses every row link there; an
    /// inner row wrap runs between rows `r` and `r + 1` and crosses every
    /// column link there. Inner wraps cross each other.
    fn wire_unfolded_torus(&mut self) -> Result<()> {
        let grid = self.grid;
        let hop = self.hop_distance;
        let (rows, columns) = (grid.rows, grid.columns);
        let (last_row, last_column) = (rows - 1, columns - 1);
        let row_wraps = columns >= 3;
        let column_wraps = rows >= 3;

        // Keyed by the west (row links) or north (column links) tile, and
        // by (r, c) for the crossing of inner row wrap r and column wrap c.
        let mut row_link_sets = vec![None; grid.num_tiles()];
        let mut column_link_sets = vec![None; grid.num_tiles()];
        let mut wrap_sets = vec![None; grid.num_tiles()];
        for row in 0..rows {
            for column in 0..columns {
                let tile = grid.tile(row, column);
                if column_wraps && (1..last_column).contains(&column) {
                    row_link_sets[tile] = Some(self.add_crossing_set());
                }
                if row_wraps && (1..last_row).contains(&row) {
                    column_link_sets[tile] = Some(self.add_crossing_set());
                }
                if (1..last_row).contains(&row) && (1..last_column).contains(&column) {
                    wrap_sets[tile] = Some(self.add_crossing_set());
                }
            }
        }
        let corners = if row_wraps && column_wraps {
            Some([self.add_crossing_set(), self.add_crossing_set(), self.add_crossing_set(), self.add_crossing_set()])
        } else {
            None
        };
        let missing = |what: &str, tile: usize| NocError::MalformedGraph {
            owner: format!("{} topology", TopologyKind::TorusUnfolded),
            message: format!("no crossing set for {} at tile {}", what, tile),
        };

        for row in 0..rows {
            for column in 0..columns {
                let tile = grid.tile(row, column);
                if column < last_column {
                    let stops: Vec<_> = row_link_sets[tile].map(|set| (set, 0.0)).into_iter().collect();
                    self.add_line(Axis::Horizontal, (tile, Port::East), (tile + 1, Port::West), &stops, hop)?;
                }
                if row < last_row {
                    let stops: Vec<_> = column_link_sets[tile].map(|set| (set, 0.0)).into_iter().collect();
                    let south = grid.tile(row + 1, column);
                    self.add_line(Axis::Vertical, (tile, Port::South), (south, Port::North), &stops, hop)?;
                }
            }
        }

        if row_wraps {
            for row in 0..rows {
                let (west, east) = (grid.tile(row, 0), grid.tile(row, last_column));
                let frame = match (row, corners) {
                    (0, Some([north_west, north_east, _, _])) => Some([north_west, north_east]),
                    (r, Some([_, _, south_west, south_east])) if r == last_row => Some([south_west, south_east]),
                    _ => None,
                };
                let (stops, tail) = if row == 0 || row == last_row {
                    match frame {
                        Some([a, b]) => (vec![(a, 0.0), (b, hop * last_column as f64)], 0.0),
                        None => (Vec::new(), hop * last_column as f64),
                    }
                } else {
                    let mut stops = vec![(column_link_sets[west].ok_or_else(|| missing("column link", west))?, 0.0)];
                    for column in 1..columns {
                        if column > 1 {
                            let at = grid.tile(row, column - 1);
                            stops.push((wrap_sets[at].ok_or_else(|| missing("wrap crossing", at))?, 0.0));
                        }
                        let at = grid.tile(row, column);
                        stops.push((column_link_sets[at].ok_or_else(|| missing("column link", at))?, hop));
                    }
                    (stops, 0.0)
                };
                self.add_line(Axis::Horizontal, (west, Port::West), (east, Port::East), &stops, tail)?;
            }
        }

        if column_wraps {
            for column in 0..columns {
                let (north, south) = (grid.tile(0, column), grid.tile(last_row, column));
                let frame = match (column, corners) {
                    (0, Some([north_west, _, south_west, _])) => Some([north_west, south_west]),
                    (c, Some([_, north_east, _, south_east])) if c == last_column => Some([north_east, south_east]),
                    _ => None,
                };
                let (stops, tail) = if column == 0 || column == last_column {
                    match frame {
                        Some([a, b]) => (vec![(a, 0.0), (b, hop * last_row as f64)], 0.0),
                        None => (Vec::new(), hop * last_row as f64),
                    }
                } else {
                    let mut stops = vec![(row_link_sets[north].ok_or_else(|| missing("row link", north))?, 0.0)];
                    for row in 1..rows {
                        if row > 1 {
                            let at = grid.tile(row - 1, column);
                            stops.push((wrap_sets[at].ok_or_else(|| missing("wrap crossing", at))?, 0.0));
                        }
                        let at = grid.tile(row, column);
                        stops.push((row_link_sets[at].ok_or_else(|| missing("row link", at))?, hop));
                    }
                    (stops, 0.0)
                };
                self.add_line(Axis::Vertical, (north, Port::North), (south, Port::South), &stops, tail)?;
            }
        }
        Ok(())
    }

    /// Folded torus: tiles joined along folded rings, with the ports the
    /// folded routing function assigns to each link.
    fn wire_folded(&mut self) -> Result<()> {
        let grid = self.grid;
        let routing = RoutingKind::XyTorusFolded;
        let length = 2.0 * self.hop_distance;
        let column_ring: Vec<usize> = (0..grid.columns).collect();
        let row_ring: Vec<usize> = (0..grid.rows).step_by(2).chain((1..grid.rows).step_by(2).rev()).collect();

        let mut pairs = Vec::new();
        for row in 0..grid.rows {
            for (i, &a) in column_ring.iter().enumerate() {
                let b = column_ring[(i + 1) % column_ring.len()];
                pairs.push((grid.tile(row, a), grid.tile(row, b)));
            }
        }
        for column in 0..grid.columns {
            for (i, &a) in row_ring.iter().enumerate() {
                let b = row_ring[(i + 1) % row_ring.len()];
                pairs.push((grid.tile(a, column), grid.tile(b, column)));
            }
        }

        let mut seen = HashSet::new();
        for (a, b) in pairs {
            for (src, dst) in [(a, b), (b, a)] {
                if src == dst || !seen.insert((src, dst)) {
                    continue;
                }
                let output = routing.output_port(grid, src, dst);
                let input = routing.arrival_port(grid, src, output)?;
                self.add_link(src, output, dst, input, length)?;
            }
        }
        Ok(())
    }

    fn check_crossings(&self) -> Result<()> {
        for (id, crossing) in self.crossings.iter() {
            if crossing.inputs.iter().chain(crossing.outputs.iter()).any(Option::is_none) {
                return Err(NocError::Configuration(format!("{}: crossing {} has an unconnected arm", self.kind, id)));
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn rows(&self) -> usize {
        self.grid.rows
    }

    pub fn columns(&self) -> usize {
        self.grid.columns
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn hop_distance(&self) -> f64 {
        self.hop_distance
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, id: usize) -> Result<&Tile> {
        self.tiles.get(id).ok_or_else(|| NocError::MissingBlock { owner: self.owner(), kind: "tile", id })
    }

    pub fn waveguides(&self) -> &Arena<Waveguide> {
        &self.waveguides
    }

    pub fn crossings(&self) -> &Arena<Crossing> {
        &self.crossings
    }

    pub fn waveguide(&self, id: usize) -> Result<&Waveguide> {
        self.waveguides.fetch(&self.owner(), id)
    }

    pub fn crossing(&self, id: usize) -> Result<&Crossing> {
        self.crossings.fetch(&self.owner(), id)
    }

    /// Follows the link leaving `tile` through `port` straight across any
    /// crossings to the tile it reaches.
    pub fn follow(&self, tile: usize, port: Port) -> Result<LinkTrace> {
        let start = self.tile(tile)?.out_waveguide(port).ok_or_else(|| {
            NocError::Configuration(format!("{}: tile {} has no link through port {}", self.kind, tile, port))
        })?;
        let mut trace = LinkTrace { waveguides: Vec::new(), crossings: Vec::new(), destination: tile, length: 0.0 };
        let mut current = start;
        for _ in 0..=self.waveguides.len() {
            let waveguide = self.waveguide(current)?;
            trace.waveguides.push(current);
            trace.length += waveguide.length;
            if let Some(destination) = waveguide.output_tile() {
                trace.destination = destination;
                return Ok(trace);
            }
            let crossing_id = waveguide.output_crossing().ok_or_else(|| self.broken(current))?;
            let crossing = self.crossing(crossing_id)?;
            let arm = crossing.arm_of_input(current).ok_or_else(|| self.broken(current))?;
            trace.crossings.push(crossing_id);
            current = crossing.output(arm).ok_or_else(|| self.broken(current))?;
        }
        Err(NocError::MalformedGraph { owner: self.owner(), message: format!("link from tile {} does not end", tile) })
    }

    /// Walks back from a crossing along `arm` to the tile that feeds it.
    pub fn span_from_source(&self, crossing: usize, arm: Arm) -> Result<LinkSpan> {
        let mut current = self.crossing(crossing)?.input(arm).ok_or_else(|| self.broken(crossing))?;
        let mut span = LinkSpan { tile: 0, length: 0.0, crossings: 0 };
        for _ in 0..=self.waveguides.len() {
            let waveguide = self.waveguide(current)?;
            span.length += waveguide.length;
            match waveguide.input {
                Some(Endpoint::Tile(tile)) => {
                    span.tile = tile;
                    return Ok(span);
                }
                Some(Endpoint::Crossing(previous)) => {
                    let previous = self.crossing(previous)?;
                    let arm = previous.arm_of_output(current).ok_or_else(|| self.broken(current))?;
                    span.crossings += 1;
                    current = previous.input(arm).ok_or_else(|| self.broken(current))?;
                }
                _ => return Err(self.broken(current)),
            }
        }
        Err(self.broken(current))
    }

    /// Walks forward from a crossing along `arm` to the tile it feeds.
    pub fn span_to_destination(&self, crossing: usize, arm: Arm) -> Result<LinkSpan> {
        let mut current = self.crossing(crossing)?.output(arm).ok_or_else(|| self.broken(crossing))?;
        let mut span = LinkSpan { tile: 0, length: 0.0, crossings: 0 };
        for _ in 0..=self.waveguides.len() {
            let waveguide = self.waveguide(current)?;
            span.length += waveguide.length;
            match waveguide.output {
                Some(Endpoint::Tile(tile)) => {
                    span.tile = tile;
                    return Ok(span);
                }
                Some(Endpoint::Crossing(next)) => {
                    let next = self.crossing(next)?;
                    let arm = next.arm_of_input(current).ok_or_else(|| self.broken(current))?;
                    span.crossings += 1;
                    current = next.output(arm).ok_or_else(|| self.broken(current))?;
                }
                _ => return Err(self.broken(current)),
            }
        }
        Err(self.broken(current))
    }

    fn broken(&self, id: usize) -> NocError {
        NocError::MalformedGraph { owner: self.owner(), message: format!("inter-tile wiring breaks at block {}", id) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(kind: TopologyKind, rows: usize, columns: usize) -> Topology {
        Topology::new(kind, Grid::new(rows, columns), 1.0).unwrap()
    }

    fn routing_for(kind: TopologyKind) -> RoutingKind {
        RoutingKind::ALL.into_iter().find(|r| r.supports(kind)).unwrap()
    }

    /// Every hop of every route leaves on a wired port and arrives at the
    /// neighbour, on the port, that routing predicts.
    fn assert_routes_consistent(topology: &Topology) {
        let routing = routing_for(topology.kind());
        let grid = topology.grid();
        for src in 0..grid.num_tiles() {
            for dst in 0..grid.num_tiles() {
                let mut current = src;
                let mut hops = 0;
                while current != dst {
                    let port = routing.output_port(grid, current, dst);
                    let link = topology.follow(current, port).unwrap();
                    let expected = routing.input_port(grid, current, dst).unwrap();
                    let tile = topology.tile(link.destination).unwrap();
                    assert_eq!(tile.arrival_port(*link.waveguides.last().unwrap()), Some(expected));
                    current = link.destination;
                    hops += 1;
                    assert!(hops <= grid.num_tiles(), "{} route {} -> {} loops", topology.kind(), src, dst);
                }
            }
        }
    }

    #[test]
    fn mesh_links_neighbours() {
        let topology = build(TopologyKind::Mesh, 3, 4);
        assert_eq!(topology.waveguides().len(), 2 * (3 * 3 + 2 * 4));
        assert!(topology.crossings().is_empty());
        let corner = topology.tile(0).unwrap();
        assert!(corner.out_waveguide(Port::North).is_none());
        assert!(corner.out_waveguide(Port::West).is_none());
        let link = topology.follow(0, Port::East).unwrap();
        assert_eq!(link.destination, 1);
        assert_eq!(link.length, 1.0);
        assert_routes_consistent(&topology);
    }

    #[test]
    fn unfolded_torus_frame_wraps_meet_at_corners() {
        let topology = build(TopologyKind::TorusUnfolded, 4, 4);
        // 8 row-link, 8 column-link, 4 wrap-wrap and 4 corner sets
        assert_eq!(topology.crossings().len(), 24 * 4);
        let link = topology.follow(0, Port::West).unwrap();
        assert_eq!(link.destination, 3);
        assert_eq!(link.crossings.len(), 4);
        assert!((link.length - 3.0).abs() < 1e-12);
        assert_routes_consistent(&topology);
    }

    #[test]
    fn unfolded_torus_inner_links_pass_wraps() {
        let topology = build(TopologyKind::TorusUnfolded, 4, 4);
        for (tile, port, destination, crossings) in [
            (0, Port::East, 1, 0),
            (1, Port::East, 2, 2),
            (2, Port::West, 1, 2),
            (1, Port::South, 5, 0),
            (5, Port::South, 9, 2),
            (9, Port::North, 5, 2),
        ] {
            let link = topology.follow(tile, port).unwrap();
            assert_eq!(link.destination, destination);
            assert_eq!(link.crossings.len(), crossings, "{} {}", tile, port);
            assert!((link.length - 1.0).abs() < 1e-12);
        }

        // Inner wraps cross every link and wrap on their way
        let column_wrap = topology.follow(1, Port::North).unwrap();
        assert_eq!(column_wrap.destination, 13);
        assert_eq!(column_wrap.crossings.len(), 12);
        assert!((column_wrap.length - 3.0).abs() < 1e-12);
        let row_wrap = topology.follow(4, Port::West).unwrap();
        assert_eq!(row_wrap.destination, 7);
        assert_eq!(row_wrap.crossings.len(), 12);

        let row_link = topology.follow(5, Port::East).unwrap();
        let shared = row_link.crossings.iter().filter(|c| column_wrap.crossings.contains(c)).count();
        assert_eq!(shared, 1);
        let shared = row_link.crossings.iter().filter(|c| row_wrap.crossings.contains(c)).count();
        assert_eq!(shared, 0);
    }

    #[test]
    fn unfolded_torus_spans_reach_tiles() {
        let topology = build(TopologyKind::TorusUnfolded, 3, 3);
        let link = topology.follow(0, Port::West).unwrap();
        let crossing = link.crossings[1];
        let back = topology.span_from_source(crossing, Arm::Zero).unwrap();
        let forward = topology.span_to_destination(crossing, Arm::Zero).unwrap();
        assert_eq!((back.tile, back.crossings), (0, 1));
        assert_eq!(forward.tile, 2);
        assert_eq!(back.crossings + forward.crossings + 1, link.crossings.len());
        assert!((back.length + forward.length - link.length).abs() < 1e-12);
    }

    #[test]
    fn small_torus_skips_degenerate_wraps() {
        let topology = build(TopologyKind::TorusUnfolded, 2, 3);
        assert!(topology.crossings().is_empty());
        assert!(topology.tile(0).unwrap().out_waveguide(Port::North).is_none());
        assert!(topology.tile(0).unwrap().out_waveguide(Port::West).is_some());
        assert_routes_consistent(&topology);
    }

    #[test]
    fn folded_torus_is_consistent_with_its_routing() {
        for (rows, columns) in [(2, 2), (3, 3), (4, 4), (4, 5), (5, 6)] {
            let topology = build(TopologyKind::TorusFolded, rows, columns);
            for tile in topology.tiles() {
                for waveguide in tile.out_waveguides.iter().flatten() {
                    assert!((topology.waveguide(*waveguide).unwrap().length - 2.0).abs() < 1e-12);
                }
            }
            assert_routes_consistent(&topology);
        }
    }

    #[test]
    fn rejects_degenerate_grid() {
        assert!(Topology::new(TopologyKind::Mesh, Grid::new(1, 4), 1.0).is_err());
    }
}
