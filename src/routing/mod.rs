//! Dimension-ordered routing functions.

use std::fmt;
use std::str::FromStr;

use crate::config::normalize;
use crate::topology::TopologyKind;
use crate::{NocError, Port, Result};

/// Grid dimensions; tile `id = row * columns + column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub rows: usize,
    pub columns: usize,
}

impl Grid {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self { rows, columns }
    }

    pub fn num_tiles(&self) -> usize {
        self.rows * self.columns
    }

    /// `(row, column)` of a tile.
    pub fn coordinates(&self, tile: usize) -> (usize, usize) {
        (tile / self.columns, tile % self.columns)
    }

    pub fn tile(&self, row: usize, column: usize) -> usize {
        row * self.columns + column
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingKind {
    XyMesh,
    XyTorusUnfolded,
    XyTorusFolded,
}

impl RoutingKind {
    pub const ALL: [RoutingKind; 3] = [RoutingKind::XyMesh, RoutingKind::XyTorusUnfolded, RoutingKind::XyTorusFolded];

    pub fn name(self) -> &'static str {
        match self {
            RoutingKind::XyMesh => "XYMesh",
            RoutingKind::XyTorusUnfolded => "XYTorusUnfolded",
            RoutingKind::XyTorusFolded => "XYTorusFolded",
        }
    }

    pub fn supports(self, topology: TopologyKind) -> bool {
        matches!(
            (self, topology),
            (RoutingKind::XyMesh, TopologyKind::Mesh)
                | (RoutingKind::XyTorusUnfolded, TopologyKind::TorusUnfolded)
                | (RoutingKind::XyTorusFolded, TopologyKind::TorusFolded)
        )
    }

    /// Port through which `src` forwards a packet bound for `dst`.
    pub fn output_port(self, grid: Grid, src: usize, dst: usize) -> Port {
        let (src_x, src_y) = grid.coordinates(src);
        let (dst_x, dst_y) = grid.coordinates(dst);
        match self {
            RoutingKind::XyMesh => {
                if src_y != dst_y {
                    if src_y < dst_y { Port::East } else { Port::West }
                } else if src_x != dst_x {
                    if src_x < dst_x { Port::South } else { Port::North }
                } else {
                    Port::Local
                }
            }
            RoutingKind::XyTorusUnfolded => {
                if src_y != dst_y {
                    let direct = if src_y < dst_y { Port::East } else { Port::West };
                    wrap_unless_short(direct, src_y.abs_diff(dst_y), grid.columns)
                } else if src_x != dst_x {
                    let direct = if src_x < dst_x { Port::South } else { Port::North };
                    wrap_unless_short(direct, src_x.abs_diff(dst_x), grid.rows)
                } else {
                    Port::Local
                }
            }
            RoutingKind::XyTorusFolded => {
                if src_y != dst_y {
                    folded_column_port(grid.columns, src_y, dst_y)
                } else if src_x != dst_x {
                    folded_row_port(grid.rows, src_x, dst_x)
                } else {
                    Port::Local
                }
            }
        }
    }

    /// Port on which the next router receives a packet that `src` forwards
    /// toward `dst`.
    pub fn input_port(self, grid: Grid, src: usize, dst: usize) -> Result<Port> {
        let output = self.output_port(grid, src, dst);
        self.arrival_port(grid, src, output)
    }

    /// Port on which a link leaving `src` through `output` arrives.
    pub fn arrival_port(self, grid: Grid, src: usize, output: Port) -> Result<Port> {
        let opposite = output
            .antipode()
            .ok_or_else(|| NocError::Configuration(format!("tile {} has no input port for a local hop", src)))?;
        if self != RoutingKind::XyTorusFolded {
            return Ok(opposite);
        }
        // Folded links at the ring ends keep their orientation
        let (src_x, src_y) = grid.coordinates(src);
        let (rows, columns) = (grid.rows, grid.columns);
        let port = match output {
            Port::North if src_x <= 1 => Port::North,
            Port::East if src_y == last_even_column(columns) || src_y == columns / 2 + columns % 2 => Port::East,
            Port::South if src_x + 2 >= rows => Port::South,
            Port::West if src_y == 0 || src_y + 1 == columns => Port::West,
            _ => opposite,
        };
        Ok(port)
    }
}

fn wrap_unless_short(direct: Port, distance: usize, dimension: usize) -> Port {
    if distance as f64 <= dimension as f64 / 2.0 {
        direct
    } else {
        // antipode of a compass port always exists
        direct.antipode().unwrap_or(direct)
    }
}

/// Last column of the first (even) half of a folded row.
fn last_even_column(columns: usize) -> usize {
    columns / 2 - (columns + 1) % 2
}

fn folded_column_port(columns: usize, src: usize, dst: usize) -> Port {
    let last_even = last_even_column(columns);
    match (src <= last_even, dst <= last_even) {
        (true, true) => if src < dst { Port::East } else { Port::West },
        (false, false) => if src < dst { Port::West } else { Port::East },
        _ => if src.abs_diff(dst) as f64 <= columns as f64 / 2.0 { Port::East } else { Port::West },
    }
}

fn folded_row_port(rows: usize, src: usize, dst: usize) -> Port {
    if src % 2 == dst % 2 {
        return if src <= dst { Port::South } else { Port::North };
    }
    let (last_odd, last_even) = if rows % 2 == 0 { (rows - 1, rows - 2) } else { (rows - 2, rows - 1) };
    let (dist_odd, dist_even) = if src % 2 == 0 {
        (dst.abs_diff(last_odd), src.abs_diff(last_even))
    } else {
        (src.abs_diff(last_odd), dst.abs_diff(last_even))
    };
    let distance = (dist_odd + dist_even) / 2 + 1;
    if distance <= rows / 2 { Port::South } else { Port::North }
}

impl fmt::Display for RoutingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RoutingKind {
    type Err = NocError;

    fn from_str(s: &str) -> Result<Self> {
        RoutingKind::ALL
            .into_iter()
            .find(|kind| normalize(kind.name()) == normalize(s))
            .ok_or_else(|| NocError::Configuration(format!("unknown routing '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Port::*;

    #[test]
    fn xy_mesh_resolves_columns_first() {
        let grid = Grid::new(4, 4);
        let routing = RoutingKind::XyMesh;
        assert_eq!(routing.output_port(grid, grid.tile(0, 0), grid.tile(3, 3)), East);
        assert_eq!(routing.output_port(grid, grid.tile(0, 3), grid.tile(3, 3)), South);
        assert_eq!(routing.output_port(grid, grid.tile(3, 3), grid.tile(1, 3)), North);
        assert_eq!(routing.output_port(grid, grid.tile(2, 2), grid.tile(2, 0)), West);
        assert_eq!(routing.output_port(grid, 5, 5), Local);
        assert_eq!(routing.input_port(grid, 0, 1).unwrap(), West);
        assert!(routing.input_port(grid, 6, 6).is_err());
    }

    #[test]
    fn unfolded_torus_wraps_long_distances() {
        let grid = Grid::new(4, 4);
        let routing = RoutingKind::XyTorusUnfolded;
        assert_eq!(routing.output_port(grid, grid.tile(0, 0), grid.tile(0, 2)), East);
        assert_eq!(routing.output_port(grid, grid.tile(0, 0), grid.tile(0, 3)), West);
        assert_eq!(routing.output_port(grid, grid.tile(3, 1), grid.tile(0, 1)), South);
        assert_eq!(routing.input_port(grid, grid.tile(0, 0), grid.tile(0, 3)).unwrap(), East);

        let grid = Grid::new(3, 3);
        assert_eq!(routing.output_port(grid, grid.tile(1, 0), grid.tile(1, 2)), West);
        assert_eq!(routing.output_port(grid, grid.tile(1, 0), grid.tile(1, 1)), East);
    }

    #[test]
    fn folded_torus_follows_ring_halves() {
        let grid = Grid::new(4, 4);
        let routing = RoutingKind::XyTorusFolded;
        assert_eq!(last_even_column(4), 1);
        assert_eq!(last_even_column(5), 2);
        assert_eq!(routing.output_port(grid, grid.tile(0, 0), grid.tile(0, 1)), East);
        assert_eq!(routing.output_port(grid, grid.tile(0, 3), grid.tile(0, 2)), East);
        assert_eq!(routing.output_port(grid, grid.tile(0, 2), grid.tile(0, 3)), West);
        assert_eq!(routing.output_port(grid, grid.tile(0, 0), grid.tile(2, 0)), South);
        assert_eq!(routing.output_port(grid, grid.tile(0, 0), grid.tile(1, 0)), North);
    }

    #[test]
    fn folded_input_port_keeps_orientation_at_ring_ends() {
        let grid = Grid::new(4, 4);
        let routing = RoutingKind::XyTorusFolded;
        assert_eq!(routing.arrival_port(grid, grid.tile(0, 0), North).unwrap(), North);
        assert_eq!(routing.arrival_port(grid, grid.tile(2, 0), North).unwrap(), South);
        assert_eq!(routing.arrival_port(grid, grid.tile(3, 1), South).unwrap(), South);
        assert_eq!(routing.arrival_port(grid, grid.tile(0, 1), East).unwrap(), East);
        assert_eq!(routing.arrival_port(grid, grid.tile(0, 3), West).unwrap(), West);
        assert_eq!(routing.arrival_port(grid, grid.tile(0, 2), West).unwrap(), East);
        assert_eq!(RoutingKind::XyMesh.arrival_port(grid, 0, South).unwrap(), North);
    }

    #[test]
    fn routing_pairs_with_its_topology() {
        assert!(RoutingKind::XyMesh.supports(TopologyKind::Mesh));
        assert!(!RoutingKind::XyMesh.supports(TopologyKind::TorusFolded));
        assert!(RoutingKind::XyTorusFolded.supports(TopologyKind::TorusFolded));
        assert_eq!("xy_torus_unfolded".parse::<RoutingKind>().unwrap(), RoutingKind::XyTorusUnfolded);
    }
}
