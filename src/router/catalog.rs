//! Static router graphs. Identifiers are 1-based; `0` marks an absent
//! crossing at a waveguide end, which is then a router port.

use crate::blocks::{Crossing, Endpoint, MicroringResonator, RingKind, Waveguide};
use crate::router::RouterBlocks;
use crate::{NocError, Port, Result};

use Port::{East as E, Local as L, North as N, South as S, West as W};
use RingKind::{Crossing as C, Parallel as P};

const NONE: usize = 0;

/// One router as plain tables.
pub struct RouterTable {
    pub name: &'static str,
    /// (id, kind, input waveguide, output waveguide, resonant direction)
    pub rings: &'static [(usize, RingKind, usize, usize, Port)],
    /// (id, input0, input1, output0, output1)
    pub crossings: &'static [(usize, usize, usize, usize, usize)],
    /// (id, input crossing, output crossing)
    pub waveguides: &'static [(usize, usize, usize)],
    /// (waveguide, ring) in threading order
    pub parallel_rings: &'static [(usize, usize)],
    /// (crossing, ring)
    pub in0_out1: &'static [(usize, usize)],
    pub in1_out0: &'static [(usize, usize)],
    pub inputs: &'static [(usize, Port)],
    pub outputs: &'static [(usize, Port)],
}

impl RouterTable {
    pub fn assemble(&self) -> Result<RouterBlocks> {
        let owner = self.name;
        let mut blocks = RouterBlocks::new();

        for &(id, kind, input, output, direction) in self.rings {
            blocks.rings.insert(owner, id, MicroringResonator::new(id, kind, input, output, direction))?;
        }
        for &(id, in0, in1, out0, out1) in self.crossings {
            blocks.crossings.insert(owner, id, Crossing::new(id, in0, in1, out0, out1))?;
        }
        for &(id, input, output) in self.waveguides {
            let mut waveguide = Waveguide::new(id);
            waveguide.input = (input != NONE).then_some(Endpoint::Crossing(input));
            waveguide.output = (output != NONE).then_some(Endpoint::Crossing(output));
            blocks.waveguides.insert(owner, id, waveguide)?;
        }
        for &(waveguide, ring) in self.parallel_rings {
            blocks.waveguides.fetch_mut(owner, waveguide)?.rings.push(ring);
        }
        for &(crossing, ring) in self.in0_out1 {
            blocks.crossings.fetch_mut(owner, crossing)?.ring_in0_out1 = Some(ring);
        }
        for &(crossing, ring) in self.in1_out0 {
            blocks.crossings.fetch_mut(owner, crossing)?.ring_in1_out0 = Some(ring);
        }
        for &(id, port) in self.inputs {
            let waveguide = blocks.waveguides.fetch_mut(owner, id)?;
            if waveguide.input.replace(Endpoint::Port(port)).is_some() {
                return Err(port_clash(owner, id, port));
            }
        }
        for &(id, port) in self.outputs {
            let waveguide = blocks.waveguides.fetch_mut(owner, id)?;
            if waveguide.output.replace(Endpoint::Port(port)).is_some() {
                return Err(port_clash(owner, id, port));
            }
        }
        Ok(blocks)
    }
}

fn port_clash(owner: &str, waveguide: usize, port: Port) -> NocError {
    NocError::MalformedGraph {
        owner: owner.to_string(),
        message: format!("port {} attached to waveguide {} which already ends at a crossing", port, waveguide),
    }
}

pub const CRUX: RouterTable = RouterTable {
    name: "Crux",
    rings: &[
        (1, P, 1, 2, L),
        (2, C, 15, 2, L),
        (3, C, 16, 3, N),
        (4, P, 17, 13, W),
        (5, C, 14, 4, S),
        (6, C, 19, 6, N),
        (7, C, 17, 7, S),
        (8, C, 22, 8, L),
        (9, C, 23, 9, N),
        (10, P, 20, 24, E),
        (11, C, 21, 10, S),
        (12, P, 12, 11, L),
    ],
    crossings: &[
        (1, 14, 1, 13, 4),
        (2, 15, 5, 14, 2),
        (3, 16, 6, 15, 3),
        (4, 17, 4, 18, 7),
        (5, 18, 8, 19, 5),
        (6, 19, 9, 20, 6),
        (7, 21, 7, 22, 10),
        (8, 22, 11, 23, 8),
        (9, 23, 12, 24, 9),
    ],
    waveguides: &[
        (1, NONE, 1),
        (2, 2, NONE),
        (3, 3, NONE),
        (4, 1, 4),
        (5, 5, 2),
        (6, 6, 3),
        (7, 4, 7),
        (8, 8, 5),
        (9, 9, 6),
        (10, 7, NONE),
        (11, NONE, 8),
        (12, NONE, 9),
        (13, 1, NONE),
        (14, 2, 1),
        (15, 3, 2),
        (16, NONE, 3),
        (17, NONE, 4),
        (18, 4, 5),
        (19, 5, 6),
        (20, 6, NONE),
        (21, NONE, 7),
        (22, 7, 8),
        (23, 8, 9),
        (24, 9, NONE),
    ],
    parallel_rings: &[(1, 1), (17, 4), (20, 10), (12, 12), (2, 1), (13, 4), (24, 10), (11, 12)],
    in0_out1: &[(1, 5), (2, 2), (3, 3), (4, 7), (6, 6), (7, 11), (8, 8), (9, 9)],
    in1_out0: &[],
    inputs: &[(1, N), (16, E), (17, L), (21, W), (12, S)],
    outputs: &[(2, L), (3, N), (13, W), (24, E), (10, S)],
};

pub const OXY: RouterTable = RouterTable {
    name: "OXY",
    rings: &[
        (1, P, 2, 1, L),
        (2, C, 16, 3, N),
        (3, P, 14, 18, W),
        (4, C, 15, 5, S),
        (5, C, 19, 4, L),
        (6, C, 21, 6, N),
        (7, C, 20, 8, S),
        (8, C, 24, 7, L),
        (9, C, 26, 9, N),
        (10, P, 23, 27, E),
        (11, C, 25, 11, S),
        (12, P, 12, 28, L),
    ],
    crossings: &[
        (1, 14, 4, 15, 1),
        (2, 15, 2, 16, 5),
        (3, 16, 6, 17, 3),
        (4, 19, 7, 18, 4),
        (5, 20, 5, 19, 8),
        (6, 21, 9, 20, 6),
        (7, 22, 17, 21, 23),
        (8, 24, 10, 25, 7),
        (9, 25, 8, 26, 11),
        (10, 26, 12, 27, 9),
        (11, 28, 11, 10, 13),
    ],
    waveguides: &[
        (1, 1, NONE),
        (2, NONE, 2),
        (3, 3, NONE),
        (4, 4, 1),
        (5, 2, 5),
        (6, 6, 3),
        (7, 8, 4),
        (8, 5, 9),
        (9, 10, 6),
        (10, 11, 8),
        (11, 9, 11),
        (12, NONE, 10),
        (13, 11, NONE),
        (14, NONE, 1),
        (15, 1, 2),
        (16, 2, 3),
        (17, 3, 7),
        (18, 4, NONE),
        (19, 5, 4),
        (20, 6, 5),
        (21, 7, 6),
        (22, NONE, 7),
        (23, 7, NONE),
        (24, NONE, 8),
        (25, 8, 9),
        (26, 9, 10),
        (27, 10, NONE),
        (28, NONE, 11),
    ],
    parallel_rings: &[(2, 1), (12, 12), (14, 3), (23, 10), (1, 1), (28, 12), (18, 3), (27, 10)],
    in0_out1: &[(2, 4), (3, 2), (4, 5), (5, 7), (6, 6), (8, 8), (9, 11), (10, 9)],
    in1_out0: &[],
    inputs: &[(14, L), (2, N), (22, E), (12, S), (24, W)],
    outputs: &[(1, L), (3, N), (27, E), (13, S), (18, W)],
};

pub const ODOR: RouterTable = RouterTable {
    name: "ODOR",
    rings: &[
        (1, C, 5, 4, L),
        (2, C, 32, 9, N),
        (3, P, 31, 36, W),
        (4, C, 31, 12, S),
        (5, C, 38, 13, N),
        (6, C, 40, 28, L),
        (7, C, 37, 16, S),
        (8, C, 41, 14, L),
        (9, C, 43, 22, S),
        (10, C, 44, 17, N),
        (11, P, 18, 45, E),
        (12, C, 25, 46, L),
    ],
    crossings: &[
        (1, 26, 5, 4, 7),
        (2, 27, 7, 3, 8),
        (3, 28, 9, 27, 6),
        (4, 29, 10, 30, 1),
        (5, 30, 11, 31, 2),
        (6, 31, 8, 32, 12),
        (7, 32, 13, 33, 9),
        (8, 35, 14, 34, 10),
        (9, 36, 15, 35, 11),
        (10, 37, 12, 36, 16),
        (11, 38, 17, 37, 13),
        (12, 39, 33, 38, 18),
        (13, 40, 19, 39, 28),
        (14, 41, 20, 42, 14),
        (15, 42, 21, 43, 15),
        (16, 43, 16, 44, 22),
        (17, 44, 23, 45, 17),
        (18, 46, 22, 21, 24),
        (19, 47, 25, 46, 23),
    ],
    waveguides: &[
        (1, 4, NONE),
        (2, 5, NONE),
        (3, 2, NONE),
        (4, 1, NONE),
        (5, NONE, 1),
        (6, 3, NONE),
        (7, 1, 2),
        (8, 2, 6),
        (9, 7, 3),
        (10, 8, 4),
        (11, 9, 5),
        (12, 6, 10),
        (13, 11, 7),
        (14, 14, 8),
        (15, 15, 9),
        (16, 10, 16),
        (17, 17, 11),
        (18, 12, NONE),
        (19, NONE, 13),
        (20, NONE, 14),
        (21, 18, 15),
        (22, 16, 18),
        (23, 19, 17),
        (24, 18, NONE),
        (25, NONE, 19),
        (26, NONE, 1),
        (27, 3, 2),
        (28, 13, 3),
        (29, NONE, 4),
        (30, 4, 5),
        (31, 5, 6),
        (32, 6, 7),
        (33, 7, 12),
        (34, 8, NONE),
        (35, 9, 8),
        (36, 10, 9),
        (37, 11, 10),
        (38, 12, 11),
        (39, 13, 12),
        (40, NONE, 13),
        (41, NONE, 14),
        (42, 14, 15),
        (43, 15, 16),
        (44, 16, 17),
        (45, 17, NONE),
        (46, 19, 18),
        (47, NONE, 19),
    ],
    parallel_rings: &[(31, 3), (18, 11), (36, 3), (45, 11)],
    in0_out1: &[(6, 4), (7, 2), (10, 7), (11, 5), (13, 6), (14, 8), (16, 9), (17, 10)],
    in1_out0: &[(1, 1), (19, 12)],
    inputs: &[(29, L), (5, N), (40, E), (41, W), (25, S)],
    outputs: &[(1, L), (2, L), (3, L), (4, L), (6, N), (45, E), (34, W), (24, S)],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::router::RouterKind;

    #[test]
    fn tables_assemble() {
        for table in [&CRUX, &OXY, &ODOR] {
            let blocks = table.assemble().unwrap();
            assert_eq!(blocks.rings.len(), table.rings.len());
            assert_eq!(blocks.crossings.len(), table.crossings.len());
            assert_eq!(blocks.waveguides.len(), table.waveguides.len());
        }
    }

    #[test]
    fn every_kind_builds_a_router() {
        let config = Configuration::default();
        for kind in RouterKind::ALL {
            let router = kind.build(&config);
            assert!(router.is_ok(), "{} fails to build: {:?}", kind, router.err());
            let router = router.unwrap();
            assert_eq!(router.name(), kind.name());
            assert!(router.is_connected(Port::Local, Port::East));
        }
    }

    #[test]
    fn every_port_has_one_entry() {
        for table in [&CRUX, &OXY, &ODOR] {
            let blocks = table.assemble().unwrap();
            for port in Port::ALL {
                let entries = blocks.waveguides.iter().filter(|(_, w)| w.input_port() == Some(port)).count();
                assert_eq!(entries, 1, "{} port {}", table.name, port);
            }
        }
    }

    #[test]
    fn odor_ejects_on_several_waveguides() {
        let blocks = ODOR.assemble().unwrap();
        let local = blocks.waveguides.iter().filter(|(_, w)| w.output_port() == Some(Port::Local)).count();
        assert_eq!(local, 4);
    }
}
