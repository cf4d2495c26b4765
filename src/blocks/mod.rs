//! Building blocks of the optical fabric: waveguides, crossings, microring
//! resonators and tiles, linked by dense integer identifiers.

use crate::{NocError, Port, Result, NUM_PORTS};

/// Dense identifier-indexed storage. Identifiers need not start at zero;
/// unused slots stay empty.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    kind: &'static str,
}

impl<T> Arena<T> {
    pub fn new(kind: &'static str) -> Self {
        Self { slots: Vec::new(), kind }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn insert(&mut self, owner: &str, id: usize, value: T) -> Result<()> {
        if id >= self.slots.len() {
            self.slots.resize_with(id + 1, || None);
        }
        if self.slots[id].is_some() {
            return Err(NocError::DuplicateBlock { owner: owner.to_string(), kind: self.kind, id });
        }
        self.slots[id] = Some(value);
        Ok(())
    }

    /// Appends at the next free identifier and returns it.
    pub fn push(&mut self, value: T) -> usize {
        self.slots.push(Some(value));
        self.slots.len() - 1
    }

    pub fn get(&self, id: usize) -> Option<&T> {
        self.slots.get(id).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.slots.get_mut(id).and_then(|slot| slot.as_mut())
    }

    /// Lookup that reports the owner of the graph when the id is dangling.
    pub fn fetch(&self, owner: &str, id: usize) -> Result<&T> {
        self.get(id).ok_or_else(|| NocError::MissingBlock { owner: owner.to_string(), kind: self.kind, id })
    }

    pub fn fetch_mut(&mut self, owner: &str, id: usize) -> Result<&mut T> {
        let kind = self.kind;
        self.get_mut(id).ok_or_else(|| NocError::MissingBlock { owner: owner.to_string(), kind, id })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(id, slot)| slot.as_ref().map(|value| (id, value)))
    }
}

/// What a waveguide end is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// A router port (router-internal graphs).
    Port(Port),
    /// A tile (inter-tile wiring).
    Tile(usize),
    Crossing(usize),
}

#[derive(Debug, Clone)]
pub struct Waveguide {
    pub id: usize,
    pub input: Option<Endpoint>,
    pub output: Option<Endpoint>,
    /// Parallel switching rings threaded on this waveguide, in order.
    pub rings: Vec<usize>,
    /// Physical length in cm; zero inside routers.
    pub length: f64,
}

impl Waveguide {
    pub fn new(id: usize) -> Self {
        Self { id, input: None, output: None, rings: Vec::new(), length: 0.0 }
    }

    pub fn with_length(id: usize, length: f64) -> Self {
        Self { length, ..Self::new(id) }
    }

    pub fn input_port(&self) -> Option<Port> {
        match self.input {
            Some(Endpoint::Port(port)) => Some(port),
            _ => None,
        }
    }

    pub fn output_port(&self) -> Option<Port> {
        match self.output {
            Some(Endpoint::Port(port)) => Some(port),
            _ => None,
        }
    }

    pub fn input_tile(&self) -> Option<usize> {
        match self.input {
            Some(Endpoint::Tile(tile)) => Some(tile),
            _ => None,
        }
    }

    pub fn output_tile(&self) -> Option<usize> {
        match self.output {
            Some(Endpoint::Tile(tile)) => Some(tile),
            _ => None,
        }
    }

    pub fn input_crossing(&self) -> Option<usize> {
        match self.input {
            Some(Endpoint::Crossing(crossing)) => Some(crossing),
            _ => None,
        }
    }

    pub fn output_crossing(&self) -> Option<usize> {
        match self.output {
            Some(Endpoint::Crossing(crossing)) => Some(crossing),
            _ => None,
        }
    }

    /// Position of `ring` among this waveguide's parallel rings.
    pub fn ring_position(&self, ring: usize) -> Option<usize> {
        self.rings.iter().position(|&r| r == ring)
    }
}

/// One of the two straight-through arms of a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    Zero,
    One,
}

/// A waveguide crossing. Arm 0 runs input0 -> output0, arm 1 runs
/// input1 -> output1; optional rings sit on the two diagonals.
#[derive(Debug, Clone, Default)]
pub struct Crossing {
    pub id: usize,
    pub inputs: [Option<usize>; 2],
    pub outputs: [Option<usize>; 2],
    pub ring_in0_out1: Option<usize>,
    pub ring_in1_out0: Option<usize>,
}

impl Crossing {
    pub fn new(id: usize, input0: usize, input1: usize, output0: usize, output1: usize) -> Self {
        Self {
            id,
            inputs: [Some(input0), Some(input1)],
            outputs: [Some(output0), Some(output1)],
            ring_in0_out1: None,
            ring_in1_out0: None,
        }
    }

    /// A crossing whose arms are filled in later by the topology builder.
    pub fn unwired(id: usize) -> Self {
        Self { id, ..Self::default() }
    }

    pub fn input(&self, arm: Arm) -> Option<usize> {
        self.inputs[arm as usize]
    }

    pub fn output(&self, arm: Arm) -> Option<usize> {
        self.outputs[arm as usize]
    }

    /// Arm entered by `waveguide`, if it feeds this crossing.
    pub fn arm_of_input(&self, waveguide: usize) -> Option<Arm> {
        if self.inputs[0] == Some(waveguide) {
            Some(Arm::Zero)
        } else if self.inputs[1] == Some(waveguide) {
            Some(Arm::One)
        } else {
            None
        }
    }

    /// Arm left through `waveguide`, if it leaves this crossing.
    pub fn arm_of_output(&self, waveguide: usize) -> Option<Arm> {
        if self.outputs[0] == Some(waveguide) {
            Some(Arm::Zero)
        } else if self.outputs[1] == Some(waveguide) {
            Some(Arm::One)
        } else {
            None
        }
    }

    /// Diagonal ring reachable from the given input arm.
    pub fn diagonal_ring(&self, from: Arm) -> Option<usize> {
        match from {
            Arm::Zero => self.ring_in0_out1,
            Arm::One => self.ring_in1_out0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    /// PPSE: threaded on a straight waveguide.
    Parallel,
    /// CPSE: on a crossing diagonal.
    Crossing,
}

#[derive(Debug, Clone)]
pub struct MicroringResonator {
    pub id: usize,
    pub kind: RingKind,
    pub input_waveguide: usize,
    pub output_waveguide: usize,
    /// Output port the ring steers toward when resonant.
    pub direction_on: Port,
}

impl MicroringResonator {
    pub fn new(id: usize, kind: RingKind, input_waveguide: usize, output_waveguide: usize, direction_on: Port) -> Self {
        Self { id, kind, input_waveguide, output_waveguide, direction_on }
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub id: usize,
    pub row: usize,
    pub column: usize,
    /// Waveguide arriving through each port.
    pub in_waveguides: [Option<usize>; NUM_PORTS],
    /// Waveguide leaving through each port.
    pub out_waveguides: [Option<usize>; NUM_PORTS],
}

impl Tile {
    pub fn new(id: usize, row: usize, column: usize) -> Self {
        Self { id, row, column, in_waveguides: [None; NUM_PORTS], out_waveguides: [None; NUM_PORTS] }
    }

    pub fn in_waveguide(&self, port: Port) -> Option<usize> {
        self.in_waveguides[port.index()]
    }

    pub fn out_waveguide(&self, port: Port) -> Option<usize> {
        self.out_waveguides[port.index()]
    }

    /// Port through which `waveguide` arrives at this tile.
    pub fn arrival_port(&self, waveguide: usize) -> Option<Port> {
        Port::ALL.into_iter().find(|port| self.in_waveguides[port.index()] == Some(waveguide))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_keeps_sparse_identifiers() {
        let mut arena = Arena::new("waveguide");
        arena.insert("test", 3, "c").unwrap();
        arena.insert("test", 1, "a").unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(0), None);
        assert_eq!(arena.fetch("test", 3).unwrap(), &"c");
        assert_eq!(arena.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn arena_rejects_duplicates_and_dangling_ids() {
        let mut arena = Arena::new("crossing");
        arena.insert("r", 2, 0).unwrap();
        assert!(matches!(arena.insert("r", 2, 1), Err(NocError::DuplicateBlock { id: 2, .. })));
        assert!(matches!(arena.fetch("r", 7), Err(NocError::MissingBlock { id: 7, kind: "crossing", .. })));
    }

    #[test]
    fn crossing_arms_resolve_by_waveguide() {
        let mut crossing = Crossing::new(1, 14, 1, 13, 4);
        crossing.ring_in0_out1 = Some(5);
        assert_eq!(crossing.arm_of_input(14), Some(Arm::Zero));
        assert_eq!(crossing.arm_of_input(1), Some(Arm::One));
        assert_eq!(crossing.arm_of_output(4), Some(Arm::One));
        assert_eq!(crossing.arm_of_input(99), None);
        assert_eq!(crossing.diagonal_ring(Arm::Zero), Some(5));
        assert_eq!(crossing.diagonal_ring(Arm::One), None);
    }

    #[test]
    fn waveguide_endpoints_are_typed() {
        let mut waveguide = Waveguide::new(4);
        waveguide.input = Some(Endpoint::Port(Port::North));
        waveguide.output = Some(Endpoint::Crossing(2));
        waveguide.rings = vec![7, 9];
        assert_eq!(waveguide.input_port(), Some(Port::North));
        assert_eq!(waveguide.output_crossing(), Some(2));
        assert_eq!(waveguide.output_port(), None);
        assert_eq!(waveguide.input_tile(), None);
        assert_eq!(waveguide.ring_position(9), Some(1));
    }

    #[test]
    fn tile_reports_arrival_port() {
        let mut tile = Tile::new(5, 1, 1);
        tile.in_waveguides[Port::West.index()] = Some(12);
        assert_eq!(tile.arrival_port(12), Some(Port::West));
        assert_eq!(tile.arrival_port(13), None);
    }
}
