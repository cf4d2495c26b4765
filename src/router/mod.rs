//! Optical router cost model.
//!
//! A router is a fixed graph of waveguides, crossings and microrings. At
//! construction every port pair is traced through the graph once; the
//! resulting element lists drive the connectivity, loss and crosstalk
//! matrices, which are then immutable.

pub mod catalog;

use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};

use crate::blocks::{Arena, Arm, Crossing, Endpoint, MicroringResonator, RingKind, Waveguide};
use crate::config::{normalize, Configuration, CrosstalkCoefficients, LossCoefficients};
use crate::decibel::{accumulate_db, sum_db};
use crate::{NocError, Port, Result, NUM_PORTS};

/// Router variants available in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterKind {
    Crux,
    Oxy,
    Odor,
}

impl RouterKind {
    pub const ALL: [RouterKind; 3] = [RouterKind::Crux, RouterKind::Oxy, RouterKind::Odor];

    pub fn name(self) -> &'static str {
        match self {
            RouterKind::Crux => "Crux",
            RouterKind::Oxy => "OXY",
            RouterKind::Odor => "ODOR",
        }
    }

    pub fn blocks(self) -> Result<RouterBlocks> {
        match self {
            RouterKind::Crux => catalog::CRUX.assemble(),
            RouterKind::Oxy => catalog::OXY.assemble(),
            RouterKind::Odor => catalog::ODOR.assemble(),
        }
    }

    pub fn build(self, config: &Configuration) -> Result<Router> {
        Router::new(self.name(), self.blocks()?, &config.loss, &config.crosstalk)
    }
}

impl fmt::Display for RouterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RouterKind {
    type Err = NocError;

    fn from_str(s: &str) -> Result<Self> {
        RouterKind::ALL
            .into_iter()
            .find(|kind| normalize(kind.name()) == normalize(s))
            .ok_or_else(|| NocError::Configuration(format!("unknown router '{}'", s)))
    }
}

/// The raw graph of one router.
#[derive(Debug, Clone)]
pub struct RouterBlocks {
    pub rings: Arena<MicroringResonator>,
    pub crossings: Arena<Crossing>,
    pub waveguides: Arena<Waveguide>,
}

impl RouterBlocks {
    pub fn new() -> Self {
        Self {
            rings: Arena::new("microring"),
            crossings: Arena::new("crossing"),
            waveguides: Arena::new("waveguide"),
        }
    }
}

impl Default for RouterBlocks {
    fn default() -> Self {
        Self::new()
    }
}

/// One building block on a traced path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Waveguide(usize),
    Crossing(usize),
    Ring(usize),
}

#[derive(Debug)]
struct Trace {
    elements: Vec<Element>,
    arrived: Port,
}

#[derive(Debug, Clone)]
pub struct Router {
    name: String,
    blocks: RouterBlocks,
    loss_coefficients: LossCoefficients,
    crosstalk_coefficients: CrosstalkCoefficients,
    entries: [usize; NUM_PORTS],
    paths: Vec<Option<Vec<Element>>>,
    loss: Vec<f64>,
    crosstalk: Vec<Option<f64>>,
    valid: Vec<bool>,
}

fn pair(p_in: Port, p_out: Port) -> usize {
    p_in.index() * NUM_PORTS + p_out.index()
}

fn quad(p_in: Port, p_out: Port, p: Port, q: Port) -> usize {
    pair(p_in, p_out) * NUM_PORTS * NUM_PORTS + pair(p, q)
}

impl Router {
    pub fn new(
        name: &str,
        blocks: RouterBlocks,
        loss: &LossCoefficients,
        crosstalk: &CrosstalkCoefficients,
    ) -> Result<Self> {
        let entries = Self::check_architecture(name, &blocks)?;
        let mut router = Self {
            name: name.to_string(),
            blocks,
            loss_coefficients: *loss,
            crosstalk_coefficients: *crosstalk,
            entries,
            paths: vec![None; NUM_PORTS * NUM_PORTS],
            loss: vec![0.0; NUM_PORTS * NUM_PORTS],
            crosstalk: vec![None; NUM_PORTS.pow(4)],
            valid: vec![false; NUM_PORTS.pow(4)],
        };
        router.trace_all()?;
        router.compute_loss_matrix()?;
        router.compute_crosstalk_matrix()?;
        info!(
            "Router {}: {} waveguides, {} crossings, {} rings",
            router.name,
            router.blocks.waveguides.len(),
            router.blocks.crossings.len(),
            router.blocks.rings.len()
        );
        Ok(router)
    }

    /// Checks that every identifier resolves, every open waveguide output is
    /// drained by a parallel ring and every port has exactly one entry
    /// waveguide.
    fn check_architecture(name: &str, blocks: &RouterBlocks) -> Result<[usize; NUM_PORTS]> {
        let malformed = |message: String| NocError::MalformedGraph { owner: name.to_string(), message };
        let mut entries = [None; NUM_PORTS];

        for (id, waveguide) in blocks.waveguides.iter() {
            // An open input carries no light: a ring drop target or an idle
            // crossing arm. An open output must be drained by a parallel ring.
            if waveguide.output.is_none() && !Self::drained_by_ring(name, blocks, id, waveguide)? {
                return Err(malformed(format!("waveguide {} has a dangling output", id)));
            }
            if let Some(crossing) = waveguide.input_crossing() {
                let crossing = blocks.crossings.fetch(name, crossing)?;
                if crossing.arm_of_output(id).is_none() {
                    return Err(malformed(format!("crossing {} does not list waveguide {} as an output", crossing.id, id)));
                }
            }
            if let Some(crossing) = waveguide.output_crossing() {
                let crossing = blocks.crossings.fetch(name, crossing)?;
                if crossing.arm_of_input(id).is_none() {
                    return Err(malformed(format!("crossing {} does not list waveguide {} as an input", crossing.id, id)));
                }
            }
            for &ring in &waveguide.rings {
                blocks.rings.fetch(name, ring)?;
            }
            if let Some(Endpoint::Tile(_)) = waveguide.input {
                return Err(malformed(format!("waveguide {} starts at a tile inside a router", id)));
            }
            if let Some(Endpoint::Tile(_)) = waveguide.output {
                return Err(malformed(format!("waveguide {} ends at a tile inside a router", id)));
            }
            if let Some(port) = waveguide.input_port() {
                if let Some(previous) = entries[port.index()].replace(id) {
                    return Err(malformed(format!("port {} enters through waveguides {} and {}", port, previous, id)));
                }
            }
        }

        for (id, crossing) in blocks.crossings.iter() {
            for waveguide in crossing.inputs.iter().chain(crossing.outputs.iter()) {
                let waveguide = waveguide.ok_or_else(|| malformed(format!("crossing {} has an unconnected arm", id)))?;
                blocks.waveguides.fetch(name, waveguide)?;
            }
            for ring in [crossing.ring_in0_out1, crossing.ring_in1_out0].into_iter().flatten() {
                blocks.rings.fetch(name, ring)?;
            }
        }

        for (_, ring) in blocks.rings.iter() {
            blocks.waveguides.fetch(name, ring.input_waveguide)?;
            blocks.waveguides.fetch(name, ring.output_waveguide)?;
        }

        let mut resolved = [0; NUM_PORTS];
        for port in Port::ALL {
            resolved[port.index()] = entries[port.index()]
                .ok_or_else(|| malformed(format!("input port {} has no entry waveguide", port)))?;
        }
        Ok(resolved)
    }

    fn drained_by_ring(name: &str, blocks: &RouterBlocks, id: usize, waveguide: &Waveguide) -> Result<bool> {
        for &ring in &waveguide.rings {
            let ring = blocks.rings.fetch(name, ring)?;
            if ring.kind == RingKind::Parallel && ring.input_waveguide == id {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Follows a signal entering at `p_in` whose rings are tuned toward
    /// `p_out` until it leaves the router.
    fn trace(&self, p_in: Port, p_out: Port) -> Result<Trace> {
        let name = self.name.as_str();
        let mut elements = Vec::new();
        let mut current = self.entries[p_in.index()];
        let bound = self.blocks.waveguides.len();

        for _ in 0..=bound {
            elements.push(Element::Waveguide(current));
            let waveguide = self.blocks.waveguides.fetch(name, current)?;
            if let Some(arrived) = waveguide.output_port() {
                return Ok(Trace { elements, arrived });
            }

            // A parallel ring tuned toward the target drops the signal
            let mut dropped = None;
            for &ring_id in &waveguide.rings {
                let ring = self.blocks.rings.fetch(name, ring_id)?;
                if ring.direction_on == p_out && ring.output_waveguide != current {
                    dropped = Some(ring);
                }
            }

            let next = if let Some(ring) = dropped {
                elements.push(Element::Ring(ring.id));
                ring.output_waveguide
            } else if let Some(crossing_id) = waveguide.output_crossing() {
                let crossing = self.blocks.crossings.fetch(name, crossing_id)?;
                let arm = crossing.arm_of_input(current).ok_or_else(|| NocError::MalformedGraph {
                    owner: name.to_string(),
                    message: format!("crossing {} is not fed by waveguide {}", crossing_id, current),
                })?;
                let diagonal = match crossing.diagonal_ring(arm) {
                    Some(ring_id) => Some(self.blocks.rings.fetch(name, ring_id)?).filter(|ring| ring.direction_on == p_out),
                    None => None,
                };
                match diagonal {
                    Some(ring) => {
                        elements.push(Element::Ring(ring.id));
                        ring.output_waveguide
                    }
                    None => {
                        elements.push(Element::Crossing(crossing_id));
                        crossing.output(arm).ok_or_else(|| NocError::MalformedGraph {
                            owner: name.to_string(),
                            message: format!("crossing {} has an unconnected output", crossing_id),
                        })?
                    }
                }
            } else {
                return Err(NocError::DeadEnd { owner: name.to_string(), input: p_in, output: p_out, waveguide: current });
            };
            current = next;
        }
        Err(NocError::Cycle { owner: name.to_string(), input: p_in, output: p_out, waveguide: current })
    }

    fn trace_all(&mut self) -> Result<()> {
        let mut missing = Vec::new();
        for p_in in Port::ALL {
            for p_out in Port::ALL {
                if p_in == p_out {
                    continue;
                }
                let trace = self.trace(p_in, p_out)?;
                if trace.arrived == p_out {
                    debug!("{}: {} -> {} crosses {} blocks", self.name, p_in, p_out, trace.elements.len());
                    self.paths[pair(p_in, p_out)] = Some(trace.elements);
                } else {
                    missing.push(format!("{}->{} (arrives {})", p_in, p_out, trace.arrived));
                }
            }
        }
        if !missing.is_empty() {
            warn!("Router {} has no path for {}", self.name, missing.join(", "));
        }
        Ok(())
    }

    fn compute_loss_matrix(&mut self) -> Result<()> {
        for p_in in Port::ALL {
            for p_out in Port::ALL {
                if let Some(path) = &self.paths[pair(p_in, p_out)] {
                    self.loss[pair(p_in, p_out)] = self.path_loss(path)?;
                }
            }
        }
        Ok(())
    }

    /// Loss accumulated along a list of building blocks.
    fn path_loss(&self, path: &[Element]) -> Result<f64> {
        let name = self.name.as_str();
        let l = &self.loss_coefficients;
        let mut loss = 0.0;

        for (index, element) in path.iter().enumerate() {
            let previous = index.checked_sub(1).map(|i| path[i]);
            let next = path.get(index + 1).copied();
            match *element {
                Element::Waveguide(id) => {
                    let waveguide = self.blocks.waveguides.fetch(name, id)?;
                    if waveguide.rings.is_empty() {
                        continue;
                    }
                    // Rings passed while off: those between the ring the
                    // signal came from and the ring it leaves through.
                    let mut count = 0i64;
                    let mut first = 0usize;
                    let mut last = waveguide.rings.len() - 1;
                    if let Some(Element::Ring(ring)) = previous {
                        if self.blocks.rings.fetch(name, ring)?.kind == RingKind::Parallel {
                            count -= 1;
                            if let Some(position) = waveguide.ring_position(ring) {
                                first = position;
                            }
                        }
                    }
                    if let Some(Element::Ring(ring)) = next {
                        if self.blocks.rings.fetch(name, ring)?.kind == RingKind::Parallel {
                            count -= 1;
                            if let Some(position) = waveguide.ring_position(ring) {
                                last = position;
                            }
                        }
                    }
                    count += last as i64 - first as i64 + 1;
                    loss += l.ppse_off * count as f64;
                }
                Element::Crossing(id) => {
                    let crossing = self.blocks.crossings.fetch(name, id)?;
                    if let Some(Element::Waveguide(entering)) = previous {
                        match crossing.arm_of_input(entering) {
                            Some(Arm::Zero) if crossing.ring_in0_out1.is_some() => loss += l.ppse_off,
                            Some(Arm::One) if crossing.ring_in1_out0.is_some() => loss += l.ppse_off,
                            _ => {}
                        }
                    }
                    loss += l.crossing;
                    if let Some(Element::Waveguide(leaving)) = next {
                        match crossing.arm_of_output(leaving) {
                            Some(Arm::Zero) if crossing.ring_in1_out0.is_some() => loss += l.ppse_off,
                            Some(Arm::One) if crossing.ring_in0_out1.is_some() => loss += l.ppse_off,
                            _ => {}
                        }
                    }
                }
                Element::Ring(id) => {
                    loss += match self.blocks.rings.fetch(name, id)?.kind {
                        RingKind::Parallel => l.ppse_on,
                        RingKind::Crossing => l.cpse_on,
                    };
                }
            }
        }
        Ok(loss)
    }

    fn compute_crosstalk_matrix(&mut self) -> Result<()> {
        for p_in in Port::ALL {
            for p_out in Port::ALL {
                let Some(signal) = &self.paths[pair(p_in, p_out)] else { continue };
                for p in Port::ALL {
                    for q in Port::ALL {
                        if p == p_in || q == p_out {
                            continue;
                        }
                        let Some(noise) = &self.paths[pair(p, q)] else { continue };
                        if shares_waveguide(signal, noise) {
                            continue;
                        }
                        let crosstalk = self.path_crosstalk(signal, noise)?;
                        self.crosstalk[quad(p_in, p_out, p, q)] = crosstalk;
                        self.valid[quad(p_in, p_out, p, q)] = true;
                    }
                }
            }
        }
        Ok(())
    }

    /// Window of ring positions on `waveguide` that the path passes: bounded
    /// by the rings the path enters from and leaves through.
    fn ring_window(path: &[Element], index: usize, waveguide: &Waveguide) -> (usize, usize) {
        let mut window = (0, waveguide.rings.len().saturating_sub(1));
        if let Some(Element::Ring(ring)) = index.checked_sub(1).map(|i| path[i]) {
            if let Some(position) = waveguide.ring_position(ring) {
                window.0 = position;
            }
        }
        if let Some(Element::Ring(ring)) = path.get(index + 1) {
            if let Some(position) = waveguide.ring_position(*ring) {
                window.1 = position;
            }
        }
        window
    }

    /// Noise that the `noise` path leaks into the `signal` path, or `None`
    /// when they share no building block.
    fn path_crosstalk(&self, signal: &[Element], noise: &[Element]) -> Result<Option<f64>> {
        let name = self.name.as_str();
        let l = &self.loss_coefficients;
        let k = &self.crosstalk_coefficients;
        let mut total = None;

        for (i, element_i) in signal.iter().enumerate() {
            for (j, element_j) in noise.iter().enumerate() {
                match (*element_i, *element_j) {
                    (Element::Waveguide(a), Element::Waveguide(b)) => {
                        if a == b {
                            return Err(NocError::MalformedGraph {
                                owner: name.to_string(),
                                message: format!("simultaneous paths share waveguide {}", a),
                            });
                        }
                        let waveguide_a = self.blocks.waveguides.fetch(name, a)?;
                        let waveguide_b = self.blocks.waveguides.fetch(name, b)?;
                        for &ring in &waveguide_a.rings {
                            if !waveguide_b.rings.contains(&ring) {
                                continue;
                            }
                            let (a_first, a_last) = Self::ring_window(signal, i, waveguide_a);
                            let (b_first, b_last) = Self::ring_window(noise, j, waveguide_b);
                            let on_a = waveguide_a.ring_position(ring).map_or(false, |p| p >= a_first && p <= a_last);
                            let on_b = waveguide_b.ring_position(ring).map_or(false, |p| p >= b_first && p <= b_last);
                            if !(on_a && on_b) {
                                continue;
                            }
                            let mut noise_to_ring = noise[..=j].to_vec();
                            noise_to_ring.push(Element::Ring(ring));
                            let loss_noise = self.path_loss(&noise_to_ring)? - l.ppse_on;
                            let mut ring_to_port = vec![Element::Ring(ring)];
                            ring_to_port.extend_from_slice(&signal[i..]);
                            let loss_to_port = self.path_loss(&ring_to_port)? - l.ppse_on;
                            total = accumulate_db(total, loss_noise + k.ppse_off + loss_to_port);
                        }
                    }
                    (Element::Crossing(a), Element::Crossing(b)) if a == b => {
                        let crossing = self.blocks.crossings.fetch(name, a)?;
                        let loss_noise = if j > 0 { self.path_loss(&noise[..j])? } else { 0.0 };
                        let loss_to_port = if i + 1 < signal.len() { self.path_loss(&signal[i + 1..])? } else { 0.0 };
                        let base = loss_noise + loss_to_port;
                        let mut component = base + k.crossing;
                        let entry_arm = match j.checked_sub(1).map(|p| noise[p]) {
                            Some(Element::Waveguide(entering)) => crossing.arm_of_input(entering),
                            _ => None,
                        };
                        if entry_arm.and_then(|arm| crossing.diagonal_ring(arm)).is_some() {
                            component = sum_db(component, base + k.ppse_off);
                        }
                        total = accumulate_db(total, component);
                    }
                    (Element::Ring(a), Element::Ring(b)) if a == b => {
                        return Err(NocError::MalformedGraph {
                            owner: name.to_string(),
                            message: format!("simultaneous paths share microring {}", a),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(total)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_ports(&self) -> usize {
        NUM_PORTS
    }

    pub fn blocks(&self) -> &RouterBlocks {
        &self.blocks
    }

    pub fn is_connected(&self, p_in: Port, p_out: Port) -> bool {
        self.paths[pair(p_in, p_out)].is_some()
    }

    /// Building blocks crossed from `p_in` to `p_out`, if connected.
    pub fn path(&self, p_in: Port, p_out: Port) -> Option<&[Element]> {
        self.paths[pair(p_in, p_out)].as_deref()
    }

    /// Port-to-port loss in dB; zero for identity and unconnected pairs.
    pub fn loss(&self, p_in: Port, p_out: Port) -> f64 {
        self.loss[pair(p_in, p_out)]
    }

    /// Crosstalk that communication `p -> q` injects into `p_in -> p_out`.
    pub fn crosstalk(&self, p_in: Port, p_out: Port, p: Port, q: Port) -> Option<f64> {
        self.crosstalk[quad(p_in, p_out, p, q)]
    }

    /// Whether two communications can cross this router at the same time.
    pub fn is_valid_simultaneous(&self, p_in0: Port, p_out0: Port, p_in1: Port, p_out1: Port) -> bool {
        if p_in0 == p_in1 || p_out0 == p_out1 {
            return false;
        }
        self.valid[quad(p_in0, p_out0, p_in1, p_out1)]
    }

    pub fn unconnected_pairs(&self) -> Vec<(Port, Port)> {
        let mut pairs = Vec::new();
        for p_in in Port::ALL {
            for p_out in Port::ALL {
                if p_in != p_out && !self.is_connected(p_in, p_out) {
                    pairs.push((p_in, p_out));
                }
            }
        }
        pairs
    }
}

fn shares_waveguide(a: &[Element], b: &[Element]) -> bool {
    a.iter().any(|x| matches!(x, Element::Waveguide(_)) && b.contains(x))
}
