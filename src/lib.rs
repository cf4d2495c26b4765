//lib.rs
pub mod decibel;
pub mod blocks;
pub mod config;
pub mod router;
pub mod routing;
pub mod topology;
pub mod architecture;
pub mod application;
pub mod mapping;
pub mod strategy;
pub mod parser;
pub mod generator;

use std::fmt;

pub use application::{Application, CommunicationTask};
pub use architecture::{NetworkPath, NocArchitecture};
pub use config::{Configuration, Objective, StrategyKind};
pub use mapping::{Evaluation, Evaluator, Mapping};
pub use router::{Router, RouterKind};
pub use routing::RoutingKind;
pub use topology::{Topology, TopologyKind};

pub const NUM_PORTS: usize = 5;           // Local plus four compass ports
pub const MUTATION_PROBABILITY: f64 = 0.2; // Per offspring in the genetic search

/// A router/tile port. Index 0 is shared by injection (as an input) and
/// ejection (as an output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Port {
    Local = 0,
    North = 1,
    East = 2,
    South = 3,
    West = 4,
}

impl Port {
    pub const ALL: [Port; NUM_PORTS] = [Port::Local, Port::North, Port::East, Port::South, Port::West];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Port> {
        Port::ALL.get(index).copied()
    }

    /// Port on the far side of a link leaving through `self`.
    pub fn antipode(self) -> Option<Port> {
        match self {
            Port::North => Some(Port::South),
            Port::East => Some(Port::West),
            Port::South => Some(Port::North),
            Port::West => Some(Port::East),
            Port::Local => None,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Port::Local => "local",
            Port::North => "north",
            Port::East => "east",
            Port::South => "south",
            Port::West => "west",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NocError {
    #[error("{kind} {id} is not defined in {owner}")]
    MissingBlock { owner: String, kind: &'static str, id: usize },

    #[error("{kind} {id} is defined twice in {owner}")]
    DuplicateBlock { owner: String, kind: &'static str, id: usize },

    #[error("{owner}: {message}")]
    MalformedGraph { owner: String, message: String },

    #[error("{owner}: path from {input} toward {output} dead-ends at waveguide {waveguide}")]
    DeadEnd { owner: String, input: Port, output: Port, waveguide: usize },

    #[error("{owner}: path from {input} toward {output} does not terminate (cycle through waveguide {waveguide})")]
    Cycle { owner: String, input: Port, output: Port, waveguide: usize },

    #[error("router {router} cannot connect {input} to {output}, required by route {src} -> {dst}")]
    UnconnectedPorts { router: String, input: Port, output: Port, src: usize, dst: usize },

    #[error("route {src} -> {dst}: hop {from} -> {to} arrives on {arrived}, routing expects {expected}")]
    WrongArrivalPort { src: usize, dst: usize, from: usize, to: usize, arrived: Port, expected: Port },

    #[error("route {src} -> {dst} does not reach its destination")]
    RouteDiverges { src: usize, dst: usize },

    #[error("undefined crosstalk for signal {src} -> {dst} with noise {noise_src} -> {noise_dst}")]
    UndefinedCrosstalk { src: usize, dst: usize, noise_src: usize, noise_dst: usize },

    #[error("shared inter-tile crossing {crossing} is not traversed by the noise path {noise_src} -> {noise_dst}")]
    UnresolvedCrossing { crossing: usize, noise_src: usize, noise_dst: usize },

    #[error("application needs {cores} tiles but the topology has only {tiles}")]
    ApplicationTooLarge { cores: usize, tiles: usize },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid application: {0}")]
    Application(String),

    #[error("invalid mapping: {0}")]
    Mapping(String),
}

pub type Result<T> = std::result::Result<T, NocError>;

/// Units of work a rayon task should carry before splitting pays off.
pub const MIN_TASK_WORK: usize = 4096;
/// Tasks kept per thread so uneven items still balance.
pub const TASKS_PER_THREAD: usize = 4;

/// Minimum number of items per rayon task when each item costs about
/// `weight` units: enough to reach `MIN_TASK_WORK`, capped so every thread
/// still sees `TASKS_PER_THREAD` tasks.
pub fn calculate_chunk_size(total_items: usize, weight: usize) -> usize {
    let threads = num_cpus::get().max(1);
    let balanced = total_items / (threads * TASKS_PER_THREAD);
    let worthwhile = MIN_TASK_WORK.div_ceil(weight.max(1));
    worthwhile.min(balanced).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn antipodes_pair_up() {
        for port in Port::ALL.iter().skip(1) {
            let opposite = port.antipode().unwrap();
            assert_eq!(opposite.antipode(), Some(*port));
            assert_ne!(opposite, *port);
        }
        assert_eq!(Port::Local.antipode(), None);
    }

    #[test]
    fn port_indices_round_trip() {
        for port in Port::ALL {
            assert_eq!(Port::from_index(port.index()), Some(port));
        }
        assert_eq!(Port::from_index(NUM_PORTS), None);
    }

    #[test]
    fn chunk_size_follows_item_weight() {
        assert_eq!(calculate_chunk_size(0, 1), 1);
        assert_eq!(calculate_chunk_size(5, 0), 1);
        // Heavy items are never batched
        assert_eq!(calculate_chunk_size(1_000_000, MIN_TASK_WORK), 1);
        // Light items batch up to the work target, heavier ones less so
        let light = calculate_chunk_size(1_000_000, 1);
        let heavy = calculate_chunk_size(1_000_000, 256);
        assert!(light <= MIN_TASK_WORK);
        assert_eq!(heavy, MIN_TASK_WORK / 256);
        assert!(light > heavy);
        // Few items keep every thread busy
        let threads = num_cpus::get().max(1);
        assert!(calculate_chunk_size(threads * TASKS_PER_THREAD * 3, 1) <= 3);
    }
}
