//! Network-level cost model: every tile-to-tile route, its power loss, and
//! the crosstalk between every pair of routes that can run together.

use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;

use crate::application::Application;
use crate::blocks::Arm;
use crate::config::{Configuration, CrosstalkCoefficients, LossCoefficients};
use crate::decibel::accumulate_db;
use crate::router::Router;
use crate::routing::RoutingKind;
use crate::topology::{LinkSpan, Topology};
use crate::{calculate_chunk_size, NocError, Port, Result};

/// A routed communication between two tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkPath {
    pub src: usize,
    pub dst: usize,
    /// Tiles visited, source and destination included.
    pub tiles: Vec<usize>,
    /// Router input port at each tile; local at the source.
    pub input_ports: Vec<Port>,
    /// Router output port at each tile; local at the destination.
    pub output_ports: Vec<Port>,
    pub waveguides: Vec<usize>,
    pub crossings: Vec<usize>,
    /// Inter-tile waveguide length in cm.
    pub length: f64,
}

impl NetworkPath {
    pub fn position(&self, tile: usize) -> Option<usize> {
        self.tiles.iter().position(|&t| t == tile)
    }

    pub fn hops(&self) -> usize {
        self.tiles.len() - 1
    }
}

const INVALID: f64 = f64::NAN;
const SILENT: f64 = f64::NEG_INFINITY;

pub struct NocArchitecture {
    topology: Topology,
    routing: RoutingKind,
    router: Router,
    loss_coefficients: LossCoefficients,
    crosstalk_coefficients: CrosstalkCoefficients,
    paths: Vec<NetworkPath>,
    loss: Vec<f64>,
    valid: Vec<bool>,
    /// NaN for tuples that cannot run together, -inf for no coupling.
    crosstalk: Vec<f64>,
}

impl NocArchitecture {
    pub fn new(config: &Configuration) -> Result<Self> {
        config.validate()?;
        let start = Instant::now();
        let topology = config.topology.build(config)?;
        let router = config.router.build(config)?;
        let mut architecture = Self {
            topology,
            routing: config.routing,
            router,
            loss_coefficients: config.loss,
            crosstalk_coefficients: config.crosstalk,
            paths: Vec::new(),
            loss: Vec::new(),
            valid: Vec::new(),
            crosstalk: Vec::new(),
        };
        architecture.compute_paths()?;
        architecture.compute_loss_matrix();
        architecture.compute_crosstalk_tensor()?;
        info!(
            "Built {} {}x{} with {} routers and {} routing in {:.2?}",
            config.topology,
            config.rows,
            config.columns,
            config.router,
            config.routing,
            start.elapsed()
        );
        Ok(architecture)
    }

    fn index(&self, src: usize, dst: usize) -> usize {
        src * self.num_tiles() + dst
    }

    fn tuple(&self, src0: usize, dst0: usize, src1: usize, dst1: usize) -> usize {
        let n = self.num_tiles();
        ((src0 * n + dst0) * n + src1) * n + dst1
    }

    fn compute_paths(&mut self) -> Result<()> {
        let n = self.num_tiles();
        let paths = (0..n * n)
            .into_par_iter()
            .with_min_len(calculate_chunk_size(n * n, n))
            .map(|k| self.trace_path(k / n, k % n))
            .collect::<Result<Vec<_>>>()?;
        debug!("Traced {} network paths", paths.len());
        self.paths = paths;
        Ok(())
    }

    /// Routes `src -> dst` hop by hop, checking every hop against the
    /// wiring and the router.
    fn trace_path(&self, src: usize, dst: usize) -> Result<NetworkPath> {
        let grid = self.topology.grid();
        let mut path = NetworkPath {
            src,
            dst,
            tiles: vec![src],
            input_ports: vec![Port::Local],
            output_ports: Vec::new(),
            waveguides: Vec::new(),
            crossings: Vec::new(),
            length: 0.0,
        };

        let mut current = src;
        while current != dst {
            if path.tiles.len() > grid.num_tiles() {
                return Err(NocError::RouteDiverges { src, dst });
            }
            let output = self.routing.output_port(grid, current, dst);
            let expected = self.routing.arrival_port(grid, current, output)?;
            let link = self.topology.follow(current, output)?;
            let last = *link.waveguides.last().ok_or(NocError::RouteDiverges { src, dst })?;
            let arrived = self
                .topology
                .tile(link.destination)?
                .arrival_port(last)
                .ok_or(NocError::RouteDiverges { src, dst })?;
            if arrived != expected {
                return Err(NocError::WrongArrivalPort { src, dst, from: current, to: link.destination, arrived, expected });
            }

            path.output_ports.push(output);
            path.input_ports.push(arrived);
            path.tiles.push(link.destination);
            path.waveguides.extend(link.waveguides);
            path.crossings.extend(link.crossings);
            path.length += link.length;
            current = link.destination;
        }
        path.output_ports.push(Port::Local);

        if src != dst {
            for (k, &tile) in path.tiles.iter().enumerate() {
                let (input, output) = (path.input_ports[k], path.output_ports[k]);
                if !self.router.is_connected(input, output) {
                    debug!("Route {} -> {} needs {} -> {} at tile {}", src, dst, input, output, tile);
                    return Err(NocError::UnconnectedPorts {
                        router: self.router.name().to_string(),
                        input,
                        output,
                        src,
                        dst,
                    });
                }
            }
        }
        Ok(path)
    }

    fn compute_loss_matrix(&mut self) {
        let loss: Vec<f64> = self.paths.par_iter().map(|path| self.path_loss(path)).collect();
        self.loss = loss;
    }

    fn path_loss(&self, path: &NetworkPath) -> f64 {
        if path.src == path.dst {
            return 0.0;
        }
        let routers: f64 = path
            .input_ports
            .iter()
            .zip(&path.output_ports)
            .map(|(&input, &output)| self.router.loss(input, output))
            .sum();
        routers + self.loss_coefficients.propagation * path.length + self.loss_coefficients.crossing * path.crossings.len() as f64
    }

    fn compute_crosstalk_tensor(&mut self) -> Result<()> {
        let n = self.num_tiles();
        let block = n * n;
        let mut valid = vec![false; block * block];
        let mut crosstalk = vec![INVALID; block * block];

        valid
            .par_chunks_mut(block)
            .zip(crosstalk.par_chunks_mut(block))
            .enumerate()
            // one row scans every noise path
            .with_min_len(calculate_chunk_size(block, block))
            .try_for_each(|(k, (valid, crosstalk))| -> Result<()> {
                let signal = &self.paths[k];
                for (m, noise) in self.paths.iter().enumerate() {
                    if !self.compute_valid(signal, noise) {
                        continue;
                    }
                    valid[m] = true;
                    crosstalk[m] = self.compute_crosstalk(signal, noise)?.unwrap_or(SILENT);
                }
                Ok(())
            })?;

        let pairs = valid.iter().filter(|&&v| v).count();
        info!("{} of {} communication pairs may run simultaneously", pairs, block * block);
        self.valid = valid;
        self.crosstalk = crosstalk;
        Ok(())
    }

    fn compute_valid(&self, signal: &NetworkPath, noise: &NetworkPath) -> bool {
        if signal.src == signal.dst || noise.src == noise.dst {
            return false;
        }
        if signal.src == noise.src && signal.dst == noise.dst {
            return false;
        }
        signal.tiles.iter().enumerate().all(|(i, &tile)| match noise.position(tile) {
            Some(j) => self.router.is_valid_simultaneous(
                signal.input_ports[i],
                signal.output_ports[i],
                noise.input_ports[j],
                noise.output_ports[j],
            ),
            None => true,
        })
    }

    /// Crosstalk `noise` induces on `signal`: coupling inside shared routers
    /// plus coupling at shared inter-tile crossings.
    fn compute_crosstalk(&self, signal: &NetworkPath, noise: &NetworkPath) -> Result<Option<f64>> {
        let mut total = None;
        let last = signal.tiles.len() - 1;

        for (i, &tile) in signal.tiles.iter().enumerate() {
            let Some(j) = noise.position(tile) else { continue };
            let (in0, out0) = (signal.input_ports[i], signal.output_ports[i]);
            let (in1, out1) = (noise.input_ports[j], noise.output_ports[j]);
            let Some(coupling) = self.router.crosstalk(in0, out0, in1, out1) else { continue };

            let mut noise_to_tile = self.loss(noise.src, tile);
            if j > 0 {
                noise_to_tile -= self.router.loss(in1, Port::Local);
            }
            let mut tile_to_dst = self.loss(tile, signal.dst);
            if i < last {
                tile_to_dst -= self.router.loss(Port::Local, out0);
            }
            total = accumulate_db(total, coupling + noise_to_tile + tile_to_dst);
        }

        for &crossing in &signal.crossings {
            if !noise.crossings.contains(&crossing) {
                continue;
            }
            let src0 = self.topology.span_from_source(crossing, Arm::Zero)?;
            let dst0 = self.topology.span_to_destination(crossing, Arm::Zero)?;
            let src1 = self.topology.span_from_source(crossing, Arm::One)?;
            let dst1 = self.topology.span_to_destination(crossing, Arm::One)?;

            let unresolved = || NocError::UnresolvedCrossing { crossing, noise_src: noise.src, noise_dst: noise.dst };
            let loss = if let Some(k) = follows_link(noise, &src0, &dst0) {
                self.crossing_coupling_loss(signal, noise, k, &src0, &dst1).ok_or_else(unresolved)?
            } else if let Some(k) = follows_link(noise, &src1, &dst1) {
                self.crossing_coupling_loss(signal, noise, k, &src1, &dst0).ok_or_else(unresolved)?
            } else {
                return Err(unresolved());
            };
            total = accumulate_db(total, self.crosstalk_coefficients.crossing + loss);
        }
        Ok(total)
    }

    /// Loss of noise leaving the noise path at tile index `k`, running
    /// `from` its tile to the crossing, jumping arms, and following the
    /// signal from `to` onward.
    fn crossing_coupling_loss(
        &self,
        signal: &NetworkPath,
        noise: &NetworkPath,
        k: usize,
        from: &LinkSpan,
        to: &LinkSpan,
    ) -> Option<f64> {
        let (in_noise, out_noise) = (noise.input_ports[k], noise.output_ports[k]);
        let mut loss = self.loss(noise.src, noise.tiles[k]) - self.router.loss(in_noise, Port::Local)
            + self.router.loss(in_noise, out_noise);

        let idx = signal.position(to.tile).filter(|&idx| idx > 0)?;
        let out_signal = signal.output_ports[idx];
        if idx < signal.tiles.len() - 1 {
            loss += self.loss(to.tile, signal.dst) - self.router.loss(Port::Local, out_signal);
        }
        loss += self.router.loss(signal.input_ports[idx], out_signal);
        loss += self.loss_coefficients.crossing * (from.crossings + to.crossings) as f64;
        loss += self.loss_coefficients.propagation * (from.length + to.length);
        Some(loss)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn routing(&self) -> RoutingKind {
        self.routing
    }

    pub fn num_tiles(&self) -> usize {
        self.topology.num_tiles()
    }

    pub fn path(&self, src: usize, dst: usize) -> &NetworkPath {
        &self.paths[self.index(src, dst)]
    }

    /// Power loss of `src -> dst` in dB; zero for `src == dst`.
    pub fn loss(&self, src: usize, dst: usize) -> f64 {
        self.loss[self.index(src, dst)]
    }

    pub fn is_valid(&self, src0: usize, dst0: usize, src1: usize, dst1: usize) -> bool {
        self.valid[self.tuple(src0, dst0, src1, dst1)]
    }

    /// Crosstalk `src1 -> dst1` induces on `src0 -> dst0`. `None` when the
    /// two do not couple.
    pub fn crosstalk(&self, src0: usize, dst0: usize, src1: usize, dst1: usize) -> Result<Option<f64>> {
        let value = self.crosstalk[self.tuple(src0, dst0, src1, dst1)];
        if value.is_nan() {
            Err(NocError::UndefinedCrosstalk { src: src0, dst: dst0, noise_src: src1, noise_dst: dst1 })
        } else if value == SILENT {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    pub fn check_size(&self, application: &Application) -> Result<()> {
        let (cores, tiles) = (application.num_cores(), self.num_tiles());
        if cores > tiles {
            return Err(NocError::ApplicationTooLarge { cores, tiles });
        }
        Ok(())
    }
}

/// Index of the tile where `path` enters the link described by the spans.
fn follows_link(path: &NetworkPath, src: &LinkSpan, dst: &LinkSpan) -> Option<usize> {
    let k = path.position(src.tile)?;
    (path.tiles.get(k + 1) == Some(&dst.tile)).then_some(k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyKind;
    use crate::RouterKind;

    fn small(kind: TopologyKind, rows: usize, columns: usize) -> Configuration {
        let routing = RoutingKind::ALL.into_iter().find(|r| r.supports(kind)).unwrap();
        Configuration { topology: kind, routing, rows, columns, chip_size: 100.0, ..Configuration::default() }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn two_by_two_mesh_loss_sums_routers_and_link() {
        let config = small(TopologyKind::Mesh, 2, 2);
        let noc = NocArchitecture::new(&config).unwrap();
        let router = noc.router();
        let expected = router.loss(Port::Local, Port::East) + router.loss(Port::West, Port::Local) + config.loss.propagation;
        assert!(close(noc.loss(0, 1), expected));
        assert_eq!(noc.loss(2, 2), 0.0);

        let path = noc.path(0, 3);
        assert_eq!(path.tiles, vec![0, 1, 3]);
        assert_eq!(path.input_ports, vec![Port::Local, Port::West, Port::North]);
        assert_eq!(path.output_ports, vec![Port::East, Port::South, Port::Local]);
        assert_eq!(path.hops(), 2);
    }

    #[test]
    fn validity_follows_shared_ports() {
        let noc = NocArchitecture::new(&small(TopologyKind::Mesh, 2, 2)).unwrap();
        assert!(!noc.is_valid(0, 1, 0, 1));
        assert!(!noc.is_valid(0, 0, 1, 2));
        assert!(!noc.is_valid(0, 1, 0, 2));
        assert!(!noc.is_valid(0, 1, 2, 1));
        assert!(noc.is_valid(0, 1, 1, 0));
        assert!(noc.is_valid(0, 1, 2, 3));
    }

    #[test]
    fn crosstalk_is_defined_only_for_valid_tuples() {
        let noc = NocArchitecture::new(&small(TopologyKind::Mesh, 2, 2)).unwrap();
        assert!(matches!(noc.crosstalk(0, 1, 0, 2), Err(NocError::UndefinedCrosstalk { .. })));
        // Opposite directions on one link use separate router paths
        assert_eq!(noc.crosstalk(0, 1, 1, 0).unwrap(), None);
        // Ejection at tile 1 shares a crossing with injection toward south;
        // both ends sit at tile 1 so only the router term remains.
        let coupled = noc.crosstalk(0, 1, 1, 3).unwrap().unwrap();
        let router = noc.router().crosstalk(Port::West, Port::Local, Port::Local, Port::South).unwrap();
        assert!(close(coupled, router));
        // Disjoint rows never meet
        assert_eq!(noc.crosstalk(0, 1, 2, 3).unwrap(), None);
    }

    #[test]
    fn every_catalog_router_builds_every_topology() {
        for router in RouterKind::ALL {
            for kind in [TopologyKind::Mesh, TopologyKind::TorusUnfolded, TopologyKind::TorusFolded] {
                let config = Configuration { router, ..small(kind, 3, 4) };
                let noc = NocArchitecture::new(&config).unwrap();
                for src in 0..noc.num_tiles() {
                    for dst in 0..noc.num_tiles() {
                        if src != dst {
                            assert!(noc.loss(src, dst) < 0.0, "{} {} {}->{}", router, kind, src, dst);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn torus_inner_hops_pay_wrap_crossings() {
        let mesh = NocArchitecture::new(&small(TopologyKind::Mesh, 4, 4)).unwrap();
        let torus_config = small(TopologyKind::TorusUnfolded, 4, 4);
        let torus = NocArchitecture::new(&torus_config).unwrap();
        let crossing = torus_config.loss.crossing;
        assert!(close(torus.loss(0, 1), mesh.loss(0, 1)));
        assert!(close(torus.loss(1, 2), mesh.loss(1, 2) + 2.0 * crossing));
        assert!(close(torus.loss(5, 9), mesh.loss(5, 9) + 2.0 * crossing));
        assert!(close(torus.loss(1, 9), mesh.loss(1, 9) + 2.0 * crossing));
    }

    #[test]
    fn torus_wrap_crossing_couples_finitely() {
        let config = small(TopologyKind::TorusUnfolded, 3, 3);
        let noc = NocArchitecture::new(&config).unwrap();
        // Row link 4 -> 5 and column wrap 1 -> 7 meet only at a crossing
        let signal = noc.path(4, 5);
        let noise = noc.path(1, 7);
        assert_eq!(signal.tiles, vec![4, 5]);
        assert_eq!(noise.tiles, vec![1, 7]);
        assert!(noc.is_valid(4, 5, 1, 7));

        let shared: Vec<_> = signal.crossings.iter().filter(|c| noise.crossings.contains(c)).collect();
        assert_eq!(shared.len(), 1);
        let topology = noc.topology();
        let from = topology.span_from_source(*shared[0], Arm::One).unwrap();
        let to = topology.span_to_destination(*shared[0], Arm::Zero).unwrap();
        assert_eq!((from.tile, to.tile), (1, 5));
        let router = noc.router();
        let expected = config.crosstalk.crossing
            + router.loss(Port::Local, Port::North)
            + router.loss(Port::West, Port::Local)
            + config.loss.crossing * (from.crossings + to.crossings) as f64
            + config.loss.propagation * (from.length + to.length);
        let crosstalk = noc.crosstalk(4, 5, 1, 7).unwrap().unwrap();
        assert!(close(crosstalk, expected), "{} != {}", crosstalk, expected);
    }

    #[test]
    fn oversized_application_is_rejected() {
        let noc = NocArchitecture::new(&small(TopologyKind::Mesh, 2, 2)).unwrap();
        let app = Application::new(5, vec![vec![0.0; 5]; 5]).unwrap();
        assert!(matches!(noc.check_size(&app), Err(NocError::ApplicationTooLarge { cores: 5, tiles: 4 })));
    }
}
