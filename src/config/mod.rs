//! Run configuration: architecture choice, optical coefficients and search
//! settings. Built once, then passed by reference to every constructor.

use std::fmt;
use std::str::FromStr;

use log::warn;

use crate::router::RouterKind;
use crate::routing::RoutingKind;
use crate::strategy::SearchOptions;
use crate::topology::TopologyKind;
use crate::{NocError, Result};

/// Power-loss coefficients in dB (propagation in dB/cm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossCoefficients {
    pub propagation: f64,
    pub crossing: f64,
    pub ppse_off: f64,
    pub ppse_on: f64,
    pub cpse_off: f64,
    pub cpse_on: f64,
}

impl Default for LossCoefficients {
    fn default() -> Self {
        Self {
            propagation: -0.274,
            crossing: -0.04,
            ppse_off: -0.005,
            ppse_on: -0.5,
            cpse_off: -0.005,
            cpse_on: -0.5,
        }
    }
}

/// Crosstalk coefficients in dB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrosstalkCoefficients {
    pub crossing: f64,
    pub ppse_off: f64,
    pub ppse_on: f64,
}

impl Default for CrosstalkCoefficients {
    fn default() -> Self {
        Self { crossing: -40.0, ppse_off: -20.0, ppse_on: -25.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Objective {
    /// Maximise the worst-case signal-to-noise ratio.
    Crosstalk,
    /// Maximise the worst-case (most negative) power loss.
    PowerLoss,
    /// Minimise the total laser power.
    LaserPower,
}

impl Objective {
    pub fn name(self) -> &'static str {
        match self {
            Objective::Crosstalk => "Crosstalk",
            Objective::PowerLoss => "Power loss",
            Objective::LaserPower => "Laser power",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Objective {
    type Err = NocError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "crosstalk" | "snr" => Ok(Objective::Crosstalk),
            "powerloss" | "loss" => Ok(Objective::PowerLoss),
            "laserpower" | "laser" => Ok(Objective::LaserPower),
            _ => Err(NocError::Configuration(format!("unknown mapping objective '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Random,
    List,
    Genetic,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [StrategyKind::Random, StrategyKind::List, StrategyKind::Genetic];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Random => "RandomMapping",
            StrategyKind::List => "ListMapping",
            StrategyKind::Genetic => "GeneticMapping",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = NocError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "random" | "randommapping" => Ok(StrategyKind::Random),
            "list" | "listmapping" | "local" => Ok(StrategyKind::List),
            "genetic" | "geneticmapping" => Ok(StrategyKind::Genetic),
            _ => Err(NocError::Configuration(format!("unknown mapping strategy '{}'", s))),
        }
    }
}

/// Lower-cases and drops separators so `Power loss`, `power_loss` and
/// `PowerLoss` compare equal.
pub(crate) fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub router: RouterKind,
    pub topology: TopologyKind,
    pub routing: RoutingKind,
    pub rows: usize,
    pub columns: usize,
    /// Chip area in mm².
    pub chip_size: f64,
    pub loss: LossCoefficients,
    pub crosstalk: CrosstalkCoefficients,
    /// Photodetector sensitivity in dBm.
    pub sensitivity: f64,
    /// Laser efficiency in percent.
    pub efficiency: u32,
    /// Modulation rate in Gb/s.
    pub modulation_rate: u32,
    pub strategy: StrategyKind,
    pub objective: Objective,
    pub iterations: usize,
    pub population: usize,
    pub offspring: usize,
    pub stop_on_stagnation: bool,
    pub seed: Option<u64>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            router: RouterKind::Crux,
            topology: TopologyKind::Mesh,
            routing: RoutingKind::XyMesh,
            rows: 4,
            columns: 4,
            chip_size: 100.0,
            loss: LossCoefficients::default(),
            crosstalk: CrosstalkCoefficients::default(),
            sensitivity: -20.0,
            efficiency: 30,
            modulation_rate: 10,
            strategy: StrategyKind::Genetic,
            objective: Objective::Crosstalk,
            iterations: 1000,
            population: 100,
            offspring: 25,
            stop_on_stagnation: false,
            seed: None,
        }
    }
}

impl Configuration {
    pub fn num_tiles(&self) -> usize {
        self.rows * self.columns
    }

    /// Length of one grid hop in cm.
    pub fn hop_distance(&self) -> f64 {
        let cells = ((self.rows.max(2) - 1) * (self.columns.max(2) - 1)) as f64;
        ((self.chip_size / 100.0) / cells).sqrt()
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            iterations: self.iterations,
            stop_on_stagnation: self.stop_on_stagnation,
            population: self.population,
            offspring: self.offspring,
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(NocError::Configuration(message));
        if self.rows < 2 || self.columns < 2 {
            return fail(format!("grid must be at least 2x2, got {}x{}", self.rows, self.columns));
        }
        if !(self.chip_size > 0.0) {
            return fail(format!("chip size must be positive, got {}", self.chip_size));
        }
        if self.efficiency == 0 || self.efficiency > 100 {
            return fail(format!("laser efficiency must be in 1..=100 %, got {}", self.efficiency));
        }
        if self.modulation_rate == 0 {
            return fail("modulation rate must be at least 1 Gb/s".to_string());
        }
        if self.iterations == 0 {
            return fail("iteration budget must be positive".to_string());
        }
        if self.population < 2 {
            return fail(format!("population must hold at least 2 individuals, got {}", self.population));
        }
        if self.offspring == 0 {
            return fail("offspring size must be positive".to_string());
        }
        if !self.routing.supports(self.topology) {
            return fail(format!("routing {} cannot drive a {} topology", self.routing, self.topology));
        }

        let coefficients = [
            ("propagation loss", self.loss.propagation),
            ("crossing loss", self.loss.crossing),
            ("PPSE off loss", self.loss.ppse_off),
            ("PPSE on loss", self.loss.ppse_on),
            ("CPSE off loss", self.loss.cpse_off),
            ("CPSE on loss", self.loss.cpse_on),
            ("crossing crosstalk", self.crosstalk.crossing),
            ("PPSE off crosstalk", self.crosstalk.ppse_off),
            ("PPSE on crosstalk", self.crosstalk.ppse_on),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() {
                return fail(format!("{} must be finite", name));
            }
            if value > 0.0 {
                warn!("{} is positive ({} dB); losses are expected to be negative", name, value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn hop_distance_spans_the_chip() {
        let config = Configuration { rows: 2, columns: 2, chip_size: 100.0, ..Configuration::default() };
        assert!((config.hop_distance() - 1.0).abs() < 1e-12);
        let config = Configuration { rows: 3, columns: 3, chip_size: 400.0, ..Configuration::default() };
        assert!((config.hop_distance() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_degenerate_grids_and_mismatched_routing() {
        let config = Configuration { rows: 1, ..Configuration::default() };
        assert!(config.validate().is_err());
        let config = Configuration { topology: TopologyKind::TorusFolded, ..Configuration::default() };
        assert!(matches!(config.validate(), Err(NocError::Configuration(_))));
        let config = Configuration { efficiency: 0, ..Configuration::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn names_parse_loosely() {
        assert_eq!("Power loss".parse::<Objective>().unwrap(), Objective::PowerLoss);
        assert_eq!("laser_power".parse::<Objective>().unwrap(), Objective::LaserPower);
        assert_eq!("GeneticMapping".parse::<StrategyKind>().unwrap(), StrategyKind::Genetic);
        assert_eq!("list".parse::<StrategyKind>().unwrap(), StrategyKind::List);
        assert!("annealing".parse::<StrategyKind>().is_err());
    }
}
