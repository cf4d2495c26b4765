//! Scores a placement against the configured objective. Evaluation only
//! reads the precomputed architecture tensors, so one evaluator can serve
//! many threads at once.

use std::sync::Arc;

use crate::application::{Application, CommunicationTask};
use crate::architecture::NocArchitecture;
use crate::config::{Configuration, Objective};
use crate::decibel::{accumulate_db, calc_snr, db_to_val};
use crate::mapping::Mapping;
use crate::Result;

/// A noise source kept for the worst-case communication.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseContribution {
    pub task: CommunicationTask,
    /// Crosstalk the task induces on the signal, in dB.
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub objective: Objective,
    /// Source and destination core of the worst-case communication.
    pub worst_case: Option<(usize, usize)>,
    pub noise: Vec<NoiseContribution>,
    pub signal_attenuation: f64,
    pub noise_attenuation: Option<f64>,
    pub snr: f64,
    /// Total laser power in mW.
    pub laser_power: f64,
}

impl Evaluation {
    fn empty(objective: Objective) -> Self {
        Self {
            objective,
            worst_case: None,
            noise: Vec::new(),
            signal_attenuation: 0.0,
            noise_attenuation: None,
            snr: f64::INFINITY,
            laser_power: 0.0,
        }
    }

    /// Value every search maximises.
    pub fn score(&self) -> f64 {
        match self.objective {
            Objective::Crosstalk => self.snr,
            Objective::PowerLoss => self.signal_attenuation,
            Objective::LaserPower => -self.laser_power,
        }
    }
}

#[derive(Clone)]
pub struct Evaluator {
    architecture: Arc<NocArchitecture>,
    application: Arc<Application>,
    objective: Objective,
    sensitivity: f64,
    efficiency: f64,
    modulation_rate: f64,
}

impl Evaluator {
    pub fn new(architecture: Arc<NocArchitecture>, application: Arc<Application>, config: &Configuration) -> Result<Self> {
        architecture.check_size(&application)?;
        Ok(Self {
            architecture,
            application,
            objective: config.objective,
            sensitivity: config.sensitivity,
            efficiency: config.efficiency as f64,
            modulation_rate: config.modulation_rate as f64,
        })
    }

    pub fn architecture(&self) -> &NocArchitecture {
        &self.architecture
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn rows(&self) -> usize {
        self.architecture.topology().rows()
    }

    pub fn columns(&self) -> usize {
        self.architecture.topology().columns()
    }

    pub fn num_cores(&self) -> usize {
        self.application.num_cores()
    }

    /// Evaluates the configured objective. Laser power is always filled in.
    pub fn evaluate(&self, mapping: &Mapping) -> Result<Evaluation> {
        let mut evaluation = match self.objective {
            Objective::Crosstalk => self.evaluate_snr(mapping)?,
            Objective::PowerLoss => self.evaluate_power_loss(mapping),
            Objective::LaserPower => Evaluation::empty(Objective::LaserPower),
        };
        evaluation.laser_power = self.laser_power(mapping);
        Ok(evaluation)
    }

    pub fn score(&self, mapping: &Mapping) -> Result<f64> {
        Ok(self.evaluate(mapping)?.score())
    }

    /// Worst signal-to-noise ratio over all communications.
    pub fn evaluate_snr(&self, mapping: &Mapping) -> Result<Evaluation> {
        let arch = &*self.architecture;
        let tasks = self.application.tasks();
        let mut worst = Evaluation::empty(Objective::Crosstalk);

        for signal in tasks {
            let (src, dst) = (mapping.tile_of_core(signal.src), mapping.tile_of_core(signal.dst));
            let signal_attenuation = arch.loss(src, dst);

            let mut candidates = Vec::new();
            for task in tasks {
                if task.src == signal.src || task.dst == signal.dst {
                    continue;
                }
                let (noise_src, noise_dst) = (mapping.tile_of_core(task.src), mapping.tile_of_core(task.dst));
                if !arch.is_valid(src, dst, noise_src, noise_dst) {
                    continue;
                }
                if let Some(impact) = arch.crosstalk(src, dst, noise_src, noise_dst)? {
                    candidates.push(NoiseContribution { task: *task, impact });
                }
            }
            // Strongest first; a source that cannot coexist with a stronger
            // kept one is dropped.
            candidates.sort_by(|a, b| b.impact.total_cmp(&a.impact));

            let mut kept: Vec<NoiseContribution> = Vec::new();
            let mut noise = None;
            for candidate in candidates {
                let (a, b) = (mapping.tile_of_core(candidate.task.src), mapping.tile_of_core(candidate.task.dst));
                let compatible = kept.iter().all(|other| {
                    arch.is_valid(a, b, mapping.tile_of_core(other.task.src), mapping.tile_of_core(other.task.dst))
                });
                if compatible {
                    noise = accumulate_db(noise, candidate.impact);
                    kept.push(candidate);
                }
            }

            let snr = calc_snr(signal_attenuation, noise);
            if snr < worst.snr {
                worst.worst_case = Some((signal.src, signal.dst));
                worst.noise = kept;
                worst.signal_attenuation = signal_attenuation;
                worst.noise_attenuation = noise;
                worst.snr = snr;
            }
        }
        Ok(worst)
    }

    /// Most negative communication loss.
    pub fn evaluate_power_loss(&self, mapping: &Mapping) -> Evaluation {
        let mut worst = Evaluation::empty(Objective::PowerLoss);
        for task in self.application.tasks() {
            let loss = self.architecture.loss(mapping.tile_of_core(task.src), mapping.tile_of_core(task.dst));
            if loss < worst.signal_attenuation {
                worst.worst_case = Some((task.src, task.dst));
                worst.signal_attenuation = loss;
            }
        }
        worst
    }

    /// Laser power in mW needed to reach the photodetector sensitivity on
    /// every communication.
    pub fn laser_power(&self, mapping: &Mapping) -> f64 {
        self.application
            .tasks()
            .iter()
            .map(|task| {
                let loss = self.architecture.loss(mapping.tile_of_core(task.src), mapping.tile_of_core(task.dst));
                db_to_val(self.sensitivity - loss) * 100.0 / self.efficiency * task.bandwidth * 8.0 / 1000.0
                    / self.modulation_rate
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(objective: Objective, rows: usize, columns: usize, cg: Vec<Vec<f64>>) -> Evaluator {
        let config = Configuration { rows, columns, objective, ..Configuration::default() };
        let architecture = Arc::new(NocArchitecture::new(&config).unwrap());
        let application = Arc::new(Application::new(cg.len(), cg).unwrap());
        Evaluator::new(architecture, application, &config).unwrap()
    }

    #[test]
    fn two_core_power_loss_matches_path_loss() {
        let evaluator = setup(Objective::PowerLoss, 2, 2, vec![vec![0.0, 10_000.0], vec![0.0, 0.0]]);
        for cells in [vec![Some(0), Some(1), None, None], vec![Some(1), None, None, Some(0)]] {
            let mapping = Mapping::from_cells(2, 2, cells, 2).unwrap();
            let evaluation = evaluator.evaluate(&mapping).unwrap();
            let expected = evaluator.architecture().loss(mapping.tile_of_core(0), mapping.tile_of_core(1));
            assert!(evaluation.score().is_finite());
            assert!(evaluation.score() < 0.0);
            assert_eq!(evaluation.signal_attenuation, expected);
            assert_eq!(evaluation.worst_case, Some((0, 1)));
        }
    }

    #[test]
    fn no_communication_is_neutral() {
        let evaluator = setup(Objective::Crosstalk, 2, 2, vec![vec![0.0; 3]; 3]);
        let mapping = Mapping::from_cells(2, 2, vec![Some(0), Some(1), Some(2), None], 3).unwrap();
        let evaluation = evaluator.evaluate(&mapping).unwrap();
        assert_eq!(evaluation.snr, f64::INFINITY);
        assert_eq!(evaluation.worst_case, None);
        assert_eq!(evaluation.laser_power, 0.0);
    }

    #[test]
    fn lone_communication_is_noise_free() {
        let evaluator = setup(Objective::Crosstalk, 2, 2, vec![vec![0.0, 1.0], vec![0.0, 0.0]]);
        let mapping = Mapping::from_cells(2, 2, vec![Some(0), Some(1), None, None], 2).unwrap();
        let evaluation = evaluator.evaluate(&mapping).unwrap();
        assert_eq!(evaluation.noise_attenuation, None);
        assert_eq!(evaluation.snr, f64::INFINITY);
        // Noise-free, yet the application does communicate
        assert_eq!(evaluation.worst_case, None);
        assert!(!evaluator.application().is_idle());
    }

    #[test]
    fn snr_accounts_for_coupled_noise() {
        // 0 -> 1 ejects at tile 1 while 1 -> 2 injects there toward south
        let cg = vec![vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0], vec![0.0, 0.0, 0.0]];
        let evaluator = setup(Objective::Crosstalk, 2, 2, cg);
        let mapping = Mapping::from_cells(2, 2, vec![Some(0), Some(1), None, Some(2)], 3).unwrap();
        let arch = evaluator.architecture();
        let noise = arch.crosstalk(0, 1, 1, 3).unwrap().unwrap();

        let evaluation = evaluator.evaluate(&mapping).unwrap();
        assert!(evaluation.snr.is_finite());
        assert!(evaluation.snr <= arch.loss(0, 1) - noise + 1e-9);
        assert!(evaluation.worst_case.is_some());
        assert_eq!(evaluation.noise.len(), 1);
        assert_eq!(evaluation.noise_attenuation, Some(evaluation.noise[0].impact));
    }

    #[test]
    fn laser_power_grows_with_bandwidth() {
        let mapping = Mapping::from_cells(2, 2, vec![Some(0), None, None, Some(1)], 2).unwrap();
        let mut previous = 0.0;
        for bandwidth in [1.0, 1_000.0, 10_000.0, 50_000.0] {
            let evaluator = setup(Objective::LaserPower, 2, 2, vec![vec![0.0, bandwidth], vec![0.0, 0.0]]);
            let evaluation = evaluator.evaluate(&mapping).unwrap();
            assert!(evaluation.laser_power >= previous);
            assert_eq!(evaluation.score(), -evaluation.laser_power);
            previous = evaluation.laser_power;
        }
    }

    #[test]
    fn oversized_application_is_refused() {
        let config = Configuration { rows: 2, columns: 2, ..Configuration::default() };
        let architecture = Arc::new(NocArchitecture::new(&config).unwrap());
        let application = Arc::new(Application::new(5, vec![vec![0.0; 5]; 5]).unwrap());
        assert!(Evaluator::new(architecture, application, &config).is_err());
    }
}
