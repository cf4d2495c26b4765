//! Application communication graph.

use crate::{NocError, Result};

/// One directed core-to-core flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommunicationTask {
    pub id: usize,
    pub src: usize,
    pub dst: usize,
    /// Bandwidth in Mb/s.
    pub bandwidth: f64,
}

#[derive(Debug, Clone)]
pub struct Application {
    name: String,
    num_cores: usize,
    cg: Vec<Vec<f64>>,
    tasks: Vec<CommunicationTask>,
}

impl Application {
    /// Builds an application from a square bandwidth matrix; entry
    /// `[i][j] != 0` means core `i` sends to core `j`.
    pub fn new(num_cores: usize, cg: Vec<Vec<f64>>) -> Result<Self> {
        if num_cores == 0 {
            return Err(NocError::Application("an application needs at least one core".to_string()));
        }
        if cg.len() != num_cores || cg.iter().any(|row| row.len() != num_cores) {
            return Err(NocError::Application(format!("communication matrix must be {}x{}", num_cores, num_cores)));
        }

        let mut tasks = Vec::new();
        for (src, row) in cg.iter().enumerate() {
            for (dst, &bandwidth) in row.iter().enumerate() {
                if bandwidth == 0.0 {
                    continue;
                }
                if !bandwidth.is_finite() || bandwidth < 0.0 {
                    return Err(NocError::Application(format!("bandwidth {} -> {} must be positive, got {}", src, dst, bandwidth)));
                }
                if src == dst {
                    return Err(NocError::Application(format!("core {} communicates with itself", src)));
                }
                tasks.push(CommunicationTask { id: src * num_cores + dst, src, dst, bandwidth });
            }
        }

        Ok(Self { name: "application".to_string(), num_cores, cg, tasks })
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    pub fn cg(&self) -> &[Vec<f64>] {
        &self.cg
    }

    pub fn bandwidth(&self, src: usize, dst: usize) -> f64 {
        self.cg[src][dst]
    }

    pub fn communicates(&self, src: usize, dst: usize) -> bool {
        self.cg[src][dst] != 0.0
    }

    /// Tasks in row-major order of the matrix.
    pub fn tasks(&self) -> &[CommunicationTask] {
        &self.tasks
    }

    /// No core sends anything.
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, src: usize, dst: usize) -> Option<&CommunicationTask> {
        self.tasks.iter().find(|task| task.src == src && task.dst == dst)
    }
}
