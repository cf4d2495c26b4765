//generator/mod.rs
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::{iproduct, Itertools};

use crate::application::Application;
use crate::architecture::NocArchitecture;
use crate::config::Configuration;
use crate::router::Router;
use crate::strategy::SearchOutcome;
use crate::Port;

/// Everything a mapping report describes.
pub struct ReportInput<'a> {
    pub config: &'a Configuration,
    pub architecture: &'a NocArchitecture,
    pub application: &'a Application,
    pub strategy: &'a str,
    pub outcome: &'a SearchOutcome,
}

pub fn report_file_name(application: &str, config: &Configuration) -> String {
    format!(
        "{}_{}_{}x{}_{}_{}_{}_{}.txt",
        application,
        config.topology,
        config.rows,
        config.columns,
        config.routing,
        config.router,
        config.strategy,
        config.objective.name().replace(' ', "")
    )
}

pub fn score_distribution_file_name(report_file_name: &str) -> String {
    let stem = report_file_name.strip_suffix(".txt").unwrap_or(report_file_name);
    format!("{}_score_distribution.txt", stem)
}

pub fn write_report<P: AsRef<Path>>(path: P, input: &ReportInput) -> Result<()> {
    let file = File::create(path.as_ref()).context(format!("Failed to create report file: {:?}", path.as_ref()))?;
    let mut out = BufWriter::new(file);
    render_report(&mut out, input)?;
    out.flush()?;
    Ok(())
}

pub fn render_report<W: Write>(out: &mut W, input: &ReportInput) -> Result<()> {
    write_configuration(out, input.config)?;
    write_architecture(out, input.architecture)?;
    write_application(out, input.application)?;
    write_optimization(out, input)?;
    write_solution(out, input.outcome)?;
    Ok(())
}

/// One score per line, in search order.
pub fn write_score_distribution<P: AsRef<Path>>(path: P, scores: &[f64]) -> Result<()> {
    let file = File::create(path.as_ref()).context(format!("Failed to create score file: {:?}", path.as_ref()))?;
    let mut out = BufWriter::new(file);
    for score in scores {
        writeln!(out, "{:.3}", score)?;
    }
    out.flush()?;
    Ok(())
}

fn write_configuration<W: Write>(out: &mut W, config: &Configuration) -> Result<()> {
    writeln!(out, "***** Configuration *****")?;
    writeln!(out, "router {}", config.router)?;
    writeln!(out, "topology {} {}x{}", config.topology, config.rows, config.columns)?;
    writeln!(out, "routing {}", config.routing)?;
    writeln!(out, "chip size {:.3} mm2, hop distance {:.3} cm", config.chip_size, config.hop_distance())?;
    writeln!(
        out,
        "loss: propagation {} dB/cm, crossing {}, PPSE off {}, PPSE on {}, CPSE off {}, CPSE on {} dB",
        config.loss.propagation,
        config.loss.crossing,
        config.loss.ppse_off,
        config.loss.ppse_on,
        config.loss.cpse_off,
        config.loss.cpse_on
    )?;
    writeln!(
        out,
        "crosstalk: crossing {}, PPSE off {}, PPSE on {} dB",
        config.crosstalk.crossing, config.crosstalk.ppse_off, config.crosstalk.ppse_on
    )?;
    writeln!(out, "photodetector sensitivity {} dBm", config.sensitivity)?;
    writeln!(out, "laser efficiency {} %", config.efficiency)?;
    writeln!(out, "modulation rate {} Gb/s", config.modulation_rate)?;
    writeln!(out, "objective {}", config.objective)?;
    writeln!(out)?;
    Ok(())
}

fn write_architecture<W: Write>(out: &mut W, arch: &NocArchitecture) -> Result<()> {
    let topology = arch.topology();
    writeln!(out, "***** Architecture *****")?;
    writeln!(
        out,
        "{} {}x{}: {} tiles, {} inter-tile waveguides, {} inter-tile crossings",
        topology.kind(),
        topology.rows(),
        topology.columns(),
        topology.num_tiles(),
        topology.waveguides().len(),
        topology.crossings().len()
    )?;
    write_router_summary(out, arch.router())?;

    writeln!(out, "network power loss matrix (dB):")?;
    let tiles = arch.num_tiles();
    for src in 0..tiles {
        writeln!(out, "{}", (0..tiles).map(|dst| format!("{:.3}", arch.loss(src, dst))).join("\t"))?;
    }
    writeln!(out)?;
    Ok(())
}

/// Connectivity, port-to-port loss and the strongest crosstalk each
/// connection can receive.
pub fn write_router_summary<W: Write>(out: &mut W, router: &Router) -> Result<()> {
    writeln!(out, "router {}", router.name())?;
    writeln!(out, "connectivity:")?;
    for p_in in Port::ALL {
        writeln!(
            out,
            "{}\t{}",
            p_in,
            Port::ALL.iter().map(|&p_out| if router.is_connected(p_in, p_out) { "x" } else { "-" }).join(" ")
        )?;
    }
    let missing = router.unconnected_pairs();
    if !missing.is_empty() {
        writeln!(out, "unconnected: {}", missing.iter().map(|(p_in, p_out)| format!("{}->{}", p_in, p_out)).join(", "))?;
    }

    writeln!(out, "power loss matrix (dB):")?;
    for p_in in Port::ALL {
        writeln!(out, "{}", Port::ALL.iter().map(|&p_out| format!("{:.3}", router.loss(p_in, p_out))).join("\t"))?;
    }

    writeln!(out, "worst crosstalk matrix (dB):")?;
    for p_in in Port::ALL {
        let mut row = Port::ALL.iter().map(|&p_out| match worst_crosstalk(router, p_in, p_out) {
            Some(value) => format!("{:.3}", value),
            None => "n/a".to_string(),
        });
        writeln!(out, "{}", row.join("\t"))?;
    }
    Ok(())
}

fn worst_crosstalk(router: &Router, p_in: Port, p_out: Port) -> Option<f64> {
    iproduct!(Port::ALL, Port::ALL)
        .filter_map(|(p, q)| router.crosstalk(p_in, p_out, p, q))
        .fold(None, |worst: Option<f64>, value| Some(worst.map_or(value, |w| w.max(value))))
}

fn write_application<W: Write>(out: &mut W, app: &Application) -> Result<()> {
    writeln!(out, "***** Application *****")?;
    writeln!(out, "{}: {} cores, {} communications", app.name(), app.num_cores(), app.tasks().len())?;
    writeln!(out, "communication matrix (Mb/s):")?;
    for row in app.cg() {
        writeln!(out, "{}", row.iter().map(|bandwidth| format!("{:.3}", bandwidth)).join("\t"))?;
    }
    writeln!(out)?;
    Ok(())
}

fn write_optimization<W: Write>(out: &mut W, input: &ReportInput) -> Result<()> {
    writeln!(out, "***** Optimization *****")?;
    writeln!(out, "{}", input.strategy)?;
    writeln!(out, "iterations {}", input.outcome.iterations)?;
    writeln!(out, "execution time {} ms", input.outcome.elapsed.as_millis())?;
    writeln!(out)?;
    Ok(())
}

fn write_solution<W: Write>(out: &mut W, outcome: &SearchOutcome) -> Result<()> {
    let evaluation = &outcome.evaluation;
    writeln!(out, "***** Mapping Solution *****")?;
    writeln!(out, "mapping matrix:")?;
    write!(out, "{}", outcome.mapping)?;
    match evaluation.worst_case {
        Some((src, dst)) => writeln!(out, "Worst case path src core: {} dst core: {}", src, dst)?,
        None => writeln!(out, "Worst case path: none")?,
    }
    writeln!(out, "Communications adding noise:")?;
    for noise in &evaluation.noise {
        writeln!(out, "{} -> {} ({:.3} dB)", noise.task.src, noise.task.dst, noise.impact)?;
    }
    writeln!(out)?;
    writeln!(out, "signal attenuation: {:.3} dB", evaluation.signal_attenuation)?;
    match evaluation.noise_attenuation {
        Some(noise) => writeln!(out, "noise attenuation: {:.3} dB", noise)?,
        None => writeln!(out, "noise attenuation: none")?,
    }
    writeln!(out, "SNR WC {:.3}", evaluation.snr)?;
    writeln!(out, "Laser Power Consumption {:.3} mW", evaluation.laser_power)?;
    Ok(())
}
