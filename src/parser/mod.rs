mod parsers;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use regex::Regex;

use crate::application::Application;
use crate::config::Configuration;

pub use self::parsers::*;

/// Loads a `key = value` configuration file and validates it.
pub fn parse_configuration<P: AsRef<Path>>(path: P) -> Result<Configuration> {
    let file = File::open(path.as_ref()).context(format!("Failed to open configuration file: {:?}", path.as_ref()))?;
    let config = read_configuration(BufReader::new(file))
        .with_context(|| format!("Invalid configuration file: {:?}", path.as_ref()))?;
    info!("Loaded configuration from {:?}", path.as_ref());
    Ok(config)
}

pub fn read_configuration<R: BufRead>(reader: R) -> Result<Configuration> {
    let assignment = Regex::new(r"^([A-Za-z][A-Za-z0-9_ ]*?)\s*=\s*(.+)$")?;
    let mut config = Configuration::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = significant(&line);
        if line.is_empty() {
            continue;
        }
        let number = index + 1;
        let caps = assignment
            .captures(line)
            .ok_or_else(|| anyhow!("line {}: expected `key = value`, got '{}'", number, line))?;
        let (key, value) = (&caps[1], caps[2].trim());
        apply(&mut config, key, value).with_context(|| format!("line {}: bad value '{}' for '{}'", number, value, key))?;
        debug!("configuration {} = {}", key, value);
    }

    config.validate()?;
    Ok(config)
}

fn number<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(value.parse::<T>()?)
}

fn apply(config: &mut Configuration, key: &str, value: &str) -> Result<()> {
    match key.to_ascii_lowercase().replace(' ', "_").as_str() {
        "router" => config.router = value.parse()?,
        "topology" => config.topology = value.parse()?,
        "routing" => config.routing = value.parse()?,
        "rows" | "m" => config.rows = number(value)?,
        "columns" | "n" => config.columns = number(value)?,
        "chip_size" => config.chip_size = number(value)?,
        "propagation_loss" => config.loss.propagation = number(value)?,
        "crossing_loss" => config.loss.crossing = number(value)?,
        "ppse_off_loss" => config.loss.ppse_off = number(value)?,
        "ppse_on_loss" => config.loss.ppse_on = number(value)?,
        "cpse_off_loss" => config.loss.cpse_off = number(value)?,
        "cpse_on_loss" => config.loss.cpse_on = number(value)?,
        "crossing_crosstalk" => config.crosstalk.crossing = number(value)?,
        "ppse_off_crosstalk" => config.crosstalk.ppse_off = number(value)?,
        "ppse_on_crosstalk" => config.crosstalk.ppse_on = number(value)?,
        "photodetector_sensitivity" => config.sensitivity = number(value)?,
        "laser_efficiency" => config.efficiency = number(value)?,
        "modulation_rate" => config.modulation_rate = number(value)?,
        "strategy" => config.strategy = value.parse()?,
        "objective" => config.objective = value.parse()?,
        "iterations" => config.iterations = number(value)?,
        "population" => config.population = number(value)?,
        "offspring" => config.offspring = number(value)?,
        "stop_on_stagnation" => {
            config.stop_on_stagnation = parse_flag(value).ok_or_else(|| anyhow!("expected true or false"))?
        }
        "seed" => {
            config.seed = if value.eq_ignore_ascii_case("none") { None } else { Some(number(value)?) };
        }
        _ => bail!("unknown key '{}'", key),
    }
    Ok(())
}

/// Loads an application: `cores = N`, then one `src -> dst [bandwidth]`
/// line per communication. Bandwidth is in Mb/s and defaults to the full
/// modulation rate.
pub fn parse_application<P: AsRef<Path>>(path: P, modulation_rate: u32) -> Result<Application> {
    let file = File::open(path.as_ref()).context(format!("Failed to open application file: {:?}", path.as_ref()))?;
    let application = read_application(BufReader::new(file), modulation_rate)
        .with_context(|| format!("Invalid application file: {:?}", path.as_ref()))?
        .with_name(&application_name(path.as_ref()));
    info!(
        "Loaded application {} with {} cores and {} communications",
        application.name(),
        application.num_cores(),
        application.tasks().len()
    );
    Ok(application)
}

pub fn read_application<R: BufRead>(reader: R, modulation_rate: u32) -> Result<Application> {
    let header = Regex::new(r"(?i)^cores\s*=\s*(\d+)$")?;
    let edge = Regex::new(r"^(\d+)\s*->\s*(\d+)(?:\s+(\S+))?$")?;
    let default_bandwidth = f64::from(modulation_rate) * 1000.0;
    let mut cg: Option<Vec<Vec<f64>>> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = significant(&line);
        if line.is_empty() {
            continue;
        }
        let number = index + 1;

        let Some(matrix) = cg.as_mut() else {
            let caps = header
                .captures(line)
                .ok_or_else(|| anyhow!("line {}: expected `cores = N` before any communication", number))?;
            let cores: usize = caps[1].parse().with_context(|| format!("line {}: core count too large", number))?;
            if cores == 0 {
                bail!("line {}: an application needs at least one core", number);
            }
            cg = Some(vec![vec![0.0; cores]; cores]);
            continue;
        };

        let caps = edge
            .captures(line)
            .ok_or_else(|| anyhow!("line {}: expected `src -> dst [bandwidth]`, got '{}'", number, line))?;
        let cores = matrix.len();
        let src: usize = caps[1].parse().with_context(|| format!("line {}: bad source core", number))?;
        let dst: usize = caps[2].parse().with_context(|| format!("line {}: bad destination core", number))?;
        if src >= cores || dst >= cores {
            bail!("line {}: core ids must be below {}, got {} -> {}", number, cores, src, dst);
        }
        if src == dst {
            bail!("line {}: core {} cannot communicate with itself", number, src);
        }
        let bandwidth = match caps.get(3) {
            Some(value) => value
                .as_str()
                .parse::<f64>()
                .with_context(|| format!("line {}: bad bandwidth '{}'", number, value.as_str()))?,
            None => default_bandwidth,
        };
        if !(bandwidth > 0.0) || !bandwidth.is_finite() {
            bail!("line {}: bandwidth must be positive, got {}", number, bandwidth);
        }
        if matrix[src][dst] != 0.0 {
            bail!("line {}: communication {} -> {} is listed twice", number, src, dst);
        }
        matrix[src][dst] = bandwidth;
    }

    let cg = cg.ok_or_else(|| anyhow!("missing `cores = N` header"))?;
    Ok(Application::new(cg.len(), cg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Objective, StrategyKind};
    use crate::router::RouterKind;
    use crate::routing::RoutingKind;
    use crate::topology::TopologyKind;
    use std::io::Cursor;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("onocmap_{}_{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn configuration_file_overrides_defaults() {
        let path = temp_file(
            "torus.cfg",
            "# folded torus\n\
             router = OXY\n\
             topology = TorusFolded\n\
             routing = XYTorusFolded\n\
             rows = 3\n\
             columns = 5   # wide\n\
             crossing_loss = -0.05\n\
             strategy = ListMapping\n\
             objective = Power loss\n\
             stop_on_stagnation = yes\n\
             seed = 42\n",
        );
        let config = parse_configuration(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.router, RouterKind::Oxy);
        assert_eq!(config.topology, TopologyKind::TorusFolded);
        assert_eq!(config.routing, RoutingKind::XyTorusFolded);
        assert_eq!((config.rows, config.columns), (3, 5));
        assert_eq!(config.loss.crossing, -0.05);
        assert_eq!(config.strategy, StrategyKind::List);
        assert_eq!(config.objective, Objective::PowerLoss);
        assert!(config.stop_on_stagnation);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.iterations, Configuration::default().iterations);
    }

    #[test]
    fn configuration_errors_name_the_line() {
        let err = read_configuration(Cursor::new("rows = 4\n\ncolour = blue\n")).unwrap_err();
        assert!(format!("{:#}", err).contains("line 3"));

        let err = read_configuration(Cursor::new("rows = four\n")).unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));

        let err = read_configuration(Cursor::new("just words\n")).unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));
    }

    #[test]
    fn configuration_is_validated() {
        assert!(read_configuration(Cursor::new("topology = TorusUnfolded\n")).is_err());
        assert!(read_configuration(Cursor::new("topology = TorusUnfolded\nrouting = XYTorusUnfolded\n")).is_ok());
        assert!(read_configuration(Cursor::new("rows = 1\n")).is_err());
    }

    #[test]
    fn application_file_builds_tasks() {
        let path = temp_file("pipeline.app", "cores = 3\n0 -> 1 500\n# default bandwidth\n1 -> 2\n");
        let app = parse_application(&path, 10).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(app.name(), format!("onocmap_{}_pipeline", std::process::id()));
        assert_eq!(app.num_cores(), 3);
        assert_eq!(app.bandwidth(0, 1), 500.0);
        assert_eq!(app.bandwidth(1, 2), 10_000.0);
        assert_eq!(app.tasks().len(), 2);
    }

    #[test]
    fn application_errors_name_the_line() {
        let cases = [
            ("0 -> 1\n", "line 1"),
            ("cores = 2\n0 -> 2\n", "line 2"),
            ("cores = 2\n\n1 -> 1\n", "line 3"),
            ("cores = 2\n0 -> 1 0\n", "line 2"),
            ("cores = 2\n0 -> 1\n0 -> 1 5\n", "line 3"),
            ("cores = 2\n0 => 1\n", "line 2"),
        ];
        for (text, expected) in cases {
            let err = read_application(Cursor::new(text), 10).unwrap_err();
            assert!(format!("{:#}", err).contains(expected), "{:#} should mention {}", err, expected);
        }
        assert!(read_application(Cursor::new("# empty\n"), 10).is_err());
    }
}
