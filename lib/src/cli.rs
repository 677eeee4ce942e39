//! Command-line front end.
//!
//! Resolves scheduler settings from an optional JSON file and flags, runs
//! [`postprocess`] on the input file and writes the result in place, to
//! `--output`, or as a JSON plan on stdout with `--dry-run`.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{postprocess, Celsius, GCodeProgram, Result, SchedulerConfig};

#[derive(Debug, Parser)]
#[command(
    name = "toolheat",
    about = "Schedule toolchanger heater and fan commands in sliced G-code",
    version
)]
pub struct Cli {
    /// G-code file to process. Rewritten in place unless --output is given.
    pub input: PathBuf,

    /// Seconds a tool may sit unused before it is cooled off (0 disables).
    #[arg(long)]
    pub interval: Option<f64>,

    /// Seconds before a tool change to start heating the docked tool.
    #[arg(long)]
    pub dock_interval: Option<f64>,

    /// Degrees a tool drops while docked (0 disables docking).
    #[arg(long)]
    pub dock_delta: Option<Celsius>,

    /// JSON file with scheduler settings. Flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the result here instead of rewriting the input.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Print the planned insertions as JSON and leave files untouched.
    #[arg(long)]
    pub dry_run: bool,

    /// Log every scheduling decision.
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// Scheduler settings: config file (or defaults), then flag overrides.
    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        let mut config = match &self.config {
            Some(path) => SchedulerConfig::from_file(path)?,
            None => SchedulerConfig::default(),
        };
        if let Some(interval) = self.interval {
            config = config.with_interval(interval);
        }
        if let Some(dock_interval) = self.dock_interval {
            config = config.with_dock_interval(dock_interval);
        }
        if let Some(dock_delta) = self.dock_delta {
            config = config.with_dock_delta(dock_delta);
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    let config = cli.scheduler_config()?;
    let program = GCodeProgram::read_from_file(&cli.input)?;
    info!(input = %cli.input.display(), lines = program.line_count(), "processing");

    let processed = postprocess(&program, &config)?;

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&processed.plan)?);
        return Ok(());
    }

    let output = cli.output.as_ref().unwrap_or(&cli.input);
    processed.program.write_to_file(output)?;
    info!(
        output = %output.display(),
        insertions = processed.plan.report.insertions,
        rewrites = processed.plan.report.rewrites,
        "written"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{run, Cli};
    use crate::Error;

    const HEADER: &str = "\
; temperature = 215,220
; first_layer_temperature = 220,225
; min_fan_speed = 35,35
; max_fan_speed = 100,100
; full_fan_speed_layer = 4,4
; disable_fan_first_layers = 1,1
; fan_always_on = 0,0
";

    fn cli(input: &Path) -> Cli {
        Cli {
            input: input.to_path_buf(),
            interval: None,
            dock_interval: None,
            dock_delta: None,
            config: None,
            output: None,
            dry_run: false,
            verbose: false,
        }
    }

    fn two_tool_program() -> String {
        let mut text = String::from("T0\n;Z:0.2\nG1 F600\n");
        for i in 0..4 {
            text.push_str(if i % 2 == 0 { "G1 X100\n" } else { "G1 X0\n" });
        }
        text.push_str("T1\nG1 X50\n");
        text.push_str(HEADER);
        text
    }

    #[test]
    fn test_rewrites_input_in_place() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("part.gcode");
        fs::write(&input, two_tool_program()).unwrap();

        run(cli(&input)).unwrap();

        let written = fs::read_to_string(&input).unwrap();
        assert!(written.contains("M104 S210 T0\nT1\n"));
        assert!(written.ends_with(HEADER));
    }

    #[test]
    fn test_output_and_dry_run_leave_input_untouched() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("part.gcode");
        let output = dir.path().join("out.gcode");
        fs::write(&input, two_tool_program()).unwrap();

        let mut args = cli(&input);
        args.output = Some(output.clone());
        run(args).unwrap();
        assert_eq!(fs::read_to_string(&input).unwrap(), two_tool_program());
        assert!(fs::read_to_string(&output).unwrap().contains("Turning off T0"));

        let mut args = cli(&input);
        args.dry_run = true;
        run(args).unwrap();
        assert_eq!(fs::read_to_string(&input).unwrap(), two_tool_program());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("toolheat.json");
        fs::write(&config, r#"{ "interval": 60, "dock_delta": 15 }"#).unwrap();

        let mut args = cli(Path::new("unused.gcode"));
        args.config = Some(config);
        args.dock_delta = Some(5);

        let resolved = args.scheduler_config().unwrap();
        assert_eq!(resolved.interval, 60.0);
        assert_eq!(resolved.dock_interval, 10.0);
        assert_eq!(resolved.dock_delta, 5);
    }

    #[test]
    fn test_infeasible_dock_interval_writes_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("part.gcode");
        fs::write(&input, two_tool_program()).unwrap();

        let mut args = cli(&input);
        args.dock_interval = Some(60.0);
        let result = run(args);

        assert!(matches!(result, Err(Error::Schedule(_))));
        assert_eq!(fs::read_to_string(&input).unwrap(), two_tool_program());
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = tempdir().unwrap();
        let result = run(cli(&dir.path().join("missing.gcode")));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
