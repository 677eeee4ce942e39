//! End-to-end thermal scheduling tests.
//!
//! These tests run the complete pipeline on small synthetic programs:
//! - Slicer header parsing
//! - Idle cool/heat and dock cool/heat at each tool change
//! - Tool shutdown and heater directive reconciliation
//! - Merging the insertions back into the program
//!
//! Every move runs at F600 (10 mm/s), so a 100 mm move takes 10 s and a
//! 50 mm move takes 5 s.

use toolheat::profiles::ProfileError;
use toolheat::{postprocess, Error, GCodeProgram, ScheduleError, SchedulerConfig};

const HEADER: &str = "\
; temperature = 215,220
; first_layer_temperature = 220,225
; min_fan_speed = 35,35
; max_fan_speed = 100,100
; full_fan_speed_layer = 5,5
; disable_fan_first_layers = 1,1
; fan_always_on = 0,0
";

/// Builds a program line by line, with the slicer header appended at the end.
struct ProgramBuilder {
    lines: Vec<String>,
    at_origin: bool,
}

impl ProgramBuilder {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            at_origin: true,
        }
    }

    fn line(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// `count` moves of 10 s each, bouncing between X0 and X100.
    fn travel(mut self, count: usize) -> Self {
        for _ in 0..count {
            let target = if self.at_origin { "G1 X100" } else { "G1 X0" };
            self.at_origin = !self.at_origin;
            self.lines.push(target.to_string());
        }
        self
    }

    fn build_with(self, header: &str) -> GCodeProgram {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text.push_str(header);
        GCodeProgram::from_string(&text)
    }

    fn build(self) -> GCodeProgram {
        self.build_with(HEADER)
    }
}

fn run(program: &GCodeProgram, config: SchedulerConfig) -> GCodeProgram {
    postprocess(program, &config).unwrap().program
}

/// Output lines from the first line equal to `from` up to (excluding) the
/// first following line equal to `to`.
fn between<'a>(program: &'a GCodeProgram, from: &str, to: &str) -> Vec<&'a str> {
    let lines = program.lines();
    let start = lines.iter().position(|l| l == from).unwrap();
    let end = start + lines[start..].iter().position(|l| l == to).unwrap();
    lines[start..end].iter().map(String::as_str).collect()
}

fn respond(message: &str) -> String {
    format!("RESPOND TYPE=echo MSG=\"{}\"", message)
}

/// T0 prints 130 s, T1 prints 15 s, then T0 again.
fn short_swap_program() -> GCodeProgram {
    ProgramBuilder::new()
        .line("; generated for a two tool toolchanger")
        .line("T0")
        .line(";Z:0.2")
        .line("G1 F600")
        .travel(13)
        .line("T1")
        .line("G1 X50")
        .line("G1 X100")
        .line("G1 X50")
        .line("T0")
        .line("G1 X0 Y0")
        .build()
}

/// Test the full schedule around two quick swaps on the first layer
#[test]
fn test_short_swap_schedule() {
    let input = short_swap_program();
    let processed = postprocess(&input, &SchedulerConfig::default()).unwrap();
    let output = &processed.program;

    assert_eq!(output.line_count(), input.line_count() + 16);
    assert_eq!(processed.plan.report.tool_changes, 3);
    assert_eq!(processed.plan.report.layers, 1);

    // T1 waited 130 s for its first use.
    assert_eq!(
        between(output, "G1 F600", "G1 X100"),
        vec![
            "G1 F600".to_string(),
            respond("Cooling T1 to 0"),
            "M104 S0 T1".to_string(),
        ]
    );

    // Dock cool of T0, then the dock heat for its return wins.
    let before_t1 = between(output, "M104 S225 T1", "T1");
    assert_eq!(
        &before_t1[before_t1.len() - 4..],
        [
            respond("Cooling T0 to 210").as_str(),
            "M104 S210 T0",
            respond("Heating T0 to 220").as_str(),
            "M104 S220 T0",
        ]
    );

    // Dock cool of T1, then T1 is shut off after its last use.
    assert_eq!(
        between(output, "T1", "G1 X0 Y0")[4..],
        [
            respond("Cooling T1 to 215").as_str(),
            "M104 S215 T1",
            "T0",
            respond("Turning off T1").as_str(),
            "M104 T1 S0",
            "M106 T1 S0",
            "SET_STEPPER_ENABLE STEPPER=extruder1 ENABLE=0",
        ]
    );

    let collisions = &processed.plan.report.collisions;
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].superseded, "M104 S210 T0");
    assert_eq!(collisions[0].effective, "M104 S220 T0");

    assert!(output.to_string().ends_with(HEADER));
}

/// Test idle cooling and pre-heating when a tool sits out for a long stretch
#[test]
fn test_long_idle_schedule() {
    let input = ProgramBuilder::new()
        .line("; generated for a two tool toolchanger")
        .line("T0")
        .line(";Z:0.2")
        .line("G1 F600")
        .travel(4)
        .line("T1")
        .travel(20)
        .line("T0")
        .line("G1 X0 Y0")
        .build();

    let plan = postprocess(&input, &SchedulerConfig::default()).unwrap().plan;

    let at = |anchor: usize| {
        plan.insertions
            .iter()
            .filter(|ins| ins.anchor_line == anchor)
            .map(|ins| ins.text.as_str())
            .collect::<Vec<_>>()
    };

    // First change: dock cool T0 just before, dock heat T1 20 s ahead.
    assert_eq!(at(7)[1], "M104 S210 T0");
    assert_eq!(at(5)[1], "M104 S225 T1");
    // T0 idled 200 s: off right after it was put down, back up 130 s ahead.
    assert_eq!(at(9)[1], "M104 S0 T0");
    assert_eq!(at(15)[1], "M104 S210 T0");
    assert_eq!(at(26)[1], "M104 S220 T0");
    assert_eq!(at(28)[1], "M104 S215 T1");
    assert_eq!(at(29).len(), 4);
    assert_eq!(plan.insertions.len(), 16);
}

/// Test that slicer directives for a docked tool are lowered from the
/// dock-cooled temperature
#[test]
fn test_directive_for_docked_tool_is_lowered() {
    let input = ProgramBuilder::new()
        .line("T0")
        .line(";Z:0.2")
        .line("G1 F600")
        .travel(4)
        .line("T1")
        .line(";Z:0.4")
        .line("M104 S215 T0")
        .travel(4)
        .line("T0")
        .line("G1 X100")
        .build();

    let processed = postprocess(&input, &SchedulerConfig::default().with_interval(0.0)).unwrap();
    assert_eq!(processed.plan.rewrites.len(), 1);
    assert_eq!(processed.plan.rewrites[0].line, 9);

    let output = processed.program;
    assert_eq!(
        between(&output, ";Z:0.4", "G1 X100"),
        vec![";Z:0.4", "M104 S200 T0"]
    );
    // Back to the full layer 2 temperature before it is picked up.
    assert!(output.lines().iter().any(|l| *l == respond("Heating T0 to 215")));
}

/// Test that a directive for a tool the scheduler turned off is forced to 0
#[test]
fn test_directive_for_cooled_tool_is_zeroed() {
    let input = ProgramBuilder::new()
        .line("T0")
        .line(";Z:0.2")
        .line("G1 F600")
        .line("M104 S225 T1")
        .travel(4)
        .line("T1")
        .line("G1 X100")
        .build();

    let output = run(&input, SchedulerConfig::default().with_interval(30.0));
    assert_eq!(
        between(&output, "G1 F600", "G1 X100"),
        vec![
            "G1 F600".to_string(),
            respond("Cooling T1 to 0"),
            "M104 S0 T1".to_string(),
            "M104 S0 T1".to_string(),
        ]
    );
}

/// Test that too little travel before a tool change aborts the run
#[test]
fn test_dock_interval_infeasible() {
    let input = ProgramBuilder::new()
        .line("T0")
        .line(";Z:0.2")
        .line("G1 F600")
        .line("G1 X50")
        .line("T1")
        .build();

    let result = postprocess(&input, &SchedulerConfig::default());
    match result {
        Err(Error::Schedule(ScheduleError::DockIntervalInfeasible { line, tool, .. })) => {
            assert_eq!(line, 4);
            assert_eq!(tool, 1);
        }
        other => panic!("expected infeasible dock interval, got {:?}", other.map(|p| p.plan)),
    }

    // The same program is fine without docking.
    assert!(postprocess(&input, &SchedulerConfig::default().without_docking()).is_ok());
}

/// Test that a single-tool print is left byte-identical
#[test]
fn test_single_tool_program_is_unchanged() {
    let input = ProgramBuilder::new()
        .line("T0")
        .line(";Z:0.2")
        .line("G1 F600")
        .travel(30)
        .line(";Z:0.4")
        .travel(30)
        .build();

    let processed = postprocess(&input, &SchedulerConfig::default()).unwrap();
    assert!(processed.plan.is_empty());
    assert_eq!(processed.program.to_string(), input.to_string());
}

/// Test that a program without any tool change passes through
#[test]
fn test_program_without_tool_change_is_unchanged() {
    let input = ProgramBuilder::new()
        .line("G28")
        .line("G1 F600")
        .travel(20)
        .build();

    let processed = postprocess(&input, &SchedulerConfig::default()).unwrap();
    assert!(processed.plan.report.print_start.is_none());
    assert_eq!(processed.program.to_string(), input.to_string());
}

/// Test fan commands for tools that keep their fan on
#[test]
fn test_fan_always_on() {
    let header = HEADER.replace("; fan_always_on = 0,0", "; fan_always_on = 1,1");
    let input = ProgramBuilder::new()
        .line("T0")
        .line(";Z:0.2")
        .line(";Z:0.4")
        .line("G1 F600")
        .travel(4)
        .line("T1")
        .line("G1 X100")
        .build_with(&header);

    let output = run(&input, SchedulerConfig::default().with_interval(0.0));

    // Layer 2 of a fan ramp from layer 1 to 5 runs at 25%.
    assert_eq!(
        between(&output, "M104 S205 T0", "T1"),
        vec!["M104 S205 T0", "M106 S0 T0"]
    );
    let tail = between(&output, "T1", "; temperature = 215,220");
    assert_eq!(tail[tail.len() - 2..], ["G1 X100", "M106 S63 T1"]);
}

/// Test that CRLF input stays CRLF on every inserted and rewritten line
#[test]
fn test_crlf_program_keeps_line_endings() {
    let text = ProgramBuilder::new()
        .line("T0")
        .line(";Z:0.2")
        .line("G1 F600")
        .travel(4)
        .line("T1")
        .line("M104 S215 T0")
        .travel(4)
        .line("T0")
        .line("G1 X100")
        .build()
        .to_string()
        .replace('\n', "\r\n");
    let input = GCodeProgram::from_string(&text);

    let processed = postprocess(&input, &SchedulerConfig::default().with_interval(0.0)).unwrap();
    assert!(!processed.plan.insertions.is_empty());
    assert_eq!(processed.plan.rewrites.len(), 1);

    let output = processed.program;
    assert!(output.lines().iter().all(|line| line.ends_with('\r')));
    assert!(output.lines().iter().any(|line| line == "M104 S200 T0\r"));
}

/// Test header errors surface before anything is scheduled
#[test]
fn test_missing_header_variable() {
    let input = GCodeProgram::from_string("T0\nG1 X10 F600\nT1\n; temperature = 215,220\n");
    let result = postprocess(&input, &SchedulerConfig::default());
    assert!(matches!(
        result,
        Err(Error::Profile(ProfileError::MissingVariable(ref name))) if name == "first_layer_temperature"
    ));
}

/// Test that a tool missing from the header is rejected
#[test]
fn test_unknown_tool() {
    let input = ProgramBuilder::new()
        .line("T0")
        .line("G1 F600")
        .travel(4)
        .line("T3")
        .build();

    let result = postprocess(&input, &SchedulerConfig::default());
    assert!(matches!(
        result,
        Err(Error::Schedule(ScheduleError::Profile(ProfileError::UnknownTool { tool: 3, .. })))
    ));
}
