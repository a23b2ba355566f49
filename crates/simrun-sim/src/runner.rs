//! Running simulations as subprocesses and reading their output

use std::sync::LazyLock;

use regex::Regex;
use simrun_core::{run_captured, CapturedOutput, CommandSpec, Interrupt};
use tracing::debug;

use crate::error::{Result, SimulationError};
use crate::project::SimulationProject;
use crate::run::SimulationRun;

static ERROR_IN_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!> Error: (.*) -- in module (.*)").expect("Invalid regex"));

static ERROR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<!> Error: (.*)").expect("Invalid regex"));

static TIME_LIMIT_REACHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!> Simulation time limit reached -- at t=(.*), event #(\d+)").expect("Invalid regex")
});

static INTERACTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"The simulation wanted to ask a question|The simulation attempted to prompt for user input")
        .expect("Invalid regex")
});

/// A finished simulation and what its output says
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub captured: CapturedOutput,
    pub error_message: Option<String>,
    pub error_module: Option<String>,
    pub last_event_number: Option<u64>,
    pub last_simulation_time: Option<String>,
    /// The simulation wanted user input, which a batch run cannot give
    pub interactive: bool,
    /// Standard output matched the completion marker
    pub completed: bool,
}

impl SimulationOutput {
    /// Read a captured simulation run
    pub fn analyze(captured: CapturedOutput, completion_marker: &Regex) -> Self {
        let (error_message, error_module) = match ERROR_IN_MODULE.captures(&captured.stderr) {
            Some(c) => (Some(c[1].trim().to_string()), Some(c[2].trim().to_string())),
            None => (
                ERROR.captures(&captured.stderr).map(|c| c[1].trim().to_string()),
                None,
            ),
        };
        let (last_simulation_time, last_event_number) = match TIME_LIMIT_REACHED.captures(&captured.stdout) {
            Some(c) => (Some(c[1].to_string()), c[2].parse().ok()),
            None => (None, None),
        };
        let interactive = INTERACTIVE.is_match(&captured.stderr);
        let completed = completion_marker.is_match(&captured.stdout);
        Self {
            captured,
            error_message,
            error_module,
            last_event_number,
            last_simulation_time,
            interactive,
            completed,
        }
    }

    /// Whether the simulation was stopped by SIGINT
    pub fn cancelled(&self) -> bool {
        self.captured.interrupted
    }

    /// Exit code, or the negated signal number for a killed process
    pub fn exit_code(&self) -> i32 {
        self.captured
            .exit_code
            .or(self.captured.signal.map(|s| -s))
            .unwrap_or(-1)
    }

    /// Error message and module, e.g. `Division by zero -- in module net.host`
    pub fn complete_error_message(&self) -> Option<String> {
        self.error_message.as_ref().map(|message| match &self.error_module {
            Some(module) => format!("{} -- in module {}", message, module),
            None => message.clone(),
        })
    }
}

/// The subprocess invocation for `run`
pub fn command_spec(project: &SimulationProject, run: &SimulationRun, additional: &[String]) -> CommandSpec {
    let mut spec = CommandSpec::new(project.executable(run.mode))
        .with_args(run.args(project, additional))
        .with_cwd(project.full_path(&run.working_directory));
    for (key, value) in project.env() {
        spec = spec.with_env(key, value);
    }
    spec
}

/// Run a simulation to completion
pub fn run_simulation(
    project: &SimulationProject,
    run: &SimulationRun,
    additional: &[String],
    interrupt: Option<&Interrupt>,
) -> Result<SimulationOutput> {
    let program = project.executable(run.mode);
    if !program.contains('/') && which::which(&program).is_err() {
        return Err(SimulationError::ExecutableNotFound(program));
    }
    let spec = command_spec(project, run, additional);
    let captured = run_captured(&spec, interrupt)?;
    let output = SimulationOutput::analyze(captured, project.completion_marker());
    debug!(
        parameters = %run.parameters(),
        exit_code = output.exit_code(),
        completed = output.completed,
        "simulation finished"
    );
    Ok(output)
}
