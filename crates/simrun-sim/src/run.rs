//! Simulation run descriptions

use serde::{Deserialize, Serialize};

use crate::project::{BuildMode, SimulationProject};

pub const DEFAULT_INI_FILE: &str = "omnetpp.ini";
pub const DEFAULT_CONFIG: &str = "General";

fn default_ini_file() -> String {
    DEFAULT_INI_FILE.to_string()
}

/// Everything needed to run one simulation, independent of the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationRun {
    /// Working directory relative to the project root
    pub working_directory: String,

    #[serde(default = "default_ini_file")]
    pub ini_file: String,

    pub config: String,

    #[serde(default)]
    pub run: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itervars: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_time_limit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time_limit: Option<String>,

    #[serde(default)]
    pub mode: BuildMode,

    #[serde(default)]
    pub record_eventlog: bool,

    /// Additional command line arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl SimulationRun {
    pub fn new(working_directory: impl Into<String>, config: impl Into<String>, run: u32) -> Self {
        Self {
            working_directory: working_directory.into(),
            ini_file: default_ini_file(),
            config: config.into(),
            run,
            itervars: None,
            sim_time_limit: None,
            cpu_time_limit: None,
            mode: BuildMode::default(),
            record_eventlog: false,
            extra_args: Vec::new(),
        }
    }

    pub fn with_ini_file(mut self, ini_file: impl Into<String>) -> Self {
        self.ini_file = ini_file.into();
        self
    }

    pub fn with_sim_time_limit(mut self, limit: impl Into<String>) -> Self {
        self.sim_time_limit = Some(limit.into());
        self
    }

    pub fn with_cpu_time_limit(mut self, limit: impl Into<String>) -> Self {
        self.cpu_time_limit = Some(limit.into());
        self
    }

    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_eventlog(mut self, record: bool) -> Self {
        self.record_eventlog = record;
        self
    }

    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Short description, omitting values that are at their defaults:
    /// `examples/ethernet -c Switch -r 2 for 10s`
    pub fn parameters(&self) -> String {
        let mut text = self.working_directory.clone();
        if self.ini_file != DEFAULT_INI_FILE {
            text.push_str(&format!(" -f {}", self.ini_file));
        }
        if self.config != DEFAULT_CONFIG {
            text.push_str(&format!(" -c {}", self.config));
        }
        if self.run != 0 {
            text.push_str(&format!(" -r {}", self.run));
        }
        if let Some(limit) = &self.sim_time_limit {
            text.push_str(&format!(" for {}", limit));
        }
        text
    }

    /// Command line arguments after the executable
    ///
    /// `-s -u <ui> <project args> -f <ini> -c <config> -r <run>
    /// [--sim-time-limit X] [--cpu-time-limit Y] [--record-eventlog true]
    /// <extra args> <additional>`
    pub fn args(&self, project: &SimulationProject, additional: &[String]) -> Vec<String> {
        let mut args = vec!["-s".to_string(), "-u".to_string(), project.user_interface().to_string()];
        args.extend(project.default_args());
        args.extend([
            "-f".to_string(),
            self.ini_file.clone(),
            "-c".to_string(),
            self.config.clone(),
            "-r".to_string(),
            self.run.to_string(),
        ]);
        if let Some(limit) = &self.sim_time_limit {
            args.extend(["--sim-time-limit".to_string(), limit.clone()]);
        }
        if let Some(limit) = self.cpu_time_limit.as_deref().or(project.cpu_time_limit()) {
            args.extend(["--cpu-time-limit".to_string(), limit.to_string()]);
        }
        if self.record_eventlog {
            args.extend(["--record-eventlog".to_string(), "true".to_string()]);
        }
        args.extend(self.extra_args.iter().cloned());
        args.extend(additional.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrun_core::Config;
    use std::path::Path;

    fn project() -> SimulationProject {
        let mut config = Config::default();
        config.project.ned_path = Vec::new();
        SimulationProject::from_config(&config, Path::new("/work/inet")).unwrap()
    }

    #[test]
    fn test_parameters_omit_defaults() {
        assert_eq!(SimulationRun::new("examples/ethernet", "General", 0).parameters(), "examples/ethernet");
        let run = SimulationRun::new("examples/ethernet", "Switch", 2)
            .with_ini_file("switch.ini")
            .with_sim_time_limit("10s");
        assert_eq!(run.parameters(), "examples/ethernet -f switch.ini -c Switch -r 2 for 10s");
    }

    #[test]
    fn test_args() {
        let run = SimulationRun::new("examples/ethernet", "Switch", 1)
            .with_sim_time_limit("10s")
            .with_eventlog(true)
            .with_extra_args(["--seed-set=3"]);
        let args = run.args(&project(), &["--fingerprint".to_string(), "0000-0000/tplx".to_string()]);
        assert_eq!(
            args,
            vec![
                "-s", "-u", "Cmdenv", "-f", "omnetpp.ini", "-c", "Switch", "-r", "1", "--sim-time-limit", "10s",
                "--record-eventlog", "true", "--seed-set=3", "--fingerprint", "0000-0000/tplx",
            ]
        );
    }

    #[test]
    fn test_serde_defaults() {
        let run: SimulationRun =
            serde_json::from_str(r#"{"working_directory": "examples/ethernet", "config": "General"}"#).unwrap();
        assert_eq!(run, SimulationRun::new("examples/ethernet", "General", 0));
    }
}
