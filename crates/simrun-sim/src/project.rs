//! Simulation projects

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use simrun_core::Config;

use crate::error::{Result, SimulationError};

/// Which build of the simulation executable to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Release,
    Debug,
}

impl BuildMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A simulation project: where it lives and how its executable is invoked
#[derive(Debug, Clone)]
pub struct SimulationProject {
    name: String,
    root: PathBuf,
    executable: String,
    debug_executable: String,
    ned_path: Vec<String>,
    libraries: Vec<String>,
    user_interface: String,
    completion_marker: Regex,
    env: HashMap<String, String>,
    cpu_time_limit: Option<String>,
}

impl SimulationProject {
    /// Build the project described by `config`, whose file lives in `config_dir`
    pub fn from_config(config: &Config, config_dir: &Path) -> Result<Self> {
        let project = &config.project;
        let completion_marker = Regex::new(&project.completion_marker)
            .map_err(|e| SimulationError::Config(format!("completion_marker: {}", e)))?;
        let root = config.project_root(config_dir);
        let name = project.name.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "simulation".to_string())
        });
        Ok(Self {
            name,
            root,
            executable: project.executable.clone(),
            debug_executable: project.debug_executable.clone(),
            ned_path: project.ned_path.clone(),
            libraries: project.libraries.clone(),
            user_interface: project.user_interface.clone(),
            completion_marker,
            env: project.env.clone(),
            cpu_time_limit: config.execution.cpu_time_limit.clone(),
        })
    }

    /// A project at `root` with default settings
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        Self::from_config(&Config::default(), &root)
    }

    /// The same project checked out at `root`, named after that directory
    pub fn relocated(&self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone());
        Self {
            name,
            root,
            ..self.clone()
        }
    }

    /// Run `executable` instead of the configured one, in every mode
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        let executable = executable.into();
        self.debug_executable = executable.clone();
        self.executable = executable;
        self
    }

    pub fn with_user_interface(mut self, user_interface: impl Into<String>) -> Self {
        self.user_interface = user_interface.into();
        self
    }

    pub fn with_completion_marker(mut self, marker: Regex) -> Self {
        self.completion_marker = marker;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn user_interface(&self) -> &str {
        &self.user_interface
    }

    pub fn completion_marker(&self) -> &Regex {
        &self.completion_marker
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn cpu_time_limit(&self) -> Option<&str> {
        self.cpu_time_limit.as_deref()
    }

    /// Resolve a project-relative path; a leading `/` is relative to the root too
    pub fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// The executable for `mode`. Names without a path separator are looked
    /// up on `PATH`; relative paths resolve against the project root.
    pub fn executable(&self, mode: BuildMode) -> String {
        let executable = match mode {
            BuildMode::Release => &self.executable,
            BuildMode::Debug => &self.debug_executable,
        };
        if executable.contains('/') && Path::new(executable).is_relative() {
            self.root.join(executable).to_string_lossy().into_owned()
        } else {
            executable.clone()
        }
    }

    /// Arguments every simulation of this project receives: the NED path
    /// and the libraries to load
    pub fn default_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.ned_path.is_empty() {
            let separator = if cfg!(windows) { ";" } else { ":" };
            let ned_path = self
                .ned_path
                .iter()
                .map(|p| self.full_path(p).to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(separator);
            args.push("-n".to_string());
            args.push(ned_path);
        }
        for library in &self.libraries {
            args.push("-l".to_string());
            args.push(self.full_path(library).to_string_lossy().into_owned());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let mut config = Config::default();
        config.project.ned_path = vec!["src".to_string(), "examples".to_string()];
        config.project.libraries = vec!["src/INET".to_string()];
        let project = SimulationProject::from_config(&config, Path::new("/work/inet")).unwrap();

        let args = project.default_args();
        assert_eq!(args[0], "-n");
        assert!(args[1].contains("/work/inet/./src") || args[1].contains("/work/inet/src"));
        assert_eq!(args[2], "-l");
        assert!(args[3].ends_with("src/INET"));
    }

    #[test]
    fn test_executable_by_mode() {
        let mut config = Config::default();
        config.project.root = PathBuf::from("/work/inet");
        config.project.executable = "bin/inet".to_string();
        let project = SimulationProject::from_config(&config, Path::new("/")).unwrap();

        assert_eq!(project.executable(BuildMode::Release), "/work/inet/bin/inet");
        assert_eq!(project.executable(BuildMode::Debug), "opp_run_dbg");

        let overridden = project.with_executable("/opt/sim");
        assert_eq!(overridden.executable(BuildMode::Debug), "/opt/sim");
    }

    #[test]
    fn test_relocated_keeps_settings() {
        let mut config = Config::default();
        config.project.root = PathBuf::from("/work/inet");
        config.project.executable = "bin/inet".to_string();
        let project = SimulationProject::from_config(&config, Path::new("/")).unwrap();

        let baseline = project.relocated("/work/inet-baseline");
        assert_eq!(baseline.name(), "inet-baseline");
        assert_eq!(baseline.root(), Path::new("/work/inet-baseline"));
        assert_eq!(baseline.executable(BuildMode::Release), "/work/inet-baseline/bin/inet");
        assert_eq!(baseline.user_interface(), project.user_interface());
    }

    #[test]
    fn test_full_path_and_name() {
        let mut config = Config::default();
        config.project.root = PathBuf::from("/work/inet");
        let project = SimulationProject::from_config(&config, Path::new("/")).unwrap();
        assert_eq!(project.full_path("/examples/ethernet"), PathBuf::from("/work/inet/examples/ethernet"));
        assert_eq!(project.name(), "inet");
    }

    #[test]
    fn test_invalid_completion_marker() {
        let mut config = Config::default();
        config.project.completion_marker = "(".to_string();
        assert!(matches!(
            SimulationProject::from_config(&config, Path::new("/")),
            Err(SimulationError::Config(_))
        ));
    }
}
