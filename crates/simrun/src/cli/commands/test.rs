//! Test command - Run fingerprint tests from spec files or the fingerprint store

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use console::style;
use tracing::{info, warn};

use simrun_cache::FetchTask;
use simrun_dispatch::{Dispatcher, JobId, RemoteTask};
use simrun_fingerprint::{Fingerprint, FingerprintStore};
use simrun_sim::{
    load_spec_files, store_entries, store_test_tasks, BuildMode, FingerprintTestTask, FingerprintUpdateTask,
    GitInfo, RunFilter, SimulationJob, SimulationProject, SimulationRun, SpecFile,
};
use simrun_tasks::{BuildOutcome, RunContext, Task, TaskGroup, TaskResult, TestOutcome, UpdateOutcome};

use crate::cli::commands::group_exit_code;
use crate::cli::workspace::Workspace;
use crate::cli::{output, Cli};
use crate::exit_codes;

type DynTest = dyn Task<Outcome = TestOutcome>;

/// Run fingerprint tests
#[derive(Debug, Args)]
pub struct TestCommand {
    /// Fingerprint spec files or globs (defaults to the configured ones)
    pub spec_files: Vec<String>,

    /// Test the correct fingerprints in the fingerprint store instead of spec files
    #[arg(long)]
    pub from_store: bool,

    /// Fetch (or, with --remote, build) this revision's artifact first
    #[arg(long)]
    pub revision: Option<String>,

    /// Only run working directories matching this regex
    #[arg(long = "working-directory", value_name = "REGEX")]
    pub working_directory: Vec<String>,

    /// Skip working directories matching this regex
    #[arg(long = "exclude-working-directory", value_name = "REGEX")]
    pub exclude_working_directory: Vec<String>,

    /// Only run configs matching this regex
    #[arg(long = "config", value_name = "REGEX")]
    pub config: Vec<String>,

    /// Skip configs matching this regex
    #[arg(long = "exclude-config", value_name = "REGEX")]
    pub exclude_config: Vec<String>,

    /// Only run run numbers matching this regex
    #[arg(long = "run", value_name = "REGEX")]
    pub run: Vec<String>,

    /// Skip run numbers matching this regex
    #[arg(long = "exclude-run", value_name = "REGEX")]
    pub exclude_run: Vec<String>,

    /// Fingerprint ingredients tested from the store (defaults to the configured ones)
    #[arg(long)]
    pub ingredients: Vec<String>,

    /// Run every test this many times
    #[arg(long, default_value = "1")]
    pub repeat: usize,

    /// Simulation executable to use instead of the configured one
    #[arg(long)]
    pub executable: Option<String>,

    /// Build mode of the simulation executable
    #[arg(long, value_enum, default_value = "release")]
    pub mode: ModeArg,

    /// Write calculated fingerprints back: into spec files, or into the
    /// store with --from-store
    #[arg(long)]
    pub update: bool,

    /// With --from-store --update, do not add fingerprints the store lacks
    #[arg(long)]
    pub no_insert: bool,

    /// Record every test verdict in the fingerprint store
    #[arg(long)]
    pub record: bool,

    /// Dispatch the tests through the shared job queue
    #[arg(long)]
    pub remote: bool,

    /// On a fingerprint mismatch, rerun in this checkout of the project and
    /// report where the two runs diverge
    #[arg(long, value_name = "DIR", conflicts_with = "remote")]
    pub baseline: Option<PathBuf>,

    /// Run tests one after another
    #[arg(long)]
    pub sequential: bool,

    /// Number of tests run in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Shuffle the execution order
    #[arg(long)]
    pub shuffle: bool,

    /// Report what would run without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Extra simulation arguments, after `--`
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Build mode argument
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Release,
    Debug,
}

impl From<ModeArg> for BuildMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Release => Self::Release,
            ModeArg::Debug => Self::Debug,
        }
    }
}

/// Where a planned test came from
#[derive(Debug, Clone, Copy)]
struct Origin {
    file: usize,
    entry: usize,
}

/// A planned test before it becomes a local or remote task
struct Planned {
    run: SimulationRun,
    fingerprints: Vec<Fingerprint>,
    expected: TestOutcome,
    origin: Option<Origin>,
}

impl TestCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        if self.repeat == 0 {
            bail!("--repeat must be at least 1");
        }
        if self.remote && self.from_store && self.update {
            bail!("fingerprint store updates run locally; drop --remote");
        }

        let workspace = Workspace::load()?;
        let filter = self.run_filter()?;
        let mut project = workspace.project()?;
        if let Some(executable) = &self.executable {
            project = project.with_executable(executable);
        }
        let baseline = self.baseline.as_ref().map(|dir| Arc::new(project.relocated(dir)));
        let project = Arc::new(project);

        let dispatcher = self.remote.then(|| workspace.dispatcher());
        let build_job = match (&self.revision, &dispatcher) {
            (Some(revision), Some(dispatcher)) => Some(self.submit_build(dispatcher, revision)?),
            (Some(revision), None) if !self.dry_run => {
                if let Some(code) = self.fetch_revision(cli, &workspace, revision) {
                    return Ok(code);
                }
                None
            }
            _ => None,
        };

        if self.from_store && self.update {
            return self.update_store(cli, &workspace, &project, &filter);
        }

        let mut files = Vec::new();
        let planned = if self.from_store {
            self.plan_from_store(&workspace, &project, &filter)?
        } else {
            let patterns = if self.spec_files.is_empty() {
                workspace.config.fingerprint.spec_files.clone()
            } else {
                self.spec_files.clone()
            };
            files = load_spec_files(&workspace.project_root(), &patterns)?;
            plan_from_spec_files(&files, &filter)
                .into_iter()
                .map(|planned| Planned {
                    run: self.prepare(planned.run),
                    ..planned
                })
                .collect()
        };
        if planned.is_empty() {
            if cli.prints_text() {
                output::warning("No fingerprint tests selected");
            }
            return Ok(exit_codes::SUCCESS);
        }
        info!(tests = planned.len(), repeat = self.repeat, remote = self.remote, "running fingerprint tests");

        let calculator_class = &workspace.config.fingerprint.calculator_class;
        let mut tasks: Vec<Arc<DynTest>> = Vec::new();
        let mut plan_index = Vec::new();
        for _ in 0..self.repeat {
            for (index, planned) in planned.iter().enumerate() {
                let task: Arc<DynTest> = match &dispatcher {
                    Some(dispatcher) => Arc::new(self.remote_task(dispatcher, planned, build_job)?),
                    None => {
                        let mut task =
                            FingerprintTestTask::new(Arc::clone(&project), planned.run.clone(), planned.fingerprints.clone())
                                .with_expected(planned.expected)
                                .with_calculator_class(calculator_class);
                        if let Some(baseline) = &baseline {
                            task = task.with_baseline(Arc::clone(baseline));
                        }
                        Arc::new(task)
                    }
                };
                tasks.push(task);
                plan_index.push(index);
            }
        }

        let group = self.configure(TaskGroup::new("fingerprint tests", tasks), &workspace);
        let result = group.run(&workspace.group_context(cli, self.dry_run));
        output::group_result(cli, &result)?;
        if cli.prints_text() {
            report_divergences(result.results());
        }

        if self.dry_run || cli.interrupt.is_triggered() {
            return Ok(group_exit_code(cli, &result));
        }
        if self.update {
            let mut changed = 0;
            for (index, test_result) in plan_index.iter().zip(result.results()) {
                if let Some(origin) = planned[*index].origin {
                    if files[origin.file].apply_result(origin.entry, test_result) {
                        changed += 1;
                    }
                }
            }
            for file in files.iter().filter(|f| f.is_modified()) {
                file.write()?;
            }
            if cli.prints_text() {
                output::success(&format!("Updated {} fingerprint(s) in spec files", changed));
            }
        }
        if self.record {
            let path = workspace.fingerprint_store_path();
            let mut store = FingerprintStore::open(&path)?;
            let git = GitInfo::discover(&workspace.project_root())?;
            for (index, test_result) in plan_index.iter().zip(result.results()) {
                for entry in store_entries(&planned[*index].run, test_result, git.as_ref()) {
                    store.insert(entry);
                }
            }
            store.write()?;
            if cli.prints_text() {
                output::success(&format!("Recorded results in {}", style(path.display()).cyan()));
            }
        }

        Ok(group_exit_code(cli, &result))
    }

    fn run_filter(&self) -> anyhow::Result<RunFilter> {
        let mut filter = RunFilter::new();
        for pattern in &self.working_directory {
            filter = filter.include_working_directory(pattern)?;
        }
        for pattern in &self.exclude_working_directory {
            filter = filter.exclude_working_directory(pattern)?;
        }
        for pattern in &self.config {
            filter = filter.include_config(pattern)?;
        }
        for pattern in &self.exclude_config {
            filter = filter.exclude_config(pattern)?;
        }
        for pattern in &self.run {
            filter = filter.include_run(pattern)?;
        }
        for pattern in &self.exclude_run {
            filter = filter.exclude_run(pattern)?;
        }
        Ok(filter)
    }

    fn ingredients(&self, workspace: &Workspace) -> Vec<String> {
        if self.ingredients.is_empty() {
            workspace.config.fingerprint.ingredients.clone()
        } else {
            self.ingredients.clone()
        }
    }

    /// Apply the mode and pass-through arguments of this invocation
    fn prepare(&self, run: SimulationRun) -> SimulationRun {
        run.with_mode(self.mode.into()).with_extra_args(self.args.iter().cloned())
    }

    fn configure<T: Task + ?Sized>(&self, group: TaskGroup<T>, workspace: &Workspace) -> TaskGroup<T> {
        let execution = &workspace.config.execution;
        group
            .concurrent(!self.sequential && execution.concurrent)
            .with_workers(self.jobs.unwrap_or(execution.concurrency))
            .shuffled(self.shuffle || execution.shuffle)
    }

    /// Make the revision's artifact local; an exit code means stop here
    fn fetch_revision(&self, cli: &Cli, workspace: &Workspace, revision: &str) -> Option<i32> {
        let task = FetchTask::new(workspace.build_cache(), revision, workspace.artifact_destination());
        let ctx = RunContext::new(cli.interrupt.clone());
        let result = task.run(&ctx);
        if cli.prints_text() {
            println!("{}", ctx.take_output().trim_end());
        }
        match result.result {
            BuildOutcome::Done => None,
            BuildOutcome::Cancel => Some(exit_codes::CANCELLED),
            _ => {
                output::error(&format!("Cannot fetch {}: {}", revision, result.error_text()));
                Some(exit_codes::ERROR)
            }
        }
    }

    fn submit_build(&self, dispatcher: &Dispatcher, revision: &str) -> anyhow::Result<JobId> {
        let job = SimulationJob::Build {
            revision: revision.to_string(),
        };
        let id = dispatcher.submit(&job, &[]).context("submitting build job")?;
        info!(revision, job = %id, "submitted build job");
        Ok(id)
    }

    fn remote_task(
        &self,
        dispatcher: &Arc<Dispatcher>,
        planned: &Planned,
        build_job: Option<JobId>,
    ) -> anyhow::Result<RemoteTask<TestOutcome>> {
        let payload = SimulationJob::FingerprintTest {
            run: planned.run.clone(),
            fingerprints: planned.fingerprints.clone(),
            expected: planned.expected,
            revision: self.revision.clone(),
        };
        let mut task = RemoteTask::new(Arc::clone(dispatcher), "fingerprint test", payload.to_value()?)
            .with_action("Checking")
            .with_parameters(planned.run.parameters())
            .with_expected(planned.expected);
        if let Some(job) = build_job {
            task = task.depends_on(job);
        }
        Ok(task)
    }

    fn plan_from_store(
        &self,
        workspace: &Workspace,
        project: &Arc<SimulationProject>,
        filter: &RunFilter,
    ) -> anyhow::Result<Vec<Planned>> {
        let path = workspace.fingerprint_store_path();
        let store = FingerprintStore::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let planned = store_test_tasks(project, &store, filter, &self.ingredients(workspace))
            .into_iter()
            .map(|task| Planned {
                run: self.prepare(task.simulation_run().clone()),
                fingerprints: task.fingerprints().to_vec(),
                expected: task.expected_result(),
                origin: None,
            })
            .collect();
        Ok(planned)
    }

    /// Rerun the store's simulations and record what they calculate
    fn update_store(
        &self,
        cli: &Cli,
        workspace: &Workspace,
        project: &Arc<SimulationProject>,
        filter: &RunFilter,
    ) -> anyhow::Result<i32> {
        let path = workspace.fingerprint_store_path();
        let store = FingerprintStore::open(&path).with_context(|| format!("opening {}", path.display()))?;

        let mut runs = BTreeSet::new();
        for entry in store.entries() {
            if filter.matches(&entry.working_directory, &entry.config, entry.run) {
                runs.insert((
                    entry.working_directory.clone(),
                    entry.ini_file.clone(),
                    entry.config.clone(),
                    entry.run,
                    entry.sim_time_limit.clone(),
                ));
            }
        }
        if runs.is_empty() {
            if cli.prints_text() {
                output::warning("No fingerprint store records selected");
            }
            return Ok(exit_codes::SUCCESS);
        }

        let store = Arc::new(Mutex::new(store));
        let git = GitInfo::discover(&workspace.project_root())?;
        if git.as_ref().is_some_and(|g| !g.clean) {
            warn!("working tree has local changes; recorded fingerprints will be marked unclean");
        }
        let ingredients = self.ingredients(workspace);
        let mut tasks = Vec::new();
        for _ in 0..self.repeat {
            for (working_directory, ini_file, config, run, limit) in &runs {
                let mut sim_run = SimulationRun::new(working_directory, config, *run).with_ini_file(ini_file);
                if let Some(limit) = limit {
                    sim_run = sim_run.with_sim_time_limit(limit);
                }
                let task = FingerprintUpdateTask::new(
                    Arc::clone(project),
                    self.prepare(sim_run),
                    ingredients.clone(),
                    Arc::clone(&store),
                )
                .with_calculator_class(&workspace.config.fingerprint.calculator_class)
                .with_git(git.clone())
                .allow_insert(!self.no_insert);
                tasks.push(Arc::new(task));
            }
        }

        let group = self.configure(TaskGroup::new("fingerprint updates", tasks), workspace);
        let result = group.run(&workspace.group_context(cli, self.dry_run));
        output::group_result(cli, &result)?;

        if !self.dry_run {
            let mut store = store
                .lock()
                .map_err(|_| anyhow::anyhow!("fingerprint store lock poisoned"))?;
            store.write()?;
        }

        if cli.interrupt.is_triggered() {
            return Ok(exit_codes::CANCELLED);
        }
        let ok = result
            .results()
            .iter()
            .all(|r| r.is_expected() || matches!(r.result, UpdateOutcome::Insert | UpdateOutcome::Update));
        Ok(if ok { exit_codes::SUCCESS } else { exit_codes::UNEXPECTED })
    }
}

/// Print where each mismatching test first diverged from the baseline
fn report_divergences(results: &[TaskResult<TestOutcome>]) {
    for result in results {
        if let Some(divergence) = result.attribute("divergence") {
            output::warning(&format!("{}: {}", result.parameters, divergence));
        } else if let Some(error) = result.attribute("divergence_error") {
            output::warning(&format!("{}: cannot locate divergence: {}", result.parameters, error));
        }
    }
}

fn plan_from_spec_files(files: &[SpecFile], filter: &RunFilter) -> Vec<Planned> {
    let mut planned = Vec::new();
    for (file_index, file) in files.iter().enumerate() {
        for (entry_index, entry) in file.select(filter) {
            planned.push(Planned {
                run: entry.run.clone(),
                fingerprints: entry.fingerprints.clone(),
                expected: entry.expected,
                origin: Some(Origin {
                    file: file_index,
                    entry: entry_index,
                }),
            });
        }
    }
    planned
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Wrapper {
        #[command(flatten)]
        test: TestCommand,
    }

    #[test]
    fn test_parse_arguments() {
        let wrapper = Wrapper::parse_from([
            "test",
            "tests/fingerprint/examples.csv",
            "--working-directory",
            "ethernet",
            "--exclude-config",
            "^Mixed",
            "--repeat",
            "2",
            "--mode",
            "debug",
            "--",
            "--seed-set=3",
        ]);
        let cmd = wrapper.test;
        assert_eq!(cmd.spec_files, vec!["tests/fingerprint/examples.csv"]);
        assert_eq!(cmd.repeat, 2);
        assert!(matches!(cmd.mode, ModeArg::Debug));
        assert_eq!(cmd.args, vec!["--seed-set=3"]);

        let filter = cmd.run_filter().unwrap();
        assert!(filter.matches("examples/ethernet", "Switch", 0));
        assert!(!filter.matches("examples/ethernet", "MixedLAN", 0));

        let run = cmd.prepare(SimulationRun::new("examples/ethernet", "Switch", 0));
        assert_eq!(run.mode, BuildMode::Debug);
        assert_eq!(run.extra_args, vec!["--seed-set=3"]);
    }

    #[test]
    fn test_invalid_filter() {
        let wrapper = Wrapper::parse_from(["test", "--run", "("]);
        assert!(wrapper.test.run_filter().is_err());
    }

    #[test]
    fn test_plan_from_spec_files() {
        let text = "\
# wd, args, limit, fingerprints, expected, tags
/examples/a/, -c One, 1s, 1111-1111/tplx, PASS,
/examples/b/, -c Two, 1s, 2222-2222/tplx, PASS,
";
        let files = vec![SpecFile::parse("a.csv", text).unwrap(), SpecFile::parse("b.csv", text).unwrap()];
        let filter = RunFilter::new().include_config("Two").unwrap();
        let planned = plan_from_spec_files(&files, &filter);
        assert_eq!(planned.len(), 2);
        let origin = planned[1].origin.unwrap();
        assert_eq!((origin.file, origin.entry), (1, 1));
        assert_eq!(planned[1].fingerprints, vec![Fingerprint::new("2222-2222", "tplx")]);
    }
}
