//! Fingerprint tests and fingerprint store updates

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use simrun_fingerprint::{
    extract_fingerprint_status, CompareMode, EntryFilter, Fingerprint, FingerprintEntry, FingerprintStore, TieBreak,
};
use simrun_tasks::{CancelFlag, Outcome, RunContext, Task, TaskError, TaskResult, TestOutcome, UpdateOutcome};
use tracing::{debug, warn};

use crate::divergence::{divergence_for_result, is_mismatch};
use crate::filter::RunFilter;
use crate::git::GitInfo;
use crate::project::SimulationProject;
use crate::run::SimulationRun;
use crate::runner::{run_simulation, SimulationOutput};
use crate::task::{annotate, CANCEL_REASON, INTERACTIVE_REASON};

pub const DEFAULT_CALCULATOR_CLASS: &str = "inet::FingerprintCalculator";

/// Placeholder hash passed when the correct fingerprint is not known
const UNKNOWN_HASH: &str = "0000-0000";

/// Arguments some ingredients need to make their fingerprint reproducible
pub fn ingredient_extra_args(ingredients: &str) -> &'static [&'static str] {
    match ingredients {
        "~tND" => &[r#"--**.crcMode="computed""#, r#"--**.fcsMode="computed""#],
        "tyf" => &[
            "--cmdenv-fake-gui=true",
            "--cmdenv-fake-gui-before-event-probability=0.1",
            "--cmdenv-fake-gui-after-event-probability=0.1",
            "--cmdenv-fake-gui-on-hold-probability=0.1",
            "--cmdenv-fake-gui-on-hold-numsteps=3",
            "--cmdenv-fake-gui-on-simtime-probability=0.1",
            "--cmdenv-fake-gui-on-simtime-numsteps=3",
            r#"--**.fadeOutMode="animationTime""#,
            r#"--**.signalAnimationSpeedChangeTimeMode="animationTime""#,
        ],
        _ => &[],
    }
}

/// Arguments that make a simulation verify `fingerprints`
pub fn fingerprint_args(fingerprints: &[Fingerprint], calculator_class: &str) -> Vec<String> {
    let mut args = vec![
        "--fingerprint".to_string(),
        join(fingerprints),
        "--fingerprintcalculator-class".to_string(),
        calculator_class.to_string(),
        "--vector-recording".to_string(),
        "false".to_string(),
        "--scalar-recording".to_string(),
        "false".to_string(),
    ];
    let mut seen = Vec::new();
    for fingerprint in fingerprints {
        if !seen.contains(&fingerprint.ingredients()) {
            seen.push(fingerprint.ingredients());
            args.extend(ingredient_extra_args(fingerprint.ingredients()).iter().map(|a| a.to_string()));
        }
    }
    args
}

fn join(fingerprints: &[Fingerprint]) -> String {
    fingerprints.iter().map(|fp| fp.to_string()).collect::<Vec<_>>().join(",")
}

/// Calculated fingerprints in the order of `ingredients`; `None` where the
/// output has no status line for an ingredient
fn calculated_fingerprints<'a, I>(output: &SimulationOutput, ingredients: I) -> Vec<Option<Fingerprint>>
where
    I: IntoIterator<Item = &'a str>,
{
    ingredients
        .into_iter()
        .map(|ingr| {
            extract_fingerprint_status(&output.captured.stdout, &output.captured.stderr, ingr)
                .map(|status| status.calculated().clone())
        })
        .collect()
}

fn missing_fingerprint_reason(output: &SimulationOutput) -> String {
    if output.captured.success() {
        "Calculated fingerprint not found".to_string()
    } else {
        format!("Non-zero exit code: {}", output.exit_code())
    }
}

fn with_error_message<O: Outcome>(result: TaskResult<O>, output: &SimulationOutput) -> TaskResult<O> {
    match output.complete_error_message() {
        Some(message) => result.with_error_message(message),
        None => result,
    }
}

/// Runs a simulation once and checks one or more fingerprints against it
#[derive(Debug)]
pub struct FingerprintTestTask {
    project: Arc<SimulationProject>,
    run: SimulationRun,
    fingerprints: Vec<Fingerprint>,
    calculator_class: String,
    expected: TestOutcome,
    baseline: Option<Arc<SimulationProject>>,
    cancel: CancelFlag,
}

impl FingerprintTestTask {
    pub fn new(project: Arc<SimulationProject>, run: SimulationRun, fingerprints: Vec<Fingerprint>) -> Self {
        Self {
            project,
            run,
            fingerprints,
            calculator_class: DEFAULT_CALCULATOR_CLASS.to_string(),
            expected: TestOutcome::Pass,
            baseline: None,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_expected(mut self, expected: TestOutcome) -> Self {
        self.expected = expected;
        self
    }

    /// On a mismatch, rerun in `baseline` and report where the runs diverge.
    /// The run records its eventlog from then on.
    pub fn with_baseline(mut self, baseline: Arc<SimulationProject>) -> Self {
        self.run.record_eventlog = true;
        self.baseline = Some(baseline);
        self
    }

    pub fn with_calculator_class(mut self, class: impl Into<String>) -> Self {
        self.calculator_class = class.into();
        self
    }

    pub fn simulation_run(&self) -> &SimulationRun {
        &self.run
    }

    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    /// Arguments appended to the simulation command line
    pub fn extra_args(&self) -> Vec<String> {
        fingerprint_args(&self.fingerprints, &self.calculator_class)
    }

    fn classify(&self, output: SimulationOutput) -> TaskResult<TestOutcome> {
        let base = if output.cancelled() {
            self.make_result(TestOutcome::Cancel).with_reason(CANCEL_REASON)
        } else if output.interactive {
            self.make_result(TestOutcome::Skip)
                .with_expected(TestOutcome::Skip)
                .with_reason(INTERACTIVE_REASON)
        } else {
            let calculated = calculated_fingerprints(&output, self.fingerprints.iter().map(Fingerprint::ingredients));
            let found: Vec<Fingerprint> = calculated.iter().flatten().cloned().collect();
            let mut result = if calculated.iter().any(Option::is_none) {
                with_error_message(
                    self.make_result(TestOutcome::Error)
                        .with_reason(missing_fingerprint_reason(&output)),
                    &output,
                )
            } else {
                let (mismatched, correct): (Vec<_>, Vec<_>) = found
                    .iter()
                    .zip(&self.fingerprints)
                    .filter(|(calculated, correct)| calculated != correct)
                    .map(|(calculated, correct)| (calculated.clone(), correct.clone()))
                    .unzip();
                if !mismatched.is_empty() {
                    self.make_result(TestOutcome::Fail).with_reason(format!(
                        "Fingerprint mismatch: calculated {} (correct {})",
                        join(&mismatched),
                        join(&correct)
                    ))
                } else if !output.captured.success() {
                    with_error_message(
                        self.make_result(TestOutcome::Error)
                            .with_reason(format!("Non-zero exit code: {}", output.exit_code())),
                        &output,
                    )
                } else {
                    self.make_result(TestOutcome::Pass)
                }
            };
            if !found.is_empty() {
                result = result.with_attribute("calculated_fingerprint", join(&found));
            }
            result
        };
        annotate(base.with_attribute("correct_fingerprint", join(&self.fingerprints)), &output)
    }

    /// Attach the trajectory divergence to a mismatch, rerunning the baseline first
    fn trace_divergence(&self, result: TaskResult<TestOutcome>, ctx: &RunContext) -> TaskResult<TestOutcome> {
        let Some(baseline) = self.baseline.as_deref() else {
            return result;
        };
        if !is_mismatch(&result) {
            return result;
        }
        let located = run_simulation(baseline, &self.run, &self.extra_args(), Some(&ctx.interrupt))
            .and_then(|_| divergence_for_result(&result, baseline, &self.project, &self.run, CompareMode::Strict));
        match located {
            Ok(Some(divergence)) => result.with_attribute("divergence", divergence.to_string()),
            Ok(None) => result,
            Err(e) => {
                warn!(run = %self.run.parameters(), error = %e, "cannot locate fingerprint divergence");
                result.with_attribute("divergence_error", e.to_string())
            }
        }
    }
}

/// Store records for the fingerprints a finished test of `run` calculated
///
/// Skipped and cancelled results carry no verdict and produce nothing.
pub fn store_entries(
    run: &SimulationRun,
    result: &TaskResult<TestOutcome>,
    git: Option<&GitInfo>,
) -> Vec<FingerprintEntry> {
    if result.result.is_inconclusive() {
        return Vec::new();
    }
    let calculated: Vec<Fingerprint> = result
        .attribute("calculated_fingerprint")
        .map(|text| text.split(',').filter_map(|fp| Fingerprint::parse(fp).ok()).collect())
        .unwrap_or_default();
    calculated
        .iter()
        .map(|fingerprint| {
            let mut entry = entry_for(run, fingerprint).with_test_result(result.result);
            if let Some(git) = git {
                entry = entry.with_git(&git.hash, git.clean);
            }
            entry
        })
        .collect()
}

fn entry_for(run: &SimulationRun, fingerprint: &Fingerprint) -> FingerprintEntry {
    let mut entry = FingerprintEntry::new(&run.working_directory, &run.config, run.run, fingerprint)
        .with_ini_file(&run.ini_file);
    if let Some(limit) = &run.sim_time_limit {
        entry = entry.with_sim_time_limit(limit);
    }
    if let Some(itervars) = &run.itervars {
        entry = entry.with_itervars(itervars);
    }
    entry
}

fn identity_filter(run: &SimulationRun, ingredients: &str) -> EntryFilter {
    let mut filter = EntryFilter::new()
        .working_directory(&run.working_directory)
        .ini_file(&run.ini_file)
        .config(&run.config)
        .run(run.run)
        .ingredients(ingredients);
    if let Some(limit) = &run.sim_time_limit {
        filter = filter.sim_time_limit(limit);
    }
    filter
}

impl Task for FingerprintTestTask {
    type Outcome = TestOutcome;

    fn name(&self) -> &str {
        "fingerprint test"
    }

    fn action(&self) -> String {
        "Checking".to_string()
    }

    fn parameters(&self) -> String {
        self.run.parameters()
    }

    fn expected_result(&self) -> TestOutcome {
        self.expected
    }

    fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    fn run_protected(&self, ctx: &RunContext) -> Result<TaskResult<TestOutcome>, TaskError> {
        if ctx.interrupt.is_triggered() {
            return Err(TaskError::Interrupted);
        }
        if self.fingerprints.is_empty() {
            return Ok(self.make_result(TestOutcome::Skip).with_reason("Correct fingerprint not found"));
        }
        let output = run_simulation(&self.project, &self.run, &self.extra_args(), Some(&ctx.interrupt))
            .map_err(TaskError::other)?;
        Ok(self.trace_divergence(self.classify(output), ctx))
    }
}

/// Runs a simulation and records the fingerprints it calculates as correct
#[derive(Debug)]
pub struct FingerprintUpdateTask {
    project: Arc<SimulationProject>,
    run: SimulationRun,
    ingredients: Vec<String>,
    calculator_class: String,
    store: Arc<Mutex<FingerprintStore>>,
    git: Option<GitInfo>,
    allow_insert: bool,
    cancel: CancelFlag,
}

impl FingerprintUpdateTask {
    pub fn new(
        project: Arc<SimulationProject>,
        run: SimulationRun,
        ingredients: Vec<String>,
        store: Arc<Mutex<FingerprintStore>>,
    ) -> Self {
        Self {
            project,
            run,
            ingredients,
            calculator_class: DEFAULT_CALCULATOR_CLASS.to_string(),
            store,
            git: None,
            allow_insert: true,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_calculator_class(mut self, class: impl Into<String>) -> Self {
        self.calculator_class = class.into();
        self
    }

    pub fn with_git(mut self, git: Option<GitInfo>) -> Self {
        self.git = git;
        self
    }

    /// Whether fingerprints without a stored record may be added
    pub fn allow_insert(mut self, allow: bool) -> Self {
        self.allow_insert = allow;
        self
    }

    fn placeholders(&self) -> Vec<Fingerprint> {
        self.ingredients
            .iter()
            .map(|ingr| Fingerprint::new(UNKNOWN_HASH, ingr))
            .collect()
    }

    fn classify(&self, output: SimulationOutput) -> Result<TaskResult<UpdateOutcome>, TaskError> {
        if output.cancelled() {
            return Ok(annotate(
                self.make_result(UpdateOutcome::Cancel).with_reason(CANCEL_REASON),
                &output,
            ));
        }
        if output.interactive {
            return Ok(annotate(
                self.make_result(UpdateOutcome::Skip)
                    .with_expected(UpdateOutcome::Skip)
                    .with_reason(INTERACTIVE_REASON),
                &output,
            ));
        }

        let calculated = calculated_fingerprints(&output, self.ingredients.iter().map(String::as_str));
        let found: Vec<Fingerprint> = calculated.iter().flatten().cloned().collect();
        if calculated.iter().any(Option::is_none) {
            let result = self
                .make_result(UpdateOutcome::Error)
                .with_reason(missing_fingerprint_reason(&output));
            return Ok(annotate(with_error_message(result, &output), &output));
        }

        let mut store = self
            .store
            .lock()
            .map_err(|_| TaskError::Failed("fingerprint store lock poisoned".to_string()))?;
        if !self.allow_insert {
            let missing = self
                .ingredients
                .iter()
                .any(|ingr| store.filter(&identity_filter(&self.run, ingr)).is_empty());
            if missing {
                let result = self
                    .make_result(UpdateOutcome::Error)
                    .with_reason("No correct fingerprint is found and inserting new fingerprints is disabled");
                return Ok(annotate(result, &output));
            }
        }

        let mut outcome = UpdateOutcome::Keep;
        for fingerprint in &found {
            let mut entry = entry_for(&self.run, fingerprint);
            if let Some(git) = &self.git {
                entry = entry.with_git(&git.hash, git.clean);
            }
            let updated = store.insert(entry);
            debug!(parameters = %self.run.parameters(), %fingerprint, result = %updated, "stored fingerprint");
            outcome = outcome.max(updated);
        }
        Ok(annotate(
            self.make_result(outcome)
                .with_attribute("calculated_fingerprint", join(&found)),
            &output,
        ))
    }
}

impl Task for FingerprintUpdateTask {
    type Outcome = UpdateOutcome;

    fn name(&self) -> &str {
        "fingerprint update"
    }

    fn action(&self) -> String {
        "Updating".to_string()
    }

    fn parameters(&self) -> String {
        self.run.parameters()
    }

    fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    fn run_protected(&self, ctx: &RunContext) -> Result<TaskResult<UpdateOutcome>, TaskError> {
        if ctx.interrupt.is_triggered() {
            return Err(TaskError::Interrupted);
        }
        let args = fingerprint_args(&self.placeholders(), &self.calculator_class);
        let output = run_simulation(&self.project, &self.run, &args, Some(&ctx.interrupt)).map_err(TaskError::other)?;
        self.classify(output)
    }
}

/// Build fingerprint tests from the correct fingerprints in `store`
///
/// For each run and ingredient the passing record with the smallest
/// sim-time limit is used. Records of one run sharing a limit become a
/// single task checking all their fingerprints in one simulation.
pub fn store_test_tasks(
    project: &Arc<SimulationProject>,
    store: &FingerprintStore,
    filter: &RunFilter,
    ingredients: &[String],
) -> Vec<FingerprintTestTask> {
    type RunKey = (String, String, String, u32);

    let mut runs: BTreeMap<RunKey, Vec<&FingerprintEntry>> = BTreeMap::new();
    for entry in store.entries() {
        if entry.test_result == TestOutcome::Pass
            && ingredients.contains(&entry.ingredients)
            && filter.matches(&entry.working_directory, &entry.config, entry.run)
        {
            let key = (
                entry.working_directory.clone(),
                entry.ini_file.clone(),
                entry.config.clone(),
                entry.run,
            );
            runs.entry(key).or_default().push(entry);
        }
    }

    let mut tasks = Vec::new();
    for ((working_directory, ini_file, config, run), entries) in runs {
        let mut by_limit: BTreeMap<Option<String>, (Option<String>, Vec<Fingerprint>)> = BTreeMap::new();
        for ingr in ingredients {
            let filter = EntryFilter::new()
                .working_directory(&working_directory)
                .ini_file(&ini_file)
                .config(&config)
                .run(run)
                .ingredients(ingr)
                .test_result(TestOutcome::Pass);
            if entries.iter().all(|e| &e.ingredients != ingr) {
                continue;
            }
            match store.select(&filter, TieBreak::SmallestSimTimeLimit) {
                Some(entry) => {
                    let slot = by_limit
                        .entry(entry.sim_time_limit.clone())
                        .or_insert_with(|| (entry.itervars.clone(), Vec::new()));
                    slot.1.push(entry.fingerprint());
                }
                None => warn!(%working_directory, %config, run, ingredients = %ingr, "no usable fingerprint record"),
            }
        }
        for (limit, (itervars, fingerprints)) in by_limit {
            let mut sim_run = SimulationRun::new(&working_directory, &config, run).with_ini_file(&ini_file);
            sim_run.itervars = itervars;
            if let Some(limit) = limit {
                sim_run = sim_run.with_sim_time_limit(limit);
            }
            tasks.push(FingerprintTestTask::new(Arc::clone(project), sim_run, fingerprints));
        }
    }
    tasks
}
