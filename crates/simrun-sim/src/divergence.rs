//! Locating where a failing fingerprint test went off track
//!
//! When a test fails on a fingerprint mismatch, the run is repeated in a
//! baseline project known to produce the correct fingerprint. Both runs
//! record an eventlog, and the first event where their fingerprint
//! trajectories disagree is reported.

use std::path::PathBuf;

use simrun_fingerprint::{eventlog_path, find_divergence_with, CompareMode, Divergence, Eventlog};
use simrun_tasks::{TaskResult, TestOutcome};
use tracing::debug;

use crate::error::Result;
use crate::project::SimulationProject;
use crate::run::SimulationRun;

/// Where `run` leaves its eventlog inside `project`
pub fn run_eventlog_path(project: &SimulationProject, run: &SimulationRun) -> PathBuf {
    eventlog_path(&project.full_path(&run.working_directory), &run.config, run.run)
}

/// Whether a test result failed because a calculated fingerprint differed
pub fn is_mismatch(result: &TaskResult<TestOutcome>) -> bool {
    result.result == TestOutcome::Fail
        && result
            .reason
            .as_deref()
            .is_some_and(|reason| reason.starts_with("Fingerprint mismatch"))
}

/// Compare the eventlogs `run` recorded in `baseline` and `current`
///
/// Each trajectory is labelled with its project name.
pub fn locate_divergence(
    baseline: &SimulationProject,
    current: &SimulationProject,
    run: &SimulationRun,
    mode: CompareMode,
) -> Result<Option<Divergence>> {
    let baseline_log = Eventlog::read(&run_eventlog_path(baseline, run))?;
    let current_log = Eventlog::read(&run_eventlog_path(current, run))?;
    let divergence = find_divergence_with(
        &baseline_log.trajectory(baseline.name()),
        &current_log.trajectory(current.name()),
        mode,
    );
    debug!(
        run = %run.parameters(),
        diverged = divergence.is_some(),
        "compared fingerprint trajectories"
    );
    Ok(divergence)
}

/// The divergence behind a finished test, if it failed on a mismatch
///
/// Results of any other kind have nothing to locate and give `None`.
pub fn divergence_for_result(
    result: &TaskResult<TestOutcome>,
    baseline: &SimulationProject,
    current: &SimulationProject,
    run: &SimulationRun,
    mode: CompareMode,
) -> Result<Option<Divergence>> {
    if !is_mismatch(result) {
        return Ok(None);
    }
    locate_divergence(baseline, current, run, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;
    use simrun_fingerprint::TrajectoryError;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const BASELINE_LOG: &str = "\
E # 0 t 0 m 1 ce -1 msg -1 f 0000-0001/tplx
E # 1 t 0.1 m 2 ce 0 msg 7 f 0000-0002/tplx
E # 2 t 0.2 m 2 ce 1 msg 8 f 0000-0003/tplx
E # 3 t 0.3 m 3 ce 2 msg 9 f 0000-0004/tplx
";

    const CURRENT_LOG: &str = "\
E # 0 t 0 m 1 ce -1 msg -1 f 0000-0001/tplx
E # 1 t 0.1 m 2 ce 0 msg 7 f 0000-0002/tplx
E # 2 t 0.2 m 2 ce 1 msg 8 f 0000-00ff/tplx
E # 3 t 0.3 m 3 ce 2 msg 9 f 0000-0100/tplx
";

    fn project(root: &Path, name: &str, log: Option<&str>) -> SimulationProject {
        let root = root.join(name);
        let results = root.join("examples/ethernet/results");
        fs::create_dir_all(&results).unwrap();
        if let Some(log) = log {
            fs::write(results.join("General-#0.elog"), log).unwrap();
        }
        SimulationProject::new(root).unwrap()
    }

    fn run() -> SimulationRun {
        SimulationRun::new("examples/ethernet", "General", 0).with_eventlog(true)
    }

    fn mismatch() -> TaskResult<TestOutcome> {
        TaskResult::new("fingerprint test", TestOutcome::Fail, TestOutcome::Pass)
            .with_reason("Fingerprint mismatch: calculated 0000-0100/tplx (correct 0000-0004/tplx)")
    }

    #[test]
    fn test_run_eventlog_path() {
        let project = SimulationProject::new("/work/inet").unwrap();
        assert_eq!(
            run_eventlog_path(&project, &run()),
            PathBuf::from("/work/inet/examples/ethernet/results/General-#0.elog")
        );
    }

    #[test]
    fn test_mismatch_result_locates_divergence() {
        let temp = TempDir::new().unwrap();
        let baseline = project(temp.path(), "baseline", Some(BASELINE_LOG));
        let current = project(temp.path(), "current", Some(CURRENT_LOG));

        let divergence = divergence_for_result(&mismatch(), &baseline, &current, &run(), CompareMode::Strict)
            .unwrap()
            .unwrap();
        assert_eq!(divergence.index, 2);
        assert_eq!(divergence.a.label, "baseline");
        assert_eq!(divergence.a.ordinal, Some(1));
        assert_eq!(divergence.b.label, "current");
        assert_eq!(divergence.b.ordinal, Some(1));
        assert_eq!(
            divergence.to_string(),
            "Fingerprint trajectory divergence at baseline #1, current #1"
        );
    }

    #[test]
    fn test_other_results_are_not_traced() {
        let temp = TempDir::new().unwrap();
        let baseline = project(temp.path(), "baseline", None);
        let current = project(temp.path(), "current", None);

        let pass = TaskResult::new("fingerprint test", TestOutcome::Pass, TestOutcome::Pass);
        let error = TaskResult::new("fingerprint test", TestOutcome::Fail, TestOutcome::Pass)
            .with_reason("Non-zero exit code: 1");
        for result in [pass, error] {
            assert!(!is_mismatch(&result));
            let divergence = divergence_for_result(&result, &baseline, &current, &run(), CompareMode::Strict).unwrap();
            assert!(divergence.is_none());
        }
    }

    #[test]
    fn test_identical_eventlogs_do_not_diverge() {
        let temp = TempDir::new().unwrap();
        let baseline = project(temp.path(), "baseline", Some(BASELINE_LOG));
        let current = project(temp.path(), "current", Some(BASELINE_LOG));
        assert!(locate_divergence(&baseline, &current, &run(), CompareMode::Strict)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_eventlog_is_error() {
        let temp = TempDir::new().unwrap();
        let baseline = project(temp.path(), "baseline", Some(BASELINE_LOG));
        let current = project(temp.path(), "current", None);
        let err = locate_divergence(&baseline, &current, &run(), CompareMode::Strict).unwrap_err();
        assert!(matches!(err, SimulationError::Trajectory(TrajectoryError::NotFound(_))));
    }
}
