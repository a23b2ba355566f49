//! Build command - Build revisions and publish their artifacts

use std::sync::Arc;

use anyhow::bail;
use clap::Args;
use tracing::info;

use simrun_cache::BuildTask;
use simrun_dispatch::RemoteTask;
use simrun_sim::SimulationJob;
use simrun_tasks::{BuildOutcome, Task, TaskGroup};

use crate::cli::commands::group_exit_code;
use crate::cli::workspace::Workspace;
use crate::cli::{output, Cli};

type DynBuild = dyn Task<Outcome = BuildOutcome>;

/// Build revisions and publish their artifacts
#[derive(Debug, Args)]
pub struct BuildCommand {
    /// Revisions to build
    #[arg(required = true)]
    pub revisions: Vec<String>,

    /// Dispatch the builds to workers through the shared job queue
    #[arg(long)]
    pub remote: bool,

    /// Report what would be built without building
    #[arg(long)]
    pub dry_run: bool,
}

impl BuildCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        if self.revisions.iter().any(|r| r.trim().is_empty()) {
            bail!("revision must not be empty");
        }
        let workspace = Workspace::load()?;
        info!(revisions = ?self.revisions, remote = self.remote, "building revisions");

        let tasks: Vec<Arc<DynBuild>> = if self.remote {
            let dispatcher = workspace.dispatcher();
            self.revisions
                .iter()
                .map(|revision| -> anyhow::Result<Arc<DynBuild>> {
                    let payload = SimulationJob::Build {
                        revision: revision.clone(),
                    };
                    let task = RemoteTask::<BuildOutcome>::new(Arc::clone(&dispatcher), "build", payload.to_value()?)
                        .with_action("Building")
                        .with_parameters(revision.as_str());
                    Ok(Arc::new(task))
                })
                .collect::<anyhow::Result<_>>()?
        } else {
            let builder = workspace.builder();
            self.revisions
                .iter()
                .map(|revision| Arc::new(BuildTask::new(Arc::clone(&builder), revision.as_str())) as Arc<DynBuild>)
                .collect()
        };

        // Local builds share one checkout
        let group = TaskGroup::new("builds", tasks).concurrent(self.remote);
        let result = group.run(&workspace.group_context(cli, self.dry_run));
        output::group_result(cli, &result)?;
        Ok(group_exit_code(cli, &result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Wrapper {
        #[command(flatten)]
        build: BuildCommand,
    }

    #[test]
    fn test_requires_revision() {
        assert!(Wrapper::try_parse_from(["build"]).is_err());
        let wrapper = Wrapper::parse_from(["build", "v4.5", "main", "--remote"]);
        assert_eq!(wrapper.build.revisions, vec!["v4.5", "main"]);
        assert!(wrapper.build.remote);
    }
}
