//! Task groups
//!
//! A [`TaskGroup`] runs an ordered collection of tasks of one outcome
//! category, either sequentially or on a fixed-width rayon pool, and
//! aggregates the results into a [`GroupResult`].
//!
//! Sequential groups make cancellation sticky: once a task is cancelled or
//! the interrupt fires, every later task is cancelled without running.
//! Concurrent groups cancel the children that have not started yet. Results
//! always come back in declared order, also when the execution order was
//! shuffled.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rayon::prelude::*;
use regex::Regex;
use simrun_core::Interrupt;
use tracing::{debug, info, warn};

use crate::outcome::{Color, Outcome};
use crate::reporter::{GroupEvent, Reporter, TracingReporter};
use crate::result::TaskResult;
use crate::task::{CancelFlag, RunContext, Task};

/// Shared settings for running a group
#[derive(Clone)]
pub struct GroupContext {
    /// Interruption token shared with every child
    pub interrupt: Interrupt,
    /// Report success without executing anything
    pub dry_run: bool,
    /// Sink for buffered task output
    pub reporter: Arc<dyn Reporter>,
}

impl GroupContext {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            interrupt: Interrupt::new(),
            dry_run: false,
            reporter,
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Default for GroupContext {
    fn default() -> Self {
        Self::new(Arc::new(TracingReporter))
    }
}

impl fmt::Debug for GroupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupContext")
            .field("interrupt", &self.interrupt)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

/// An ordered collection of tasks with one outcome category
pub struct TaskGroup<T: Task + ?Sized> {
    name: String,
    tasks: Vec<Arc<T>>,
    concurrent: bool,
    workers: usize,
    shuffle: bool,
    range: Option<Range<usize>>,
    cancel: CancelFlag,
}

impl<T: Task + ?Sized> Clone for TaskGroup<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tasks: self.tasks.clone(),
            concurrent: self.concurrent,
            workers: self.workers,
            shuffle: self.shuffle,
            range: self.range.clone(),
            cancel: CancelFlag::default(),
        }
    }
}

impl<T: Task + ?Sized> fmt::Debug for TaskGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGroup")
            .field("name", &self.name)
            .field("tasks", &self.tasks.len())
            .field("concurrent", &self.concurrent)
            .field("workers", &self.workers)
            .field("shuffle", &self.shuffle)
            .field("range", &self.range)
            .finish()
    }
}

impl<T: Task + ?Sized> TaskGroup<T> {
    /// Create a sequential group
    pub fn new(name: impl Into<String>, tasks: Vec<Arc<T>>) -> Self {
        Self {
            name: name.into(),
            tasks,
            concurrent: false,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            shuffle: false,
            range: None,
            cancel: CancelFlag::default(),
        }
    }

    /// Run the tasks concurrently
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Width of the worker pool for concurrent runs
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Shuffle the execution order
    pub fn shuffled(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Only run the tasks at these positions
    pub fn with_range(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[Arc<T>] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Cancel or uncancel the group and every child
    pub fn set_cancel(&self, cancel: bool) {
        self.cancel.set(cancel);
        for task in &self.tasks {
            task.set_cancel(cancel);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_set()
    }

    /// The same group settings over a different task list
    fn with_tasks(&self, tasks: Vec<Arc<T>>) -> Self {
        Self {
            name: self.name.clone(),
            tasks,
            concurrent: self.concurrent,
            workers: self.workers,
            shuffle: self.shuffle,
            range: None,
            cancel: CancelFlag::default(),
        }
    }

    fn selected(&self) -> Vec<Arc<T>> {
        match &self.range {
            Some(range) => {
                let start = range.start.min(self.tasks.len());
                let end = range.end.clamp(start, self.tasks.len());
                self.tasks[start..end].to_vec()
            }
            None => self.tasks.clone(),
        }
    }

    /// Run every selected task and aggregate the results
    pub fn run(&self, ctx: &GroupContext) -> GroupResult<T> {
        let tasks = self.selected();
        let count = tasks.len();
        let concurrent = self.concurrent && count > 1;
        ctx.reporter.report(&GroupEvent::Started {
            group: self.name.clone(),
            count,
            concurrent,
        });
        info!(group = %self.name, count, concurrent, "running task group");
        let start = Instant::now();

        let results: Vec<TaskResult<T::Outcome>> = if self.cancel.is_set() {
            tasks
                .iter()
                .map(|task| {
                    task.make_result(T::Outcome::CANCEL)
                        .with_reason("Cancel by user")
                })
                .collect()
        } else {
            for task in &tasks {
                task.set_cancel(false);
            }
            let mut order: Vec<usize> = (0..count).collect();
            if self.shuffle {
                order.shuffle(&mut rand::thread_rng());
            }
            let mut indexed = if concurrent {
                self.run_concurrently(&tasks, &order, ctx)
            } else {
                self.run_sequentially(&tasks, &order, ctx)
            };
            indexed.sort_by_key(|(index, _)| *index);
            indexed.into_iter().map(|(_, result)| result).collect()
        };

        let result = GroupResult {
            group: self.with_tasks(tasks),
            results,
            elapsed: start.elapsed(),
        };
        ctx.reporter.report(&GroupEvent::Completed {
            group: self.name.clone(),
            summary: result.summary(),
            elapsed: result.elapsed,
        });
        result
    }

    fn run_sequentially(
        &self,
        tasks: &[Arc<T>],
        order: &[usize],
        ctx: &GroupContext,
    ) -> Vec<(usize, TaskResult<T::Outcome>)> {
        let count = order.len();
        let mut cancel = false;
        let mut results = Vec::with_capacity(count);
        for (position, &index) in order.iter().enumerate() {
            let task = &tasks[index];
            if ctx.interrupt.is_triggered() {
                cancel = true;
            }
            task.set_cancel(cancel);
            let result = self.run_child(task.as_ref(), position, count, ctx);
            if result.result == T::Outcome::CANCEL {
                cancel = true;
            }
            results.push((index, result));
        }
        results
    }

    fn run_concurrently(
        &self,
        tasks: &[Arc<T>],
        order: &[usize],
        ctx: &GroupContext,
    ) -> Vec<(usize, TaskResult<T::Outcome>)> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("simrun-task-{}", i))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Failed to start worker pool, running sequentially: {}", e);
                return self.run_sequentially(tasks, order, ctx);
            }
        };
        debug!(group = %self.name, workers = self.workers, "worker pool started");

        let count = order.len();
        pool.install(|| {
            order
                .par_iter()
                .enumerate()
                .map(|(position, &index)| {
                    let task = &tasks[index];
                    if ctx.interrupt.is_triggered() {
                        task.set_cancel(true);
                    }
                    (index, self.run_child(task.as_ref(), position, count, ctx))
                })
                .collect()
        })
    }

    fn run_child(
        &self,
        task: &T,
        position: usize,
        count: usize,
        ctx: &GroupContext,
    ) -> TaskResult<T::Outcome> {
        let child_ctx = RunContext::new(ctx.interrupt.clone())
            .with_dry_run(ctx.dry_run)
            .with_position(position, count);
        let result = task.run(&child_ctx);
        ctx.reporter.report(&GroupEvent::TaskFinished {
            group: self.name.clone(),
            output: child_ctx.take_output(),
        });
        result
    }
}

/// Criteria for selecting results out of a [`GroupResult`]
#[derive(Debug, Clone)]
pub struct ResultFilter<O> {
    include: Vec<O>,
    exclude: Vec<O>,
    include_expected: Vec<O>,
    exclude_expected: Vec<O>,
    only_unexpected: bool,
    error_message: Option<Regex>,
    exclude_error_message: Option<Regex>,
}

impl<O> Default for ResultFilter<O> {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            include_expected: Vec::new(),
            exclude_expected: Vec::new(),
            only_unexpected: false,
            error_message: None,
            exclude_error_message: None,
        }
    }
}

impl<O: Outcome> ResultFilter<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only these actual outcomes
    pub fn include(mut self, tags: &[O]) -> Self {
        self.include.extend_from_slice(tags);
        self
    }

    /// Drop these actual outcomes
    pub fn exclude(mut self, tags: &[O]) -> Self {
        self.exclude.extend_from_slice(tags);
        self
    }

    /// Keep only these expected outcomes
    pub fn include_expected(mut self, tags: &[O]) -> Self {
        self.include_expected.extend_from_slice(tags);
        self
    }

    /// Drop these expected outcomes
    pub fn exclude_expected(mut self, tags: &[O]) -> Self {
        self.exclude_expected.extend_from_slice(tags);
        self
    }

    /// Keep only results whose actual outcome differs from the expected one
    pub fn only_unexpected(mut self) -> Self {
        self.only_unexpected = true;
        self
    }

    /// Keep only results whose error text matches
    pub fn error_message(mut self, pattern: Regex) -> Self {
        self.error_message = Some(pattern);
        self
    }

    /// Drop results whose error text matches
    pub fn exclude_error_message(mut self, pattern: Regex) -> Self {
        self.exclude_error_message = Some(pattern);
        self
    }

    /// Whether a result passes every criterion
    pub fn matches(&self, result: &TaskResult<O>) -> bool {
        if !self.include.is_empty() && !self.include.contains(&result.result) {
            return false;
        }
        if self.exclude.contains(&result.result) {
            return false;
        }
        if !self.include_expected.is_empty()
            && !self.include_expected.contains(&result.expected_result)
        {
            return false;
        }
        if self.exclude_expected.contains(&result.expected_result) {
            return false;
        }
        if self.only_unexpected && result.is_expected() {
            return false;
        }
        if self.error_message.is_some() || self.exclude_error_message.is_some() {
            let text = result.error_text();
            if let Some(pattern) = &self.error_message {
                if !pattern.is_match(&text) {
                    return false;
                }
            }
            if let Some(pattern) = &self.exclude_error_message {
                if pattern.is_match(&text) {
                    return false;
                }
            }
        }
        true
    }
}

/// Aggregated results of a group run, aligned with the group's tasks
pub struct GroupResult<T: Task + ?Sized> {
    group: TaskGroup<T>,
    results: Vec<TaskResult<T::Outcome>>,
    elapsed: Duration,
}

impl<T: Task + ?Sized> fmt::Debug for GroupResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupResult")
            .field("group", &self.group)
            .field("results", &self.results)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

impl<T: Task + ?Sized> GroupResult<T> {
    /// The group that produced the results, restricted to the tasks that ran
    pub fn group(&self) -> &TaskGroup<T> {
        &self.group
    }

    pub fn results(&self) -> &[TaskResult<T::Outcome>] {
        &self.results
    }

    pub fn into_results(self) -> Vec<TaskResult<T::Outcome>> {
        self.results
    }

    /// Tasks paired with their results
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<T>, &TaskResult<T::Outcome>)> {
        self.group.tasks.iter().zip(self.results.iter())
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of results per (tag, expected) bucket
    pub fn counts(&self) -> BTreeMap<(T::Outcome, bool), usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts
                .entry((result.result, result.is_expected()))
                .or_insert(0) += 1;
        }
        counts
    }

    pub fn num_expected(&self, tag: T::Outcome) -> usize {
        self.results
            .iter()
            .filter(|r| r.result == tag && r.is_expected())
            .count()
    }

    pub fn num_unexpected(&self, tag: T::Outcome) -> usize {
        self.results
            .iter()
            .filter(|r| r.result == tag && !r.is_expected())
            .count()
    }

    /// Overall tag: the most severe unexpected outcome if there is one,
    /// otherwise the most severe outcome, and the nominal tag when empty
    pub fn result(&self) -> T::Outcome {
        let worst_unexpected = self
            .results
            .iter()
            .filter(|r| !r.is_expected())
            .map(|r| r.result)
            .max();
        worst_unexpected
            .or_else(|| self.results.iter().map(|r| r.result).max())
            .unwrap_or(T::Outcome::NOMINAL)
    }

    /// Whether every result matched its expectation
    pub fn all_expected(&self) -> bool {
        self.results.iter().all(TaskResult::is_expected)
    }

    /// Whether every result is the nominal tag
    pub fn all_nominal(&self) -> bool {
        self.results.iter().all(|r| r.result == T::Outcome::NOMINAL)
    }

    /// Counts per tag and expectation, e.g. `3 TOTAL, 2 PASS, 1 FAIL (unexpected)`
    pub fn summary(&self) -> String {
        if self.results.len() == 1 {
            return self.results[0].description();
        }
        let counts = self.counts();
        let mut parts = Vec::new();
        if counts.len() != 1 {
            parts.push(format!("{} TOTAL", self.results.len()));
        }
        for &tag in T::Outcome::ALL {
            for expected in [true, false] {
                let count = counts.get(&(tag, expected)).copied().unwrap_or(0);
                if count == 0 {
                    continue;
                }
                let mut text = tag.color().paint(&format!("{} {}", count, tag.name()));
                if tag.color() != Color::Green {
                    text.push_str(if expected { " (expected)" } else { " (unexpected)" });
                }
                parts.push(text);
            }
        }
        parts.join(", ")
    }

    /// Summary followed by the elapsed time
    pub fn description(&self) -> String {
        format!("{} in {:.1}s", self.summary(), self.elapsed.as_secs_f64())
    }

    /// One line per result whose tag is not green
    pub fn details(&self) -> String {
        self.iter()
            .filter(|(_, result)| result.result.color() != Color::Green)
            .map(|(task, result)| {
                let mut line = task.name().to_string();
                let parameters = task.parameters();
                if !parameters.is_empty() {
                    line.push(' ');
                    line.push_str(&parameters);
                }
                format!("  {}: {}", line, result.description())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A new result holding only the matching tasks and results
    pub fn filter(&self, filter: &ResultFilter<T::Outcome>) -> GroupResult<T> {
        let (tasks, results): (Vec<_>, Vec<_>) = self
            .iter()
            .filter(|(_, result)| filter.matches(result))
            .map(|(task, result)| (task.clone(), result.clone()))
            .unzip();
        GroupResult {
            group: self.group.with_tasks(tasks),
            results,
            elapsed: self.elapsed,
        }
    }

    /// Results that did not match their expectation, ignoring tasks that
    /// were skipped or cancelled
    pub fn unexpected(&self) -> GroupResult<T> {
        let inconclusive: Vec<T::Outcome> = T::Outcome::ALL
            .iter()
            .copied()
            .filter(|tag| tag.is_inconclusive())
            .collect();
        self.filter(&ResultFilter::new().exclude(&inconclusive).only_unexpected())
    }

    /// Run the same tasks again with the same group settings
    pub fn rerun(&self, ctx: &GroupContext) -> GroupResult<T> {
        self.group.run(ctx)
    }
}
