//! Command implementations

use std::sync::Arc;

use eyre::WrapErr;
use setuptask_core::{
    FsStampStore, PlannedTask, RunReport, SetupTaskOwner, Stamp, StampStore, TaskOutcome,
    TaskRunner, TemplateRenderer, TeraRenderer,
};
use tracing::info;

use crate::config::Config;
use crate::layout::Layout;

/// Loaded configuration plus the runner shared by all commands
pub struct App {
    config: Config,
    runner: TaskRunner,
    renderer: Option<Arc<dyn TemplateRenderer>>,
}

impl App {
    /// Prepare commands for `config`, persisting stamps on disk
    ///
    /// # Errors
    /// Returns error if the configured templates cannot be loaded
    pub fn new(config: Config) -> eyre::Result<Self> {
        let renderer = match &config.settings.templates_dir {
            Some(dir) => {
                let renderer = TeraRenderer::from_dir(dir)
                    .wrap_err_with(|| format!("failed to load templates from {}", dir.display()))?;
                Some(Arc::new(renderer) as Arc<dyn TemplateRenderer>)
            }
            None => None,
        };
        Ok(Self {
            config,
            runner: TaskRunner::new(Arc::new(FsStampStore::new())),
            renderer,
        })
    }

    fn layout(&self, owner: &str) -> eyre::Result<Layout> {
        Layout::from_config(
            self.config.owner(owner)?,
            &self.config.settings,
            self.renderer.as_ref(),
        )
    }

    /// Layouts of the named owners, or of every owner if none are named
    fn layouts(&self, owners: &[String]) -> eyre::Result<Vec<Layout>> {
        if owners.is_empty() {
            self.config
                .owners
                .iter()
                .map(|o| self.layout(&o.name))
                .collect()
        } else {
            owners.iter().map(|name| self.layout(name)).collect()
        }
    }

    /// Run the setup tasks of the selected owners, in order
    ///
    /// Stops at the first owner whose setup fails.
    ///
    /// # Errors
    /// Returns error if an owner is unknown or its setup fails
    pub async fn run(&self, owners: &[String]) -> eyre::Result<Vec<RunReport>> {
        let mut reports = Vec::new();
        for layout in self.layouts(owners)? {
            let name = layout.owner.name().to_string();
            let report = self
                .runner
                .run_setup_tasks(&layout.owner, &layout.tasks, None)
                .await
                .wrap_err_with(|| format!("setup of {name} failed"))?;

            for (task, outcome) in &report.outcomes {
                println!("{name}::{task}: {outcome}");
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Print the tasks a run would execute, without executing anything
    ///
    /// # Errors
    /// Returns error if an owner is unknown or its stamps cannot be read
    pub async fn dry_run(&self, owners: &[String]) -> eyre::Result<usize> {
        let mut pending = 0;
        for (owner, plan) in self.plans(owners).await? {
            for planned in plan.iter().filter(|p| p.decision.will_run()) {
                println!("would run {owner}::{}: {}", planned.task, planned.decision);
                pending += 1;
            }
        }
        if pending == 0 {
            println!("nothing to do");
        }
        Ok(pending)
    }

    /// Print every task's order and decision
    ///
    /// # Errors
    /// Returns error if an owner is unknown or its stamps cannot be read
    pub async fn plan(&self, owners: &[String]) -> eyre::Result<Vec<(String, Vec<PlannedTask>)>> {
        let plans = self.plans(owners).await?;
        for (owner, plan) in &plans {
            println!("{owner}:");
            for planned in plan {
                println!("  {:>6}  {:<32} {}", planned.order, planned.task, planned.decision);
            }
        }
        Ok(plans)
    }

    async fn plans(&self, owners: &[String]) -> eyre::Result<Vec<(String, Vec<PlannedTask>)>> {
        let mut plans = Vec::new();
        for layout in self.layouts(owners)? {
            let plan = self.runner.plan(&layout.owner, &layout.tasks).await?;
            plans.push((layout.owner.name().to_string(), plan));
        }
        Ok(plans)
    }

    /// Run a single task of an owner
    ///
    /// # Errors
    /// Returns error if the owner or task is unknown or the task fails
    pub async fn task(&self, owner: &str, task: &str, force: bool) -> eyre::Result<TaskOutcome> {
        let layout = self.layout(owner)?;
        let outcome = if force {
            self.runner
                .force_task(&layout.owner, &layout.tasks, task, None)
                .await
        } else {
            self.runner
                .run_task(&layout.owner, &layout.tasks, task, None)
                .await
        }
        .wrap_err_with(|| format!("{owner}::{task} failed"))?;

        println!("{owner}::{task}: {outcome}");
        Ok(outcome)
    }

    /// Print the stamps recorded for an owner
    ///
    /// # Errors
    /// Returns error if the owner is unknown or its stamps cannot be read
    pub fn stamps(&self, owner: &str) -> eyre::Result<Vec<Stamp>> {
        let layout = self.layout(owner)?;
        let stamps = self.runner.store().list(&layout.owner.stamp_path())?;
        for stamp in &stamps {
            println!(
                "{:<32} {:<12} {}",
                stamp.task,
                short_hash(stamp.hash()),
                stamp.created_at.to_rfc3339()
            );
        }
        Ok(stamps)
    }

    /// Delete one stamp, or all stamps, of an owner
    ///
    /// The affected tasks run again on the next run.
    ///
    /// # Errors
    /// Returns error if the owner is unknown or a stamp cannot be removed
    pub fn clear(&self, owner: &str, task: Option<&str>) -> eyre::Result<usize> {
        let layout = self.layout(owner)?;
        let stamp_path = layout.owner.stamp_path();
        let store = self.runner.store();

        let removed = match task {
            Some(task) => {
                let existed = store.check(&stamp_path, task)?.is_some();
                store.delete(&stamp_path, task)?;
                usize::from(existed)
            }
            None => store.clear(&stamp_path)?,
        };

        info!(owner = %owner, removed, "cleared stamps");
        println!("removed {removed} stamp(s) from {owner}");
        Ok(removed)
    }
}

/// First 12 characters of a stored hash, for display
fn short_hash(hash: Option<&str>) -> String {
    hash.map_or_else(|| "-".to_string(), |h| h.chars().take(12).collect())
}
