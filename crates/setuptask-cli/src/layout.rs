//! Turns configured owners into setup task sets

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use serde_json::Value;
use setuptask_core::{
    SetupTaskContext, SetupTaskOwner, Stamp, TaskBuilder, TaskError, TaskSet, TemplateRenderer,
    TemplateTask, files_hash, setup_task,
};
use setuptask_exec::{CommandExecutor, CommandResult, ExecError, LocalExecutor};
use tracing::warn;

use crate::config::{OwnerConfig, Settings, TaskConfig, TemplateConfig};

/// A configured owner
#[derive(Debug)]
pub struct LayoutOwner {
    name: String,
    stamp_path: PathBuf,
}

impl LayoutOwner {
    pub fn new(name: impl Into<String>, stamp_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            stamp_path: stamp_path.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SetupTaskOwner for LayoutOwner {
    fn stamp_path(&self) -> PathBuf {
        self.stamp_path.clone()
    }

    fn owner_name(&self) -> String {
        self.name.clone()
    }
}

/// An owner together with its resolved task set
#[derive(Debug)]
pub struct Layout {
    pub owner: Arc<LayoutOwner>,
    pub tasks: TaskSet<LayoutOwner>,
}

impl Layout {
    /// Build the layout of a configured owner
    ///
    /// Commands run locally with `SETUPTASK_OWNER` and `SETUPTASK_STAMP_DIR`
    /// set.
    ///
    /// # Errors
    /// Returns error if the owner's tasks are not well formed
    pub fn from_config(
        config: &OwnerConfig,
        settings: &Settings,
        renderer: Option<&Arc<dyn TemplateRenderer>>,
    ) -> eyre::Result<Self> {
        let stamp_path = config.stamp_path(settings);
        let executor: Arc<dyn CommandExecutor> = Arc::new(
            LocalExecutor::new()
                .env("SETUPTASK_OWNER", config.name.clone())
                .env("SETUPTASK_STAMP_DIR", stamp_path.display().to_string()),
        );
        Self::with_executor(config, stamp_path, &executor, renderer)
    }

    /// Build a layout whose commands run through `executor`
    ///
    /// Command tasks come first, then template tasks, each in file order.
    ///
    /// # Errors
    /// Returns error if the owner's tasks are not well formed
    pub fn with_executor(
        config: &OwnerConfig,
        stamp_path: PathBuf,
        executor: &Arc<dyn CommandExecutor>,
        renderer: Option<&Arc<dyn TemplateRenderer>>,
    ) -> eyre::Result<Self> {
        let mut builder = TaskSet::builder();
        for task in &config.tasks {
            builder = builder.task(command_task(task, executor));
        }

        if !config.templates.is_empty() {
            let renderer = renderer.ok_or_else(|| {
                eyre::eyre!(
                    "owner {} declares templates but no templates_dir is configured",
                    config.name
                )
            })?;
            for template in &config.templates {
                builder = builder.task(template_task(template, renderer));
            }
        }

        let tasks = builder
            .build()
            .wrap_err_with(|| format!("invalid setup tasks for owner {}", config.name))?;

        Ok(Self {
            owner: Arc::new(LayoutOwner::new(config.name.clone(), stamp_path)),
            tasks,
        })
    }
}

async fn run_command(
    executor: &dyn CommandExecutor,
    cmd: &str,
    timeout: Option<Duration>,
) -> Result<CommandResult, ExecError> {
    let result = match timeout {
        Some(timeout) => executor.run_with_timeout(cmd, timeout).await?,
        None => executor.run(cmd).await?,
    };
    result.into_checked(cmd)
}

fn command_task(config: &TaskConfig, executor: &Arc<dyn CommandExecutor>) -> TaskBuilder<LayoutOwner> {
    let run = config.run.clone();
    let timeout = config.timeout_secs.map(Duration::from_secs);
    let action_executor = Arc::clone(executor);

    let mut task = setup_task(config.name.clone())
        .description(config.description.clone().unwrap_or_else(|| config.run.clone()))
        .action(move |_owner: Arc<LayoutOwner>, _ctx: SetupTaskContext| {
            let executor = Arc::clone(&action_executor);
            let run = run.clone();
            async move {
                run_command(executor.as_ref(), &run, timeout).await?;
                Ok::<(), TaskError>(())
            }
        });

    if let Some(check) = &config.check {
        let check = check.clone();
        let check_executor = Arc::clone(executor);
        task = task.check_completed_async(move |_owner: Arc<LayoutOwner>| {
            let executor = Arc::clone(&check_executor);
            let check = check.clone();
            async move {
                match executor.run(&check).await {
                    Ok(result) => result.success(),
                    Err(e) => {
                        warn!(command = %check, error = %e, "completion check could not run");
                        false
                    }
                }
            }
        });
    }

    if !config.hash_files.is_empty() {
        let files = config.hash_files.clone();
        task = task.try_hash(move |_owner: &LayoutOwner| {
            files_hash(&files).map_err(|e| Box::new(e) as TaskError)
        });
    }

    if config.always {
        task = task.invalidator(|_owner: &LayoutOwner, _stamp: &Stamp| false);
    }

    if let Some(order) = config.order {
        task = task.order(order);
    }
    for name in &config.before {
        task = task.before(name.clone());
    }
    for name in &config.after {
        task = task.after(name.clone());
    }
    task
}

fn template_task(
    config: &TemplateConfig,
    renderer: &Arc<dyn TemplateRenderer>,
) -> TaskBuilder<LayoutOwner> {
    let vars = config.vars.clone();
    let mut template = TemplateTask::new(
        config.name.clone(),
        config.template.clone(),
        Arc::clone(renderer),
    )
    .vars(move |owner: &LayoutOwner| {
        let mut vars = vars.clone();
        vars.entry("owner")
            .or_insert_with(|| Value::String(owner.name.clone()));
        vars.entry("stamp_path")
            .or_insert_with(|| Value::String(owner.stamp_path.display().to_string()));
        Value::Object(vars)
    });

    if let Some(output) = &config.output {
        template = template.output(output.clone());
    }
    if let Some(order) = config.order {
        template = template.order(order);
    }
    for name in &config.before {
        template = template.before(name.clone());
    }
    for name in &config.after {
        template = template.after(name.clone());
    }
    template.into_task()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use setuptask_core::{FsStampStore, TaskOutcome, TaskRunner, TeraRenderer};
    use tempfile::TempDir;

    fn config(dir: &TempDir, body: &str) -> Config {
        let content = format!("[settings]\nstate_dir = \"state\"\n{body}");
        Config::parse(&content, Some(dir.path())).unwrap()
    }

    fn runner() -> TaskRunner {
        TaskRunner::new(Arc::new(FsStampStore::new()))
    }

    #[tokio::test]
    async fn test_command_tasks_run_once_in_order() {
        let dir = TempDir::new().unwrap();
        let config = config(
            &dir,
            r#"
[[owner]]
name = "box"

[[owner.task]]
name = "second"
run = "echo second >> \"$SETUPTASK_STAMP_DIR/../log\""

[[owner.task]]
name = "first"
run = "mkdir -p \"$SETUPTASK_STAMP_DIR\" && echo first >> \"$SETUPTASK_STAMP_DIR/../log\""
before = ["second"]
"#,
        );
        let layout =
            Layout::from_config(config.owner("box").unwrap(), &config.settings, None).unwrap();
        let runner = runner();

        runner
            .run_setup_tasks(&layout.owner, &layout.tasks, None)
            .await
            .unwrap();
        let report = runner
            .run_setup_tasks(&layout.owner, &layout.tasks, None)
            .await
            .unwrap();

        assert!(report.ran().is_empty());
        let log = std::fs::read_to_string(dir.path().join("state/log")).unwrap();
        assert_eq!(log, "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_failing_command_fails_task() {
        let dir = TempDir::new().unwrap();
        let config = config(
            &dir,
            r#"
[[owner]]
name = "box"

[[owner.task]]
name = "broken"
run = "echo nope >&2; exit 3"
"#,
        );
        let layout =
            Layout::from_config(config.owner("box").unwrap(), &config.settings, None).unwrap();

        let err = runner()
            .run_setup_tasks(&layout.owner, &layout.tasks, None)
            .await
            .unwrap_err();
        assert_eq!(err.failed_task(), Some("broken"));
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_check_always_and_hash_files() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let packages = dir.path().join("packages.txt");
        std::fs::write(&packages, "git\n").unwrap();
        let config = config(
            &dir,
            &format!(
                r#"
[[owner]]
name = "box"

[[owner.task]]
name = "checked"
run = "true"
check = "test -e {marker}"

[[owner.task]]
name = "always"
run = "true"
always = true

[[owner.task]]
name = "packages"
run = "true"
hash_files = ["packages.txt"]
"#,
                marker = marker.display()
            ),
        );
        let layout =
            Layout::from_config(config.owner("box").unwrap(), &config.settings, None).unwrap();
        let runner = runner();

        let first = runner
            .run_setup_tasks(&layout.owner, &layout.tasks, None)
            .await
            .unwrap();
        assert_eq!(first.ran(), vec!["checked", "always", "packages"]);

        std::fs::write(&marker, "").unwrap();
        let second = runner
            .run_setup_tasks(&layout.owner, &layout.tasks, None)
            .await
            .unwrap();
        assert_eq!(second.outcome("checked"), Some(&TaskOutcome::SkippedByCheck));
        assert_eq!(second.ran(), vec!["always"]);

        std::fs::write(&packages, "git\ncurl\n").unwrap();
        let third = runner
            .run_setup_tasks(&layout.owner, &layout.tasks, None)
            .await
            .unwrap();
        assert_eq!(third.ran(), vec!["always", "packages"]);
    }

    #[tokio::test]
    async fn test_template_tasks() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(templates.join("motd.tera"), "{{ owner }} at {{ site }}\n").unwrap();
        let config = config(
            &dir,
            r#"
[[owner]]
name = "box"

[[owner.template]]
name = "motd"
template = "motd.tera"
vars = { site = "lab" }
"#,
        );
        let owner = config.owner("box").unwrap();

        let err = Layout::from_config(owner, &config.settings, None).unwrap_err();
        assert!(err.to_string().contains("templates_dir"));

        let renderer: Arc<dyn TemplateRenderer> =
            Arc::new(TeraRenderer::from_dir(&templates).unwrap());
        let layout = Layout::from_config(owner, &config.settings, Some(&renderer)).unwrap();
        runner()
            .run_setup_tasks(&layout.owner, &layout.tasks, None)
            .await
            .unwrap();

        let rendered = std::fs::read_to_string(dir.path().join("state/box/motd")).unwrap();
        assert_eq!(rendered, "box at lab\n");
    }

    #[test]
    fn test_invalid_ordering_rejected() {
        let dir = TempDir::new().unwrap();
        let config = config(
            &dir,
            r#"
[[owner]]
name = "box"

[[owner.task]]
name = "only"
run = "true"
after = ["missing"]
"#,
        );
        let err = Layout::from_config(config.owner("box").unwrap(), &config.settings, None)
            .unwrap_err();
        assert!(format!("{err:?}").contains("missing"));
    }
}
