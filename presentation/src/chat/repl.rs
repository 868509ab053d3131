//! REPL (Read-Eval-Print Loop) for Plan and Build mode

use crate::config::ReplConfig;
use crate::output::console::ConsoleFormatter;
use crate::output::diff::FileSnapshot;
use avakin_application::{
    KnowledgeStorePort, Orchestrator, OrchestratorError, PipelineHandle, SubmitOutcome,
    WorkspacePort,
};
use avakin_domain::{
    AgentRole, ImageAttachment, InteractionMode, ModelBackend, PipelineRun, QueryScope,
    RoleBinding, Scope,
};
use colored::Colorize;
use reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

const HISTORY_CAPACITY: usize = 1000;
const QUERY_RESULTS: usize = 5;

/// Result of handling a slash command
enum CommandResult {
    Continue,
    Exit,
}

/// Interactive session over one project
pub struct AvakinRepl {
    orchestrator: Arc<Orchestrator>,
    workspace: Arc<dyn WorkspacePort>,
    knowledge: Arc<dyn KnowledgeStorePort>,
    config: ReplConfig,
}

impl AvakinRepl {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        workspace: Arc<dyn WorkspacePort>,
        knowledge: Arc<dyn KnowledgeStorePort>,
    ) -> Self {
        Self {
            orchestrator,
            workspace,
            knowledge,
            config: ReplConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReplConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the interactive REPL until /quit or Ctrl-D
    pub async fn run(&self) -> std::io::Result<()> {
        let mut editor = Reedline::create();
        if let Some(path) = self.config.history_path() {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match FileBackedHistory::with_file(HISTORY_CAPACITY, path) {
                Ok(history) => editor = editor.with_history(Box::new(history)),
                Err(e) => warn!("History disabled: {}", e),
            }
        }

        self.print_welcome().await;

        loop {
            let mode = self.orchestrator.project().await.mode;
            let prompt = DefaultPrompt::new(
                DefaultPromptSegment::Basic(format!("avakin:{}", mode)),
                DefaultPromptSegment::Empty,
            );

            match editor.read_line(&prompt)? {
                Signal::Success(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line.starts_with('/') {
                        match self.handle_command(line).await {
                            CommandResult::Exit => break,
                            CommandResult::Continue => continue,
                        }
                    }
                    self.process_message(line, None).await;
                }
                Signal::CtrlD => {
                    println!("Bye!");
                    break;
                }
                _ => {
                    println!("^C");
                }
            }
        }

        Ok(())
    }

    async fn print_welcome(&self) {
        let project = self.orchestrator.project().await;
        println!();
        println!("{}", ConsoleFormatter::header("Avakin"));
        println!();
        println!("{} {}", "Project:".bold(), project.root.display());
        println!("{} {}", "Mode:".bold(), project.mode);
        if project.mode == InteractionMode::Build {
            println!(
                "{}",
                "An approved blueprint was found; messages become modification requests."
                    .dimmed()
            );
        } else {
            println!("{}", "Describe what you want to build.".dimmed());
        }
        println!("{}", "Type /help for commands.".dimmed());
        println!();
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Commands:".bold());
        println!("  /approve               Approve the blueprint draft and start building");
        println!("  /blueprint             Show the current blueprint");
        println!("  /fix [file]            Review & fix using a traceback (pasted, end with '.')");
        println!("  /image <file> <message>  Send a message with an image (png, jpeg, gif, webp)");
        println!("  /ingest <path> [--global]  Add documents to a knowledge store");
        println!("  /query <text>          Search project and global knowledge");
        println!("  /models                Show model bindings");
        println!("  /model <role> <provider/model>  Rebind a role for this session");
        println!("  /status                Mode, plan state and last run");
        println!("  /help                  Show this help");
        println!("  /quit, /exit           Leave");
        println!();
    }

    async fn handle_command(&self, line: &str) -> CommandResult {
        let (command, args) = match line.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" | "/q" => {
                println!("Bye!");
                return CommandResult::Exit;
            }
            "/help" | "/h" | "/?" => self.print_help(),
            "/approve" => self.approve().await,
            "/blueprint" => match self.orchestrator.project().await.blueprint {
                Some(blueprint) => println!("{}", ConsoleFormatter::format_blueprint(&blueprint)),
                None => println!("{}", "No blueprint drafted yet.".dimmed()),
            },
            "/fix" => self.fix(args).await,
            "/image" => self.image_message(args).await,
            "/ingest" => self.ingest(args).await,
            "/query" => self.query(args).await,
            "/models" => {
                let config = self.orchestrator.router().config();
                println!("{}", ConsoleFormatter::format_bindings(&config));
            }
            "/model" => self.rebind(args),
            "/status" => self.print_status().await,
            _ => {
                println!("Unknown command: {}", command);
                println!("Type /help for available commands");
            }
        }
        CommandResult::Continue
    }

    async fn process_message(&self, message: &str, image: Option<ImageAttachment>) {
        let snapshot = self.snapshot_if_building().await;
        match self.orchestrator.submit_with_image(message, image).await {
            Ok(SubmitOutcome::Reply {
                text,
                plan_state,
                blueprint_updated,
            }) => {
                println!(
                    "{}",
                    ConsoleFormatter::format_reply(&text, plan_state, blueprint_updated)
                );
            }
            Ok(SubmitOutcome::RunStarted(handle)) => {
                self.await_run(handle, snapshot.unwrap_or_default()).await;
            }
            Err(e) => print_error(&e),
        }
    }

    async fn approve(&self) {
        let snapshot = self.capture().await;
        match self.orchestrator.approve_blueprint().await {
            Ok(handle) => self.await_run(handle, snapshot).await,
            Err(e) => print_error(&e),
        }
    }

    async fn fix(&self, args: &str) {
        let traceback = if args.is_empty() {
            println!(
                "{}",
                "Paste the traceback, then a line with a single '.':".dimmed()
            );
            read_until_dot()
        } else {
            match std::fs::read_to_string(self.resolve(args)) {
                Ok(content) => content,
                Err(e) => {
                    println!("{} {}: {}", "Error:".red().bold(), args, e);
                    return;
                }
            }
        };
        if traceback.trim().is_empty() {
            println!("{}", "No traceback given.".dimmed());
            return;
        }

        let snapshot = self.capture().await;
        match self.orchestrator.request_fix(&traceback).await {
            Ok(handle) => self.await_run(handle, snapshot).await,
            Err(e) => print_error(&e),
        }
    }

    async fn image_message(&self, args: &str) {
        let Some((path, message)) = split_image_args(args) else {
            println!("Usage: /image <file> <message>");
            return;
        };
        let resolved = self.resolve(path);
        let bytes = match tokio::fs::read(&resolved).await {
            Ok(bytes) => bytes,
            Err(e) => {
                println!("{} {}: {}", "Error:".red().bold(), path, e);
                return;
            }
        };
        let name = resolved
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_string();
        match ImageAttachment::from_bytes(name, bytes) {
            Ok(image) => self.process_message(message, Some(image)).await,
            Err(e) => println!("{} {}", "Error:".red().bold(), e),
        }
    }

    async fn ingest(&self, args: &str) {
        let mut global = false;
        let mut path = None;
        for arg in args.split_whitespace() {
            match arg {
                "--global" | "-g" => global = true,
                other => path = Some(other),
            }
        }
        let Some(path) = path else {
            println!("Usage: /ingest <path> [--global]");
            return;
        };

        let scope = if global {
            Scope::Global
        } else {
            Scope::Project(self.orchestrator.project().await.id)
        };
        match self.knowledge.ingest_path(&self.resolve(path), &scope).await {
            Ok(report) => print!("{}", ConsoleFormatter::format_ingest(&report)),
            Err(e) => println!("{} {}", "Error:".red().bold(), e),
        }
    }

    async fn query(&self, text: &str) {
        if text.is_empty() {
            println!("Usage: /query <text>");
            return;
        }
        let project = self.orchestrator.project().await.id;
        let mut scope = QueryScope::project(project);
        if !self.orchestrator.settings().include_global {
            scope = scope.without_global();
        }
        match self.knowledge.query(text, &scope, QUERY_RESULTS).await {
            Ok(chunks) => print!("{}", ConsoleFormatter::format_chunks(&chunks)),
            Err(e) => println!("{} {}", "Error:".red().bold(), e),
        }
    }

    /// Rebind one role for the rest of the session
    fn rebind(&self, args: &str) {
        let mut parts = args.split_whitespace();
        let (Some(role), Some(assignment)) = (parts.next(), parts.next()) else {
            println!("Usage: /model <role> <provider/model>");
            return;
        };
        let role: AgentRole = match role.parse() {
            Ok(role) => role,
            Err(never) => match never {},
        };
        let Some(backend) = ModelBackend::from_assignment(assignment) else {
            println!(
                "{} expected provider/model, got '{}'",
                "Error:".red().bold(),
                assignment
            );
            return;
        };

        let router = self.orchestrator.router();
        let mut config = router.config();
        let binding = match config.bindings.get(&role) {
            Some(current) => RoleBinding {
                primary: backend,
                fallback: current.fallback.clone(),
            },
            None => RoleBinding::new(backend),
        };
        config.bindings.insert(role.clone(), binding);
        match router.reconfigure(config) {
            Ok(()) => println!(
                "{} {} -> {}",
                "Rebound".green(),
                role.display_name(),
                assignment
            ),
            Err(e) => println!("{} {}", "Error:".red().bold(), e),
        }
    }

    async fn print_status(&self) {
        let project = self.orchestrator.project().await;
        println!();
        println!("{} {}", "Project:".bold(), project.id);
        println!("{} {}", "Mode:".bold(), project.mode);
        if project.mode == InteractionMode::Plan {
            println!("{} {}", "Plan state:".bold(), project.plan_state);
        }
        println!("{} {}", "Turns:".bold(), project.history.len());
        if self.orchestrator.is_busy() {
            println!("{}", "A run is active.".yellow());
        }
        if let Some(run) = self.orchestrator.last_run() {
            println!(
                "{} {} ({})",
                "Last run:".bold(),
                run.id.as_str(),
                run.stage.display_name()
            );
        }
        println!();
    }

    /// Wait for a run, cancelling it on Ctrl-C, then report the outcome
    async fn await_run(&self, handle: PipelineHandle, snapshot: FileSnapshot) {
        let cancel = handle.cancellation_token();
        let wait = handle.wait();
        tokio::pin!(wait);

        let result = tokio::select! {
            biased;
            result = &mut wait => result,
            _ = tokio::signal::ctrl_c() => {
                println!("\n{}", "Cancelling...".yellow());
                cancel.cancel();
                wait.await
            }
        };

        match result {
            Ok(run) => self.report_run(&run, &snapshot).await,
            Err(e) => print_error(&e),
        }
    }

    async fn report_run(&self, run: &PipelineRun, snapshot: &FileSnapshot) {
        println!("{}", ConsoleFormatter::format_run(run));
        if !self.config.show_diffs {
            return;
        }
        let files = run.files_written();
        for diff in snapshot.diffs(self.workspace.as_ref(), &files).await {
            println!("{}", diff);
        }
    }

    async fn capture(&self) -> FileSnapshot {
        if self.config.show_diffs {
            FileSnapshot::capture(self.workspace.as_ref()).await
        } else {
            FileSnapshot::default()
        }
    }

    /// Build-mode messages start runs, so the tree is captured beforehand
    async fn snapshot_if_building(&self) -> Option<FileSnapshot> {
        if self.orchestrator.project().await.mode == InteractionMode::Build {
            Some(self.capture().await)
        } else {
            None
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.root().join(path)
        }
    }
}

fn print_error(error: &OrchestratorError) {
    match error {
        OrchestratorError::PipelineBusy(_) => {
            println!("{} {}", "Busy:".yellow().bold(), error);
        }
        _ => println!("{} {}", "Error:".red().bold(), error),
    }
}

/// `<file> <message>`; both parts are required
fn split_image_args(args: &str) -> Option<(&str, &str)> {
    let (path, message) = args.split_once(char::is_whitespace)?;
    let message = message.trim();
    (!message.is_empty()).then_some((path, message))
}

/// Read stdin lines until one consisting of a single '.'
fn read_until_dot() -> String {
    collect_until_dot(std::io::stdin().lock())
}

fn collect_until_dot(reader: impl BufRead) -> String {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim() == "." {
            break;
        }
        lines.push(line);
    }
    lines.join("\n")
}
