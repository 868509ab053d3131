//! CLI entrypoint for Avakin
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, anyhow, bail};
use avakin_application::{
    CapabilityRegistryPort, ConversationLogger, Embedder, KnowledgeStorePort, ModelRouter,
    ModelTransport, NoConversationLogger, Orchestrator, PipelineProgressNotifier, WorkspacePort,
};
use avakin_domain::{
    AgentRole, BuildStage, Chunker, ModelBackend, Project, QueryScope, RoleBinding, Scope,
};
use avakin_infrastructure::config::{FileConfig, FileLoggingConfig, Severity};
use avakin_infrastructure::{
    ConfigLoader, JsonlConversationLogger, LocalWorkspace, PluginDiscovery, PluginManager,
    PluginRegistry, RoutingTransport, VectorKnowledgeStore, default_adapters,
    embedder_from_config,
};
use avakin_presentation::{
    AvakinRepl, Cli, Command, ConsoleFormatter, KnowledgeTarget, ModelsAction, PluginsAction,
    ProgressReporter, ReplConfig, SimpleProgress,
};
use clap::Parser;
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let root = project_root(cli.project.as_deref())?;

    // .env in the working directory, then the project root
    dotenv::dotenv().ok();
    dotenv::from_path(root.join(".env")).ok();

    if cli.show_config {
        ConfigLoader::print_config_sources(Some(&root));
        return Ok(());
    }

    let config = ConfigLoader::load(Some(&root), cli.config.as_deref())
        .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;

    let _log_guard = init_logging(cli.verbose, &config.logging);
    info!(project = %root.display(), "Starting Avakin");

    report_config_issues(&config)?;

    let command = cli.command.clone().unwrap_or(Command::Chat);
    let app = App::build(&cli, &config, &root).await?;

    match command {
        Command::Chat => app.chat(&config).await,
        Command::Ingest { path, target } => app.ingest(&path, target).await,
        Command::Query {
            text,
            k,
            no_global,
            global_only,
        } => app.query(&text, k, no_global, global_only).await,
        Command::Rebuild { target } => app.rebuild(target).await,
        Command::Models { action } => {
            app.models(action.unwrap_or(ModelsAction::List)).await
        }
        Command::Plugins { action } => {
            app.plugins(action.unwrap_or(PluginsAction::List)).await
        }
        Command::Fix { file } => app.fix(&config, file.as_deref()).await,
    }
}

/// Canonical project root, created if missing
fn project_root(explicit: Option<&Path>) -> Result<PathBuf> {
    let root = match explicit {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("Cannot determine the current directory")?,
    };
    std::fs::create_dir_all(&root)
        .with_context(|| format!("Cannot create project directory {}", root.display()))?;
    root.canonicalize()
        .with_context(|| format!("Cannot resolve project directory {}", root.display()))
}

/// stderr at the verbosity chosen by `-v` (RUST_LOG overrides), plus a
/// daily-rolling file log
fn init_logging(verbose: u8, logging: &FileLoggingConfig) -> Option<WorkerGuard> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_dir = logging.log_dir();
    let (file_layer, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "avakin.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

fn report_config_issues(config: &FileConfig) -> Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            Severity::Warning => eprintln!("{} {}", "Config warning:".yellow().bold(), issue),
            Severity::Error => eprintln!("{} {}", "Config error:".red().bold(), issue),
        }
    }
    if issues.iter().any(|i| i.severity == Severity::Error) {
        bail!("Configuration has errors; fix them or run with --show-config to see sources");
    }
    Ok(())
}

/// Wired application services for one project
struct App {
    project: Project,
    quiet: bool,
    router: Arc<ModelRouter>,
    transport: Arc<dyn ModelTransport>,
    knowledge: Arc<VectorKnowledgeStore>,
    workspace: Arc<LocalWorkspace>,
    plugins: Arc<PluginManager>,
    logger: Arc<dyn ConversationLogger>,
    progress: Arc<dyn PipelineProgressNotifier>,
}

impl App {
    // === Dependency Injection ===
    async fn build(cli: &Cli, config: &FileConfig, root: &Path) -> Result<Self> {
        let project = Project::open(root);

        let progress: Arc<dyn PipelineProgressNotifier> = if cli.quiet {
            Arc::new(SimpleProgress)
        } else {
            Arc::new(ProgressReporter::new())
        };

        // Model providers
        let adapters = default_adapters(&config.providers)
            .map_err(|e| anyhow!("Failed to create model transports: {}", e))?;
        let transport: Arc<dyn ModelTransport> = Arc::new(RoutingTransport::new(adapters));
        let router = Arc::new(
            ModelRouter::new(Arc::clone(&transport), config.router_config())
                .with_progress(Arc::clone(&progress)),
        );

        // Plugins
        let registry = Arc::new(PluginRegistry::new());
        let plugins = Arc::new(PluginManager::new(
            Arc::clone(&registry),
            PluginDiscovery::new(config.plugins.search_dirs()),
            config.plugins.state_path(),
        ));

        // Knowledge
        let embedder = embedder_from_config(&config.knowledge, &config.providers.ollama)?;
        let chunker = Chunker::new(config.knowledge.chunk_size, config.knowledge.chunk_overlap);
        let knowledge = VectorKnowledgeStore::open(
            config.knowledge.global_db_dir(),
            embedder,
            chunker,
        )
        .await?
        .with_capabilities(registry);
        knowledge
            .open_project(&project.id, &config.knowledge.project_db_dir(root))
            .await?;

        let logger: Arc<dyn ConversationLogger> = if config.logging.conversation_log {
            match JsonlConversationLogger::for_project(root, project.id.clone()) {
                Some(logger) => Arc::new(logger),
                None => Arc::new(NoConversationLogger),
            }
        } else {
            Arc::new(NoConversationLogger)
        };

        Ok(Self {
            project,
            quiet: cli.quiet,
            router,
            transport,
            knowledge: Arc::new(knowledge),
            workspace: Arc::new(LocalWorkspace::new(root)),
            plugins,
            logger,
            progress,
        })
    }

    async fn activate_plugins(&self) {
        let report = self.plugins.activate_all().await;
        if !report.activated.is_empty() {
            info!(plugins = ?report.activated, "Plugins active");
        }
        for (name, error) in &report.failed {
            eprintln!("{} {}: {}", "Plugin failed:".yellow().bold(), name, error);
        }
        for error in &report.invalid {
            warn!("Invalid plugin: {}", error);
        }
    }

    fn orchestrator(&self, config: &FileConfig) -> Orchestrator {
        let capabilities: Arc<dyn CapabilityRegistryPort> = self.plugins.registry().clone();
        Orchestrator::new(
            self.project.clone(),
            Arc::clone(&self.router),
            Arc::clone(&self.knowledge) as Arc<dyn KnowledgeStorePort>,
            Arc::clone(&self.workspace) as Arc<dyn WorkspacePort>,
        )
        .with_capabilities(capabilities)
        .with_progress(Arc::clone(&self.progress))
        .with_logger(Arc::clone(&self.logger))
        .with_settings(config.pipeline_settings())
    }

    async fn chat(&self, config: &FileConfig) -> Result<()> {
        self.activate_plugins().await;
        let orchestrator = Arc::new(self.orchestrator(config));
        if orchestrator.resume().await? {
            info!("Resumed in Build mode");
        }

        let repl_config = ReplConfig {
            show_progress: config.repl.show_progress && !self.quiet,
            history_file: config.repl.history_file.clone(),
            show_diffs: config.repl.show_diffs,
        };
        AvakinRepl::new(
            orchestrator,
            Arc::clone(&self.workspace) as Arc<dyn WorkspacePort>,
            Arc::clone(&self.knowledge) as Arc<dyn KnowledgeStorePort>,
        )
        .with_config(repl_config)
        .run()
        .await?;
        Ok(())
    }

    fn scope(&self, target: KnowledgeTarget) -> Scope {
        if target.global {
            Scope::Global
        } else {
            Scope::Project(self.project.id.clone())
        }
    }

    async fn ingest(&self, path: &Path, target: KnowledgeTarget) -> Result<()> {
        // Ingester plugins extend the supported file types
        self.activate_plugins().await;
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let report = self.knowledge.ingest_path(&path, &self.scope(target)).await?;
        print!("{}", ConsoleFormatter::format_ingest(&report));
        Ok(())
    }

    async fn query(&self, text: &str, k: usize, no_global: bool, global_only: bool) -> Result<()> {
        let scope = if global_only {
            QueryScope::global_only()
        } else if no_global {
            QueryScope::project(self.project.id.clone()).without_global()
        } else {
            QueryScope::project(self.project.id.clone())
        };
        let chunks = self.knowledge.query(text, &scope, k).await?;
        print!("{}", ConsoleFormatter::format_chunks(&chunks));
        Ok(())
    }

    async fn rebuild(&self, target: KnowledgeTarget) -> Result<()> {
        let scope = self.scope(target);
        let embedder = self.knowledge.embedder();
        let model = embedder.model_id();
        let count = self.knowledge.rebuild(&scope, embedder).await?;
        println!(
            "{} {} chunk(s) in {} with {}",
            "Re-embedded".green().bold(),
            count,
            scope,
            model.name
        );
        Ok(())
    }

    async fn models(&self, action: ModelsAction) -> Result<()> {
        match action {
            ModelsAction::List => {
                println!("{}", ConsoleFormatter::format_bindings(&self.router.config()));
            }
            ModelsAction::Available => {
                let models = self.transport.list_models().await?;
                println!("{}", ConsoleFormatter::format_models(&models));
            }
            ModelsAction::Set {
                role,
                model,
                fallback,
            } => {
                let role: AgentRole = match role.parse() {
                    Ok(role) => role,
                    Err(never) => match never {},
                };
                let primary = parse_backend(&model)?;
                let mut binding = RoleBinding::new(primary);
                if let Some(fallback) = fallback {
                    binding = binding.with_fallback(parse_backend(&fallback)?);
                }

                let path = ConfigLoader::global_config_path()
                    .context("No configuration directory on this platform")?;
                // Only the global layers, so project overrides are not copied
                let global = ConfigLoader::load(None, None)
                    .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;
                let mut bindings = global.router_config().bindings;
                bindings.insert(role.clone(), binding);
                ConfigLoader::save_bindings(&path, bindings.iter())?;

                println!(
                    "{} {} -> {} ({})",
                    "Saved".green().bold(),
                    role.display_name(),
                    model,
                    path.display()
                );
            }
        }
        Ok(())
    }

    async fn plugins(&self, action: PluginsAction) -> Result<()> {
        match action {
            PluginsAction::List => {
                self.activate_plugins().await;
                let listing = self.plugins.list().await;
                if listing.is_empty() {
                    println!("No plugins found in:");
                    for dir in self.plugins.discovery().roots() {
                        println!("  {}", dir.display());
                    }
                }
                for plugin in listing {
                    println!(
                        "{}",
                        ConsoleFormatter::plugin_row(
                            &plugin.name,
                            &plugin.version,
                            &plugin.capabilities,
                            &plugin.state
                        )
                    );
                }
            }
            PluginsAction::Enable { name } => {
                self.plugins.set_enabled(&name, true).await?;
                println!("{} {}", "Enabled".green().bold(), name);
            }
            PluginsAction::Disable { name } => {
                self.plugins.set_enabled(&name, false).await?;
                println!("{} {}", "Disabled".yellow().bold(), name);
            }
        }
        Ok(())
    }

    async fn fix(&self, config: &FileConfig, file: Option<&Path>) -> Result<()> {
        let traceback = match file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read {}", path.display()))?,
            None => {
                let mut input = String::new();
                std::io::stdin().read_to_string(&mut input)?;
                input
            }
        };
        if traceback.trim().is_empty() {
            bail!("No traceback given");
        }

        self.activate_plugins().await;
        let orchestrator = self.orchestrator(config);
        orchestrator.resume().await?;

        let handle = orchestrator.request_fix(&traceback).await?;
        let cancel = handle.cancellation_token();
        let wait = handle.wait();
        tokio::pin!(wait);
        let run = tokio::select! {
            biased;
            run = &mut wait => run?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("{}", "Cancelling...".yellow());
                cancel.cancel();
                wait.await?
            }
        };

        println!("{}", ConsoleFormatter::format_run(&run));
        if run.stage != BuildStage::Done {
            bail!("Review & Fix did not complete");
        }
        Ok(())
    }
}

fn parse_backend(assignment: &str) -> Result<ModelBackend> {
    ModelBackend::from_assignment(assignment)
        .ok_or_else(|| anyhow!("Expected provider/model, got '{}'", assignment))
}
