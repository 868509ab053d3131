//! Console output formatter

use avakin_application::{IngestReport, RouterConfig};
use avakin_domain::{
    AgentRole, Blueprint, BuildStage, Capability, ModelBackend, PipelineRun, PlanState,
    PluginState, RetrievedChunk, RoleBinding, RunKind, Scope, truncate,
};
use colored::Colorize;

/// Maximum characters of a chunk shown in query results
const CHUNK_PREVIEW: usize = 400;

/// Formats orchestrator, knowledge and plugin results for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Plan-mode reply, with a hint when the draft is ready to approve
    pub fn format_reply(text: &str, plan_state: PlanState, blueprint_updated: bool) -> String {
        let mut output = format!("\n{}\n", text.trim());
        if blueprint_updated {
            output.push_str(&format!("\n{}\n", "Blueprint updated.".cyan()));
        }
        if plan_state == PlanState::AwaitingApproval {
            output.push_str(&format!(
                "{}\n",
                "Type /approve to build it, or keep refining.".dimmed()
            ));
        }
        output
    }

    pub fn format_blueprint(blueprint: &Blueprint) -> String {
        format!(
            "{}\n{}",
            Self::section_header("Blueprint"),
            blueprint.to_markdown()
        )
    }

    /// Summary of a finished run
    pub fn format_run(run: &PipelineRun) -> String {
        let mut output = String::new();
        let kind = match &run.kind {
            RunKind::Build => "Build".to_string(),
            RunKind::Modify { request } => format!("Modify: {}", truncate(request, 60)),
            RunKind::Fix { .. } => "Review & Fix".to_string(),
        };
        output.push_str(&Self::header(&kind));
        output.push('\n');

        for record in &run.records {
            output.push_str(&format!(
                "  {} {}\n",
                format!("[{}]", record.stage.display_name()).cyan(),
                record.summary
            ));
            for path in &record.files_written {
                output.push_str(&format!("      {} {}\n", "+".green(), path));
            }
        }

        output.push_str(&format!(
            "\n{} {} revision(s), {} fix attempt(s), {} tokens\n",
            "Stats:".bold(),
            run.revision_count,
            run.fix_attempts,
            run.usage.total()
        ));

        match run.stage {
            BuildStage::Done => {
                output.push_str(&format!("{}\n", "Run completed.".green().bold()));
            }
            BuildStage::Failed if run.cancelled => {
                output.push_str(&format!("{}\n", "Run cancelled.".yellow().bold()));
            }
            _ => {
                let stage = run
                    .failed_stage
                    .map(|s| s.display_name().to_string())
                    .unwrap_or_else(|| "unknown stage".to_string());
                output.push_str(&format!(
                    "{} during {}: {}\n",
                    "Run failed".red().bold(),
                    stage,
                    run.last_error.as_deref().unwrap_or("no error recorded")
                ));
            }
        }
        output
    }

    pub fn format_chunks(chunks: &[RetrievedChunk]) -> String {
        if chunks.is_empty() {
            return format!("{}\n", "No matching knowledge.".dimmed());
        }
        let mut output = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let origin = match &chunk.scope {
                Scope::Project(id) => format!("project {}", id).yellow(),
                Scope::Global => "global".to_string().magenta(),
            };
            output.push_str(&format!(
                "{} {} ({}, score {:.3})\n{}\n\n",
                format!("{}.", i + 1).bold(),
                chunk.document_id.bold(),
                origin,
                chunk.score,
                Self::indent(&truncate(&chunk.text, CHUNK_PREVIEW), "   ")
            ));
        }
        output
    }

    pub fn format_ingest(report: &IngestReport) -> String {
        let mut output = format!(
            "{} {} document(s), {} chunk(s) added, {} duplicate(s) skipped\n",
            "Ingested".green().bold(),
            report.documents,
            report.chunks_added,
            report.duplicates_skipped
        );
        for (document, reason) in &report.failures {
            output.push_str(&format!("  {} {}: {}\n", "x".red(), document, reason));
        }
        output
    }

    /// Role bindings, built-in roles first
    pub fn format_bindings(config: &RouterConfig) -> String {
        let mut roles: Vec<&AgentRole> = config.bindings.keys().collect();
        roles.sort_by_key(|role| (role.is_custom(), role.as_str().to_string()));

        let mut output = Self::section_header("Model bindings");
        for role in roles {
            if let Some(binding) = config.bindings.get(role) {
                output.push_str(&format!(
                    "  {:<12} {}\n",
                    role.display_name().bold(),
                    Self::binding_label(binding)
                ));
            }
        }
        output
    }

    fn binding_label(binding: &RoleBinding) -> String {
        let mut label = Self::backend_label(&binding.primary);
        if let Some(fallback) = &binding.fallback {
            label.push_str(&format!(
                " {} {}",
                "fallback".dimmed(),
                Self::backend_label(fallback)
            ));
        }
        label
    }

    fn backend_label(backend: &ModelBackend) -> String {
        let mut label = backend.label();
        if let Some(t) = backend.temperature {
            label.push_str(&format!(" (t={})", t));
        }
        if backend.is_local() {
            label
        } else {
            format!("{} {}", label, "[cloud]".dimmed())
        }
    }

    pub fn format_models(models: &[ModelBackend]) -> String {
        if models.is_empty() {
            return format!(
                "{}\n",
                "No models discovered. Is the local daemon running, or an API key set?".yellow()
            );
        }
        let mut output = Self::section_header("Available models");
        for model in models {
            output.push_str(&format!("  {}\n", Self::backend_label(model)));
        }
        output
    }

    pub fn plugin_row(
        name: &str,
        version: &str,
        capabilities: &[Capability],
        state: &PluginState,
    ) -> String {
        let caps = capabilities
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let state = match state {
            PluginState::Active => state.to_string().green(),
            PluginState::Disabled => state.to_string().dimmed(),
            PluginState::Invalid(_) | PluginState::Failed(_) => state.to_string().red(),
        };
        format!("  {:<24} {:<8} {:<28} {}", name.bold(), version, caps, state)
    }

    pub fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    pub fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    /// Indent a multi-line string
    pub fn indent(text: &str, prefix: &str) -> String {
        text.lines()
            .map(|line| format!("{}{}", prefix, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
