//! Build-mode pipeline execution
//!
//! One [`BuildPipeline`] drives one [`PipelineRun`] through
//! Scaffolding → Coding → Reviewing → Validating, taking the bounded
//! back-edges the run's limits allow. Each stage retrieves context,
//! assembles its prompt, invokes the role's backend and parses the reply,
//! re-prompting once on a parse failure. Coding is the only stage that
//! writes, and it commits all of its files together at the end.

use super::Services;
use super::types::OrchestratorError;
use avakin_domain::core::string::truncate;
use avakin_domain::{
    AgentRole, AgentRoleProvider, Blueprint, BuildStage, FileBrief, FileWrite, GeneratedFile,
    ImageAttachment, ParseFailure, PipelinePromptTemplate, PipelineRun, ProjectId, ProjectSnapshot,
    RetrievedChunk, RunKind, StageRecord, TokenUsage, ToolInvocation, ToolOutput,
    parse_file_content, parse_review_verdict, parse_scaffold_plan, parse_traceback,
    parse_validation_verdict, validate_relative_path,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ports::conversation_logger::ConversationEvent;
use crate::ports::model_transport::ModelRequest;

/// Files read for review when a Fix run starts without implicated files
const MAX_REVIEW_FILES: usize = 30;

pub(super) struct BuildPipeline {
    services: Services,
    project_id: ProjectId,
    blueprint: Blueprint,
    run: PipelineRun,
    cancel: CancellationToken,
    briefs: Vec<FileBrief>,
    /// Files committed by this run, in first-commit order
    generated: Vec<FileWrite>,
    /// Files the next Coding stage regenerates
    targets: Vec<String>,
    /// Reviewer/validator notes per target
    notes: HashMap<String, String>,
    /// Project files named by the traceback of a Fix run
    implicated: Vec<String>,
    /// Plugin roles leased for this run; the registry is not re-read
    plugin_roles: Vec<Arc<dyn AgentRoleProvider>>,
    /// Images sent with the request that started the run
    images: Vec<ImageAttachment>,
}

impl BuildPipeline {
    pub(super) fn new(
        services: Services,
        project_id: ProjectId,
        blueprint: Blueprint,
        run: PipelineRun,
        cancel: CancellationToken,
        plugin_roles: Vec<Arc<dyn AgentRoleProvider>>,
    ) -> Self {
        Self {
            services,
            project_id,
            blueprint,
            run,
            cancel,
            briefs: Vec::new(),
            generated: Vec::new(),
            targets: Vec::new(),
            notes: HashMap::new(),
            implicated: Vec::new(),
            plugin_roles,
            images: Vec::new(),
        }
    }

    /// Images the Architect sees while scaffolding
    pub(super) fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }

    pub(super) async fn execute(mut self) -> PipelineRun {
        info!(run_id = %self.run.id, stage = %self.run.stage, "Pipeline run started");
        self.services
            .progress
            .on_run_start(&self.run.id, &self.run.kind);
        self.services.progress.on_stage_change(self.run.stage);
        self.log_event(
            "run_started",
            json!({ "kind": &self.run.kind, "stage": self.run.stage }),
        );

        if let RunKind::Fix { traceback } = &self.run.kind {
            let traceback = traceback.clone();
            self.implicated = self.implicated_files(&traceback).await;
            debug!(files = ?self.implicated, "Files implicated by traceback");
        }

        while !self.run.is_finished() {
            if self.cancel.is_cancelled() {
                self.run.cancel();
                break;
            }

            let outcome = match self.run.stage {
                BuildStage::Scaffolding => self.scaffold().await,
                BuildStage::Coding => self.code().await,
                BuildStage::Reviewing => self.review().await,
                BuildStage::Validating => self.validate().await,
                BuildStage::Done | BuildStage::Failed => break,
            };

            match outcome {
                Ok(next) => match self.run.advance(next) {
                    Ok(()) => {
                        info!(run_id = %self.run.id, stage = %next, "Stage change");
                        self.services.progress.on_stage_change(next);
                        self.log_event("stage_change", json!({ "stage": next }));
                    }
                    Err(e) => self.run.fail(e.to_string()),
                },
                Err(e) if e.is_cancelled() || self.cancel.is_cancelled() => {
                    info!(run_id = %self.run.id, stage = %self.run.stage, "Pipeline run cancelled");
                    self.run.cancel();
                }
                Err(e) => {
                    warn!(run_id = %self.run.id, stage = %self.run.stage, error = %e, "Stage failed");
                    self.run.fail(e.to_string());
                }
            }
        }

        if self.run.stage == BuildStage::Failed {
            self.services.progress.on_stage_change(BuildStage::Failed);
        }
        self.log_event(
            "run_complete",
            json!({
                "stage": self.run.stage,
                "failed_stage": self.run.failed_stage,
                "error": self.run.last_error,
                "files": self.run.files_written(),
                "tokens": self.run.usage.total(),
            }),
        );
        self.services.progress.on_run_complete(&self.run);
        self.run
    }

    // ==================== Stages ====================

    async fn scaffold(&mut self) -> Result<BuildStage, OrchestratorError> {
        let before = self.run.usage;
        let request = match &self.run.kind {
            RunKind::Modify { request } => Some(request.clone()),
            _ => None,
        };

        let snapshot = self.snapshot().await?;
        let query = format!(
            "{} {}",
            self.blueprint.summary,
            request.as_deref().unwrap_or_default()
        );
        let context = self.retrieve(&query).await;
        let prompt = PipelinePromptTemplate::scaffold_prompt(
            &self.blueprint,
            request.as_deref(),
            &snapshot.file_tree(200),
            &context,
        );

        let plan = self
            .call_parsed(
                &AgentRole::Architect,
                BuildStage::Scaffolding,
                PipelinePromptTemplate::scaffold_system(),
                prompt,
                None,
                parse_scaffold_plan,
            )
            .await?;

        let mut briefs = match self.run.kind {
            RunKind::Build => self.reconcile_with_blueprint(plan.files),
            _ => plan.files,
        };
        let mut seen = Vec::new();
        briefs.retain(|b| {
            let fresh = !seen.contains(&b.path);
            seen.push(b.path.clone());
            fresh
        });

        self.targets = briefs.iter().map(|b| b.path.clone()).collect();
        self.briefs = briefs;
        self.run.record(
            StageRecord::new(
                BuildStage::Scaffolding,
                format!("Planned {} file(s): {}", self.targets.len(), self.targets.join(", ")),
            )
            .with_usage(usage_since(before, self.run.usage)),
        );
        Ok(BuildStage::Coding)
    }

    async fn code(&mut self) -> Result<BuildStage, OrchestratorError> {
        let before = self.run.usage;
        let targets = std::mem::take(&mut self.targets);
        let mut staged: Vec<FileWrite> = Vec::new();

        for path in &targets {
            self.check_cancelled()?;

            let brief = self.brief_for(path);
            let context = self.retrieve(&format!("{} {}", path, brief)).await;
            let existing = match self.generated_content(path) {
                Some(content) => Some(content.to_string()),
                None => self.services.workspace.read_file(path).await?,
            };
            let notes = self.notes.get(path).cloned();

            let cap = self.services.settings.max_context_file_bytes;
            let rolling: Vec<(String, String)> = self
                .generated
                .iter()
                .filter(|f| f.path != *path && !staged.iter().any(|s| s.path == f.path))
                .chain(staged.iter())
                .filter(|f| f.path != *path)
                .map(|f| (f.path.clone(), truncate(&f.content, cap)))
                .collect();
            let rolling_refs: Vec<GeneratedFile<'_>> = rolling
                .iter()
                .map(|(p, c)| (p.as_str(), c.as_str()))
                .collect();

            let prompt = PipelinePromptTemplate::coder_prompt(
                path,
                &brief,
                &self.blueprint,
                &rolling_refs,
                existing.as_deref(),
                notes.as_deref(),
                &context,
            );
            let content = self
                .call_parsed(
                    &AgentRole::Coder,
                    BuildStage::Coding,
                    PipelinePromptTemplate::coder_system(),
                    prompt,
                    None,
                    parse_file_content,
                )
                .await?;

            debug!(path = %path, bytes = content.len(), "File generated");
            self.services.progress.on_file_generated(path);
            staged.push(FileWrite::new(path.clone(), content));
        }

        // Nothing reaches the tree unless the whole stage completed
        self.check_cancelled()?;
        self.services.workspace.commit(&staged).await?;

        let paths: Vec<String> = staged.iter().map(|f| f.path.clone()).collect();
        for write in staged {
            match self.generated.iter_mut().find(|f| f.path == write.path) {
                Some(existing) => *existing = write,
                None => self.generated.push(write),
            }
        }
        info!(run_id = %self.run.id, files = ?paths, "Committed stage writes");
        self.services.progress.on_files_committed(&paths);
        self.log_event("files_committed", json!({ "files": &paths }));

        self.notes.clear();
        self.run.record(
            StageRecord::new(BuildStage::Coding, format!("Wrote {} file(s)", paths.len()))
                .with_files(paths)
                .with_usage(usage_since(before, self.run.usage)),
        );
        Ok(BuildStage::Reviewing)
    }

    async fn review(&mut self) -> Result<BuildStage, OrchestratorError> {
        let before = self.run.usage;
        let files = self.review_files().await?;
        let file_refs: Vec<GeneratedFile<'_>> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();

        let traceback = match &self.run.kind {
            RunKind::Fix { traceback } => Some(traceback.clone()),
            _ => None,
        };
        let git_diff = if traceback.is_some() {
            self.services
                .workspace
                .git_diff()
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "git diff unavailable");
                    None
                })
        } else {
            None
        };

        let query = traceback
            .clone()
            .unwrap_or_else(|| self.blueprint.summary.clone());
        let context = self.retrieve(&query).await;
        let prompt = PipelinePromptTemplate::review_prompt(
            &self.blueprint,
            &file_refs,
            traceback.as_deref(),
            git_diff.as_deref(),
            &context,
        );

        let mut verdict = self
            .call_parsed(
                &AgentRole::Reviewer,
                BuildStage::Reviewing,
                PipelinePromptTemplate::review_system(),
                prompt.clone(),
                None,
                parse_review_verdict,
            )
            .await?;
        for provider in self.stage_roles(BuildStage::Reviewing) {
            let extra = self
                .call_parsed(
                    &provider.role(),
                    BuildStage::Reviewing,
                    provider.system_prompt(),
                    prompt.clone(),
                    provider.temperature(),
                    parse_review_verdict,
                )
                .await?;
            verdict.merge(extra);
        }

        let mut flagged: Vec<String> = self.within_blueprint(
            verdict
                .flagged_files()
                .into_iter()
                .filter(|p| validate_relative_path(p).is_ok())
                .collect(),
        );
        let mut notes: HashMap<String, String> = flagged
            .iter()
            .filter_map(|p| verdict.comments_for(p).map(|c| (p.clone(), c)))
            .collect();

        // A fix run always acts on the files its traceback names, and that
        // first pass is not a review revision
        let mut fix_entry = false;
        if let Some(traceback) = &traceback
            && self.generated.is_empty()
            && flagged.is_empty()
            && !self.implicated.is_empty()
        {
            fix_entry = true;
            flagged = self.implicated.clone();
            for path in &flagged {
                notes.insert(path.clone(), format!("Fix the error:\n{}", traceback));
            }
        }

        let summary = if verdict.summary.is_empty() {
            if flagged.is_empty() { "Approved" } else { "Revisions requested" }.to_string()
        } else {
            verdict.summary.clone()
        };
        self.run.record(
            StageRecord::new(BuildStage::Reviewing, summary.clone())
                .with_usage(usage_since(before, self.run.usage)),
        );

        if verdict.approved && flagged.is_empty() {
            return Ok(BuildStage::Validating);
        }

        if !fix_entry && !self.run.try_begin_revision() {
            warn!(
                run_id = %self.run.id,
                max = self.run.limits.max_review_revisions,
                "Revision limit reached, proceeding to validation"
            );
            return Ok(BuildStage::Validating);
        }

        let targets = if flagged.is_empty() {
            files.into_iter().map(|(p, _)| p).collect()
        } else {
            flagged
        };
        for path in &targets {
            notes.entry(path.clone()).or_insert_with(|| summary.clone());
        }
        self.services.progress.on_revision(
            self.run.revision_count,
            self.run.limits.max_review_revisions,
            &targets,
        );
        self.targets = targets;
        self.notes = notes;
        Ok(BuildStage::Coding)
    }

    async fn validate(&mut self) -> Result<BuildStage, OrchestratorError> {
        let before = self.run.usage;
        let changed: Vec<String> = self.generated.iter().map(|f| f.path.clone()).collect();

        let mut reports: Vec<(String, bool, String)> = Vec::new();
        let mut tool_errors: Vec<String> = Vec::new();
        for tool in self.services.capabilities.tools() {
            self.check_cancelled()?;
            let invocation = ToolInvocation::new(self.services.workspace.root())
                .with_changed_files(changed.clone());
            let output = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                r = tool.run(invocation) => r,
            }
            .unwrap_or_else(|e| ToolOutput::failure(e.to_string()));

            info!(tool = tool.name(), success = output.success, "Tool check finished");
            self.services
                .progress
                .on_tool_result(tool.name(), output.success);
            if !output.success {
                tool_errors.push(format!("{}: {}", tool.name(), truncate(&output.output, 2000)));
            }
            reports.push((tool.name().to_string(), output.success, output.output));
        }

        let files = self.review_files().await?;
        let file_refs: Vec<GeneratedFile<'_>> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        let context = self.retrieve(&self.blueprint.summary.clone()).await;
        let prompt =
            PipelinePromptTemplate::validator_prompt(&self.blueprint, &file_refs, &reports, &context);

        let mut verdict = self
            .call_parsed(
                &AgentRole::Validator,
                BuildStage::Validating,
                PipelinePromptTemplate::validator_system(),
                prompt.clone(),
                None,
                parse_validation_verdict,
            )
            .await?;
        for provider in self.stage_roles(BuildStage::Validating) {
            let extra = self
                .call_parsed(
                    &provider.role(),
                    BuildStage::Validating,
                    provider.system_prompt(),
                    prompt.clone(),
                    provider.temperature(),
                    parse_validation_verdict,
                )
                .await?;
            verdict.passed = verdict.passed && extra.passed;
            verdict.errors.extend(extra.errors);
        }

        let passed = verdict.passed && tool_errors.is_empty();
        let mut errors = tool_errors;
        errors.extend(verdict.errors);
        if !passed && errors.is_empty() {
            errors.push("Validator reported a failure without details".to_string());
        }

        self.run.record(
            StageRecord::new(
                BuildStage::Validating,
                if passed {
                    "Validation passed".to_string()
                } else {
                    format!("Validation failed: {}", errors.join("; "))
                },
            )
            .with_usage(usage_since(before, self.run.usage)),
        );

        if passed {
            return Ok(BuildStage::Done);
        }

        if !self.run.try_begin_fix() {
            return Err(OrchestratorError::ValidationFailure { errors });
        }

        let known: Vec<String> = files.iter().map(|(p, _)| p.clone()).collect();
        let joined = errors.join("\n");
        let mut targets: Vec<String> = Vec::new();
        for frame in parse_traceback(&joined) {
            if let Some(path) = self.to_project_path(&frame.path)
                && known.contains(&path)
                && !targets.contains(&path)
            {
                targets.push(path);
            }
        }
        let mut targets = self.within_blueprint(targets);
        if targets.is_empty() {
            targets = self.within_blueprint(known);
        }
        warn!(
            run_id = %self.run.id,
            attempt = self.run.fix_attempts,
            max = self.run.limits.max_fix_attempts,
            files = ?targets,
            "Validation failed, attempting automatic fix"
        );
        self.notes = targets
            .iter()
            .map(|p| (p.clone(), format!("Validation errors:\n{}", joined)))
            .collect();
        self.targets = targets;
        Ok(BuildStage::Coding)
    }

    // ==================== Helpers ====================

    /// Invoke `role` and parse the reply, re-prompting once with a
    /// corrective instruction when parsing fails.
    async fn call_parsed<T>(
        &mut self,
        role: &AgentRole,
        stage: BuildStage,
        system: &str,
        prompt: String,
        temperature: Option<f32>,
        parse: fn(&str) -> Result<T, ParseFailure>,
    ) -> Result<T, OrchestratorError> {
        let reply = self
            .invoke(role, stage, system, prompt.clone(), temperature)
            .await?;
        match parse(&reply) {
            Ok(value) => Ok(value),
            Err(failure) => {
                warn!(role = %role, stage = %stage, error = %failure, "Unparseable response, re-prompting once");
                self.services.progress.on_parse_retry(stage, &failure);
                let corrective = PipelinePromptTemplate::corrective_prompt(&prompt, &failure);
                let reply = self
                    .invoke(role, stage, system, corrective, temperature)
                    .await?;
                parse(&reply).map_err(|failure| OrchestratorError::Parse { stage, failure })
            }
        }
    }

    async fn invoke(
        &mut self,
        role: &AgentRole,
        stage: BuildStage,
        system: &str,
        prompt: String,
        temperature: Option<f32>,
    ) -> Result<String, OrchestratorError> {
        self.check_cancelled()?;
        let binding = self.services.binding_for(role, stage)?;
        self.services
            .progress
            .on_model_call(role, &binding.primary.label());

        let mut request = ModelRequest::new(system, prompt);
        if let Some(t) = temperature {
            request = request.with_temperature(t);
        }
        if stage == BuildStage::Scaffolding && !self.images.is_empty() {
            request = request.with_images(self.images.clone());
        }
        let invocation = self
            .services
            .router
            .invoke_binding(role, &binding, request, &self.cancel)
            .await?;

        self.log_event(
            "model_response",
            json!({
                "role": role,
                "stage": stage,
                "backend": invocation.backend.label(),
                "fallback": invocation.used_fallback,
                "prompt_tokens": invocation.response.usage.prompt_tokens,
                "completion_tokens": invocation.response.usage.completion_tokens,
                "text": &invocation.response.text,
            }),
        );
        self.run.add_usage(invocation.response.usage)?;
        Ok(invocation.response.text)
    }

    fn check_cancelled(&self) -> Result<(), OrchestratorError> {
        if self.cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }
        Ok(())
    }

    async fn retrieve(&self, query: &str) -> Vec<RetrievedChunk> {
        self.services.retrieve(&self.project_id, query).await
    }

    async fn snapshot(&self) -> Result<ProjectSnapshot, OrchestratorError> {
        let mut snapshot = ProjectSnapshot::new(self.services.workspace.root());
        snapshot.files = self.services.workspace.list_files().await?;
        Ok(snapshot)
    }

    fn stage_roles(&self, stage: BuildStage) -> Vec<Arc<dyn AgentRoleProvider>> {
        self.plugin_roles
            .iter()
            .filter(|p| p.stage() == Some(stage))
            .cloned()
            .collect()
    }

    /// A Build run writes exactly the blueprint's files
    fn within_blueprint(&self, paths: Vec<String>) -> Vec<String> {
        if !matches!(self.run.kind, RunKind::Build) {
            return paths;
        }
        paths
            .into_iter()
            .filter(|path| {
                let known = self.blueprint.purpose_of(path).is_some();
                if !known {
                    warn!(path = %path, "Ignoring flagged file not in the approved blueprint");
                }
                known
            })
            .collect()
    }

    /// Keep the Architect's ordering but exactly the blueprint's files
    fn reconcile_with_blueprint(&self, planned: Vec<FileBrief>) -> Vec<FileBrief> {
        let mut briefs: Vec<FileBrief> = planned
            .into_iter()
            .filter(|b| {
                let known = self.blueprint.purpose_of(&b.path).is_some();
                if !known {
                    warn!(path = %b.path, "Dropping file not in the approved blueprint");
                }
                known
            })
            .collect();
        for entry in &self.blueprint.files {
            if !briefs.iter().any(|b| b.path == entry.path) {
                briefs.push(FileBrief {
                    path: entry.path.clone(),
                    brief: entry.purpose.clone(),
                });
            }
        }
        briefs
    }

    fn brief_for(&self, path: &str) -> String {
        self.briefs
            .iter()
            .find(|b| b.path == path)
            .map(|b| b.brief.clone())
            .or_else(|| self.blueprint.purpose_of(path).map(str::to_string))
            .unwrap_or_else(|| "Apply the requested changes to this file.".to_string())
    }

    fn generated_content(&self, path: &str) -> Option<&str> {
        self.generated
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.content.as_str())
    }

    /// Files under review: this run's output, else the implicated files
    /// (or the whole tree) of a Fix run.
    async fn review_files(&self) -> Result<Vec<(String, String)>, OrchestratorError> {
        if !self.generated.is_empty() {
            return Ok(self
                .generated
                .iter()
                .map(|f| (f.path.clone(), f.content.clone()))
                .collect());
        }
        let paths = if self.implicated.is_empty() {
            let mut all = self.services.workspace.list_files().await?;
            all.truncate(MAX_REVIEW_FILES);
            all
        } else {
            self.implicated.clone()
        };
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(content) = self.services.workspace.read_file(&path).await? {
                files.push((path, content));
            }
        }
        Ok(files)
    }

    /// Project files named in a traceback, innermost frame first
    async fn implicated_files(&self, traceback: &str) -> Vec<String> {
        let files = match self.services.workspace.list_files().await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Cannot list project files");
                return Vec::new();
            }
        };
        let mut implicated = Vec::new();
        for frame in parse_traceback(traceback) {
            if let Some(path) = self.to_project_path(&frame.path)
                && files.contains(&path)
                && !implicated.contains(&path)
            {
                implicated.push(path);
            }
        }
        implicated
    }

    /// Map a traceback path to a project-relative path, rejecting paths
    /// outside the root and inside virtualenvs.
    fn to_project_path(&self, raw: &str) -> Option<String> {
        if raw.contains("site-packages") || raw.contains("/.venv/") || raw.contains("/venv/") {
            return None;
        }
        let root = self
            .services
            .workspace
            .root()
            .to_string_lossy()
            .replace('\\', "/");
        let root = root.trim_end_matches('/');
        let relative = if raw.starts_with('/') || raw.chars().nth(1) == Some(':') {
            raw.strip_prefix(root)?.trim_start_matches('/')
        } else {
            raw.trim_start_matches("./")
        };
        validate_relative_path(relative).ok()?;
        Some(relative.to_string())
    }

    fn log_event(&self, event_type: &'static str, mut payload: serde_json::Value) {
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("run_id".to_string(), json!(self.run.id));
            obj.insert("project".to_string(), json!(self.project_id));
        }
        self.services
            .logger
            .log(ConversationEvent::new(event_type, payload));
    }
}

fn usage_since(before: TokenUsage, after: TokenUsage) -> TokenUsage {
    TokenUsage::new(
        after.prompt_tokens.saturating_sub(before.prompt_tokens),
        after.completion_tokens.saturating_sub(before.completion_tokens),
    )
}
