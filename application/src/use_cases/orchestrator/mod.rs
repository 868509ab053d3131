//! Orchestrator use case
//!
//! Drives one project through Plan mode and Build mode:
//!
//! ```text
//! Plan:  Listening -> Drafting -> AwaitingApproval --approve--> Build run
//!            ^            |
//!            +------------+  (no valid draft yet)
//!
//! Build: Scaffolding -> Coding -> Reviewing -> Validating -> Done
//!                         ^          |             |
//!                         +----------+-------------+
//! ```
//!
//! At most one run (or Plan-mode draft) is active per project; a second
//! request while one is active fails with [`OrchestratorError::PipelineBusy`].
//! Runs execute on their own task and are cancelled through the
//! [`CancellationToken`] held in [`PipelineHandle`].

mod build;
mod plan;
pub mod types;

pub use types::{OrchestratorError, PipelineHandle, PipelineSettings, SubmitOutcome};

use crate::ports::capability_registry::{CapabilityRegistryPort, NoCapabilities};
use crate::ports::conversation_logger::{
    ConversationEvent, ConversationLogger, NoConversationLogger,
};
use crate::ports::knowledge_store::KnowledgeStorePort;
use crate::ports::pipeline_progress::{NoPipelineProgress, PipelineProgressNotifier};
use crate::ports::workspace::WorkspacePort;
use crate::use_cases::model_router::{ModelRouter, RouterError};
use avakin_domain::{
    AgentRole, Blueprint, BlueprintError, BuildStage, ConversationTurn, ImageAttachment,
    InteractionMode, PipelineRun, PlanState, Project, ProjectId, QueryScope, RetrievedChunk, RoleBinding, RunId,
    RunKind, TurnOrigin,
};
use build::BuildPipeline;
use serde_json::json;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Collaborators shared by Plan mode and every Build run
#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) router: Arc<ModelRouter>,
    pub(crate) knowledge: Arc<dyn KnowledgeStorePort>,
    pub(crate) workspace: Arc<dyn WorkspacePort>,
    pub(crate) capabilities: Arc<dyn CapabilityRegistryPort>,
    pub(crate) progress: Arc<dyn PipelineProgressNotifier>,
    pub(crate) logger: Arc<dyn ConversationLogger>,
    pub(crate) settings: PipelineSettings,
}

impl Services {
    /// Binding for `role`. Plugin roles without their own binding share
    /// the binding of the built-in role of the stage they run in.
    pub(crate) fn binding_for(
        &self,
        role: &AgentRole,
        stage: BuildStage,
    ) -> Result<RoleBinding, RouterError> {
        match self.router.resolve(role) {
            Ok(binding) => Ok(binding),
            Err(e) if role.is_custom() => match stage.role() {
                Some(base) => self.router.resolve(&base),
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Project + global context for `query`. Retrieval problems degrade to
    /// an empty context rather than failing the stage.
    pub(crate) async fn retrieve(&self, project: &ProjectId, query: &str) -> Vec<RetrievedChunk> {
        let k = self.settings.context_chunks;
        if k == 0 || query.trim().is_empty() {
            return Vec::new();
        }
        let mut scope = QueryScope::project(project.clone());
        if !self.settings.include_global {
            scope = scope.without_global();
        }
        match self.knowledge.query(query, &scope, k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Knowledge query failed, continuing without context");
                Vec::new()
            }
        }
    }
}

/// The run or draft currently holding the project
struct ActiveSlot {
    run_id: RunId,
    cancel: CancellationToken,
}

/// Frees the active slot when dropped
struct SlotGuard {
    active: Arc<StdMutex<Option<ActiveSlot>>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }
}

pub struct Orchestrator {
    services: Services,
    project: Arc<Mutex<Project>>,
    active: Arc<StdMutex<Option<ActiveSlot>>>,
    last_run: Arc<StdMutex<Option<PipelineRun>>>,
}

impl Orchestrator {
    pub fn new(
        project: Project,
        router: Arc<ModelRouter>,
        knowledge: Arc<dyn KnowledgeStorePort>,
        workspace: Arc<dyn WorkspacePort>,
    ) -> Self {
        Self {
            services: Services {
                router,
                knowledge,
                workspace,
                capabilities: Arc::new(NoCapabilities::default()),
                progress: Arc::new(NoPipelineProgress),
                logger: Arc::new(NoConversationLogger),
                settings: PipelineSettings::default(),
            },
            project: Arc::new(Mutex::new(project)),
            active: Arc::new(StdMutex::new(None)),
            last_run: Arc::new(StdMutex::new(None)),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityRegistryPort>) -> Self {
        self.services.capabilities = capabilities;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn PipelineProgressNotifier>) -> Self {
        self.services.progress = progress;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.services.logger = logger;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.services.settings = settings;
        self
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.services.router
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.services.settings
    }

    /// Snapshot of the project state
    pub async fn project(&self) -> Project {
        self.project.lock().await.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// The most recently finished run
    pub fn last_run(&self) -> Option<PipelineRun> {
        self.last_run.lock().ok().and_then(|r| r.clone())
    }

    /// Restore a blueprint approved in an earlier session, switching the
    /// project to Build mode. Returns whether one was found.
    pub async fn resume(&self) -> Result<bool, OrchestratorError> {
        let Some(blueprint) = self.services.workspace.load_blueprint().await? else {
            return Ok(false);
        };
        blueprint.validate()?;
        let mut project = self.project.lock().await;
        project.blueprint = Some(blueprint);
        project.mode = InteractionMode::Build;
        project.plan_state = PlanState::Listening;
        info!(project = %project.id, "Resumed with approved blueprint");
        Ok(true)
    }

    /// Handle a user message.
    ///
    /// In Plan mode the reply is drafted inline. In Build mode the message
    /// starts a modification run on the approved blueprint.
    pub async fn submit(&self, message: &str) -> Result<SubmitOutcome, OrchestratorError> {
        self.submit_with_image(message, None).await
    }

    /// [`submit`](Self::submit) with an image attached to the message.
    ///
    /// The image goes to the Architect (and Chat) in Plan mode and to the
    /// Scaffolding Architect of a Build-mode modification run; the turn
    /// records only the image's name.
    pub async fn submit_with_image(
        &self,
        message: &str,
        image: Option<ImageAttachment>,
    ) -> Result<SubmitOutcome, OrchestratorError> {
        let mode = self.project.lock().await.mode;
        let images: Vec<ImageAttachment> = image.into_iter().collect();
        match mode {
            InteractionMode::Plan => {
                let run_id = RunId::new(format!("plan-{}", Uuid::new_v4()));
                let (guard, cancel) = self.reserve(run_id)?;
                let outcome = self.draft(message, &images, &cancel).await;
                drop(guard);
                outcome
            }
            InteractionMode::Build => {
                let kind = RunKind::Modify {
                    request: message.to_string(),
                };
                self.start_run(kind, message, images)
                    .await
                    .map(SubmitOutcome::RunStarted)
            }
        }
    }

    /// Approve the current draft, persist it and start the Build run
    pub async fn approve_blueprint(&self) -> Result<PipelineHandle, OrchestratorError> {
        let run_id = RunId::new(Uuid::new_v4().to_string());
        let (guard, cancel) = self.reserve(run_id.clone())?;

        let (blueprint, project_id) = {
            let mut project = self.project.lock().await;
            if project.mode != InteractionMode::Plan
                || project.plan_state != PlanState::AwaitingApproval
            {
                return Err(OrchestratorError::NotAwaitingApproval(project.plan_state));
            }
            let blueprint = project.blueprint.clone().ok_or(BlueprintError::Missing)?;
            blueprint.validate()?;
            self.services.workspace.save_blueprint(&blueprint).await?;

            project.mode = InteractionMode::Build;
            project.plan_state = PlanState::Listening;
            (blueprint, project.id.clone())
        };

        info!(project = %project_id, files = blueprint.files.len(), "Blueprint approved");
        self.services.progress.on_plan_state(PlanState::Listening);
        self.services.logger.log(ConversationEvent::new(
            "blueprint_approved",
            json!({ "project": &project_id, "blueprint": &blueprint }),
        ));

        Ok(self.spawn_run(
            guard,
            cancel,
            run_id,
            RunKind::Build,
            blueprint,
            project_id,
            Vec::new(),
        ))
    }

    /// Start a Review & Fix run for a traceback from the user's program
    pub async fn request_fix(&self, traceback: &str) -> Result<PipelineHandle, OrchestratorError> {
        let kind = RunKind::Fix {
            traceback: traceback.to_string(),
        };
        self.start_run(kind, traceback, Vec::new()).await
    }

    /// Cancel the active run or draft. Returns whether anything was active.
    pub fn cancel(&self) -> bool {
        let Ok(active) = self.active.lock() else {
            return false;
        };
        match active.as_ref() {
            Some(slot) => {
                info!(run_id = %slot.run_id, "Cancellation requested");
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn reserve(&self, run_id: RunId) -> Result<(SlotGuard, CancellationToken), OrchestratorError> {
        let mut active = self
            .active
            .lock()
            .map_err(|e| OrchestratorError::TaskFailed(e.to_string()))?;
        if let Some(slot) = active.as_ref() {
            return Err(OrchestratorError::PipelineBusy(slot.run_id.clone()));
        }
        let cancel = CancellationToken::new();
        *active = Some(ActiveSlot {
            run_id,
            cancel: cancel.clone(),
        });
        Ok((
            SlotGuard {
                active: Arc::clone(&self.active),
            },
            cancel,
        ))
    }

    async fn start_run(
        &self,
        kind: RunKind,
        message: &str,
        images: Vec<ImageAttachment>,
    ) -> Result<PipelineHandle, OrchestratorError> {
        let run_id = RunId::new(Uuid::new_v4().to_string());
        let (guard, cancel) = self.reserve(run_id.clone())?;

        let (blueprint, project_id) = {
            let mut project = self.project.lock().await;
            let blueprint = match project.blueprint.clone() {
                Some(blueprint) => blueprint,
                None if matches!(kind, RunKind::Fix { .. }) => self.existing_tree_blueprint().await?,
                None => return Err(BlueprintError::Missing.into()),
            };
            let mut turn = ConversationTurn::user(message, TurnOrigin::Build(kind.initial_stage()));
            if let Some(image) = images.first() {
                turn = turn.with_image(image.name.clone());
            }
            project.history.append(turn);
            (blueprint, project.id.clone())
        };

        self.services.logger.log(ConversationEvent::new(
            "user_turn",
            json!({
                "project": &project_id,
                "mode": "build",
                "content": message,
                "image": images.first().map(|i| &i.name),
            }),
        ));
        Ok(self.spawn_run(guard, cancel, run_id, kind, blueprint, project_id, images))
    }

    /// Stand-in blueprint for fixing a project that was never planned here
    async fn existing_tree_blueprint(&self) -> Result<Blueprint, OrchestratorError> {
        let mut blueprint = Blueprint::new("Existing project");
        for path in self.services.workspace.list_files().await? {
            blueprint = blueprint.with_file(path, "Existing file");
        }
        Ok(blueprint)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_run(
        &self,
        guard: SlotGuard,
        cancel: CancellationToken,
        run_id: RunId,
        kind: RunKind,
        blueprint: Blueprint,
        project_id: ProjectId,
        images: Vec<ImageAttachment>,
    ) -> PipelineHandle {
        // Bindings and plugin roles stay fixed until the run ends
        let router_guard = self.services.router.begin_run();
        let (plugin_roles, lease) = self
            .services
            .capabilities
            .lease_stage_roles(&AgentRole::builtin());

        let run = PipelineRun::new(run_id.clone(), kind, self.services.settings.limits.clone());
        let pipeline = BuildPipeline::new(
            self.services.clone(),
            project_id,
            blueprint,
            run,
            cancel.clone(),
            plugin_roles,
        )
        .with_images(images);
        let project = Arc::clone(&self.project);
        let last_run = Arc::clone(&self.last_run);

        let join = tokio::spawn(async move {
            let _slot = guard;
            let _router = router_guard;
            let _lease = lease;

            let run = pipeline.execute().await;
            project.lock().await.history.append(ConversationTurn::agent(
                AgentRole::Architect,
                run_summary(&run),
                TurnOrigin::Build(run.stage),
            ));
            if let Ok(mut last) = last_run.lock() {
                *last = Some(run.clone());
            }
            run
        });

        PipelineHandle::new(run_id, cancel, join)
    }
}

fn run_summary(run: &PipelineRun) -> String {
    if run.cancelled {
        return "Run cancelled. The project is unchanged since the last completed stage."
            .to_string();
    }
    match run.stage {
        BuildStage::Done => {
            let files = run.files_written();
            format!("Run complete. Wrote {} file(s): {}", files.len(), files.join(", "))
        }
        _ => format!(
            "Run failed during {}: {}",
            run.failed_stage
                .map(|s| s.display_name().to_string())
                .unwrap_or_else(|| "unknown stage".to_string()),
            run.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}
