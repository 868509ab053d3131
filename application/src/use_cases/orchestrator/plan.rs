//! Plan-mode drafting
//!
//! Each user message goes to the Architect together with the current draft.
//! A reply that carries a blueprint fragment is merged into the draft; a
//! reply without one is treated as a general question and answered by the
//! Chat role instead.

use super::Orchestrator;
use super::types::{OrchestratorError, SubmitOutcome};
use avakin_domain::{
    AgentRole, Blueprint, ConversationTurn, ImageAttachment, PipelinePromptTemplate, PlanState,
    ProjectId, TurnOrigin, parse_blueprint,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ports::conversation_logger::ConversationEvent;
use crate::ports::model_transport::ModelRequest;

struct DraftReply {
    text: String,
    fragment: Option<Blueprint>,
    role: AgentRole,
}

impl Orchestrator {
    pub(super) async fn draft(
        &self,
        message: &str,
        images: &[ImageAttachment],
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome, OrchestratorError> {
        let (draft, transcript, project_id) = {
            let mut project = self.project.lock().await;
            let origin = TurnOrigin::Plan(project.plan_state);
            let transcript = project
                .history
                .transcript(self.services.settings.history_turns);
            let mut turn = ConversationTurn::user(message, origin);
            if let Some(image) = images.first() {
                turn = turn.with_image(image.name.clone());
            }
            project.history.append(turn);
            project.plan_state = PlanState::Drafting;
            (project.blueprint.clone(), transcript, project.id.clone())
        };
        self.services.progress.on_plan_state(PlanState::Drafting);
        self.services.logger.log(ConversationEvent::new(
            "user_turn",
            json!({
                "project": &project_id,
                "mode": "plan",
                "content": message,
                "image": images.first().map(|i| &i.name),
            }),
        ));

        let result = self
            .draft_reply(message, images, draft.as_ref(), &transcript, &project_id, cancel)
            .await;

        let mut project = self.project.lock().await;
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                project.plan_state = if draft.as_ref().is_some_and(Blueprint::is_valid) {
                    PlanState::AwaitingApproval
                } else {
                    PlanState::Listening
                };
                self.services.progress.on_plan_state(project.plan_state);
                warn!(error = %e, "Plan-mode reply failed");
                return Err(e);
            }
        };

        let blueprint_updated = reply.fragment.is_some();
        if let Some(fragment) = reply.fragment {
            project
                .blueprint
                .get_or_insert_with(Blueprint::default)
                .merge(fragment);
        }
        let valid = project.blueprint.as_ref().is_some_and(Blueprint::is_valid);
        project.plan_state = if valid {
            PlanState::AwaitingApproval
        } else {
            PlanState::Listening
        };
        project.history.append(ConversationTurn::agent(
            reply.role.clone(),
            reply.text.clone(),
            TurnOrigin::Plan(PlanState::Drafting),
        ));
        info!(
            role = %reply.role,
            blueprint_updated,
            plan_state = %project.plan_state,
            "Plan-mode reply"
        );

        self.services.progress.on_plan_state(project.plan_state);
        self.services.logger.log(ConversationEvent::new(
            "agent_turn",
            json!({
                "project": &project_id,
                "mode": "plan",
                "role": &reply.role,
                "content": &reply.text,
                "blueprint_updated": blueprint_updated,
            }),
        ));

        Ok(SubmitOutcome::Reply {
            text: reply.text,
            plan_state: project.plan_state,
            blueprint_updated,
        })
    }

    async fn draft_reply(
        &self,
        message: &str,
        images: &[ImageAttachment],
        draft: Option<&Blueprint>,
        transcript: &str,
        project_id: &ProjectId,
        cancel: &CancellationToken,
    ) -> Result<DraftReply, OrchestratorError> {
        let context = self.services.retrieve(project_id, message).await;

        let architect = ModelRequest::new(
            PipelinePromptTemplate::plan_system(),
            PipelinePromptTemplate::plan_prompt(message, draft, transcript, &context),
        )
        .with_images(images.to_vec());
        self.services.progress.on_model_call(
            &AgentRole::Architect,
            &self.services.router.resolve(&AgentRole::Architect)?.primary.label(),
        );
        let reply = self
            .services
            .router
            .invoke_role(&AgentRole::Architect, architect, cancel)
            .await?;

        if let Some(fragment) = parse_blueprint(&reply.response.text) {
            return Ok(DraftReply {
                text: reply.response.text,
                fragment: Some(fragment),
                role: AgentRole::Architect,
            });
        }

        debug!("No blueprint fragment in Architect reply, answering with Chat");
        let chat = ModelRequest::new(
            PipelinePromptTemplate::chat_system(),
            PipelinePromptTemplate::chat_prompt(message, transcript, &context),
        )
        .with_images(images.to_vec());
        // Without a Chat binding the Architect's backend answers
        let binding = self
            .services
            .router
            .resolve(&AgentRole::Chat)
            .or_else(|_| self.services.router.resolve(&AgentRole::Architect))?;
        self.services
            .progress
            .on_model_call(&AgentRole::Chat, &binding.primary.label());
        let reply = self
            .services
            .router
            .invoke_binding(&AgentRole::Chat, &binding, chat, cancel)
            .await?;
        Ok(DraftReply {
            text: reply.response.text,
            fragment: None,
            role: AgentRole::Chat,
        })
    }
}
