//! Prompt templates for the agent pipeline

use crate::blueprint::Blueprint;
use crate::knowledge::entities::RetrievedChunk;
use crate::knowledge::scope::Scope;
use crate::response::ParseFailure;

/// A file produced earlier in the run, used as rolling Coder context
pub type GeneratedFile<'a> = (&'a str, &'a str);

const JSON_ONLY_RULE: &str = r#"**Output rule:** respond with a single valid JSON object and nothing else.
No prose or markdown before or after it."#;

/// Templates for generating prompts at each pipeline stage
pub struct PipelinePromptTemplate;

impl PipelinePromptTemplate {
    // ==================== Plan mode ====================

    pub fn plan_system() -> &'static str {
        r#"You are the Architect of a software project, talking with the user to plan it.
Ask clarifying questions when the request is ambiguous. Whenever the conversation
settles something about the design, include a blueprint fragment as a fenced JSON
block with any of these keys:

```json
{
  "summary": "one-paragraph description of the application",
  "features": ["feature", "..."],
  "files": [{"path": "main.py", "purpose": "Entry point"}],
  "constraints": ["language, libraries or limits the user asked for"]
}
```

File paths are relative to the project root. The entry point should be `main.py`
unless the user asks otherwise. Plan a `requirements.txt` when dependencies are needed."#
    }

    pub fn plan_prompt(
        message: &str,
        draft: Option<&Blueprint>,
        transcript: &str,
        context: &[RetrievedChunk],
    ) -> String {
        let mut prompt = String::new();
        if !transcript.is_empty() {
            prompt.push_str(&format!("## Conversation so far\n{}\n\n", transcript));
        }
        if let Some(draft) = draft {
            prompt.push_str(&format!("## Current blueprint draft\n{}\n\n", draft.to_markdown()));
        }
        prompt.push_str(&Self::context_section(context));
        prompt.push_str(&format!("## User message\n{}", message));
        prompt
    }

    pub fn chat_system() -> &'static str {
        r#"You are a helpful assistant inside a development environment.
Answer the user's question concisely, using the project context when it is relevant."#
    }

    pub fn chat_prompt(message: &str, transcript: &str, context: &[RetrievedChunk]) -> String {
        let mut prompt = String::new();
        if !transcript.is_empty() {
            prompt.push_str(&format!("## Conversation so far\n{}\n\n", transcript));
        }
        prompt.push_str(&Self::context_section(context));
        prompt.push_str(&format!("## Question\n{}", message));
        prompt
    }

    // ==================== Build mode ====================

    pub fn scaffold_system() -> &'static str {
        r#"You are the Architect. Turn the approved blueprint into an ordered generation plan.
Order files so that each file comes after the files it imports. For every file write a
short brief telling the Coder exactly what to implement. Use exact existing paths when
modifying files."#
    }

    pub fn scaffold_prompt(
        blueprint: &Blueprint,
        request: Option<&str>,
        file_tree: &str,
        context: &[RetrievedChunk],
    ) -> String {
        let mut prompt = format!("## Blueprint\n{}\n\n", blueprint.to_markdown());
        if let Some(request) = request {
            prompt.push_str(&format!(
                "## Modification request\n{}\nPlan only the files that must change or be created.\n\n",
                request
            ));
        }
        if !file_tree.is_empty() {
            prompt.push_str(&format!("## Existing files\n{}\n\n", file_tree));
        }
        prompt.push_str(&Self::context_section(context));
        prompt.push_str(&format!(
            r#"{}

```json
{{"files": [{{"path": "utils.py", "brief": "..."}}, {{"path": "main.py", "brief": "..."}}]}}
```"#,
            JSON_ONLY_RULE
        ));
        prompt
    }

    pub fn coder_system() -> &'static str {
        r#"You are a professional developer. Write the complete content of exactly one file.
Only import from the standard library, declared dependencies, or project files whose code
you have been shown. No placeholders or stubs. Respond with the raw file content only,
without explanations or markdown fences."#
    }

    #[allow(clippy::too_many_arguments)]
    pub fn coder_prompt(
        path: &str,
        brief: &str,
        blueprint: &Blueprint,
        generated: &[GeneratedFile<'_>],
        existing: Option<&str>,
        review_notes: Option<&str>,
        context: &[RetrievedChunk],
    ) -> String {
        let mut prompt = format!(
            "## Assigned file\n`{}`\n\n## Brief\n{}\n\n## File plan\n",
            path, brief
        );
        for entry in &blueprint.files {
            prompt.push_str(&format!("- `{}`: {}\n", entry.path, entry.purpose));
        }
        prompt.push('\n');
        if !blueprint.constraints.is_empty() {
            prompt.push_str("## Constraints\n");
            for constraint in &blueprint.constraints {
                prompt.push_str(&format!("- {}\n", constraint));
            }
            prompt.push('\n');
        }
        for (other, content) in generated {
            prompt.push_str(&format!("## Generated `{}`\n```\n{}\n```\n\n", other, content));
        }
        if let Some(existing) = existing {
            prompt.push_str(&format!(
                "## Current content of `{}`\n```\n{}\n```\n\n",
                path, existing
            ));
        }
        if let Some(notes) = review_notes {
            prompt.push_str(&format!("## Issues to fix in this file\n{}\n\n", notes));
        }
        prompt.push_str(&Self::context_section(context));
        prompt.push_str(&format!("Write the complete content of `{}` now.", path));
        prompt
    }

    pub fn review_system() -> &'static str {
        r#"You are a meticulous code Reviewer. Check the files against the blueprint for bugs,
missing functionality, broken imports between files and placeholder code. When an error
traceback is supplied, find its root cause. Only request changes that are necessary."#
    }

    pub fn review_prompt(
        blueprint: &Blueprint,
        files: &[GeneratedFile<'_>],
        traceback: Option<&str>,
        git_diff: Option<&str>,
        context: &[RetrievedChunk],
    ) -> String {
        let mut prompt = format!("## Blueprint\n{}\n\n", blueprint.to_markdown());
        if let Some(traceback) = traceback {
            prompt.push_str(&format!("## Error traceback\n```\n{}\n```\n\n", traceback));
        }
        if let Some(diff) = git_diff.filter(|d| !d.trim().is_empty()) {
            prompt.push_str(&format!("## Recent changes (git diff)\n```diff\n{}\n```\n\n", diff));
        }
        for (path, content) in files {
            prompt.push_str(&format!("## `{}`\n```\n{}\n```\n\n", path, content));
        }
        prompt.push_str(&Self::context_section(context));
        prompt.push_str(&format!(
            r#"{}

```json
{{"approved": false, "summary": "...", "comments": [{{"path": "main.py", "comment": "what to change"}}]}}
```
Set "approved" to true with no comments when nothing needs to change."#,
            JSON_ONLY_RULE
        ));
        prompt
    }

    pub fn validator_system() -> &'static str {
        r#"You are the Validator. Decide whether the project is complete and runnable: every
planned file exists, imports resolve, and tool checks passed. Report concrete errors."#
    }

    pub fn validator_prompt(
        blueprint: &Blueprint,
        files: &[GeneratedFile<'_>],
        tool_reports: &[(String, bool, String)],
        context: &[RetrievedChunk],
    ) -> String {
        let mut prompt = format!("## Blueprint\n{}\n\n", blueprint.to_markdown());
        for (path, content) in files {
            prompt.push_str(&format!("## `{}`\n```\n{}\n```\n\n", path, content));
        }
        if !tool_reports.is_empty() {
            prompt.push_str("## Tool checks\n");
            for (name, success, output) in tool_reports {
                let status = if *success { "passed" } else { "FAILED" };
                prompt.push_str(&format!("### {} ({})\n```\n{}\n```\n", name, status, output));
            }
            prompt.push('\n');
        }
        prompt.push_str(&Self::context_section(context));
        prompt.push_str(&format!(
            r#"{}

```json
{{"passed": true, "errors": []}}
```"#,
            JSON_ONLY_RULE
        ));
        prompt
    }

    // ==================== Shared ====================

    /// Re-prompt after a parse failure
    pub fn corrective_prompt(original: &str, failure: &ParseFailure) -> String {
        format!("{}\n\n---\n{}", original, failure.corrective_instruction())
    }

    /// Retrieved knowledge, project chunks labelled separately from global
    pub fn context_section(context: &[RetrievedChunk]) -> String {
        if context.is_empty() {
            return String::new();
        }
        let mut section = String::from("## Relevant knowledge\n");
        for chunk in context {
            let origin = match &chunk.scope {
                Scope::Project(_) => "project",
                Scope::Global => "global",
            };
            section.push_str(&format!(
                "### {} ({})\n{}\n\n",
                chunk.document_id, origin, chunk.text
            ));
        }
        section
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint() -> Blueprint {
        Blueprint::new("Todo CLI")
            .with_file("utils.py", "helpers")
            .with_file("main.py", "entry")
            .with_constraint("stdlib only")
    }

    #[test]
    fn test_coder_prompt_includes_rolling_context() {
        let prompt = PipelinePromptTemplate::coder_prompt(
            "main.py",
            "wire everything",
            &blueprint(),
            &[("utils.py", "def add(a, b):\n    return a + b")],
            None,
            Some("handle empty input"),
            &[],
        );
        assert!(prompt.contains("## Assigned file\n`main.py`"));
        assert!(prompt.contains("## Generated `utils.py`"));
        assert!(prompt.contains("def add(a, b)"));
        assert!(prompt.contains("handle empty input"));
        assert!(prompt.contains("- stdlib only"));
    }

    #[test]
    fn test_review_prompt_injects_traceback_and_diff() {
        let prompt = PipelinePromptTemplate::review_prompt(
            &blueprint(),
            &[("main.py", "print(x)")],
            Some("NameError: name 'x' is not defined"),
            Some("+print(x)"),
            &[],
        );
        assert!(prompt.contains("## Error traceback"));
        assert!(prompt.contains("```diff\n+print(x)"));
    }

    #[test]
    fn test_context_section_labels_scope() {
        let chunks = vec![RetrievedChunk {
            document_id: "docs/api.md".to_string(),
            text: "GET /items".to_string(),
            scope: Scope::Global,
            score: 0.9,
            seq: 1,
        }];
        let section = PipelinePromptTemplate::context_section(&chunks);
        assert!(section.contains("### docs/api.md (global)"));
        assert!(PipelinePromptTemplate::context_section(&[]).is_empty());
    }

    #[test]
    fn test_corrective_prompt_appends_instruction() {
        let prompt = PipelinePromptTemplate::corrective_prompt(
            "original",
            &ParseFailure::NoJson {
                expected: "scaffold plan",
            },
        );
        assert!(prompt.starts_with("original"));
        assert!(prompt.contains("scaffold plan"));
    }
}
