//! Progress reporting for pipeline runs

use avakin_application::PipelineProgressNotifier;
use avakin_domain::{
    AgentRole, BuildStage, ParseFailure, PipelineRun, PlanState, RunId, RunKind,
};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Reports progress with a spinner per stage
pub struct ProgressReporter {
    multi: MultiProgress,
    stage_bar: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            stage_bar: Mutex::new(None),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn set_message(&self, message: String) {
        if let Ok(bar) = self.stage_bar.lock()
            && let Some(pb) = bar.as_ref()
        {
            pb.set_message(message);
        }
    }

    fn println(&self, line: String) {
        let _ = self.multi.println(line);
    }

    fn finish_stage(&self, message: String) {
        if let Ok(mut bar) = self.stage_bar.lock()
            && let Some(pb) = bar.take()
        {
            pb.finish_with_message(message);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineProgressNotifier for ProgressReporter {
    fn on_plan_state(&self, state: PlanState) {
        match state {
            PlanState::Drafting => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.set_prefix("Architect");
                pb.set_message("thinking...");
                pb.enable_steady_tick(Duration::from_millis(120));
                if let Ok(mut bar) = self.stage_bar.lock() {
                    *bar = Some(pb);
                }
            }
            _ => {
                if let Ok(mut bar) = self.stage_bar.lock()
                    && let Some(pb) = bar.take()
                {
                    pb.finish_and_clear();
                }
            }
        }
    }

    fn on_run_start(&self, run_id: &RunId, kind: &RunKind) {
        let label = match kind {
            RunKind::Build => "build",
            RunKind::Modify { .. } => "modification",
            RunKind::Fix { .. } => "review & fix",
        };
        self.println(format!(
            "{} Starting {} run {}",
            "->".cyan(),
            label.bold(),
            run_id.as_str().dimmed()
        ));
    }

    fn on_stage_change(&self, stage: BuildStage) {
        self.finish_stage(format!("{}", "done".green()));
        if stage.is_terminal() {
            return;
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.set_prefix(stage.display_name().to_string());
        pb.set_message("starting...");
        pb.enable_steady_tick(Duration::from_millis(120));
        if let Ok(mut bar) = self.stage_bar.lock() {
            *bar = Some(pb);
        }
    }

    fn on_model_call(&self, role: &AgentRole, backend: &str) {
        self.set_message(format!("{} via {}", role.display_name(), backend));
    }

    fn on_retry(&self, backend: &str, attempt: usize, max_retries: usize, error: &str) {
        self.println(format!(
            "  {} {} failed ({}), retry {}/{}",
            "!".yellow(),
            backend,
            error,
            attempt,
            max_retries
        ));
    }

    fn on_fallback(&self, role: &AgentRole, from: &str, to: &str) {
        self.println(format!(
            "  {} {} unavailable on {}, using {}",
            "!".yellow(),
            role.display_name(),
            from,
            to
        ));
    }

    fn on_parse_retry(&self, stage: BuildStage, failure: &ParseFailure) {
        self.println(format!(
            "  {} {} response unusable ({}), asking again",
            "!".yellow(),
            stage.display_name(),
            failure
        ));
    }

    fn on_file_generated(&self, path: &str) {
        self.set_message(format!("generated {}", path));
    }

    fn on_files_committed(&self, paths: &[String]) {
        for path in paths {
            self.println(format!("  {} {}", "+".green(), path));
        }
    }

    fn on_revision(&self, attempt: usize, max: usize, files: &[String]) {
        self.println(format!(
            "  {} revision {}/{}: {}",
            "~".yellow(),
            attempt,
            max,
            files.join(", ")
        ));
    }

    fn on_tool_result(&self, tool: &str, success: bool) {
        let mark = if success { "v".green() } else { "x".red() };
        self.println(format!("  {} {}", mark, tool));
    }

    fn on_run_complete(&self, run: &PipelineRun) {
        let message = if run.stage == BuildStage::Done {
            "complete".green().to_string()
        } else {
            "failed".red().to_string()
        };
        self.finish_stage(message);
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl PipelineProgressNotifier for SimpleProgress {
    fn on_run_start(&self, run_id: &RunId, _kind: &RunKind) {
        println!("{} run {}", "->".cyan(), run_id.as_str());
    }

    fn on_stage_change(&self, stage: BuildStage) {
        println!("{} {}", "->".cyan(), stage.display_name().bold());
    }

    fn on_retry(&self, backend: &str, attempt: usize, max_retries: usize, error: &str) {
        println!(
            "  {} {} ({}), retry {}/{}",
            "!".yellow(),
            backend,
            error,
            attempt,
            max_retries
        );
    }

    fn on_files_committed(&self, paths: &[String]) {
        for path in paths {
            println!("  {} {}", "+".green(), path);
        }
    }

    fn on_tool_result(&self, tool: &str, success: bool) {
        if success {
            println!("  {} {}", "v".green(), tool);
        } else {
            println!("  {} {} (failed)", "x".red(), tool);
        }
    }
}
