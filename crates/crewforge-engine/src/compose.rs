//! Request composition.
//!
//! Builds the generator conversation for one stage attempt from the
//! worker's narrative and objective, the stage instructions, the context
//! snapshot, and, on refinement attempts, the accumulated validation
//! feedback. Composition is deterministic: identical inputs produce
//! byte-identical requests, because snapshot entries are rendered in the
//! stage's declared dependency order and every section uses a fixed
//! layout.

use crewforge_backend::Message;
use crewforge_context::ContextSnapshot;
use crewforge_pipeline::{StageSpec, WorkerSpec};

/// Build the conversation for one stage attempt.
///
/// `feedback` carries validation-failure descriptions from earlier
/// attempts of the same stage; it is empty on the first attempt.
#[must_use]
pub fn compose_request(
    worker: &WorkerSpec,
    stage: &StageSpec,
    snapshot: &ContextSnapshot,
    feedback: &[String],
) -> Vec<Message> {
    vec![
        Message::system(system_prompt(worker)),
        Message::user(user_prompt(stage, snapshot, feedback)),
    ]
}

fn system_prompt(worker: &WorkerSpec) -> String {
    let mut prompt = String::new();
    if !worker.narrative.is_empty() {
        prompt.push_str(worker.narrative.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str("Your objective: ");
    prompt.push_str(worker.objective.trim());

    if !worker.permitted_ops.is_empty() {
        let ops: Vec<&str> = worker.permitted_ops.iter().map(String::as_str).collect();
        prompt.push_str("\n\nPermitted operations: ");
        prompt.push_str(&ops.join(", "));
        prompt.push('.');
    }

    prompt
}

fn user_prompt(stage: &StageSpec, snapshot: &ContextSnapshot, feedback: &[String]) -> String {
    let mut prompt = String::new();

    prompt.push_str(stage.instructions.trim());

    if !stage.outputs.is_empty() {
        prompt.push_str("\n\n# Expected outputs\n\n");
        prompt.push_str(
            "Produce each file as a fenced block opened with ```file:<path> and closed \
             with ```. Emit every file completely; do not truncate.\n",
        );
        for artifact in &stage.outputs.artifacts {
            prompt.push_str("- ");
            prompt.push_str(artifact.path.as_str());
            if !artifact.required {
                prompt.push_str(" (optional)");
            }
            prompt.push('\n');
        }
    }

    if !snapshot.is_empty() {
        prompt.push_str("\n# Context from completed stages\n");
        for (stage_id, output) in snapshot.iter() {
            prompt.push_str("\n## ");
            prompt.push_str(stage_id.as_str());
            prompt.push('\n');
            if !output.summary.is_empty() {
                prompt.push('\n');
                prompt.push_str(output.summary.trim());
                prompt.push('\n');
            }
            for artifact in &output.artifacts {
                prompt.push_str("\n```file:");
                prompt.push_str(artifact.path.as_str());
                prompt.push('\n');
                prompt.push_str(&artifact.content);
                if !artifact.content.ends_with('\n') {
                    prompt.push('\n');
                }
                prompt.push_str("```\n");
            }
        }
    }

    if !feedback.is_empty() {
        prompt.push_str("\n# Previous attempt feedback\n\n");
        prompt.push_str(
            "Your previous response did not satisfy the expected outputs. Fix the \
             following and produce the complete set of files again:\n",
        );
        for issue in feedback {
            prompt.push_str("- ");
            prompt.push_str(issue);
            prompt.push('\n');
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use crewforge_backend::Role;
    use crewforge_context::ContextStore;
    use crewforge_pipeline::{Artifact, ArtifactSpec, OutputDescriptor, StageOutput};
    use crewforge_utils::types::StageId;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn worker() -> WorkerSpec {
        WorkerSpec {
            name: "backend-developer".to_string(),
            objective: "Implement the backend".to_string(),
            narrative: "You are a Backend Developer.".to_string(),
            permitted_ops: BTreeSet::from(["write_file".to_string()]),
            max_iterations: 3,
            call_timeout: Duration::from_secs(300),
            model: None,
        }
    }

    fn stage() -> StageSpec {
        StageSpec {
            id: StageId::new("backend").unwrap(),
            instructions: "Implement the API.".to_string(),
            worker: "backend-developer".to_string(),
            deps: vec![StageId::new("architecture").unwrap()],
            outputs: OutputDescriptor {
                artifacts: vec![
                    ArtifactSpec {
                        path: Utf8PathBuf::from("backend/main.py"),
                        required: true,
                    },
                    ArtifactSpec {
                        path: Utf8PathBuf::from("backend/notes.md"),
                        required: false,
                    },
                ],
            },
            optional: false,
        }
    }

    fn snapshot() -> ContextSnapshot {
        let mut store = ContextStore::new();
        store
            .record(
                &StageId::new("architecture").unwrap(),
                StageOutput {
                    artifacts: vec![Artifact {
                        path: Utf8PathBuf::from("docs/architecture.md"),
                        content: "# Architecture\n".to_string(),
                    }],
                    summary: "Designed the system.".to_string(),
                },
            )
            .unwrap();
        store
            .snapshot_for(
                &StageId::new("backend").unwrap(),
                &[StageId::new("architecture").unwrap()],
            )
            .unwrap()
    }

    #[test]
    fn system_message_carries_narrative_objective_and_ops() {
        let messages = compose_request(&worker(), &stage(), &ContextSnapshot::empty(), &[]);

        assert_eq!(messages[0].role, Role::System);
        let system = &messages[0].content;
        assert!(system.contains("You are a Backend Developer."));
        assert!(system.contains("Your objective: Implement the backend"));
        assert!(system.contains("Permitted operations: write_file."));
    }

    #[test]
    fn user_message_lists_expected_outputs() {
        let messages = compose_request(&worker(), &stage(), &ContextSnapshot::empty(), &[]);

        assert_eq!(messages[1].role, Role::User);
        let user = &messages[1].content;
        assert!(user.contains("Implement the API."));
        assert!(user.contains("- backend/main.py\n"));
        assert!(user.contains("- backend/notes.md (optional)\n"));
        assert!(user.contains("```file:<path>"));
    }

    #[test]
    fn context_section_embeds_upstream_artifacts() {
        let messages = compose_request(&worker(), &stage(), &snapshot(), &[]);

        let user = &messages[1].content;
        assert!(user.contains("## architecture"));
        assert!(user.contains("Designed the system."));
        assert!(user.contains("```file:docs/architecture.md"));
        assert!(user.contains("# Architecture"));
    }

    #[test]
    fn feedback_section_appears_on_refinement() {
        let feedback = vec!["required artifact 'backend/main.py' missing".to_string()];
        let messages = compose_request(&worker(), &stage(), &ContextSnapshot::empty(), &feedback);

        let user = &messages[1].content;
        assert!(user.contains("# Previous attempt feedback"));
        assert!(user.contains("- required artifact 'backend/main.py' missing"));
    }

    #[test]
    fn composition_is_deterministic() {
        let snapshot = snapshot();
        let first = compose_request(&worker(), &stage(), &snapshot, &[]);
        let second = compose_request(&worker(), &stage(), &snapshot, &[]);
        assert_eq!(first, second);
    }
}
