use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use workforce_core::{
    Artifact, Deliverable, Goal, TransformationStatus, WorkforceError, WorkforceResult,
};

/// One approved artifact feeding a deliverable.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub task_id: Uuid,
    pub task_name: String,
    pub priority: i32,
    /// Creation order of the task in the graph.
    pub sequence: u64,
    pub artifact: Artifact,
    pub quality_score: f64,
}

/// Turns ordered contributions into deliverable content.
pub trait Transformer: Send + Sync {
    fn transform(&self, goal: &Goal, parts: &[Contribution]) -> WorkforceResult<String>;
}

/// Joins contributions as markdown sections under the goal as title.
#[derive(Debug, Clone, Default)]
pub struct MarkdownTransformer;

impl Transformer for MarkdownTransformer {
    fn transform(&self, goal: &Goal, parts: &[Contribution]) -> WorkforceResult<String> {
        let mut out = format!("# {}\n", goal.description.lines().next().unwrap_or_default());
        let mut sections = 0;
        for part in parts {
            let body = part.artifact.content.trim();
            if body.is_empty() {
                continue;
            }
            out.push_str(&format!("\n## {}\n\n{}\n", part.task_name, body));
            sections += 1;
        }
        if sections == 0 {
            return Err(WorkforceError::Orchestrator(
                "Nothing to assemble: every contribution is empty".into(),
            ));
        }
        Ok(out)
    }
}

/// Aggregates a goal's approved artifacts into versioned deliverables.
pub struct DeliverablePipeline {
    transformer: Arc<dyn Transformer>,
    threshold: f64,
}

impl DeliverablePipeline {
    pub fn new(transformer: Arc<dyn Transformer>, threshold: f64) -> Self {
        Self {
            transformer,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Builds the next version, or `None` when `previous` was built from the
    /// same artifacts. Contributions are ordered by creation sequence; scores
    /// are averaged with weight `max(priority, 0) + 1`.
    pub fn assemble(
        &self,
        goal: &Goal,
        mut parts: Vec<Contribution>,
        previous: Option<&Deliverable>,
    ) -> Option<Deliverable> {
        parts.sort_by_key(|p| p.sequence);
        let artifact_ids: Vec<Uuid> = parts.iter().map(|p| p.artifact.id).collect();
        if previous.is_some_and(|prev| prev.artifact_ids == artifact_ids) {
            return None;
        }

        let version = previous.map_or(1, |prev| prev.version + 1);
        let mut deliverable = Deliverable::draft(goal.workspace_id, goal.id, version);
        deliverable.supersedes = previous.map(|prev| prev.id);
        deliverable.artifact_ids = artifact_ids;

        let total_weight: f64 = parts.iter().map(weight).sum();
        if total_weight > 0.0 {
            deliverable.quality_score =
                parts.iter().map(|p| weight(p) * p.quality_score).sum::<f64>() / total_weight;
            deliverable.business_value = parts
                .iter()
                .map(|p| weight(p) * p.artifact.business_value)
                .sum::<f64>()
                / total_weight;
        }

        match self.transformer.transform(goal, &parts) {
            Ok(content) => {
                deliverable.content = content;
                deliverable.transformation = TransformationStatus::Transformed;
            }
            Err(e) => {
                warn!(goal_id = %goal.id, version, error = %e, "Deliverable transformation failed");
                deliverable.transformation = TransformationStatus::Failed;
            }
        }
        deliverable.finalize(self.threshold);
        info!(
            goal_id = %goal.id,
            version,
            status = %deliverable.status,
            quality = deliverable.quality_score,
            "Deliverable assembled"
        );
        Some(deliverable)
    }
}

fn weight(part: &Contribution) -> f64 {
    f64::from(part.priority.max(0)) + 1.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use workforce_core::{ArtifactDraft, DeliverableStatus, GoalConstraints, Task};

    fn goal() -> Goal {
        Goal::new(Uuid::nil(), "Launch kit", &GoalConstraints::default(), 0.7)
    }

    fn part(name: &str, sequence: u64, priority: i32, content: &str, score: f64) -> Contribution {
        let task = Task::new(Uuid::nil(), name);
        Contribution {
            task_id: task.id,
            task_name: name.into(),
            priority,
            sequence,
            artifact: Artifact::from_draft(
                ArtifactDraft::text(content).with_business_value(0.8),
                &task,
                Uuid::nil(),
                Uuid::nil(),
                None,
            ),
            quality_score: score,
        }
    }

    fn pipeline() -> DeliverablePipeline {
        DeliverablePipeline::new(Arc::new(MarkdownTransformer), 0.7)
    }

    #[test]
    fn test_assembles_in_sequence_order_with_weights() {
        let parts = vec![
            part("Review", 2, 0, "final copy", 0.9),
            part("Research", 0, 2, "facts", 0.6),
        ];
        let d = pipeline().assemble(&goal(), parts, None).unwrap();
        assert_eq!(d.version, 1);
        let research = d.content.find("## Research").unwrap();
        let review = d.content.find("## Review").unwrap();
        assert!(research < review);
        // (3 * 0.6 + 1 * 0.9) / 4
        assert!((d.quality_score - 0.675).abs() < 1e-9);
        assert!((d.business_value - 0.8).abs() < 1e-9);
        assert_eq!(d.transformation, TransformationStatus::Transformed);
        assert_eq!(d.status, DeliverableStatus::Failed);
    }

    #[test]
    fn test_completed_when_quality_meets_threshold() {
        let d = pipeline()
            .assemble(&goal(), vec![part("Draft", 0, 0, "copy", 0.8)], None)
            .unwrap();
        assert_eq!(d.status, DeliverableStatus::Completed);
        assert!(d.content.starts_with("# Launch kit"));
    }

    #[test]
    fn test_unchanged_artifacts_are_a_noop_and_changes_bump_version() {
        let first = part("Draft", 0, 0, "copy", 0.8);
        let d1 = pipeline()
            .assemble(&goal(), vec![first.clone()], None)
            .unwrap();
        assert!(pipeline()
            .assemble(&goal(), vec![first.clone()], Some(&d1))
            .is_none());

        let mut revised = first;
        revised.artifact.id = Uuid::new_v4();
        let d2 = pipeline()
            .assemble(&goal(), vec![revised], Some(&d1))
            .unwrap();
        assert_eq!(d2.version, 2);
        assert_eq!(d2.supersedes, Some(d1.id));
    }

    #[test]
    fn test_transform_failure_fails_deliverable() {
        let d = pipeline()
            .assemble(&goal(), vec![part("Draft", 0, 0, "   ", 1.0)], None)
            .unwrap();
        assert_eq!(d.transformation, TransformationStatus::Failed);
        assert_eq!(d.status, DeliverableStatus::Failed);
    }
}
