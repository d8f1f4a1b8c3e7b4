// src/planner.rs
//! Turn ranked priority scores into a bounded action plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PlannerConfig;
use crate::scoring::{PriorityScoreResult, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Items scoring below this are left out.
    pub min_score: f64,
    /// Ignore `min_score` and plan everything.
    pub include_low_priority: bool,
    pub max_items: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self::from(&PlannerConfig::default())
    }
}

impl From<&PlannerConfig> for PlanOptions {
    fn from(cfg: &PlannerConfig) -> Self {
        Self {
            min_score: cfg.min_score,
            include_low_priority: false,
            max_items: cfg.max_items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    BugFix,
    FeatureDevelopment,
    UxImprovement,
    Integration,
}

impl ActionType {
    pub fn from_requirement_category(c: Option<&str>) -> Self {
        match c.map(|c| c.trim().to_ascii_lowercase()).as_deref() {
            Some("bug_fix" | "bug") => ActionType::BugFix,
            Some("feature_request" | "feature") => ActionType::FeatureDevelopment,
            Some("integration") => ActionType::Integration,
            _ => ActionType::UxImprovement,
        }
    }

    pub fn owner_team(&self) -> &'static str {
        match self {
            ActionType::BugFix | ActionType::FeatureDevelopment => "engineering",
            ActionType::UxImprovement => "design",
            ActionType::Integration => "product",
        }
    }

    fn acceptance_criteria(&self) -> &'static [&'static str] {
        match self {
            ActionType::BugFix => &[
                "the issue no longer reproduces",
                "related functionality works as before",
                "regression tests pass",
            ],
            ActionType::FeatureDevelopment => &[
                "the feature is implemented as requested",
                "the interface is easy to use",
                "user acceptance testing passes",
            ],
            _ => &[
                "the improvement is measurable",
                "user feedback on the area turns positive",
                "the tracked metrics improve",
            ],
        }
    }

    fn success_metrics(&self) -> &'static [&'static str] {
        match self {
            ActionType::BugFix => &[
                "no new reports of this issue for two releases",
                "crash-free sessions back at baseline",
            ],
            ActionType::FeatureDevelopment => &[
                "adoption of the new feature among active users",
                "fewer requests for the same capability",
            ],
            ActionType::UxImprovement => &[
                "task completion time in the affected flow",
                "share of negative feedback about the flow",
            ],
            ActionType::Integration => &[
                "number of accounts using the integration",
                "integration-related support tickets",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub action_type: ActionType,
    pub priority: Tier,
    pub owner_team: String,
    pub estimated_effort: String,
    pub timeline: String,
    pub acceptance_criteria: Vec<String>,
    pub success_metrics: Vec<String>,
    pub business_justification: String,
    pub technical_details: String,
    pub risk_assessment: String,
    pub mitigation_plan: String,
    pub score: f64,
    pub related_feedback_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub plan_id: String,
    pub title: String,
    pub summary: String,
    pub total_actions: usize,
    pub p0_actions: usize,
    pub p1_actions: usize,
    pub p2_actions: usize,
    pub p3_actions: usize,
    pub estimated_timeline: String,
    pub total_effort_estimate: String,
    pub action_items: Vec<ActionItem>,
    pub created_at: DateTime<Utc>,
}

impl ActionPlan {
    pub fn count(&self, tier: Tier) -> usize {
        match tier {
            Tier::P0 => self.p0_actions,
            Tier::P1 => self.p1_actions,
            Tier::P2 => self.p2_actions,
            Tier::P3 => self.p3_actions,
        }
    }
}

const DEFAULT_EFFORT: &str = "1-2 weeks";

#[derive(Debug, Clone, Default)]
pub struct ActionPlanner {
    defaults: PlanOptions,
}

impl ActionPlanner {
    pub fn new(cfg: &PlannerConfig) -> Self {
        Self {
            defaults: PlanOptions::from(cfg),
        }
    }

    pub fn defaults(&self) -> PlanOptions {
        self.defaults
    }

    /// Plan with the configured options.
    pub fn plan(&self, scores: &[PriorityScoreResult]) -> ActionPlan {
        self.plan_with(scores, &self.defaults)
    }

    pub fn plan_with(&self, scores: &[PriorityScoreResult], opts: &PlanOptions) -> ActionPlan {
        let now = Utc::now();
        let mut items: Vec<ActionItem> = scores
            .iter()
            .filter(|s| opts.include_low_priority || s.overall >= opts.min_score)
            .map(|s| action_item(s, now))
            .collect();
        // stable: equal tiers keep the incoming (score) order
        items.sort_by_key(|i| i.priority);
        items.truncate(opts.max_items);

        let n = items.len();
        let per_tier = |t: Tier| items.iter().filter(|i| i.priority == t).count();
        let (p0, p1, p2, p3) = (
            per_tier(Tier::P0),
            per_tier(Tier::P1),
            per_tier(Tier::P2),
            per_tier(Tier::P3),
        );

        let (summary, timeline, effort) = if n == 0 {
            (
                "No feedback reached the planning threshold; nothing to schedule yet".to_string(),
                "to be decided".to_string(),
                "to be assessed".to_string(),
            )
        } else {
            let timeline = if p0 > 0 {
                "start immediately, finish P0 items within 1-2 weeks"
            } else {
                "schedule by quarter"
            };
            (
                format!("{n} action items, {p0} at P0, focused on the most pressing feedback"),
                timeline.to_string(),
                format!("{}-{} person-weeks", 2 * n, 5 * n),
            )
        };

        info!(
            target: "planner",
            candidates = scores.len(),
            actions = n,
            p0,
            "action plan built"
        );

        ActionPlan {
            plan_id: format!("plan-{}", uuid::Uuid::new_v4().simple()),
            title: format!("Feedback-driven improvement plan - {}", now.format("%Y-%m")),
            summary,
            total_actions: n,
            p0_actions: p0,
            p1_actions: p1,
            p2_actions: p2,
            p3_actions: p3,
            estimated_timeline: timeline,
            total_effort_estimate: effort,
            action_items: items,
            created_at: now,
        }
    }
}

fn action_item(s: &PriorityScoreResult, now: DateTime<Utc>) -> ActionItem {
    let c = &s.context;
    let kind = ActionType::from_requirement_category(
        c.requirement_category.as_deref().or(c.category.as_deref()),
    );
    let title = match kind {
        ActionType::BugFix => format!(
            "Fix issues related to {}",
            c.root_cause.as_deref().unwrap_or("the reported failure")
        ),
        ActionType::FeatureDevelopment => format!(
            "Build {}",
            c.solution_suggestion.as_deref().unwrap_or("the requested feature")
        ),
        ActionType::UxImprovement => format!(
            "Improve the {} experience",
            c.category.as_deref().unwrap_or("user")
        ),
        ActionType::Integration => "Handle integration feedback".to_string(),
    };
    let description = format!(
        "Based on user feedback: \"{}\"\nImpact scope: {}\nUrgency: {:.0}/100",
        c.excerpt,
        c.impact_scope.as_deref().unwrap_or("individual"),
        s.dimensions.urgency
    );
    let strings = |xs: &[&str]| xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();

    ActionItem {
        id: format!("action-{}", uuid::Uuid::new_v4().simple()),
        title,
        description,
        action_type: kind,
        priority: s.tier,
        owner_team: kind.owner_team().to_string(),
        estimated_effort: c
            .implementation_effort
            .clone()
            .unwrap_or_else(|| DEFAULT_EFFORT.to_string()),
        timeline: s.suggested_timeline.clone(),
        acceptance_criteria: strings(kind.acceptance_criteria()),
        success_metrics: strings(kind.success_metrics()),
        business_justification: format!(
            "Business value: {}; strategic alignment: {}",
            c.business_value.as_deref().unwrap_or("efficiency"),
            c.strategic_alignment.as_deref().unwrap_or("important")
        ),
        technical_details: format!(
            "Technical complexity: {}",
            c.technical_complexity.as_deref().unwrap_or("medium")
        ),
        risk_assessment: if s.risk_factor > 0.7 {
            "risk level: high".to_string()
        } else {
            "risk level: medium".to_string()
        },
        mitigation_plan: "review progress regularly and raise blockers early".to_string(),
        score: s.overall,
        related_feedback_ids: if c.record_id.is_empty() {
            Vec::new()
        } else {
            vec![c.record_id.clone()]
        },
        created_at: now,
    }
}
