use serde::{Deserialize, Serialize};
use uuid::Uuid;
use workforce_core::{Agent, Seniority, WorkerKind};

/// Declarative agent definition, as found in `[[agents]]` tables of
/// `workforce.toml`. `count` expands into that many identical agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub seniority: Seniority,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub kind: WorkerKind,
    #[serde(default = "default_one")]
    pub capacity: u32,
    #[serde(default = "default_one")]
    pub count: u32,
    #[serde(default)]
    pub instructions: Option<String>,
}

fn default_one() -> u32 {
    1
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, role: impl Into<String>, seniority: Seniority) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            seniority,
            capabilities: Vec::new(),
            kind: WorkerKind::default(),
            capacity: 1,
            count: 1,
            instructions: None,
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_kind(mut self, kind: WorkerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Expands the profile into `count` agents. Extra copies get a numeric
    /// suffix (`writer-2`, `writer-3`, ...).
    pub fn expand(&self, workspace_id: Uuid) -> Vec<Agent> {
        (1..=self.count.max(1))
            .map(|n| {
                let name = if n == 1 {
                    self.name.clone()
                } else {
                    format!("{}-{n}", self.name)
                };
                let mut agent = Agent::new(workspace_id, name, self.role.clone(), self.seniority)
                    .with_capabilities(self.capabilities.iter().cloned())
                    .with_kind(self.kind)
                    .with_capacity(self.capacity);
                let instructions = self
                    .instructions
                    .clone()
                    .or_else(|| role_prompt(&self.role).map(str::to_string));
                if let Some(instructions) = instructions {
                    agent = agent.with_instructions(instructions);
                }
                agent
            })
            .collect()
    }
}

/// A small general-purpose team able to run every task the template
/// decomposer produces. All agents share `kind`.
pub fn default_team(kind: WorkerKind) -> Vec<AgentProfile> {
    vec![
        AgentProfile::new("researcher", "researcher", Seniority::Junior)
            .with_capabilities(["research"])
            .with_kind(kind),
        AgentProfile::new("junior-writer", "writer", Seniority::Junior)
            .with_capabilities(["writing"])
            .with_kind(kind),
        AgentProfile::new("senior-writer", "writer", Seniority::Senior)
            .with_capabilities(["writing", "editing"])
            .with_kind(kind),
        AgentProfile::new("reviewer", "reviewer", Seniority::Senior)
            .with_capabilities(["review", "editing"])
            .with_kind(kind),
        AgentProfile::new("lead", "lead", Seniority::Expert)
            .with_capabilities(["research", "writing", "review", "editing", "synthesis", "analysis"])
            .with_kind(kind),
    ]
}

/// Built-in instructions for well-known roles.
pub fn role_prompt(role: &str) -> Option<&'static str> {
    match role {
        "researcher" => Some(RESEARCHER_PROMPT),
        "writer" => Some(WRITER_PROMPT),
        "reviewer" => Some(REVIEWER_PROMPT),
        "lead" => Some(LEAD_PROMPT),
        _ => None,
    }
}

const RESEARCHER_PROMPT: &str = "\
You are a Researcher agent in a business workforce. \
Your job is to gather the facts, figures, and references a task needs \
before anyone starts writing.

Rules:
1. Stay within the scope of the task description.
2. Cite where each fact comes from when you know it.
3. Flag anything you could not verify instead of guessing.
4. Output a concise, structured brief that a writer can use directly.
";

const WRITER_PROMPT: &str = "\
You are a Writer agent in a business workforce. \
Your job is to turn research and upstream outputs into clear, finished copy.

Rules:
1. Follow the expected output format exactly (headings, JSON keys, length).
2. Use the upstream outputs you are given; do not invent facts.
3. Never leave placeholders such as TODO, TBD, or lorem ipsum.
4. If earlier attempts were rejected, address every listed reason.
";

const REVIEWER_PROMPT: &str = "\
You are a Reviewer agent in a business workforce. \
Your job is to check upstream work for accuracy, tone, and completeness, \
and to produce a corrected final version.

Rules:
1. Compare the work against the task description and expected output.
2. Fix problems directly rather than only listing them.
3. Call out claims that carry legal, financial, or privacy risk.
4. Keep the author's structure unless it prevents the goal.
";

const LEAD_PROMPT: &str = "\
You are the Lead agent in a business workforce. \
You take the hardest tasks: synthesis across many inputs, diagnosing why \
earlier attempts failed, and repairing plans.

Rules:
1. Read every upstream output before answering.
2. When diagnosing a failure, state the root cause and the missing input.
3. Synthesize into one coherent result, removing duplication.
4. Prefer a smaller correct answer over a larger speculative one.
";
