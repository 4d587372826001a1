//! IAM policy documents.
//!
//! Documents are rendered through [`Input`] so a principal can embed a value
//! only known to the engine (the caller's account id, for instance). A fully
//! literal document collapses to a plain JSON string in the manifest.

use crate::graph::Input;

/// Policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

/// Service principal of ECS tasks
pub const ECS_TASKS_SERVICE: &str = "ecs-tasks.amazonaws.com";

/// Managed policy granting image pulls and log delivery to ECS tasks
pub const ECS_TASK_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// Who a statement applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    /// An AWS account or role ARN
    Aws(Input),
    /// A service principal such as `ecs-tasks.amazonaws.com`
    Service(String),
}

impl Principal {
    /// The root user of an account
    pub fn account_root(account_id: Input) -> Self {
        Principal::Aws(Input::concat([
            Input::from("arn:aws:iam::"),
            account_id,
            Input::from(":root"),
        ]))
    }

    fn to_input(&self) -> Input {
        match self {
            Principal::Aws(arn) => Input::map([("AWS", arn.clone())]),
            Principal::Service(service) => Input::map([("Service", Input::from(service.as_str()))]),
        }
    }
}

/// A single policy statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub principal: Option<Principal>,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl Statement {
    /// An `Allow` statement for the given actions
    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sid: None,
            effect: Effect::Allow,
            principal: None,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: Vec::new(),
        }
    }

    /// `sts:AssumeRole` for a service principal
    pub fn assume_role(service: impl Into<String>) -> Self {
        Self::allow(["sts:AssumeRole"]).principal(Principal::Service(service.into()))
    }

    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    fn to_input(&self) -> Input {
        let mut entries: Vec<(&str, Input)> = Vec::new();
        if let Some(sid) = &self.sid {
            entries.push(("Sid", Input::from(sid.as_str())));
        }
        entries.push(("Effect", Input::from(self.effect.as_str())));
        if let Some(principal) = &self.principal {
            entries.push(("Principal", principal.to_input()));
        }
        entries.push(("Action", one_or_many(&self.actions)));
        if !self.resources.is_empty() {
            entries.push(("Resource", one_or_many(&self.resources)));
        }
        Input::map(entries)
    }
}

fn one_or_many(values: &[String]) -> Input {
    match values {
        [single] => Input::from(single.as_str()),
        many => Input::list(many.iter().map(|v| Input::from(v.as_str()))),
    }
}

/// An IAM policy document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Structured form of the document
    pub fn to_input(&self) -> Input {
        Input::map([
            ("Version", Input::from(POLICY_VERSION)),
            (
                "Statement",
                Input::list(self.statements.iter().map(Statement::to_input)),
            ),
        ])
    }

    /// JSON string form expected by policy properties
    pub fn to_json_input(&self) -> Input {
        Input::to_json(self.to_input())
    }
}
