//! Trigger evaluation: which repository events start a pipeline run.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::error::{CheckrunError, Result};

/// Repository event kinds a workflow can react to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Commits pushed to a branch.
    Push,
    /// A pull request opened or updated against a base branch.
    PullRequest,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CheckrunError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "push" => Ok(EventKind::Push),
            "pull_request" => Ok(EventKind::PullRequest),
            other => Err(CheckrunError::UnknownEventKind(other.to_string())),
        }
    }
}

/// Strip the `refs/heads/` prefix from a git ref, leaving other refs intact.
pub fn normalize_branch(reference: &str) -> &str {
    reference.strip_prefix("refs/heads/").unwrap_or(reference)
}

fn deserialize_branch<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let reference = String::deserialize(deserializer)?;
    Ok(normalize_branch(&reference).to_string())
}

/// A repository event offered to the trigger evaluator.
///
/// For pull requests `branch` is the target (base) branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: EventKind,
    #[serde(deserialize_with = "deserialize_branch")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl TriggerEvent {
    pub fn new(kind: EventKind, branch: impl AsRef<str>) -> Self {
        Self {
            kind,
            branch: normalize_branch(branch.as_ref()).to_string(),
            sha: None,
        }
    }

    pub fn push(branch: impl AsRef<str>) -> Self {
        Self::new(EventKind::Push, branch)
    }

    pub fn pull_request(branch: impl AsRef<str>) -> Self {
        Self::new(EventKind::PullRequest, branch)
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    /// Build an event from a forge webhook payload.
    ///
    /// Push payloads carry the branch in `ref` and the new head in `after`.
    /// Pull request payloads carry the target in `pull_request.base.ref`
    /// and the head commit in `pull_request.head.sha`.
    pub fn from_webhook(kind: EventKind, payload: &serde_json::Value) -> Result<Self> {
        let (reference, sha) = match kind {
            EventKind::Push => (payload["ref"].as_str(), payload["after"].as_str()),
            EventKind::PullRequest => {
                let pr = &payload["pull_request"];
                (pr["base"]["ref"].as_str(), pr["head"]["sha"].as_str())
            }
        };

        let reference = reference.ok_or_else(|| {
            CheckrunError::InvalidEvent(format!("{} payload has no target ref", kind))
        })?;
        if reference.trim().is_empty() {
            return Err(CheckrunError::InvalidEvent(format!(
                "{} payload has an empty target ref",
                kind
            )));
        }

        let mut event = Self::new(kind, reference);
        event.sha = sha.map(str::to_string);
        Ok(event)
    }
}

/// A branch filter: a literal name, or a glob where `*` matches within one
/// path segment and `**` matches across segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchFilter {
    pattern: String,
    glob: Option<Regex>,
}

impl BranchFilter {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let glob = if pattern.contains('*') {
            let source = glob_to_regex(&pattern);
            let re = Regex::new(&source).map_err(|source| CheckrunError::InvalidBranchFilter {
                pattern: pattern.clone(),
                source,
            })?;
            Some(re)
        } else {
            None
        };
        Ok(Self { pattern, glob })
    }

    /// A filter that only matches `name` exactly.
    pub fn literal(name: impl Into<String>) -> Self {
        Self {
            pattern: name.into(),
            glob: None,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, branch: &str) -> bool {
        match &self.glob {
            Some(re) => re.is_match(branch),
            None => self.pattern == branch,
        }
    }
}

impl PartialEq for BranchFilter {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for BranchFilter {}

impl TryFrom<String> for BranchFilter {
    type Error = CheckrunError;

    fn try_from(pattern: String) -> Result<Self> {
        BranchFilter::new(pattern)
    }
}

impl From<BranchFilter> for String {
    fn from(filter: BranchFilter) -> Self {
        filter.pattern
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                out.push_str(".*");
            } else {
                out.push_str("[^/]*");
            }
        } else {
            out.push_str(&regex::escape(&c.to_string()));
        }
    }
    out.push('$');
    out
}

/// Which events start a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerPolicy {
    #[serde(default = "default_events")]
    pub events: Vec<EventKind>,
    #[serde(default = "default_branches")]
    pub branches: Vec<BranchFilter>,
}

fn default_events() -> Vec<EventKind> {
    vec![EventKind::Push, EventKind::PullRequest]
}

fn default_branches() -> Vec<BranchFilter> {
    vec![BranchFilter::literal("master")]
}

impl Default for TriggerPolicy {
    /// Push and pull request events targeting `master`.
    fn default() -> Self {
        Self {
            events: default_events(),
            branches: default_branches(),
        }
    }
}

impl TriggerPolicy {
    /// Decide whether `event` should start a run.
    pub fn should_run(&self, event: &TriggerEvent) -> bool {
        self.events.contains(&event.kind) && self.branches.iter().any(|b| b.matches(&event.branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_policy_matches_master_push_and_pr() {
        let policy = TriggerPolicy::default();
        assert!(policy.should_run(&TriggerEvent::push("master")));
        assert!(policy.should_run(&TriggerEvent::pull_request("master")));
    }

    #[test]
    fn test_default_policy_rejects_other_branches() {
        let policy = TriggerPolicy::default();
        for branch in ["develop", "main", "Master", "master2", "feature/master", ""] {
            assert!(!policy.should_run(&TriggerEvent::push(branch)), "push {branch}");
            assert!(
                !policy.should_run(&TriggerEvent::pull_request(branch)),
                "pull_request {branch}"
            );
        }
    }

    #[test]
    fn test_full_ref_is_normalized() {
        let event = TriggerEvent::push("refs/heads/master");
        assert_eq!(event.branch, "master");
        assert!(TriggerPolicy::default().should_run(&event));

        let tag = TriggerEvent::push("refs/tags/master");
        assert!(!TriggerPolicy::default().should_run(&tag));
    }

    #[test]
    fn test_event_kind_not_listed_is_rejected() {
        let policy = TriggerPolicy {
            events: vec![EventKind::Push],
            branches: default_branches(),
        };
        assert!(policy.should_run(&TriggerEvent::push("master")));
        assert!(!policy.should_run(&TriggerEvent::pull_request("master")));
    }

    #[test]
    fn test_event_kind_parse() {
        assert_eq!("push".parse::<EventKind>().unwrap(), EventKind::Push);
        assert_eq!(
            "pull_request".parse::<EventKind>().unwrap(),
            EventKind::PullRequest
        );
        let err = "release".parse::<EventKind>().unwrap_err();
        assert!(matches!(err, CheckrunError::UnknownEventKind(k) if k == "release"));
    }

    #[test]
    fn test_glob_filters() {
        let single = BranchFilter::new("release/*").unwrap();
        assert!(single.matches("release/1.0"));
        assert!(!single.matches("release/1.0/hotfix"));
        assert!(!single.matches("release"));

        let deep = BranchFilter::new("release/**").unwrap();
        assert!(deep.matches("release/1.0/hotfix"));

        let dotted = BranchFilter::new("v1.*").unwrap();
        assert!(dotted.matches("v1.2"));
        assert!(!dotted.matches("v1x2"));
    }

    #[test]
    fn test_literal_filter_has_no_regex_semantics() {
        let filter = BranchFilter::new("ma.ter").unwrap();
        assert!(filter.matches("ma.ter"));
        assert!(!filter.matches("master"));
    }

    #[test]
    fn test_push_webhook_payload() {
        let payload = json!({ "ref": "refs/heads/master", "after": "deadbeef" });
        let event = TriggerEvent::from_webhook(EventKind::Push, &payload).unwrap();
        assert_eq!(event, TriggerEvent::push("master").with_sha("deadbeef"));
    }

    #[test]
    fn test_pull_request_webhook_uses_base_branch() {
        let payload = json!({
            "pull_request": {
                "base": { "ref": "master" },
                "head": { "ref": "feature/x", "sha": "cafe" }
            }
        });
        let event = TriggerEvent::from_webhook(EventKind::PullRequest, &payload).unwrap();
        assert_eq!(event.branch, "master");
        assert_eq!(event.sha.as_deref(), Some("cafe"));
    }

    #[test]
    fn test_webhook_without_ref_is_invalid() {
        let err = TriggerEvent::from_webhook(EventKind::Push, &json!({})).unwrap_err();
        assert!(matches!(err, CheckrunError::InvalidEvent(_)));
    }

    #[test]
    fn test_policy_yaml_defaults() {
        let policy: TriggerPolicy = serde_yaml::from_str("branches: [\"release/*\"]").unwrap();
        assert_eq!(policy.events, default_events());
        assert!(policy.should_run(&TriggerEvent::push("release/2.0")));
        assert!(!policy.should_run(&TriggerEvent::push("master")));
    }

    #[test]
    fn test_deserialized_event_branch_is_normalized() {
        let event: TriggerEvent = serde_json::from_value(json!({
            "kind": "push",
            "branch": "refs/heads/master",
        }))
        .unwrap();
        assert_eq!(event, TriggerEvent::push("master"));
        assert!(TriggerPolicy::default().should_run(&event));

        let event: TriggerEvent = serde_json::from_value(json!({
            "kind": "pull_request",
            "branch": "refs/tags/v1",
            "sha": "abc",
        }))
        .unwrap();
        assert_eq!(event.branch, "refs/tags/v1");
        assert_eq!(event.sha.as_deref(), Some("abc"));
    }
}
