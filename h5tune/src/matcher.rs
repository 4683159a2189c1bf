//! Rule selection.
//!
//! [`RuleMatcher::find`] walks the rules tagged with the requested parameter
//! in document order and returns the first one whose scope covers the target.
//! An unscoped rule covers everything, so it acts as a fallback only for
//! targets that no earlier scoped rule claimed. Finding nothing is a normal
//! outcome: the parameter keeps its library default.
//!
//! How a rule's `FileName` is compared with the target path is a single,
//! explicit [`FileMatchPolicy`] shared by every parameter kind.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::document::{Rule, RuleDocument};

/// How a rule's file scope is compared with a target path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMatchPolicy {
    /// The scope equals the last `/`-separated segment of the path.
    #[default]
    ExactBasename,
    /// The path ends with the scope.
    Suffix,
    /// The scope occurs anywhere in the path.
    Substring,
}

impl FileMatchPolicy {
    /// Whether a rule scoped to `scope` applies to the file at `path`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use h5tune::matcher::FileMatchPolicy;
    ///
    /// assert!(FileMatchPolicy::ExactBasename.matches("A.h5", "/scratch/run/A.h5"));
    /// assert!(!FileMatchPolicy::ExactBasename.matches("A.h5", "/scratch/prefixA.h5"));
    /// assert!(FileMatchPolicy::Suffix.matches("A.h5", "/scratch/prefixA.h5"));
    /// assert!(FileMatchPolicy::Substring.matches("A", "/scratch/prefixA.h5"));
    /// ```
    pub fn matches(self, scope: &str, path: &str) -> bool {
        match self {
            Self::ExactBasename => basename(path) == scope,
            Self::Suffix => path.ends_with(scope),
            Self::Substring => path.contains(scope),
        }
    }
}

impl fmt::Display for FileMatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExactBasename => "basename",
            Self::Suffix => "suffix",
            Self::Substring => "substring",
        })
    }
}

impl FromStr for FileMatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basename" => Ok(Self::ExactBasename),
            "suffix" => Ok(Self::Suffix),
            "substring" => Ok(Self::Substring),
            _ => Err(format!(
                "unknown file match policy '{s}' (expected basename, suffix or substring)"
            )),
        }
    }
}

/// Final path segment of `path`.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// What a rule is being looked up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRequest<'a> {
    /// Parameter name (element tag).
    pub parameter: &'a str,
    /// Target file path.
    pub file: &'a str,
    /// Target dataset name, for dataset-creation parameters.
    pub variable: Option<&'a str>,
}

impl<'a> MatchRequest<'a> {
    /// A file-level request.
    pub fn file(parameter: &'a str, file: &'a str) -> Self {
        Self {
            parameter,
            file,
            variable: None,
        }
    }

    /// A dataset-level request.
    pub fn dataset(parameter: &'a str, file: &'a str, variable: &'a str) -> Self {
        Self {
            parameter,
            file,
            variable: Some(variable),
        }
    }
}

/// First-match-wins rule selection under one file policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleMatcher {
    policy: FileMatchPolicy,
}

impl RuleMatcher {
    /// Creates a matcher using `policy` for file scopes.
    pub fn new(policy: FileMatchPolicy) -> Self {
        Self { policy }
    }

    /// Returns the first rule in document order that applies to `request`.
    ///
    /// A rule applies when its file scope (if any) matches the target file
    /// under the policy and its variable scope (if any) equals the target
    /// dataset. A variable-scoped rule never applies to a request without a
    /// dataset.
    pub fn find<'d>(&self, document: &'d RuleDocument, request: &MatchRequest<'_>) -> Option<&'d Rule> {
        document
            .rules_named(request.parameter)
            .find(|rule| self.applies(rule, request))
    }

    fn applies(&self, rule: &Rule, request: &MatchRequest<'_>) -> bool {
        let file_ok = rule
            .file_name
            .as_deref()
            .is_none_or(|scope| self.policy.matches(scope, request.file));

        let variable_ok = match (rule.variable_name.as_deref(), request.variable) {
            (None, _) => true,
            (Some(scope), Some(variable)) => scope == variable,
            (Some(_), None) => false,
        };

        file_ok && variable_ok
    }
}
