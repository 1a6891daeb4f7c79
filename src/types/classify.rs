//! Repository classification used to pick a specialised overview template

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{Result, WikiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifyType {
    Applications,
    Frameworks,
    Libraries,
    DevelopmentTools,
    #[serde(rename = "CLITools")]
    CliTools,
    DevOpsConfiguration,
    Documentation,
}

impl ClassifyType {
    pub const ALL: [ClassifyType; 7] = [
        ClassifyType::Applications,
        ClassifyType::Frameworks,
        ClassifyType::Libraries,
        ClassifyType::DevelopmentTools,
        ClassifyType::CliTools,
        ClassifyType::DevOpsConfiguration,
        ClassifyType::Documentation,
    ];

    /// Name as it appears in template names (`Overview{name}`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifyType::Applications => "Applications",
            ClassifyType::Frameworks => "Frameworks",
            ClassifyType::Libraries => "Libraries",
            ClassifyType::DevelopmentTools => "DevelopmentTools",
            ClassifyType::CliTools => "CLITools",
            ClassifyType::DevOpsConfiguration => "DevOpsConfiguration",
            ClassifyType::Documentation => "Documentation",
        }
    }

    /// Short reader-facing description of the category
    pub fn description(&self) -> &'static str {
        match self {
            ClassifyType::Applications => "an end-user application or service",
            ClassifyType::Frameworks => "a framework other projects build on",
            ClassifyType::Libraries => "a reusable library",
            ClassifyType::DevelopmentTools => "a tool that supports software development",
            ClassifyType::CliTools => "a command-line tool",
            ClassifyType::DevOpsConfiguration => "deployment or infrastructure configuration",
            ClassifyType::Documentation => "a documentation project",
        }
    }
}

impl std::fmt::Display for ClassifyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifyType {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                WikiError::Config(format!(
                    "Unknown classification '{}'. Expected one of: {}",
                    s,
                    Self::ALL.map(|c| c.as_str()).join(", ")
                ))
            })
    }
}
