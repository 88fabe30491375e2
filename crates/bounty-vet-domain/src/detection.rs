//! Inferred toolchain of a cloned repository.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::stage::StageName;

/// Closed set of project ecosystems the pipeline knows how to vet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Node,
    Python,
    Rust,
    Go,
    Java,
    Ruby,
    Unknown,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Node => "node",
            ProjectType::Python => "python",
            ProjectType::Rust => "rust",
            ProjectType::Go => "go",
            ProjectType::Java => "java",
            ProjectType::Ruby => "ruby",
            ProjectType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "node" => Ok(ProjectType::Node),
            "python" => Ok(ProjectType::Python),
            "rust" => Ok(ProjectType::Rust),
            "go" => Ok(ProjectType::Go),
            "java" => Ok(ProjectType::Java),
            "ruby" => Ok(ProjectType::Ruby),
            "unknown" => Ok(ProjectType::Unknown),
            other => Err(DomainError::InvalidProjectType(other.to_string())),
        }
    }
}

/// Toolchain metadata produced once by the detect stage; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetection {
    #[serde(rename = "type")]
    pub project_type: ProjectType,

    /// Package manager or build tool (`npm`, `pnpm`, `cargo`, `maven`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,

    /// Manifest file that decided the detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,

    /// Ecosystem security auditor, if one exists for this project type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_command: Option<String>,
}

impl ProjectDetection {
    /// Detection for a directory with no recognised manifest.
    pub fn unknown() -> Self {
        Self {
            project_type: ProjectType::Unknown,
            package_manager: None,
            manifest: None,
            install_command: None,
            build_command: None,
            lint_command: None,
            test_command: None,
            audit_command: None,
        }
    }

    /// Command backing a command-driven stage, if detected.
    pub fn command_for(&self, stage: StageName) -> Option<&str> {
        match stage {
            StageName::Install => self.install_command.as_deref(),
            StageName::Build => self.build_command.as_deref(),
            StageName::Lint => self.lint_command.as_deref(),
            StageName::Test => self.test_command.as_deref(),
            StageName::Security => self.audit_command.as_deref(),
            StageName::Clone | StageName::Detect | StageName::Bundle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_type_roundtrip_str() {
        for t in [
            ProjectType::Node,
            ProjectType::Python,
            ProjectType::Rust,
            ProjectType::Go,
            ProjectType::Java,
            ProjectType::Ruby,
            ProjectType::Unknown,
        ] {
            assert_eq!(t.as_str().parse::<ProjectType>().unwrap(), t);
        }
        assert!("cobol".parse::<ProjectType>().is_err());
    }

    #[test]
    fn test_unknown_detection_has_no_commands() {
        let d = ProjectDetection::unknown();
        for stage in StageName::ALL {
            assert!(d.command_for(stage).is_none());
        }
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "unknown" }));
    }

    #[test]
    fn test_command_for_maps_stages() {
        let d = ProjectDetection {
            test_command: Some("npm test".to_string()),
            audit_command: Some("npm audit".to_string()),
            ..ProjectDetection::unknown()
        };
        assert_eq!(d.command_for(StageName::Test), Some("npm test"));
        assert_eq!(d.command_for(StageName::Security), Some("npm audit"));
        assert_eq!(d.command_for(StageName::Lint), None);
    }
}
