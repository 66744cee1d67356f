//! Snapshots of DSS projects and recipes.
//!
//! These are plain value types decoded from the public API. Nodes in the
//! filesystem hold a copy and replace it wholesale on every refresh.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Recipe types (lower-cased) whose payload is script source we can edit.
pub const EDITABLE_RECIPE_TYPES: [&str; 3] = ["python", "scala", "r"];

/// Reference to a DSS user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User login.
    #[serde(default)]
    pub login: String,
}

/// Who touched a resource and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationTag {
    /// Actor of the modification.
    #[serde(default)]
    pub last_modified_by: UserRef,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_modified_on: i64,
}

impl ModificationTag {
    /// Build a tag from a login and an epoch-milliseconds timestamp.
    pub fn new(login: impl Into<String>, millis: i64) -> Self {
        Self {
            last_modified_by: UserRef {
                login: login.into(),
            },
            last_modified_on: millis,
        }
    }

    /// Timestamp of the modification.
    pub fn timestamp(&self) -> SystemTime {
        millis_to_system_time(self.last_modified_on)
    }
}

/// Immutable copy of a project's descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    /// Stable project key, used in API paths.
    pub project_key: String,
    /// Display name, used as the directory name.
    pub name: String,
    /// Project type as reported by DSS.
    #[serde(default)]
    pub project_type: String,
    /// Creation actor and time.
    #[serde(default)]
    pub creation_tag: ModificationTag,
    /// Last modification actor and time.
    #[serde(default)]
    pub version_tag: ModificationTag,
    /// Older spelling of the modification tag, used when `versionTag` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_tag: Option<ModificationTag>,
}

impl ProjectSnapshot {
    /// Create a snapshot with empty modification tags.
    pub fn new(project_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn created_on(&self) -> SystemTime {
        self.creation_tag.timestamp()
    }

    pub fn created_by(&self) -> &str {
        &self.creation_tag.last_modified_by.login
    }

    pub fn modified_on(&self) -> SystemTime {
        self.last_modification().timestamp()
    }

    pub fn modified_by(&self) -> &str {
        &self.last_modification().last_modified_by.login
    }

    fn last_modification(&self) -> &ModificationTag {
        match &self.modification_tag {
            Some(tag) if self.version_tag == ModificationTag::default() => tag,
            _ => &self.version_tag,
        }
    }
}

/// Immutable copy of a recipe's descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSnapshot {
    /// Key of the owning project.
    pub project_key: String,
    /// Recipe name, used as the file name.
    pub name: String,
    /// Recipe type (e.g. `python`, `sync`, `r`).
    #[serde(rename = "type")]
    pub recipe_type: String,
    /// Creation actor and time.
    #[serde(default)]
    pub creation_tag: ModificationTag,
    /// Last modification actor and time.
    #[serde(default)]
    pub version_tag: ModificationTag,
}

impl RecipeSnapshot {
    /// Create a snapshot with empty modification tags.
    pub fn new(
        project_key: impl Into<String>,
        name: impl Into<String>,
        recipe_type: impl Into<String>,
    ) -> Self {
        Self {
            project_key: project_key.into(),
            name: name.into(),
            recipe_type: recipe_type.into(),
            ..Default::default()
        }
    }

    /// Whether the recipe payload is script source that can be edited as a file.
    pub fn is_editable(&self) -> bool {
        let kind: String = self.recipe_type.to_lowercase();
        EDITABLE_RECIPE_TYPES.contains(&kind.as_str())
    }

    pub fn created_on(&self) -> SystemTime {
        self.creation_tag.timestamp()
    }

    pub fn created_by(&self) -> &str {
        &self.creation_tag.last_modified_by.login
    }

    pub fn modified_on(&self) -> SystemTime {
        self.version_tag.timestamp()
    }

    pub fn modified_by(&self) -> &str {
        &self.version_tag.last_modified_by.login
    }
}

/// Body of the recipe payload endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipePayload {
    /// Script source.
    #[serde(default)]
    pub payload: String,
}

/// Convert milliseconds since epoch to SystemTime.
///
/// # Arguments
/// * `millis` - Milliseconds since Unix epoch
fn millis_to_system_time(millis: i64) -> SystemTime {
    if millis >= 0 {
        UNIX_EPOCH + Duration::from_millis(millis as u64)
    } else {
        UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_project() {
        let json: &str = r#"{
            "projectKey": "SALES",
            "name": "Sales Forecast",
            "projectType": "REGULAR",
            "creationTag": {"lastModifiedBy": {"login": "alice"}, "lastModifiedOn": 1000},
            "versionTag": {"lastModifiedBy": {"login": "bob"}, "lastModifiedOn": 2000},
            "ownerLogin": "alice"
        }"#;

        let project: ProjectSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(project.project_key, "SALES");
        assert_eq!(project.name, "Sales Forecast");
        assert_eq!(project.created_by(), "alice");
        assert_eq!(project.modified_by(), "bob");
        assert_eq!(project.created_on(), UNIX_EPOCH + Duration::from_secs(1));
        assert_eq!(project.modified_on(), UNIX_EPOCH + Duration::from_secs(2));
    }

    #[test]
    fn test_decode_project_modification_tag_alias() {
        let json: &str = r#"{
            "projectKey": "P",
            "name": "P",
            "modificationTag": {"lastModifiedBy": {"login": "carol"}, "lastModifiedOn": 5}
        }"#;

        let project: ProjectSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(project.modified_by(), "carol");
        assert_eq!(project.created_by(), "");
        assert_eq!(project.created_on(), UNIX_EPOCH);
    }

    #[test]
    fn test_decode_project_with_both_tags() {
        let json: &str = r#"{
            "projectKey": "P",
            "name": "P",
            "versionTag": {"lastModifiedBy": {"login": "dave"}, "lastModifiedOn": 9},
            "modificationTag": {"lastModifiedBy": {"login": "carol"}, "lastModifiedOn": 5}
        }"#;

        let project: ProjectSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(project.modified_by(), "dave");
        assert_eq!(project.modified_on(), UNIX_EPOCH + Duration::from_millis(9));
    }

    #[test]
    fn test_decode_recipe() {
        let json: &str = r#"{
            "projectKey": "SALES",
            "name": "compute_totals",
            "type": "python",
            "versionTag": {"lastModifiedBy": {"login": "bob"}, "lastModifiedOn": 3000}
        }"#;

        let recipe: RecipeSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(recipe.name, "compute_totals");
        assert_eq!(recipe.recipe_type, "python");
        assert!(recipe.is_editable());
        assert_eq!(recipe.modified_on(), UNIX_EPOCH + Duration::from_secs(3));
    }

    #[test]
    fn test_is_editable() {
        for kind in ["python", "Python", "SCALA", "r", "R"] {
            assert!(RecipeSnapshot::new("P", "x", kind).is_editable(), "{kind}");
        }
        for kind in ["sync", "sql_query", "pyspark", "shell", ""] {
            assert!(!RecipeSnapshot::new("P", "x", kind).is_editable(), "{kind}");
        }
    }

    #[test]
    fn test_millis_to_system_time_negative() {
        let time: SystemTime = millis_to_system_time(-1500);
        assert_eq!(time, UNIX_EPOCH - Duration::from_millis(1500));
    }
}
