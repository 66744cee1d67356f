//! The recipe source interface consumed by the filesystem.

use crate::error::ApiError;
use crate::model::{ProjectSnapshot, RecipeSnapshot};

/// Remote operations on DSS projects and recipes.
///
/// Every call blocks until the remote side answers or the implementation's
/// own timeout fires. Implemented by [`crate::DssClient`] for real instances
/// and by [`crate::MemoryRecipeSource`] for tests.
pub trait RecipeSource: Send + Sync {
    /// List all projects visible to the caller.
    fn list_projects(&self) -> Result<Vec<ProjectSnapshot>, ApiError>;

    /// List all recipes of a project, unfiltered.
    ///
    /// # Arguments
    /// * `project_key` - Key of the project
    fn list_recipes(&self, project_key: &str) -> Result<Vec<RecipeSnapshot>, ApiError>;

    /// Fetch the script payload of a recipe.
    ///
    /// # Arguments
    /// * `project_key` - Key of the owning project
    /// * `recipe_name` - Recipe name
    fn fetch_payload(&self, project_key: &str, recipe_name: &str) -> Result<String, ApiError>;

    /// Replace the script payload of a recipe.
    ///
    /// # Arguments
    /// * `project_key` - Key of the owning project
    /// * `recipe_name` - Recipe name
    /// * `content` - New script source
    fn save_payload(
        &self,
        project_key: &str,
        recipe_name: &str,
        content: &str,
    ) -> Result<(), ApiError>;
}
