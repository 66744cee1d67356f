//! In-memory recipe source for tests and offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::ApiError;
use crate::model::{ProjectSnapshot, RecipeSnapshot};
use crate::traits::RecipeSource;

/// A payload passed to [`RecipeSource::save_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPayload {
    pub project_key: String,
    pub recipe_name: String,
    pub content: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    projects: Vec<ProjectSnapshot>,
    /// Recipes by project key, in listing order.
    recipes: HashMap<String, Vec<RecipeSnapshot>>,
    /// Payloads by (project key, recipe name).
    payloads: HashMap<(String, String), String>,
    saves: Vec<SavedPayload>,
    fetch_delay: Duration,
}

/// Recipe source backed by in-process maps.
///
/// All mutators take `&self` so a source can be shared behind an `Arc` and
/// edited while a filesystem is using it. Failures can be injected per
/// operation, and fetch concurrency is recorded.
#[derive(Debug, Default)]
pub struct MemoryRecipeSource {
    state: RwLock<MemoryState>,
    fail_lists: AtomicBool,
    fail_fetches: AtomicBool,
    fail_saves: AtomicBool,
    list_project_calls: AtomicUsize,
    list_recipe_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    fetches_in_flight: AtomicUsize,
    max_fetches_in_flight: AtomicUsize,
}

impl MemoryRecipeSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a project (or replace one with the same key).
    ///
    /// # Arguments
    /// * `project` - Project snapshot
    pub fn add_project(&self, project: ProjectSnapshot) {
        let mut state = self.state.write();
        state.recipes.entry(project.project_key.clone()).or_default();
        match state
            .projects
            .iter_mut()
            .find(|p| p.project_key == project.project_key)
        {
            Some(existing) => *existing = project,
            None => state.projects.push(project),
        }
    }

    /// Remove a project and everything in it.
    pub fn remove_project(&self, project_key: &str) {
        let mut state = self.state.write();
        state.projects.retain(|p| p.project_key != project_key);
        state.recipes.remove(project_key);
        state.payloads.retain(|(key, _), _| key != project_key);
    }

    /// Add a recipe with its payload (or replace one with the same name).
    ///
    /// # Arguments
    /// * `recipe` - Recipe snapshot; its project key selects the project
    /// * `payload` - Script source
    pub fn add_recipe(&self, recipe: RecipeSnapshot, payload: impl Into<String>) {
        let mut state = self.state.write();
        let key: (String, String) = (recipe.project_key.clone(), recipe.name.clone());
        let recipes: &mut Vec<RecipeSnapshot> =
            state.recipes.entry(recipe.project_key.clone()).or_default();
        match recipes.iter_mut().find(|r| r.name == recipe.name) {
            Some(existing) => *existing = recipe,
            None => recipes.push(recipe),
        }
        state.payloads.insert(key, payload.into());
    }

    /// Remove a recipe and its payload.
    pub fn remove_recipe(&self, project_key: &str, recipe_name: &str) {
        let mut state = self.state.write();
        if let Some(recipes) = state.recipes.get_mut(project_key) {
            recipes.retain(|r| r.name != recipe_name);
        }
        state
            .payloads
            .remove(&(project_key.to_string(), recipe_name.to_string()));
    }

    /// Current payload of a recipe, if any.
    pub fn payload(&self, project_key: &str, recipe_name: &str) -> Option<String> {
        self.state
            .read()
            .payloads
            .get(&(project_key.to_string(), recipe_name.to_string()))
            .cloned()
    }

    /// Every successful save, oldest first.
    pub fn saves(&self) -> Vec<SavedPayload> {
        self.state.read().saves.clone()
    }

    /// Make list operations fail (or succeed again).
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Make payload fetches fail (or succeed again).
    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Make payload saves fail (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside every payload fetch.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.write().fetch_delay = delay;
    }

    /// Number of `list_projects` calls so far.
    pub fn list_project_calls(&self) -> usize {
        self.list_project_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_recipes` calls so far.
    pub fn list_recipe_calls(&self) -> usize {
        self.list_recipe_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_payload` calls so far.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Highest number of payload fetches observed running at the same time.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_fetches_in_flight.load(Ordering::SeqCst)
    }

    fn injected(operation: &str) -> ApiError {
        ApiError::Transport {
            url: format!("memory://{}", operation),
            message: "injected failure".to_string(),
        }
    }
}

impl RecipeSource for MemoryRecipeSource {
    fn list_projects(&self) -> Result<Vec<ProjectSnapshot>, ApiError> {
        self.list_project_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(Self::injected("projects"));
        }
        Ok(self.state.read().projects.clone())
    }

    fn list_recipes(&self, project_key: &str) -> Result<Vec<RecipeSnapshot>, ApiError> {
        self.list_recipe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(Self::injected("recipes"));
        }
        self.state
            .read()
            .recipes
            .get(project_key)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("project {}", project_key)))
    }

    fn fetch_payload(&self, project_key: &str, recipe_name: &str) -> Result<String, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight: usize = self.fetches_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_fetches_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay: Duration = self.state.read().fetch_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let result: Result<String, ApiError> = if self.fail_fetches.load(Ordering::SeqCst) {
            Err(Self::injected("payload"))
        } else {
            self.payload(project_key, recipe_name).ok_or_else(|| {
                ApiError::NotFound(format!("recipe {}.{}", project_key, recipe_name))
            })
        };

        self.fetches_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn save_payload(
        &self,
        project_key: &str,
        recipe_name: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Self::injected("save"));
        }
        let mut state = self.state.write();
        let key: (String, String) = (project_key.to_string(), recipe_name.to_string());
        if !state.payloads.contains_key(&key) {
            return Err(ApiError::NotFound(format!(
                "recipe {}.{}",
                project_key, recipe_name
            )));
        }
        state.payloads.insert(key, content.to_string());
        state.saves.push(SavedPayload {
            project_key: project_key.to_string(),
            recipe_name: recipe_name.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }
}
