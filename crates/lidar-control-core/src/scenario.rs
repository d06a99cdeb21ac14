// lidar-control-core/src/scenario.rs
// ============================================================================
// Module: Scenario Registry
// Description: Resolves (scenario, pipeline_version) to a concrete route.
// Purpose: Keep the mapping from an inbound command's declared scenario to
//          the workflow type and messaging routes it binds to out of the
//          ingest use case, so adding a scenario never touches it.
// Dependencies: std::collections
// ============================================================================

//! ## Overview
//! The registry starts from a static built-in table (`ingest`/`1` is the only
//! shipped route) and layers operator-supplied overrides on top, matching the
//! static-registration style of this codebase's other lookup tables
//! ([`crate::crs::presets`]).

use std::collections::BTreeMap;

use thiserror::Error;

/// A resolved scenario route: which workflow type to start and which
/// progress-query route to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioRoute {
    /// Workflow type name passed to the workflow engine gateway.
    pub workflow_type: String,
    /// Task queue / worker pool the workflow type is registered on.
    pub task_queue: String,
    /// Progress-query route name used when polling execution status.
    pub progress_query: String,
}

/// Raised when a `(scenario, pipeline_version)` pair has no registered route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no route registered for scenario `{scenario}` pipeline_version `{pipeline_version}`")]
pub struct UnsupportedScenarioError {
    /// Requested scenario name.
    pub scenario: String,
    /// Requested pipeline version.
    pub pipeline_version: String,
}

fn builtin_routes() -> BTreeMap<(String, String), ScenarioRoute> {
    let mut routes = BTreeMap::new();
    routes.insert(
        ("ingest".to_string(), "1".to_string()),
        ScenarioRoute {
            workflow_type: "ingest-1".to_string(),
            task_queue: "point-cloud-task-queue".to_string(),
            progress_query: "progress".to_string(),
        },
    );
    routes
}

/// A registry of scenario routes: the built-in table plus any operator
/// overrides, with overrides taking precedence on key collision.
#[derive(Debug, Clone)]
pub struct ScenarioRegistry {
    routes: BTreeMap<(String, String), ScenarioRoute>,
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self { routes: builtin_routes() }
    }
}

impl ScenarioRegistry {
    /// Builds a registry from the built-in table with `overrides` layered on
    /// top; an override with the same `(scenario, pipeline_version)` key
    /// replaces the built-in entry entirely.
    #[must_use]
    pub fn with_overrides(overrides: impl IntoIterator<Item = ((String, String), ScenarioRoute)>) -> Self {
        let mut routes = builtin_routes();
        for (key, route) in overrides {
            routes.insert(key, route);
        }
        Self { routes }
    }

    /// Resolves `(scenario, pipeline_version)` to its route.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedScenarioError`] when no route is registered.
    pub fn resolve(&self, scenario: &str, pipeline_version: &str) -> Result<&ScenarioRoute, UnsupportedScenarioError> {
        self.routes
            .get(&(scenario.to_string(), pipeline_version.to_string()))
            .ok_or_else(|| UnsupportedScenarioError {
                scenario: scenario.to_string(),
                pipeline_version: pipeline_version.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "test fixtures use unwrap/expect")]
    use super::*;

    #[test]
    fn resolves_builtin_ingest_v1() {
        let registry = ScenarioRegistry::default();
        let route = registry.resolve("ingest", "1").expect("route");
        assert_eq!(route.workflow_type, "ingest-1");
        assert_eq!(route.task_queue, "point-cloud-task-queue");
        assert_eq!(route.progress_query, "progress");
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let registry = ScenarioRegistry::default();
        assert!(registry.resolve("ingest", "2").is_err());
        assert!(registry.resolve("reprocess", "1").is_err());
    }

    #[test]
    fn override_replaces_builtin_entry() {
        let registry = ScenarioRegistry::with_overrides([(
            ("ingest".to_string(), "1".to_string()),
            ScenarioRoute {
                workflow_type: "ingest-1-canary".to_string(),
                task_queue: "point-cloud-task-queue-canary".to_string(),
                progress_query: "progress".to_string(),
            },
        )]);
        let route = registry.resolve("ingest", "1").expect("route");
        assert_eq!(route.workflow_type, "ingest-1-canary");
    }
}
