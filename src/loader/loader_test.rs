// ABOUTME: Tests for ModuleLoader - dependency-ordered loads, partial failure,
// ABOUTME: blocked and forced unloads, and tool-name uniqueness.

use std::collections::HashSet;

use super::*;
use crate::error::{LoaderError, ProfileError};
use crate::module::ModuleDefinition;
use crate::profile::{ProfileConfig, ProfileDefinition};
use crate::test_support::{harness, standard_harness};

#[tokio::test]
async fn test_load_profile_orders_dependencies_first() {
    let h = standard_harness().build();

    let result = h.loader.load_profile("testing").await.unwrap();

    assert_eq!(result.load_order, vec!["core", "quality"]);
    assert_eq!(result.modules_loaded, 2);
    assert_eq!(result.tools_registered, 2);
    assert!(result.errors.is_empty());
    assert_eq!(h.events.events(), vec!["load:core", "load:quality"]);
}

#[tokio::test]
async fn test_load_profile_twice_loads_nothing_the_second_time() {
    let h = standard_harness().build();

    h.loader.load_profile("full").await.unwrap();
    let second = h.loader.load_profile("full").await.unwrap();

    assert_eq!(second.modules_loaded, 0);
    assert_eq!(second.modules_skipped, 3);
    assert_eq!(h.events.count("load:core"), 1);
}

#[tokio::test]
async fn test_load_module_auto_loads_dependencies() {
    let h = standard_harness().build();

    let result = h.loader.load_module("quality").await;

    assert!(result.is_success());
    assert!(h.loader.is_module_loaded("core").await);
    assert_eq!(h.loader.load_order().await, vec!["core", "quality"]);
}

#[tokio::test]
async fn test_load_module_already_loaded_is_skipped() {
    let h = standard_harness().build();
    h.loader.load_module("core").await;

    let result = h.loader.load_module("core").await;
    assert_eq!(result.status, LoadStatus::Skipped);
    assert_eq!(h.events.count("load:core"), 1);
}

#[tokio::test]
async fn test_load_module_reports_cycle() {
    let h = harness()
        .module(ModuleDefinition::new("a").depends_on(["b"]))
        .module(ModuleDefinition::new("b").depends_on(["a"]))
        .build();

    let result = h.loader.load_module("a").await;

    assert!(result.is_failed());
    assert_eq!(
        result.error,
        Some(LoaderError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()]
        })
    );
    assert!(h.loader.get_loaded_modules().await.is_empty());
}

#[tokio::test]
async fn test_missing_dependency_fails_only_that_module() {
    let h = harness()
        .module(ModuleDefinition::new("core"))
        .module(ModuleDefinition::new("broken").depends_on(["ghost"]))
        .profiles(
            ProfileConfig::new().profile(ProfileDefinition::new("p").modules(["core", "broken"])),
        )
        .build();

    let result = h.loader.load_profile("p").await.unwrap();

    assert_eq!(result.modules_loaded, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].module_id, "broken");
    assert!(matches!(
        &result.errors[0].error,
        LoaderError::MissingDependency { dependency, .. } if dependency == "ghost"
    ));
    assert!(h.loader.is_module_loaded("core").await);
}

#[tokio::test]
async fn test_failed_module_does_not_block_siblings() {
    let h = harness()
        .module(ModuleDefinition::new("core").priority(10))
        .module(ModuleDefinition::new("flaky").depends_on(["core"]))
        .module(ModuleDefinition::new("needs_flaky").depends_on(["flaky"]))
        .module(ModuleDefinition::new("research"))
        .failing("flaky")
        .profiles(ProfileConfig::new().profile(
            ProfileDefinition::new("p").modules(["needs_flaky", "research"]),
        ))
        .build();

    let result = h.loader.load_profile("p").await.unwrap();

    let failed: HashSet<_> = result.errors.iter().map(|e| e.module_id.as_str()).collect();
    assert_eq!(failed, HashSet::from(["flaky", "needs_flaky"]));
    assert_eq!(h.loader.get_loaded_modules().await, vec!["core", "research"]);
    // The tool registered before the failure was released again.
    assert!(!h.ownership.is_owned("flaky_tool").await);
    assert!(h.host.get("flaky_tool").await.is_none());
    assert_eq!(h.events.count("cleanup:flaky"), 2);
}

#[tokio::test]
async fn test_profile_cycle_fails_members_and_loads_the_rest() {
    let h = harness()
        .module(ModuleDefinition::new("a").depends_on(["b"]))
        .module(ModuleDefinition::new("b").depends_on(["a"]))
        .module(ModuleDefinition::new("free"))
        .profiles(ProfileConfig::new().profile(ProfileDefinition::new("p").modules(["a", "free"])))
        .build();

    let result = h.loader.load_profile("p").await.unwrap();

    assert_eq!(result.load_order, vec!["free"]);
    assert_eq!(result.modules_loaded, 1);
    assert_eq!(result.errors.len(), 2);
    assert!(result
        .errors
        .iter()
        .all(|e| matches!(e.error, LoaderError::DependencyCycle { .. })));
}

#[tokio::test]
async fn test_unknown_profile() {
    let h = standard_harness().build();
    let err = h.loader.load_profile("nope").await.unwrap_err();
    assert_eq!(err, ProfileError::UnknownProfile("nope".into()));
}

#[tokio::test]
async fn test_missing_factory_is_a_module_failure() {
    let h = harness()
        .module(ModuleDefinition::new("core"))
        .without_factory("core")
        .build();

    let result = h.loader.load_module("core").await;
    assert_eq!(result.error, Some(LoaderError::NoFactory("core".into())));
}

#[tokio::test]
async fn test_unload_blocked_by_dependent_then_allowed() {
    let h = standard_harness().build();
    h.loader.load_profile("testing").await.unwrap();

    let err = h.loader.unload_module("core", false).await.unwrap_err();
    assert_eq!(
        err,
        LoaderError::UnloadBlocked {
            module: "core".into(),
            dependents: vec!["quality".into()],
        }
    );
    assert!(h.loader.is_module_loaded("core").await);

    assert_eq!(h.loader.unload_module("quality", false).await.unwrap(), vec!["quality"]);
    assert_eq!(h.loader.unload_module("core", false).await.unwrap(), vec!["core"]);
    assert!(h.loader.get_loaded_modules().await.is_empty());
    assert!(h.loader.get_registered_tools().await.is_empty());
    assert_eq!(h.host.count().await, 0);
}

#[tokio::test]
async fn test_forced_unload_cascades_deepest_first() {
    let h = harness()
        .module(ModuleDefinition::new("core"))
        .module(ModuleDefinition::new("quality").depends_on(["core"]))
        .module(ModuleDefinition::new("security").depends_on(["quality"]))
        .build();
    h.loader.load_module("security").await;

    let unloaded = h.loader.unload_module("core", true).await.unwrap();

    assert_eq!(unloaded, vec!["security", "quality", "core"]);
    let cleanups: Vec<_> = h
        .events
        .events()
        .into_iter()
        .filter(|e| e.starts_with("cleanup:"))
        .collect();
    assert_eq!(cleanups, vec!["cleanup:security", "cleanup:quality", "cleanup:core"]);
}

#[tokio::test]
async fn test_unload_not_loaded_is_noop() {
    let h = standard_harness().build();
    assert!(h.loader.unload_module("core", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_tool_names_keep_single_owner() {
    let h = harness()
        .module(ModuleDefinition::new("quality").tools(["lint", "search"]))
        .module(ModuleDefinition::new("research").tools(["search", "browse"]))
        .profiles(ProfileConfig::new().profile(
            ProfileDefinition::new("p").modules(["quality", "research"]),
        ))
        .build();

    let result = h.loader.load_profile("p").await.unwrap();

    assert!(result.is_success());
    let tools = h.loader.get_registered_tools().await;
    assert_eq!(tools.len(), 3);
    assert_eq!(tools["search"], "quality");
    assert_eq!(tools["browse"], "research");
    assert_eq!(h.host.count().await, 3);

    let research = h.loader.get_record("research").await.unwrap();
    assert_eq!(research.base.registered_tools().await, vec!["browse"]);

    // Once quality goes away the name is free again, but research does not
    // pick it up retroactively.
    h.loader.unload_module("quality", false).await.unwrap();
    assert!(!h.ownership.is_owned("search").await);
    assert_eq!(h.ownership.tools_of("research").await, vec!["browse"]);
}

#[tokio::test]
async fn test_load_statistics() {
    let h = standard_harness().build();
    h.loader.load_profile("full").await.unwrap();

    let stats = h.loader.get_load_statistics().await;
    assert_eq!(stats.loaded_modules, 3);
    assert_eq!(stats.total_tools, 3);
    let order: Vec<_> = stats.modules.iter().map(|m| m.module_id.as_str()).collect();
    assert_eq!(order, vec!["core", "quality", "research"]);
    assert!(h.loader.get_module("quality").await.is_some());
    assert!(h.loader.get_module("missing").await.is_none());
}

#[tokio::test]
async fn test_loaded_dependents() {
    let h = standard_harness().build();
    h.loader.load_profile("full").await.unwrap();
    assert_eq!(h.loader.loaded_dependents("core").await, vec!["research", "quality"]);
}

#[tokio::test]
async fn test_unload_all_reverses_load_order() {
    let h = standard_harness().build();
    h.loader.load_profile("full").await.unwrap();

    let unloaded = h.loader.unload_all().await;

    assert_eq!(unloaded, vec!["research", "quality", "core"]);
    assert!(h.loader.get_loaded_modules().await.is_empty());
}

#[tokio::test]
async fn test_profile_warnings() {
    let h = harness()
        .module(ModuleDefinition::new("core").in_profiles(["minimal"]))
        .module(ModuleDefinition::new("quality").tools(["lint"]))
        .profiles(ProfileConfig::new().profile(
            ProfileDefinition::new("dev")
                .modules(["core"])
                .additional_tools(["lint", "teleport"]),
        ))
        .build();

    let result = h.loader.load_profile("dev").await.unwrap();

    assert_eq!(result.modules_loaded, 2);
    assert!(result.warnings.iter().any(|w| w.contains("teleport")));
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("'core' does not declare membership")));
}

#[tokio::test]
async fn test_interrupted_unload_is_finished_before_reload() {
    let h = standard_harness()
        .slow_cleanup("research", std::time::Duration::from_millis(300))
        .build();
    h.loader.load_profile("full").await.unwrap();

    let cut = tokio::time::timeout(
        std::time::Duration::from_millis(20),
        h.loader.unload_module("research", false),
    )
    .await;
    assert!(cut.is_err());
    assert_eq!(h.events.count("cleanup:research"), 1);
    assert_eq!(h.loader.interrupted_unloads().await, vec!["research"]);
    assert!(h.loader.is_module_loaded("research").await);

    let result = h.loader.load_module("research").await;
    assert_eq!(result.status, LoadStatus::Success);
    assert_eq!(h.events.count("load:research"), 2);
    assert_eq!(h.events.count("cleanup:research"), 1);
    assert!(h.loader.interrupted_unloads().await.is_empty());
    assert_eq!(
        h.ownership.owner_of("research_tool").await.as_deref(),
        Some("research")
    );
}

#[tokio::test]
async fn test_finish_interrupted_unloads_skips_cleanup() {
    let h = standard_harness()
        .slow_cleanup("research", std::time::Duration::from_millis(300))
        .build();
    h.loader.load_profile("full").await.unwrap();

    let _ = tokio::time::timeout(
        std::time::Duration::from_millis(20),
        h.loader.unload_module("research", false),
    )
    .await;

    let finished = h.loader.finish_interrupted_unloads().await;
    assert_eq!(finished, vec!["research"]);
    assert_eq!(h.events.count("cleanup:research"), 1);
    assert!(!h.loader.is_module_loaded("research").await);
    assert!(h.host.get("research_tool").await.is_none());
    assert!(h.ownership.owner_of("research_tool").await.is_none());
    assert!(h.loader.finish_interrupted_unloads().await.is_empty());
}
