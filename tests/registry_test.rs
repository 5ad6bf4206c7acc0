//! Tool registry scenarios through the public API

use mcp_dispatch::core::{
    ExecutionContext, ExecutionResult, RegisterOptions, ToolDescriptor, ToolFilter, ToolRegistry,
};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor::new(name).with_schema(json!({ "type": "object" }))
}

#[test]
fn test_remote_listing_shrinks() {
    let registry = ToolRegistry::new();
    registry.sync(vec![descriptor("echo"), descriptor("add")]);
    let add_id = registry.get_tool_by_name("add").unwrap().id;

    let report = registry.sync(vec![descriptor("add")]);

    assert_eq!(report.removed, vec!["echo".to_string()]);
    assert!(report.registered.is_empty());
    assert!(registry.get_tool_by_name("echo").is_none());
    assert_eq!(registry.get_tool_by_name("add").unwrap().id, add_id);
    assert_eq!(registry.list_tools().len(), 1);
}

#[test]
fn test_repeated_overwrite_preserves_identity_and_usage() {
    let registry = ToolRegistry::new();
    let id = registry
        .register_tool(descriptor("search"), RegisterOptions::default())
        .unwrap();
    registry.record_execution(
        &id,
        &ExecutionContext::new(json!({})),
        &ExecutionResult::success(Duration::from_millis(12)),
    );

    for description in ["first", "second"] {
        let again = registry
            .register_tool(
                descriptor("search").with_description(description),
                RegisterOptions::overwrite(),
            )
            .unwrap();
        assert_eq!(again, id);
    }

    let tool = registry.get_tool(&id).unwrap();
    assert_eq!(tool.description.as_deref(), Some("second"));
    assert_eq!(tool.usage_count, 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_average_is_arithmetic_mean_of_successes() {
    let registry = ToolRegistry::new();
    let id = registry
        .register_tool(descriptor("resize"), RegisterOptions::default())
        .unwrap();

    let samples = [5u64, 15, 40, 100, 7, 33];
    for (i, ms) in samples.iter().enumerate() {
        registry.record_execution(
            &id,
            &ExecutionContext::new(json!({ "run": i })),
            &ExecutionResult::success(Duration::from_millis(*ms)),
        );
        if i % 2 == 0 {
            registry.record_execution(
                &id,
                &ExecutionContext::new(json!({ "run": i })),
                &ExecutionResult::failure(Duration::from_millis(9_000), "boom"),
            );
        }
    }

    let tool = registry.get_tool(&id).unwrap();
    let expected = samples.iter().sum::<u64>() as f64 / samples.len() as f64;
    assert!((tool.average_execution_time - expected).abs() < 1e-6);
    assert_eq!(tool.usage_count, 9);
    assert_eq!(tool.error_count, 3);
    assert_eq!(tool.success_count(), 6);
}

#[test]
fn test_disable_is_sticky_across_removal_and_return() {
    let registry = ToolRegistry::new();
    registry.sync(vec![descriptor("shell")]);
    assert!(registry.set_tool_enabled_by_name("shell", false));

    registry.sync(vec![]);
    assert!(registry.is_empty());

    registry.sync(vec![descriptor("shell")]);
    let tool = registry.get_tool_by_name("shell").unwrap();
    assert!(!tool.is_enabled);
    assert!(registry.ensure_callable("shell").is_err());

    let enabled = registry.find_tools(&ToolFilter::default().enabled_only()).unwrap();
    assert!(enabled.is_empty());
}

#[test]
fn test_concurrent_recording() {
    let registry = Arc::new(ToolRegistry::new());
    let id = registry
        .register_tool(descriptor("count"), RegisterOptions::default())
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    registry.record_execution(
                        &id,
                        &ExecutionContext::new(json!({})),
                        &ExecutionResult::success(Duration::from_millis(10)),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let tool = registry.get_tool(&id).unwrap();
    assert_eq!(tool.usage_count, 400);
    assert!((tool.average_execution_time - 10.0).abs() < 1e-6);
}

#[test]
fn test_metadata_serializes_camel_case() {
    let registry = ToolRegistry::new();
    let id = registry
        .register_tool(
            descriptor("fmt").with_category("text"),
            RegisterOptions::default(),
        )
        .unwrap();

    let value = serde_json::to_value(registry.get_tool(&id).unwrap()).unwrap();
    assert_eq!(value["name"], "fmt");
    assert_eq!(value["isEnabled"], true);
    assert_eq!(value["usageCount"], 0);
    assert_eq!(value["category"], "text");
    assert!(value.get("inputSchema").is_some());
}
