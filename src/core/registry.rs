//! Local mirror of the tools advertised by the remote host
//!
//! Each tool gets a stable id on first registration. Re-registering the same
//! name with `overwrite` refreshes the descriptor in place and keeps both the
//! id and the usage telemetry. An explicit disable is remembered by name, so
//! a tool that disappears from the remote listing and comes back later stays
//! disabled. With `reenable_on_change`, a changed descriptor lifts the
//! disable, whether it arrives in place or after the tool was removed.

use crate::core::protocol::ToolDescriptor;
use crate::core::request_id::new_tool_id;
use crate::utils::errors::{McpError, McpResult};
use crate::utils::metrics::running_mean;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

/// Registry view of one tool
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    pub is_enabled: bool,
    pub is_loaded: bool,
    pub usage_count: u64,
    pub error_count: u64,
    /// Mean duration of successful executions, in milliseconds
    pub average_execution_time: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub category: Option<String>,
}

impl ToolMetadata {
    fn from_descriptor(descriptor: ToolDescriptor, enabled: bool, loaded: bool) -> Self {
        Self {
            id: new_tool_id(),
            name: descriptor.name,
            description: descriptor.description,
            input_schema: descriptor.input_schema,
            is_enabled: enabled,
            is_loaded: loaded,
            usage_count: 0,
            error_count: 0,
            average_execution_time: 0.0,
            last_used_at: None,
            registered_at: Utc::now(),
            tags: descriptor.tags,
            category: descriptor.category,
        }
    }

    fn matches_descriptor(&self, descriptor: &ToolDescriptor) -> bool {
        self.description == descriptor.description
            && self.input_schema == descriptor.input_schema
            && self.tags == descriptor.tags
            && self.category == descriptor.category
    }

    pub fn success_count(&self) -> u64 {
        self.usage_count - self.error_count
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RegisterOptions {
    /// Mark the tool loaded immediately
    pub auto_load: bool,
    /// Replace an existing registration with the same name
    pub overwrite: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            auto_load: true,
            overwrite: false,
        }
    }
}

impl RegisterOptions {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Self::default()
        }
    }
}

/// Query over registered tools; empty fields match everything
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// Regular expression matched against the tool name
    pub name_pattern: Option<String>,
    /// Tool must carry every listed tag
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub enabled_only: bool,
}

impl ToolFilter {
    pub fn name(pattern: impl Into<String>) -> Self {
        Self {
            name_pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn enabled_only(mut self) -> Self {
        self.enabled_only = true;
        self
    }
}

/// Call-site information attached to a recorded execution
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub arguments: Value,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(arguments: Value) -> Self {
        Self {
            arguments,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub execution_time: Duration,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(execution_time: Duration) -> Self {
        Self {
            success: true,
            execution_time,
            error: None,
        }
    }

    pub fn failure(execution_time: Duration, error: impl Into<String>) -> Self {
        Self {
            success: false,
            execution_time,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatistics {
    pub total_tools: usize,
    pub loaded_tools: usize,
    pub enabled_tools: usize,
    /// Tool count per category
    pub categories: BTreeMap<String, usize>,
    /// Tool count per tag
    pub tags: BTreeMap<String, usize>,
    pub total_executions: u64,
    pub total_errors: u64,
}

/// Names touched by one synchronization pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub registered: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl SyncReport {
    pub fn is_unchanged(&self) -> bool {
        self.registered.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegisterOutcome {
    Registered,
    Updated,
    Unchanged,
}

#[derive(Default)]
struct RegistryState {
    tools: HashMap<String, ToolMetadata>,
    by_name: HashMap<String, String>,
    /// Names explicitly disabled by a caller
    disabled: HashSet<String>,
    /// Last metadata of disabled tools that have since been removed
    retired: HashMap<String, ToolMetadata>,
}

/// Tool registry owned by one manager
pub struct ToolRegistry {
    state: RwLock<RegistryState>,
    reenable_on_change: bool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_reenable_on_change(false)
    }

    /// Allow a changed remote descriptor to lift an explicit disable
    pub fn with_reenable_on_change(reenable_on_change: bool) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            reenable_on_change,
        }
    }

    /// Register a tool and return its id
    pub fn register_tool(
        &self,
        descriptor: ToolDescriptor,
        options: RegisterOptions,
    ) -> McpResult<String> {
        self.register(descriptor, options).map(|(id, _)| id)
    }

    fn register(
        &self,
        descriptor: ToolDescriptor,
        options: RegisterOptions,
    ) -> McpResult<(String, RegisterOutcome)> {
        if descriptor.name.trim().is_empty() {
            return Err(McpError::Validation("Tool name must not be empty".to_string()));
        }

        let mut guard = self.state.write();
        let state = &mut *guard;

        if let Some(id) = state.by_name.get(&descriptor.name).cloned() {
            if !options.overwrite {
                return Err(McpError::ToolAlreadyRegistered(descriptor.name));
            }
            let Some(tool) = state.tools.get_mut(&id) else {
                return Err(McpError::Validation(format!(
                    "Registry index out of sync for '{}'",
                    descriptor.name
                )));
            };

            if tool.matches_descriptor(&descriptor) {
                return Ok((id, RegisterOutcome::Unchanged));
            }

            tool.description = descriptor.description;
            tool.input_schema = descriptor.input_schema;
            tool.tags = descriptor.tags;
            tool.category = descriptor.category;
            if options.auto_load {
                tool.is_loaded = true;
            }
            if self.reenable_on_change && state.disabled.remove(&tool.name) {
                tool.is_enabled = true;
                info!("Re-enabled tool '{}' after descriptor change", tool.name);
            }
            debug!("Updated tool '{}' ({})", tool.name, id);
            return Ok((id, RegisterOutcome::Updated));
        }

        let retired = state.retired.remove(&descriptor.name);
        let mut enabled = !state.disabled.contains(&descriptor.name);
        if !enabled
            && self.reenable_on_change
            && retired.is_some_and(|previous| !previous.matches_descriptor(&descriptor))
        {
            state.disabled.remove(&descriptor.name);
            enabled = true;
            info!(
                "Re-enabled tool '{}' after descriptor change",
                descriptor.name
            );
        }
        let tool = ToolMetadata::from_descriptor(descriptor, enabled, options.auto_load);
        let id = tool.id.clone();
        debug!("Registered tool '{}' ({})", tool.name, id);
        state.by_name.insert(tool.name.clone(), id.clone());
        state.tools.insert(id.clone(), tool);

        Ok((id, RegisterOutcome::Registered))
    }

    /// Remove a tool; returns its metadata if it was registered
    pub fn unregister_tool(&self, id: &str) -> Option<ToolMetadata> {
        let mut state = self.state.write();
        let tool = state.tools.remove(id)?;
        state.by_name.remove(&tool.name);
        if state.disabled.contains(&tool.name) {
            state.retired.insert(tool.name.clone(), tool.clone());
        }
        debug!("Unregistered tool '{}' ({})", tool.name, id);
        Some(tool)
    }

    pub fn get_tool(&self, id: &str) -> Option<ToolMetadata> {
        self.state.read().tools.get(id).cloned()
    }

    pub fn get_tool_by_name(&self, name: &str) -> Option<ToolMetadata> {
        let state = self.state.read();
        state
            .by_name
            .get(name)
            .and_then(|id| state.tools.get(id))
            .cloned()
    }

    /// Snapshot of every tool, sorted by name
    pub fn list_tools(&self) -> Vec<ToolMetadata> {
        let mut tools: Vec<ToolMetadata> = self.state.read().tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Snapshot of the tools matching `filter`, sorted by name
    pub fn find_tools(&self, filter: &ToolFilter) -> McpResult<Vec<ToolMetadata>> {
        let pattern = filter
            .name_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| McpError::Validation(format!("Invalid name pattern: {}", e)))?;

        let mut tools: Vec<ToolMetadata> = self
            .state
            .read()
            .tools
            .values()
            .filter(|tool| !filter.enabled_only || tool.is_enabled)
            .filter(|tool| pattern.as_ref().map_or(true, |re| re.is_match(&tool.name)))
            .filter(|tool| filter.tags.iter().all(|tag| tool.tags.contains(tag)))
            .filter(|tool| {
                filter
                    .category
                    .as_ref()
                    .map_or(true, |c| tool.category.as_ref() == Some(c))
            })
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    /// Toggle enablement by id; false if the id is unknown
    pub fn set_tool_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let Some(tool) = state.tools.get_mut(id) else {
            return false;
        };

        tool.is_enabled = enabled;
        if enabled {
            state.disabled.remove(&tool.name);
        } else {
            state.disabled.insert(tool.name.clone());
        }
        info!(
            "Tool '{}' {}",
            tool.name,
            if enabled { "enabled" } else { "disabled" }
        );
        true
    }

    pub fn set_tool_enabled_by_name(&self, name: &str, enabled: bool) -> bool {
        let id = self.state.read().by_name.get(name).cloned();
        match id {
            Some(id) => self.set_tool_enabled(&id, enabled),
            None => false,
        }
    }

    /// Gate for tool calls: the tool must exist and be enabled
    pub fn ensure_callable(&self, name: &str) -> McpResult<String> {
        let state = self.state.read();
        let tool = state
            .by_name
            .get(name)
            .and_then(|id| state.tools.get(id))
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;
        if !tool.is_enabled {
            return Err(McpError::ToolDisabled(name.to_string()));
        }
        Ok(tool.id.clone())
    }

    /// Fold one execution into the tool's telemetry; false if the id is unknown
    pub fn record_execution(
        &self,
        id: &str,
        context: &ExecutionContext,
        result: &ExecutionResult,
    ) -> bool {
        let mut state = self.state.write();
        let Some(tool) = state.tools.get_mut(id) else {
            return false;
        };

        tool.usage_count += 1;
        if result.success {
            let sample = result.execution_time.as_secs_f64() * 1000.0;
            tool.average_execution_time =
                running_mean(tool.average_execution_time, sample, tool.success_count());
        } else {
            tool.error_count += 1;
            if let Some(error) = &result.error {
                debug!("Tool '{}' execution failed: {}", tool.name, error);
            }
        }
        tool.last_used_at = Some(context.started_at);
        true
    }

    pub fn get_registry_statistics(&self) -> RegistryStatistics {
        let state = self.state.read();
        let mut stats = RegistryStatistics {
            total_tools: state.tools.len(),
            ..RegistryStatistics::default()
        };

        for tool in state.tools.values() {
            if tool.is_loaded {
                stats.loaded_tools += 1;
            }
            if tool.is_enabled {
                stats.enabled_tools += 1;
            }
            if let Some(category) = &tool.category {
                *stats.categories.entry(category.clone()).or_default() += 1;
            }
            for tag in &tool.tags {
                *stats.tags.entry(tag.clone()).or_default() += 1;
            }
            stats.total_executions += tool.usage_count;
            stats.total_errors += tool.error_count;
        }
        stats
    }

    /// Bring the registry in line with a fresh remote listing. Safe to run
    /// repeatedly: known names keep their ids, missing names are removed.
    pub fn sync(&self, descriptors: Vec<ToolDescriptor>) -> SyncReport {
        let previous: HashSet<String> = self.state.read().by_name.keys().cloned().collect();
        let mut current = HashSet::with_capacity(descriptors.len());
        let mut report = SyncReport::default();

        for descriptor in descriptors {
            let name = descriptor.name.clone();
            match self.register(descriptor, RegisterOptions::overwrite()) {
                Ok((_, RegisterOutcome::Registered)) => report.registered.push(name.clone()),
                Ok((_, RegisterOutcome::Updated)) => report.updated.push(name.clone()),
                Ok((_, RegisterOutcome::Unchanged)) => {}
                Err(e) => {
                    debug!("Skipping advertised tool '{}': {}", name, e);
                    continue;
                }
            }
            current.insert(name);
        }

        let mut stale: Vec<&String> = previous.difference(&current).collect();
        stale.sort();
        for name in stale {
            let id = self.state.read().by_name.get(name).cloned();
            if let Some(id) = id {
                self.unregister_tool(&id);
                report.removed.push(name.clone());
            }
        }

        info!(
            "Tool sync: {} registered, {} updated, {} removed",
            report.registered.len(),
            report.updated.len(),
            report.removed.len()
        );
        report
    }

    pub fn len(&self) -> usize {
        self.state.read().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every tool and every remembered disable
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.tools.clear();
        state.by_name.clear();
        state.disabled.clear();
        state.retired.clear();
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
