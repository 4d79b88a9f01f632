//! Mock device for unit testing
//!
//! Holds the device configuration as a JSON tree and interprets `set` and
//! `delete` commands against it, so tests can observe the declarative effect
//! of a batch rather than its text. Batches are atomic: a batch that fails
//! leaves the tree untouched.
//!
//! Leaf nodes keep the last value written; multi-value nodes are not modelled.

use crate::error::DeviceApiError;
use crate::gateway_trait::DeviceGateway;
use crate::models::{DeviceRule, NAT_RULE_PATH};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use vyos_commands::syntax::tokenize;
use vyos_commands::{generate, Action, CommandBatch, DeviceEntity, PortForward};

/// Injected failure for batches containing `pattern`
#[derive(Debug, Clone)]
struct Failure {
    pattern: String,
    error: DeviceApiError,
    /// Apply the batch before returning the error (a lost response)
    after_apply: bool,
    /// `None` fails forever
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    config: Map<String, Value>,
    applied: Vec<CommandBatch>,
    submitted: Vec<CommandBatch>,
    failures: Vec<Failure>,
    fetch_failure: Option<DeviceApiError>,
}

/// Mock router for testing
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<State>>,
}

fn rejected(message: impl Into<String>) -> DeviceApiError {
    DeviceApiError::Rejected {
        status: None,
        message: message.into(),
    }
}

fn run_command(config: &mut Map<String, Value>, command: &str) -> Result<(), DeviceApiError> {
    let tokens = tokenize(command).map_err(|e| rejected(e.to_string()))?;
    let (verb, path) = tokens
        .split_first()
        .ok_or_else(|| rejected("empty command"))?;
    if path.is_empty() {
        return Err(rejected(format!("missing configuration path: {}", command)));
    }

    match verb.as_str() {
        "set" => {
            // A trailing `disable` is a valueless node; otherwise the last token is the value
            let (nodes, value) = if path.len() == 1 || path[path.len() - 1] == "disable" {
                (path, Value::Object(Map::new()))
            } else {
                let (value, nodes) = path.split_last().ok_or_else(|| rejected("empty path"))?;
                (nodes, Value::String(value.clone()))
            };
            let (leaf, parents) = nodes.split_last().ok_or_else(|| rejected("empty path"))?;
            let mut current = config;
            for key in parents {
                let entry = current
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                current = entry.as_object_mut().ok_or_else(|| rejected("invalid node"))?;
            }
            current.insert(leaf.clone(), value);
            Ok(())
        }
        "delete" => {
            if !remove_path(config, path) {
                return Err(rejected(format!(
                    "Nothing to delete (the specified node does not exist): {}",
                    path.join(" ")
                )));
            }
            Ok(())
        }
        other => Err(rejected(format!("unknown command verb: {}", other))),
    }
}

/// Remove the node at `path`, pruning parents left empty
fn remove_path(node: &mut Map<String, Value>, path: &[String]) -> bool {
    match path {
        [] => false,
        [leaf] => node.remove(leaf).is_some(),
        [head, rest @ ..] => {
            let Some(child) = node.get_mut(head).and_then(Value::as_object_mut) else {
                return false;
            };
            let removed = remove_path(child, rest);
            if removed && child.is_empty() {
                node.remove(head);
            }
            removed
        }
    }
}

impl MockDevice {
    /// Create an empty mock device
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a rule directly (for test setup); not recorded as applied
    pub fn insert_rule(&self, rule: &PortForward) {
        let batch = generate(&DeviceEntity::PortForward(rule.clone()), Action::Set)
            .unwrap_or_else(|e| panic!("invalid test rule: {}", e));
        self.run_commands(&batch.commands);
    }

    /// Run raw commands directly (for test setup); not recorded as applied
    pub fn run_commands(&self, commands: &[String]) {
        let mut state = self.lock();
        for command in commands {
            if let Err(e) = run_command(&mut state.config, command) {
                panic!("invalid test command {:?}: {}", command, e);
            }
        }
    }

    /// Fail every batch that has a command containing `pattern`
    pub fn fail_when(&self, pattern: impl Into<String>, error: DeviceApiError) {
        self.push_failure(pattern.into(), error, false, None);
    }

    /// Fail the next `times` batches that have a command containing `pattern`
    pub fn fail_times(&self, pattern: impl Into<String>, error: DeviceApiError, times: usize) {
        self.push_failure(pattern.into(), error, false, Some(times));
    }

    /// Apply matching batches, then report `error` as if the response was lost
    pub fn fail_after_apply(&self, pattern: impl Into<String>, error: DeviceApiError) {
        self.push_failure(pattern.into(), error, true, Some(1));
    }

    fn push_failure(&self, pattern: String, error: DeviceApiError, after_apply: bool, remaining: Option<usize>) {
        self.lock().failures.push(Failure {
            pattern,
            error,
            after_apply,
            remaining,
        });
    }

    /// Fail `fetch_nat_rules` until cleared
    pub fn fail_fetch(&self, error: Option<DeviceApiError>) {
        self.lock().fetch_failure = error;
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failures.clear();
        state.fetch_failure = None;
    }

    /// Batches that changed the configuration, in order
    pub fn applied(&self) -> Vec<CommandBatch> {
        self.lock().applied.clone()
    }

    /// Every batch received, including failed ones
    pub fn submitted(&self) -> Vec<CommandBatch> {
        self.lock().submitted.clone()
    }

    /// Forget the batch logs, keeping the configuration
    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.applied.clear();
        state.submitted.clear();
    }

    /// Current configuration tree
    pub fn config(&self) -> Value {
        Value::Object(self.lock().config.clone())
    }

    /// Current NAT rules, parsed the same way as a live fetch
    pub fn rules(&self) -> Vec<DeviceRule> {
        let data = nat_tree(&self.lock().config);
        DeviceRule::from_tree(&data).unwrap_or_default()
    }

    fn take_failure(state: &mut State, batch: &CommandBatch) -> Option<Failure> {
        let index = state.failures.iter().position(|f| {
            f.remaining != Some(0) && batch.commands.iter().any(|c| c.contains(&f.pattern))
        })?;
        let failure = &mut state.failures[index];
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(failure.clone())
    }
}

fn nat_tree(config: &Map<String, Value>) -> Value {
    let mut node = config;
    for key in NAT_RULE_PATH {
        match node.get(key).and_then(Value::as_object) {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    Value::Object(node.clone())
}

#[async_trait::async_trait]
impl DeviceGateway for MockDevice {
    fn base_url(&self) -> &str {
        "mock://device"
    }

    async fn apply(&self, batch: &CommandBatch) -> Result<(), DeviceApiError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut state = self.lock();
        state.submitted.push(batch.clone());

        let failure = Self::take_failure(&mut state, batch);
        if let Some(failure) = &failure {
            if !failure.after_apply {
                return Err(failure.error.clone());
            }
        }

        let mut candidate = state.config.clone();
        for command in &batch.commands {
            let verb = command.split_whitespace().next().unwrap_or_default();
            if verb != batch.op.as_str() {
                return Err(rejected(format!("command {:?} does not match op {}", command, batch.op)));
            }
            run_command(&mut candidate, command)?;
        }
        state.config = candidate;
        state.applied.push(batch.clone());

        match failure {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }

    async fn fetch_nat_rules(&self) -> Result<Vec<DeviceRule>, DeviceApiError> {
        let state = self.lock();
        if let Some(error) = &state.fetch_failure {
            return Err(error.clone());
        }
        DeviceRule::from_tree(&nat_tree(&state.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use vyos_commands::port_forward::delete_rule;
    use vyos_commands::{PortKind, Protocol};

    fn rule(number: u32, port: u16) -> PortForward {
        PortForward {
            rule_number: number,
            description: format!("vm1 {}", PortKind::Ssh.label()),
            inbound_interface: "eth0".to_string(),
            external_port: port,
            protocol: Protocol::Tcp,
            source_address: None,
            translation_address: Ipv4Addr::new(192, 168, 1, 10),
            translation_port: 22,
            disabled: false,
        }
    }

    fn set(rule: &PortForward) -> CommandBatch {
        generate(&DeviceEntity::PortForward(rule.clone()), Action::Set).unwrap()
    }

    #[tokio::test]
    async fn test_set_then_delete_leaves_no_trace() {
        let device = MockDevice::new();
        let before = device.config();

        device.apply(&set(&rule(10001, 2201))).await.unwrap();
        assert_eq!(device.fetch_nat_rules().await.unwrap().len(), 1);

        device.apply(&delete_rule(10001)).await.unwrap();
        assert_eq!(device.config(), before);
        assert_eq!(device.applied().len(), 2);
    }

    #[tokio::test]
    async fn test_set_is_an_overwrite() {
        let device = MockDevice::new();
        device.apply(&set(&rule(10001, 2201))).await.unwrap();
        device.apply(&set(&rule(10001, 2205))).await.unwrap();
        let rules = device.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].destination_port, Some(2205));
    }

    #[tokio::test]
    async fn test_disable_and_enable() {
        let device = MockDevice::new();
        let entity = DeviceEntity::PortForward(rule(10001, 2201));
        device.apply(&set(&rule(10001, 2201))).await.unwrap();

        device.apply(&generate(&entity, Action::Disable).unwrap()).await.unwrap();
        assert!(device.rules()[0].disabled);

        device.apply(&generate(&entity, Action::Enable).unwrap()).await.unwrap();
        assert!(!device.rules()[0].disabled);
        assert_eq!(device.rules()[0].destination_port, Some(2201));
    }

    #[tokio::test]
    async fn test_delete_of_missing_rule_is_rejected() {
        let device = MockDevice::new();
        let err = device.apply(&delete_rule(10009)).await.unwrap_err();
        assert!(matches!(err, DeviceApiError::Rejected { .. }));
        assert!(device.applied().is_empty());
        assert_eq!(device.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_batch_is_atomic() {
        let device = MockDevice::new();
        let mut batch = set(&rule(10001, 2201));
        batch.commands.push("set nat destination rule 10001 description 'unterminated".to_string());
        assert!(device.apply(&batch).await.is_err());
        assert!(device.rules().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let device = MockDevice::new();
        device.fail_times("rule 10001", DeviceApiError::Transport("timeout".to_string()), 1);
        assert!(device.apply(&set(&rule(10001, 2201))).await.unwrap_err().is_indeterminate());
        assert!(device.rules().is_empty());
        device.apply(&set(&rule(10001, 2201))).await.unwrap();

        device.fail_after_apply("rule 10002", DeviceApiError::Transport("lost".to_string()));
        assert!(device.apply(&set(&rule(10002, 2202))).await.is_err());
        assert_eq!(device.rules().len(), 2);

        device.fail_fetch(Some(DeviceApiError::Transport("down".to_string())));
        assert!(device.fetch_nat_rules().await.is_err());
        device.clear_failures();
        assert_eq!(device.fetch_nat_rules().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_op_must_match_verbs() {
        let device = MockDevice::new();
        let mut batch = delete_rule(10001);
        batch.op = vyos_commands::Op::Set;
        assert!(device.apply(&batch).await.is_err());
    }
}
