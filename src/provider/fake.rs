//! # Fake Load Balancer API
//!
//! Deterministic in-memory cloud used by unit and integration tests.
//!
//! Every call is recorded in order. Failures can be queued per operation, and
//! `create_load_balancer` can be made to report success with an unusable
//! result (no id, no address).

use super::{
    AdapterError, CloudClientFactory, LoadBalancer, LoadBalancerApi, LoadBalancerConfig,
    LoadBalancerConfigSpec, LoadBalancerSpec,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// A recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBalancerCall {
    Create { label: String },
    Get { id: i64 },
    Find { label: String },
    CreateConfig { load_balancer_id: i64, port: i32 },
    Delete { id: i64 },
}

impl LoadBalancerCall {
    fn operation(&self) -> &'static str {
        match self {
            LoadBalancerCall::Create { .. } => "create_load_balancer",
            LoadBalancerCall::Get { .. } => "get_load_balancer",
            LoadBalancerCall::Find { .. } => "find_load_balancer",
            LoadBalancerCall::CreateConfig { .. } => "create_load_balancer_config",
            LoadBalancerCall::Delete { .. } => "delete_load_balancer",
        }
    }
}

#[derive(Debug, Default)]
struct State {
    load_balancers: BTreeMap<i64, LoadBalancer>,
    configs: BTreeMap<i64, LoadBalancerConfig>,
    next_id: i64,
    calls: Vec<LoadBalancerCall>,
    failures: HashMap<&'static str, VecDeque<AdapterError>>,
    unusable_create: bool,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Record the call and pop a queued failure for its operation
    fn enter(&mut self, call: LoadBalancerCall) -> Result<(), AdapterError> {
        let operation = call.operation();
        self.calls.push(call);
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory load balancer API
#[derive(Debug, Default)]
pub struct FakeLoadBalancerApi {
    state: Mutex<State>,
}

impl FakeLoadBalancerApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an existing load balancer
    pub fn insert_load_balancer(&self, lb: LoadBalancer) {
        let mut state = self.lock();
        state.next_id = state.next_id.max(lb.id);
        state.load_balancers.insert(lb.id, lb);
    }

    /// Queue a failure for the next call of `operation`, e.g. `"create_load_balancer"`
    pub fn fail_next(&self, operation: &'static str, err: AdapterError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    /// Make `create_load_balancer` succeed without an id or address
    pub fn return_unusable_load_balancer(&self) {
        self.lock().unusable_create = true;
    }

    /// All calls received so far, in order
    pub fn calls(&self) -> Vec<LoadBalancerCall> {
        self.lock().calls.clone()
    }

    /// Number of calls received for `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    pub fn load_balancer(&self, id: i64) -> Option<LoadBalancer> {
        self.lock().load_balancers.get(&id).cloned()
    }

    pub fn load_balancer_count(&self) -> usize {
        self.lock().load_balancers.len()
    }

    pub fn configs_for(&self, load_balancer_id: i64) -> Vec<LoadBalancerConfig> {
        self.lock()
            .configs
            .values()
            .filter(|c| c.load_balancer_id == load_balancer_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LoadBalancerApi for FakeLoadBalancerApi {
    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerSpec,
    ) -> Result<LoadBalancer, AdapterError> {
        let mut state = self.lock();
        state.enter(LoadBalancerCall::Create {
            label: spec.label.clone(),
        })?;

        if state.unusable_create {
            return Ok(LoadBalancer {
                label: spec.label.clone(),
                region: spec.region.clone(),
                ..Default::default()
            });
        }

        let id = state.next_id();
        let lb = LoadBalancer {
            id,
            label: spec.label.clone(),
            region: spec.region.clone(),
            ipv4: Some(format!("192.0.2.{}", id % 250 + 1)),
            tags: spec.tags.clone(),
        };
        state.load_balancers.insert(id, lb.clone());
        Ok(lb)
    }

    async fn get_load_balancer(&self, id: i64) -> Result<LoadBalancer, AdapterError> {
        let mut state = self.lock();
        state.enter(LoadBalancerCall::Get { id })?;
        state
            .load_balancers
            .get(&id)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(format!("load balancer {id}")))
    }

    async fn find_load_balancer(&self, label: &str) -> Result<Option<LoadBalancer>, AdapterError> {
        let mut state = self.lock();
        state.enter(LoadBalancerCall::Find {
            label: label.to_string(),
        })?;
        Ok(state
            .load_balancers
            .values()
            .find(|lb| lb.label == label)
            .cloned())
    }

    async fn create_load_balancer_config(
        &self,
        load_balancer_id: i64,
        spec: &LoadBalancerConfigSpec,
    ) -> Result<LoadBalancerConfig, AdapterError> {
        let mut state = self.lock();
        state.enter(LoadBalancerCall::CreateConfig {
            load_balancer_id,
            port: spec.port,
        })?;
        if !state.load_balancers.contains_key(&load_balancer_id) {
            return Err(AdapterError::NotFound(format!(
                "load balancer {load_balancer_id}"
            )));
        }

        let id = state.next_id();
        let config = LoadBalancerConfig {
            id,
            load_balancer_id,
            port: spec.port,
        };
        state.configs.insert(id, config.clone());
        Ok(config)
    }

    async fn delete_load_balancer(&self, id: i64) -> Result<(), AdapterError> {
        let mut state = self.lock();
        state.enter(LoadBalancerCall::Delete { id })?;
        if state.load_balancers.remove(&id).is_none() {
            return Err(AdapterError::NotFound(format!("load balancer {id}")));
        }
        state.configs.retain(|_, c| c.load_balancer_id != id);
        Ok(())
    }
}

/// Factory handing out a shared [`FakeLoadBalancerApi`] and recording the tokens it was given
#[derive(Debug, Default)]
pub struct FakeCloudClientFactory {
    api: Arc<FakeLoadBalancerApi>,
    tokens: Mutex<Vec<String>>,
}

impl FakeCloudClientFactory {
    pub fn new(api: Arc<FakeLoadBalancerApi>) -> Self {
        Self {
            api,
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn api(&self) -> Arc<FakeLoadBalancerApi> {
        Arc::clone(&self.api)
    }

    /// Tokens clients were built with, in order
    pub fn tokens(&self) -> Vec<String> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CloudClientFactory for FakeCloudClientFactory {
    fn client(&self, token: &str) -> Result<Arc<dyn LoadBalancerApi>, AdapterError> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(token.to_string());
        let api: Arc<dyn LoadBalancerApi> = self.api();
        Ok(api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LoadBalancerSpec {
        LoadBalancerSpec {
            label: "default-demo".to_string(),
            region: "us-ord".to_string(),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_queued_failure_is_returned_once() {
        let api = FakeLoadBalancerApi::new();
        api.fail_next(
            "create_load_balancer",
            AdapterError::Api {
                status: 429,
                message: "slow down".to_string(),
            },
        );

        assert!(api.create_load_balancer(&spec()).await.is_err());
        let lb = api.create_load_balancer(&spec()).await.unwrap();
        assert!(lb.id > 0);
        assert!(lb.ipv4.is_some());
        assert_eq!(api.call_count("create_load_balancer"), 2);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let api = FakeLoadBalancerApi::new();
        let err = api.delete_load_balancer(42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_configs() {
        let api = FakeLoadBalancerApi::new();
        let lb = api.create_load_balancer(&spec()).await.unwrap();
        api.create_load_balancer_config(lb.id, &LoadBalancerConfigSpec::tcp(6443))
            .await
            .unwrap();
        assert_eq!(api.configs_for(lb.id).len(), 1);

        api.delete_load_balancer(lb.id).await.unwrap();
        assert!(api.configs_for(lb.id).is_empty());
        assert_eq!(api.load_balancer_count(), 0);
    }
}
