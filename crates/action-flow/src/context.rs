//! Per-test execution context and the per-device session that builds it

use std::sync::Arc;

use action_gate::{DefaultWatcher, Watcher};
use action_locator::{ElementResolver, HealingConfig, LocatorCatalog, LocatorResolver, SelectorTransformer};
use action_primitives::{ActionDispatcher, DefaultActionDispatcher, DispatchSettings};
use device_adapter::{Backend, DeviceAdapter, DeviceId};
use mobiflow_core_types::RunId;
use tokio_util::sync::CancellationToken;

use crate::errors::FlowError;
use crate::types::{ExecutionDefaults, StepResult};

/// Everything one test invocation needs. Owned by a single executor call.
pub struct ExecutionContext {
    pub run_id: RunId,
    pub device_id: DeviceId,
    pub backend: Backend,
    pub resolver: Arc<dyn ElementResolver>,
    pub catalog: Arc<LocatorCatalog>,
    pub dispatcher: Arc<dyn ActionDispatcher>,
    pub watcher: Arc<dyn Watcher>,
    pub defaults: ExecutionDefaults,
    pub cancel: CancellationToken,
    results: Vec<StepResult>,
}

impl ExecutionContext {
    pub fn record(&mut self, result: StepResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn take_results(&mut self) -> Vec<StepResult> {
        std::mem::take(&mut self.results)
    }
}

/// A connected device plus the configuration every test on it shares.
#[derive(Clone)]
pub struct DeviceSession {
    pub device_id: DeviceId,
    adapter: Arc<dyn DeviceAdapter>,
    catalog: Arc<LocatorCatalog>,
    transformer: SelectorTransformer,
    healing: HealingConfig,
    defaults: ExecutionDefaults,
    dispatch: DispatchSettings,
}

impl DeviceSession {
    pub fn new(
        device_id: DeviceId,
        adapter: Arc<dyn DeviceAdapter>,
        catalog: Arc<LocatorCatalog>,
        healing: HealingConfig,
        defaults: ExecutionDefaults,
    ) -> Result<Self, FlowError> {
        healing.validate()?;
        Ok(Self {
            device_id,
            adapter,
            catalog,
            transformer: SelectorTransformer::new(),
            healing,
            defaults,
            dispatch: DispatchSettings::default(),
        })
    }

    pub fn with_transformer(mut self, transformer: SelectorTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_dispatch_settings(mut self, settings: DispatchSettings) -> Self {
        self.dispatch = settings;
        self
    }

    pub fn backend(&self) -> Backend {
        self.adapter.backend()
    }

    pub fn defaults(&self) -> &ExecutionDefaults {
        &self.defaults
    }

    /// Fresh resolver, dispatcher and watcher for one test.
    pub fn context(&self, run_id: RunId, cancel: CancellationToken) -> Result<ExecutionContext, FlowError> {
        let resolver: Arc<dyn ElementResolver> = Arc::new(LocatorResolver::new(
            self.adapter.clone(),
            self.transformer.clone(),
            &self.healing,
        )?);
        let dispatcher = DefaultActionDispatcher::new(resolver.clone(), self.catalog.clone())
            .with_settings(self.dispatch.clone());
        let watcher = DefaultWatcher::new(resolver.clone(), self.catalog.clone());

        Ok(ExecutionContext {
            run_id,
            device_id: self.device_id.clone(),
            backend: self.backend(),
            resolver,
            catalog: self.catalog.clone(),
            dispatcher: Arc::new(dispatcher),
            watcher: Arc::new(watcher),
            defaults: self.defaults.clone(),
            cancel,
            results: Vec::new(),
        })
    }
}
