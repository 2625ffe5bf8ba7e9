//! Process-wide plan cache
//!
//! Plans are compiled lazily, once per (contract, method), and kept for the
//! life of the registry. Compilation runs outside the locks; when two threads
//! race on the same key both may compile, the first to publish wins and every
//! caller observes that plan from then on.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use sproc_core::Result;

use crate::analyzer;
use crate::compiler;
use crate::config::ProxyConfig;
use crate::describe::{Contract, ContractDescription, MethodSignature};
use crate::plan::ProcedureCallPlan;

/// Process-wide registry using the default configuration
static GLOBAL_REGISTRY: LazyLock<Arc<PlanRegistry>> =
    LazyLock::new(|| Arc::new(PlanRegistry::with_config(ProxyConfig::default())));

type PlanKey = (TypeId, String);

/// Compiled plans of one contract, keyed by method name
#[derive(Debug)]
pub struct DispatchTable {
    contract: String,
    methods: HashMap<String, Arc<ProcedureCallPlan>>,
}

impl DispatchTable {
    /// Contract name
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Plan for `method`
    pub fn get(&self, method: &str) -> Option<&Arc<ProcedureCallPlan>> {
        self.methods.get(method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Method names in no particular order
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Cache of compiled call plans and per-contract dispatch tables
#[derive(Debug)]
pub struct PlanRegistry {
    config: ProxyConfig,
    plans: RwLock<HashMap<PlanKey, Arc<ProcedureCallPlan>>>,
    tables: RwLock<HashMap<TypeId, Arc<DispatchTable>>>,
}

impl PlanRegistry {
    /// Create an empty registry with its own naming rules.
    ///
    /// Fails with [`SprocError::Configuration`](sproc_core::SprocError) when
    /// `config` does not validate.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: ProxyConfig) -> Self {
        Self {
            config,
            plans: RwLock::new(HashMap::new()),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry
    pub fn global() -> Arc<PlanRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Dispatch table for contract `C`, compiling every method on first use
    pub fn dispatch_table<C: Contract + ?Sized>(&self) -> Result<Arc<DispatchTable>> {
        let key = TypeId::of::<C>();
        if let Some(table) = self.tables.read().get(&key) {
            return Ok(Arc::clone(table));
        }

        let description = C::describe();
        let table = Arc::new(self.build_table(key, &description)?);

        let mut tables = self.tables.write();
        let published = tables.entry(key).or_insert_with(|| {
            tracing::debug!(
                contract = %description.name,
                methods = table.len(),
                "published dispatch table"
            );
            Arc::clone(&table)
        });
        Ok(Arc::clone(published))
    }

    /// Plan for one method of the contract identified by `contract`
    #[tracing::instrument(level = "debug", skip(self, description, method), fields(contract = %description.name, method = %method.name))]
    pub fn plan(
        &self,
        contract: TypeId,
        description: &ContractDescription,
        method: &MethodSignature,
    ) -> Result<Arc<ProcedureCallPlan>> {
        let key: PlanKey = (contract, method.name.clone());
        if let Some(plan) = self.plans.read().get(&key) {
            return Ok(Arc::clone(plan));
        }

        let analyzed = analyzer::analyze(&self.config, &description.name, method)?;
        let compiled = Arc::new(compiler::compile(&analyzed));

        let mut plans = self.plans.write();
        let published = plans.entry(key).or_insert_with(|| Arc::clone(&compiled));
        if Arc::ptr_eq(published, &compiled) {
            tracing::debug!(
                procedure = %compiled.command_text(),
                parameters = compiled.bindings.len(),
                "compiled call plan"
            );
        } else {
            tracing::warn!(
                procedure = %compiled.command_text(),
                "discarding plan compiled by a racing caller"
            );
        }
        Ok(Arc::clone(published))
    }

    /// Number of cached plans
    pub fn plan_count(&self) -> usize {
        self.plans.read().len()
    }

    fn build_table(
        &self,
        contract: TypeId,
        description: &ContractDescription,
    ) -> Result<DispatchTable> {
        analyzer::check_contract(description)?;

        let mut methods = HashMap::with_capacity(description.methods.len());
        for method in &description.methods {
            let plan = self.plan(contract, description, method)?;
            methods.insert(method.name.clone(), plan);
        }

        Ok(DispatchTable {
            contract: description.name.clone(),
            methods,
        })
    }
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self::with_config(ProxyConfig::default())
    }
}
