use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::logic::rules::IdentityRules;
use crate::model::{Context, ContextData, Instance, Scene, ValidationOutcome};
use crate::store::traits::Store;

/// Plugin order values. Plugins run in ascending order.
pub mod order {
    pub const COLLECTOR: f64 = 0.0;
    pub const VALIDATOR: f64 = 1.0;
    pub const EXTRACTOR: f64 = 2.0;
    pub const INTEGRATOR: f64 = 3.0;

    /// Checks on pipeline data (ids, asset links).
    pub const VALIDATE_PIPELINE: f64 = VALIDATOR + 0.05;
    /// Checks on scene content.
    pub const VALIDATE_CONTENTS: f64 = VALIDATOR;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Collector,
    Validator,
    Extractor,
    Integrator,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Collector,
        Stage::Validator,
        Stage::Extractor,
        Stage::Integrator,
    ];

    /// Stage an order value falls into; each stage spans its base value ±0.5.
    pub fn of(order: f64) -> Stage {
        if order < order::VALIDATOR - 0.5 {
            Stage::Collector
        } else if order < order::EXTRACTOR - 0.5 {
            Stage::Validator
        } else if order < order::INTEGRATOR - 0.5 {
            Stage::Extractor
        } else {
            Stage::Integrator
        }
    }
}

/// User-facing actions a plugin offers on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SelectInvalid,
    Repair,
}

/// Registration data shared by every plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub label: String,
    pub order: f64,
    /// Instance families the plugin applies to; `*` matches any.
    pub families: Vec<String>,
    /// Hosts the plugin supports; empty means all.
    pub hosts: Vec<String>,
    /// Optional plugins can be switched off per instance.
    pub optional: bool,
    pub enabled: bool,
    pub actions: Vec<ActionKind>,
}

impl PluginInfo {
    pub fn new(label: &str, order: f64) -> Self {
        Self {
            label: label.to_string(),
            order,
            families: vec!["*".to_string()],
            hosts: Vec::new(),
            optional: false,
            enabled: true,
            actions: Vec::new(),
        }
    }

    pub fn families(mut self, families: &[&str]) -> Self {
        self.families = families.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn hosts(mut self, hosts: &[&str]) -> Self {
        self.hosts = hosts.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn actions(mut self, actions: &[ActionKind]) -> Self {
        self.actions = actions.to_vec();
        self
    }

    pub fn stage(&self) -> Stage {
        Stage::of(self.order)
    }

    pub fn supports_host(&self, host: &str) -> bool {
        self.hosts.is_empty() || self.hosts.iter().any(|h| h == host)
    }

    pub fn matches_families(&self, families: &[String]) -> bool {
        self.families
            .iter()
            .any(|f| f == "*" || families.iter().any(|instance_family| instance_family == f))
    }

    pub fn has_action(&self, action: ActionKind) -> bool {
        self.actions.contains(&action)
    }

    /// Whether this plugin should process the given instance.
    pub fn applies_to(&self, instance: &Instance) -> bool {
        if !instance.is_active() || !self.matches_families(&instance.families()) {
            return false;
        }
        !self.optional || instance.is_plugin_active(&self.label)
    }
}

/// Everything a plugin may touch besides the context itself.
pub struct PublishEnv<'a> {
    pub scene: &'a dyn Scene,
    pub store: &'a dyn Store,
    pub rules: IdentityRules,
    pub host: String,
}

impl<'a> PublishEnv<'a> {
    pub fn new(
        scene: &'a dyn Scene,
        store: &'a dyn Store,
        rules: IdentityRules,
        host: &str,
    ) -> Self {
        Self {
            scene,
            store,
            rules,
            host: host.to_string(),
        }
    }
}

/// A plugin processing the whole context once.
#[async_trait::async_trait]
pub trait ContextPlugin: Send + Sync {
    fn info(&self) -> &PluginInfo;

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        context: &mut Context,
    ) -> Result<(), PublishError>;
}

/// A plugin processing one instance at a time.
#[async_trait::async_trait]
pub trait InstancePlugin: Send + Sync {
    fn info(&self) -> &PluginInfo;

    async fn process(
        &self,
        env: &PublishEnv<'_>,
        instance: &mut Instance,
        data: &mut ContextData,
    ) -> Result<ValidationOutcome, PublishError>;

    /// Fix what `process` reported. Returns the names of changed nodes.
    async fn repair(
        &self,
        _env: &PublishEnv<'_>,
        _instance: &Instance,
        _data: &mut ContextData,
    ) -> Result<Vec<String>, PublishError> {
        Ok(Vec::new())
    }
}

pub enum Plugin {
    Context(Box<dyn ContextPlugin>),
    Instance(Box<dyn InstancePlugin>),
}

impl Plugin {
    pub fn context<P: ContextPlugin + 'static>(plugin: P) -> Self {
        Plugin::Context(Box::new(plugin))
    }

    pub fn instance<P: InstancePlugin + 'static>(plugin: P) -> Self {
        Plugin::Instance(Box::new(plugin))
    }

    pub fn info(&self) -> &PluginInfo {
        match self {
            Plugin::Context(plugin) => plugin.info(),
            Plugin::Instance(plugin) => plugin.info(),
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Plugin").field(&self.info().label).finish()
    }
}
