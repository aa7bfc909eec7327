use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::PublishError;
use crate::logic::plugin::{ActionKind, Plugin, PluginInfo, PublishEnv, Stage};
use crate::logic::plugins::default_plugins;
use crate::logic::repair;
use crate::model::{
    Context, InstanceState, InstanceSummary, PluginResult, PluginStatus, PublishReport,
    ValidationOutcome,
};

/// Nodes changed by one repair action on one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairedInstance {
    pub plugin: String,
    pub instance: String,
    pub nodes: Vec<String>,
}

/// A repair action that could not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairFailure {
    pub plugin: String,
    pub instance: String,
    pub error: String,
}

impl RepairFailure {
    fn new(plugin: &str, instance: &str, error: &PublishError) -> Self {
        Self {
            plugin: plugin.to_string(),
            instance: instance.to_string(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub repaired: Vec<RepairedInstance>,
    /// Failed plugins that offer no repair action.
    pub unrepairable: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RepairFailure>,
}

impl RepairSummary {
    pub fn changed_nodes(&self) -> usize {
        self.repaired.iter().map(|r| r.nodes.len()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs plugins over a context stage by stage, in ascending order.
#[derive(Debug)]
pub struct PublishPipeline {
    plugins: Vec<Plugin>,
}

impl PublishPipeline {
    pub fn new(mut plugins: Vec<Plugin>) -> Self {
        plugins.sort_by(|a, b| a.info().order.total_cmp(&b.info().order));
        Self { plugins }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(default_plugins(config))
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn plugin(&self, label: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.info().label == label)
    }

    /// Full publish run. Extraction and integration only happen when no
    /// validator failed; a fatal error stops the run where it happened.
    pub async fn run(&self, env: &PublishEnv<'_>, context: &mut Context) -> PublishReport {
        self.run_until(env, context, Stage::Integrator).await
    }

    /// Like [`PublishPipeline::run`], stopping after `last`.
    pub async fn run_until(
        &self,
        env: &PublishEnv<'_>,
        context: &mut Context,
        last: Stage,
    ) -> PublishReport {
        let mut report = PublishReport::new(context.project_name().unwrap_or_default());

        for stage in Stage::ALL.into_iter().filter(|s| *s <= last) {
            if stage >= Stage::Extractor && !report.success() {
                warn!("Validation failed, skipping {:?} stage", stage);
                break;
            }
            if let Err(e) = self.run_stage(env, context, stage, &mut report).await {
                error!("Publish aborted: {}", e);
                report.aborted = Some(e.to_string());
                break;
            }
        }

        summarize(&mut report, context);
        report
    }

    /// Re-run only the validators on an already collected context, e.g.
    /// after a repair.
    pub async fn validate(&self, env: &PublishEnv<'_>, context: &mut Context) -> PublishReport {
        let mut report = PublishReport::new(context.project_name().unwrap_or_default());
        if let Err(e) = self.run_stage(env, context, Stage::Validator, &mut report).await {
            error!("Validation aborted: {}", e);
            report.aborted = Some(e.to_string());
        }
        summarize(&mut report, context);
        report
    }

    async fn run_stage(
        &self,
        env: &PublishEnv<'_>,
        context: &mut Context,
        stage: Stage,
        report: &mut PublishReport,
    ) -> Result<(), PublishError> {
        debug!("Running {:?} stage", stage);
        if stage == Stage::Validator {
            for instance in context.instances.iter_mut().filter(|i| i.is_active()) {
                instance.begin_validation();
            }
        }

        let result = self.run_plugins(env, context, stage, report).await;

        if stage == Stage::Validator {
            for instance in context.instances.iter_mut() {
                if instance.state != InstanceState::Validating {
                    continue;
                }
                let failed = report.results.iter().any(|r| {
                    r.status.is_failure() && r.instance.as_deref() == Some(instance.name.as_str())
                });
                if !failed && result.is_err() {
                    // Remaining validators never ran.
                    warn!("Instance '{}' left unvalidated", instance.name);
                    continue;
                }
                instance.finish_validation(!failed);
                info!("Instance '{}' {}", instance.name, instance.state);
            }
        }
        result
    }

    async fn run_plugins(
        &self,
        env: &PublishEnv<'_>,
        context: &mut Context,
        stage: Stage,
        report: &mut PublishReport,
    ) -> Result<(), PublishError> {
        for plugin in self.plugins.iter().filter(|p| p.info().stage() == stage) {
            let info = plugin.info();
            if !info.enabled || !info.supports_host(&env.host) {
                debug!("Skipping plugin '{}'", info.label);
                report.results.push(result(info, None, PluginStatus::Skipped));
                continue;
            }

            match plugin {
                Plugin::Context(p) => {
                    debug!("Running '{}' on context", info.label);
                    match p.process(env, context).await {
                        Ok(()) => report.results.push(result(info, None, PluginStatus::Passed)),
                        Err(e) => {
                            record_error(report, info, None, &e);
                            if e.is_fatal() {
                                return Err(e);
                            }
                        }
                    }
                }
                Plugin::Instance(p) => {
                    let Context { instances, data } = &mut *context;
                    for instance in instances.iter_mut() {
                        if !info.applies_to(instance) {
                            continue;
                        }
                        debug!("Running '{}' on '{}'", info.label, instance.name);
                        match p.process(env, instance, data).await {
                            Ok(outcome) => {
                                let status = if outcome.ok {
                                    PluginStatus::Passed
                                } else {
                                    error!("{}: {}", info.label, outcome.message);
                                    PluginStatus::Failed
                                };
                                let mut entry = result(info, Some(&instance.name), status);
                                entry.outcome = Some(outcome);
                                report.results.push(entry);
                            }
                            Err(e) => {
                                record_error(report, info, Some(&instance.name), &e);
                                if e.is_fatal() {
                                    return Err(e);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the repair action of every failed plugin, or only of `label`.
    /// Repaired instances wait in `Validating` for an explicit re-validation.
    /// An instance with an errored repair goes back to `Failed`; the other
    /// repairs still run and the error is kept in the summary.
    pub async fn repair(
        &self,
        env: &PublishEnv<'_>,
        context: &mut Context,
        report: &PublishReport,
        label: Option<&str>,
    ) -> RepairSummary {
        let mut summary = RepairSummary::default();
        let Context { instances, data } = context;

        for failure in report.failures() {
            if label.is_some_and(|l| l != failure.plugin) {
                continue;
            }
            let Some(instance_name) = failure.instance.as_deref() else {
                continue;
            };
            let repairable = match self.plugin(&failure.plugin) {
                Some(Plugin::Instance(p)) if p.info().has_action(ActionKind::Repair) => p,
                _ => {
                    if !summary.unrepairable.contains(&failure.plugin) {
                        summary.unrepairable.push(failure.plugin.clone());
                    }
                    continue;
                }
            };
            let Some(instance) = instances.iter_mut().find(|i| i.name == instance_name) else {
                warn!("Instance '{}' is no longer in the context", instance_name);
                continue;
            };

            if instance.state != InstanceState::Repairing {
                if let Err(e) = instance.begin_repair() {
                    summary.errors.push(RepairFailure::new(&failure.plugin, &instance.name, &e));
                    continue;
                }
            }
            info!("Repairing '{}' with '{}'", instance.name, failure.plugin);
            match repairable.repair(env, instance, data).await {
                Ok(nodes) => summary.repaired.push(RepairedInstance {
                    plugin: failure.plugin.clone(),
                    instance: instance.name.clone(),
                    nodes,
                }),
                Err(e) => {
                    error!("Repair '{}' on '{}' failed: {}", failure.plugin, instance.name, e);
                    summary.errors.push(RepairFailure::new(&failure.plugin, &instance.name, &e));
                }
            }
        }

        for instance in instances.iter_mut() {
            if instance.state != InstanceState::Repairing {
                continue;
            }
            if summary.errors.iter().any(|e| e.instance == instance.name) {
                instance.abandon_repair();
            } else {
                instance.finish_repair();
            }
        }
        info!("Repair changed {} nodes", summary.changed_nodes());
        summary
    }

    /// Select the nodes a plugin reported invalid for an instance.
    pub fn select_invalid(
        &self,
        env: &PublishEnv<'_>,
        report: &PublishReport,
        label: &str,
        instance: &str,
    ) -> Vec<String> {
        let offers_selection = self
            .plugin(label)
            .is_some_and(|p| p.info().has_action(ActionKind::SelectInvalid));
        if !offers_selection {
            return Vec::new();
        }
        let invalid = report
            .failure_for(label, instance)
            .map(|outcome| outcome.invalid.clone())
            .unwrap_or_default();
        repair::select_invalid(env.scene, &invalid);
        invalid
    }
}

fn result(info: &PluginInfo, instance: Option<&str>, status: PluginStatus) -> PluginResult {
    PluginResult {
        plugin: info.label.clone(),
        order: info.order,
        instance: instance.map(str::to_string),
        status,
        outcome: None,
        error: None,
    }
}

fn record_error(
    report: &mut PublishReport,
    info: &PluginInfo,
    instance: Option<&str>,
    e: &PublishError,
) {
    let mut entry = match e {
        PublishError::Validation {
            message,
            invalid,
            details,
        } => {
            let mut entry = result(info, instance, PluginStatus::Failed);
            entry.outcome = Some(ValidationOutcome::fail(
                message.clone(),
                invalid.clone(),
                details.clone(),
            ));
            entry
        }
        _ => result(info, instance, PluginStatus::Errored),
    };
    entry.error = Some(e.to_string());
    report.results.push(entry);
}

fn summarize(report: &mut PublishReport, context: &Context) {
    report.instances = context
        .iter()
        .map(|instance| InstanceSummary {
            name: instance.name.clone(),
            family: instance.family().map(str::to_string),
            state: instance.state,
        })
        .collect();
}
