//! Compiled deployment model consumed by the executor.
//!
//! A deployment is external input: an ordered step-name → step-config mapping
//! plus resolved global configuration, produced by the pipeline compiler.
//! This module models that contract read-only; step order is fixed and total
//! and is never recomputed here.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Schedule attached to a deployment by the pipeline author.
///
/// Carried only so the executor can detect it; this backend does not
/// implement scheduling and downgrades any schedule to an immediate run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Cron expression, if the schedule is recurring.
    pub cron_expression: Option<String>,
    /// Start time, if the schedule is a one-shot run.
    pub start_time: Option<DateTime<Utc>>,
}

/// Resource hints declared on a step.
///
/// Observed but intentionally not enforced on this backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSettings {
    pub cpu_count: Option<f64>,
    pub memory_mb: Option<u64>,
    pub gpu_count: Option<u32>,
}

impl ResourceSettings {
    /// Returns true when no resource requirement is declared.
    pub fn is_empty(&self) -> bool {
        self.cpu_count.is_none() && self.memory_mb.is_none() && self.gpu_count.is_none()
    }
}

/// Resolved configuration of one pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Resolved container image reference for this step.
    pub image: String,
    /// Resource hints; warned about and ignored on this backend.
    #[serde(default)]
    pub resources: ResourceSettings,
    /// Raw extra container-runtime options: a mapping, or a JSON-encoded
    /// string when supplied as a CLI override. Resolved at spec build time.
    #[serde(default)]
    pub settings: Option<Value>,
}

impl StepConfig {
    /// Creates a step configuration for the given image.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            resources: ResourceSettings::default(),
            settings: None,
        }
    }

    /// Builder method to set resource hints.
    pub fn with_resources(mut self, resources: ResourceSettings) -> Self {
        self.resources = resources;
        self
    }

    /// Builder method to set the raw run-args settings payload.
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// A compiled, ready-to-execute pipeline.
///
/// The step map preserves insertion order; iteration order is execution
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique id of this deployment.
    pub id: Uuid,
    /// Name of the pipeline this deployment was compiled from.
    pub pipeline_name: String,
    /// Optional schedule; ignored (with a warning) by this backend.
    #[serde(default)]
    pub schedule: Option<Schedule>,
    /// Ordered step-name → step-config mapping.
    pub steps: IndexMap<String, StepConfig>,
}

impl Deployment {
    /// Creates an empty deployment for the given pipeline.
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            schedule: None,
            steps: IndexMap::new(),
        }
    }

    /// Builder method to append a step. Steps execute in insertion order.
    pub fn with_step(mut self, name: impl Into<String>, config: StepConfig) -> Self {
        self.steps.insert(name.into(), config);
        self
    }

    /// Builder method to attach a schedule.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }
}
