//! Declare-then-run pipeline construction.
//!
//! A [`PipelineBuilder`] accumulates [`OperationSpec`]s. Declaring never
//! touches file data; it only checks the capability name (and keyword names
//! where the capability restricts them). [`PipelineBuilder::freeze`] consumes
//! the builder, runs the pre-flight column check and returns an immutable
//! [`Pipeline`] that can be shared by any number of workers.
//!
//! ```ignore
//! let mut builder = PipelineBuilder::standard();
//! builder.level()?.parameter("Sa", Arguments::new())?.alias("Sa_leveled")?;
//! let pipeline = builder.freeze()?;
//! ```

use super::compiled_plan::CompiledPlan;
use super::compiler::PipelineCompiler;
use super::operation::OperationSpec;
use crate::error::{BatchError, Result};
use crate::params::AdditionalParams;
use crate::surface::CapabilitySet;
use crate::types::Arguments;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Serialized form of a pipeline.
#[derive(Debug, Serialize, Deserialize)]
struct PipelineDescriptor {
    steps: Vec<OperationSpec>,
}

/// Pipeline in the building state. Append-only.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    capabilities: Arc<CapabilitySet>,
    steps: Vec<OperationSpec>,
}

impl PipelineBuilder {
    pub fn new(capabilities: Arc<CapabilitySet>) -> Self {
        Self {
            capabilities,
            steps: Vec::new(),
        }
    }

    /// Builder over [`CapabilitySet::standard`].
    pub fn standard() -> Self {
        Self::new(Arc::new(CapabilitySet::standard()))
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn steps(&self) -> &[OperationSpec] {
        &self.steps
    }

    /// Append one step. The result arity comes from the capability set.
    pub fn declare(&mut self, name: &str, arguments: Arguments) -> Result<&mut Self> {
        let descriptor = self.capabilities.get(name).ok_or_else(|| {
            BatchError::config(format!("Unknown capability '{}'", name))
        })?;
        if let Some(key) = arguments
            .keyword
            .keys()
            .find(|k| !descriptor.accepts_keyword(k))
        {
            return Err(BatchError::config(format!(
                "Capability '{}' does not accept keyword '{}'",
                name, key
            )));
        }
        let spec = OperationSpec::new(name, arguments, descriptor.arity.clone());
        tracing::debug!(
            "Declared step {}: {}({})",
            self.steps.len(),
            name,
            spec.arguments.canonical()
        );
        self.steps.push(spec);
        Ok(self)
    }

    // ── Structural operations ──

    pub fn zero(&mut self) -> Result<&mut Self> {
        self.declare("zero", Arguments::new())
    }

    pub fn center(&mut self) -> Result<&mut Self> {
        self.declare("center", Arguments::new())
    }

    /// Least-squares plane removal.
    pub fn level(&mut self) -> Result<&mut Self> {
        self.declare("level", Arguments::new())
    }

    /// Keep heights between the `threshold` and `100 - threshold` percent
    /// material ratio; everything else becomes non-measured.
    pub fn threshold(&mut self, threshold: f64) -> Result<&mut Self> {
        self.declare("threshold", Arguments::new().kwarg("threshold", threshold))
    }

    /// `method` is `"mean"` or `"median"`.
    pub fn remove_outliers(&mut self, n: f64, method: &str) -> Result<&mut Self> {
        self.declare(
            "remove_outliers",
            Arguments::new().kwarg("n", n).kwarg("method", method),
        )
    }

    /// `method` is `"nearest"` or `"mean"`.
    pub fn fill_nonmeasured(&mut self, method: &str) -> Result<&mut Self> {
        self.declare("fill_nonmeasured", Arguments::new().kwarg("method", method))
    }

    /// Gaussian filter. `filter_type` is `"lowpass"`, `"highpass"` or
    /// `"bandpass"`; bandpass needs `cutoff2`.
    pub fn filter(
        &mut self,
        filter_type: &str,
        cutoff: f64,
        cutoff2: Option<f64>,
    ) -> Result<&mut Self> {
        let mut args = Arguments::new()
            .kwarg("filter_type", filter_type)
            .kwarg("cutoff", cutoff);
        if let Some(c2) = cutoff2 {
            args = args.kwarg("cutoff2", c2);
        }
        self.declare("filter", args)
    }

    /// Rotate by `angle` degrees.
    pub fn rotate(&mut self, angle: f64) -> Result<&mut Self> {
        self.declare("rotate", Arguments::new().kwarg("angle", angle))
    }

    /// Rotate so the dominant texture runs along `axis` (`"x"` or `"y"`).
    pub fn align(&mut self, axis: &str) -> Result<&mut Self> {
        self.declare("align", Arguments::new().kwarg("axis", axis))
    }

    pub fn zoom(&mut self, factor: f64) -> Result<&mut Self> {
        self.declare("zoom", Arguments::new().kwarg("factor", factor))
    }

    /// Crop to a window given in physical units.
    pub fn crop(&mut self, x0: f64, x1: f64, y0: f64, y1: f64) -> Result<&mut Self> {
        self.declare(
            "crop",
            Arguments::new()
                .kwarg("x0", x0)
                .kwarg("x1", x1)
                .kwarg("y0", y0)
                .kwarg("y1", y1),
        )
    }

    // ── Measurements ──

    /// Declare a scalar or multi-valued measurement.
    pub fn parameter(&mut self, name: &str, arguments: Arguments) -> Result<&mut Self> {
        if let Some(descriptor) = self.capabilities.get(name) {
            if descriptor.arity.is_mutating() {
                return Err(BatchError::config(format!(
                    "'{}' transforms the surface and is not a parameter",
                    name
                )));
            }
        }
        self.declare(name, arguments)
    }

    /// Declare several argument-free parameters. `None` declares every
    /// parameter the capability set marks as available, in registry order.
    pub fn roughness_parameters(&mut self, names: Option<&[&str]>) -> Result<&mut Self> {
        let names: Vec<String> = match names {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => self
                .capabilities
                .available_parameters()
                .map(str::to_string)
                .collect(),
        };
        for name in &names {
            self.parameter(name, Arguments::new())?;
        }
        Ok(self)
    }

    /// Rename the column (or column prefix) of the last declared measurement.
    pub fn alias(&mut self, name: &str) -> Result<&mut Self> {
        if name.is_empty() {
            return Err(BatchError::config("Alias must not be empty"));
        }
        let last = self
            .steps
            .last_mut()
            .ok_or_else(|| BatchError::config("alias() called before any step was declared"))?;
        if last.arity.is_mutating() {
            return Err(BatchError::config(format!(
                "Cannot alias '{}': it produces no result column",
                last.capability
            )));
        }
        last.alias = Some(name.to_string());
        Ok(self)
    }

    /// Run the pre-flight column check and freeze.
    pub fn freeze(self) -> Result<Pipeline> {
        let plan = PipelineCompiler::compile(&self.steps)?;
        tracing::info!(
            "Pipeline frozen: {} steps ({} mutating, {} measuring), {} columns in {}µs",
            plan.stats.total_steps,
            plan.stats.mutating_steps,
            plan.stats.measurement_steps,
            plan.stats.result_columns,
            plan.stats.compile_time_us,
        );
        Ok(Pipeline {
            steps: self.steps.into(),
            plan: Arc::new(plan),
        })
    }

    /// Freeze and also check the result columns against a metadata table.
    pub fn freeze_against(self, params: &AdditionalParams) -> Result<Pipeline> {
        let pipeline = self.freeze()?;
        pipeline.check_external_columns(params.join_column(), params.columns())?;
        Ok(pipeline)
    }

    /// Rebuild a builder from [`Pipeline::to_json`] output. Every step goes
    /// through the same declare-time validation as a hand-written one.
    pub fn from_json(json: &str, capabilities: Arc<CapabilitySet>) -> Result<Self> {
        let descriptor: PipelineDescriptor = serde_json::from_str(json)?;
        let mut builder = Self::new(capabilities);
        for spec in descriptor.steps {
            builder.declare(&spec.capability, spec.arguments)?;
            let declared = builder.steps.len() - 1;
            if builder.steps[declared].arity != spec.arity {
                return Err(BatchError::config(format!(
                    "Step '{}' declares arity {:?} but the capability has {:?}",
                    spec.capability, spec.arity, builder.steps[declared].arity
                )));
            }
            if let Some(alias) = spec.alias {
                builder.alias(&alias)?;
            }
        }
        Ok(builder)
    }
}

/// A frozen pipeline. Cheap to clone; never mutated after freezing.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Arc<[OperationSpec]>,
    plan: Arc<CompiledPlan>,
}

impl Pipeline {
    pub fn steps(&self) -> &[OperationSpec] {
        &self.steps
    }

    pub fn plan(&self) -> &CompiledPlan {
        &self.plan
    }

    /// Result columns in declaration order.
    pub fn columns(&self) -> &[String] {
        &self.plan.columns
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// See [`PipelineCompiler::check_external_columns`].
    pub fn check_external_columns(&self, identity_column: &str, external: &[String]) -> Result<()> {
        PipelineCompiler::check_external_columns(&self.plan, identity_column, external)
    }

    pub fn to_json(&self) -> Result<String> {
        let descriptor = PipelineDescriptor {
            steps: self.steps.to_vec(),
        };
        Ok(serde_json::to_string_pretty(&descriptor)?)
    }
}
