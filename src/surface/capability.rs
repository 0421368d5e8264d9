//! Capability registry.
//!
//! The registry is the only place the engine learns which capability names a
//! surface implementation understands and how many result columns each one
//! produces. It is consulted at declare time, never while files are running.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared result shape of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "labels", rename_all = "snake_case")]
pub enum Arity {
    /// Updates the surface, contributes no column.
    Mutating,
    /// Exactly one named result column.
    Scalar,
    /// A fixed set of labelled columns computed together.
    Multi(Vec<String>),
}

impl Arity {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Arity::Mutating)
    }

    /// Number of values a successful invocation must return.
    pub fn value_count(&self) -> usize {
        match self {
            Arity::Mutating => 0,
            Arity::Scalar => 1,
            Arity::Multi(labels) => labels.len(),
        }
    }
}

/// Registry entry for one capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub arity: Arity,
    /// Accepted keyword names; `None` accepts anything.
    pub keywords: Option<Vec<String>>,
    /// Registered by `roughness_parameters()` when no explicit list is given.
    pub available: bool,
}

impl CapabilityDescriptor {
    pub fn mutating(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: Arity::Mutating,
            keywords: None,
            available: false,
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: Arity::Scalar,
            keywords: None,
            available: false,
        }
    }

    pub fn multi<S: AsRef<str>>(name: impl Into<String>, labels: &[S]) -> Self {
        Self {
            name: name.into(),
            arity: Arity::Multi(labels.iter().map(|l| l.as_ref().to_string()).collect()),
            keywords: None,
            available: false,
        }
    }

    /// Restrict the accepted keyword names.
    pub fn keywords(mut self, names: &[&str]) -> Self {
        self.keywords = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Mark as part of the default parameter set.
    pub fn available(mut self) -> Self {
        self.available = true;
        self
    }

    pub fn accepts_keyword(&self, key: &str) -> bool {
        self.keywords
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == key))
    }
}

/// Ordered set of capabilities a surface implementation supports.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    descriptors: Vec<CapabilityDescriptor>,
    index: HashMap<String, usize>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. A later registration with the same name
    /// replaces the earlier one but keeps its position.
    pub fn register(&mut self, descriptor: CapabilityDescriptor) -> &mut Self {
        match self.index.get(&descriptor.name) {
            Some(&idx) => self.descriptors[idx] = descriptor,
            None => {
                self.index
                    .insert(descriptor.name.clone(), self.descriptors.len());
                self.descriptors.push(descriptor);
            }
        }
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&idx| &self.descriptors[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.descriptors.iter()
    }

    /// Names of the default parameter set, in registration order.
    pub fn available_parameters(&self) -> impl Iterator<Item = &str> {
        self.descriptors
            .iter()
            .filter(|d| d.available && !d.arity.is_mutating())
            .map(|d| d.name.as_str())
    }

    /// The capabilities implemented by [`HeightMap`](super::HeightMap).
    pub fn standard() -> Self {
        let mut set = Self::new();

        // Structural
        set.register(CapabilityDescriptor::mutating("zero").keywords(&[]))
            .register(CapabilityDescriptor::mutating("center").keywords(&[]))
            .register(CapabilityDescriptor::mutating("level").keywords(&[]))
            .register(CapabilityDescriptor::mutating("threshold").keywords(&["threshold"]))
            .register(CapabilityDescriptor::mutating("remove_outliers").keywords(&["n", "method"]))
            .register(CapabilityDescriptor::mutating("fill_nonmeasured").keywords(&["method"]))
            .register(
                CapabilityDescriptor::mutating("filter")
                    .keywords(&["filter_type", "cutoff", "cutoff2"]),
            )
            .register(CapabilityDescriptor::mutating("crop").keywords(&["x0", "x1", "y0", "y1"]))
            .register(CapabilityDescriptor::mutating("rotate").keywords(&["angle"]))
            .register(CapabilityDescriptor::mutating("align").keywords(&["axis"]))
            .register(CapabilityDescriptor::mutating("zoom").keywords(&["factor"]));

        // Height and hybrid parameters
        for name in ["Sa", "Sq", "Sp", "Sv", "Sz", "Ssk", "Sku", "Sdq", "Sdr"] {
            set.register(CapabilityDescriptor::scalar(name).keywords(&[]).available());
        }

        // Material ratio
        set.register(CapabilityDescriptor::scalar("Smr").keywords(&["c"]))
            .register(CapabilityDescriptor::scalar("Smc").keywords(&["mr"]))
            .register(
                CapabilityDescriptor::multi("volume_parameters", &["Vmp", "Vmc", "Vvv", "Vvc"])
                    .keywords(&["p", "q"]),
            )
            .register(
                CapabilityDescriptor::multi(
                    "height_parameters",
                    &["Sa", "Sq", "Sp", "Sv", "Sz", "Ssk", "Sku"],
                )
                .keywords(&[]),
            );

        set
    }
}
