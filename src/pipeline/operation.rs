//! Declared pipeline step.

use crate::surface::Arity;
use crate::types::Arguments;
use serde::{Deserialize, Serialize};

/// One declared step: which capability to invoke, with what arguments, and
/// how many result columns it contributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub capability: String,
    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
    pub arity: Arity,
    /// Replaces the capability name in column names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl OperationSpec {
    pub fn new(capability: impl Into<String>, arguments: Arguments, arity: Arity) -> Self {
        Self {
            capability: capability.into(),
            arguments,
            arity,
            alias: None,
        }
    }

    /// Name used as the column (scalar) or column prefix (multi).
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.capability)
    }

    /// Result columns this step contributes, in output order.
    pub fn columns(&self) -> Vec<String> {
        match &self.arity {
            Arity::Mutating => Vec::new(),
            Arity::Scalar => vec![self.display_name().to_string()],
            Arity::Multi(labels) => labels
                .iter()
                .map(|label| format!("{}_{}", self.display_name(), label))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_by_arity() {
        let level = OperationSpec::new("level", Arguments::new(), Arity::Mutating);
        assert!(level.columns().is_empty());

        let mut sa = OperationSpec::new("Sa", Arguments::new(), Arity::Scalar);
        assert_eq!(sa.columns(), vec!["Sa"]);
        sa.alias = Some("Sa_raw".into());
        assert_eq!(sa.columns(), vec!["Sa_raw"]);

        let vol = OperationSpec::new(
            "volume_parameters",
            Arguments::new().kwarg("p", 10),
            Arity::Multi(vec!["Vmp".into(), "Vvc".into()]),
        );
        assert_eq!(
            vol.columns(),
            vec!["volume_parameters_Vmp", "volume_parameters_Vvc"]
        );
    }

    #[test]
    fn test_serde_omits_defaults() {
        let spec = OperationSpec::new("zero", Arguments::new(), Arity::Mutating);
        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("arguments"));
        assert!(!json.contains("alias"));
        let back: OperationSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
