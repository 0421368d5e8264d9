use super::compiled_plan::{CompiledPlan, PlanStats};
use super::operation::OperationSpec;
use crate::error::{BatchError, Result};
use std::collections::HashMap;

/// Validates a declared step list and lays out its result columns.
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compile declared steps into a column layout.
    ///
    /// Fails with a configuration error if there are no steps or if two
    /// steps produce the same column name. Runs once at freeze time, so a
    /// pipeline that compiles never collides internally at run time.
    pub fn compile(steps: &[OperationSpec]) -> Result<CompiledPlan> {
        let start_time = std::time::Instant::now();

        if steps.is_empty() {
            return Err(BatchError::config("Pipeline has no operations or parameters defined"));
        }

        let mut columns = Vec::new();
        let mut step_columns = Vec::with_capacity(steps.len());
        let mut owners: HashMap<String, usize> = HashMap::new();

        for (idx, step) in steps.iter().enumerate() {
            let start = columns.len();
            for column in step.columns() {
                if let Some(&first) = owners.get(&column) {
                    return Err(BatchError::config(format!(
                        "Result column '{}' is produced by step {} ('{}') and step {} ('{}'); \
                         use alias() to rename one",
                        column, first, steps[first].capability, idx, step.capability
                    )));
                }
                owners.insert(column.clone(), idx);
                columns.push(column);
            }
            step_columns.push(start..columns.len());
        }

        let mutating_steps = steps.iter().filter(|s| s.arity.is_mutating()).count();
        let stats = PlanStats {
            total_steps: steps.len(),
            mutating_steps,
            measurement_steps: steps.len() - mutating_steps,
            result_columns: columns.len(),
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(CompiledPlan {
            columns,
            step_columns,
            stats,
        })
    }

    /// Check a compiled plan against columns that will be joined in from
    /// outside the pipeline: the identity column and any additional
    /// parameter columns.
    pub fn check_external_columns(
        plan: &CompiledPlan,
        identity_column: &str,
        external: &[String],
    ) -> Result<()> {
        if plan.columns.iter().any(|c| c == identity_column) {
            return Err(BatchError::config(format!(
                "Result column '{}' collides with the identity column",
                identity_column
            )));
        }
        if let Some(column) = plan.columns.iter().find(|c| external.contains(c)) {
            return Err(BatchError::config(format!(
                "Result column '{}' collides with an additional parameter column",
                column
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Arity;
    use crate::types::Arguments;

    fn step(name: &str, arity: Arity) -> OperationSpec {
        OperationSpec::new(name, Arguments::new(), arity)
    }

    #[test]
    fn test_layout_ranges() {
        let steps = vec![
            step("Sa", Arity::Scalar),
            step("level", Arity::Mutating),
            step("vol", Arity::Multi(vec!["a".into(), "b".into()])),
            step("Sq", Arity::Scalar),
        ];
        let plan = PipelineCompiler::compile(&steps).unwrap();
        assert_eq!(plan.columns, vec!["Sa", "vol_a", "vol_b", "Sq"]);
        assert_eq!(plan.step_columns, vec![0..1, 1..1, 1..3, 3..4]);
        assert_eq!(plan.stats.mutating_steps, 1);
        assert_eq!(plan.stats.measurement_steps, 3);
        assert_eq!(plan.slots(99), 0..0);
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = PipelineCompiler::compile(&[]).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("no operations or parameters"));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let steps = vec![
            step("Sa", Arity::Scalar),
            step("level", Arity::Mutating),
            step("Sa", Arity::Scalar),
        ];
        let err = PipelineCompiler::compile(&steps).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("'Sa'"));
    }

    #[test]
    fn test_external_collisions() {
        let plan = PipelineCompiler::compile(&[step("Sa", Arity::Scalar)]).unwrap();
        assert!(PipelineCompiler::check_external_columns(&plan, "file", &["speed".into()]).is_ok());
        assert!(PipelineCompiler::check_external_columns(&plan, "Sa", &[])
            .unwrap_err()
            .is_configuration());
        assert!(PipelineCompiler::check_external_columns(&plan, "file", &["Sa".into()])
            .unwrap_err()
            .is_configuration());
    }
}
