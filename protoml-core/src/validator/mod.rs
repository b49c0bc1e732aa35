//! Contract checks for templates, induced transforms and dataset files.
//!
//! [`TemplateValidator`] resolves an induced transform's template and walks
//! the six binding classes in a fixed order, stopping at the first failure.
//! A key is looked up in the selected function's map first and falls back to
//! the template's primary map. The value check itself is delegated to a
//! [`ConstraintChecker`].

pub mod constraints;
pub mod dataset;

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{StoreError, ValidationError};
use crate::records::{RecordStore, RecordStoreExt};
use crate::types::{ConstraintClass, FileSpec, InducedTransform, Transform};

pub use constraints::{ConstraintChecker, DeclaredConstraints};
pub use dataset::{check_columns, validate_data_group, validate_dataset_file};

/// Validates induced transforms against the templates in a record store.
pub struct TemplateValidator<'a> {
    store: &'a dyn RecordStore,
    checker: &'a dyn ConstraintChecker,
}

impl<'a> TemplateValidator<'a> {
    pub fn new(store: &'a dyn RecordStore, checker: &'a dyn ConstraintChecker) -> Self {
        Self { store, checker }
    }

    /// Check `induced` against its template. The first violation is returned.
    pub fn validate(&self, induced: &InducedTransform) -> Result<(), ValidationError> {
        let template = self.resolve_template(&induced.template_id)?;

        if induced.name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        let function = template.functions.get(&induced.function).ok_or_else(|| {
            ValidationError::UnknownFunction {
                function: induced.function.clone(),
                template: template.label().to_string(),
            }
        })?;

        let checker = self.checker;
        check_class(
            ConstraintClass::Parameters,
            &template,
            &induced.parameters,
            &function.parameters,
            &template.primary_parameters,
            |spec, value| checker.check_parameter(spec, value),
        )?;
        check_class(
            ConstraintClass::HyperParameters,
            &template,
            &induced.hyper_parameters,
            &function.hyper_parameters,
            &template.primary_hyper_parameters,
            |spec, value| checker.check_parameter(spec, value),
        )?;
        check_class(
            ConstraintClass::Inputs,
            &template,
            &induced.inputs,
            &function.inputs,
            &template.primary_inputs,
            |spec, ids| {
                checker.check_files(spec, ids)?;
                self.check_group_contracts(spec, ids)
            },
        )?;
        check_class(
            ConstraintClass::Outputs,
            &template,
            &induced.outputs,
            &function.outputs,
            &template.primary_outputs,
            |spec, ids| {
                checker.check_files(spec, ids)?;
                self.check_group_contracts(spec, ids)
            },
        )?;
        check_class(
            ConstraintClass::InputStates,
            &template,
            &induced.input_states,
            &function.input_states,
            &template.primary_input_states,
            |spec, id| checker.check_state(spec, id),
        )?;
        check_class(
            ConstraintClass::OutputStates,
            &template,
            &induced.output_states,
            &function.output_states,
            &template.primary_output_states,
            |spec, id| checker.check_state(spec, id),
        )?;

        debug!(
            name = %induced.name,
            template_id = %induced.template_id,
            function = %induced.function,
            "Induced transform validated"
        );
        Ok(())
    }

    /// Bound groups must carry the declared data type (or a descendant of
    /// it) and the declared file format. Groups not in the store yet are
    /// skipped; the graph build reports dangling references.
    fn check_group_contracts(&self, spec: &FileSpec, group_ids: &[String]) -> Result<(), String> {
        if spec.data_type.is_none() && spec.format.is_none() {
            return Ok(());
        }
        for id in group_ids {
            let group = match self.store.get_data_group(id) {
                Ok(group) => group,
                Err(StoreError::NotFound { .. }) => {
                    debug!(data_id = %id, "Bound data group not stored yet, skipping contract check");
                    continue;
                }
                Err(err) => return Err(format!("cannot load data group {id}: {err}")),
            };
            if let Some(format) = &spec.format {
                if &group.file_format != format {
                    return Err(format!(
                        "data group {id} has format {}, expected {format}",
                        group.file_format
                    ));
                }
            }
            if let Some(declared) = &spec.data_type {
                for etype in group.columns.exclusive_types.keys() {
                    if !self.is_subtype(etype, declared)? {
                        return Err(format!(
                            "data group {id} has type {etype}, expected {declared}"
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn is_subtype(&self, etype: &str, declared: &str) -> Result<bool, String> {
        if etype == declared {
            return Ok(true);
        }
        self.store
            .is_data_type_ancestor(etype, declared)
            .map_err(|err| format!("cannot resolve data type {etype}: {err}"))
    }

    fn resolve_template(&self, template_id: &str) -> Result<Transform, ValidationError> {
        self.store.get_transform(template_id).map_err(|err| {
            if !matches!(err, StoreError::NotFound { .. }) {
                warn!(template_id, error = %err, "Template lookup failed");
            }
            ValidationError::TemplateNotFound {
                template_id: template_id.to_string(),
            }
        })
    }
}

fn check_class<S, V>(
    class: ConstraintClass,
    template: &Transform,
    bound: &BTreeMap<String, V>,
    function_decls: &BTreeMap<String, S>,
    primary_decls: &BTreeMap<String, S>,
    check: impl Fn(&S, &V) -> Result<(), String>,
) -> Result<(), ValidationError> {
    for (key, value) in bound {
        let spec = function_decls
            .get(key)
            .or_else(|| primary_decls.get(key))
            .ok_or_else(|| ValidationError::UndeclaredKey {
                class,
                key: key.clone(),
                template: template.label().to_string(),
            })?;
        check(spec, value).map_err(|reason| ValidationError::ConstraintMismatch {
            class,
            key: key.clone(),
            reason,
        })?;
    }
    Ok(())
}

/// Structural checks a template must pass before it is stored.
pub fn validate_transform(transform: &Transform) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidTransform { reason };

    if transform.name.is_empty() {
        return Err(invalid("No name in transform".into()));
    }
    if transform.documentation.is_empty() {
        return Err(invalid(format!(
            "No documentation in transform {}",
            transform.name
        )));
    }
    if transform.functions.is_empty() {
        return Err(invalid(format!(
            "No functions in transform {}",
            transform.name
        )));
    }
    for (name, function) in &transform.functions {
        if name.is_empty() {
            return Err(invalid(format!(
                "Unnamed function in transform {}",
                transform.name
            )));
        }
        if function.description.is_empty() {
            return Err(invalid(format!(
                "No description for function {name} in transform {}",
                transform.name
            )));
        }
        if transform.execution_context(name).is_none() {
            return Err(invalid(format!(
                "No execution context for function {name} in transform {}",
                transform.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{InMemoryRecordStore, Record};
    use crate::types::{
        ColumnSpec, DataGroup, DataType, GroupSource, ParameterSpec, StateSpec, TransformFunction,
        ValueKind,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ridge() -> Transform {
        let mut fit = TransformFunction {
            description: "Fit the model".into(),
            ..TransformFunction::default()
        };
        fit.hyper_parameters.insert(
            "alpha".into(),
            ParameterSpec {
                kind: ValueKind::Float,
                min: Some(0.0),
                ..ParameterSpec::default()
            },
        );
        fit.output_states
            .insert("model".into(), StateSpec::default());

        let mut t = Transform {
            name: "ridge".into(),
            documentation: "Ridge regression".into(),
            template: "ridge.json".into(),
            exec: Some("python ridge.py".into()),
            ..Transform::default()
        };
        t.primary_parameters
            .insert("seed".into(), ParameterSpec::of_kind(ValueKind::Int));
        t.primary_hyper_parameters
            .insert("alpha".into(), ParameterSpec::of_kind(ValueKind::String));
        t.primary_inputs.insert("train".into(), FileSpec::default());
        t.functions.insert("fit".into(), fit);
        t
    }

    fn store_with(template: Transform) -> (InMemoryRecordStore, String) {
        let store = InMemoryRecordStore::new();
        let id = store.add(Record::Transform(template)).unwrap();
        (store, id)
    }

    fn induced(template_id: &str) -> InducedTransform {
        let mut it = InducedTransform {
            name: "ridge-fit".into(),
            template_id: template_id.into(),
            function: "fit".into(),
            ..InducedTransform::default()
        };
        it.parameters.insert("seed".into(), json!(7));
        it.hyper_parameters.insert("alpha".into(), json!(0.5));
        it.inputs.insert("train".into(), vec!["dg-1".into()]);
        it.output_states.insert("model".into(), "st-1".into());
        it
    }

    #[test]
    fn test_valid_induced_transform() {
        let (store, id) = store_with(ridge());
        let validator = TemplateValidator::new(&store, &DeclaredConstraints);
        assert_eq!(validator.validate(&induced(&id)), Ok(()));
    }

    #[test]
    fn test_unknown_template() {
        let (store, _) = store_with(ridge());
        let validator = TemplateValidator::new(&store, &DeclaredConstraints);
        let err = validator.validate(&induced("t-404")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid TemplateID t-404");
    }

    #[test]
    fn test_missing_name_and_unknown_function() {
        let (store, id) = store_with(ridge());
        let validator = TemplateValidator::new(&store, &DeclaredConstraints);

        let mut it = induced(&id);
        it.name.clear();
        assert_eq!(validator.validate(&it), Err(ValidationError::MissingName));

        let mut it = induced(&id);
        it.function = "predict".into();
        assert!(matches!(
            validator.validate(&it),
            Err(ValidationError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_undeclared_parameter() {
        let (store, id) = store_with(ridge());
        let validator = TemplateValidator::new(&store, &DeclaredConstraints);
        let mut it = induced(&id);
        it.parameters.insert("verbose".into(), json!(true));
        assert_eq!(
            validator.validate(&it),
            Err(ValidationError::UndeclaredKey {
                class: ConstraintClass::Parameters,
                key: "verbose".into(),
                template: "ridge.json".into(),
            })
        );
    }

    #[test]
    fn test_function_declaration_wins_over_primary() {
        let (store, id) = store_with(ridge());
        let validator = TemplateValidator::new(&store, &DeclaredConstraints);

        // The primary map declares alpha as a string; fit redeclares it as a float.
        let mut it = induced(&id);
        it.hyper_parameters.insert("alpha".into(), json!("high"));
        let err = validator.validate(&it).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ConstraintMismatch {
                class: ConstraintClass::HyperParameters,
                ..
            }
        ));

        let mut it = induced(&id);
        it.hyper_parameters.insert("alpha".into(), json!(-1.0));
        assert!(validator.validate(&it).is_err());
    }

    #[test]
    fn test_undeclared_state_and_input() {
        let (store, id) = store_with(ridge());
        let validator = TemplateValidator::new(&store, &DeclaredConstraints);

        let mut it = induced(&id);
        it.input_states.insert("warm_start".into(), "st-0".into());
        let err = validator.validate(&it).unwrap_err();
        assert!(err.to_string().contains("input state key 'warm_start'"));

        let mut it = induced(&id);
        it.outputs.insert("predictions".into(), vec!["dg-2".into()]);
        assert!(matches!(
            validator.validate(&it),
            Err(ValidationError::UndeclaredKey {
                class: ConstraintClass::Outputs,
                ..
            })
        ));
    }

    fn lattice_store(template: Transform) -> (InMemoryRecordStore, String) {
        let (store, id) = store_with(template);
        for dtype in [
            DataType::root("any"),
            DataType::with_parents("numeric", ["any"]),
            DataType::with_parents("real", ["numeric"]),
            DataType::with_parents("text", ["any"]),
        ] {
            store.add(Record::DataType(dtype)).unwrap();
        }
        (store, id)
    }

    fn group(store: &InMemoryRecordStore, etype: &str, format: &str) -> String {
        store
            .add(Record::DataGroup(DataGroup {
                n_rows: 10,
                n_cols: 1,
                file_format: format.into(),
                source: GroupSource::Dataset {
                    path: "reviews.csv".into(),
                },
                columns: ColumnSpec {
                    exclusive_types: [(etype.to_string(), vec![0])].into(),
                    tags: Default::default(),
                },
            }))
            .unwrap()
    }

    fn typed_ridge() -> Transform {
        let mut t = ridge();
        t.primary_inputs.insert(
            "train".into(),
            FileSpec {
                data_type: Some("numeric".into()),
                format: Some("csv".into()),
                ..FileSpec::default()
            },
        );
        t
    }

    #[test]
    fn test_bound_group_must_match_declared_type() {
        let (store, id) = lattice_store(typed_ridge());
        let validator = TemplateValidator::new(&store, &DeclaredConstraints);

        let mut it = induced(&id);
        it.inputs.insert("train".into(), vec![group(&store, "real", "csv")]);
        assert_eq!(validator.validate(&it), Ok(()));

        let text = group(&store, "text", "csv");
        it.inputs.insert("train".into(), vec![text.clone()]);
        let err = validator.validate(&it).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ConstraintMismatch {
                class: ConstraintClass::Inputs,
                key: "train".into(),
                reason: format!("data group {text} has type text, expected numeric"),
            }
        );
    }

    #[test]
    fn test_bound_group_must_match_declared_format() {
        let (store, id) = lattice_store(typed_ridge());
        let validator = TemplateValidator::new(&store, &DeclaredConstraints);

        let mut it = induced(&id);
        let parquet = group(&store, "real", "parquet");
        it.inputs.insert("train".into(), vec![parquet.clone()]);
        let err = validator.validate(&it).unwrap_err();
        assert!(err
            .to_string()
            .contains(&format!("data group {parquet} has format parquet, expected csv")));
    }

    #[test]
    fn test_unstored_group_skips_contract_check() {
        let (store, id) = lattice_store(typed_ridge());
        let validator = TemplateValidator::new(&store, &DeclaredConstraints);
        // induced() binds "dg-1", which is not in the store.
        assert_eq!(validator.validate(&induced(&id)), Ok(()));
    }

    #[test]
    fn test_validate_transform() {
        assert!(validate_transform(&ridge()).is_ok());

        let mut t = ridge();
        t.documentation.clear();
        assert!(validate_transform(&t).is_err());

        let mut t = ridge();
        t.exec = None;
        let err = validate_transform(&t).unwrap_err();
        assert!(err.to_string().contains("No execution context for function fit"));

        let mut t = ridge();
        t.functions.clear();
        assert!(validate_transform(&t).is_err());

        let mut t = ridge();
        t.functions.insert("predict".into(), TransformFunction::default());
        assert!(err_mentions(&t, "No description for function predict"));
    }

    fn err_mentions(t: &Transform, needle: &str) -> bool {
        validate_transform(t)
            .err()
            .is_some_and(|e| e.to_string().contains(needle))
    }
}
