//! Value-level checks for declared parameters, file slots and state slots.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::types::{FileSpec, ParameterSpec, StateSpec, ValueKind};

/// Checks a single bound value against its declaration.
///
/// Errors are plain reasons; the validator wraps them with the class and key.
pub trait ConstraintChecker: Send + Sync {
    fn check_parameter(&self, spec: &ParameterSpec, value: &Value) -> Result<(), String>;

    fn check_files(&self, spec: &FileSpec, group_ids: &[String]) -> Result<(), String>;

    fn check_state(&self, spec: &StateSpec, state_id: &str) -> Result<(), String>;
}

/// Enforces type, range and membership exactly as declared in the template.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredConstraints;

impl DeclaredConstraints {
    fn kind_matches(kind: ValueKind, value: &Value) -> bool {
        match kind {
            ValueKind::Int => value.is_i64() || value.is_u64(),
            ValueKind::Float => value.is_number(),
            ValueKind::String => value.is_string(),
            ValueKind::Bool => value.is_boolean(),
            ValueKind::Any => true,
        }
    }

    fn same_choice(choice: &Value, value: &Value) -> bool {
        match (choice.as_f64(), value.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => choice == value,
        }
    }
}

impl ConstraintChecker for DeclaredConstraints {
    fn check_parameter(&self, spec: &ParameterSpec, value: &Value) -> Result<(), String> {
        if value.is_null() && spec.kind != ValueKind::Any {
            return Err(format!("expected {}, got null", spec.kind));
        }
        if !Self::kind_matches(spec.kind, value) {
            return Err(format!("expected {}, got {value}", spec.kind));
        }
        if let Some(number) = value.as_f64() {
            if let Some(min) = spec.min {
                if number < min {
                    return Err(format!("{number} is below the minimum {min}"));
                }
            }
            if let Some(max) = spec.max {
                if number > max {
                    return Err(format!("{number} is above the maximum {max}"));
                }
            }
        }
        if !spec.choices.is_empty() && !spec.choices.iter().any(|c| Self::same_choice(c, value)) {
            return Err(format!("{value} is not one of {}", Value::from(spec.choices.clone())));
        }
        Ok(())
    }

    fn check_files(&self, spec: &FileSpec, group_ids: &[String]) -> Result<(), String> {
        if group_ids.is_empty() {
            return Err("no data groups bound".into());
        }
        if !spec.multiple && group_ids.len() > 1 {
            return Err(format!(
                "accepts a single data group, got {}",
                group_ids.len()
            ));
        }
        let mut seen = BTreeSet::new();
        for id in group_ids {
            if id.is_empty() {
                return Err("empty data group id".into());
            }
            if !seen.insert(id) {
                return Err(format!("data group {id} bound twice"));
            }
        }
        Ok(())
    }

    fn check_state(&self, _spec: &StateSpec, state_id: &str) -> Result<(), String> {
        if state_id.is_empty() {
            return Err("empty state id".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ranged(kind: ValueKind, min: f64, max: f64) -> ParameterSpec {
        ParameterSpec {
            kind,
            min: Some(min),
            max: Some(max),
            ..ParameterSpec::default()
        }
    }

    #[test]
    fn test_kind_checks() {
        let c = DeclaredConstraints;
        let int = ParameterSpec::of_kind(ValueKind::Int);
        assert!(c.check_parameter(&int, &json!(3)).is_ok());
        assert!(c.check_parameter(&int, &json!(3.5)).is_err());
        assert!(c.check_parameter(&int, &json!("3")).is_err());

        let float = ParameterSpec::of_kind(ValueKind::Float);
        assert!(c.check_parameter(&float, &json!(3)).is_ok());
        assert!(c.check_parameter(&float, &json!(true)).is_err());

        let any = ParameterSpec::of_kind(ValueKind::Any);
        assert!(c.check_parameter(&any, &json!(null)).is_ok());
        assert!(c.check_parameter(&float, &json!(null)).is_err());
    }

    #[test]
    fn test_range_checks() {
        let c = DeclaredConstraints;
        let spec = ranged(ValueKind::Float, 0.0, 1.0);
        assert!(c.check_parameter(&spec, &json!(0.0)).is_ok());
        assert!(c.check_parameter(&spec, &json!(1.0)).is_ok());
        let err = c.check_parameter(&spec, &json!(1.5)).unwrap_err();
        assert!(err.contains("maximum"));
        assert!(c.check_parameter(&spec, &json!(-0.1)).is_err());
    }

    #[test]
    fn test_choice_checks() {
        let c = DeclaredConstraints;
        let spec = ParameterSpec {
            kind: ValueKind::Any,
            choices: vec![json!("l1"), json!("l2"), json!(1)],
            ..ParameterSpec::default()
        };
        assert!(c.check_parameter(&spec, &json!("l2")).is_ok());
        assert!(c.check_parameter(&spec, &json!(1.0)).is_ok());
        assert!(c.check_parameter(&spec, &json!("elasticnet")).is_err());
    }

    #[test]
    fn test_file_slot_checks() {
        let c = DeclaredConstraints;
        let single = FileSpec::default();
        assert!(c.check_files(&single, &["dg-1".into()]).is_ok());
        assert!(c.check_files(&single, &[]).is_err());
        assert!(c.check_files(&single, &["a".into(), "b".into()]).is_err());

        let many = FileSpec {
            multiple: true,
            ..FileSpec::default()
        };
        assert!(c.check_files(&many, &["a".into(), "b".into()]).is_ok());
        assert!(c.check_files(&many, &["a".into(), "a".into()]).is_err());
    }

    #[test]
    fn test_state_slot_checks() {
        let c = DeclaredConstraints;
        assert!(c.check_state(&StateSpec::default(), "st-1").is_ok());
        assert!(c.check_state(&StateSpec::default(), "").is_err());
    }
}
