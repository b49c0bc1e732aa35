//! Transform templates and their induced instantiations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The six binding classes an induced transform is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintClass {
    Parameters,
    HyperParameters,
    Inputs,
    Outputs,
    InputStates,
    OutputStates,
}

impl fmt::Display for ConstraintClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintClass::Parameters => write!(f, "parameter"),
            ConstraintClass::HyperParameters => write!(f, "hyperparameter"),
            ConstraintClass::Inputs => write!(f, "input"),
            ConstraintClass::Outputs => write!(f, "output"),
            ConstraintClass::InputStates => write!(f, "input state"),
            ConstraintClass::OutputStates => write!(f, "output state"),
        }
    }
}

/// Scalar type a declared parameter accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Int,
    Float,
    String,
    Bool,
    #[default]
    Any,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Int => write!(f, "int"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::String => write!(f, "string"),
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Any => write!(f, "any"),
        }
    }
}

/// Declaration of a parameter or hyperparameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// If non-empty, the bound value must equal one of these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSpec {
    pub fn of_kind(kind: ValueKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// Declaration of a file input or output slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    #[serde(default)]
    pub description: String,
    /// Exclusive type the bound data groups are expected to carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Whether more than one data group may be bound to the slot.
    #[serde(default)]
    pub multiple: bool,
}

/// Declaration of an input or output state slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSpec {
    #[serde(default)]
    pub description: String,
}

/// A named variant of a template. Its maps override or extend the
/// template's primary declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformFunction {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub hyper_parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub inputs: BTreeMap<String, FileSpec>,
    #[serde(default)]
    pub outputs: BTreeMap<String, FileSpec>,
    #[serde(default)]
    pub input_states: BTreeMap<String, StateSpec>,
    #[serde(default)]
    pub output_states: BTreeMap<String, StateSpec>,
}

/// A reusable transform template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    #[serde(default)]
    pub documentation: String,
    /// Source file the template was loaded from. Filled in on registration.
    #[serde(default)]
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    #[serde(default)]
    pub primary_parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub primary_hyper_parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub primary_inputs: BTreeMap<String, FileSpec>,
    #[serde(default)]
    pub primary_outputs: BTreeMap<String, FileSpec>,
    #[serde(default)]
    pub primary_input_states: BTreeMap<String, StateSpec>,
    #[serde(default)]
    pub primary_output_states: BTreeMap<String, StateSpec>,
    #[serde(default)]
    pub functions: BTreeMap<String, TransformFunction>,
}

impl Transform {
    /// Execution context for `function`: its own, else the template's.
    pub fn execution_context(&self, function: &str) -> Option<&str> {
        self.functions
            .get(function)
            .and_then(|f| f.exec.as_deref())
            .or(self.exec.as_deref())
            .filter(|exec| !exec.is_empty())
    }

    /// Human-readable name used in diagnostics.
    pub fn label(&self) -> &str {
        if self.template.is_empty() {
            &self.name
        } else {
            &self.template
        }
    }
}

/// A concrete, runnable instantiation of one template function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InducedTransform {
    pub name: String,
    pub template_id: String,
    pub function: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub hyper_parameters: BTreeMap<String, Value>,
    /// Input slot name to bound data group ids.
    #[serde(default)]
    pub inputs: BTreeMap<String, Vec<String>>,
    /// Output slot name to produced data group ids.
    #[serde(default)]
    pub outputs: BTreeMap<String, Vec<String>>,
    /// Input state slot name to state id.
    #[serde(default)]
    pub input_states: BTreeMap<String, String>,
    /// Output state slot name to state id.
    #[serde(default)]
    pub output_states: BTreeMap<String, String>,
    #[serde(default)]
    pub exec: String,
    /// Last validation failure; empty while the record is valid.
    #[serde(default)]
    pub error: String,
}

impl InducedTransform {
    pub fn is_valid(&self) -> bool {
        self.error.is_empty()
    }

    pub fn input_data_ids(&self) -> impl Iterator<Item = &str> {
        self.inputs.values().flatten().map(String::as_str)
    }

    pub fn output_data_ids(&self) -> impl Iterator<Item = &str> {
        self.outputs.values().flatten().map(String::as_str)
    }

    pub fn input_state_ids(&self) -> impl Iterator<Item = &str> {
        self.input_states.values().map(String::as_str)
    }

    pub fn output_state_ids(&self) -> impl Iterator<Item = &str> {
        self.output_states.values().map(String::as_str)
    }
}
