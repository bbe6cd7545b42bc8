//! Module descriptors: role, parameter schema and declared formats
//!
//! Descriptors are validated once when they are built and are immutable after
//! registration.

use crate::error::DescriptorError;
use crate::params::{BoundParams, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Prefix marking a format value that is filled from a bound parameter
pub const PARAM_REF_PREFIX: &str = "param:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Source,
    Transform,
    Sink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[serde(alias = "integer")]
    Int,
    Float,
    #[serde(alias = "str")]
    String,
    #[serde(alias = "boolean")]
    Bool,
    Select,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::String => "string",
            ParamType::Bool => "bool",
            ParamType::Select => "select",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    None,
    Range { min: Option<f64>, max: Option<f64> },
    Options(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
    pub constraint: Constraint,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterDefinition {
    fn new(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            default: None,
            constraint: Constraint::None,
            required: false,
            description: None,
        }
    }

    #[must_use]
    pub fn int(name: &str) -> Self {
        Self::new(name, ParamType::Int)
    }

    #[must_use]
    pub fn float(name: &str) -> Self {
        Self::new(name, ParamType::Float)
    }

    #[must_use]
    pub fn string(name: &str) -> Self {
        Self::new(name, ParamType::String)
    }

    #[must_use]
    pub fn bool(name: &str) -> Self {
        Self::new(name, ParamType::Bool)
    }

    #[must_use]
    pub fn select<S: AsRef<str>>(name: &str, options: &[S]) -> Self {
        let mut def = Self::new(name, ParamType::Select);
        def.constraint =
            Constraint::Options(options.iter().map(|o| o.as_ref().to_string()).collect());
        def
    }

    #[must_use]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.constraint = Constraint::Range {
            min: Some(min),
            max: Some(max),
        };
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<ParamValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn describe(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    /// Option set of a select parameter
    #[must_use]
    pub fn options(&self) -> Option<&[String]> {
        match &self.constraint {
            Constraint::Options(values) => Some(values),
            _ => None,
        }
    }

    /// Check that a value of the right type satisfies the constraint
    ///
    /// Returns a human readable reason on failure.
    pub(crate) fn check_constraint(&self, value: &ParamValue) -> Result<(), String> {
        match (&self.constraint, value) {
            (Constraint::Range { min, max }, v) => {
                let Some(n) = v.as_f64() else {
                    return Ok(());
                };
                let lo = min.unwrap_or(f64::NEG_INFINITY);
                let hi = max.unwrap_or(f64::INFINITY);
                if n < lo || n > hi {
                    return Err(format!("{n} is outside [{lo}, {hi}]"));
                }
                Ok(())
            }
            (Constraint::Options(options), ParamValue::Str(s)) => {
                if options.iter().any(|o| o == s) {
                    Ok(())
                } else {
                    Err(format!("'{s}' is not one of {options:?}"))
                }
            }
            _ => Ok(()),
        }
    }

    /// Whether a value has this parameter's type (ints count as floats)
    pub(crate) fn accepts_type(&self, value: &ParamValue) -> bool {
        matches!(
            (self.param_type, value),
            (ParamType::Int, ParamValue::Int(_))
                | (ParamType::Float, ParamValue::Float(_) | ParamValue::Int(_))
                | (ParamType::String | ParamType::Select, ParamValue::Str(_))
                | (ParamType::Bool, ParamValue::Bool(_))
        )
    }

    fn validate(&self) -> Result<(), DescriptorError> {
        match &self.constraint {
            Constraint::Options(options) if options.is_empty() => {
                return Err(DescriptorError::SelectWithoutOptions(self.name.clone()));
            }
            Constraint::Range {
                min: Some(min),
                max: Some(max),
            } if min > max => {
                return Err(DescriptorError::EmptyRange {
                    name: self.name.clone(),
                    min: *min,
                    max: *max,
                });
            }
            _ => {}
        }
        if self.param_type == ParamType::Select && self.options().is_none() {
            return Err(DescriptorError::SelectWithoutOptions(self.name.clone()));
        }
        if let Some(default) = &self.default {
            if !self.accepts_type(default) {
                return Err(DescriptorError::InvalidDefault {
                    name: self.name.clone(),
                    reason: format!("expected {}, got {}", self.param_type, default.type_name()),
                });
            }
            self.check_constraint(default)
                .map_err(|reason| DescriptorError::InvalidDefault {
                    name: self.name.clone(),
                    reason,
                })?;
        }
        Ok(())
    }
}

/// Declared stream format; values are literals or `param:<name>` references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatDescriptor(pub BTreeMap<String, String>);

impl FormatDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Raw planar 4:2:0 with all other fields open
    #[must_use]
    pub fn yuv420p() -> Self {
        Self::new().field("pixel_format", "yuv420p")
    }

    fn param_refs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().filter_map(|(k, v)| {
            v.strip_prefix(PARAM_REF_PREFIX)
                .map(|p| (k.as_str(), p))
        })
    }

    /// Replace parameter references with bound values
    ///
    /// References to parameters that were left unset resolve to an empty string.
    #[must_use]
    pub fn resolve(&self, params: &BoundParams) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| {
                let value = match v.strip_prefix(PARAM_REF_PREFIX) {
                    Some(name) => params.get(name).map(ToString::to_string).unwrap_or_default(),
                    None => v.clone(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

/// Immutable description of a module class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    id: String,
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: Vec<ParameterDefinition>,
    input_formats: Vec<FormatDescriptor>,
    output_formats: Vec<FormatDescriptor>,
}

impl ModuleDescriptor {
    #[must_use]
    pub fn builder(id: &str, role: Role) -> ModuleDescriptorBuilder {
        ModuleDescriptorBuilder {
            descriptor: ModuleDescriptor {
                id: id.to_string(),
                role,
                description: None,
                parameters: Vec::new(),
                input_formats: Vec::new(),
                output_formats: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn input_formats(&self) -> &[FormatDescriptor] {
        &self.input_formats
    }

    #[must_use]
    pub fn output_formats(&self) -> &[FormatDescriptor] {
        &self.output_formats
    }
}

pub struct ModuleDescriptorBuilder {
    descriptor: ModuleDescriptor,
}

impl ModuleDescriptorBuilder {
    #[must_use]
    pub fn description(mut self, text: &str) -> Self {
        self.descriptor.description = Some(text.to_string());
        self
    }

    #[must_use]
    pub fn parameter(mut self, def: ParameterDefinition) -> Self {
        self.descriptor.parameters.push(def);
        self
    }

    #[must_use]
    pub fn input_format(mut self, format: FormatDescriptor) -> Self {
        self.descriptor.input_formats.push(format);
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: FormatDescriptor) -> Self {
        self.descriptor.output_formats.push(format);
        self
    }

    /// Validate and freeze the descriptor
    ///
    /// # Errors
    ///
    /// Returns a [`DescriptorError`] for duplicate parameters, select parameters
    /// without options, empty ranges, defaults violating their own constraint,
    /// or format fields referencing undeclared parameters.
    pub fn build(self) -> Result<ModuleDescriptor, DescriptorError> {
        let d = self.descriptor;
        let mut seen = HashSet::new();
        for p in &d.parameters {
            if !seen.insert(p.name.as_str()) {
                return Err(DescriptorError::DuplicateParameter(p.name.clone()));
            }
            p.validate()?;
        }
        for format in d.input_formats.iter().chain(&d.output_formats) {
            for (field, param) in format.param_refs() {
                if !seen.contains(param) {
                    return Err(DescriptorError::UnknownFormatParameter {
                        field: field.to_string(),
                        param: param.to_string(),
                    });
                }
            }
        }
        Ok(d)
    }
}
