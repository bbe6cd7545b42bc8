//! Wire types for pipeline submission

use crate::params::ParamValue;
use serde::{Deserialize, Serialize};
use video_pipeline_common::MetricRecord;

/// A submitted pipeline: one entry per node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub modules: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub id: String,
    pub module_class: String,
    /// Upstream node ids
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub key: String,
    pub value: ParamValue,
}

impl ModuleSpec {
    pub fn new(id: &str, module_class: &str) -> Self {
        Self {
            id: id.to_string(),
            module_class: module_class.to_string(),
            source: Vec::new(),
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_nodes(mut self, upstream: &[&str]) -> Self {
        self.source = upstream.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.parameters.push(ParameterEntry {
            key: key.to_string(),
            value: value.into(),
        });
        self
    }

    pub(crate) fn parameter_pairs(&self) -> Vec<(String, ParamValue)> {
        self.parameters
            .iter()
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect()
    }
}

/// Locators and metrics of a finished run
///
/// Locators are artifact file names inside the output directory; `interleaved`
/// is empty when the interleaved artifact was skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub left: String,
    pub right: String,
    pub interleaved: String,
    pub metrics: Vec<MetricRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = r#"{
            "modules": [
                {"id": "src", "module_class": "video_source", "source": [],
                 "parameters": [{"key": "path", "value": "clip_64x48.yuv"}]},
                {"id": "blur", "module_class": "blur", "source": ["src"],
                 "parameters": [{"key": "kernel_size", "value": 7}]},
                {"id": "out", "module_class": "result", "source": ["blur"]}
            ]
        }"#;
        let request: PipelineRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.modules.len(), 3);
        assert_eq!(request.modules[1].parameters[0].value, ParamValue::Int(7));
        assert!(request.modules[2].parameters.is_empty());

        let built = ModuleSpec::new("blur", "blur")
            .from_nodes(&["src"])
            .param("kernel_size", 7);
        assert_eq!(built, request.modules[1]);
    }
}
