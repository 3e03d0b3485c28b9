// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline definition loading and script resolution.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::types::{ArtifactError, PipcookScript, PipelineMeta, ScriptConfig, ScriptType};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read pipeline file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline definition")]
    Parse(#[from] serde_json::Error),

    #[error("pipeline field `{field}` is empty")]
    EmptyField { field: &'static str },

    #[error("pipeline {field} `{value}` is not a valid url")]
    InvalidScriptUrl {
        field: String,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid artifact at index {index}")]
    Artifact {
        index: usize,
        #[source]
        source: ArtifactError,
    },
}

impl PipelineMeta {
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse the pipeline definition at `path`.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Check the fields a run needs: model and dataflow entries are URLs,
    /// the data source is non-empty, every artifact processor parses.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.data_source.trim().is_empty() {
            return Err(PipelineError::EmptyField { field: "dataSource" });
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::EmptyField { field: "model" });
        }
        parse_script_url("model", &self.model)?;
        for (i, flow) in self.dataflow.iter().flatten().enumerate() {
            parse_script_url(&format!("dataflow[{i}]"), flow)?;
        }
        for (index, artifact) in self.artifacts.iter().enumerate() {
            artifact
                .plugin()
                .map_err(|source| PipelineError::Artifact { index, source })?;
        }
        Ok(())
    }

    /// True when the data source is a script URL rather than a query string.
    pub fn has_data_source_script(&self) -> bool {
        data_source_url(&self.data_source).is_some()
    }
}

/// A data source that parses as a hierarchical absolute URL names a script;
/// anything else (e.g. `select * from t`) is a query.
fn data_source_url(data_source: &str) -> Option<Url> {
    Url::parse(data_source.trim())
        .ok()
        .filter(|url| !url.cannot_be_a_base())
}

fn parse_script_url(field: &str, value: &str) -> Result<Url, PipelineError> {
    Url::parse(value.trim()).map_err(|source| PipelineError::InvalidScriptUrl {
        field: field.to_string(),
        value: value.to_string(),
        source,
    })
}

const FALLBACK_SCRIPT_FILE: &str = "script";

/// A script name usable as a single path component.
fn script_file_name(name: &str) -> &str {
    let unusable = name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']);
    if unusable {
        FALLBACK_SCRIPT_FILE
    } else {
        name
    }
}

/// Build the [`ScriptConfig`] for `meta`.
///
/// Each stage gets its own directory under `scripts_root` (`datasource`,
/// `dataflow-<i>`, `model`), so scripts sharing a file name never collide.
pub fn resolve_scripts(meta: &PipelineMeta, scripts_root: &Path) -> Result<ScriptConfig, PipelineError> {
    let script = |url: &Url, script_type, stage_dir: &str| {
        let mut script = PipcookScript::from_url(url, script_type, PathBuf::new());
        script.path = scripts_root.join(stage_dir).join(script_file_name(&script.name));
        script
    };

    let data_source = data_source_url(&meta.data_source)
        .map(|url| script(&url, ScriptType::DataSource, "datasource"));
    if data_source.is_none() {
        debug!("Data source is not a url, no script to fetch");
    }

    let dataflow = meta
        .dataflow
        .iter()
        .flatten()
        .enumerate()
        .map(|(i, flow)| {
            parse_script_url(&format!("dataflow[{i}]"), flow)
                .map(|url| script(&url, ScriptType::Dataflow, &format!("dataflow-{i}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let model = script(&parse_script_url("model", &meta.model)?, ScriptType::Model, "model");

    Ok(ScriptConfig {
        data_source,
        dataflow,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryValue;
    use tempfile::TempDir;

    const PIPELINE: &str = r#"{
        "specVersion": "2.0",
        "dataSource": "https://cdn.example.com/scripts/datasource.js?url=https://data.example.com/mnist.zip",
        "dataflow": ["https://cdn.example.com/scripts/resize.js?size=224&size=224"],
        "model": "https://cdn.example.com/scripts/model.js",
        "artifacts": [{ "processor": "pipcook-ali-oss-uploader@0.0.3", "target": "oss://bucket" }],
        "options": { "framework": "tfjs", "train": { "epochs": 10 } }
    }"#;

    #[test]
    fn test_load_and_validate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, PIPELINE).unwrap();

        let meta = PipelineMeta::load(&path).unwrap();
        meta.validate().unwrap();
        assert!(meta.has_data_source_script());
        assert_eq!(meta.options["train"]["epochs"], 10);
        assert_eq!(meta.artifacts[0].options["target"], "oss://bucket");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = PipelineMeta::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn test_missing_model_is_parse_error() {
        let err = PipelineMeta::from_json_str(r#"{ "dataSource": "select 1" }"#).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_resolve_scripts() {
        let meta = PipelineMeta::from_json_str(PIPELINE).unwrap();
        let scripts = resolve_scripts(&meta, Path::new("/work/scripts")).unwrap();

        let ds = scripts.data_source.as_ref().unwrap();
        assert_eq!(ds.name, "datasource.js");
        assert_eq!(ds.path, PathBuf::from("/work/scripts/datasource/datasource.js"));
        assert_eq!(ds.script_type, ScriptType::DataSource);
        assert_eq!(
            ds.query["url"],
            QueryValue::Single("https://data.example.com/mnist.zip".to_string())
        );

        assert_eq!(scripts.dataflow.len(), 1);
        assert_eq!(
            scripts.dataflow[0].query["size"],
            QueryValue::Multiple(vec!["224".to_string(), "224".to_string()])
        );
        assert_eq!(
            scripts.dataflow[0].path,
            PathBuf::from("/work/scripts/dataflow-0/resize.js")
        );
        assert_eq!(scripts.model.path, PathBuf::from("/work/scripts/model/model.js"));
        assert_eq!(scripts.stages().count(), 3);
    }

    #[test]
    fn test_resolve_scripts_same_file_name_per_stage() {
        let meta = PipelineMeta::from_json_str(
            r#"{
                "dataSource": "https://cdn.example.com/datasource/index.js",
                "dataflow": ["https://cdn.example.com/a/index.js", "https://cdn.example.com/b/index.js"],
                "model": "https://cdn.example.com/model/index.js"
            }"#,
        )
        .unwrap();
        let scripts = resolve_scripts(&meta, Path::new("/s")).unwrap();

        let paths: Vec<&PathBuf> = scripts.stages().map(|s| &s.path).collect();
        assert_eq!(paths.len(), 4);
        let unique: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), 4);
        assert!(paths.iter().all(|p| p.starts_with("/s") && p.as_path() != Path::new("/s")));
        assert_eq!(scripts.dataflow[1].path, PathBuf::from("/s/dataflow-1/index.js"));
    }

    #[test]
    fn test_resolve_scripts_unusable_name_falls_back() {
        let meta = PipelineMeta::from_json_str(
            r#"{ "dataSource": "select 1", "dataflow": ["https://x.com/a%2F..%2Fb.js"], "model": "file:///" }"#,
        )
        .unwrap();
        let scripts = resolve_scripts(&meta, Path::new("/s")).unwrap();

        assert_eq!(scripts.model.name, "");
        assert_eq!(scripts.model.path, PathBuf::from("/s/model/script"));
        assert_eq!(scripts.dataflow[0].path, PathBuf::from("/s/dataflow-0/script"));
    }

    #[test]
    fn test_sql_data_source_has_no_script() {
        let meta = PipelineMeta::from_json_str(
            r#"{ "dataSource": "select * from images", "dataflow": null, "model": "https://x.com/model.js" }"#,
        )
        .unwrap();
        meta.validate().unwrap();
        assert!(!meta.has_data_source_script());

        let scripts = resolve_scripts(&meta, Path::new("/s")).unwrap();
        assert!(scripts.data_source.is_none());
        assert!(scripts.dataflow.is_empty());
        assert_eq!(scripts.stages().count(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut meta = PipelineMeta::from_json_str(PIPELINE).unwrap();
        meta.model = "model.js".to_string();
        assert!(matches!(meta.validate(), Err(PipelineError::InvalidScriptUrl { .. })));

        let mut meta = PipelineMeta::from_json_str(PIPELINE).unwrap();
        meta.data_source = "  ".to_string();
        assert!(matches!(
            meta.validate(),
            Err(PipelineError::EmptyField { field: "dataSource" })
        ));

        let mut meta = PipelineMeta::from_json_str(PIPELINE).unwrap();
        meta.artifacts[0].processor = "uploader".to_string();
        assert!(matches!(meta.validate(), Err(PipelineError::Artifact { index: 0, .. })));
    }
}
