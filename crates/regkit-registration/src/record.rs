//! Transform-parameter records.
//!
//! A record is the parameter-file description of a registration result. It
//! is assembled from blocks contributed by the final transform, the resample
//! interpolator and the resampler, in that order.

use std::fs;
use std::path::{Path, PathBuf};

use regkit_core::ParameterMap;
use serde::Serialize;

use crate::component::Category;
use crate::error::Result;

/// One component's contribution to a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordBlock {
    pub category: String,
    pub component: String,
    pub parameters: ParameterMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformParameterRecord {
    blocks: Vec<RecordBlock>,
}

impl TransformParameterRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_block(&mut self, category: Category, component: &str, parameters: ParameterMap) {
        self.blocks.push(RecordBlock {
            category: category.key().to_string(),
            component: component.to_string(),
            parameters,
        });
    }

    pub fn blocks(&self) -> &[RecordBlock] {
        &self.blocks
    }

    /// All blocks merged into one map; keys keep block order.
    pub fn to_parameter_map(&self) -> ParameterMap {
        let mut merged = ParameterMap::new();
        for block in &self.blocks {
            merged.merge(&block.parameters);
        }
        merged
    }

    /// Parameter-file text with one comment header per block.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for block in &self.blocks {
            text.push_str(&format!("// {} ({})\n", block.category, block.component));
            text.push_str(&block.parameters.to_text());
            text.push('\n');
        }
        text
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write to `path` through a temporary sibling file and a rename, so a
    /// reader never sees a half-written record.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("txt.tmp");
        fs::write(&tmp, self.to_text())?;
        fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), "transform parameters written");
        Ok(())
    }
}

/// `TransformParameters.<elastix level>[.R<level>[.It<iteration>]].txt`
pub fn transform_parameter_file_name(
    elastix_level: usize,
    resolution: Option<usize>,
    iteration: Option<usize>,
) -> PathBuf {
    let mut name = format!("TransformParameters.{elastix_level}");
    if let Some(level) = resolution {
        name.push_str(&format!(".R{level}"));
        if let Some(iteration) = iteration {
            name.push_str(&format!(".It{iteration:07}"));
        }
    }
    name.push_str(".txt");
    PathBuf::from(name)
}

/// `IterationInfo.<elastix level>.R<level>.txt`
pub fn iteration_info_file_name(elastix_level: usize, resolution: usize) -> PathBuf {
    PathBuf::from(format!("IterationInfo.{elastix_level}.R{resolution}.txt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn block(key: &str, value: &str) -> ParameterMap {
        let mut map = ParameterMap::new();
        map.set(key, [value]);
        map
    }

    #[test]
    fn test_blocks_keep_order() {
        let mut record = TransformParameterRecord::new();
        record.push_block(Category::Transform, "TranslationTransform", block("Transform", "TranslationTransform"));
        record.push_block(
            Category::ResampleInterpolator,
            "FinalLinearInterpolator",
            block("ResampleInterpolator", "FinalLinearInterpolator"),
        );
        record.push_block(Category::Resampler, "DefaultResampler", block("Resampler", "DefaultResampler"));

        let keys: Vec<&str> = record.blocks().iter().map(|b| b.category.as_str()).collect();
        assert_eq!(keys, ["Transform", "ResampleInterpolator", "Resampler"]);
        let merged = record.to_parameter_map();
        let merged_keys: Vec<&str> = merged.keys().collect();
        assert_eq!(merged_keys, ["Transform", "ResampleInterpolator", "Resampler"]);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            transform_parameter_file_name(0, Some(1), Some(12)),
            PathBuf::from("TransformParameters.0.R1.It0000012.txt")
        );
        assert_eq!(
            transform_parameter_file_name(2, Some(0), None),
            PathBuf::from("TransformParameters.2.R0.txt")
        );
        assert_eq!(transform_parameter_file_name(0, None, None), PathBuf::from("TransformParameters.0.txt"));
        assert_eq!(iteration_info_file_name(0, 3), PathBuf::from("IterationInfo.0.R3.txt"));
    }

    #[test]
    fn test_atomic_write_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("TransformParameters.0.txt");
        let mut record = TransformParameterRecord::new();
        record.push_block(Category::Transform, "TranslationTransform", block("NumberOfParameters", "2"));
        record.write_atomic(&path).unwrap();

        let parsed = ParameterMap::from_file(&path).unwrap();
        assert_eq!(parsed.get_as::<usize>("NumberOfParameters", 0).unwrap(), Some(2));
        assert!(!path.with_extension("txt.tmp").exists());
    }
}
