//! Catalog of external tools and their argument templates.
//!
//! Each stage invokes exactly one program with a fixed argument shape.
//! The required-parameter set is declared per tool and checked during
//! argument assembly; a missing parameter is a configuration error and
//! never reaches process creation.

use indexmap::IndexMap;

use terranode_core::error::TaskError;

/// Stage parameters: name -> value, assembled by the stage runner.
pub type ToolParams = IndexMap<String, String>;

// ---------------------------------------------------------------------------
// Tool
// ---------------------------------------------------------------------------

/// Every external program the pipeline can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Primary reconstruction engine.
    Odm,
    /// Point-cloud format conversion (LAS -> LAZ).
    PdalTranslate,
    /// EPT octree build.
    EntwineBuild,
    /// Point-cloud summary statistics.
    PdalInfo,
    /// Mesh compression.
    DracoEncode,
    /// Raster optimization (GeoTIFF -> Cloud-Optimized GeoTIFF).
    GdalTranslateCog,
}

impl Tool {
    /// Stage-facing name, used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Odm => "odm",
            Self::PdalTranslate => "pdal-translate",
            Self::EntwineBuild => "entwine-build",
            Self::PdalInfo => "pdal-info",
            Self::DracoEncode => "draco-encode",
            Self::GdalTranslateCog => "gdal-translate-cog",
        }
    }

    /// The program binary to execute.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Odm => "python3",
            Self::PdalTranslate | Self::PdalInfo => "pdal",
            Self::EntwineBuild => "entwine",
            Self::DracoEncode => "draco_encoder",
            Self::GdalTranslateCog => "gdal_translate",
        }
    }

    /// The parameters a caller must supply for this tool.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            Self::Odm => &["project-path"],
            Self::PdalTranslate => &["input", "output"],
            Self::EntwineBuild => &["input", "output"],
            Self::PdalInfo => &["input"],
            Self::DracoEncode => &["input", "output"],
            Self::GdalTranslateCog => &["input", "output"],
        }
    }

    /// Assemble the fixed argument template for this tool.
    ///
    /// Fails with [`TaskError::Configuration`] if any required parameter
    /// is absent; no process is created in that case.
    pub fn build_args(&self, params: &ToolParams) -> Result<Vec<String>, TaskError> {
        for required in self.required_params() {
            if !params.contains_key(*required) {
                return Err(TaskError::Configuration(format!(
                    "Tool '{}' requires parameter '{required}'",
                    self.name()
                )));
            }
        }

        let get = |key: &str| params[key].clone();

        let args = match self {
            Self::Odm => vec![
                "run.py".to_string(),
                "--project-path".to_string(),
                get("project-path"),
            ],
            Self::PdalTranslate => vec!["translate".to_string(), get("input"), get("output")],
            Self::EntwineBuild => vec![
                "build".to_string(),
                "-i".to_string(),
                get("input"),
                "-o".to_string(),
                get("output"),
            ],
            Self::PdalInfo => vec!["info".to_string(), "--summary".to_string(), get("input")],
            Self::DracoEncode => vec![
                "-i".to_string(),
                get("input"),
                "-o".to_string(),
                get("output"),
                "-cl".to_string(),
                "7".to_string(),
            ],
            Self::GdalTranslateCog => vec![
                "-of".to_string(),
                "COG".to_string(),
                "-co".to_string(),
                "COMPRESS=DEFLATE".to_string(),
                get("input"),
                get("output"),
            ],
        };

        Ok(args)
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
