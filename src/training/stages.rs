//! Training stages and their command lines
//!
//! Argument lists are built deterministically from the run's paths so any
//! failing invocation can be replayed by hand from the logs.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use super::error::TrainingError;
use crate::config::ToolchainConfig;

/// One step of a training run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Rewrite the source image at the configured DPI
    DpiCorrection,
    /// Structural check of the box file
    GroundTruthValidation,
    /// `tesseract ... nobatch box.train`, produces the `.tr` feature file
    TrFileGeneration,
    /// `unicharset_extractor`, produces `unicharset`
    UnicharsetExtraction,
    /// `mftraining`, shape features
    FeatureTraining,
    /// `cntraining`, character normalization prototypes
    ClassifierTraining,
    /// `combine_tessdata`, assembles the trained model
    ModelCombination,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::DpiCorrection => "dpi_correction",
            Stage::GroundTruthValidation => "ground_truth_validation",
            Stage::TrFileGeneration => "box.train",
            Stage::UnicharsetExtraction => "unicharset_extractor",
            Stage::FeatureTraining => "mftraining",
            Stage::ClassifierTraining => "cntraining",
            Stage::ModelCombination => "combine_tessdata",
        }
    }
}

#[cfg(test)]
impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 7] = [
        Stage::DpiCorrection,
        Stage::GroundTruthValidation,
        Stage::TrFileGeneration,
        Stage::UnicharsetExtraction,
        Stage::FeatureTraining,
        Stage::ClassifierTraining,
        Stage::ModelCombination,
    ];

    /// Stages that run an external command
    pub const EXTERNAL: [Stage; 5] = [
        Stage::TrFileGeneration,
        Stage::UnicharsetExtraction,
        Stage::FeatureTraining,
        Stage::ClassifierTraining,
        Stage::ModelCombination,
    ];

    pub fn is_external(&self) -> bool {
        Self::EXTERNAL.contains(self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classifier outputs written under fixed names into the working directory
pub const CLASSIFIER_OUTPUTS: [&str; 4] = ["inttemp", "pffmtable", "shapetable", "normproto"];

/// Font description file mftraining reads from its working directory
pub const FONT_PROPERTIES: &str = "font_properties";

/// File locations of one run, all absolute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub run_id: String,
    pub source_image: PathBuf,
    pub ground_truth: PathBuf,
    /// DPI-corrected TIFF handed to tesseract
    pub normalized_image: PathBuf,
    /// Copy of the ground truth beside the normalized image, where box.train looks for it
    pub staged_ground_truth: PathBuf,
    /// Toolchain working directory
    pub output_dir: PathBuf,
    /// `<output_dir>/<run_id>`, the prefix of every per-run artifact
    pub output_base: PathBuf,
}

impl RunPaths {
    pub fn resolve(
        run_id: &str,
        source_image: &Path,
        ground_truth: &Path,
        normalized_dir: &Path,
        output_dir: &Path,
    ) -> Result<Self, TrainingError> {
        let absolute = |path: &Path| {
            std::path::absolute(path).map_err(|source| TrainingError::Workspace {
                path: path.to_path_buf(),
                source,
            })
        };

        let ground_truth = absolute(ground_truth)?;
        let normalized_dir = absolute(normalized_dir)?;
        let output_dir = absolute(output_dir)?;
        let staged_name = match ground_truth.extension() {
            Some(ext) => {
                let mut name = OsString::from(run_id);
                name.push(".");
                name.push(ext);
                name
            }
            None => OsString::from(run_id),
        };

        Ok(Self {
            run_id: run_id.to_string(),
            source_image: absolute(source_image)?,
            normalized_image: normalized_dir.join(format!("{}.tiff", run_id)),
            staged_ground_truth: normalized_dir.join(staged_name),
            ground_truth,
            output_base: output_dir.join(run_id),
            output_dir,
        })
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut path = self.output_base.clone().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }

    /// `.tr` feature file written by box.train
    pub fn tr_file(&self) -> PathBuf {
        self.with_suffix(".tr")
    }

    /// `unicharset` written by unicharset_extractor
    pub fn unicharset(&self) -> PathBuf {
        self.output_dir.join("unicharset")
    }

    /// Unicharset written by mftraining under the run prefix
    pub fn prefixed_unicharset(&self) -> PathBuf {
        self.with_suffix(".unicharset")
    }

    /// Prefix argument for combine_tessdata, trailing dot included
    ///
    /// combine_tessdata appends component names straight onto this, so
    /// `<prefix>traineddata` is [`RunPaths::model`].
    pub fn combine_prefix(&self) -> PathBuf {
        self.with_suffix(".")
    }

    /// Classifier output renamed under the run prefix
    pub fn prefixed(&self, name: &str) -> PathBuf {
        self.with_suffix(&format!(".{}", name))
    }

    /// Combined trained model
    pub fn model(&self) -> PathBuf {
        self.with_suffix(".traineddata")
    }
}

/// A fully resolved external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub stage: Stage,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
}

impl StageCommand {
    /// Shell-like rendering for logs
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Build the command for an external stage, `None` for in-process stages
pub fn build_command(stage: Stage, paths: &RunPaths, tools: &ToolchainConfig) -> Option<StageCommand> {
    let (program, args): (&Path, Vec<OsString>) = match stage {
        Stage::DpiCorrection | Stage::GroundTruthValidation => return None,
        Stage::TrFileGeneration => (
            tools.tesseract.as_path(),
            vec![
                paths.normalized_image.clone().into(),
                paths.output_base.clone().into(),
                "nobatch".into(),
                "box.train".into(),
            ],
        ),
        Stage::UnicharsetExtraction => (
            tools.unicharset_extractor.as_path(),
            vec![paths.ground_truth.clone().into()],
        ),
        Stage::FeatureTraining => (
            tools.mftraining.as_path(),
            vec![
                "-F".into(),
                FONT_PROPERTIES.into(),
                "-U".into(),
                paths.unicharset().into(),
                "-O".into(),
                paths.prefixed_unicharset().into(),
                paths.tr_file().into(),
            ],
        ),
        Stage::ClassifierTraining => (tools.cntraining.as_path(), vec![paths.tr_file().into()]),
        Stage::ModelCombination => (
            tools.combine_tessdata.as_path(),
            vec![paths.combine_prefix().into()],
        ),
    };

    Some(StageCommand {
        stage,
        program: program.to_path_buf(),
        args,
        working_dir: paths.output_dir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> RunPaths {
        RunPaths::resolve(
            "doc",
            Path::new("/data/tiff/doc.tiff"),
            Path::new("/data/boxes/doc.box"),
            Path::new("/data/normalized"),
            Path::new("/data/out"),
        )
        .unwrap()
    }

    fn args(command: &StageCommand) -> Vec<String> {
        command
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_resolve_paths() {
        let paths = paths();
        assert_eq!(paths.normalized_image, PathBuf::from("/data/normalized/doc.tiff"));
        assert_eq!(paths.staged_ground_truth, PathBuf::from("/data/normalized/doc.box"));
        assert_eq!(paths.tr_file(), PathBuf::from("/data/out/doc.tr"));
        assert_eq!(paths.unicharset(), PathBuf::from("/data/out/unicharset"));
        assert_eq!(paths.prefixed("inttemp"), PathBuf::from("/data/out/doc.inttemp"));
        assert_eq!(paths.model(), PathBuf::from("/data/out/doc.traineddata"));
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let paths = RunPaths::resolve(
            "doc",
            Path::new("images/tiff/doc.tiff"),
            Path::new("boxes/doc.box"),
            Path::new("images/normalized"),
            Path::new("training_output"),
        )
        .unwrap();
        assert!(paths.source_image.is_absolute());
        assert!(paths.ground_truth.is_absolute());
        assert!(paths.output_dir.is_absolute());
        assert!(paths.normalized_image.is_absolute());
    }

    #[test]
    fn test_in_process_stages_have_no_command() {
        let tools = ToolchainConfig::default();
        assert!(build_command(Stage::DpiCorrection, &paths(), &tools).is_none());
        assert!(build_command(Stage::GroundTruthValidation, &paths(), &tools).is_none());
    }

    #[test]
    fn test_command_arguments() {
        let tools = ToolchainConfig::default();
        let paths = paths();

        let tr = build_command(Stage::TrFileGeneration, &paths, &tools).unwrap();
        assert_eq!(tr.program, PathBuf::from("tesseract"));
        assert_eq!(
            args(&tr),
            vec!["/data/normalized/doc.tiff", "/data/out/doc", "nobatch", "box.train"]
        );
        assert_eq!(tr.working_dir, PathBuf::from("/data/out"));

        let unichar = build_command(Stage::UnicharsetExtraction, &paths, &tools).unwrap();
        assert_eq!(unichar.program, PathBuf::from("unicharset_extractor"));
        assert_eq!(args(&unichar), vec!["/data/boxes/doc.box"]);

        let mf = build_command(Stage::FeatureTraining, &paths, &tools).unwrap();
        assert_eq!(
            args(&mf),
            vec![
                "-F",
                "font_properties",
                "-U",
                "/data/out/unicharset",
                "-O",
                "/data/out/doc.unicharset",
                "/data/out/doc.tr",
            ]
        );

        let cn = build_command(Stage::ClassifierTraining, &paths, &tools).unwrap();
        assert_eq!(args(&cn), vec!["/data/out/doc.tr"]);

        let combine = build_command(Stage::ModelCombination, &paths, &tools).unwrap();
        assert_eq!(combine.program, PathBuf::from("combine_tessdata"));
        assert_eq!(args(&combine), vec!["/data/out/doc."]);
    }

    #[test]
    fn test_combine_prefix_names_every_component() {
        let paths = paths();
        let prefix = paths.combine_prefix().into_os_string().into_string().unwrap();
        assert_eq!(prefix, "/data/out/doc.");
        assert_eq!(PathBuf::from(format!("{}traineddata", prefix)), paths.model());
        assert_eq!(PathBuf::from(format!("{}unicharset", prefix)), paths.prefixed_unicharset());
        for name in CLASSIFIER_OUTPUTS {
            assert_eq!(PathBuf::from(format!("{}{}", prefix, name)), paths.prefixed(name));
        }
    }

    #[test]
    fn test_command_line_rendering() {
        let command = build_command(Stage::ClassifierTraining, &paths(), &ToolchainConfig::default()).unwrap();
        assert_eq!(command.command_line(), "cntraining /data/out/doc.tr");
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::ALL[0], Stage::DpiCorrection);
        assert_eq!(Stage::ALL[6], Stage::ModelCombination);
        assert!(!Stage::GroundTruthValidation.is_external());
        assert!(Stage::FeatureTraining.is_external());
        assert_eq!(&Stage::ALL[2..], &Stage::EXTERNAL[..]);
    }
}
