use anyhow::{ensure, Context, Result};
use clap::{value_parser, Parser};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The pipeline entry point, looked up on the PATH unless configured otherwise.
pub const DEFAULT_EXECUTABLE: &str = "AmpliconSuite-pipeline.py";

/// The external tool does not parallelize meaningfully, so each job gets one thread.
pub const DEFAULT_THREADS: u32 = 1;

/// Everything the dispatcher needs to turn an index row into a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Folder holding `{sample_id}.mapped.bam` files.
    pub bam_dir: PathBuf,
    /// Folder holding the copy-number call files named in the index.
    pub cnv_dir: PathBuf,
    /// Root of the per-sample output folders.
    pub output_dir: PathBuf,
    /// The external annotation/data repository, shared read-only by all jobs.
    pub data_repo: PathBuf,
    pub executable: PathBuf,
    pub threads: u32,
    /// Directory containing the optimizer license, exported to the child process.
    pub license_dir: Option<PathBuf>,
    /// Check that inputs exist before launching.
    pub check_inputs: bool,
    /// Appended verbatim to every invocation.
    pub extra_args: Vec<String>,
}

impl DispatchConfig {
    pub fn new(
        bam_dir: impl Into<PathBuf>,
        cnv_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        data_repo: impl Into<PathBuf>,
    ) -> Self {
        DispatchConfig {
            bam_dir: bam_dir.into(),
            cnv_dir: cnv_dir.into(),
            output_dir: output_dir.into(),
            data_repo: data_repo.into(),
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            threads: DEFAULT_THREADS,
            license_dir: None,
            check_inputs: false,
            extra_args: Vec::new(),
        }
    }
}

/// The on-disk TOML form. Every key is optional so that the command line can
/// fill in or override any of them.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    bam_dir: Option<PathBuf>,
    cnv_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    data_repo: Option<PathBuf>,
    executable: Option<PathBuf>,
    threads: Option<u32>,
    license_dir: Option<PathBuf>,
    check_inputs: Option<bool>,
    #[serde(default)]
    extra_args: Vec<String>,
}

impl ConfigFile {
    fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
        toml::from_str(&s).with_context(|| format!("invalid config file {}", path.display()))
    }
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML file with any of the settings below. Command line values take
    /// precedence over values from the file.
    #[clap(long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Folder containing {sample_id}.mapped.bam files.
    #[clap(long, value_name = "PATH")]
    pub bam_dir: Option<PathBuf>,

    /// Folder containing the copy-number call files named in the index.
    #[clap(long, value_name = "PATH")]
    pub cnv_dir: Option<PathBuf>,

    /// Per-sample results are written to <OUTPUT_DIR>/<sample_id>.
    #[clap(long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Path to the AA data repository.
    #[clap(long, value_name = "PATH", env = "AA_DATA_REPO")]
    pub data_repo: Option<PathBuf>,

    /// Pipeline executable to launch. [default: AmpliconSuite-pipeline.py]
    #[clap(long, value_name = "PATH")]
    pub executable: Option<PathBuf>,

    /// Thread count passed to the pipeline. [default: 1]
    #[clap(long, value_name = "NUM", value_parser = value_parser!(u32).range(1..))]
    pub threads: Option<u32>,

    /// Directory containing the mosek.lic license file.
    #[clap(long, value_name = "PATH", env = "MOSEKLM_LICENSE_FILE")]
    pub license_dir: Option<PathBuf>,

    /// Check that the BAM, copy-number file, data repository and license
    /// exist before launching the pipeline.
    #[clap(long)]
    pub check_inputs: bool,
}

impl ConfigArgs {
    /// Merge the config file (if any) with the command line and check that
    /// every required setting ended up with a value.
    pub fn to_config(&self, extra_args: &[String]) -> Result<DispatchConfig> {
        let file = match &self.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };

        let required = |cli: &Option<PathBuf>, file: Option<PathBuf>, key: &str| {
            cli.clone().or(file).with_context(|| {
                format!(
                    "missing required setting '{key}': pass --{} or set it in the config file",
                    key.replace('_', "-")
                )
            })
        };

        let threads = self.threads.or(file.threads).unwrap_or(DEFAULT_THREADS);
        ensure!(threads > 0, "'threads' must be at least 1");

        let mut all_extra_args = file.extra_args;
        all_extra_args.extend(extra_args.iter().cloned());

        Ok(DispatchConfig {
            bam_dir: required(&self.bam_dir, file.bam_dir, "bam_dir")?,
            cnv_dir: required(&self.cnv_dir, file.cnv_dir, "cnv_dir")?,
            output_dir: required(&self.output_dir, file.output_dir, "output_dir")?,
            data_repo: required(&self.data_repo, file.data_repo, "data_repo")?,
            executable: self
                .executable
                .clone()
                .or(file.executable)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE)),
            threads,
            license_dir: self.license_dir.clone().or(file.license_dir),
            check_inputs: self.check_inputs || file.check_inputs.unwrap_or(false),
            extra_args: all_extra_args,
        })
    }
}
