//! Turning one index row into one pipeline launch.

use crate::config::DispatchConfig;
use crate::errors::DispatchError;
use crate::index::{IndexRecord, JobIndex};
use crate::launcher::{PipelineInvocation, ProcessLauncher};
use crate::preflight::check_job_inputs;
use log::{info, warn};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Suffix of the aligned reads file expected for each sample.
pub const BAM_SUFFIX: &str = ".mapped.bam";

/// Environment variable through which the optimizer finds its license.
pub const LICENSE_ENV_VAR: &str = "MOSEKLM_LICENSE_FILE";

/// The inputs and output location of one sample's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedJob {
    pub row: usize,
    pub sample_id: String,
    pub bam_path: PathBuf,
    pub cnv_path: PathBuf,
    pub output_path: PathBuf,
}

impl ResolvedJob {
    pub fn from_record(record: &IndexRecord, config: &DispatchConfig) -> Self {
        ResolvedJob {
            row: record.row,
            sample_id: record.sample_id.clone(),
            bam_path: config
                .bam_dir
                .join(format!("{}{BAM_SUFFIX}", record.sample_id)),
            cnv_path: config.cnv_dir.join(&record.cnv_filename),
            output_path: config.output_dir.join(&record.sample_id),
        }
    }

    /// Build the pipeline command line for this job.
    pub fn invocation(&self, config: &DispatchConfig) -> PipelineInvocation {
        let mut args: Vec<OsString> = vec![
            "-o".into(),
            self.output_path.clone().into(),
            "-t".into(),
            config.threads.to_string().into(),
            "--bam".into(),
            self.bam_path.clone().into(),
            "--scna_file".into(),
            self.cnv_path.clone().into(),
            "--data_repo".into(),
            config.data_repo.clone().into(),
        ];
        args.extend(config.extra_args.iter().map(OsString::from));

        let envs: Vec<(String, OsString)> = config
            .license_dir
            .iter()
            .map(|dir| (LICENSE_ENV_VAR.to_string(), dir.clone().into_os_string()))
            .collect();

        PipelineInvocation {
            program: config.executable.clone(),
            args,
            envs,
        }
    }
}

/// How a dispatched job exited.
#[derive(Debug)]
pub struct DispatchReport {
    pub job: ResolvedJob,
    pub status: ExitStatus,
}

impl DispatchReport {
    /// The pipeline's failure as an error, for reporting. The exit status
    /// itself is still what gets passed back to the scheduler.
    pub fn failure(&self) -> Option<DispatchError> {
        (!self.status.success()).then(|| DispatchError::ExternalProcessFailure {
            sample_id: self.job.sample_id.clone(),
            row: self.job.row,
            status: self.status,
        })
    }
}

/// Read row `row_index` (1-based) of the index and resolve its paths.
pub fn resolve(
    row_index: usize,
    index_file_path: &Path,
    config: &DispatchConfig,
) -> Result<ResolvedJob, DispatchError> {
    let record = JobIndex::new(index_file_path).record(row_index)?;
    Ok(ResolvedJob::from_record(&record, config))
}

/// Resolve row `row_index` (1-based) of the index and launch the pipeline on it.
/// Nothing is launched if resolution or the optional input checks fail.
pub fn resolve_and_dispatch(
    row_index: usize,
    index_file_path: &Path,
    config: &DispatchConfig,
    launcher: &dyn ProcessLauncher,
) -> Result<DispatchReport, DispatchError> {
    let job = resolve(row_index, index_file_path, config)?;
    if config.check_inputs {
        check_job_inputs(&job, config)?;
    }

    let invocation = job.invocation(config);
    info!(
        "dispatching row {} of {}: sample {} -> {}",
        job.row,
        index_file_path.display(),
        job.sample_id,
        job.output_path.display()
    );
    let status = launcher
        .launch(&invocation)
        .map_err(|source| DispatchError::Launch {
            sample_id: job.sample_id.clone(),
            program: invocation.program.clone(),
            source,
        })?;

    let report = DispatchReport { job, status };
    if let Some(err) = report.failure() {
        warn!("{err}");
    } else {
        info!("sample {} finished", report.job.sample_id);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::io::Write;
    use std::os::unix::process::ExitStatusExt;
    use tempfile::NamedTempFile;

    /// Records every invocation and exits with a fixed code.
    struct FakeLauncher {
        code: i32,
        calls: RefCell<Vec<PipelineInvocation>>,
    }

    impl FakeLauncher {
        fn exiting_with(code: i32) -> Self {
            FakeLauncher {
                code,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessLauncher for FakeLauncher {
        fn launch(&self, invocation: &PipelineInvocation) -> std::io::Result<ExitStatus> {
            self.calls.borrow_mut().push(invocation.clone());
            Ok(ExitStatus::from_raw(self.code << 8))
        }
    }

    struct FailingLauncher;

    impl ProcessLauncher for FailingLauncher {
        fn launch(&self, _: &PipelineInvocation) -> std::io::Result<ExitStatus> {
            Err(std::io::Error::from(std::io::ErrorKind::NotFound))
        }
    }

    fn index_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn config() -> DispatchConfig {
        DispatchConfig::new("/BAM", "/CNV", "/AA_RESULT", "/data_repo")
    }

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_end_to_end_second_row() -> anyhow::Result<()> {
        let index = index_file("sampleA,cnv_A.txt\nsampleB,cnv_B.txt\r\n");
        let launcher = FakeLauncher::exiting_with(0);

        let report = resolve_and_dispatch(2, index.path(), &config(), &launcher)?;
        assert!(report.status.success());
        assert!(report.failure().is_none());
        assert_eq!(
            report.job,
            ResolvedJob {
                row: 2,
                sample_id: "sampleB".to_string(),
                bam_path: "/BAM/sampleB.mapped.bam".into(),
                cnv_path: "/CNV/cnv_B.txt".into(),
                output_path: "/AA_RESULT/sampleB".into(),
            }
        );

        let calls = launcher.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            PipelineInvocation {
                program: "AmpliconSuite-pipeline.py".into(),
                args: os_args(&[
                    "-o",
                    "/AA_RESULT/sampleB",
                    "-t",
                    "1",
                    "--bam",
                    "/BAM/sampleB.mapped.bam",
                    "--scna_file",
                    "/CNV/cnv_B.txt",
                    "--data_repo",
                    "/data_repo",
                ]),
                envs: vec![],
            }
        );
        Ok(())
    }

    #[test]
    fn test_errors_do_not_launch() {
        let index = index_file("sampleA,cnv_A.txt\nsampleB,cnv_B.txt\r\nsampleC\n");
        let launcher = FakeLauncher::exiting_with(0);

        assert!(matches!(
            resolve_and_dispatch(4, index.path(), &config(), &launcher),
            Err(DispatchError::IndexOutOfRange { row: 4, num_rows: 3, .. })
        ));
        assert!(matches!(
            resolve_and_dispatch(3, index.path(), &config(), &launcher),
            Err(DispatchError::MalformedIndex { row: 3, field: "cnv_filename", .. })
        ));

        let mut checked = config();
        checked.check_inputs = true;
        assert!(matches!(
            resolve_and_dispatch(1, index.path(), &checked, &launcher),
            Err(DispatchError::MissingInput { .. })
        ));

        assert!(launcher.calls.borrow().is_empty());
    }

    #[test]
    fn test_exit_status_passes_through() -> anyhow::Result<()> {
        let index = index_file("sampleA,cnv_A.txt\n");
        let launcher = FakeLauncher::exiting_with(7);
        let report = resolve_and_dispatch(1, index.path(), &config(), &launcher)?;
        assert_eq!(report.status.code(), Some(7));
        assert!(matches!(
            report.failure(),
            Some(DispatchError::ExternalProcessFailure { row: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_launch_failure() {
        let index = index_file("sampleA,cnv_A.txt\n");
        assert!(matches!(
            resolve_and_dispatch(1, index.path(), &config(), &FailingLauncher),
            Err(DispatchError::Launch { .. })
        ));
    }

    #[test]
    fn test_invocation_is_deterministic() -> anyhow::Result<()> {
        let index = index_file("sampleA,cnv_A.txt\n");
        let mut config = config();
        config.threads = 2;
        config.executable = "/opt/aa/pipeline".into();
        config.license_dir = Some("/opt/mosek".into());
        config.extra_args = vec!["--run_AA".to_string()];

        let first = resolve(1, index.path(), &config)?.invocation(&config);
        let second = resolve(1, index.path(), &config)?.invocation(&config);
        assert_eq!(first, second);
        assert_eq!(first.program, PathBuf::from("/opt/aa/pipeline"));
        assert_eq!(first.args[3], OsString::from("2"));
        assert_eq!(first.args.last(), Some(&OsString::from("--run_AA")));
        assert_eq!(
            first.envs,
            vec![(LICENSE_ENV_VAR.to_string(), OsString::from("/opt/mosek"))]
        );
        Ok(())
    }

    #[test]
    fn test_output_paths_are_disjoint() -> anyhow::Result<()> {
        let index = index_file("s1,a.txt\ns2,a.txt\ns3,b.txt\n");
        let outputs: Vec<_> = (1..=3)
            .map(|row| resolve(row, index.path(), &config()).map(|job| job.output_path))
            .collect::<Result<_, _>>()?;
        assert_eq!(
            outputs,
            vec![
                PathBuf::from("/AA_RESULT/s1"),
                PathBuf::from("/AA_RESULT/s2"),
                PathBuf::from("/AA_RESULT/s3"),
            ]
        );
        Ok(())
    }
}
