//! Checks run before launching, when enabled with `check_inputs`.
//! Without them the paths are forwarded as-is and the pipeline reports
//! whatever is missing itself.

use crate::config::DispatchConfig;
use crate::dispatch::ResolvedJob;
use crate::errors::{DispatchError, InputKind};
use log::debug;
use std::path::Path;

/// Name of the optimizer license file the pipeline expects in the license directory.
pub const LICENSE_FILE_NAME: &str = "mosek.lic";

pub fn check_job_inputs(job: &ResolvedJob, config: &DispatchConfig) -> Result<(), DispatchError> {
    let missing = |kind, path: &Path| DispatchError::MissingInput {
        sample_id: job.sample_id.clone(),
        kind,
        path: path.to_path_buf(),
    };

    if !job.bam_path.is_file() {
        return Err(missing(InputKind::Bam, &job.bam_path));
    }
    if !job.cnv_path.is_file() {
        return Err(missing(InputKind::Cnv, &job.cnv_path));
    }
    if !config.data_repo.is_dir() {
        return Err(missing(InputKind::DataRepo, &config.data_repo));
    }
    if let Some(license_dir) = &config.license_dir {
        check_license_dir(license_dir)?;
    }
    debug!("inputs for sample {} are present", job.sample_id);
    Ok(())
}

/// The license variable names a directory; pointing it at the file itself is
/// a common mistake that the optimizer reports poorly.
pub fn check_license_dir(license_dir: &Path) -> Result<(), DispatchError> {
    if license_dir.to_string_lossy().ends_with(LICENSE_FILE_NAME) {
        return Err(DispatchError::LicensePath {
            path: license_dir.to_path_buf(),
        });
    }
    if !license_dir.join(LICENSE_FILE_NAME).is_file() {
        return Err(DispatchError::MissingLicense {
            path: license_dir.to_path_buf(),
        });
    }
    Ok(())
}
