//! Generate a SLURM array submission script for a job index.

use crate::index::JobIndex;
use anyhow::{ensure, Result};
use shell_escape::escape;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Name the dispatcher is installed under.
pub const DISPATCHER_BIN: &str = "aa-dispatch";

#[derive(Debug, Clone)]
pub struct TemplateParams {
    pub job_name: String,
    pub index_file: PathBuf,
    pub config_file: Option<PathBuf>,
    /// Path to the dispatcher binary used inside the script.
    pub dispatcher: PathBuf,
    pub cpus_per_task: u32,
    /// Maximum number of array tasks running at once.
    pub max_parallel: Option<u32>,
    pub mem: Option<String>,
    pub time: Option<String>,
    pub partition: Option<String>,
    /// Folder for the per-task stdout/stderr logs.
    pub log_dir: Option<PathBuf>,
}

impl TemplateParams {
    pub fn new(job_name: impl Into<String>, index_file: impl Into<PathBuf>) -> Self {
        TemplateParams {
            job_name: job_name.into(),
            index_file: index_file.into(),
            config_file: None,
            dispatcher: PathBuf::from(DISPATCHER_BIN),
            cpus_per_task: 1,
            max_parallel: None,
            mem: None,
            time: None,
            partition: None,
            log_dir: None,
        }
    }
}

/// `#SBATCH` directives end at the first whitespace, so values must not contain any.
fn check_directive_value(option: &str, value: &str) -> Result<()> {
    ensure!(
        !value.is_empty() && !value.chars().any(|c| c.is_whitespace() || c.is_control()),
        "invalid --{option} {value:?}: must be non-empty and contain no whitespace"
    );
    Ok(())
}

fn escape_path(path: &Path) -> String {
    escape(path.to_string_lossy()).into_owned()
}

/// Render the script, with one array task per row of the index file.
pub fn render_batch_script(params: &TemplateParams) -> Result<String> {
    let num_rows = JobIndex::new(&params.index_file).num_rows()?;
    ensure!(
        num_rows > 0,
        "The index file {:?} has no rows to submit.",
        params.index_file
    );

    for (option, value) in [
        ("mem", params.mem.as_deref()),
        ("time", params.time.as_deref()),
        ("partition", params.partition.as_deref()),
    ] {
        if let Some(value) = value {
            check_directive_value(option, value)?;
        }
    }
    if let Some(log_dir) = &params.log_dir {
        check_directive_value("log-dir", &log_dir.to_string_lossy())?;
    }

    let mut array = format!("1-{num_rows}");
    if let Some(max_parallel) = params.max_parallel {
        write!(array, "%{max_parallel}")?;
    }

    let mut script = String::from("#!/usr/bin/env bash\n");
    writeln!(script, "#SBATCH --job-name={}", params.job_name)?;
    writeln!(script, "#SBATCH --array={array}")?;
    writeln!(script, "#SBATCH --ntasks=1")?;
    writeln!(script, "#SBATCH --cpus-per-task={}", params.cpus_per_task)?;
    if let Some(mem) = &params.mem {
        writeln!(script, "#SBATCH --mem={mem}")?;
    }
    if let Some(time) = &params.time {
        writeln!(script, "#SBATCH --time={time}")?;
    }
    if let Some(partition) = &params.partition {
        writeln!(script, "#SBATCH --partition={partition}")?;
    }
    let log_dir = params.log_dir.as_deref().unwrap_or(Path::new("."));
    writeln!(
        script,
        "#SBATCH --output={}/%x_%A_%a.log",
        log_dir.display()
    )?;
    script.push('\n');
    script.push_str("set -euo pipefail\n\n");

    write!(
        script,
        "exec {} run --index {}",
        escape_path(&params.dispatcher),
        escape_path(&params.index_file)
    )?;
    if let Some(config_file) = &params.config_file {
        write!(script, " --config {}", escape_path(config_file))?;
    }
    script.push_str(" --task-index \"$SLURM_ARRAY_TASK_ID\"\n");
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn test_render() -> Result<()> {
        let mut index = NamedTempFile::new()?;
        index.write_all(b"sampleA,cnv_A.txt\nsampleB,cnv_B.txt\r\nsampleC,cnv_C.txt\n\n")?;

        let mut params = TemplateParams::new("aa_batch", index.path());
        params.config_file = Some("/data/aa.toml".into());
        params.max_parallel = Some(2);
        params.mem = Some("16G".to_string());
        params.log_dir = Some("/scratch/logs".into());

        let expected = format!(
            "#!/usr/bin/env bash\n\
             #SBATCH --job-name=aa_batch\n\
             #SBATCH --array=1-3%2\n\
             #SBATCH --ntasks=1\n\
             #SBATCH --cpus-per-task=1\n\
             #SBATCH --mem=16G\n\
             #SBATCH --output=/scratch/logs/%x_%A_%a.log\n\
             \n\
             set -euo pipefail\n\
             \n\
             exec aa-dispatch run --index {} --config /data/aa.toml \
             --task-index \"$SLURM_ARRAY_TASK_ID\"\n",
            escape_path(index.path())
        );
        assert_eq!(render_batch_script(&params)?, expected);
        Ok(())
    }

    #[test]
    fn test_escapes_paths() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let index_path = dir.path().join("my samples.csv");
        std::fs::write(&index_path, "sampleA,cnv_A.txt\n")?;

        let script = render_batch_script(&TemplateParams::new("aa", &index_path))?;
        assert!(script.contains("#SBATCH --array=1-1\n"), "{script}");
        assert!(
            script.contains(&format!("--index '{}'", index_path.display())),
            "{script}"
        );
        Ok(())
    }

    #[test]
    fn test_rejects_broken_directives() -> Result<()> {
        let mut index = NamedTempFile::new()?;
        index.write_all(b"sampleA,cnv_A.txt\n")?;

        let mut params = TemplateParams::new("aa", index.path());
        params.mem = Some("16G\n#SBATCH --exclusive".to_string());
        assert!(render_batch_script(&params).is_err());

        let mut params = TemplateParams::new("aa", index.path());
        params.partition = Some("long queue".to_string());
        assert!(render_batch_script(&params).is_err());

        let mut params = TemplateParams::new("aa", index.path());
        params.log_dir = Some("/scratch/my logs".into());
        assert!(render_batch_script(&params).is_err());

        let mut params = TemplateParams::new("aa", index.path());
        params.time = Some("24:00:00".to_string());
        assert!(render_batch_script(&params)?.contains("#SBATCH --time=24:00:00\n"));
        Ok(())
    }

    #[test]
    fn test_empty_index() -> Result<()> {
        let index = NamedTempFile::new()?;
        let params = TemplateParams::new("aa", index.path());
        assert!(render_batch_script(&params).is_err());
        Ok(())
    }
}
