//! aa-dispatch
#![deny(missing_docs)]

use aa_wrap::config::ConfigArgs;
use aa_wrap::dispatch::{resolve, resolve_and_dispatch, ResolvedJob};
use aa_wrap::launcher::{DryRunLauncher, ProcessLauncher, SystemLauncher};
use aa_wrap::logging::init_log;
use aa_wrap::preflight::check_job_inputs;
use aa_wrap::template::{render_batch_script, TemplateParams, DISPATCHER_BIN};
use aa_wrap::utils::{print_error_chain, row_for_task, validate_ascii_identifier, IntoExitCode};
use anyhow::{Context, Result};
use clap::{self, value_parser, Parser};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

const CMD: &str = "aa-dispatch";

/// Launch the amplicon reconstruction pipeline on one sample of a batch array
#[derive(Parser, Debug)]
#[clap(name = CMD, version)]
struct AaDispatch {
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    /// Run the pipeline on the sample assigned to this array task.
    #[clap(name = "run")]
    Run(Run),

    /// Print the inputs and command resolved for an array task without running anything.
    #[clap(name = "resolve")]
    Resolve(Resolve),

    /// Print a SLURM array submission script with one task per index row.
    #[clap(name = "template")]
    Template(Template),
}

/// Which index row this process works on.
#[derive(Parser, Debug, Clone)]
struct TaskArgs {
    /// Index file with one sample_id,cnv_filename row per sample.
    #[clap(long, value_name = "CSV")]
    index: PathBuf,

    /// Array task index assigned by the batch scheduler.
    #[clap(long, value_name = "NUM", env = "SLURM_ARRAY_TASK_ID")]
    task_index: usize,

    /// Task index that maps onto the first row of the index file.
    #[clap(long, value_name = "NUM", default_value_t = 1)]
    first_task_index: usize,
}

impl TaskArgs {
    fn row_index(&self) -> Result<usize> {
        row_for_task(self.task_index, self.first_task_index)
    }
}

#[derive(Parser, Debug, Clone)]
struct Run {
    #[clap(flatten)]
    task: TaskArgs,

    #[clap(flatten)]
    config: ConfigArgs,

    /// Do not execute the pipeline.
    /// Print the command that would be run and stop.
    #[clap(long)]
    dry: bool,

    /// Additional arguments passed through to the pipeline, given after `--`.
    #[clap(last = true, value_name = "PIPELINE_ARGS")]
    pipeline_args: Vec<String>,
}

impl Run {
    fn execute(&self) -> Result<ExitCode> {
        let row = self.task.row_index()?;
        let config = self.config.to_config(&self.pipeline_args)?;
        let launcher: &dyn ProcessLauncher = if self.dry {
            &DryRunLauncher
        } else {
            &SystemLauncher
        };
        let report = resolve_and_dispatch(row, &self.task.index, &config, launcher)
            .with_context(|| format!("array task {}", self.task.task_index))?;
        Ok(report.status.into_exit_code())
    }
}

#[derive(Parser, Debug, Clone)]
struct Resolve {
    #[clap(flatten)]
    task: TaskArgs,

    #[clap(flatten)]
    config: ConfigArgs,

    /// Additional arguments passed through to the pipeline, given after `--`.
    #[clap(last = true, value_name = "PIPELINE_ARGS")]
    pipeline_args: Vec<String>,
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    #[serde(flatten)]
    job: &'a ResolvedJob,
    command_line: String,
}

impl Resolve {
    fn execute(&self) -> Result<ExitCode> {
        let row = self.task.row_index()?;
        let config = self.config.to_config(&self.pipeline_args)?;
        let job = resolve(row, &self.task.index, &config)
            .with_context(|| format!("array task {}", self.task.task_index))?;
        if config.check_inputs {
            check_job_inputs(&job, &config)?;
        }
        let output = ResolveOutput {
            job: &job,
            command_line: job.invocation(&config).command_line(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Parser, Debug, Clone)]
struct Template {
    /// Index file with one sample_id,cnv_filename row per sample.
    #[clap(long, value_name = "CSV")]
    index: PathBuf,

    /// Config file passed to every array task.
    #[clap(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Job name [a-zA-Z0-9_-]+.
    #[clap(long, default_value = "aa_dispatch", value_parser = validate_ascii_identifier)]
    job_name: String,

    /// Maximum number of array tasks running at the same time.
    #[clap(long, value_name = "NUM", value_parser = value_parser!(u32).range(1..))]
    max_parallel: Option<u32>,

    /// CPUs requested per task.
    #[clap(long, value_name = "NUM", default_value_t = 1, value_parser = value_parser!(u32).range(1..))]
    cpus_per_task: u32,

    /// Memory requested per task, in SLURM syntax (e.g. 16G).
    #[clap(long, value_name = "MEM")]
    mem: Option<String>,

    /// Wall time limit per task, in SLURM syntax (e.g. 24:00:00).
    #[clap(long, value_name = "TIME")]
    time: Option<String>,

    /// SLURM partition to submit to.
    #[clap(long, value_name = "NAME")]
    partition: Option<String>,

    /// Folder for per-task log files.
    #[clap(long, value_name = "PATH")]
    log_dir: Option<PathBuf>,

    /// Path of the dispatcher binary on the compute nodes.
    #[clap(long, value_name = "PATH", default_value = DISPATCHER_BIN)]
    dispatcher: PathBuf,
}

impl Template {
    fn execute(self) -> Result<ExitCode> {
        let params = TemplateParams {
            job_name: self.job_name,
            index_file: self.index,
            config_file: self.config,
            dispatcher: self.dispatcher,
            cpus_per_task: self.cpus_per_task,
            max_parallel: self.max_parallel,
            mem: self.mem,
            time: self.time,
            partition: self.partition,
            log_dir: self.log_dir,
        };
        print!("{}", render_batch_script(&params)?);
        Ok(ExitCode::SUCCESS)
    }
}

fn inner_main() -> Result<ExitCode> {
    init_log();
    let opts = AaDispatch::parse();
    match opts.subcmd {
        SubCommand::Run(args) => args.execute(),
        SubCommand::Resolve(args) => args.execute(),
        SubCommand::Template(args) => args.execute(),
    }
}

fn main() -> ExitCode {
    match inner_main() {
        Ok(exit_code) => exit_code,
        Err(err) => {
            print_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}
