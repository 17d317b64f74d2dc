use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use is_terminal::IsTerminal;
use serde_json::json;
use time::format_description::well_known::Rfc3339;

mod batch;
mod directory;
mod logging;
mod names;
mod reconcile;
mod report;
use directory::{DirectoryHandle, FsDirectory, ListFilter, visible_files};
use logging::{DEFAULT_LOG_DIR, RenameLog};
use names::render_names;
use reconcile::{PlanStep, RenameOutcome, RenamePlan};
use report::ReconciliationReport;

const STDIN_MARKER: &str = "-";

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Default)]
enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn should_color(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::List(cmd) => handle_list(cmd)?,
        Command::Rename(cmd) => handle_rename(cmd)?,
        Command::Batch(cmd) => handle_batch(cmd)?,
        Command::Log(cmd) => handle_log(cmd)?,
    }

    Ok(())
}

fn handle_list(cmd: ListCommand) -> Result<()> {
    let directory = resolve_directory(&cmd.directory)?;
    let filter = ListFilter::new(cmd.include_hidden, &cmd.exclude)?;
    let entries = FsDirectory::new(&directory)
        .list_entries()
        .with_context(|| format!("listing {}", directory.display()))?;
    let files = visible_files(&entries, &filter);
    if cmd.long {
        for entry in &files {
            let modified = entry
                .last_modified
                .format(&Rfc3339)
                .unwrap_or_else(|_| "unknown".into());
            println!("{:>12} {modified} {}", entry.size, entry.name);
        }
        return Ok(());
    }
    let names: Vec<&str> = files.iter().map(|entry| entry.name.as_str()).collect();
    let text = render_names(&names);

    let targets: Vec<&PathBuf> = [&cmd.before, &cmd.after].into_iter().flatten().collect();
    if targets.is_empty() {
        print!("{text}");
        return Ok(());
    }
    for target in targets {
        write_list_file(target, &text, cmd.force)?;
        println!("wrote {} name(s) to {}", names.len(), target.display());
    }
    Ok(())
}

fn handle_rename(cmd: RenameCommand) -> Result<()> {
    let (before_text, after_text) = read_lists(&cmd.before, &cmd.after)?;
    let directory = resolve_directory(&cmd.directory)?;
    let apply = cmd.run.apply;
    let summary = run_job(&cmd.run, &directory, &before_text, &after_text, apply)?;

    if cmd.clear {
        clear_list_files(&[cmd.before.as_path(), cmd.after.as_path()])?;
    }
    if summary.failed > 0 {
        bail!("{} of {} pair(s) failed", summary.failed, summary.total);
    }
    Ok(())
}

fn handle_batch(cmd: BatchCommand) -> Result<()> {
    let BatchCommand { run, jobs } = cmd;
    let job_file = batch::load_jobs(&jobs)?;
    if job_file.jobs.is_empty() {
        bail!("job file {} does not contain any jobs", jobs.display());
    }
    let base = jobs
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let total = job_file.jobs.len();
    let mut problems = 0usize;
    for (idx, job) in job_file.jobs.iter().enumerate() {
        if !run.json {
            println!(
                "\n=== Job {}/{}: {} ===",
                idx + 1,
                total,
                job.directory.display()
            );
        }
        let apply = job.apply.unwrap_or(run.apply);
        let outcome = job.load_lists(&base).and_then(|(before, after)| {
            let directory = resolve_directory(&job.directory_in(&base))?;
            run_job(&run, &directory, &before, &after, apply)
        });
        match outcome {
            Ok(summary) if summary.failed == 0 => {}
            Ok(_) => problems += 1,
            Err(err) => {
                eprintln!("error: {err:#}");
                problems += 1;
            }
        }
    }

    if problems > 0 {
        bail!("{problems} of {total} job(s) reported problems");
    }
    Ok(())
}

fn handle_log(cmd: LogCommand) -> Result<()> {
    let log = RenameLog::new(&cmd.log_dir);
    let entries = log.read_recent(cmd.tail)?;
    if entries.is_empty() {
        println!("rename log is empty.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "[{}] {:<10} {} -> {} ({})",
            entry.timestamp, entry.action, entry.original, entry.desired, entry.directory
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct JobSummary {
    total: usize,
    failed: usize,
}

/// Plans one directory, then previews or applies the plan.
fn run_job(
    opts: &RunArgs,
    directory: &Path,
    before_text: &str,
    after_text: &str,
    apply: bool,
) -> Result<JobSummary> {
    let colorize = opts.color.should_color() && !opts.json;
    let mut handle = FsDirectory::new(directory);
    let planned = reconcile::plan(before_text, after_text, &handle)
        .with_context(|| format!("planning renames in {}", directory.display()))?;

    if !opts.json {
        println!("directory: {}", directory.display());
        println!("mode: {}", if apply { "apply" } else { "dry-run" });
        println!(
            "pairs: {} ({} to rename)",
            planned.len(),
            planned.pending_renames()
        );
        println!("---");
    }

    if planned.is_empty() {
        if !opts.json {
            println!("nothing to rename: both lists are empty.");
        }
        return Ok(JobSummary::default());
    }

    if !apply {
        return Ok(preview_plan(&planned, opts.json, colorize));
    }

    let report = planned.execute(&mut handle);
    let log = (!opts.no_log).then(|| RenameLog::new(&opts.log_dir));
    print_report(
        &mut io::stdout().lock(),
        &report,
        directory,
        log.as_ref(),
        opts.json,
        colorize,
    )?;
    Ok(JobSummary {
        total: report.total(),
        failed: report.failed(),
    })
}

fn preview_plan(planned: &RenamePlan, json: bool, colorize: bool) -> JobSummary {
    let mut missing = 0usize;
    for step in planned.steps() {
        let label = match step.step {
            PlanStep::Skip => "skip",
            PlanStep::Rename(_) => "rename",
            PlanStep::Missing => {
                missing += 1;
                "missing"
            }
        };
        if json {
            let event = json!({
                "line": step.index + 1,
                "original": step.pair.original,
                "desired": step.pair.desired,
                "planned": label,
            });
            println!("{event}");
            continue;
        }
        if matches!(step.step, PlanStep::Skip) {
            continue;
        }
        let status = match step.step {
            PlanStep::Missing => paint(label, "31", colorize),
            _ => paint(label, "36", colorize),
        };
        println!(
            "{status:<8} {} -> {}",
            step.pair.original, step.pair.desired
        );
    }
    if !json {
        if missing > 0 {
            println!("{missing} original name(s) not found in the directory");
        }
        println!(
            "dry-run: rerun with --apply to rename {} file(s).",
            planned.pending_renames()
        );
    }
    JobSummary {
        total: planned.len(),
        failed: missing,
    }
}

fn print_report(
    out: &mut impl Write,
    report: &ReconciliationReport,
    directory: &Path,
    log: Option<&RenameLog>,
    json: bool,
    colorize: bool,
) -> Result<()> {
    for result in report.results() {
        let attempted = result.outcome != RenameOutcome::Skipped;
        if let Some(log) = log.filter(|_| attempted) {
            let _ = log.record(directory, result);
        }
        if json {
            writeln!(out, "{}", result.to_json())?;
            continue;
        }
        let status = match result.outcome {
            RenameOutcome::Applied => paint("applied", "32", colorize),
            RenameOutcome::Failed(reason) => paint(reason.label(), "31", colorize),
            RenameOutcome::Skipped => continue,
        };
        writeln!(
            out,
            "{status:<8} {} -> {}",
            result.pair.original, result.pair.desired
        )?;
    }
    if json {
        writeln!(out, "{}", report.to_json())?;
    } else {
        writeln!(out, "{report}")?;
    }
    Ok(())
}

fn paint(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

fn resolve_directory(path: &Path) -> Result<PathBuf> {
    let directory = fs::canonicalize(path)
        .with_context(|| format!("resolving directory {}", path.display()))?;
    if !directory.is_dir() {
        bail!("{} is not a directory", directory.display());
    }
    Ok(directory)
}

fn read_lists(before: &Path, after: &Path) -> Result<(String, String)> {
    if is_stdin(before) && is_stdin(after) {
        bail!("only one of --before/--after can be read from stdin");
    }
    Ok((read_list(before)?, read_list(after)?))
}

fn read_list(path: &Path) -> Result<String> {
    if is_stdin(path) {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("reading name list from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("reading name list {}", path.display()))
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == STDIN_MARKER
}

fn write_list_file(path: &Path, text: &str, force: bool) -> Result<()> {
    if !force {
        if let Ok(meta) = fs::metadata(path) {
            if meta.len() > 0 {
                bail!(
                    "refusing to overwrite non-empty {} (pass --force)",
                    path.display()
                );
            }
        }
    }
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn clear_list_files(paths: &[&Path]) -> Result<()> {
    for path in paths.iter().filter(|path| !is_stdin(path)) {
        fs::write(path, "").with_context(|| format!("clearing {}", path.display()))?;
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[command(
    name = "textrename",
    version,
    about = "Bulk-rename files by editing a list of names"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print or write the file names of a directory, one per line.
    List(ListCommand),
    /// Rename files so the names in --before become the names in --after.
    Rename(RenameCommand),
    /// Run several rename jobs from a YAML or JSON file.
    Batch(BatchCommand),
    /// Show recent entries of the rename log.
    Log(LogCommand),
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    apply: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    #[arg(long = "color", value_enum, default_value = "auto")]
    color: ColorChoice,
    #[arg(long = "log-dir", value_name = "DIR", default_value = DEFAULT_LOG_DIR, value_hint = ValueHint::DirPath)]
    log_dir: PathBuf,
    #[arg(long = "no-log", action = ArgAction::SetTrue)]
    no_log: bool,
}

#[derive(Debug, Args)]
struct ListCommand {
    #[arg(value_name = "DIR", value_hint = ValueHint::DirPath)]
    directory: PathBuf,
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    before: Option<PathBuf>,
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    after: Option<PathBuf>,
    #[arg(long, action = ArgAction::SetTrue)]
    force: bool,
    #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["before", "after"])]
    long: bool,
    #[arg(long = "include-hidden", action = ArgAction::SetTrue)]
    include_hidden: bool,
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
}

#[derive(Debug, Args)]
struct RenameCommand {
    #[command(flatten)]
    run: RunArgs,
    #[arg(value_name = "DIR", value_hint = ValueHint::DirPath)]
    directory: PathBuf,
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    before: PathBuf,
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    after: PathBuf,
    #[arg(long, action = ArgAction::SetTrue, requires = "apply")]
    clear: bool,
}

#[derive(Debug, Args)]
struct BatchCommand {
    #[command(flatten)]
    run: RunArgs,
    #[arg(value_name = "JOBS", value_hint = ValueHint::FilePath)]
    jobs: PathBuf,
}

#[derive(Debug, Args)]
struct LogCommand {
    #[arg(long = "tail", default_value_t = 20)]
    tail: usize,
    #[arg(long = "log-dir", value_name = "DIR", default_value = DEFAULT_LOG_DIR, value_hint = ValueHint::DirPath)]
    log_dir: PathBuf,
}
