mod backend;
mod completion;
mod debversion;
mod disk;
mod exit_codes;
mod identity;
mod render;
mod runner;
mod update;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use limitapt_core::{TaskKind, TaskSet};
use limitapt_policy::Modes;
use limitapt_state::{current_unix_timestamp, StateLayout, StateStore};
use tracing_subscriber::EnvFilter;

use crate::backend::SnapshotUniverse;
use crate::completion::write_completions_script;
use crate::disk::FsSpaceGauge;
use crate::exit_codes::{exit_code_for, GOOD};
use crate::identity::{invoking_login, GroupDatabase, Identity};
use crate::render::{
    current_output_style, format_enclosure_rules, package_label, render_status_line,
    ConsoleNotifications, ConsoleProgress, OutputStyle,
};
use crate::runner::{
    enclosed_packages, fix_interrupted, ignore_interrupted, list_of_mine, run_operation,
    Environment, Outcome, Request, Session,
};
use crate::update::{run_update, SourceFetcher};

#[derive(Parser, Debug)]
#[command(name = "limitapt")]
#[command(about = "Package management for users without root privileges", long_about = None)]
struct Cli {
    /// Show package architectures
    #[arg(short = 'a', long, global = true)]
    show_arch: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[arg(short, long, global = true)]
    debug: bool,
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Act for this user (root only)
    #[arg(long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy, Default)]
struct OperationArgs {
    /// Show what would happen without changing anything
    #[arg(short, long)]
    simulate: bool,
    #[arg(short = 'y', long)]
    assume_yes: bool,
    /// Stop at the first denied change
    #[arg(short, long)]
    fatal_errors: bool,
    /// Let root override denials
    #[arg(long)]
    force: bool,
    #[arg(short = 'P', long)]
    purge_unused: bool,
    /// Also remove dependencies nothing needs any more
    #[arg(short = 'D', long)]
    remove_dependencies: bool,
}

impl OperationArgs {
    fn modes(self) -> Modes {
        Modes {
            force: self.force,
            fatal_errors: self.fatal_errors,
            remove_dependencies: self.remove_dependencies,
            purge_unused: self.purge_unused,
            assume_yes: self.assume_yes,
            simulate: self.simulate,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Refresh package lists, enclosures and debconf priorities
    Update,
    Install {
        #[command(flatten)]
        args: OperationArgs,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    Remove {
        #[command(flatten)]
        args: OperationArgs,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    PhysicallyRemove {
        #[command(flatten)]
        args: OperationArgs,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    Purge {
        #[command(flatten)]
        args: OperationArgs,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    Markauto {
        #[command(flatten)]
        args: OperationArgs,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    Unmarkauto {
        #[command(flatten)]
        args: OperationArgs,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Several operations at once: `pkg+` install, `pkg-` remove, `pkg&M` markauto,
    /// `pkg&m` unmarkauto
    Diverse {
        #[command(flatten)]
        args: OperationArgs,
        #[arg(required = true, allow_hyphen_values = true)]
        operands: Vec<String>,
    },
    SafeUpgrade {
        #[command(flatten)]
        args: OperationArgs,
    },
    FullUpgrade {
        #[command(flatten)]
        args: OperationArgs,
    },
    /// List packages you are an owner of
    ListOfMine,
    /// List packages simple users may install
    PrintEnclosure {
        /// Print every enclosure rule with its versions
        #[arg(short = 'r', long)]
        versions: bool,
    },
    /// Resume the operation recorded before an interruption
    FixInterrupted {
        #[arg(short = 'y', long)]
        assume_yes: bool,
    },
    /// Forget the operation recorded before an interruption
    IgnoreInterrupted,
    Completions {
        shell: Shell,
    },
}

fn task_set(kind: TaskKind, packages: &[String]) -> TaskSet {
    let mut tasks = TaskSet::new();
    for package in packages {
        tasks.push(kind, package.as_str());
    }
    tasks
}

fn diverse_task_set(operands: &[String]) -> Result<TaskSet> {
    let mut tasks = TaskSet::new();
    for operand in operands {
        let (kind, name) = TaskKind::from_suffixed(operand).ok_or_else(|| {
            anyhow!("invalid operand '{operand}': expected a '+', '-', '&M' or '&m' suffix")
        })?;
        tasks.push(kind, name);
    }
    Ok(tasks)
}

fn init_tracing(verbose: bool, debug: bool) {
    let default_level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);
    let style = current_output_style();
    match run_cli(cli, style) {
        Ok(()) => ExitCode::from(GOOD),
        Err(err) => {
            eprintln!(
                "{}",
                render_status_line(style, "err", &format!("error: {err:#}"))
            );
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run_cli(cli: Cli, style: OutputStyle) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        return write_completions_script(shell, &mut io::stdout());
    }

    let show_arch = cli.show_arch;
    let store = StateStore::new(StateLayout::resolve(cli.state_dir.as_deref()));
    let settings = store.load_settings()?;
    let groups = GroupDatabase::load(&settings.paths.group_file)?;
    let login = invoking_login(cli.user.as_deref())?;
    let identity = Identity::resolve(&login, &groups, &settings.groups)?;
    let session = Session {
        store: &store,
        settings: &settings,
        groups: &groups,
        identity: &identity,
    };
    let console = Console { style, show_arch };

    match cli.command {
        Commands::Update => {
            let mut fetcher = SourceFetcher::new(style);
            let report = run_update(&session, &mut fetcher, current_unix_timestamp())?;
            match report.packages {
                Some(count) => {
                    console.status("ok", &format!("package lists refreshed ({count} packages)"))
                }
                None => console.status("info", "package lists were not refreshed"),
            }
            for source in &report.enclosures {
                console.status("ok", &format!("enclosure source '{source}' updated"));
            }
            for source in &report.pruned {
                console.status("info", &format!("enclosure source '{source}' removed"));
            }
            if let Some(count) = report.debconf_priorities {
                console.status(
                    "ok",
                    &format!("debconf priorities updated ({count} packages)"),
                );
            }
        }
        Commands::Install { args, packages } => {
            console.operate(
                &session,
                args.modes(),
                &Request::Tasks(task_set(TaskKind::Install, &packages)),
            )?;
        }
        Commands::Remove { args, packages } => {
            console.operate(
                &session,
                args.modes(),
                &Request::Tasks(task_set(TaskKind::Remove, &packages)),
            )?;
        }
        Commands::PhysicallyRemove { args, packages } => {
            console.operate(
                &session,
                args.modes(),
                &Request::Tasks(task_set(TaskKind::PhysicallyRemove, &packages)),
            )?;
        }
        Commands::Purge { args, packages } => {
            console.operate(
                &session,
                args.modes(),
                &Request::Tasks(task_set(TaskKind::Purge, &packages)),
            )?;
        }
        Commands::Markauto { args, packages } => {
            console.operate(
                &session,
                args.modes(),
                &Request::Tasks(task_set(TaskKind::Markauto, &packages)),
            )?;
        }
        Commands::Unmarkauto { args, packages } => {
            console.operate(
                &session,
                args.modes(),
                &Request::Tasks(task_set(TaskKind::Unmarkauto, &packages)),
            )?;
        }
        Commands::Diverse { args, operands } => {
            let tasks = diverse_task_set(&operands)?;
            console.operate(&session, args.modes(), &Request::Tasks(tasks))?;
        }
        Commands::SafeUpgrade { args } => {
            console.operate(&session, args.modes(), &Request::Upgrade { full: false })?;
        }
        Commands::FullUpgrade { args } => {
            console.operate(&session, args.modes(), &Request::Upgrade { full: true })?;
        }
        Commands::ListOfMine => {
            let universe = SnapshotUniverse::load(&store.layout().packages_snapshot_path())?;
            for package in list_of_mine(&session, &universe)? {
                println!("{}", package_label(&package, show_arch));
            }
        }
        Commands::PrintEnclosure { versions: true } => {
            for line in format_enclosure_rules(&store.load_enclosures()?, style) {
                println!("{line}");
            }
        }
        Commands::PrintEnclosure { versions: false } => {
            let universe = SnapshotUniverse::load(&store.layout().packages_snapshot_path())?;
            for package in enclosed_packages(&session, &universe)? {
                println!("{}", package_label(&package, show_arch));
            }
        }
        Commands::FixInterrupted { assume_yes } => {
            let outcome = console.with_environment(&session, |env| {
                fix_interrupted(&session, env, assume_yes)
            })?;
            console.outcome(outcome);
        }
        Commands::IgnoreInterrupted => {
            if ignore_interrupted(&session)? {
                console.status("ok", "interrupted operation forgotten");
            } else {
                console.status("info", "no interrupted operation is recorded");
            }
        }
        Commands::Completions { .. } => {}
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct Console {
    style: OutputStyle,
    show_arch: bool,
}

impl Console {
    fn status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    fn with_environment<F>(self, session: &Session<'_>, run: F) -> Result<Outcome>
    where
        F: FnOnce(&mut Environment<'_>) -> Result<Outcome>,
    {
        let mut universe =
            SnapshotUniverse::load(&session.store.layout().packages_snapshot_path())?;
        let mut notifications = ConsoleNotifications::new(self.style, self.show_arch);
        let mut progress = ConsoleProgress::new(self.style, self.show_arch);
        let mut env = Environment {
            universe: &mut universe,
            notifications: &mut notifications,
            progress: &mut progress,
            space: &FsSpaceGauge,
            now: current_unix_timestamp(),
        };
        run(&mut env)
    }

    fn operate(self, session: &Session<'_>, modes: Modes, request: &Request) -> Result<()> {
        let outcome =
            self.with_environment(session, |env| run_operation(session, env, modes, request))?;
        self.outcome(outcome);
        Ok(())
    }

    fn outcome(self, outcome: Outcome) {
        match outcome {
            Outcome::Committed | Outcome::NothingToDo => {}
            Outcome::LedgerUpdated => self.status("ok", "ownership recorded"),
            Outcome::Simulated => self.status("info", "simulation only, nothing was changed"),
            Outcome::Declined => self.status("info", "aborted"),
        }
    }
}
