//! agent-ledger - command line access to the status ledger.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use agent_ledger::ledger::{
    Agent, Collection, Ledger, LedgerStore, LedgerValidator, Priority, StatusEntry, TaskFields,
    TaskRecord, TestPriority, UpsertOutcome, Working,
};
use agent_ledger::protocol::{hand_off, Outcome, TestingRound};
use agent_ledger::{LedgerConfig, LedgerError};

#[derive(Parser)]
#[command(name = "agent-ledger")]
#[command(version = "0.1.0")]
#[command(about = "Status ledger shared by a main agent and a testing agent", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".", env = "AGENT_LEDGER_PROJECT")]
    project: PathBuf,

    /// Ledger file, relative to the project directory (overrides settings)
    #[arg(short, long, global = true, env = "AGENT_LEDGER_FILE")]
    ledger: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty ledger
    Init {
        /// Problem statement recorded at the top of the ledger
        #[arg(long)]
        problem: Option<String>,

        /// Set metadata.run_ui
        #[arg(long)]
        run_ui: bool,

        /// Overwrite an existing ledger
        #[arg(short, long)]
        force: bool,
    },

    /// Create a task or merge fields into it
    Upsert {
        /// Collection holding the task
        #[arg(value_enum)]
        collection: Collection,

        /// Task name
        task: String,

        #[arg(long, action = clap::ArgAction::Set)]
        implemented: Option<bool>,

        /// true, false or NA
        #[arg(long)]
        working: Option<Working>,

        /// Free-text pointer to the source files
        #[arg(long)]
        file: Option<String>,

        #[arg(long, value_enum)]
        priority: Option<Priority>,

        #[arg(long, action = clap::ArgAction::Set)]
        needs_retesting: Option<bool>,

        /// May only increase
        #[arg(long)]
        stuck_count: Option<u32>,
    },

    /// Append a status entry to a task's history
    Append {
        /// Task name
        task: String,

        #[arg(short, long, value_enum, default_value = "main")]
        agent: Agent,

        /// true, false or NA
        #[arg(short, long, default_value = "NA")]
        working: Working,

        #[arg(short, long, default_value = "")]
        comment: String,
    },

    /// Replace test_plan.current_focus
    Focus {
        /// Task names (none clears the focus)
        tasks: Vec<String>,

        /// Set test_plan.test_all
        #[arg(long, action = clap::ArgAction::Set)]
        test_all: Option<bool>,

        /// Set test_plan.test_priority
        #[arg(long, value_enum)]
        priority_order: Option<TestPriority>,
    },

    /// Main agent: queue tasks for the testing agent
    Handoff {
        /// Tasks to retest
        #[arg(required = true)]
        tasks: Vec<String>,

        /// Note for the testing agent
        #[arg(short, long)]
        message: String,
    },

    /// Testing agent: record one verification result
    Record {
        /// Task name
        task: String,

        #[arg(short, long, action = clap::ArgAction::Set)]
        working: bool,

        #[arg(short, long, default_value = "")]
        comment: String,
    },

    /// Testing agent: close a round from a YAML list of outcomes
    Round {
        /// File with entries of {task, working, comment}
        #[arg(short, long)]
        outcomes: PathBuf,

        /// Note for the main agent
        #[arg(short, long)]
        message: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Append a note to agent_communication
    Note {
        #[arg(short, long, value_enum, default_value = "main")]
        agent: Agent,

        message: String,
    },

    /// Recompute and list stuck tasks
    Stuck {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one task or the whole ledger
    Show {
        /// Task name
        task: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize task counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the ledger for inconsistencies
    Validate {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "agent_ledger=debug,info"
    } else {
        "agent_ledger=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        let ledger_err = err.downcast_ref::<LedgerError>();
        if ledger_err.is_some_and(LedgerError::requires_human) {
            eprintln!(
                "   {} inspect the ledger file by hand, then run `agent-ledger validate`",
                "Hint:".yellow()
            );
        }
        std::process::exit(ledger_err.map_or(1, LedgerError::exit_code));
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());
    if !project_path.exists() {
        anyhow::bail!(
            "Project directory does not exist: {}",
            project_path.display()
        );
    }

    let config = LedgerConfig::load(&project_path)?;
    let ledger_path = match cli.ledger {
        Some(path) if path.is_absolute() => path,
        Some(path) => project_path.join(path),
        None => config.ledger_path(&project_path),
    };
    let store =
        LedgerStore::new(&ledger_path).with_max_conflict_retries(config.max_conflict_retries);
    let threshold = config.stuck_threshold;

    match cli.command {
        Commands::Init {
            problem,
            run_ui,
            force,
        } => {
            let mut ledger = Ledger::new(problem.unwrap_or_default());
            ledger.metadata.created_by = config.created_by.clone();
            ledger.metadata.run_ui = run_ui;
            store.create(ledger, force)?;
            println!(
                "{} Created ledger: {}",
                "OK".green().bold(),
                ledger_path.display()
            );
        }

        Commands::Upsert {
            collection,
            task,
            implemented,
            working,
            file,
            priority,
            needs_retesting,
            stuck_count,
        } => {
            let fields = TaskFields {
                implemented,
                working,
                file,
                stuck_count,
                priority,
                needs_retesting,
            };
            let outcome = store.update(|l| l.upsert_task(collection, &task, fields.clone()))?;
            let verb = match outcome {
                UpsertOutcome::Created => "Created".green(),
                UpsertOutcome::Updated => "Updated".green(),
                UpsertOutcome::Unchanged => "Unchanged".dimmed(),
            };
            println!("{} {} task: {}", verb.bold(), collection, task);
        }

        Commands::Append {
            task,
            agent,
            working,
            comment,
        } => {
            let entry = StatusEntry::new(agent, working, comment).stamped();
            let len = store.update(|l| {
                l.append_status(&task, entry.clone())
                    .map(|t| t.status_history.len())
            })?;
            println!(
                "{} Appended {} entry to '{}' ({} in history)",
                "OK".green().bold(),
                agent,
                task,
                len
            );
        }

        Commands::Focus {
            tasks,
            test_all,
            priority_order,
        } => {
            let ledger = store.update(|l| {
                l.set_focus(tasks.iter().cloned());
                if let Some(all) = test_all {
                    l.test_plan.test_all = all;
                }
                if let Some(order) = priority_order {
                    l.test_plan.test_priority = order;
                }
                Ok(l.clone())
            })?;

            println!(
                "{} Focus set: {}",
                "OK".green().bold(),
                if tasks.is_empty() {
                    "(none)".to_string()
                } else {
                    tasks.join(", ")
                }
            );
            for name in tasks.iter().filter(|n| !ledger.contains_task(n)) {
                println!("   {} unknown task '{}'", "Warning:".yellow(), name);
            }
        }

        Commands::Handoff { tasks, message } => {
            let sequence = store.update(|l| hand_off(l, &tasks, &message))?;
            println!(
                "{} Handed off {} task(s) to the testing agent (sequence {})",
                "OK".green().bold(),
                tasks.len(),
                sequence
            );
        }

        Commands::Record {
            task,
            working,
            comment,
        } => {
            let record = store.update(|l| {
                let record = l.record_outcome(&task, working, comment.clone())?.clone();
                l.refresh_stuck_tasks(threshold);
                Ok(record)
            })?;
            let result = if working {
                "PASS".green().bold()
            } else {
                "FAIL".red().bold()
            };
            println!(
                "{} {} (stuck_count {})",
                result, record.task, record.stuck_count
            );
            if record.is_stuck(threshold) {
                println!("   {} task is stuck", "Warning:".yellow());
            }
        }

        Commands::Round {
            outcomes: outcomes_path,
            message,
            json,
        } => {
            let content = std::fs::read_to_string(&outcomes_path).with_context(|| {
                format!("Failed to read outcomes from {}", outcomes_path.display())
            })?;
            let outcomes: Vec<Outcome> = serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid outcomes file {}", outcomes_path.display()))?;

            let summary = store.update(|l| {
                let mut round = TestingRound::begin(l)?;
                for outcome in &outcomes {
                    round.record(&outcome.task, outcome.working, outcome.comment.clone())?;
                }
                round.finish(l, &message, threshold)
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{} Round closed: {} passed, {} failed",
                    "OK".green().bold(),
                    summary.passed.len(),
                    summary.failed.len()
                );
                for name in &summary.failed {
                    println!("   {} {}", "FAIL".red(), name);
                }
                for name in &summary.stuck {
                    println!("   {} {} is stuck", "Warning:".yellow(), name);
                }
            }
        }

        Commands::Note { agent, message } => {
            store.update(|l| {
                l.communicate(agent, message.clone());
                Ok(())
            })?;
            println!("{} Note added from {} agent", "OK".green().bold(), agent);
        }

        Commands::Stuck { json } => {
            let stuck = store.update(|l| Ok(l.refresh_stuck_tasks(threshold).to_vec()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stuck)?);
            } else if stuck.is_empty() {
                println!("{} No stuck tasks (threshold: {})", "OK".green(), threshold);
            } else {
                println!(
                    "{} {} stuck task(s) (threshold: {}):",
                    "Warning:".yellow().bold(),
                    stuck.len(),
                    threshold
                );
                for name in &stuck {
                    println!("  {}", name);
                }
            }
        }

        Commands::Show { task, json } => {
            let doc = store.load()?;
            match task {
                Some(name) => {
                    let (collection, record) = doc
                        .ledger
                        .find_task(&name)
                        .ok_or_else(|| LedgerError::unknown_task(name.as_str()))?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(record)?);
                    } else {
                        print_task_detail(collection, record);
                    }
                }
                None if json => println!("{}", serde_json::to_string_pretty(&doc.ledger)?),
                None => print_ledger(&doc.ledger, threshold),
            }
        }

        Commands::Status { json } => {
            let doc = store.load()?;
            let counts = doc.ledger.counts(threshold);
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!("{}", "Ledger Status".bold());
                println!(
                    "   Tasks: {} ({} backend, {} frontend)",
                    counts.total, counts.backend, counts.frontend
                );
                println!("   Implemented: {}", counts.implemented);
                println!(
                    "   Working: {}  Failing: {}  Untested: {}",
                    counts.working.to_string().green(),
                    counts.failing.to_string().red(),
                    counts.untested
                );
                println!("   Needs retesting: {}", counts.needs_retesting);
                println!("   Stuck: {}", counts.stuck);
                println!("   Test sequence: {}", doc.ledger.metadata.test_sequence);
                if let Some(rate) = counts.pass_rate() {
                    println!("   Pass rate: {:.0}%", rate * 100.0);
                }
            }
        }

        Commands::Validate { strict } => {
            let doc = store.load()?;
            let report = LedgerValidator::new(threshold)
                .strict(strict || config.strict_validation)
                .validate(&doc.ledger);
            println!("{}", report.verbose_report());
            if !report.is_valid() {
                std::process::exit(report.exit_code());
            }
        }
    }

    Ok(())
}

fn working_label(working: Working) -> colored::ColoredString {
    match working {
        Working::Yes => "working".green(),
        Working::No => "failing".red(),
        Working::Unknown => "untested".dimmed(),
    }
}

fn print_ledger(ledger: &Ledger, threshold: u32) {
    if !ledger.user_problem_statement.is_empty() {
        println!("{}", ledger.user_problem_statement.bold());
        println!();
    }
    for collection in [Collection::Backend, Collection::Frontend] {
        let tasks = ledger.collection(collection);
        println!("{} ({})", collection.to_string().cyan().bold(), tasks.len());
        for task in tasks {
            let retest = if task.needs_retesting { " [retest]" } else { "" };
            let stuck = if task.is_stuck(threshold) {
                format!(" [stuck {}]", task.stuck_count).red().to_string()
            } else {
                String::new()
            };
            println!(
                "  {} {} ({}){}{}",
                working_label(task.working),
                task.task,
                task.priority,
                retest.yellow(),
                stuck
            );
        }
    }
    if !ledger.test_plan.current_focus.is_empty() {
        println!();
        println!("Focus: {}", ledger.test_plan.current_focus.join(", "));
    }
}

fn print_task_detail(collection: Collection, task: &TaskRecord) {
    println!("{} [{}]", task.task.bold(), collection);
    println!("   Implemented: {}", task.implemented);
    println!("   Working: {}", working_label(task.working));
    println!("   File: {}", task.file);
    println!("   Priority: {}", task.priority);
    println!("   Stuck count: {}", task.stuck_count);
    println!("   Needs retesting: {}", task.needs_retesting);
    println!("   History ({}):", task.status_history.len());
    for entry in &task.status_history {
        let when = entry
            .timestamp
            .map(|t| format!("{} ", t.format("%Y-%m-%d %H:%M")))
            .unwrap_or_default();
        println!(
            "     {}{} [{}] {}",
            when,
            entry.agent,
            entry.working,
            entry.comment
        );
    }
}
