mod clock;
mod config;
mod domain;
mod export;
mod ledger;
mod storage;
mod timers;
mod ui;

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::clock::SystemClock;
use crate::config::{Settings, log_path, resolve_export_dir, resolve_store_path};
use crate::domain::{TaskId, format_duration, format_hours, format_total_line};
use crate::export::write_export;
use crate::ledger::Ledger;
use crate::storage::JsonFileStore;
use crate::ui::run_dashboard;

const LOG_ENV: &str = "TASKLOG_LOG";

#[derive(Debug, Parser)]
#[command(name = "task_timelog", about = "Start, pause and total named tasks")]
struct Cli {
	#[arg(long)]
	store: Option<PathBuf>,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	Dashboard,
	Add {
		#[arg(long)]
		name: String,
	},
	Toggle {
		#[arg(long)]
		task: TaskId,
	},
	Rename {
		#[arg(long)]
		task: TaskId,
		#[arg(long)]
		name: String,
	},
	Remove {
		#[arg(long)]
		task: TaskId,
	},
	List,
	Export {
		#[arg(long)]
		dir: Option<PathBuf>,
	},
	Path,
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn run() -> Result<(), Box<dyn Error>> {
	let cli = Cli::parse();
	let command = cli.command.unwrap_or(Command::Dashboard);
	init_logging(matches!(command, Command::Dashboard));

	let settings = Settings::load()?;
	let store_path = resolve_store_path(cli.store, &settings);

	if let Command::Path = command {
		println!("{}", store_path.display());
		return Ok(());
	}

	let mut ledger = Ledger::open(
		Box::new(JsonFileStore::new(&store_path)),
		Box::new(SystemClock),
	)?;

	match command {
		Command::Dashboard => {
			let export_dir = resolve_export_dir(None, &settings);
			run_dashboard(&mut ledger, &export_dir)?;
		}
		Command::Add { name } => {
			let task_id = ledger.add(&name)?;
			println!("started task {task_id}");
		}
		Command::Toggle { task } => {
			ledger.toggle(task)?;
			match ledger.task(task) {
				Some(found) if found.is_running => println!("started {task}"),
				Some(_) => println!("paused {task}"),
				None => println!("no task {task}"),
			}
		}
		Command::Rename { task, name } => {
			ledger.rename(task, &name)?;
			println!("renamed {task}");
		}
		Command::Remove { task } => {
			ledger.remove(task)?;
			println!("removed {task}");
		}
		Command::List => {
			print_tasks(&ledger);
		}
		Command::Export { dir } => {
			let export_dir = resolve_export_dir(dir, &settings);
			let path = write_export(&export_dir, ledger.tasks(), ledger.now())?;
			println!("wrote {}", path.display());
		}
		Command::Path => {}
	}

	Ok(())
}

/// The dashboard owns the terminal, so its logs go to a file instead of
/// stderr.
fn init_logging(to_file: bool) {
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
	let builder = tracing_subscriber::fmt().with_env_filter(filter);

	if to_file {
		let path = log_path();
		let file = path
			.parent()
			.map_or(Ok(()), fs::create_dir_all)
			.and_then(|()| fs::OpenOptions::new().create(true).append(true).open(&path));
		match file {
			Ok(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
			Err(err) => eprintln!("warning: logging disabled, cannot open {}: {err}", path.display()),
		}
	} else {
		builder.with_writer(std::io::stderr).init();
	}
}

fn print_tasks(ledger: &Ledger) {
	if ledger.tasks().is_empty() {
		println!("no tasks yet");
		return;
	}

	for task in ledger.tasks() {
		println!(
			"{} | {} | {} | {} | {}",
			task.id,
			format_duration(task.time_spent),
			format_hours(task.time_spent),
			if task.is_running { "running" } else { "paused" },
			task.name
		);
	}
	println!("{}", format_total_line(ledger.total_time()));
}
