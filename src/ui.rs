use std::cell::Cell;
use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, ExecutableCommand};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};

use crate::domain::{Task, TaskId, format_duration, format_hours, format_total_line};
use crate::export::write_export;
use crate::ledger::{ChangeListener, Ledger, LedgerError};

const MAX_POLL: StdDuration = StdDuration::from_millis(250);
const RUNNING_COLOR: Color = Color::LightGreen;
const HIGHLIGHT_BACKGROUND_COLOR: Color = Color::Rgb(42, 45, 52);

pub fn run_dashboard(ledger: &mut Ledger, export_dir: &Path) -> Result<(), Box<dyn Error>> {
	enable_raw_mode()?;
	let mut stdout = io::stdout();
	stdout.execute(EnterAlternateScreen)?;
	let backend = CrosstermBackend::new(stdout);
	let mut terminal = Terminal::new(backend)?;

	let result = run_event_loop(&mut terminal, ledger, export_dir);

	disable_raw_mode()?;
	execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
	terminal.show_cursor()?;

	result
}

/// Marks the screen stale whenever the ledger commits a change.
#[derive(Clone, Default)]
struct RedrawFlag(Rc<Cell<bool>>);

impl RedrawFlag {
	fn take(&self) -> bool {
		self.0.replace(false)
	}
}

impl ChangeListener for RedrawFlag {
	fn ledger_changed(&mut self, _tasks: &[Task], _total_seconds: u64) {
		self.0.set(true);
	}
}

fn run_event_loop(
	terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
	ledger: &mut Ledger,
	export_dir: &Path,
) -> Result<(), Box<dyn Error>> {
	let mut app = App::new(export_dir.to_path_buf());
	let redraw = RedrawFlag::default();
	ledger.set_listener(Box::new(redraw.clone()));
	let mut dirty = true;

	loop {
		if let Err(err) = ledger.run_due_ticks() {
			tracing::warn!(error = %err, "tick failed to persist");
			app.status = format!("error: {err}");
		}

		dirty |= redraw.take();
		if dirty {
			app.clamp_selection(ledger.tasks().len());
			terminal.draw(|frame| draw_dashboard(frame, &app, ledger))?;
			dirty = false;
		}

		if !event::poll(poll_timeout(ledger.next_tick_at(), ledger.now()))? {
			continue;
		}

		match event::read()? {
			CEvent::Key(key) if key.kind == KeyEventKind::Press => {
				dirty = true;
				let should_quit = match &app.mode {
					InputMode::Prompt(_) => handle_prompt_key(&mut app, key.code, ledger),
					InputMode::Select(_) => handle_select_key(&mut app, key.code, ledger),
					InputMode::Normal => handle_normal_key(&mut app, key.code, ledger),
				};

				if should_quit {
					break;
				}
			}
			CEvent::Resize(_, _) => dirty = true,
			_ => {}
		}
	}

	Ok(())
}

fn poll_timeout(next_tick: Option<DateTime<Utc>>, now: DateTime<Utc>) -> StdDuration {
	match next_tick {
		Some(at) => (at - now).to_std().unwrap_or(StdDuration::ZERO).min(MAX_POLL),
		None => MAX_POLL,
	}
}

fn draw_dashboard(frame: &mut Frame, app: &App, ledger: &Ledger) {
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Min(6), Constraint::Length(3), Constraint::Length(4)])
		.split(frame.area());

	render_task_panel(frame, layout[0], app, ledger.tasks());
	render_total_panel(frame, layout[1], ledger);
	render_footer(frame, layout[2], app);

	if let InputMode::Select(select) = &app.mode {
		render_select_popup(frame, select);
	}
}

fn render_task_panel(frame: &mut Frame, area: Rect, app: &App, tasks: &[Task]) {
	let items = tasks.iter().map(|task| ListItem::new(task_line(task))).collect::<Vec<_>>();

	let mut state = ListState::default();
	if !tasks.is_empty() {
		state.select(Some(app.selected.min(tasks.len() - 1)));
	}

	let block = Block::default().borders(Borders::ALL).title("Tasks");
	let list = List::new(if items.is_empty() {
		vec![ListItem::new("(no tasks, press a to add one)")]
	} else {
		items
	})
	.block(block)
	.highlight_style(
		Style::default()
			.bg(HIGHLIGHT_BACKGROUND_COLOR)
			.add_modifier(Modifier::BOLD),
	)
	.highlight_symbol("> ");
	frame.render_stateful_widget(list, area, &mut state);
}

fn task_line(task: &Task) -> Line<'static> {
	let (marker, style) = if task.is_running {
		("● ", Style::default().fg(RUNNING_COLOR).add_modifier(Modifier::BOLD))
	} else {
		("  ", Style::default())
	};

	Line::from(vec![
		Span::styled(marker, style),
		Span::styled(format!("{} ", format_duration(task.time_spent)), style),
		Span::raw(format!("({:>6} hrs)  ", format_hours(task.time_spent))),
		Span::styled(task.name.clone(), style),
	])
}

fn render_total_panel(frame: &mut Frame, area: Rect, ledger: &Ledger) {
	let running = ledger
		.running_task()
		.map(|task| format!(" | running: {}", task.name))
		.unwrap_or_default();
	let total = Paragraph::new(Line::from(format!(
		"{}{}",
		format_total_line(ledger.total_time()),
		running
	)))
	.block(Block::default().borders(Borders::ALL).title("Total"));
	frame.render_widget(total, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
	let footer_lines = match &app.mode {
		InputMode::Normal => vec![
			Line::from("a add | space start/pause | e rename | d delete | x export csv | j/k move | q quit"),
			Line::from(app.status.clone()),
		],
		InputMode::Prompt(prompt) => vec![
			Line::from(format!("{}: {}", prompt.title, prompt.input)),
			Line::from("Enter submit | Esc cancel"),
		],
		InputMode::Select(select) => vec![
			Line::from(select.title.clone()),
			Line::from("j/k or arrows move | Enter choose | Esc cancel"),
		],
	};

	let footer = Paragraph::new(footer_lines).block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

fn render_select_popup(frame: &mut Frame, select: &SelectState) {
	let area = centered_rect(40, 30, frame.area());
	let items = select
		.options
		.iter()
		.map(|option| ListItem::new(option.label.clone()))
		.collect::<Vec<_>>();
	let mut state = ListState::default();
	state.select(Some(select.selected));

	let list = List::new(items)
		.block(Block::default().borders(Borders::ALL).title(select.title.clone()))
		.highlight_style(Style::default().fg(Color::Black).bg(Color::Yellow))
		.highlight_symbol("> ");
	frame.render_widget(Clear, area);
	frame.render_stateful_widget(list, area, &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
	let popup_layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Percentage((100 - percent_y) / 2),
			Constraint::Percentage(percent_y),
			Constraint::Percentage((100 - percent_y) / 2),
		])
		.split(area);

	Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage((100 - percent_x) / 2),
			Constraint::Percentage(percent_x),
			Constraint::Percentage((100 - percent_x) / 2),
		])
		.split(popup_layout[1])[1]
}

fn handle_normal_key(app: &mut App, code: KeyCode, ledger: &mut Ledger) -> bool {
	match code {
		KeyCode::Char('q') | KeyCode::Esc => true,
		KeyCode::Up | KeyCode::Char('k') => {
			app.move_selection(-1, ledger.tasks().len());
			false
		}
		KeyCode::Down | KeyCode::Char('j') => {
			app.move_selection(1, ledger.tasks().len());
			false
		}
		KeyCode::Char('a') => {
			app.mode = InputMode::Prompt(PromptState::new("Task name", PromptKind::AddTask, String::new()));
			false
		}
		KeyCode::Char(' ') | KeyCode::Enter => {
			match app.selected_task(ledger) {
				Some(task) => {
					let (task_id, name, was_running) = (task.id, task.name.clone(), task.is_running);
					app.status = match ledger.toggle(task_id) {
						Ok(()) if was_running => format!("paused: {name}"),
						Ok(()) => format!("started: {name}"),
						Err(err) => format!("error: {err}"),
					};
				}
				None => app.status = "No task selected".to_string(),
			}
			false
		}
		KeyCode::Char('e') => {
			match app.selected_task(ledger) {
				Some(task) => {
					app.mode = InputMode::Prompt(PromptState::new(
						"New name",
						PromptKind::Rename { task_id: task.id },
						task.name.clone(),
					));
				}
				None => app.status = "No task selected".to_string(),
			}
			false
		}
		KeyCode::Char('d') => {
			match app.selected_task(ledger) {
				Some(task) => app.mode = InputMode::Select(build_delete_select(task)),
				None => app.status = "No task selected".to_string(),
			}
			false
		}
		KeyCode::Char('x') => {
			app.status = match write_export(&app.export_dir, ledger.tasks(), ledger.now()) {
				Ok(path) => format!("exported: {}", path.display()),
				Err(err) => format!("error: export failed: {err}"),
			};
			false
		}
		_ => false,
	}
}

fn handle_prompt_key(app: &mut App, code: KeyCode, ledger: &mut Ledger) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Input cancelled".to_string();
		}
		KeyCode::Backspace => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.pop();
			}
		}
		KeyCode::Char(value) => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.push(value);
			}
		}
		KeyCode::Enter => {
			let prompt = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Prompt(prompt) => prompt,
				InputMode::Normal | InputMode::Select(_) => return false,
			};

			match submit_prompt(&prompt, ledger) {
				Ok(message) => {
					app.status = message;
					if matches!(prompt.kind, PromptKind::AddTask) {
						app.selected = ledger.tasks().len().saturating_sub(1);
					}
				}
				Err(err @ LedgerError::Validation(_)) => {
					app.mode = InputMode::Prompt(prompt);
					app.status = format!("error: {err}");
				}
				// The change is already applied in memory; only the save failed.
				Err(err @ LedgerError::Storage(_)) => {
					if matches!(prompt.kind, PromptKind::AddTask) {
						app.selected = ledger.tasks().len().saturating_sub(1);
					}
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn handle_select_key(app: &mut App, code: KeyCode, ledger: &mut Ledger) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Selection cancelled".to_string();
		}
		KeyCode::Up | KeyCode::Char('k') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(-1);
			}
		}
		KeyCode::Down | KeyCode::Char('j') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(1);
			}
		}
		KeyCode::Enter => {
			let select = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Select(select) => select,
				_ => return false,
			};

			app.status = match submit_select(&select, ledger) {
				Ok(message) => message,
				Err(err) => format!("error: {err}"),
			};
		}
		_ => {}
	}

	false
}

fn submit_prompt(prompt: &PromptState, ledger: &mut Ledger) -> Result<String, LedgerError> {
	match prompt.kind {
		PromptKind::AddTask => {
			ledger.add(&prompt.input)?;
			Ok(format!("started: {}", prompt.input.trim()))
		}
		PromptKind::Rename { task_id } => {
			if prompt.input.trim().is_empty() {
				return Ok("Name unchanged".to_string());
			}
			ledger.rename(task_id, &prompt.input)?;
			Ok(format!("renamed: {}", prompt.input.trim()))
		}
	}
}

fn submit_select(select: &SelectState, ledger: &mut Ledger) -> Result<String, String> {
	let confirmed = select
		.selected_option()
		.map(|option| option.confirm)
		.ok_or_else(|| "no option selected".to_string())?;

	match &select.kind {
		SelectKind::DeleteConfirm { task_id, name } => {
			if !confirmed {
				return Ok("Delete cancelled".to_string());
			}
			ledger.remove(*task_id).map_err(|err| err.to_string())?;
			Ok(format!("deleted: {name}"))
		}
	}
}

fn build_delete_select(task: &Task) -> SelectState {
	SelectState::new(
		format!("Delete '{}'?", task.name),
		SelectKind::DeleteConfirm {
			task_id: task.id,
			name: task.name.clone(),
		},
		vec![SelectOption::new("Keep", false), SelectOption::new("Delete", true)],
	)
}

#[derive(Debug, Clone)]
struct PromptState {
	title: String,
	input: String,
	kind: PromptKind,
}

impl PromptState {
	fn new(title: impl Into<String>, kind: PromptKind, input: String) -> Self {
		Self {
			title: title.into(),
			input,
			kind,
		}
	}
}

#[derive(Debug, Clone)]
enum PromptKind {
	AddTask,
	Rename { task_id: TaskId },
}

#[derive(Debug, Clone)]
struct SelectState {
	title: String,
	options: Vec<SelectOption>,
	selected: usize,
	kind: SelectKind,
}

impl SelectState {
	fn new(title: impl Into<String>, kind: SelectKind, options: Vec<SelectOption>) -> Self {
		Self {
			title: title.into(),
			options,
			selected: 0,
			kind,
		}
	}

	fn move_selection(&mut self, delta: i32) {
		self.selected = step_index(self.selected, delta, self.options.len());
	}

	fn selected_option(&self) -> Option<&SelectOption> {
		self.options.get(self.selected)
	}
}

#[derive(Debug, Clone)]
struct SelectOption {
	label: String,
	confirm: bool,
}

impl SelectOption {
	fn new(label: impl Into<String>, confirm: bool) -> Self {
		Self {
			label: label.into(),
			confirm,
		}
	}
}

#[derive(Debug, Clone)]
enum SelectKind {
	DeleteConfirm { task_id: TaskId, name: String },
}

#[derive(Debug, Clone)]
enum InputMode {
	Normal,
	Prompt(PromptState),
	Select(SelectState),
}

#[derive(Debug, Clone)]
struct App {
	selected: usize,
	mode: InputMode,
	status: String,
	export_dir: PathBuf,
}

impl App {
	fn new(export_dir: PathBuf) -> Self {
		Self {
			selected: 0,
			mode: InputMode::Normal,
			status: "Ready".to_string(),
			export_dir,
		}
	}

	fn clamp_selection(&mut self, len: usize) {
		self.selected = if len == 0 { 0 } else { self.selected.min(len - 1) };
	}

	fn move_selection(&mut self, delta: i32, len: usize) {
		self.selected = step_index(self.selected, delta, len);
	}

	fn selected_task<'a>(&self, ledger: &'a Ledger) -> Option<&'a Task> {
		ledger.tasks().get(self.selected)
	}
}

fn step_index(current: usize, delta: i32, len: usize) -> usize {
	if len == 0 {
		return 0;
	}

	if delta > 0 {
		(current + delta as usize).min(len - 1)
	} else {
		current.saturating_sub(delta.unsigned_abs() as usize)
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use chrono::{Duration, TimeZone, Utc};
	use crossterm::event::KeyCode;
	use ratatui::Terminal;
	use ratatui::backend::TestBackend;

	use super::{
		App, InputMode, MAX_POLL, PromptKind, PromptState, handle_prompt_key, poll_timeout, render_total_panel,
		step_index,
	};
	use crate::clock::ManualClock;
	use crate::domain::Task;
	use crate::ledger::Ledger;
	use crate::storage::{StorageError, TaskStore};

	struct FullDiskStore;

	impl TaskStore for FullDiskStore {
		fn load(&self) -> Result<Vec<Task>, StorageError> {
			Ok(Vec::new())
		}

		fn save(&mut self, _tasks: &[Task]) -> Result<(), StorageError> {
			Err(StorageError::Io(std::io::Error::other("disk full")))
		}
	}

	fn ledger_on_full_disk() -> Ledger {
		let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
		Ledger::open(Box::new(FullDiskStore), Box::new(clock)).expect("empty store opens without saving")
	}

	fn app_with_add_prompt(input: &str) -> App {
		let mut app = App::new(PathBuf::from("."));
		app.mode = InputMode::Prompt(PromptState::new("New task", PromptKind::AddTask, input.to_string()));
		app
	}

	#[test]
	fn failed_save_closes_the_add_prompt() {
		let mut ledger = ledger_on_full_disk();
		let mut app = app_with_add_prompt("Writing");

		handle_prompt_key(&mut app, KeyCode::Enter, &mut ledger);
		assert!(matches!(app.mode, InputMode::Normal));
		assert!(app.status.contains("disk full"), "status was {}", app.status);
		assert_eq!(ledger.tasks().len(), 1);

		handle_prompt_key(&mut app, KeyCode::Enter, &mut ledger);
		assert_eq!(ledger.tasks().len(), 1);
	}

	#[test]
	fn total_panel_is_titled_total() {
		let ledger = ledger_on_full_disk();
		let mut terminal = Terminal::new(TestBackend::new(60, 3)).expect("test terminal");

		terminal
			.draw(|frame| {
				let area = frame.area();
				render_total_panel(frame, area, &ledger);
			})
			.expect("draw");

		let top_border = terminal.backend().buffer().content()[..60]
			.iter()
			.map(|cell| cell.symbol())
			.collect::<String>();
		assert!(top_border.contains("Total"), "top border was {top_border}");
		assert!(!top_border.contains("Today"));
	}

	#[test]
	fn blank_name_keeps_the_add_prompt_open() {
		let mut ledger = ledger_on_full_disk();
		let mut app = app_with_add_prompt("   ");

		handle_prompt_key(&mut app, KeyCode::Enter, &mut ledger);
		assert!(matches!(app.mode, InputMode::Prompt(_)));
		assert!(ledger.tasks().is_empty());
	}

	#[test]
	fn selection_stays_in_bounds() {
		assert_eq!(step_index(0, -1, 3), 0);
		assert_eq!(step_index(2, 1, 3), 2);
		assert_eq!(step_index(1, 1, 3), 2);
		assert_eq!(step_index(5, 1, 0), 0);
	}

	#[test]
	fn polls_until_the_next_tick_at_most() {
		let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();

		assert_eq!(poll_timeout(None, now), MAX_POLL);
		assert_eq!(
			poll_timeout(Some(now + Duration::milliseconds(80)), now),
			std::time::Duration::from_millis(80)
		);
		assert_eq!(poll_timeout(Some(now + Duration::seconds(5)), now), MAX_POLL);
		assert_eq!(poll_timeout(Some(now - Duration::seconds(1)), now), std::time::Duration::ZERO);
	}
}
