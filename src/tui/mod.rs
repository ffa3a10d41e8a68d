//! Terminal UI for the SST diagnosis.
//!
//! Layout:
//! - Centered window frame titled "Diagnóstico SST"
//! - Header with phase/question counters, progress bar, points and fine exposure
//! - Main content for the current step (intake form, question, confirmation)
//! - Bottom button row: [ Atrás ] [ Siguiente ] [ Salir ]
//! - Blocking modals (welcome, phase completion, idle, exit intent, loading)
//!
//! Mouse capture is enabled so a pointer reaching the first terminal row counts
//! as leaving through the top edge.
//!
//! Note: Logging is file-only in TUI mode (stdout logging is disabled) to avoid corrupting the terminal UI.

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::{info, warn};
use ratatui::backend::{CrosstermBackend, TestBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use crate::api::diagnostico::{DiagnosisSubmitter, HttpSubmitter, SubmissionError};
use crate::catalog::{Catalog, Severity};
use crate::config::AppConfig;
use crate::contact::format_soles;
use crate::engine::attention::ModalKind;
use crate::flow::{DiagnosisFlow, Step};
use crate::models::{Choice, CompanyData, CompanyType, DiagnosticoRequest};
use crate::utils::validation::{parse_worker_count, IntakeField};

const WINDOW_TITLE: &str = " Diagnóstico SST ";

const CHOICES: [Choice; 3] = [Choice::Yes, Choice::No, Choice::Unsure];

/// Text boxes on the intake form, in display order. The company type selector follows them.
const INTAKE_TEXT_FIELDS: [IntakeField; 6] = [
    IntakeField::Nombre,
    IntakeField::Email,
    IntakeField::Telefono,
    IntakeField::Empresa,
    IntakeField::Cargo,
    IntakeField::NumeroTrabajadores,
];
const TYPE_SELECTOR: usize = INTAKE_TEXT_FIELDS.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonFocus {
    Back,
    Next,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusTarget {
    Field(usize),
    Button(ButtonFocus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modal {
    ConfirmQuit,
    Loading,
    IdleConfirm,
    ExitIntent,
    PhaseComplete,
    Welcome,
}

#[derive(Debug, Clone, Default)]
struct TextInput {
    value: String,
    /// Cursor position in chars, not bytes.
    cursor: usize,
}

impl TextInput {
    fn new(value: impl Into<String>) -> Self {
        let v = value.into();
        Self {
            cursor: v.chars().count(),
            value: v,
        }
    }

    fn len(&self) -> usize {
        self.value.chars().count()
    }

    fn byte_at(&self, char_idx: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_idx)
            .map_or(self.value.len(), |(i, _)| i)
    }

    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char(c) => {
                let at = self.byte_at(self.cursor);
                self.value.insert(at, c);
                self.cursor += 1;
                true
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let at = self.byte_at(self.cursor);
                    self.value.remove(at);
                }
                true
            }
            KeyCode::Delete => {
                if self.cursor < self.len() {
                    let at = self.byte_at(self.cursor);
                    self.value.remove(at);
                }
                true
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                true
            }
            KeyCode::Right => {
                self.cursor = (self.cursor + 1).min(self.len());
                true
            }
            KeyCode::Home => {
                self.cursor = 0;
                true
            }
            KeyCode::End => {
                self.cursor = self.len();
                true
            }
            _ => false,
        }
    }
}

enum UiMsg {
    SubmissionFinished(Result<(), SubmissionError>),
}

struct WizardState {
    flow: DiagnosisFlow,
    whatsapp_number: String,
    focus: FocusTarget,
    modal_focus: ButtonFocus,
    confirm_quit: bool,
    quit: bool,

    // Intake
    intake: Vec<TextInput>,
    company_type: CompanyType,

    // Questionnaire
    selected_choice: usize,
    show_tooltip: bool,
}

impl WizardState {
    fn new(flow: DiagnosisFlow, whatsapp_number: String) -> Self {
        Self {
            flow,
            whatsapp_number,
            focus: FocusTarget::Field(0),
            modal_focus: ButtonFocus::Next,
            confirm_quit: false,
            quit: false,
            intake: vec![TextInput::default(); INTAKE_TEXT_FIELDS.len()],
            company_type: CompanyType::Unset,
            selected_choice: 0,
            show_tooltip: false,
        }
    }

    fn reset_intake(&mut self) {
        self.intake = vec![TextInput::default(); INTAKE_TEXT_FIELDS.len()];
        self.company_type = CompanyType::Unset;
    }

    fn company_data(&self) -> CompanyData {
        let text = |field: IntakeField| -> String {
            INTAKE_TEXT_FIELDS
                .iter()
                .position(|f| *f == field)
                .and_then(|i| self.intake.get(i))
                .map(|t| t.value.trim().to_string())
                .unwrap_or_default()
        };
        CompanyData {
            nombre: text(IntakeField::Nombre),
            email: text(IntakeField::Email),
            telefono: text(IntakeField::Telefono),
            empresa: text(IntakeField::Empresa),
            cargo: text(IntakeField::Cargo),
            numero_trabajadores: parse_worker_count(&text(IntakeField::NumeroTrabajadores)),
            tipo_empresa: self.company_type,
        }
    }

    fn contact_name(&self) -> String {
        self.flow
            .company()
            .map(|c| c.nombre.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Usuario".to_string())
    }
}

pub fn run(config: &AppConfig, catalog: Arc<Catalog>) -> Result<()> {
    info!("[PHASE: tui] [STEP: start] Starting diagnosis wizard");

    let http = HttpSubmitter::new(&config.api_base_url, config.request_timeout())?;
    info!(
        "[PHASE: tui] [STEP: start] Submissions go to {}",
        http.endpoint()
    );
    let submitter: Arc<dyn DiagnosisSubmitter> = Arc::new(http);

    let flow = DiagnosisFlow::new(catalog, config.inactivity.clone());
    let state = WizardState::new(flow, config.contact.whatsapp_number.clone());

    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, state, submitter);
    restore_terminal(&mut terminal)?;

    result
}

fn sample_company() -> CompanyData {
    CompanyData {
        nombre: "Ana Torres".to_string(),
        email: "ana.torres@constructora-andina.pe".to_string(),
        telefono: "987654321".to_string(),
        empresa: "Constructora Andina SAC".to_string(),
        cargo: "Gerente de Operaciones".to_string(),
        numero_trabajadores: 45,
        tipo_empresa: CompanyType::NoMype,
    }
}

fn new_smoke_wizard_state(
    target: &str,
    catalog: Arc<Catalog>,
    config: &AppConfig,
) -> Result<WizardState> {
    // Smoke-only: seeded state for deterministic page rendering.
    let flow = DiagnosisFlow::new(catalog, config.inactivity.clone());
    let mut state = WizardState::new(flow, config.contact.whatsapp_number.clone());
    let now = Instant::now();
    let sample = sample_company();

    state.intake = vec![
        TextInput::new(sample.nombre.clone()),
        TextInput::new(sample.email.clone()),
        TextInput::new(sample.telefono.clone()),
        TextInput::new(sample.empresa.clone()),
        TextInput::new(sample.cargo.clone()),
        TextInput::new(sample.numero_trabajadores.to_string()),
    ];
    state.company_type = sample.tipo_empresa;

    if target == "intake" {
        state.focus = FocusTarget::Button(ButtonFocus::Next);
        return Ok(state);
    }

    state.flow.submit_intake(sample, now)?;
    if target != "welcome" {
        state.flow.dismiss_welcome(now);
    }

    match target {
        "questionnaire" => {
            state.flow.answer(Choice::Yes, now)?;
            state.flow.answer(Choice::No, now)?;
            state.show_tooltip = true;
        }
        "phase" => smoke_answer_until_phase(&mut state, now)?,
        "idle" => {
            let delay = state
                .flow
                .monitor()
                .map(|m| m.timing().idle_delay())
                .unwrap_or_default();
            state.flow.tick(now + delay + Duration::from_secs(5));
        }
        "exit" => {
            state.flow.pointer_left_top();
        }
        "loading" => {
            smoke_answer_all(&mut state, now)?;
            state.flow.begin_submission();
        }
        "confirmation" => {
            smoke_answer_all(&mut state, now)?;
            state.flow.begin_submission();
            state.flow.finish_submission(Ok(()));
        }
        _ => {}
    }

    state.focus = default_focus(state.flow.step());
    Ok(state)
}

fn smoke_choice(i: usize) -> Choice {
    if i % 3 == 0 {
        Choice::No
    } else {
        Choice::Yes
    }
}

fn smoke_answer_until_phase(state: &mut WizardState, now: Instant) -> Result<()> {
    let mut i = 0;
    while !state.flow.is_modal_open(ModalKind::PhaseCompletion) {
        state.flow.answer(smoke_choice(i), now)?;
        i += 1;
    }
    Ok(())
}

fn smoke_answer_all(state: &mut WizardState, now: Instant) -> Result<()> {
    let mut i = 0;
    while state.flow.outcome().is_none() {
        if state.flow.is_modal_open(ModalKind::PhaseCompletion) {
            state.flow.acknowledge_phase(now)?;
        } else {
            state.flow.answer(smoke_choice(i), now)?;
            i += 1;
        }
    }
    Ok(())
}

/// Non-interactive smoke mode: render a single frame and exit.
/// Targets: intake|welcome|questionnaire|phase|idle|exit|loading|confirmation
pub fn smoke(config: &AppConfig, catalog: Arc<Catalog>, target: &str) -> Result<()> {
    info!(
        "[PHASE: tui] [STEP: smoke] Rendering single-frame TUI smoke target={}",
        target
    );

    let t = target.trim().to_ascii_lowercase();
    let state = new_smoke_wizard_state(t.as_str(), catalog, config)?;

    // In-memory backend: no raw mode, no alternate screen.
    let backend = TestBackend::new(100, 30);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|f| draw(f.size(), f, &state))?;

    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(DisableMouseCapture)?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut state: WizardState,
    submitter: Arc<dyn DiagnosisSubmitter>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let (tx, rx) = mpsc::channel::<UiMsg>();

    while !state.quit {
        drain_messages(&mut state, &rx);
        state.flow.tick(Instant::now());
        terminal.draw(|f| draw(f.size(), f, &state))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));

        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    handle_key(&mut state, key.code, &tx, &submitter, Instant::now())
                }
                Event::Mouse(mouse) => handle_mouse(&mut state, mouse.kind, mouse.row, Instant::now()),
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }

    info!("[PHASE: tui] [STEP: exit] Wizard closed");
    Ok(())
}

fn drain_messages(state: &mut WizardState, rx: &mpsc::Receiver<UiMsg>) {
    while let Ok(msg) = rx.try_recv() {
        apply_message(state, msg);
    }
}

fn apply_message(state: &mut WizardState, msg: UiMsg) {
    match msg {
        UiMsg::SubmissionFinished(result) => {
            let prev = state.flow.step();
            state.flow.finish_submission(result);
            after_flow_change(state, prev);
        }
    }
}

/// Run the one submission attempt on a worker thread with its own runtime.
fn start_submission(
    state: &mut WizardState,
    tx: &mpsc::Sender<UiMsg>,
    submitter: &Arc<dyn DiagnosisSubmitter>,
) {
    if let Some(request) = state.flow.begin_submission() {
        spawn_submission(request, tx, submitter);
    }
}

fn spawn_submission(
    request: DiagnosticoRequest,
    tx: &mpsc::Sender<UiMsg>,
    submitter: &Arc<dyn DiagnosisSubmitter>,
) {
    let tx = tx.clone();
    let submitter = submitter.clone();

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        let result = match rt {
            Ok(rt) => rt.block_on(submitter.submit(&request)),
            Err(e) => Err(SubmissionError::Client(format!(
                "Failed to create async runtime: {}",
                e
            ))),
        };
        let _ = tx.send(UiMsg::SubmissionFinished(result));
    });
}

fn default_focus(step: Step) -> FocusTarget {
    match step {
        Step::Intake | Step::Questionnaire => FocusTarget::Field(0),
        Step::Confirmation => FocusTarget::Button(ButtonFocus::Next),
    }
}

fn focus_order(step: Step) -> Vec<FocusTarget> {
    let mut order = Vec::new();
    match step {
        Step::Intake => {
            order.extend((0..=TYPE_SELECTOR).map(FocusTarget::Field));
            order.push(FocusTarget::Button(ButtonFocus::Next));
            order.push(FocusTarget::Button(ButtonFocus::Cancel));
        }
        Step::Questionnaire => {
            order.extend((0..CHOICES.len()).map(FocusTarget::Field));
            order.push(FocusTarget::Button(ButtonFocus::Back));
            order.push(FocusTarget::Button(ButtonFocus::Next));
            order.push(FocusTarget::Button(ButtonFocus::Cancel));
        }
        Step::Confirmation => {
            order.push(FocusTarget::Button(ButtonFocus::Next));
            order.push(FocusTarget::Button(ButtonFocus::Cancel));
        }
    }
    order
}

fn move_focus(state: &mut WizardState, forward: bool) {
    let order = focus_order(state.flow.step());
    let pos = order.iter().position(|f| *f == state.focus).unwrap_or(0);
    let next = if forward {
        (pos + 1) % order.len()
    } else {
        (pos + order.len() - 1) % order.len()
    };
    state.focus = order[next];
    if let FocusTarget::Field(i) = state.focus {
        if state.flow.step() == Step::Questionnaire {
            state.selected_choice = i;
        }
    }
}

/// Reset page-local state when the flow moved to another step.
fn after_flow_change(state: &mut WizardState, prev: Step) {
    let step = state.flow.step();
    if step == prev {
        return;
    }
    if step == Step::Intake {
        state.reset_intake();
    }
    state.focus = default_focus(step);
    state.selected_choice = 0;
    state.show_tooltip = false;
}

fn active_modal(state: &WizardState) -> Option<Modal> {
    if state.confirm_quit {
        return Some(Modal::ConfirmQuit);
    }
    if state.flow.is_loading() {
        return Some(Modal::Loading);
    }
    [
        (ModalKind::IdleConfirm, Modal::IdleConfirm),
        (ModalKind::ExitIntent, Modal::ExitIntent),
        (ModalKind::PhaseCompletion, Modal::PhaseComplete),
        (ModalKind::Welcome, Modal::Welcome),
    ]
    .into_iter()
    .find(|(kind, _)| state.flow.is_modal_open(*kind))
    .map(|(_, modal)| modal)
}

fn toggle_modal_focus(state: &mut WizardState) {
    state.modal_focus = match state.modal_focus {
        ButtonFocus::Cancel => ButtonFocus::Next,
        _ => ButtonFocus::Cancel,
    };
}

fn handle_mouse(state: &mut WizardState, kind: MouseEventKind, row: u16, now: Instant) {
    if kind == MouseEventKind::Moved && row == 0 {
        if state.flow.pointer_left_top().is_some() {
            state.modal_focus = ButtonFocus::Next;
        }
        return;
    }
    state.flow.activity(now);
}

fn handle_key(
    state: &mut WizardState,
    code: KeyCode,
    tx: &mpsc::Sender<UiMsg>,
    submitter: &Arc<dyn DiagnosisSubmitter>,
    now: Instant,
) {
    let prev = state.flow.step();
    state.flow.activity(now);

    // Modal handling
    if let Some(modal) = active_modal(state) {
        match modal {
            Modal::ConfirmQuit => match code {
                KeyCode::Left | KeyCode::Right | KeyCode::Tab => toggle_modal_focus(state),
                KeyCode::Enter => {
                    state.confirm_quit = false;
                    if state.modal_focus == ButtonFocus::Cancel {
                        state.quit = true;
                    }
                    state.modal_focus = ButtonFocus::Next;
                }
                KeyCode::Esc => state.confirm_quit = false,
                _ => {}
            },
            Modal::Loading => {}
            Modal::Welcome => {
                if matches!(code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                    state.flow.dismiss_welcome(now);
                }
            }
            Modal::PhaseComplete => {
                if code == KeyCode::Enter {
                    match state.flow.acknowledge_phase(now) {
                        Ok(Some(_)) => start_submission(state, tx, submitter),
                        Ok(None) => {}
                        Err(e) => warn!("[PHASE: tui] [STEP: phase_ack] {}", e),
                    }
                    state.selected_choice = 0;
                    state.focus = FocusTarget::Field(0);
                }
            }
            Modal::IdleConfirm => match code {
                KeyCode::Left | KeyCode::Right | KeyCode::Tab => toggle_modal_focus(state),
                KeyCode::Enter => {
                    if state.modal_focus == ButtonFocus::Cancel {
                        state.flow.restart();
                    } else {
                        state.flow.resume_from_idle(now);
                    }
                    state.modal_focus = ButtonFocus::Next;
                }
                _ => {}
            },
            Modal::ExitIntent => match code {
                KeyCode::Left | KeyCode::Right | KeyCode::Tab => toggle_modal_focus(state),
                KeyCode::Enter => {
                    if state.modal_focus == ButtonFocus::Cancel {
                        state.flow.abandon();
                    } else {
                        state.flow.continue_after_exit_intent(now);
                    }
                    state.modal_focus = ButtonFocus::Next;
                }
                KeyCode::Esc => state.flow.continue_after_exit_intent(now),
                _ => {}
            },
        }
        after_flow_change(state, prev);
        return;
    }

    match code {
        KeyCode::Esc => {
            state.confirm_quit = true;
            state.modal_focus = ButtonFocus::Next;
            return;
        }
        KeyCode::Tab => {
            move_focus(state, true);
            return;
        }
        KeyCode::BackTab => {
            move_focus(state, false);
            return;
        }
        _ => {}
    }

    match state.flow.step() {
        Step::Intake => handle_intake_key(state, code, now),
        Step::Questionnaire => handle_question_key(state, code, tx, submitter, now),
        Step::Confirmation => {
            if code == KeyCode::Enter {
                match state.focus {
                    FocusTarget::Button(ButtonFocus::Cancel) => {
                        state.confirm_quit = true;
                        state.modal_focus = ButtonFocus::Next;
                    }
                    _ => state.flow.restart(),
                }
            }
        }
    }

    after_flow_change(state, prev);
}

fn submit_intake(state: &mut WizardState, now: Instant) {
    let data = state.company_data();
    if state.flow.submit_intake(data, now).is_err() {
        let first = state.flow.intake_errors().first().map(|(field, _)| field);
        state.focus = match first {
            Some(IntakeField::TipoEmpresa) => FocusTarget::Field(TYPE_SELECTOR),
            Some(field) => FocusTarget::Field(
                INTAKE_TEXT_FIELDS
                    .iter()
                    .position(|f| *f == field)
                    .unwrap_or(0),
            ),
            None => FocusTarget::Field(0),
        };
    }
}

fn handle_intake_key(state: &mut WizardState, code: KeyCode, now: Instant) {
    match state.focus {
        FocusTarget::Field(i) if i < TYPE_SELECTOR => match code {
            KeyCode::Enter | KeyCode::Down => move_focus(state, true),
            KeyCode::Up => move_focus(state, false),
            _ => {
                if let Some(input) = state.intake.get_mut(i) {
                    if input.handle_key(code) {
                        state
                            .flow
                            .intake_errors_mut()
                            .clear_field(INTAKE_TEXT_FIELDS[i]);
                    }
                }
            }
        },
        FocusTarget::Field(_) => match code {
            KeyCode::Left => {
                state.company_type = state.company_type.prev();
                state.flow.intake_errors_mut().clear_field(IntakeField::TipoEmpresa);
            }
            KeyCode::Right | KeyCode::Char(' ') => {
                state.company_type = state.company_type.next();
                state.flow.intake_errors_mut().clear_field(IntakeField::TipoEmpresa);
            }
            KeyCode::Up => move_focus(state, false),
            KeyCode::Enter | KeyCode::Down => {
                state.focus = FocusTarget::Button(ButtonFocus::Next);
            }
            _ => {}
        },
        FocusTarget::Button(ButtonFocus::Next) => match code {
            KeyCode::Enter => submit_intake(state, now),
            KeyCode::Left | KeyCode::Right => move_focus(state, code == KeyCode::Right),
            _ => {}
        },
        FocusTarget::Button(_) => match code {
            KeyCode::Enter => {
                state.confirm_quit = true;
                state.modal_focus = ButtonFocus::Next;
            }
            KeyCode::Left | KeyCode::Right => move_focus(state, code == KeyCode::Right),
            _ => {}
        },
    }
}

fn answer_choice(
    state: &mut WizardState,
    choice: Choice,
    tx: &mpsc::Sender<UiMsg>,
    submitter: &Arc<dyn DiagnosisSubmitter>,
    now: Instant,
) {
    match state.flow.answer(choice, now) {
        Ok(Some(_)) => start_submission(state, tx, submitter),
        Ok(None) => {}
        Err(e) => warn!("[PHASE: tui] [STEP: answer] {}", e),
    }
    state.selected_choice = 0;
    state.show_tooltip = false;
    if matches!(state.focus, FocusTarget::Field(_)) {
        state.focus = FocusTarget::Field(0);
    }
}

fn handle_question_key(
    state: &mut WizardState,
    code: KeyCode,
    tx: &mpsc::Sender<UiMsg>,
    submitter: &Arc<dyn DiagnosisSubmitter>,
    now: Instant,
) {
    // Every answer is in: only retry (after a failure) or quit.
    if state.flow.outcome().is_some() {
        if matches!(code, KeyCode::Enter | KeyCode::Char('r') | KeyCode::Char('R')) {
            if let Some(request) = state.flow.retry_submission() {
                spawn_submission(request, tx, submitter);
            }
        }
        return;
    }

    match code {
        KeyCode::Char('s') | KeyCode::Char('S') => answer_choice(state, Choice::Yes, tx, submitter, now),
        KeyCode::Char('n') | KeyCode::Char('N') => answer_choice(state, Choice::No, tx, submitter, now),
        KeyCode::Char('?') => answer_choice(state, Choice::Unsure, tx, submitter, now),
        KeyCode::Char('t') | KeyCode::Char('T') => state.show_tooltip = !state.show_tooltip,
        KeyCode::Backspace => state.flow.go_back(now),
        KeyCode::Up => {
            state.selected_choice = state.selected_choice.saturating_sub(1);
            state.focus = FocusTarget::Field(state.selected_choice);
        }
        KeyCode::Down => {
            state.selected_choice = (state.selected_choice + 1).min(CHOICES.len() - 1);
            state.focus = FocusTarget::Field(state.selected_choice);
        }
        KeyCode::Left | KeyCode::Right if matches!(state.focus, FocusTarget::Button(_)) => {
            move_focus(state, code == KeyCode::Right)
        }
        KeyCode::Enter => match state.focus {
            FocusTarget::Field(i) => {
                let choice = CHOICES.get(i).copied().unwrap_or(Choice::Yes);
                answer_choice(state, choice, tx, submitter, now);
            }
            FocusTarget::Button(ButtonFocus::Back) => state.flow.go_back(now),
            FocusTarget::Button(ButtonFocus::Next) => {
                let choice = CHOICES
                    .get(state.selected_choice)
                    .copied()
                    .unwrap_or(Choice::Yes);
                answer_choice(state, choice, tx, submitter, now);
            }
            FocusTarget::Button(ButtonFocus::Cancel) => {
                state.confirm_quit = true;
                state.modal_focus = ButtonFocus::Next;
            }
        },
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

fn draw(area: Rect, f: &mut ratatui::Frame<'_>, state: &WizardState) {
    let window_area = centered_window(area, 100, 30);

    let outer_block = Block::default().borders(Borders::ALL).title(WINDOW_TITLE);
    f.render_widget(outer_block, window_area);

    let inner = window_area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    });
    let header_height = if state.flow.step() == Step::Questionnaire {
        5
    } else {
        2
    };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(header_height),
                Constraint::Min(0),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(inner);

    draw_header(f, rows[0], state);

    let content = match state.flow.step() {
        Step::Intake => intake_text(state),
        Step::Questionnaire => question_text(state),
        Step::Confirmation => confirmation_text(state),
    };
    let body = Paragraph::new(content)
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(body, rows[1]);

    draw_buttons(f, rows[2], state);

    match active_modal(state) {
        Some(Modal::ConfirmQuit) => draw_dialog(
            f,
            window_area,
            "¿Salir?",
            vec![Line::from(
                "Si sales ahora se perderá el diagnóstico en curso.",
            )],
            &[
                ("Sí, salir", state.modal_focus == ButtonFocus::Cancel),
                ("No", state.modal_focus == ButtonFocus::Next),
            ],
        ),
        Some(Modal::Loading) => draw_dialog(
            f,
            window_area,
            "Enviando",
            vec![Line::from("Procesando diagnóstico...")],
            &[],
        ),
        Some(Modal::Welcome) => draw_dialog(
            f,
            window_area,
            "Bienvenido",
            vec![
                Line::from(Span::styled(
                    format!("¡Hola {}!", state.contact_name()),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(
                    "Responde con sinceridad: cada respuesta ajusta tu exposición a multas de SUNAFIL.",
                ),
            ],
            &[("Empezar", true)],
        ),
        Some(Modal::PhaseComplete) => draw_phase_modal(f, window_area, state),
        Some(Modal::IdleConfirm) => draw_dialog(
            f,
            window_area,
            "¿Sigues ahí?",
            vec![Line::from(
                "Detectamos inactividad. ¿Deseas continuar con tu diagnóstico?",
            )],
            &[
                ("Continuar", state.modal_focus == ButtonFocus::Next),
                ("Reiniciar", state.modal_focus == ButtonFocus::Cancel),
            ],
        ),
        Some(Modal::ExitIntent) => {
            let exposure = state.flow.engine().map_or(0.0, |e| e.risk().total);
            draw_dialog(
                f,
                window_area,
                &format!(
                    "¡Espera, {}! Tu diagnóstico está incompleto",
                    state.contact_name()
                ),
                vec![
                    Line::from("Si sales ahora perderás tu avance."),
                    Line::from(format!(
                        "Exposición detectada hasta ahora: {}",
                        format_soles(exposure)
                    )),
                ],
                &[
                    ("Continuar diagnóstico", state.modal_focus == ButtonFocus::Next),
                    ("Salir", state.modal_focus == ButtonFocus::Cancel),
                ],
            )
        }
        None => {}
    }
}

fn centered_window(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width.saturating_sub(2)).max(60).min(area.width);
    let h = height.min(area.height.saturating_sub(2)).max(20).min(area.height);
    let x = area.x + (area.width.saturating_sub(w)) / 2;
    let y = area.y + (area.height.saturating_sub(h)) / 2;
    Rect {
        x,
        y,
        width: w,
        height: h,
    }
}

fn draw_header(f: &mut ratatui::Frame<'_>, area: Rect, state: &WizardState) {
    let title = match state.flow.step() {
        Step::Intake => "Datos de la empresa",
        Step::Questionnaire => "Diagnóstico de cumplimiento SST",
        Step::Confirmation => "Resultado del diagnóstico",
    };
    let mut lines = vec![Line::from(Span::styled(
        title,
        Style::default().add_modifier(Modifier::BOLD),
    ))];

    if let (Step::Questionnaire, Some(engine)) = (state.flow.step(), state.flow.engine()) {
        if let Some(pos) = engine.position() {
            let phase_name = engine.current_phase().map_or("", |p| p.name.as_str());
            lines.push(Line::from(format!(
                "Fase {} de {}: {}   |   Pregunta {} de {}",
                pos.phase_number,
                pos.phase_count,
                phase_name,
                pos.index + 1,
                pos.total_questions
            )));
        }
        if let Some(phase) = engine.current_phase() {
            lines.push(Line::from(Span::styled(
                phase.description.clone(),
                Style::default().fg(Color::DarkGray),
            )));
        }
        let pct = engine.progress_percent();
        lines.push(Line::from(format!(
            "{} {:>3.0}%",
            progress_bar(pct, 40),
            pct
        )));

        let risk = engine.risk();
        let mut risk_style = Style::default();
        if risk.total > 0.0 {
            risk_style = risk_style.fg(Color::Red);
        }
        if risk.is_increasing() {
            risk_style = risk_style.add_modifier(Modifier::BOLD);
        }
        let arrow = if risk.is_increasing() { " ▲" } else { "" };
        lines.push(Line::from(vec![
            Span::raw(format!(
                "Puntos: {} / {}    Exposición a multas: ",
                engine.points(),
                engine.max_points()
            )),
            Span::styled(format!("{}{}", format_soles(risk.total), arrow), risk_style),
        ]));
    }

    f.render_widget(Paragraph::new(Text::from(lines)), area);
}

fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    )
}

fn intake_text(state: &WizardState) -> Text<'static> {
    let errors = state.flow.intake_errors();
    let error_style = Style::default().fg(Color::Red);
    let mut lines = vec![
        Line::from("Completa tus datos para iniciar el diagnóstico gratuito."),
        Line::from(""),
    ];

    for (i, field) in INTAKE_TEXT_FIELDS.iter().enumerate() {
        let focused = state.focus == FocusTarget::Field(i);
        let prefix = if focused { ">" } else { " " };
        let value = state.intake.get(i).map(|t| t.value.clone()).unwrap_or_default();
        let cursor = if focused { "_" } else { "" };
        lines.push(Line::from(format!(
            "{} {}: {}{}",
            prefix,
            field.label(),
            value,
            cursor
        )));
        if let Some(msg) = errors.get(*field) {
            lines.push(Line::from(Span::styled(format!("    {}", msg), error_style)));
        }
    }

    let focused = state.focus == FocusTarget::Field(TYPE_SELECTOR);
    let prefix = if focused { ">" } else { " " };
    let label = if state.company_type.is_set() {
        state.company_type.label()
    } else {
        "Selecciona"
    };
    lines.push(Line::from(format!(
        "{} {}: < {} >",
        prefix,
        IntakeField::TipoEmpresa.label(),
        label
    )));
    if let Some(msg) = errors.get(IntakeField::TipoEmpresa) {
        lines.push(Line::from(Span::styled(format!("    {}", msg), error_style)));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(
        "Tab/Flechas para moverte. Izquierda/Derecha cambia el tipo de empresa.",
    ));
    Text::from(lines)
}

fn question_text(state: &WizardState) -> Text<'static> {
    let mut lines = Vec::new();
    let Some(engine) = state.flow.engine() else {
        return Text::from(lines);
    };

    if state.flow.outcome().is_some() {
        lines.push(Line::from("Diagnóstico completo."));
        lines.push(Line::from(""));
    } else if let Some(question) = engine
        .current_question_id()
        .and_then(|id| engine.catalog().question(id))
    {
        lines.push(Line::from(Span::styled(
            question.text.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(format!(
            "Gravedad: {}",
            question.severity.label()
        )));
        lines.push(Line::from(""));
        if state.show_tooltip {
            if let Some(tip) = &question.tooltip {
                lines.push(Line::from(Span::styled(
                    format!("Nota: {}", tip),
                    Style::default().fg(Color::Cyan),
                )));
                lines.push(Line::from(""));
            }
        }
        for (i, choice) in CHOICES.iter().enumerate() {
            let focused = state.focus == FocusTarget::Field(i);
            let mark = if i == state.selected_choice { "(x)" } else { "( )" };
            let style = if focused {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            lines.push(Line::from(Span::styled(
                format!("{} {}", mark, choice.label()),
                style,
            )));
        }
        lines.push(Line::from(""));
    } else {
        lines.push(Line::from("No hay preguntas aplicables para este tipo de empresa."));
    }

    if let Some(monitor) = state.flow.monitor() {
        if monitor.is_idle() {
            lines.push(Line::from(Span::styled(
                format!(
                    "¿Sigues ahí? El diagnóstico se pausará en {} s.",
                    monitor.countdown_remaining()
                ),
                Style::default().fg(Color::Yellow),
            )));
        }
    }

    if let Some(error) = state.flow.error() {
        lines.push(Line::from(Span::styled(
            error.to_string(),
            Style::default().fg(Color::Red),
        )));
        lines.push(Line::from("Presiona R para reintentar."));
    } else if state.flow.outcome().is_none() {
        lines.push(Line::from(
            "S/N/? responden   Arriba/Abajo elige   T ayuda   Retroceso vuelve",
        ));
    }

    Text::from(lines)
}

fn confirmation_text(state: &WizardState) -> Text<'static> {
    let Some(summary) = state.flow.confirmation() else {
        return Text::from("");
    };
    let company = &summary.company;
    let mut lines = vec![
        Line::from(Span::styled(
            format!("¡Gracias, {}! Tu diagnóstico fue registrado.", company.nombre),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!(
            "Empresa: {} ({})",
            company.empresa,
            company.tipo_empresa.label()
        )),
        Line::from(format!("Trabajadores: {}", company.numero_trabajadores)),
    ];

    let fine_style = if summary.has_infractions {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Green)
    };
    lines.push(Line::from(vec![
        Span::raw("Multa potencial: "),
        Span::styled(summary.formatted_fine(), fine_style),
    ]));

    if summary.has_infractions {
        lines.push(Line::from(format!(
            "Infracciones: {} (Leve {}, Grave {}, Muy Grave {})",
            summary.severity.total(),
            summary.severity.count(Severity::Leve),
            summary.severity.count(Severity::Grave),
            summary.severity.count(Severity::MuyGrave)
        )));
        if let Some(max) = summary.severity.max_severity() {
            lines.push(Line::from(vec![
                Span::raw("Gravedad máxima: "),
                Span::styled(max.label(), fine_style),
            ]));
        }
    } else {
        lines.push(Line::from("Sin infracciones detectadas."));
    }

    lines.push(Line::from(""));
    lines.push(Line::from("Habla con un especialista por WhatsApp:"));
    lines.push(Line::from(Span::styled(
        summary.whatsapp_link(&state.whatsapp_number),
        Style::default().fg(Color::Cyan),
    )));
    Text::from(lines)
}

fn draw_buttons(f: &mut ratatui::Frame<'_>, area: Rect, state: &WizardState) {
    let step = state.flow.step();
    let finished = state.flow.outcome().is_some();
    let back_enabled = step == Step::Questionnaire && !finished;
    let next_label = match step {
        Step::Intake => "Comenzar",
        Step::Questionnaire if finished => "Reintentar",
        Step::Questionnaire => "Responder",
        Step::Confirmation => "Nuevo diagnóstico",
    };
    let next_enabled = !finished || state.flow.error().is_some();

    let back = button_text(
        "Atrás",
        state.focus == FocusTarget::Button(ButtonFocus::Back),
        back_enabled,
    );
    let next = button_text(
        next_label,
        state.focus == FocusTarget::Button(ButtonFocus::Next),
        next_enabled,
    );
    let cancel = button_text(
        "Salir",
        state.focus == FocusTarget::Button(ButtonFocus::Cancel),
        true,
    );

    let line = Line::from(vec![back, Span::raw(" "), next, Span::raw(" "), cancel]);
    let p = Paragraph::new(Text::from(line)).alignment(Alignment::Right);
    f.render_widget(p, area);
}

fn button_text(label: &str, focused: bool, enabled: bool) -> Span<'static> {
    let mut style = Style::default();
    if !enabled {
        style = style.fg(Color::DarkGray);
    }
    if focused && enabled {
        style = style.add_modifier(Modifier::REVERSED);
    }
    Span::styled(format!("[ {} ]", label), style)
}

fn draw_dialog(
    f: &mut ratatui::Frame<'_>,
    window_area: Rect,
    title: &str,
    body: Vec<Line<'static>>,
    buttons: &[(&str, bool)],
) {
    let modal_w = 70u16.min(window_area.width.saturating_sub(4)).max(40);
    let wanted_h = body.len() as u16 + if buttons.is_empty() { 2 } else { 4 } + 2;
    let modal_h = wanted_h.min(window_area.height.saturating_sub(4)).max(5);
    let x = window_area.x + (window_area.width.saturating_sub(modal_w)) / 2;
    let y = window_area.y + (window_area.height.saturating_sub(modal_h)) / 2;
    let area = Rect {
        x,
        y,
        width: modal_w.min(window_area.width),
        height: modal_h.min(window_area.height),
    };

    f.render_widget(Clear, area);
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let p = Paragraph::new(Text::from(body))
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);

    if buttons.is_empty() || area.height < 3 {
        return;
    }
    let buttons_area = Rect {
        x: area.x + 1,
        y: area.y + area.height - 2,
        width: area.width.saturating_sub(2),
        height: 1,
    };
    let mut spans = Vec::new();
    for (i, (label, focused)) in buttons.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        spans.push(button_text(label, *focused, true));
    }
    let p = Paragraph::new(Text::from(Line::from(spans))).alignment(Alignment::Right);
    f.render_widget(p, buttons_area);
}

fn draw_phase_modal(f: &mut ratatui::Frame<'_>, window_area: Rect, state: &WizardState) {
    let Some(engine) = state.flow.engine() else {
        return;
    };
    let Some(done) = engine.pending_completion() else {
        return;
    };
    let message_style = if done.has_infractions {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    };
    draw_dialog(
        f,
        window_area,
        &format!("Fase {} de {} completada", done.phase.id, done.phase_count),
        vec![
            Line::from(Span::styled(
                done.phase.name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(done.message.clone(), message_style)),
            Line::from(""),
            Line::from(format!(
                "Puntos: {} / {}",
                engine.points(),
                engine.max_points()
            )),
        ],
        &[(done.button_text.as_str(), true)],
    );
}
