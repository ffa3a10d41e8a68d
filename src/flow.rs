//! Step orchestrator.
//!
//! Owns the visitor's run: `Intake -> Questionnaire -> Confirmation`, plus the
//! loading/error overlay between the last answer and the confirmation page.
//! The questionnaire engine and the attention monitor live only while the
//! questionnaire is active; restarting drops both.

use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

use crate::api::diagnostico::{DiagnosisSubmitter, SubmissionError};
use crate::catalog::Catalog;
use crate::contact::{self, DossierSummary};
use crate::engine::attention::{AttentionEvent, AttentionMonitor, InactivityProfile, ModalKind};
use crate::engine::{EngineError, EngineSignal, QuestionnaireEngine, QuestionnaireOutcome};
use crate::models::{Choice, CompanyData, DiagnosticoRequest};
use crate::risk::{self, SeveritySummary};
use crate::utils::logging::{mask_email, mask_phone, set_active_run};
use crate::utils::validation::{self, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Intake,
    Questionnaire,
    Confirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    /// No finished run to send, or a request already in flight.
    Skipped,
}

/// Everything the confirmation page shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationSummary {
    pub company: CompanyData,
    pub total_fine: f64,
    pub has_infractions: bool,
    pub severity: SeveritySummary,
}

impl ConfirmationSummary {
    pub fn formatted_fine(&self) -> String {
        contact::format_soles(self.total_fine)
    }

    pub fn whatsapp_link(&self, number: &str) -> String {
        contact::whatsapp_link(
            number,
            &DossierSummary {
                nombre: &self.company.nombre,
                cargo: &self.company.cargo,
                empresa: &self.company.empresa,
                numero_trabajadores: self.company.numero_trabajadores,
                tipo_empresa: self.company.tipo_empresa,
                total_fine: self.total_fine,
                has_infractions: self.has_infractions,
            },
        )
    }
}

pub struct DiagnosisFlow {
    catalog: Arc<Catalog>,
    inactivity: InactivityProfile,
    run_id: String,
    step: Step,
    company: Option<CompanyData>,
    intake_errors: ValidationErrors,
    engine: Option<QuestionnaireEngine>,
    monitor: Option<AttentionMonitor>,
    outcome: Option<QuestionnaireOutcome>,
    loading: bool,
    error: Option<String>,
    confirmation: Option<ConfirmationSummary>,
}

impl DiagnosisFlow {
    pub fn new(catalog: Arc<Catalog>, inactivity: InactivityProfile) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        set_active_run(&run_id);
        info!("[PHASE: flow] [STEP: start] New diagnosis run {}", run_id);
        Self {
            catalog,
            inactivity,
            run_id,
            step: Step::Intake,
            company: None,
            intake_errors: ValidationErrors::default(),
            engine: None,
            monitor: None,
            outcome: None,
            loading: false,
            error: None,
            confirmation: None,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn company(&self) -> Option<&CompanyData> {
        self.company.as_ref()
    }

    pub fn intake_errors(&self) -> &ValidationErrors {
        &self.intake_errors
    }

    pub fn intake_errors_mut(&mut self) -> &mut ValidationErrors {
        &mut self.intake_errors
    }

    pub fn engine(&self) -> Option<&QuestionnaireEngine> {
        self.engine.as_ref()
    }

    pub fn monitor(&self) -> Option<&AttentionMonitor> {
        self.monitor.as_ref()
    }

    pub fn outcome(&self) -> Option<&QuestionnaireOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn confirmation(&self) -> Option<&ConfirmationSummary> {
        self.confirmation.as_ref()
    }

    pub fn is_modal_open(&self, kind: ModalKind) -> bool {
        self.monitor
            .as_ref()
            .map_or(false, |m| m.is_modal_open(kind))
    }

    // ---------------------------------------------------------------------
    // Intake
    // ---------------------------------------------------------------------

    /// Validate the form and start the questionnaire for the company type.
    pub fn submit_intake(&mut self, data: CompanyData, now: Instant) -> Result<(), ValidationErrors> {
        if let Err(errors) = validation::validate_company_data(&data) {
            warn!(
                "[PHASE: flow] [STEP: intake] Intake rejected ({} field errors)",
                errors.len()
            );
            self.intake_errors = errors.clone();
            return Err(errors);
        }

        info!(
            "[PHASE: flow] [STEP: intake] Lead accepted: run={} email={} phone={} type={} workers={}",
            self.run_id,
            mask_email(&data.email),
            mask_phone(&data.telefono),
            data.tipo_empresa.as_id(),
            data.numero_trabajadores
        );

        let engine = QuestionnaireEngine::new(self.catalog.clone(), data.profile());
        let first_phase = engine.current_phase().map_or(1, |p| p.id);
        let mut monitor = AttentionMonitor::new(self.inactivity.clone(), first_phase);
        monitor.start(now);
        monitor.open_modal(ModalKind::Welcome);

        info!(
            "[PHASE: flow] [STEP: intake] Questionnaire ready: {} phases, {} questions",
            engine.phases().len(),
            engine.total_questions()
        );

        self.intake_errors = ValidationErrors::default();
        self.company = Some(data);
        self.engine = Some(engine);
        self.monitor = Some(monitor);
        self.outcome = None;
        self.error = None;
        self.step = Step::Questionnaire;
        Ok(())
    }

    pub fn dismiss_welcome(&mut self, now: Instant) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.close_modal(ModalKind::Welcome, now);
        }
    }

    // ---------------------------------------------------------------------
    // Questionnaire
    // ---------------------------------------------------------------------

    /// Answer the current question. Returns the submission payload once the run finishes.
    pub fn answer(
        &mut self,
        choice: Choice,
        now: Instant,
    ) -> Result<Option<DiagnosticoRequest>, EngineError> {
        let engine = self.engine.as_mut().ok_or(EngineError::NoCurrentQuestion)?;
        let signals = engine.answer(choice.as_answer())?;
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.activity(now);
        }
        Ok(self.handle_signals(signals, now))
    }

    /// Close the phase-completion modal.
    pub fn acknowledge_phase(&mut self, now: Instant) -> Result<Option<DiagnosticoRequest>, EngineError> {
        let engine = self.engine.as_mut().ok_or(EngineError::NoPendingPhase)?;
        let signals = engine.acknowledge_phase_completion()?;
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.close_modal(ModalKind::PhaseCompletion, now);
        }
        Ok(self.handle_signals(signals, now))
    }

    pub fn go_back(&mut self, now: Instant) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let signals = engine.go_back();
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.activity(now);
        }
        self.handle_signals(signals, now);
    }

    /// Apply engine signals to the rest of the run.
    pub fn handle_signals(
        &mut self,
        signals: Vec<EngineSignal>,
        now: Instant,
    ) -> Option<DiagnosticoRequest> {
        let mut request = None;
        for signal in signals {
            match signal {
                EngineSignal::Advanced { index } => {
                    let phase = self
                        .engine
                        .as_ref()
                        .and_then(|e| e.current_phase())
                        .map(|p| p.id);
                    if let (Some(phase), Some(monitor)) = (phase, self.monitor.as_mut()) {
                        monitor.set_phase(phase, now);
                    }
                    log::debug!("[PHASE: questionnaire] [STEP: advance] Now at question {}", index + 1);
                }
                EngineSignal::PhaseCompleted(done) => {
                    info!(
                        "[PHASE: questionnaire] [STEP: phase_complete] Phase {} of {} complete (infractions: {})",
                        done.phase.id, done.phase_count, done.has_infractions
                    );
                    if let Some(monitor) = self.monitor.as_mut() {
                        monitor.open_modal(ModalKind::PhaseCompletion);
                    }
                }
                EngineSignal::Finished(outcome) => {
                    info!(
                        "[PHASE: questionnaire] [STEP: finished] run={} answers={} potential_fine={:.2} infractions={}",
                        self.run_id,
                        outcome.answers.len(),
                        outcome.total_fine,
                        outcome.has_infractions
                    );
                    // No more idle or exit detection once every answer is in.
                    self.monitor = None;
                    self.outcome = Some(outcome);
                    request = self.submission_request();
                }
                EngineSignal::ExitRequested => {
                    info!("[PHASE: questionnaire] [STEP: exit] Back pressed on the first question");
                    self.restart();
                    return None;
                }
            }
        }
        request
    }

    // ---------------------------------------------------------------------
    // Attention
    // ---------------------------------------------------------------------

    pub fn tick(&mut self, now: Instant) -> Vec<AttentionEvent> {
        if self.step != Step::Questionnaire || self.loading {
            return Vec::new();
        }
        let Some(monitor) = self.monitor.as_mut() else {
            return Vec::new();
        };
        let events = monitor.tick(now);
        for event in &events {
            match event {
                AttentionEvent::IdleStarted { countdown } => info!(
                    "[PHASE: attention] [STEP: idle] Visitor idle, countdown {}s",
                    countdown
                ),
                AttentionEvent::IdleConfirmOpened => {
                    info!("[PHASE: attention] [STEP: idle_confirm] Countdown expired")
                }
                _ => {}
            }
        }
        events
    }

    pub fn activity(&mut self, now: Instant) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.activity(now);
        }
    }

    pub fn pointer_left_top(&mut self) -> Option<AttentionEvent> {
        if self.step != Step::Questionnaire {
            return None;
        }
        let event = self.monitor.as_mut()?.pointer_left_top();
        if event.is_some() {
            info!("[PHASE: attention] [STEP: exit_intent] Pointer left through the top edge");
        }
        event
    }

    /// "Continuar" on the idle dialog: fresh timers.
    pub fn resume_from_idle(&mut self, now: Instant) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.close_modal(ModalKind::IdleConfirm, now);
        }
    }

    pub fn continue_after_exit_intent(&mut self, now: Instant) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.close_modal(ModalKind::ExitIntent, now);
        }
    }

    /// Leave from the exit-intent dialog. The run is discarded.
    pub fn abandon(&mut self) {
        info!("[PHASE: attention] [STEP: abandon] Visitor abandoned run {}", self.run_id);
        self.restart();
    }

    /// Discard the run and go back to an empty intake form.
    pub fn restart(&mut self) {
        self.step = Step::Intake;
        self.company = None;
        self.intake_errors = ValidationErrors::default();
        self.engine = None;
        self.monitor = None;
        self.outcome = None;
        self.loading = false;
        self.error = None;
        self.confirmation = None;
        self.run_id = uuid::Uuid::new_v4().to_string();
        set_active_run(&self.run_id);
        info!("[PHASE: flow] [STEP: restart] New diagnosis run {}", self.run_id);
    }

    // ---------------------------------------------------------------------
    // Submission
    // ---------------------------------------------------------------------

    pub fn submission_request(&self) -> Option<DiagnosticoRequest> {
        let company = self.company.as_ref()?;
        let outcome = self.outcome.as_ref()?;
        Some(DiagnosticoRequest::new(company, &outcome.answers))
    }

    /// Enter the loading state. `None` when nothing is ready or a request is in flight.
    pub fn begin_submission(&mut self) -> Option<DiagnosticoRequest> {
        if self.loading || self.step != Step::Questionnaire {
            return None;
        }
        let request = self.submission_request()?;
        self.loading = true;
        self.error = None;
        info!("[PHASE: submission] [STEP: begin] Submitting run {}", self.run_id);
        Some(request)
    }

    pub fn finish_submission(&mut self, result: Result<(), SubmissionError>) {
        self.loading = false;
        match result {
            Ok(()) => {
                let (Some(company), Some(outcome)) = (self.company.clone(), self.outcome.as_ref())
                else {
                    return;
                };
                let severity = risk::severity_summary(
                    &self.catalog,
                    &outcome.answers,
                    company.tipo_empresa,
                );
                info!(
                    "[PHASE: submission] [STEP: severity] Run {}: {} infractions, max severity {}",
                    self.run_id,
                    severity.total(),
                    severity.max_severity().map_or("none", |s| s.label())
                );
                self.confirmation = Some(ConfirmationSummary {
                    company,
                    total_fine: outcome.total_fine,
                    has_infractions: outcome.has_infractions,
                    severity,
                });
                self.step = Step::Confirmation;
                info!("[PHASE: submission] [STEP: done] Run {} confirmed", self.run_id);
            }
            Err(e) => {
                warn!("[PHASE: submission] [STEP: failed] Run {}: {}", self.run_id, e);
                self.error = Some(e.user_message().to_string());
            }
        }
    }

    /// One attempt through `submitter`. Skipped when nothing is ready or a request is in flight.
    pub async fn submit(
        &mut self,
        submitter: &dyn DiagnosisSubmitter,
    ) -> Result<SubmitOutcome, SubmissionError> {
        let Some(request) = self.begin_submission() else {
            log::debug!(
                "[PHASE: submission] [STEP: skip] Run {}: nothing to submit (step={:?}, loading={})",
                self.run_id,
                self.step,
                self.loading
            );
            return Ok(SubmitOutcome::Skipped);
        };
        let result = submitter.submit(&request).await;
        self.finish_submission(result.clone());
        result.map(|()| SubmitOutcome::Sent)
    }

    /// Visitor pressed retry after a failure. Reuses the retained outcome.
    pub fn retry_submission(&mut self) -> Option<DiagnosticoRequest> {
        if self.error.is_none() {
            return None;
        }
        self.begin_submission()
    }
}
