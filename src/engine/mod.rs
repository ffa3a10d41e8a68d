//! Phase-driven questionnaire engine.
//!
//! The engine walks the company-type specific question list phase by phase.
//! Every transition is an explicit method returning the signals it emitted;
//! callers consume them synchronously. Points, progress and risk are derived
//! from `(index, answers, pending completion)` on every read.
//!
//! ```text
//! Answering --(not last in phase)--> Answering[next]
//! Answering --(last in phase)------> PhaseComplete --ack--> Answering[next phase, q0]
//! Answering --(last of last phase)-> PhaseComplete --ack--> Finished
//! ```

pub mod attention;
pub mod scheduler;

use std::sync::Arc;

use crate::catalog::{Catalog, Phase};
use crate::models::{Answer, AnswerSet, CompanyProfile};
use crate::risk::{self, RiskExposure};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("there is no current question")]
    NoCurrentQuestion,
    #[error("phase {0} completion must be acknowledged first")]
    PhaseCompletionPending(usize),
    #[error("no phase completion is pending")]
    NoPendingPhase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseCompletion {
    pub phase: Phase,
    pub phase_count: usize,
    pub has_infractions: bool,
    pub is_last: bool,
    pub message: String,
    pub button_text: String,
}

/// Handed to the orchestrator exactly once, when the last phase is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionnaireOutcome {
    pub answers: AnswerSet,
    pub total_fine: f64,
    pub has_infractions: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    Advanced { index: usize },
    PhaseCompleted(PhaseCompletion),
    Finished(QuestionnaireOutcome),
    /// Back was pressed on the very first question.
    ExitRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Answering { index: usize },
    PhaseComplete { phase_id: usize },
    Finished,
}

/// Where the visitor is, in the numbers the header shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub index: usize,
    pub total_questions: usize,
    pub phase_number: usize,
    pub phase_count: usize,
    pub question_in_phase: usize,
    pub questions_in_phase: usize,
}

pub struct QuestionnaireEngine {
    catalog: Arc<Catalog>,
    profile: CompanyProfile,
    phases: Vec<Phase>,
    question_ids: Vec<String>,
    phase_of: Vec<usize>,
    index: usize,
    answers: AnswerSet,
    pending: Option<PhaseCompletion>,
    finalized: Option<AnswerSet>,
    global_infractions: bool,
    finished: bool,
    previous_total: f64,
}

impl QuestionnaireEngine {
    pub fn new(catalog: Arc<Catalog>, profile: CompanyProfile) -> Self {
        let phases = catalog.phases_for(profile.company_type);
        let mut question_ids = Vec::new();
        let mut phase_of = Vec::new();
        for (p_idx, phase) in phases.iter().enumerate() {
            for id in &phase.question_ids {
                question_ids.push(id.clone());
                phase_of.push(p_idx);
            }
        }

        Self {
            catalog,
            profile,
            phases,
            question_ids,
            phase_of,
            index: 0,
            answers: AnswerSet::new(),
            pending: None,
            finalized: None,
            global_infractions: false,
            finished: false,
            previous_total: 0.0,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn total_questions(&self) -> usize {
        self.question_ids.len()
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    pub fn pending_completion(&self) -> Option<&PhaseCompletion> {
        self.pending.as_ref()
    }

    pub fn state(&self) -> EngineState {
        if self.finished {
            EngineState::Finished
        } else if let Some(p) = &self.pending {
            EngineState::PhaseComplete {
                phase_id: p.phase.id,
            }
        } else {
            EngineState::Answering { index: self.index }
        }
    }

    pub fn current_question_id(&self) -> Option<&str> {
        if self.finished {
            return None;
        }
        self.question_ids.get(self.index).map(String::as_str)
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        if self.finished {
            return None;
        }
        self.phase_of
            .get(self.index)
            .and_then(|p_idx| self.phases.get(*p_idx))
    }

    pub fn position(&self) -> Option<Position> {
        let p_idx = *self.phase_of.get(self.index)?;
        let phase = self.phases.get(p_idx)?;
        Some(Position {
            index: self.index,
            total_questions: self.question_ids.len(),
            phase_number: phase.id,
            phase_count: self.phases.len(),
            question_in_phase: self.index - self.phase_start(p_idx) + 1,
            questions_in_phase: phase.question_ids.len(),
        })
    }

    /// Record an answer for the current question.
    pub fn answer(&mut self, answer: Answer) -> Result<Vec<EngineSignal>, EngineError> {
        if self.finished {
            return Err(EngineError::NoCurrentQuestion);
        }
        if let Some(pending) = &self.pending {
            return Err(EngineError::PhaseCompletionPending(pending.phase.id));
        }
        let question_id = self
            .question_ids
            .get(self.index)
            .cloned()
            .ok_or(EngineError::NoCurrentQuestion)?;
        let p_idx = self.phase_of[self.index];

        self.previous_total = self.risk_total();
        self.answers.record(question_id, answer);

        let phase = &self.phases[p_idx];
        let last_in_phase = self.index + 1 == self.phase_start(p_idx) + phase.question_ids.len();
        if !last_in_phase {
            self.index += 1;
            return Ok(vec![EngineSignal::Advanced { index: self.index }]);
        }

        let has_infractions = self.answers.infractions_among(&phase.question_ids) > 0;
        let is_last = p_idx + 1 == self.phases.len();
        if is_last {
            self.global_infractions = self.answers.has_infractions();
            self.finalized = Some(self.answers.clone());
        }
        let button_text = if is_last {
            self.catalog
                .final_button_text(self.global_infractions)
                .to_string()
        } else {
            phase.button_text.clone()
        };

        let completion = PhaseCompletion {
            phase: phase.clone(),
            phase_count: self.phases.len(),
            has_infractions,
            is_last,
            message: phase.message(has_infractions).to_string(),
            button_text,
        };
        self.pending = Some(completion.clone());
        Ok(vec![EngineSignal::PhaseCompleted(completion)])
    }

    /// Close the phase-completion signal and move on (or finish).
    pub fn acknowledge_phase_completion(&mut self) -> Result<Vec<EngineSignal>, EngineError> {
        let done = self.pending.take().ok_or(EngineError::NoPendingPhase)?;

        if done.is_last {
            self.finished = true;
            let answers = self
                .finalized
                .take()
                .unwrap_or_else(|| self.answers.clone());
            let outcome = QuestionnaireOutcome {
                answers,
                total_fine: self.risk_total(),
                has_infractions: self.global_infractions,
            };
            return Ok(vec![EngineSignal::Finished(outcome)]);
        }

        self.index += 1;
        Ok(vec![EngineSignal::Advanced { index: self.index }])
    }

    /// Step back one question. On the first question this asks to leave the engine.
    pub fn go_back(&mut self) -> Vec<EngineSignal> {
        if self.finished || self.pending.is_some() {
            return Vec::new();
        }
        if self.index == 0 {
            return vec![EngineSignal::ExitRequested];
        }
        self.index -= 1;
        vec![EngineSignal::Advanced { index: self.index }]
    }

    /// Full points for passed phases, linear share of the phase in progress.
    pub fn points(&self) -> u32 {
        let passed = self.index + usize::from(self.pending.is_some() || self.finished);
        let mut points = 0u32;
        for (p_idx, phase) in self.phases.iter().enumerate() {
            let n = phase.question_ids.len();
            let done = passed.saturating_sub(self.phase_start(p_idx)).min(n);
            if done == n {
                points += phase.points;
            } else {
                points += phase.points * done as u32 / n as u32;
            }
        }
        points
    }

    pub fn max_points(&self) -> u32 {
        self.phases.last().map_or(0, |p| p.total_points)
    }

    pub fn progress_percent(&self) -> f64 {
        let total = self.question_ids.len();
        if total == 0 || self.finished {
            return 100.0;
        }
        ((self.index + 1) as f64 / total as f64) * 100.0
    }

    pub fn risk(&self) -> RiskExposure {
        risk::compute(
            &self.catalog,
            &self.answers,
            self.profile.employees,
            self.profile.company_type,
            self.previous_total,
        )
    }

    fn risk_total(&self) -> f64 {
        risk::total_exposure(
            &self.catalog,
            &self.answers,
            self.profile.employees,
            self.profile.company_type,
        )
    }

    fn phase_start(&self, p_idx: usize) -> usize {
        self.phases[..p_idx]
            .iter()
            .map(|p| p.question_ids.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use crate::models::CompanyType;

    fn engine(catalog: Catalog, company_type: CompanyType, employees: u32) -> QuestionnaireEngine {
        QuestionnaireEngine::new(
            Arc::new(catalog),
            CompanyProfile {
                employees,
                company_type,
            },
        )
    }

    /// Answer everything with `answer`, acknowledging every phase. Returns all signals.
    fn run_all(e: &mut QuestionnaireEngine, answer: Answer) -> Vec<EngineSignal> {
        let mut signals = Vec::new();
        while e.state() != EngineState::Finished {
            let out = e.answer(answer).unwrap();
            let completed = out
                .iter()
                .any(|s| matches!(s, EngineSignal::PhaseCompleted(_)));
            signals.extend(out);
            if completed {
                signals.extend(e.acknowledge_phase_completion().unwrap());
            }
        }
        signals
    }

    #[test]
    fn micro_single_phase_all_no_reports_infractions_and_fines() {
        let mut e = engine(fixtures::single_phase(), CompanyType::Micro, 4);
        assert!(matches!(
            e.answer(Answer::No).unwrap()[..],
            [EngineSignal::Advanced { index: 1 }]
        ));

        let signals = e.answer(Answer::No).unwrap();
        let [EngineSignal::PhaseCompleted(done)] = &signals[..] else {
            panic!("expected phase completion, got {:?}", signals);
        };
        assert!(done.has_infractions);
        assert!(done.is_last);
        assert_eq!(done.button_text, "Ver exposición");

        let signals = e.acknowledge_phase_completion().unwrap();
        let [EngineSignal::Finished(outcome)] = &signals[..] else {
            panic!("expected finish, got {:?}", signals);
        };
        assert!(outcome.has_infractions);
        assert_eq!(outcome.total_fine, 250.0 + 700.0);
        assert_eq!(outcome.answers.len(), 2);
    }

    #[test]
    fn micro_single_phase_all_yes_is_clean() {
        let mut e = engine(fixtures::single_phase(), CompanyType::Micro, 4);
        let signals = run_all(&mut e, Answer::Si);
        let outcome = signals
            .iter()
            .find_map(|s| match s {
                EngineSignal::Finished(o) => Some(o),
                _ => None,
            })
            .unwrap();
        assert!(!outcome.has_infractions);
        assert_eq!(outcome.total_fine, 0.0);
    }

    #[test]
    fn phase_signals_fire_once_per_boundary_and_finish_once() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        let signals = run_all(&mut e, Answer::No);

        let completed = signals
            .iter()
            .filter(|s| matches!(s, EngineSignal::PhaseCompleted(_)))
            .count();
        let finished: Vec<&QuestionnaireOutcome> = signals
            .iter()
            .filter_map(|s| match s {
                EngineSignal::Finished(o) => Some(o),
                _ => None,
            })
            .collect();
        assert_eq!(completed, 2);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].answers.len(), e.total_questions());
        assert_eq!(e.total_questions(), 5);

        assert_eq!(
            e.acknowledge_phase_completion(),
            Err(EngineError::NoPendingPhase)
        );
        assert_eq!(e.answer(Answer::Si), Err(EngineError::NoCurrentQuestion));
        assert!(e.go_back().is_empty());
    }

    #[test]
    fn finalized_answers_match_the_company_type_question_count() {
        let mut e = engine(fixtures::small(), CompanyType::Micro, 3);
        let signals = run_all(&mut e, Answer::Si);
        let Some(EngineSignal::Finished(outcome)) = signals.last() else {
            panic!("run did not finish");
        };
        assert_eq!(outcome.answers.len(), 4);
        assert!(outcome.answers.get("d").is_none());
    }

    #[test]
    fn index_waits_for_acknowledgment_at_phase_boundary() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        e.answer(Answer::Si).unwrap();
        e.answer(Answer::No).unwrap();
        assert_eq!(e.state(), EngineState::PhaseComplete { phase_id: 1 });
        assert_eq!(e.current_question_id(), Some("b"));
        assert_eq!(
            e.answer(Answer::Si),
            Err(EngineError::PhaseCompletionPending(1))
        );
        assert!(e.go_back().is_empty());

        let done = e.pending_completion().unwrap();
        assert!(done.has_infractions);
        assert_eq!(done.message, "brechas");
        assert_eq!(done.button_text, "Siguiente");

        assert_eq!(
            e.acknowledge_phase_completion().unwrap(),
            vec![EngineSignal::Advanced { index: 2 }]
        );
        assert_eq!(e.current_question_id(), Some("c"));
        assert_eq!(e.position().unwrap().phase_number, 2);
        assert_eq!(e.position().unwrap().question_in_phase, 1);
    }

    #[test]
    fn clean_phase_uses_the_clean_message() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        e.answer(Answer::Si).unwrap();
        e.answer(Answer::Si).unwrap();
        let done = e.pending_completion().unwrap();
        assert!(!done.has_infractions);
        assert_eq!(done.message, "ok");
    }

    #[test]
    fn back_on_first_question_requests_exit() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        assert_eq!(e.go_back(), vec![EngineSignal::ExitRequested]);
        assert_eq!(e.state(), EngineState::Answering { index: 0 });
    }

    #[test]
    fn going_back_and_reanswering_overwrites() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        e.answer(Answer::No).unwrap();
        assert_eq!(e.risk().total, 1000.0);

        assert_eq!(e.go_back(), vec![EngineSignal::Advanced { index: 0 }]);
        assert_eq!(e.answers().get("a"), Some(Answer::No));

        e.answer(Answer::Si).unwrap();
        assert_eq!(e.answers().len(), 1);
        assert_eq!(e.answers().get("a"), Some(Answer::Si));
        assert_eq!(e.risk().total, 0.0);
    }

    #[test]
    fn back_crosses_phase_boundaries() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        e.answer(Answer::Si).unwrap();
        e.answer(Answer::Si).unwrap();
        e.acknowledge_phase_completion().unwrap();
        assert_eq!(e.go_back(), vec![EngineSignal::Advanced { index: 1 }]);
        assert_eq!(e.position().unwrap().phase_number, 1);
    }

    #[test]
    fn points_never_decrease_and_end_at_the_phase_sum() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        assert_eq!(e.points(), 0);
        let mut last = 0;
        while e.state() != EngineState::Finished {
            let out = e.answer(Answer::Si).unwrap();
            assert!(e.points() >= last);
            last = e.points();
            if matches!(out[..], [EngineSignal::PhaseCompleted(_)]) {
                e.acknowledge_phase_completion().unwrap();
                assert!(e.points() >= last);
                last = e.points();
            }
        }
        assert_eq!(e.points(), 300);
        assert_eq!(e.points(), e.max_points());
    }

    #[test]
    fn partial_phase_points_are_floored() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        e.answer(Answer::Si).unwrap();
        assert_eq!(e.points(), 50);
        e.answer(Answer::Si).unwrap();
        assert_eq!(e.points(), 100);
        e.acknowledge_phase_completion().unwrap();
        e.answer(Answer::Si).unwrap();
        // 200 * 1/3
        assert_eq!(e.points(), 166);
    }

    #[test]
    fn risk_tracks_the_delta_of_the_latest_answer() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        e.answer(Answer::No).unwrap();
        let r = e.risk();
        assert_eq!(r.total, 1000.0);
        assert_eq!(r.last_delta, 1000.0);

        e.answer(Answer::Si).unwrap();
        let r = e.risk();
        assert_eq!(r.total, 1000.0);
        assert_eq!(r.last_delta, 0.0);
        assert!(!r.is_increasing());
    }

    #[test]
    fn progress_counts_the_current_question() {
        let mut e = engine(fixtures::small(), CompanyType::NoMype, 20);
        assert_eq!(e.progress_percent(), 20.0);
        e.answer(Answer::Si).unwrap();
        assert_eq!(e.progress_percent(), 40.0);
        run_all(&mut e, Answer::Si);
        assert_eq!(e.progress_percent(), 100.0);
    }

    #[test]
    fn empty_question_list_has_no_current_question() {
        let raw = fixtures::SINGLE_PHASE
            .replace("severity = \"grave\"", "severity = \"grave\"\nmype_exempt = true")
            .replace(
                "severity = \"muy_grave\"",
                "severity = \"muy_grave\"\nmype_exempt = true",
            );
        let catalog = Catalog::from_toml_str(&raw).unwrap();
        let mut e = engine(catalog, CompanyType::Micro, 3);
        assert_eq!(e.total_questions(), 0);
        assert!(e.current_question_id().is_none());
        assert_eq!(e.answer(Answer::Si), Err(EngineError::NoCurrentQuestion));
    }
}
