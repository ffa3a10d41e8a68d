// Fine exposure calculation
//
// Pure functions of (answers, employee count, company type). Totals are always
// recomputed from the full answer set: infractions are counted per severity and
// multiplied by the unit fine of the company's band.

use std::collections::BTreeMap;

use crate::catalog::{Catalog, Severity};
use crate::models::{AnswerSet, CompanyType};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RiskExposure {
    pub total: f64,
    /// Change against the previous total. Display emphasis only.
    pub last_delta: f64,
}

impl RiskExposure {
    pub fn is_increasing(&self) -> bool {
        self.last_delta > 0.0
    }
}

/// Infraction counts per severity for the confirmation page and logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeveritySummary {
    pub counts: BTreeMap<Severity, u32>,
}

impl SeveritySummary {
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn count(&self, severity: Severity) -> u32 {
        self.counts.get(&severity).copied().unwrap_or(0)
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(s, _)| *s)
            .max()
    }
}

/// Count infractions by severity. Unknown ids and exempt questions are skipped.
pub fn severity_summary(
    catalog: &Catalog,
    answers: &AnswerSet,
    company_type: CompanyType,
) -> SeveritySummary {
    let mut summary = SeveritySummary::default();
    for (id, answer) in answers.iter() {
        if !answer.is_infraction() || !catalog.applies_to(id, company_type) {
            continue;
        }
        if let Some(question) = catalog.question(id) {
            *summary.counts.entry(question.severity).or_insert(0) += 1;
        }
    }
    summary
}

/// Total potential fine for the current answers.
pub fn total_exposure(
    catalog: &Catalog,
    answers: &AnswerSet,
    employees: u32,
    company_type: CompanyType,
) -> f64 {
    let Some(band) = catalog.fines().band_for(company_type, employees) else {
        return 0.0;
    };
    let summary = severity_summary(catalog, answers, company_type);
    summary
        .counts
        .iter()
        .map(|(severity, count)| f64::from(*count) * band.amount(*severity))
        .sum()
}

pub fn compute(
    catalog: &Catalog,
    answers: &AnswerSet,
    employees: u32,
    company_type: CompanyType,
    previous_total: f64,
) -> RiskExposure {
    let total = total_exposure(catalog, answers, employees, company_type);
    RiskExposure {
        total,
        last_delta: total - previous_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use crate::models::Answer;

    fn answers(pairs: &[(&str, Answer)]) -> AnswerSet {
        let mut set = AnswerSet::new();
        for (id, a) in pairs {
            set.record(*id, *a);
        }
        set
    }

    #[test]
    fn no_answers_means_no_exposure() {
        let catalog = fixtures::small();
        let r = compute(&catalog, &AnswerSet::new(), 3, CompanyType::Micro, 0.0);
        assert_eq!(r.total, 0.0);
        assert_eq!(r.last_delta, 0.0);
    }

    #[test]
    fn sums_unit_fines_of_every_no_answer() {
        let catalog = fixtures::small();
        let set = answers(&[("a", Answer::No), ("b", Answer::No), ("c", Answer::Si)]);
        // micro, 3 workers: leve 100 + grave 300
        assert_eq!(total_exposure(&catalog, &set, 3, CompanyType::Micro), 400.0);
        // micro, 8 workers lands in the open band
        assert_eq!(total_exposure(&catalog, &set, 8, CompanyType::Micro), 800.0);
        assert_eq!(
            total_exposure(&catalog, &set, 8, CompanyType::NoMype),
            6000.0
        );
    }

    #[test]
    fn total_is_independent_of_answer_order() {
        let catalog = fixtures::small();
        let forward = answers(&[
            ("a", Answer::No),
            ("b", Answer::Si),
            ("c", Answer::No),
            ("e", Answer::No),
        ]);
        let backward = answers(&[
            ("e", Answer::No),
            ("c", Answer::No),
            ("b", Answer::Si),
            ("a", Answer::No),
        ]);
        assert_eq!(
            total_exposure(&catalog, &forward, 4, CompanyType::Pequena),
            total_exposure(&catalog, &backward, 4, CompanyType::Pequena)
        );
    }

    #[test]
    fn adding_an_infraction_never_lowers_the_total() {
        let catalog = fixtures::small();
        let mut set = AnswerSet::new();
        let mut last = 0.0;
        for id in ["a", "b", "c", "d", "e"] {
            set.record(id, Answer::No);
            let now = total_exposure(&catalog, &set, 12, CompanyType::NoMype);
            assert!(now >= last, "{} dropped the total: {} < {}", id, now, last);
            last = now;
        }
    }

    #[test]
    fn overwriting_an_answer_does_not_double_count() {
        let catalog = fixtures::small();
        let mut once = AnswerSet::new();
        once.record("b", Answer::No);
        let mut twice = once.clone();
        twice.record("b", Answer::No);
        assert_eq!(
            total_exposure(&catalog, &once, 3, CompanyType::Micro),
            total_exposure(&catalog, &twice, 3, CompanyType::Micro)
        );
    }

    #[test]
    fn unknown_ids_and_missing_bands_contribute_zero() {
        let catalog = fixtures::small();
        let set = answers(&[("ghost", Answer::No)]);
        assert_eq!(total_exposure(&catalog, &set, 3, CompanyType::Micro), 0.0);

        let set = answers(&[("a", Answer::No)]);
        assert_eq!(total_exposure(&catalog, &set, 0, CompanyType::Micro), 0.0);

        // single-phase fixture has no general table at all
        let sparse = fixtures::single_phase();
        let set = answers(&[("x", Answer::No)]);
        assert_eq!(total_exposure(&sparse, &set, 3, CompanyType::NoMype), 0.0);
    }

    #[test]
    fn mype_exempt_questions_are_ignored_for_mype() {
        let catalog = fixtures::small();
        let set = answers(&[("d", Answer::No)]);
        assert_eq!(total_exposure(&catalog, &set, 3, CompanyType::Micro), 0.0);
        assert_eq!(total_exposure(&catalog, &set, 3, CompanyType::NoMype), 5000.0);
    }

    #[test]
    fn delta_is_measured_against_previous_total() {
        let catalog = fixtures::small();
        let set = answers(&[("a", Answer::No), ("c", Answer::No)]);
        let r = compute(&catalog, &set, 2, CompanyType::Micro, 100.0);
        assert_eq!(r.total, 1100.0);
        assert_eq!(r.last_delta, 1000.0);
        assert!(r.is_increasing());
    }

    #[test]
    fn summary_reports_max_severity() {
        let catalog = fixtures::small();
        let set = answers(&[("a", Answer::No), ("b", Answer::No), ("e", Answer::No)]);
        let summary = severity_summary(&catalog, &set, CompanyType::NoMype);
        assert_eq!(summary.count(Severity::Leve), 2);
        assert_eq!(summary.count(Severity::Grave), 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.max_severity(), Some(Severity::Grave));
        assert_eq!(
            severity_summary(&catalog, &AnswerSet::new(), CompanyType::NoMype).max_severity(),
            None
        );
    }
}
