//! Phase/question catalog.
//!
//! The catalog is a read-only configuration resource: phases, question copy,
//! severities, MYPE exemptions and the tiered fine tables. The engine and the
//! risk calculator are parameterized over it (usually as `Arc<Catalog>`), so
//! tests can inject small fixtures instead of the shipped data set.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::models::CompanyType;

const DEFAULT_CATALOG: &str = include_str!("default_catalog.toml");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid catalog: {0}")]
    Invalid(String),
    #[error("fine table '{table}' has an open band before band {position}; only the last band may omit up_to")]
    OpenBandNotLast { table: String, position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Leve,
    Grave,
    MuyGrave,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Leve => "Leve",
            Severity::Grave => "Grave",
            Severity::MuyGrave => "Muy Grave",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionDef {
    pub text: String,
    #[serde(default)]
    pub tooltip: Option<String>,
    pub severity: Severity,
    /// Not applicable to micro and small enterprises.
    #[serde(default)]
    pub mype_exempt: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct PhaseDef {
    name: String,
    #[serde(default)]
    description: String,
    points: u32,
    #[serde(default)]
    button_text: String,
    #[serde(default)]
    message_clean: String,
    #[serde(default)]
    message_infractions: String,
    questions: Vec<String>,
}

/// Unit fines for one employee band. `up_to` is inclusive; `None` is the open last band.
#[derive(Debug, Clone, Deserialize)]
pub struct FineBand {
    #[serde(default)]
    pub up_to: Option<u32>,
    pub leve: f64,
    pub grave: f64,
    pub muy_grave: f64,
}

impl FineBand {
    pub fn amount(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Leve => self.leve,
            Severity::Grave => self.grave,
            Severity::MuyGrave => self.muy_grave,
        }
    }

    fn covers(&self, employees: u32) -> bool {
        self.up_to.map_or(true, |max| employees <= max)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FineTables {
    #[serde(default)]
    pub micro: Vec<FineBand>,
    #[serde(default)]
    pub pequena: Vec<FineBand>,
    #[serde(default)]
    pub general: Vec<FineBand>,
}

impl FineTables {
    /// Band for a company. Unset company types fall back to the general regime.
    pub fn band_for(&self, company_type: CompanyType, employees: u32) -> Option<&FineBand> {
        if employees == 0 {
            return None;
        }
        let table = match company_type {
            CompanyType::Micro => &self.micro,
            CompanyType::Pequena => &self.pequena,
            CompanyType::NoMype | CompanyType::Unset => &self.general,
        };
        table.iter().find(|band| band.covers(employees))
    }
}

/// A phase as seen by one company type: filtered, renumbered, with cumulative points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub id: usize,
    pub name: String,
    pub description: String,
    pub question_ids: Vec<String>,
    pub points: u32,
    pub total_points: u32,
    pub button_text: String,
    pub message_clean: String,
    pub message_infractions: String,
}

impl Phase {
    pub fn message(&self, has_infractions: bool) -> &str {
        if has_infractions {
            &self.message_infractions
        } else {
            &self.message_clean
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    phases: Vec<PhaseDef>,
    #[serde(default)]
    questions: HashMap<String, QuestionDef>,
    #[serde(default)]
    fines: FineTables,
    #[serde(default)]
    final_button_with_infractions: String,
    #[serde(default)]
    final_button_clean: String,
}

impl Catalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(DEFAULT_CATALOG)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = toml::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.phases.is_empty() {
            return Err(CatalogError::Invalid("no phases defined".to_string()));
        }
        for (i, phase) in self.phases.iter().enumerate() {
            if phase.questions.is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "phase {} ('{}') has no questions",
                    i + 1,
                    phase.name
                )));
            }
            for id in &phase.questions {
                if !self.questions.contains_key(id) {
                    return Err(CatalogError::Invalid(format!(
                        "phase {} references unknown question '{}'",
                        i + 1,
                        id
                    )));
                }
            }
        }
        for (name, table) in [
            ("micro", &self.fines.micro),
            ("pequena", &self.fines.pequena),
            ("general", &self.fines.general),
        ] {
            if let Some(open) = table.iter().position(|b| b.up_to.is_none()) {
                if open + 1 < table.len() {
                    return Err(CatalogError::OpenBandNotLast {
                        table: name.to_string(),
                        position: open + 2,
                    });
                }
            }
            let bounds: Vec<u32> = table.iter().filter_map(|b| b.up_to).collect();
            if bounds.windows(2).any(|w| w[0] >= w[1]) {
                return Err(CatalogError::Invalid(format!(
                    "fine table '{}' bands are not in ascending order",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn question(&self, id: &str) -> Option<&QuestionDef> {
        self.questions.get(id)
    }

    pub fn fines(&self) -> &FineTables {
        &self.fines
    }

    /// Whether a question counts for a company type (MYPE companies skip exempt ones).
    pub fn applies_to(&self, question_id: &str, company_type: CompanyType) -> bool {
        match self.questions.get(question_id) {
            Some(q) => !(q.mype_exempt && company_type.is_mype()),
            None => false,
        }
    }

    /// Ordered phases for a company type. Empty phases are dropped and ids renumbered 1..=n.
    pub fn phases_for(&self, company_type: CompanyType) -> Vec<Phase> {
        let mut phases = Vec::new();
        let mut cumulative = 0u32;

        for def in &self.phases {
            let question_ids: Vec<String> = def
                .questions
                .iter()
                .filter(|id| self.applies_to(id, company_type))
                .cloned()
                .collect();
            if question_ids.is_empty() {
                continue;
            }
            cumulative += def.points;
            phases.push(Phase {
                id: phases.len() + 1,
                name: def.name.clone(),
                description: def.description.clone(),
                question_ids,
                points: def.points,
                total_points: cumulative,
                button_text: def.button_text.clone(),
                message_clean: def.message_clean.clone(),
                message_infractions: def.message_infractions.clone(),
            });
        }

        phases
    }

    /// Label of the last phase's continue button.
    pub fn final_button_text(&self, has_infractions: bool) -> &str {
        if has_infractions {
            &self.final_button_with_infractions
        } else {
            &self.final_button_clean
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_catalog_loads_three_phases() {
        let catalog = Catalog::builtin().expect("embedded catalog should parse");
        let phases = catalog.phases_for(CompanyType::NoMype);
        assert_eq!(phases.len(), 3);
        assert_eq!(phases[0].id, 1);
        assert_eq!(phases[2].id, 3);
        assert_eq!(phases[2].total_points, 500);
        for phase in &phases {
            for id in &phase.question_ids {
                assert!(catalog.question(id).is_some(), "missing question {}", id);
            }
        }
    }

    #[test]
    fn mype_companies_skip_exempt_questions() {
        let catalog = Catalog::builtin().unwrap();
        let general: usize = catalog
            .phases_for(CompanyType::NoMype)
            .iter()
            .map(|p| p.question_ids.len())
            .sum();
        let micro = catalog.phases_for(CompanyType::Micro);
        let micro_count: usize = micro.iter().map(|p| p.question_ids.len()).sum();
        assert_eq!(general - micro_count, 3);
        assert!(micro
            .iter()
            .all(|p| !p.question_ids.contains(&"auditoria_sgsst".to_string())));
    }

    #[test]
    fn empty_phases_are_dropped_and_renumbered() {
        let raw = fixtures::SMALL.replace(
            "[questions.a]\ntext = \"A?\"\nseverity = \"leve\"",
            "[questions.a]\ntext = \"A?\"\nseverity = \"leve\"\nmype_exempt = true",
        );
        let raw = raw.replace(
            "[questions.b]\ntext = \"B?\"\nseverity = \"grave\"",
            "[questions.b]\ntext = \"B?\"\nseverity = \"grave\"\nmype_exempt = true",
        );
        let catalog = Catalog::from_toml_str(&raw).unwrap();

        let phases = catalog.phases_for(CompanyType::Micro);
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].id, 1);
        assert_eq!(phases[0].name, "Operación");
        assert_eq!(phases[0].total_points, 200);
        assert_eq!(phases[0].question_ids, vec!["c", "e"]);

        assert_eq!(catalog.phases_for(CompanyType::NoMype).len(), 2);
    }

    #[test]
    fn cumulative_points_accumulate_in_order() {
        let phases = fixtures::small().phases_for(CompanyType::NoMype);
        assert_eq!(phases[0].total_points, 100);
        assert_eq!(phases[1].total_points, 300);
    }

    #[test]
    fn fine_bands_select_by_employee_count() {
        let catalog = Catalog::builtin().unwrap();
        let fines = catalog.fines();

        assert_eq!(fines.band_for(CompanyType::Micro, 1).unwrap().leve, 241.0);
        assert_eq!(fines.band_for(CompanyType::Micro, 9).unwrap().leve, 1070.0);
        assert_eq!(fines.band_for(CompanyType::Micro, 10).unwrap().leve, 1338.0);
        assert_eq!(fines.band_for(CompanyType::Micro, 250).unwrap().leve, 1338.0);

        assert_eq!(fines.band_for(CompanyType::Pequena, 5).unwrap().grave, 2354.0);
        assert_eq!(fines.band_for(CompanyType::Pequena, 6).unwrap().grave, 3049.0);
        assert_eq!(fines.band_for(CompanyType::Pequena, 100).unwrap().grave, 7704.0);

        assert_eq!(
            fines.band_for(CompanyType::NoMype, 901).unwrap().muy_grave,
            53500.0
        );
        assert_eq!(
            fines.band_for(CompanyType::Unset, 30).unwrap().muy_grave,
            10700.0
        );
        assert!(fines.band_for(CompanyType::Micro, 0).is_none());
    }

    #[test]
    fn phase_message_depends_on_infractions() {
        let phases = fixtures::small().phases_for(CompanyType::NoMype);
        assert_eq!(phases[0].message(false), "ok");
        assert_eq!(phases[0].message(true), "brechas");
    }

    #[test]
    fn unknown_question_reference_is_rejected() {
        let raw = r#"
[[phases]]
name = "X"
points = 10
questions = ["ghost"]
"#;
        let err = Catalog::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)), "got {:?}", err);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn unordered_fine_bands_are_rejected() {
        let raw = fixtures::SINGLE_PHASE.to_string()
            + r#"
[[fines.general]]
up_to = 50
leve = 1.0
grave = 1.0
muy_grave = 1.0

[[fines.general]]
up_to = 20
leve = 1.0
grave = 1.0
muy_grave = 1.0
"#;
        let err = Catalog::from_toml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("general"), "got {}", err);
    }

    #[test]
    fn open_band_must_be_last() {
        let raw = fixtures::SINGLE_PHASE.to_string()
            + r#"
[[fines.general]]
leve = 1.0
grave = 1.0
muy_grave = 1.0

[[fines.general]]
up_to = 50
leve = 999.0
grave = 999.0
muy_grave = 999.0
"#;
        let err = Catalog::from_toml_str(&raw).unwrap_err();
        assert!(
            matches!(
                &err,
                CatalogError::OpenBandNotLast { table, position: 2 } if table == "general"
            ),
            "got {:?}",
            err
        );

        let ordered = fixtures::SINGLE_PHASE.to_string()
            + r#"
[[fines.general]]
up_to = 50
leve = 999.0
grave = 999.0
muy_grave = 999.0

[[fines.general]]
leve = 1.0
grave = 1.0
muy_grave = 1.0
"#;
        let catalog = Catalog::from_toml_str(&ordered).unwrap();
        let band = catalog.fines().band_for(CompanyType::NoMype, 30).unwrap();
        assert_eq!(band.leve, 999.0);
        let band = catalog.fines().band_for(CompanyType::NoMype, 51).unwrap();
        assert_eq!(band.leve, 1.0);
    }

    #[test]
    fn loads_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(fixtures::SINGLE_PHASE.as_bytes()).unwrap();
        let catalog = Catalog::from_path(file.path()).unwrap();
        assert_eq!(catalog.phases_for(CompanyType::Micro).len(), 1);

        let missing = Catalog::from_path(Path::new("/definitely/not/here.toml"));
        assert!(matches!(missing, Err(CatalogError::Io { .. })));
    }
}
