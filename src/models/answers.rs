// Questionnaire answer models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recorded answer for a compliance question. Only two values travel on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Answer {
    #[serde(rename = "si")]
    Si,
    #[serde(rename = "no")]
    No,
}

impl Answer {
    pub fn is_infraction(&self) -> bool {
        matches!(self, Answer::No)
    }
}

/// What the visitor picked on screen. "No sé" is stored as an infraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Yes,
    No,
    Unsure,
}

impl Choice {
    pub fn as_answer(&self) -> Answer {
        match self {
            Choice::Yes => Answer::Si,
            Choice::No | Choice::Unsure => Answer::No,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Choice::Yes => "Sí",
            Choice::No => "No",
            Choice::Unsure => "No sé",
        }
    }
}

/// Question id -> answer. Keys are unique; re-answering overwrites.
///
/// A `BTreeMap` keeps iteration independent of the order answers were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet(BTreeMap<String, Answer>);

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, question_id: impl Into<String>, answer: Answer) {
        self.0.insert(question_id.into(), answer);
    }

    pub fn get(&self, question_id: &str) -> Option<Answer> {
        self.0.get(question_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Answer)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn has_infractions(&self) -> bool {
        self.0.values().any(Answer::is_infraction)
    }

    pub fn infractions_among<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> usize {
        ids.into_iter()
            .filter(|id| self.get(id).is_some_and(|a| a.is_infraction()))
            .count()
    }
}

impl FromIterator<(String, Answer)> for AnswerSet {
    fn from_iter<I: IntoIterator<Item = (String, Answer)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
