pub mod diagnostico;

pub use diagnostico::{DiagnosisSubmitter, HttpSubmitter, SubmissionError};
