pub mod answers;
pub mod company;
pub mod requests;

pub use answers::{Answer, AnswerSet, Choice};
pub use company::{CompanyData, CompanyProfile, CompanyType};
pub use requests::DiagnosticoRequest;
