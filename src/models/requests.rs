// API request models
// Body of `POST /api/diagnostico`

use serde::{Deserialize, Serialize};

use super::answers::AnswerSet;
use super::company::{CompanyData, CompanyType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticoRequest {
    pub nombre: String,
    pub email: String,
    pub telefono: String,
    pub empresa: String,
    pub cargo: String,
    pub numero_trabajadores: u32,
    pub tipo_empresa: CompanyType,
    pub respuestas: AnswerSet,
}

impl DiagnosticoRequest {
    pub fn new(company: &CompanyData, answers: &AnswerSet) -> Self {
        Self {
            nombre: company.nombre.clone(),
            email: company.email.clone(),
            telefono: company.telefono.clone(),
            empresa: company.empresa.clone(),
            cargo: company.cargo.clone(),
            numero_trabajadores: company.numero_trabajadores,
            tipo_empresa: company.tipo_empresa,
            respuestas: answers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::answers::Answer;

    #[test]
    fn payload_uses_endpoint_field_names() {
        let company = CompanyData {
            nombre: "Ana Torres".to_string(),
            email: "ana@acme.pe".to_string(),
            telefono: "999888777".to_string(),
            empresa: "Acme SAC".to_string(),
            cargo: "Gerente".to_string(),
            numero_trabajadores: 12,
            tipo_empresa: CompanyType::Pequena,
        };
        let mut answers = AnswerSet::new();
        answers.record("p1", Answer::No);

        let body = serde_json::to_value(DiagnosticoRequest::new(&company, &answers)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "nombre": "Ana Torres",
                "email": "ana@acme.pe",
                "telefono": "999888777",
                "empresa": "Acme SAC",
                "cargo": "Gerente",
                "numero_trabajadores": 12,
                "tipo_empresa": "pequena",
                "respuestas": { "p1": "no" }
            })
        );
    }
}
