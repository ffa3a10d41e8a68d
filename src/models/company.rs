// Company intake models
// Wire names follow the diagnosis endpoint contract (`tipo_empresa`, `numero_trabajadores`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompanyType {
    #[serde(rename = "micro")]
    Micro,
    #[serde(rename = "pequena")]
    Pequena,
    #[serde(rename = "no_mype")]
    NoMype,
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl CompanyType {
    pub fn as_id(&self) -> &'static str {
        match self {
            CompanyType::Micro => "micro",
            CompanyType::Pequena => "pequena",
            CompanyType::NoMype => "no_mype",
            CompanyType::Unset => "",
        }
    }

    /// Human label used on the confirmation page and in the contact message.
    pub fn label(&self) -> &'static str {
        match self {
            CompanyType::Micro => "Microempresa",
            CompanyType::Pequena => "Pequeña Empresa",
            CompanyType::NoMype => "No MYPE",
            CompanyType::Unset => "",
        }
    }

    /// Micro and small enterprises share the MYPE regime (reduced obligations).
    pub fn is_mype(&self) -> bool {
        matches!(self, CompanyType::Micro | CompanyType::Pequena)
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, CompanyType::Unset)
    }

    /// Selector order used by the intake form.
    pub fn next(&self) -> Self {
        match self {
            CompanyType::Unset => CompanyType::Micro,
            CompanyType::Micro => CompanyType::Pequena,
            CompanyType::Pequena => CompanyType::NoMype,
            CompanyType::NoMype => CompanyType::Micro,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            CompanyType::Unset => CompanyType::NoMype,
            CompanyType::Micro => CompanyType::NoMype,
            CompanyType::Pequena => CompanyType::Micro,
            CompanyType::NoMype => CompanyType::Pequena,
        }
    }
}

/// Contact and company data captured on the intake step.
///
/// Owned by the step orchestrator; the questionnaire engine only reads the
/// employee count and company type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyData {
    pub nombre: String,
    pub email: String,
    pub telefono: String,
    pub empresa: String,
    pub cargo: String,
    #[serde(rename = "numero_trabajadores")]
    pub numero_trabajadores: u32,
    #[serde(rename = "tipo_empresa")]
    pub tipo_empresa: CompanyType,
}

impl CompanyData {
    pub fn profile(&self) -> CompanyProfile {
        CompanyProfile {
            employees: self.numero_trabajadores,
            company_type: self.tipo_empresa,
        }
    }
}

/// The part of the company record that drives question filtering and fines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanyProfile {
    pub employees: u32,
    pub company_type: CompanyType,
}
