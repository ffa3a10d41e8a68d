// Input validation utilities
// Intake form checks: required fields, corporate email, worker count, company type

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use crate::models::CompanyData;

const EMAIL_PATTERN: &str = r"^[^'\s@]+@[^\s@]+\.[^\s@]+$";

/// Free mail providers rejected on the intake form.
pub const PUBLIC_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "outlook.com",
    "hotmail.com",
    "yahoo.com",
    "live.com",
    "icloud.com",
    "aol.com",
    "protonmail.com",
    "zoho.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntakeField {
    Nombre,
    Email,
    Telefono,
    Empresa,
    Cargo,
    NumeroTrabajadores,
    TipoEmpresa,
}

impl IntakeField {
    pub const ALL: [IntakeField; 7] = [
        IntakeField::Nombre,
        IntakeField::Email,
        IntakeField::Telefono,
        IntakeField::Empresa,
        IntakeField::Cargo,
        IntakeField::NumeroTrabajadores,
        IntakeField::TipoEmpresa,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            IntakeField::Nombre => "Nombre completo",
            IntakeField::Email => "Correo corporativo",
            IntakeField::Telefono => "Teléfono",
            IntakeField::Empresa => "Empresa",
            IntakeField::Cargo => "Cargo",
            IntakeField::NumeroTrabajadores => "Número de trabajadores",
            IntakeField::TipoEmpresa => "Tipo de empresa",
        }
    }
}

/// Field-scoped validation messages. Empty means the form is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<IntakeField, String>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: IntakeField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn insert(&mut self, field: IntakeField, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    /// Editing a field clears its error immediately.
    pub fn clear_field(&mut self, field: IntakeField) {
        self.0.remove(&field);
    }

    pub fn first(&self) -> Option<(IntakeField, &str)> {
        self.0.iter().next().map(|(f, m)| (*f, m.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (IntakeField, &str)> {
        self.0.iter().map(|(f, m)| (*f, m.as_str()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, msg)| format!("{}: {}", field.label(), msg))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Syntactic email check plus public-provider deny list.
pub fn is_corporate_email(email: &str) -> bool {
    let email = email.trim();
    let Ok(re) = Regex::new(EMAIL_PATTERN) else {
        return false;
    };
    if !re.is_match(email) {
        return false;
    }
    let domain = email
        .rsplit_once('@')
        .map(|(_, d)| d.to_ascii_lowercase())
        .unwrap_or_default();
    !PUBLIC_EMAIL_DOMAINS.contains(&domain.as_str())
}

/// Validate the intake form. All violations are reported at once.
pub fn validate_company_data(data: &CompanyData) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if data.nombre.trim().is_empty() {
        errors.insert(IntakeField::Nombre, "El nombre es requerido");
    }

    if data.email.trim().is_empty() {
        errors.insert(IntakeField::Email, "El correo es requerido");
    } else if !is_corporate_email(&data.email) {
        errors.insert(
            IntakeField::Email,
            "Por favor, ingresa un correo corporativo válido",
        );
    }

    if data.telefono.trim().is_empty() {
        errors.insert(IntakeField::Telefono, "El teléfono es requerido");
    }
    if data.empresa.trim().is_empty() {
        errors.insert(IntakeField::Empresa, "El nombre de la empresa es requerido");
    }
    if data.cargo.trim().is_empty() {
        errors.insert(IntakeField::Cargo, "El cargo es requerido");
    }
    if data.numero_trabajadores == 0 {
        errors.insert(
            IntakeField::NumeroTrabajadores,
            "Debe ingresar un número válido de trabajadores",
        );
    }
    if !data.tipo_empresa.is_set() {
        errors.insert(IntakeField::TipoEmpresa, "Debe seleccionar el tipo de empresa");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse the worker-count text box. Anything that is not a positive integer is zero.
pub fn parse_worker_count(input: &str) -> u32 {
    input.trim().parse::<u32>().unwrap_or(0)
}
