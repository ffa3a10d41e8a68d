// Contact deep-link
// Builds the wa.me link shown on the confirmation page

use url::form_urlencoded::byte_serialize;

use crate::models::CompanyType;

pub const DEFAULT_WHATSAPP_NUMBER: &str = "51981577120";

/// What the dossier message needs to know about the lead.
#[derive(Debug, Clone, PartialEq)]
pub struct DossierSummary<'a> {
    pub nombre: &'a str,
    pub cargo: &'a str,
    pub empresa: &'a str,
    pub numero_trabajadores: u32,
    pub tipo_empresa: CompanyType,
    pub total_fine: f64,
    pub has_infractions: bool,
}

/// `S/ 12,345`: rounded to whole soles with comma thousands separators.
pub fn format_soles(amount: f64) -> String {
    let rounded = amount.max(0.0).round() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("S/ {}", grouped)
}

pub fn dossier_message(summary: &DossierSummary<'_>) -> String {
    format!(
        "Deseo priorizar mi protocolo de *Blindaje Patrimonial de SST*.\n\n\
         *DATOS DEL DICTAMEN*\n\
         • *Contacto:* {}\n\
         • *Cargo:* {}\n\
         • *Empresa:* {}\n\
         • *Trabajadores:* {}\n\
         • *Tipo:* {}\n\
         • *Multa Potencial:* {}",
        summary.nombre,
        summary.cargo,
        summary.empresa,
        summary.numero_trabajadores,
        summary.tipo_empresa.label(),
        format_soles(summary.total_fine)
    )
}

/// Bare link when the run was clean, prefilled dossier otherwise.
pub fn whatsapp_link(number: &str, summary: &DossierSummary<'_>) -> String {
    let number: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    let base = format!("https://wa.me/{}", number);
    if !summary.has_infractions {
        return base;
    }
    let text: String = byte_serialize(dossier_message(summary).as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("{}?text={}", base, text)
}
