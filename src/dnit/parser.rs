//! Parsing of the data bot's `/dnit` replies.
//!
//! The bot answers with a markdown-decorated block of `KEY ➾ VALUE` lines
//! (older layouts use `-` or `=` as the separator). Everything here works on
//! a cleaned copy of the text with the decoration stripped.
//!
//! Regex patterns are compile-time validated via the `lazy_regex!` macro.

#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use serde::{Deserialize, Serialize};

/// Match one `KEY ➾ VALUE` line; keys are upper-case Spanish words, with
/// room for emoji or bullet decoration before the key
static RE_FIELD_LINE: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?m)(?:^|[^A-ZÁÉÍÓÚÑ])\s*([A-ZÁÉÍÓÚÑ][A-ZÁÉÍÓÚÑ ]*?)\s*[➾=\-]\s*(.+)$");

/// Match the delay announced by a queue/wait notice
static RE_WAIT_SECONDS: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(\d+)\s*segundos?");

/// Report markers the bot stamps on final answers
const REPORT_MARKERS: &[&str] = &["RENIEC ONLINE", "OLIMPO_BOT"];

/// Structured DNI data extracted from a bot reply.
///
/// Field names serialize to the exact upper-case keys the bot uses, and
/// absent fields are omitted so callers can distinguish "not returned"
/// from "empty".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DniRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dni: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombres: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apellidos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genero: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_nacimiento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edad: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departamento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provincia: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distrito: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nivel_educativo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estado_civil: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estatura: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_inscripcion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_emision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_caducidad: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donante_organos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub madre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restriccion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direccion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ubigeo_reniec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ubigeo_ine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ubigeo_sunat: Option<String>,
}

impl DniRecord {
    /// `true` when no field at all was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Strips the markdown decoration the bot wraps values in.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.replace("**", "").replace(['`', '*'], "")
}

/// Extracts a [`DniRecord`] from a (raw) bot reply.
#[must_use]
pub fn parse_record(text: &str) -> DniRecord {
    let clean = clean_text(text);
    let mut record = DniRecord::default();

    for caps in RE_FIELD_LINE.captures_iter(&clean) {
        let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let value = value.as_str().trim();
        if value.is_empty() {
            continue;
        }
        let value = Some(value.to_string());

        match key.as_str() {
            "DNI" => record.dni = value,
            "NOMBRES" => record.nombres = value,
            "APELLIDOS" => record.apellidos = value,
            "GENERO" => record.genero = value,
            "FECHA NACIMIENTO" => record.fecha_nacimiento = value,
            "EDAD" => record.edad = value,
            "DEPARTAMENTO" => record.departamento = value,
            "PROVINCIA" => record.provincia = value,
            "DISTRITO" => record.distrito = value,
            "NIVEL EDUCATIVO" => record.nivel_educativo = value,
            "ESTADO CIVIL" => record.estado_civil = value,
            "ESTATURA" => record.estatura = value,
            "FECHA INSCRIPCION" => record.fecha_inscripcion = value,
            "FECHA EMISION" => record.fecha_emision = value,
            "FECHA CADUCIDAD" => record.fecha_caducidad = value,
            "DONANTE ORGANOS" => record.donante_organos = value,
            "PADRE" => record.padre = value,
            "MADRE" => record.madre = value,
            "RESTRICCION" => record.restriccion = value,
            "DIRECCION" => record.direccion = value,
            "UBIGEO RENIEC" => record.ubigeo_reniec = value,
            "UBIGEO INE" => record.ubigeo_ine = value,
            "UBIGEO SUNAT" => record.ubigeo_sunat = value,
            _ => {}
        }
    }

    record
}

/// Is this message part of the conversation about `dni`?
///
/// Matches either our own command echo or a reply carrying the DNI header.
#[must_use]
pub fn references_query(text: &str, dni: &str) -> bool {
    let clean = clean_text(text);
    clean.contains(&format!("/dnit {dni}")) || clean.contains(&format!("DNI ➾ {dni}"))
}

/// Is this message the final report for `dni`?
#[must_use]
pub fn is_report(text: &str, dni: &str) -> bool {
    let clean = clean_text(text);
    clean.contains(&format!("DNI ➾ {dni}")) && REPORT_MARKERS.iter().any(|m| clean.contains(m))
}

/// Extracts the delay from a "please wait N seconds" notice, if any.
#[must_use]
pub fn wait_notice_secs(text: &str) -> Option<u64> {
    let lower = text.to_lowercase();
    if !(lower.contains("espera") && lower.contains("segundos")) {
        return None;
    }
    RE_WAIT_SECONDS
        .captures(&lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
