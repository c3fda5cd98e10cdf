//! Inbound data: form-builder webhook submissions and RAT spreadsheet imports.

use crate::errors::AppError;
use crate::normalize::{clean_list, clean_opt, clean_text, fold, normalize_rut};
use crate::rat::{self, RatPayload, RatRecord, RatSource};
use crate::rights::RightsRequest;
use calamine::{Data, DataType, Range, Reader};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Cursor;

const DEFAULT_ORIGIN: &str = "webhook";

// ============================================================================
// Webhook
// ============================================================================

/// Form fields, with the `rawRequest` JSON blob as a fallback source.
struct WebhookFields<'a> {
    form: &'a HashMap<String, String>,
    raw: Map<String, Value>,
}

impl<'a> WebhookFields<'a> {
    fn new(form: &'a HashMap<String, String>) -> Self {
        let raw = match form.get("rawRequest").map(|s| s.trim()) {
            Some(blob) if !blob.is_empty() => match serde_json::from_str::<Value>(blob) {
                Ok(Value::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(e) => {
                    tracing::debug!(error = %e, "rawRequest is not JSON, ignoring it");
                    Map::new()
                }
            },
            _ => Map::new(),
        };
        Self { form, raw }
    }

    fn form_text(&self, key: &str) -> Option<String> {
        clean_opt(self.form.get(key).map(String::as_str))
    }

    fn raw_text(&self, key: &str) -> Option<String> {
        match self.raw.get(key)? {
            Value::String(s) => clean_opt(Some(s.as_str())),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Form value, else the `rawRequest` value.
    fn text(&self, key: &str) -> Option<String> {
        self.form_text(key).or_else(|| self.raw_text(key))
    }

    fn name(&self) -> Option<String> {
        if let Some(full) = self.form_text("nombre") {
            return Some(full);
        }
        let split = join_name(
            self.form_text("nombre[first]"),
            self.form_text("nombre[last]"),
        );
        if split.is_some() {
            return split;
        }
        match self.raw.get("nombre")? {
            Value::String(s) => clean_opt(Some(s.as_str())),
            Value::Object(parts) => join_name(
                parts.get("first").and_then(Value::as_str).map(clean_text),
                parts.get("last").and_then(Value::as_str).map(clean_text),
            ),
            _ => None,
        }
    }

    fn attachments(&self) -> Vec<String> {
        for key in ["archivos", "foto"] {
            // raw value: the list may be newline separated
            if let Some(raw) = self.form.get(key).filter(|v| !v.trim().is_empty()) {
                return parse_attachment_list(raw);
            }
            match self.raw.get(key) {
                Some(Value::Array(items)) => {
                    return clean_list(items.iter().filter_map(Value::as_str));
                }
                Some(Value::String(s)) if !s.trim().is_empty() => {
                    return parse_attachment_list(s);
                }
                _ => {}
            }
        }
        Vec::new()
    }
}

fn join_name(first: Option<String>, last: Option<String>) -> Option<String> {
    let joined = clean_text(&format!(
        "{} {}",
        first.unwrap_or_default(),
        last.unwrap_or_default()
    ));
    (!joined.is_empty()).then_some(joined)
}

/// Attachment URLs from a JSON array or a comma/newline separated list.
pub fn parse_attachment_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return clean_list(items);
        }
    }
    clean_list(trimmed.split(|c: char| c == ',' || c == '\n'))
}

/// English canonical name for a request type given in Spanish or English.
pub fn canonical_request_type(raw: &str) -> String {
    match fold(raw).as_str() {
        "acceso" | "access" => "access".to_string(),
        "rectificacion" | "rectification" => "rectification".to_string(),
        "cancelacion" | "supresion" | "cancellation" => "cancellation".to_string(),
        "oposicion" | "opposition" => "opposition".to_string(),
        _ => clean_text(raw),
    }
}

fn canonical_status(raw: &str) -> String {
    match fold(raw).as_str() {
        "abierta" | "abierto" | "pendiente" | "open" => "open".to_string(),
        "cerrada" | "cerrado" | "respondida" | "closed" => "closed".to_string(),
        "prorrogada" | "extendida" | "extended" => "extended".to_string(),
        _ => clean_text(raw),
    }
}

/// Digits, separators and a trailing K; anything else is not a RUT at all.
fn looks_like_rut(raw: &str) -> bool {
    raw.chars().any(|c| c.is_ascii_digit())
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | ' ' | 'k' | 'K'))
}

/// Turn a webhook submission into a new rights request.
pub fn normalize_webhook(
    form: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> Result<RightsRequest, AppError> {
    let fields = WebhookFields::new(form);

    let mut errors = Vec::new();
    let subject_name = fields.name();
    if subject_name.is_none() {
        errors.push("El nombre del solicitante es obligatorio".to_string());
    }
    let subject_id = match fields.text("rut") {
        Some(raw) => match normalize_rut(&raw) {
            Some(rut) => Some(rut),
            None if !looks_like_rut(&raw) => {
                errors.push("El RUT del solicitante no tiene un formato válido".to_string());
                None
            }
            None => {
                tracing::warn!(rut = %raw, "webhook RUT failed check digit, storing as sent");
                Some(raw)
            }
        },
        None => {
            errors.push("El RUT del solicitante es obligatorio".to_string());
            None
        }
    };
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    Ok(RightsRequest {
        id: uuid::Uuid::new_v4().to_string(),
        subject_name: subject_name.unwrap_or_default(),
        subject_id: subject_id.unwrap_or_default(),
        email: fields.text("email").map(|e| e.to_lowercase()),
        request_type: fields
            .text("tipo_solicitud")
            .map(|t| canonical_request_type(&t)),
        details: fields.text("detalle"),
        attachments: fields.attachments(),
        status: fields.text("estado").map(|s| canonical_status(&s)),
        system_status: None,
        notes: None,
        origin: fields
            .text("origen")
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string()),
        ingested_at: now.timestamp(),
        updated_at: None,
    })
}

// ============================================================================
// Spreadsheet import
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RatColumn {
    ActivityName,
    Purpose,
    LegalBasis,
    DataCategories,
    SubjectCategories,
    Recipients,
    RetentionPeriod,
    InternationalTransfer,
    DestinationCountries,
    SecurityMeasures,
    Owner,
}

fn map_header(header: &str) -> Option<RatColumn> {
    let key: String = fold(header)
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();
    let column = match key.as_str() {
        "actividad" | "nombre_actividad" | "actividad_de_tratamiento" | "activity_name" => {
            RatColumn::ActivityName
        }
        "finalidad" | "proposito" | "purpose" => RatColumn::Purpose,
        "base_legal" | "base_de_licitud" | "base_licitud" | "legal_basis" => RatColumn::LegalBasis,
        "categorias_datos" | "categorias_de_datos" | "datos" | "data_categories" => {
            RatColumn::DataCategories
        }
        "categorias_titulares" | "categorias_de_titulares" | "titulares" | "subject_categories" => {
            RatColumn::SubjectCategories
        }
        "destinatarios" | "recipients" => RatColumn::Recipients,
        "plazo_conservacion" | "plazo_de_conservacion" | "conservacion" | "retention_period" => {
            RatColumn::RetentionPeriod
        }
        "transferencia_internacional" | "transferencia" | "international_transfer" => {
            RatColumn::InternationalTransfer
        }
        "paises_destino" | "paises_de_destino" | "paises" | "destination_countries" => {
            RatColumn::DestinationCountries
        }
        "medidas_seguridad" | "medidas_de_seguridad" | "security_measures" => {
            RatColumn::SecurityMeasures
        }
        "responsable" | "area_responsable" | "area" | "owner" => RatColumn::Owner,
        _ => return None,
    };
    Some(column)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => clean_text(s),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_date()
            .map(|d| d.to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => clean_text(&other.to_string()),
    }
}

fn split_cell(text: &str) -> Vec<String> {
    clean_list(text.split(|c: char| c == ',' || c == ';' || c == '\n'))
}

fn truthy(text: &str) -> bool {
    matches!(
        fold(text).as_str(),
        "si" | "s" | "x" | "true" | "1" | "yes"
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based sheet row
    pub row: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub records: Vec<RatRecord>,
    pub errors: Vec<RowError>,
    pub skipped_empty: usize,
}

/// Parse the first worksheet of an uploaded workbook (xlsx, xls, ods).
pub fn import_rat_workbook(bytes: Vec<u8>, now: DateTime<Utc>) -> Result<ImportReport, AppError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| AppError::Spreadsheet(format!("No se pudo leer el archivo: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Spreadsheet("El archivo no contiene hojas".to_string()))?
        .map_err(|e| AppError::Spreadsheet(format!("No se pudo leer la primera hoja: {e}")))?;

    import_rat_range(&range, now)
}

pub fn import_rat_range(range: &Range<Data>, now: DateTime<Utc>) -> Result<ImportReport, AppError> {
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range.rows();

    let header = rows
        .next()
        .ok_or_else(|| AppError::Spreadsheet("La hoja está vacía".to_string()))?;
    let columns: Vec<Option<RatColumn>> = header.iter().map(|c| map_header(&cell_text(c))).collect();
    if !columns.contains(&Some(RatColumn::ActivityName)) {
        return Err(AppError::Spreadsheet(
            "No se encontró la columna 'actividad' en la primera fila".to_string(),
        ));
    }

    let mut report = ImportReport::default();
    for (offset, row) in rows.enumerate() {
        // header is sheet row first_row + 1; data starts one below it
        let row_number = first_row + offset + 2;
        let texts: Vec<String> = row.iter().map(cell_text).collect();
        if texts.iter().all(String::is_empty) {
            report.skipped_empty += 1;
            continue;
        }

        let payload = row_payload(&columns, &texts);
        match rat::prepare(&payload, RatSource::Spreadsheet, now) {
            Ok(record) => report.records.push(record),
            Err(AppError::Validation(errors)) => report.errors.push(RowError {
                row: row_number,
                errors,
            }),
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

fn row_payload(columns: &[Option<RatColumn>], texts: &[String]) -> RatPayload {
    let mut payload = RatPayload::default();
    for (column, text) in columns.iter().zip(texts) {
        let Some(column) = column else { continue };
        if text.is_empty() {
            continue;
        }
        match column {
            RatColumn::ActivityName => payload.activity_name = Some(text.clone()),
            RatColumn::Purpose => payload.purpose = Some(text.clone()),
            RatColumn::LegalBasis => payload.legal_basis = Some(text.clone()),
            RatColumn::DataCategories => payload.data_categories = split_cell(text),
            RatColumn::SubjectCategories => payload.subject_categories = split_cell(text),
            RatColumn::Recipients => payload.recipients = split_cell(text),
            RatColumn::RetentionPeriod => payload.retention_period = Some(text.clone()),
            RatColumn::InternationalTransfer => payload.international_transfer = truthy(text),
            RatColumn::DestinationCountries => payload.destination_countries = split_cell(text),
            RatColumn::SecurityMeasures => payload.security_measures = Some(text.clone()),
            RatColumn::Owner => payload.owner = Some(text.clone()),
        }
    }
    payload
}
