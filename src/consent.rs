//! Consent rules: validation, preparation and lifecycle of consent records.
//!
//! Everything here is pure. Callers load records from the store, apply one of
//! these operations and persist the result.

use crate::errors::AppError;
use crate::normalize::{clean_list, clean_opt, clean_text, normalize_rut};
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound accepted for `retention_months` (100 years).
const MAX_RETENTION_MONTHS: i64 = 1200;
const DEFAULT_COLLECTION_METHOD: &str = "no especificado";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    Active,
    Revoked,
    Expired,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Active => "active",
            ConsentStatus::Revoked => "revoked",
            ConsentStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(ConsentStatus::Active),
            "revoked" => Some(ConsentStatus::Revoked),
            "expired" => Some(ConsentStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: String,
    pub timestamp: i64,
    pub status: ConsentStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: String,
    pub subject_name: String,
    pub subject_id: String,
    pub purpose: String,
    pub data_categories: Vec<String>,
    pub collection_method: String,
    pub granted_at: NaiveDate,
    pub retention_months: u32,
    pub expires_at: NaiveDate,
    pub international_transfer: bool,
    pub destination_countries: Vec<String>,
    pub notes: Option<String>,
    pub status: ConsentStatus,
    pub history: Vec<HistoryEntry>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Optimistic-concurrency counter, bumped by the store on every write
    pub version: i64,
}

impl ConsentRecord {
    /// Partition key in the record store.
    pub fn partition_key(&self) -> &str {
        &self.subject_id
    }

    fn push_history(&mut self, action: &str, note: Option<String>, now: i64) {
        self.history.push(HistoryEntry {
            action: action.to_string(),
            timestamp: now,
            status: self.status,
            note,
        });
        self.updated_at = now;
    }
}

/// Submission body for a new consent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsentPayload {
    pub subject_name: Option<String>,
    pub subject_id: Option<String>,
    pub purpose: Option<String>,
    #[serde(default)]
    pub data_categories: Vec<String>,
    pub collection_method: Option<String>,
    /// YYYY-MM-DD
    pub granted_at: Option<String>,
    pub retention_months: Option<i64>,
    /// YYYY-MM-DD; derived from `granted_at + retention_months` when absent
    pub expires_at: Option<String>,
    #[serde(default)]
    pub international_transfer: bool,
    #[serde(default)]
    pub destination_countries: Vec<String>,
    pub notes: Option<String>,
}

/// Editable fields of an existing consent. The subject ID and status are not editable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsentEdit {
    pub subject_name: Option<String>,
    pub purpose: Option<String>,
    pub data_categories: Option<Vec<String>>,
    pub collection_method: Option<String>,
    pub retention_months: Option<i64>,
    pub expires_at: Option<String>,
    pub international_transfer: Option<bool>,
    pub destination_countries: Option<Vec<String>>,
    pub notes: Option<String>,
    /// Version the client last read; a mismatch is rejected by the store
    pub version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// In-memory listing filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsentFilter {
    pub status: Option<String>,
    pub purpose: Option<String>,
    /// Case-insensitive substring of subject name or ID
    pub q: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsentMetrics {
    pub total: usize,
    pub active: usize,
    pub revoked: usize,
    pub expired: usize,
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

fn check_retention(months: i64, errors: &mut Vec<String>) {
    if months <= 0 || months > MAX_RETENTION_MONTHS {
        errors.push(format!(
            "El plazo de conservación debe estar entre 1 y {MAX_RETENTION_MONTHS} meses"
        ));
    }
}

/// Check a submission without side effects.
pub fn validate(payload: &ConsentPayload) -> Validation {
    let mut errors = Vec::new();

    if clean_opt(payload.subject_name.as_deref()).is_none() {
        errors.push("El nombre del titular es obligatorio".to_string());
    }

    match clean_opt(payload.subject_id.as_deref()) {
        None => errors.push("El RUT del titular es obligatorio".to_string()),
        Some(raw) if normalize_rut(&raw).is_none() => {
            errors.push("El RUT del titular no es válido".to_string())
        }
        Some(_) => {}
    }

    if clean_opt(payload.purpose.as_deref()).is_none() {
        errors.push("La finalidad del tratamiento es obligatoria".to_string());
    }

    match payload.retention_months {
        None => errors.push("El plazo de conservación es obligatorio".to_string()),
        Some(months) => check_retention(months, &mut errors),
    }

    let granted = match payload.granted_at.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push("La fecha de otorgamiento es obligatoria".to_string());
            None
        }
        Some(raw) => {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                errors.push("La fecha de otorgamiento no es válida (AAAA-MM-DD)".to_string());
            }
            parsed
        }
    };

    if let Some(raw) = payload.expires_at.as_deref().filter(|s| !s.trim().is_empty()) {
        match (parse_date(raw), granted) {
            (None, _) => {
                errors.push("La fecha de expiración no es válida (AAAA-MM-DD)".to_string())
            }
            (Some(expires), Some(granted)) if expires < granted => errors.push(
                "La fecha de expiración no puede ser anterior a la de otorgamiento".to_string(),
            ),
            _ => {}
        }
    }

    if payload.international_transfer && clean_list(&payload.destination_countries).is_empty() {
        errors.push(
            "Debe indicar los países de destino de la transferencia internacional".to_string(),
        );
    }

    Validation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Build a new active record from a submission.
pub fn prepare(payload: &ConsentPayload, now: DateTime<Utc>) -> Result<ConsentRecord, AppError> {
    let validation = validate(payload);
    if !validation.valid {
        return Err(AppError::Validation(validation.errors));
    }

    let invalid = || AppError::validation("Consentimiento inválido");
    let subject_id = payload
        .subject_id
        .as_deref()
        .and_then(normalize_rut)
        .ok_or_else(invalid)?;
    let granted_at = payload
        .granted_at
        .as_deref()
        .and_then(parse_date)
        .ok_or_else(invalid)?;
    let retention_months = payload
        .retention_months
        .and_then(|m| u32::try_from(m).ok())
        .ok_or_else(invalid)?;
    let expires_at = match payload.expires_at.as_deref().and_then(parse_date) {
        Some(date) => date,
        None => add_months(granted_at, retention_months).ok_or_else(invalid)?,
    };

    let international_transfer = payload.international_transfer;
    let destination_countries = if international_transfer {
        clean_list(&payload.destination_countries)
    } else {
        Vec::new()
    };

    let ts = now.timestamp();
    Ok(ConsentRecord {
        id: uuid::Uuid::new_v4().to_string(),
        subject_name: clean_opt(payload.subject_name.as_deref()).ok_or_else(invalid)?,
        subject_id,
        purpose: clean_opt(payload.purpose.as_deref()).ok_or_else(invalid)?,
        data_categories: clean_list(&payload.data_categories),
        collection_method: clean_opt(payload.collection_method.as_deref())
            .unwrap_or_else(|| DEFAULT_COLLECTION_METHOD.to_string()),
        granted_at,
        retention_months,
        expires_at,
        international_transfer,
        destination_countries,
        notes: clean_opt(payload.notes.as_deref()),
        status: ConsentStatus::Active,
        history: Vec::new(),
        created_at: ts,
        updated_at: ts,
        version: 0,
    })
}

/// Apply an edit to an active record, returning the updated copy.
pub fn apply_edit(
    record: &ConsentRecord,
    edit: &ConsentEdit,
    now: DateTime<Utc>,
) -> Result<ConsentRecord, AppError> {
    if record.status != ConsentStatus::Active {
        return Err(AppError::validation(format!(
            "Solo se pueden editar consentimientos vigentes (estado actual: {})",
            record.status.as_str()
        )));
    }

    let mut errors = Vec::new();
    let mut next = record.clone();

    if let Some(name) = &edit.subject_name {
        match clean_opt(Some(name.as_str())) {
            Some(name) => next.subject_name = name,
            None => errors.push("El nombre del titular es obligatorio".to_string()),
        }
    }
    if let Some(purpose) = &edit.purpose {
        match clean_opt(Some(purpose.as_str())) {
            Some(purpose) => next.purpose = purpose,
            None => errors.push("La finalidad del tratamiento es obligatoria".to_string()),
        }
    }
    if let Some(categories) = &edit.data_categories {
        next.data_categories = clean_list(categories);
    }
    if let Some(method) = &edit.collection_method {
        next.collection_method = clean_opt(Some(method.as_str()))
            .unwrap_or_else(|| DEFAULT_COLLECTION_METHOD.to_string());
    }
    if let Some(months) = edit.retention_months {
        check_retention(months, &mut errors);
        if let Ok(months) = u32::try_from(months) {
            next.retention_months = months;
        }
    }

    match edit.expires_at.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => match parse_date(raw) {
            Some(date) if date < next.granted_at => errors.push(
                "La fecha de expiración no puede ser anterior a la de otorgamiento".to_string(),
            ),
            Some(date) => next.expires_at = date,
            None => {
                errors.push("La fecha de expiración no es válida (AAAA-MM-DD)".to_string())
            }
        },
        None if edit.retention_months.is_some() => {
            if let Some(date) = add_months(next.granted_at, next.retention_months) {
                next.expires_at = date;
            }
        }
        None => {}
    }

    if let Some(transfer) = edit.international_transfer {
        next.international_transfer = transfer;
    }
    if let Some(countries) = &edit.destination_countries {
        next.destination_countries = clean_list(countries);
    }
    if !next.international_transfer {
        next.destination_countries.clear();
    } else if next.destination_countries.is_empty() {
        errors.push(
            "Debe indicar los países de destino de la transferencia internacional".to_string(),
        );
    }

    if let Some(notes) = &edit.notes {
        next.notes = clean_opt(Some(notes.as_str()));
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    next.push_history("updated", None, now.timestamp());
    Ok(next)
}

/// Records matching every criterion that is set.
pub fn filter<'a>(
    records: &'a [ConsentRecord],
    criteria: &ConsentFilter,
) -> Result<Vec<&'a ConsentRecord>, AppError> {
    let status = match criteria.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(ConsentStatus::parse(raw).ok_or_else(|| {
            AppError::validation(format!("Estado desconocido: {raw}"))
        })?),
        None => None,
    };
    let purpose = clean_opt(criteria.purpose.as_deref()).map(|p| p.to_lowercase());
    let needle = clean_opt(criteria.q.as_deref()).map(|q| q.to_lowercase());

    Ok(records
        .iter()
        .filter(|r| status.map_or(true, |s| r.status == s))
        .filter(|r| {
            purpose
                .as_deref()
                .map_or(true, |p| r.purpose.to_lowercase() == p)
        })
        .filter(|r| {
            needle.as_deref().map_or(true, |n| {
                r.subject_name.to_lowercase().contains(n) || r.subject_id.to_lowercase().contains(n)
            })
        })
        .collect())
}

/// Expire active records whose expiry date is strictly before `today`.
/// Returns the changed records so the caller can persist them.
pub fn refresh_expirations(
    records: &mut [ConsentRecord],
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Vec<ConsentRecord> {
    let mut changed = Vec::new();
    for record in records.iter_mut() {
        if record.status == ConsentStatus::Active && record.expires_at < today {
            record.status = ConsentStatus::Expired;
            record.push_history(
                "expired",
                Some(format!("Plazo vencido el {}", record.expires_at)),
                now.timestamp(),
            );
            changed.push(record.clone());
        }
    }
    changed
}

/// Revoke an active record. Any other status is rejected and nothing changes.
pub fn revoke(
    record: &ConsentRecord,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<ConsentRecord, AppError> {
    if record.status != ConsentStatus::Active {
        return Err(AppError::validation(format!(
            "Solo se pueden revocar consentimientos vigentes (estado actual: {})",
            record.status.as_str()
        )));
    }

    let mut next = record.clone();
    next.status = ConsentStatus::Revoked;
    next.push_history("revoked", clean_opt(Some(reason)), now.timestamp());
    Ok(next)
}

pub fn metrics(records: &[ConsentRecord]) -> ConsentMetrics {
    records.iter().fold(
        ConsentMetrics {
            total: records.len(),
            ..ConsentMetrics::default()
        },
        |mut m, r| {
            match r.status {
                ConsentStatus::Active => m.active += 1,
                ConsentStatus::Revoked => m.revoked += 1,
                ConsentStatus::Expired => m.expired += 1,
            }
            m
        },
    )
}

/// Display form used in reports.
pub fn describe_status(status: ConsentStatus) -> &'static str {
    match status {
        ConsentStatus::Active => "Vigente",
        ConsentStatus::Revoked => "Revocado",
        ConsentStatus::Expired => "Expirado",
    }
}

pub(crate) fn summarize_subject(record: &ConsentRecord) -> String {
    clean_text(&format!("{} ({})", record.subject_name, record.subject_id))
}
