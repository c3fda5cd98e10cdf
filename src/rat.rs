//! Records of Processing Activities (RAT).

use crate::consent::Validation;
use crate::errors::AppError;
use crate::normalize::{clean_list, clean_opt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatSource {
    Manual,
    Spreadsheet,
}

impl RatSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatSource::Manual => "manual",
            RatSource::Spreadsheet => "spreadsheet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Some(RatSource::Manual),
            "spreadsheet" => Some(RatSource::Spreadsheet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatRecord {
    pub id: String,
    pub activity_name: String,
    pub purpose: String,
    pub legal_basis: String,
    pub data_categories: Vec<String>,
    pub subject_categories: Vec<String>,
    pub recipients: Vec<String>,
    pub retention_period: String,
    pub international_transfer: bool,
    pub destination_countries: Vec<String>,
    pub security_measures: Option<String>,
    /// Area responsible for the activity
    pub owner: Option<String>,
    pub source: RatSource,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RatRecord {
    pub fn partition_key(&self) -> &str {
        &self.id
    }
}

/// Body accepted by create and update, and the shape spreadsheet rows are mapped to.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatPayload {
    pub activity_name: Option<String>,
    pub purpose: Option<String>,
    pub legal_basis: Option<String>,
    #[serde(default)]
    pub data_categories: Vec<String>,
    #[serde(default)]
    pub subject_categories: Vec<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub retention_period: Option<String>,
    #[serde(default)]
    pub international_transfer: bool,
    #[serde(default)]
    pub destination_countries: Vec<String>,
    pub security_measures: Option<String>,
    pub owner: Option<String>,
}

pub fn validate(payload: &RatPayload) -> Validation {
    let mut errors = Vec::new();

    if clean_opt(payload.activity_name.as_deref()).is_none() {
        errors.push("El nombre de la actividad es obligatorio".to_string());
    }
    if clean_opt(payload.purpose.as_deref()).is_none() {
        errors.push("La finalidad es obligatoria".to_string());
    }
    if clean_opt(payload.legal_basis.as_deref()).is_none() {
        errors.push("La base de licitud es obligatoria".to_string());
    }
    if clean_opt(payload.retention_period.as_deref()).is_none() {
        errors.push("El plazo de conservación es obligatorio".to_string());
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

fn required(value: &Option<String>) -> Result<String, AppError> {
    clean_opt(value.as_deref()).ok_or_else(|| AppError::validation("Registro RAT inválido"))
}

/// Build a new record from a validated payload.
pub fn prepare(
    payload: &RatPayload,
    source: RatSource,
    now: DateTime<Utc>,
) -> Result<RatRecord, AppError> {
    let validation = validate(payload);
    if !validation.valid {
        return Err(AppError::Validation(validation.errors));
    }

    let ts = now.timestamp();
    Ok(RatRecord {
        id: uuid::Uuid::new_v4().to_string(),
        activity_name: required(&payload.activity_name)?,
        purpose: required(&payload.purpose)?,
        legal_basis: required(&payload.legal_basis)?,
        data_categories: clean_list(&payload.data_categories),
        subject_categories: clean_list(&payload.subject_categories),
        recipients: clean_list(&payload.recipients),
        retention_period: required(&payload.retention_period)?,
        international_transfer: payload.international_transfer,
        destination_countries: if payload.international_transfer {
            clean_list(&payload.destination_countries)
        } else {
            Vec::new()
        },
        security_measures: clean_opt(payload.security_measures.as_deref()),
        owner: clean_opt(payload.owner.as_deref()),
        source,
        created_at: ts,
        updated_at: ts,
    })
}

/// Replace the content of `record`, keeping its identity, origin and creation time.
pub fn apply_update(
    record: &RatRecord,
    payload: &RatPayload,
    now: DateTime<Utc>,
) -> Result<RatRecord, AppError> {
    let fresh = prepare(payload, record.source, now)?;
    Ok(RatRecord {
        id: record.id.clone(),
        source: record.source,
        created_at: record.created_at,
        ..fresh
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn payload() -> RatPayload {
        RatPayload {
            activity_name: Some("Gestión de  nómina".to_string()),
            purpose: Some("Pago de remuneraciones".to_string()),
            legal_basis: Some("Contrato".to_string()),
            data_categories: vec!["Identificación".into(), "Bancarios".into()],
            subject_categories: vec!["Trabajadores".into()],
            recipients: vec!["Banco".into(), "banco".into()],
            retention_period: Some("6 años".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_requires_core_fields() {
        assert!(validate(&payload()).valid);

        let v = validate(&RatPayload::default());
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 4);
    }

    #[test]
    fn test_transfer_requires_countries() {
        let mut p = payload();
        p.international_transfer = true;
        assert!(!validate(&p).valid);
        p.destination_countries = vec!["Perú".into()];
        assert!(validate(&p).valid);
    }

    #[test]
    fn test_prepare_normalizes() {
        let r = prepare(&payload(), RatSource::Manual, now()).unwrap();
        assert_eq!(r.activity_name, "Gestión de nómina");
        assert_eq!(r.recipients, vec!["Banco".to_string()]);
        assert_eq!(r.source, RatSource::Manual);
        assert_eq!(r.partition_key(), r.id);
        assert!(r.destination_countries.is_empty());
    }

    #[test]
    fn test_apply_update_keeps_identity() {
        let original = prepare(&payload(), RatSource::Spreadsheet, now()).unwrap();
        let mut p = payload();
        p.purpose = Some("Cálculo de impuestos".to_string());

        let later = now() + chrono::Duration::hours(1);
        let updated = apply_update(&original, &p, later).unwrap();
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.source, RatSource::Spreadsheet);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.updated_at, later.timestamp());
        assert_eq!(updated.purpose, "Cálculo de impuestos");
    }

    #[test]
    fn test_apply_update_rejects_invalid() {
        let original = prepare(&payload(), RatSource::Manual, now()).unwrap();
        let mut p = payload();
        p.legal_basis = None;
        assert!(matches!(
            apply_update(&original, &p, now()),
            Err(AppError::Validation(_))
        ));
    }
}
