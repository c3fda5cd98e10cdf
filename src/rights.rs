//! Data-subject rights requests (ARCO): query construction, status
//! transitions and metrics.

use crate::entities::rights_request::{Column, Entity};
use crate::errors::AppError;
use crate::ingest::canonical_request_type;
use crate::normalize::clean_opt;
use crate::storage::{self, RecordStore};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use sea_orm::sea_query::{Condition, Expr, Func, LikeExpr};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Select};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Closed,
    Extended,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Closed => "closed",
            RequestStatus::Extended => "extended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(RequestStatus::Open),
            "closed" => Some(RequestStatus::Closed),
            "extended" => Some(RequestStatus::Extended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsRequest {
    pub id: String,
    pub subject_name: String,
    pub subject_id: String,
    pub email: Option<String>,
    pub request_type: Option<String>,
    pub details: Option<String>,
    pub attachments: Vec<String>,
    /// Status as sent by the form, consulted when `system_status` is unset
    pub status: Option<String>,
    pub system_status: Option<RequestStatus>,
    pub notes: Option<String>,
    pub origin: String,
    pub ingested_at: i64,
    pub updated_at: Option<i64>,
}

impl RightsRequest {
    /// `system_status`, else the sender's status, else open.
    pub fn effective_status(&self) -> RequestStatus {
        self.system_status
            .or_else(|| self.status.as_deref().and_then(RequestStatus::parse))
            .unwrap_or(RequestStatus::Open)
    }

    pub fn partition_key(&self) -> &str {
        &self.id
    }
}

/// Where a query looks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionScope {
    CrossPartition,
    Partition(String),
}

/// Filter criteria accepted by the ARCO listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RightsQuery {
    /// First day included (YYYY-MM-DD)
    pub from: Option<String>,
    /// Last day included (YYYY-MM-DD)
    pub to: Option<String>,
    pub request_type: Option<String>,
    pub status: Option<String>,
    /// Case-insensitive substring of subject name or ID
    pub q: Option<String>,
    /// Restrict to one partition key
    pub partition: Option<String>,
    pub limit: Option<u64>,
}

fn parse_day(raw: &str, field: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::validation(format!("La fecha '{field}' no es válida (AAAA-MM-DD)"))
    })
}

fn day_start(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn like_pattern(needle: &str) -> LikeExpr {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    LikeExpr::new(format!("%{}%", escaped.to_lowercase())).escape('\\')
}

/// Rows whose effective status is `status`: the system status when set,
/// else the sender's status, where a missing or unrecognised one reads as open.
fn status_condition(status: RequestStatus) -> Condition {
    let sender_status = || Expr::expr(Func::lower(Expr::col(Column::Status)));
    let fallback = match status {
        RequestStatus::Open => Condition::any()
            .add(Column::Status.is_null())
            .add(sender_status().is_not_in([
                RequestStatus::Closed.as_str(),
                RequestStatus::Extended.as_str(),
            ])),
        other => Condition::all().add(sender_status().eq(other.as_str())),
    };
    Condition::any()
        .add(Column::SystemStatus.eq(status.as_str()))
        .add(
            Condition::all()
                .add(Column::SystemStatus.is_null())
                .add(fallback),
        )
}

impl RightsQuery {
    pub fn scope(&self) -> PartitionScope {
        match clean_opt(self.partition.as_deref()) {
            Some(key) => PartitionScope::Partition(key),
            None => PartitionScope::CrossPartition,
        }
    }

    /// Build the select. User input only ever reaches the statement as bound values.
    pub fn build(&self, page_size: u64) -> Result<Select<Entity>, AppError> {
        let mut select = Entity::find();

        let from = clean_opt(self.from.as_deref())
            .map(|raw| parse_day(&raw, "from"))
            .transpose()?;
        let to = clean_opt(self.to.as_deref())
            .map(|raw| parse_day(&raw, "to"))
            .transpose()?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AppError::validation(
                    "El rango de fechas es inválido: 'from' es posterior a 'to'",
                ));
            }
        }
        if let Some(from) = from {
            select = select.filter(Column::IngestedAt.gte(day_start(from)));
        }
        if let Some(to) = to {
            // inclusive: everything before the start of the following day
            if let Some(next) = to.checked_add_days(Days::new(1)) {
                select = select.filter(Column::IngestedAt.lt(day_start(next)));
            }
        }

        if let Some(request_type) = clean_opt(self.request_type.as_deref()) {
            // stored values are canonical, so "Acceso" finds "access"
            let wanted = canonical_request_type(&request_type).to_lowercase();
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(Column::RequestType))).eq(wanted),
            );
        }

        if let Some(raw) = clean_opt(self.status.as_deref()) {
            let status = RequestStatus::parse(&raw)
                .ok_or_else(|| AppError::validation(format!("Estado desconocido: {raw}")))?;
            select = select.filter(status_condition(status));
        }

        if let Some(needle) = clean_opt(self.q.as_deref()) {
            select = select.filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(Column::SubjectName))).like(like_pattern(&needle)))
                    .add(Expr::expr(Func::lower(Expr::col(Column::SubjectId))).like(like_pattern(&needle))),
            );
        }

        if let PartitionScope::Partition(key) = self.scope() {
            select = select.filter(Column::PartitionKey.eq(key));
        }

        let limit = self.limit.unwrap_or(page_size).clamp(1, page_size.max(1));
        Ok(select.order_by_desc(Column::IngestedAt).limit(limit))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RightsMetrics {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub extended: usize,
    /// Requests ingested within the requested window, when one was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<usize>,
}

/// Whether a request was ingested within the last `window_minutes`, both ends included.
pub fn is_new(request: &RightsRequest, now: DateTime<Utc>, window_minutes: i64) -> bool {
    let now = now.timestamp();
    let since = now.saturating_sub(window_minutes.max(0).saturating_mul(60));
    request.ingested_at >= since && request.ingested_at <= now
}

pub fn metrics(
    requests: &[RightsRequest],
    now: DateTime<Utc>,
    new_window_minutes: Option<i64>,
) -> RightsMetrics {
    let mut m = RightsMetrics {
        total: requests.len(),
        ..RightsMetrics::default()
    };
    for request in requests {
        match request.effective_status() {
            RequestStatus::Open => m.open += 1,
            RequestStatus::Closed => m.closed += 1,
            RequestStatus::Extended => m.extended += 1,
        }
    }
    m.new = new_window_minutes
        .map(|window| requests.iter().filter(|r| is_new(r, now, window)).count());
    m
}

fn append_note(existing: Option<&str>, status: RequestStatus, note: &str, now: DateTime<Utc>) -> String {
    let line = format!(
        "{} [{}] {}",
        now.format("%Y-%m-%d %H:%M UTC"),
        status.as_str(),
        note
    );
    match existing.filter(|e| !e.is_empty()) {
        Some(existing) => format!("{existing}\n{line}"),
        None => line,
    }
}

/// Move a request to `new_status`, recording `note`. Unknown statuses are
/// rejected before the store is touched.
pub async fn transition_status(
    store: &RecordStore,
    id: &str,
    new_status: &str,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<RightsRequest, AppError> {
    let status = RequestStatus::parse(new_status).ok_or_else(|| {
        AppError::validation(format!(
            "Estado '{new_status}' no permitido; use open, closed o extended"
        ))
    })?;

    let mut request = storage::get_rights_request(store, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Solicitud no encontrada".to_string()))?;

    request.system_status = Some(status);
    if let Some(note) = clean_opt(note) {
        request.notes = Some(append_note(request.notes.as_deref(), status, &note, now));
    }
    request.updated_at = Some(now.timestamp());

    storage::update_rights_request_status(store, &request).await?;
    tracing::info!(id = %request.id, status = status.as_str(), "rights request transitioned");
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{DbBackend, QueryTrait};

    fn request(id: &str, ingested_at: i64) -> RightsRequest {
        RightsRequest {
            id: id.to_string(),
            subject_name: "Ana Rojas".to_string(),
            subject_id: "12345678-5".to_string(),
            email: None,
            request_type: Some("Acceso".to_string()),
            details: None,
            attachments: vec![],
            status: None,
            system_status: None,
            notes: None,
            origin: "webhook".to_string(),
            ingested_at,
            updated_at: None,
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(RequestStatus::parse(" Closed "), Some(RequestStatus::Closed));
        assert_eq!(RequestStatus::parse("pending"), None);
    }

    #[test]
    fn test_effective_status_fallback() {
        let mut r = request("a", 0);
        assert_eq!(r.effective_status(), RequestStatus::Open);

        r.status = Some("extended".to_string());
        assert_eq!(r.effective_status(), RequestStatus::Extended);

        r.system_status = Some(RequestStatus::Closed);
        assert_eq!(r.effective_status(), RequestStatus::Closed);
    }

    #[test]
    fn test_build_binds_user_values() {
        let query = RightsQuery {
            q: Some("o'brien%".to_string()),
            request_type: Some("ACCESO".to_string()),
            status: Some("open".to_string()),
            from: Some("2024-01-01".to_string()),
            to: Some("2024-01-31".to_string()),
            ..Default::default()
        };
        let stmt = query.build(100).unwrap().build(DbBackend::Sqlite);

        assert!(!stmt.sql.contains("o'brien"));
        assert!(!stmt.sql.contains("access"));
        assert!(stmt.sql.contains("ORDER BY"));
        let values = format!("{:?}", stmt.values);
        assert!(values.contains("o'brien"));
        assert!(values.contains("access"));
    }

    #[test]
    fn test_build_rejects_bad_input() {
        let bad_status = RightsQuery {
            status: Some("pending".to_string()),
            ..Default::default()
        };
        assert!(bad_status.build(100).is_err());

        let bad_date = RightsQuery {
            from: Some("01-01-2024".to_string()),
            ..Default::default()
        };
        assert!(bad_date.build(100).is_err());

        let inverted = RightsQuery {
            from: Some("2024-02-01".to_string()),
            to: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        assert!(inverted.build(100).is_err());
    }

    #[test]
    fn test_scope() {
        assert_eq!(RightsQuery::default().scope(), PartitionScope::CrossPartition);
        let q = RightsQuery {
            partition: Some("abc".to_string()),
            ..Default::default()
        };
        assert_eq!(q.scope(), PartitionScope::Partition("abc".to_string()));
    }

    #[test]
    fn test_is_new_window_is_closed() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let ts = now.timestamp();
        assert!(is_new(&request("a", ts - 600), now, 10));
        assert!(is_new(&request("b", ts), now, 10));
        assert!(!is_new(&request("c", ts - 601), now, 10));
        assert!(!is_new(&request("d", ts + 1), now, 10));
    }

    #[test]
    fn test_is_new_huge_window() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert!(is_new(&request("a", 0), now, i64::MAX));
        assert_eq!(metrics(&[request("a", 0)], now, Some(i64::MAX)).new, Some(1));
    }

    #[test]
    fn test_request_type_filter_is_canonical() {
        let query = RightsQuery {
            request_type: Some("Acceso".to_string()),
            ..Default::default()
        };
        let stmt = query.build(100).unwrap().build(DbBackend::Sqlite);
        let values = format!("{:?}", stmt.values);
        assert!(values.contains("\"access\""));
        assert!(!values.contains("acceso"));
    }

    #[test]
    fn test_open_filter_covers_missing_status() {
        let query = RightsQuery {
            status: Some("open".to_string()),
            ..Default::default()
        };
        let sql = query.build(100).unwrap().build(DbBackend::Sqlite).sql;
        assert!(sql.contains("\"status\" IS NULL"));
        assert!(sql.contains("NOT IN"));
    }

    #[test]
    fn test_metrics() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let ts = now.timestamp();
        let mut closed = request("b", ts - 7200);
        closed.system_status = Some(RequestStatus::Closed);
        let mut extended = request("c", ts - 30);
        extended.status = Some("Extended".to_string());
        let requests = vec![request("a", ts - 60), closed, extended];

        let m = metrics(&requests, now, Some(5));
        assert_eq!(m.total, 3);
        assert_eq!(m.open, 1);
        assert_eq!(m.closed, 1);
        assert_eq!(m.extended, 1);
        assert_eq!(m.new, Some(2));

        assert_eq!(metrics(&requests, now, None).new, None);
    }

    #[test]
    fn test_append_note() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let first = append_note(None, RequestStatus::Extended, "Plazo ampliado", now);
        assert_eq!(first, "2024-06-15 12:00 UTC [extended] Plazo ampliado");
        let second = append_note(Some(&first), RequestStatus::Closed, "Respondida", now);
        assert!(second.starts_with(&first));
        assert!(second.ends_with("[closed] Respondida"));
    }
}
