use crate::consent::{self, ConsentRecord, ConsentStatus, HistoryEntry};
use crate::entities;
use crate::errors::AppError;
use crate::rat::{RatRecord, RatSource};
use crate::rights::{RequestStatus, RightsQuery, RightsRequest};
use crate::session;
use crate::settings::Database as DbCfg;
use base64ct::Encoding;
use chrono::Utc;
use migration::MigratorTrait;
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const UNCONFIGURED_MSG: &str = "La base de datos no está configurada";
const UNREACHABLE_MSG: &str = "No fue posible conectar con la base de datos";

/// Handle to the record store.
///
/// `Unconfigured` is an explicit state: with no database URL the server still
/// starts, and every data endpoint answers 503 instead of crashing the process.
#[derive(Clone)]
pub enum RecordStore {
    Unconfigured,
    Configured(Arc<Backend>),
}

pub struct Backend {
    url: String,
    connect_attempts: u32,
    conn: OnceCell<DatabaseConnection>,
    healthy: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum StoreHealth {
    Unconfigured,
    Connected,
    Unreachable(String),
}

impl RecordStore {
    pub fn from_settings(cfg: &DbCfg) -> Self {
        match cfg.connection_url() {
            Some(url) => RecordStore::Configured(Arc::new(Backend {
                url,
                connect_attempts: cfg.connect_attempts.max(1),
                conn: OnceCell::new(),
                healthy: AtomicBool::new(false),
            })),
            None => RecordStore::Unconfigured,
        }
    }

    /// Wrap an already-migrated connection.
    pub fn from_connection(db: DatabaseConnection) -> Self {
        RecordStore::Configured(Arc::new(Backend {
            url: String::new(),
            connect_attempts: 1,
            conn: OnceCell::new_with(Some(db)),
            healthy: AtomicBool::new(true),
        }))
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, RecordStore::Configured(_))
    }

    /// Last-known connection health; does not touch the database.
    pub fn is_connected(&self) -> bool {
        match self {
            RecordStore::Unconfigured => false,
            RecordStore::Configured(backend) => backend.healthy.load(Ordering::Relaxed),
        }
    }

    /// Shared connection, established on first use and memoized.
    pub async fn connection(&self) -> Result<&DatabaseConnection, AppError> {
        let backend = match self {
            RecordStore::Unconfigured => {
                return Err(AppError::BackendUnavailable(UNCONFIGURED_MSG.to_string()))
            }
            RecordStore::Configured(backend) => backend,
        };

        let result = backend
            .conn
            .get_or_try_init(|| async {
                let db = Database::connect(&backend.url).await?;
                migration::Migrator::up(&db, None).await?;
                tracing::info!("Record store connected and migrated");
                Ok::<_, sea_orm::DbErr>(db)
            })
            .await;

        match result {
            Ok(db) => {
                backend.healthy.store(true, Ordering::Relaxed);
                Ok(db)
            }
            Err(e) => {
                backend.healthy.store(false, Ordering::Relaxed);
                tracing::warn!(error = %e, "Record store connection failed");
                Err(AppError::BackendUnavailable(UNREACHABLE_MSG.to_string()))
            }
        }
    }

    /// Establish the connection up front, retrying a fixed number of times.
    /// Safe to call repeatedly; an unconfigured store is left as is.
    pub async fn initialize(&self) -> Result<(), AppError> {
        let attempts = match self {
            RecordStore::Unconfigured => {
                tracing::warn!("database.url is not set; running without a record store");
                return Ok(());
            }
            RecordStore::Configured(backend) => backend.connect_attempts,
        };

        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.connection().await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(attempt, attempts, "Record store initialization failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AppError::BackendUnavailable(UNREACHABLE_MSG.to_string())))
    }

    /// Ping the database and refresh the last-known health.
    pub async fn health_check(&self) -> StoreHealth {
        let RecordStore::Configured(backend) = self else {
            return StoreHealth::Unconfigured;
        };
        let db = match self.connection().await {
            Ok(db) => db,
            Err(e) => return StoreHealth::Unreachable(e.public_message()),
        };
        match db.ping().await {
            Ok(()) => {
                backend.healthy.store(true, Ordering::Relaxed);
                StoreHealth::Connected
            }
            Err(e) => {
                backend.healthy.store(false, Ordering::Relaxed);
                tracing::warn!(error = %e, "Record store ping failed");
                StoreHealth::Unreachable(UNREACHABLE_MSG.to_string())
            }
        }
    }

    /// Run a prepared select. Values are bound by SeaORM, never spliced into SQL.
    pub async fn query<E: EntityTrait>(&self, select: Select<E>) -> Result<Vec<E::Model>, AppError> {
        let db = self.connection().await?;
        Ok(select.all(db).await?)
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

fn to_json_list(items: &[String]) -> Result<String, AppError> {
    Ok(serde_json::to_string(items)?)
}

fn from_json_list(raw: &str) -> Result<Vec<String>, AppError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}

fn corrupt(what: &str, id: &str) -> AppError {
    AppError::Other(format!("Stored {what} {id} is malformed"))
}

// ============================================================================
// Consent records
// ============================================================================

fn consent_from_model(model: entities::consent::Model) -> Result<ConsentRecord, AppError> {
    let history: Vec<HistoryEntry> = serde_json::from_str(&model.history)?;
    Ok(ConsentRecord {
        granted_at: consent::parse_date(&model.granted_at)
            .ok_or_else(|| corrupt("consent", &model.id))?,
        expires_at: consent::parse_date(&model.expires_at)
            .ok_or_else(|| corrupt("consent", &model.id))?,
        status: ConsentStatus::parse(&model.status).ok_or_else(|| corrupt("consent", &model.id))?,
        retention_months: u32::try_from(model.retention_months)
            .map_err(|_| corrupt("consent", &model.id))?,
        data_categories: from_json_list(&model.data_categories)?,
        destination_countries: from_json_list(&model.destination_countries)?,
        history,
        id: model.id,
        subject_name: model.subject_name,
        subject_id: model.subject_id,
        purpose: model.purpose,
        collection_method: model.collection_method,
        international_transfer: model.international_transfer,
        notes: model.notes,
        created_at: model.created_at,
        updated_at: model.updated_at,
        version: model.version,
    })
}

fn consent_active_model(
    record: &ConsentRecord,
    version: i64,
) -> Result<entities::consent::ActiveModel, AppError> {
    Ok(entities::consent::ActiveModel {
        id: Set(record.id.clone()),
        partition_key: Set(record.partition_key().to_string()),
        subject_name: Set(record.subject_name.clone()),
        subject_id: Set(record.subject_id.clone()),
        purpose: Set(record.purpose.clone()),
        data_categories: Set(to_json_list(&record.data_categories)?),
        collection_method: Set(record.collection_method.clone()),
        granted_at: Set(record.granted_at.to_string()),
        retention_months: Set(i32::try_from(record.retention_months)
            .map_err(|_| AppError::validation("Plazo de conservación fuera de rango"))?),
        expires_at: Set(record.expires_at.to_string()),
        international_transfer: Set(record.international_transfer),
        destination_countries: Set(to_json_list(&record.destination_countries)?),
        notes: Set(record.notes.clone()),
        status: Set(record.status.as_str().to_string()),
        history: Set(serde_json::to_string(&record.history)?),
        created_at: Set(record.created_at),
        updated_at: Set(record.updated_at),
        version: Set(version),
    })
}

pub async fn insert_consent(
    store: &RecordStore,
    record: &ConsentRecord,
) -> Result<ConsentRecord, AppError> {
    let db = store.connection().await?;
    consent_active_model(record, 1)?.insert(db).await?;

    let mut stored = record.clone();
    stored.version = 1;
    Ok(stored)
}

pub async fn get_consent(store: &RecordStore, id: &str) -> Result<Option<ConsentRecord>, AppError> {
    use entities::consent::Entity;

    let db = store.connection().await?;
    Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(consent_from_model)
        .transpose()
}

/// Most recent consents first, at most `limit`.
pub async fn list_consents(store: &RecordStore, limit: u64) -> Result<Vec<ConsentRecord>, AppError> {
    use entities::consent::{Column, Entity};

    let select = Entity::find()
        .order_by_desc(Column::CreatedAt)
        .limit(limit.max(1));
    store
        .query(select)
        .await?
        .into_iter()
        .map(consent_from_model)
        .collect()
}

/// Write `record` if the stored version still equals `record.version`.
/// Returns the record with its new version.
pub async fn update_consent(
    store: &RecordStore,
    record: &ConsentRecord,
) -> Result<ConsentRecord, AppError> {
    use entities::consent::{Column, Entity};

    let db = store.connection().await?;
    let expected = record.version;
    let next_version = expected + 1;

    let result = Entity::update_many()
        .set(consent_active_model(record, next_version)?)
        .filter(Column::Id.eq(record.id.as_str()))
        .filter(Column::Version.eq(expected))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return match get_consent(store, &record.id).await? {
            Some(_) => Err(AppError::Conflict(
                "El consentimiento fue modificado por otra persona; recargue e intente nuevamente"
                    .to_string(),
            )),
            None => Err(AppError::NotFound("Consentimiento no encontrado".to_string())),
        };
    }

    let mut stored = record.clone();
    stored.version = next_version;
    Ok(stored)
}

pub async fn delete_consent(
    store: &RecordStore,
    id: &str,
    partition_key: &str,
) -> Result<bool, AppError> {
    use entities::consent::{Column, Entity};

    let db = store.connection().await?;
    let result = Entity::delete_many()
        .filter(Column::Id.eq(id))
        .filter(Column::PartitionKey.eq(partition_key))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

// ============================================================================
// Rights requests
// ============================================================================

fn rights_from_model(model: entities::rights_request::Model) -> Result<RightsRequest, AppError> {
    Ok(RightsRequest {
        attachments: from_json_list(&model.attachments)?,
        system_status: model.system_status.as_deref().and_then(RequestStatus::parse),
        id: model.id,
        subject_name: model.subject_name,
        subject_id: model.subject_id,
        email: model.email,
        request_type: model.request_type,
        details: model.details,
        status: model.status,
        notes: model.notes,
        origin: model.origin,
        ingested_at: model.ingested_at,
        updated_at: model.updated_at,
    })
}

pub async fn insert_rights_request(
    store: &RecordStore,
    request: &RightsRequest,
) -> Result<(), AppError> {
    let db = store.connection().await?;

    let model = entities::rights_request::ActiveModel {
        id: Set(request.id.clone()),
        partition_key: Set(request.partition_key().to_string()),
        subject_name: Set(request.subject_name.clone()),
        subject_id: Set(request.subject_id.clone()),
        email: Set(request.email.clone()),
        request_type: Set(request.request_type.clone()),
        details: Set(request.details.clone()),
        attachments: Set(to_json_list(&request.attachments)?),
        status: Set(request.status.clone()),
        system_status: Set(request.system_status.map(|s| s.as_str().to_string())),
        notes: Set(request.notes.clone()),
        origin: Set(request.origin.clone()),
        ingested_at: Set(request.ingested_at),
        updated_at: Set(request.updated_at),
    };
    model.insert(db).await?;
    Ok(())
}

pub async fn get_rights_request(
    store: &RecordStore,
    id: &str,
) -> Result<Option<RightsRequest>, AppError> {
    use entities::rights_request::Entity;

    let db = store.connection().await?;
    Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(rights_from_model)
        .transpose()
}

pub async fn query_rights_requests(
    store: &RecordStore,
    query: &RightsQuery,
    page_size: u64,
) -> Result<Vec<RightsRequest>, AppError> {
    let select = query.build(page_size)?;
    store
        .query(select)
        .await?
        .into_iter()
        .map(rights_from_model)
        .collect()
}

/// Persist the status, notes and update stamp of an existing request.
pub async fn update_rights_request_status(
    store: &RecordStore,
    request: &RightsRequest,
) -> Result<(), AppError> {
    use entities::rights_request::{Column, Entity};

    let db = store.connection().await?;
    let model = entities::rights_request::ActiveModel {
        system_status: Set(request.system_status.map(|s| s.as_str().to_string())),
        notes: Set(request.notes.clone()),
        updated_at: Set(request.updated_at),
        ..Default::default()
    };
    let result = Entity::update_many()
        .set(model)
        .filter(Column::Id.eq(request.id.as_str()))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Solicitud no encontrada".to_string()));
    }
    Ok(())
}

// ============================================================================
// Processing activity records (RAT)
// ============================================================================

fn rat_from_model(model: entities::rat_record::Model) -> Result<RatRecord, AppError> {
    Ok(RatRecord {
        data_categories: from_json_list(&model.data_categories)?,
        subject_categories: from_json_list(&model.subject_categories)?,
        recipients: from_json_list(&model.recipients)?,
        destination_countries: from_json_list(&model.destination_countries)?,
        source: RatSource::parse(&model.source).ok_or_else(|| corrupt("RAT", &model.id))?,
        id: model.id,
        activity_name: model.activity_name,
        purpose: model.purpose,
        legal_basis: model.legal_basis,
        retention_period: model.retention_period,
        international_transfer: model.international_transfer,
        security_measures: model.security_measures,
        owner: model.owner,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn rat_active_model(record: &RatRecord) -> Result<entities::rat_record::ActiveModel, AppError> {
    Ok(entities::rat_record::ActiveModel {
        id: Set(record.id.clone()),
        partition_key: Set(record.partition_key().to_string()),
        activity_name: Set(record.activity_name.clone()),
        purpose: Set(record.purpose.clone()),
        legal_basis: Set(record.legal_basis.clone()),
        data_categories: Set(to_json_list(&record.data_categories)?),
        subject_categories: Set(to_json_list(&record.subject_categories)?),
        recipients: Set(to_json_list(&record.recipients)?),
        retention_period: Set(record.retention_period.clone()),
        international_transfer: Set(record.international_transfer),
        destination_countries: Set(to_json_list(&record.destination_countries)?),
        security_measures: Set(record.security_measures.clone()),
        owner: Set(record.owner.clone()),
        source: Set(record.source.as_str().to_string()),
        created_at: Set(record.created_at),
        updated_at: Set(record.updated_at),
    })
}

pub async fn insert_rat(store: &RecordStore, record: &RatRecord) -> Result<(), AppError> {
    let db = store.connection().await?;
    rat_active_model(record)?.insert(db).await?;
    Ok(())
}

pub async fn get_rat(store: &RecordStore, id: &str) -> Result<Option<RatRecord>, AppError> {
    use entities::rat_record::Entity;

    let db = store.connection().await?;
    Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(rat_from_model)
        .transpose()
}

pub async fn list_rat(store: &RecordStore, limit: u64) -> Result<Vec<RatRecord>, AppError> {
    use entities::rat_record::{Column, Entity};

    let select = Entity::find()
        .order_by_asc(Column::ActivityName)
        .limit(limit.max(1));
    store
        .query(select)
        .await?
        .into_iter()
        .map(rat_from_model)
        .collect()
}

pub async fn update_rat(store: &RecordStore, record: &RatRecord) -> Result<(), AppError> {
    use entities::rat_record::{Column, Entity};

    let db = store.connection().await?;
    let result = Entity::update_many()
        .set(rat_active_model(record)?)
        .filter(Column::Id.eq(record.id.as_str()))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Registro RAT no encontrado".to_string()));
    }
    Ok(())
}

pub async fn delete_rat(
    store: &RecordStore,
    id: &str,
    partition_key: &str,
) -> Result<bool, AppError> {
    use entities::rat_record::{Column, Entity};

    let db = store.connection().await?;
    let result = Entity::delete_many()
        .filter(Column::Id.eq(id))
        .filter(Column::PartitionKey.eq(partition_key))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CollectionCounts {
    pub consents: u64,
    pub rights_requests: u64,
    pub rat_records: u64,
    pub users: u64,
}

pub async fn collection_counts(store: &RecordStore) -> Result<CollectionCounts, AppError> {
    let db = store.connection().await?;
    Ok(CollectionCounts {
        consents: entities::ConsentRecord::find().count(db).await?,
        rights_requests: entities::RightsRequest::find().count(db).await?,
        rat_records: entities::RatRecord::find().count(db).await?,
        users: entities::User::find().count(db).await?,
    })
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Analyst,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Analyst => "analyst",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "analyst" => Some(Role::Analyst),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    pub created_at: i64,
}

fn user_from_model(model: entities::user::Model) -> User {
    User {
        // unknown roles get the least privilege
        role: Role::parse(&model.role).unwrap_or(Role::Analyst),
        id: model.id,
        email: model.email,
        password_hash: model.password_hash,
        display_name: model.display_name,
        active: model.active,
        created_at: model.created_at,
    }
}

fn hash_password(password: &str) -> Result<String, AppError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Other(format!("Password hashing failed: {}", e)))?
        .to_string())
}

pub async fn create_user(
    store: &RecordStore,
    email: &str,
    password: &str,
    display_name: &str,
    role: Role,
) -> Result<User, AppError> {
    let db = store.connection().await?;

    let id = random_id();
    let created_at = Utc::now().timestamp();
    let email = email.trim().to_lowercase();
    let password_hash = hash_password(password)?;

    let user = entities::user::ActiveModel {
        id: Set(id.clone()),
        email: Set(email.clone()),
        password_hash: Set(password_hash.clone()),
        display_name: Set(display_name.to_string()),
        role: Set(role.as_str().to_string()),
        active: Set(true),
        created_at: Set(created_at),
    };
    user.insert(db).await?;

    Ok(User {
        id,
        email,
        password_hash,
        display_name: display_name.to_string(),
        role,
        active: true,
        created_at,
    })
}

pub async fn get_user_by_email(store: &RecordStore, email: &str) -> Result<Option<User>, AppError> {
    use entities::user::{Column, Entity};

    let db = store.connection().await?;
    Ok(Entity::find()
        .filter(Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await?
        .map(user_from_model))
}

pub async fn get_user_by_id(store: &RecordStore, id: &str) -> Result<Option<User>, AppError> {
    use entities::user::Entity;

    let db = store.connection().await?;
    Ok(Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(user_from_model))
}

#[derive(Debug)]
pub enum Credentials {
    Verified(User),
    Invalid,
    Inactive,
}

/// Check an email/password pair. Inactive accounts are reported separately
/// only when the password is correct.
pub async fn verify_user_password(
    store: &RecordStore,
    email: &str,
    password: &str,
) -> Result<Credentials, AppError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let user = match get_user_by_email(store, email).await? {
        Some(u) => u,
        None => return Ok(Credentials::Invalid),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| AppError::Other(format!("Invalid password hash: {}", e)))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Ok(Credentials::Invalid);
    }

    if user.active {
        Ok(Credentials::Verified(user))
    } else {
        Ok(Credentials::Inactive)
    }
}

/// Update account fields; `None` leaves a field unchanged.
pub async fn update_user(
    store: &RecordStore,
    id: &str,
    active: Option<bool>,
    role: Option<Role>,
    display_name: Option<String>,
    password: Option<&str>,
) -> Result<(), AppError> {
    use entities::user::Entity;

    let db = store.connection().await?;
    let user = Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Usuario no encontrado: {}", id)))?;

    let mut active_model: entities::user::ActiveModel = user.into();
    if let Some(active) = active {
        active_model.active = Set(active);
    }
    if let Some(role) = role {
        active_model.role = Set(role.as_str().to_string());
    }
    if let Some(display_name) = display_name {
        active_model.display_name = Set(display_name);
    }
    if let Some(password) = password {
        active_model.password_hash = Set(hash_password(password)?);
    }
    active_model.update(db).await?;

    Ok(())
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub user_agent: Option<String>,
}

/// Create a session and return the raw cookie token with it. Only a keyed
/// digest of the token is stored.
pub async fn create_session(
    store: &RecordStore,
    user_id: &str,
    ttl_secs: i64,
    user_agent: Option<String>,
    secret: &str,
) -> Result<(String, Session), AppError> {
    let db = store.connection().await?;

    let token = random_id();
    let session_id = session::token_digest(secret, &token);
    let now = Utc::now().timestamp();
    let expires_at = now + ttl_secs;

    let model = entities::session::ActiveModel {
        session_id: Set(session_id.clone()),
        user_id: Set(user_id.to_string()),
        created_at: Set(now),
        expires_at: Set(expires_at),
        user_agent: Set(user_agent.clone()),
    };
    model.insert(db).await?;

    Ok((
        token,
        Session {
            session_id,
            user_id: user_id.to_string(),
            created_at: now,
            expires_at,
            user_agent,
        },
    ))
}

pub async fn get_session(
    store: &RecordStore,
    token: &str,
    secret: &str,
) -> Result<Option<Session>, AppError> {
    use entities::session::Entity;

    let db = store.connection().await?;
    let session_id = session::token_digest(secret, token);

    if let Some(model) = Entity::find_by_id(session_id).one(db).await? {
        let now = Utc::now().timestamp();
        if now > model.expires_at {
            return Ok(None);
        }

        Ok(Some(Session {
            session_id: model.session_id,
            user_id: model.user_id,
            created_at: model.created_at,
            expires_at: model.expires_at,
            user_agent: model.user_agent,
        }))
    } else {
        Ok(None)
    }
}

pub async fn delete_session(store: &RecordStore, token: &str, secret: &str) -> Result<(), AppError> {
    use entities::session::{Column, Entity};

    let db = store.connection().await?;
    Entity::delete_many()
        .filter(Column::SessionId.eq(session::token_digest(secret, token)))
        .exec(db)
        .await?;

    Ok(())
}

pub async fn cleanup_expired_sessions(store: &RecordStore) -> Result<u64, AppError> {
    use entities::session::{Column, Entity};

    let db = store.connection().await?;
    let now = Utc::now().timestamp();
    let result = Entity::delete_many()
        .filter(Column::ExpiresAt.lt(now))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}
