//! PrivacyDesk - personal-data compliance backend
//!
//! Consent records, data-subject rights requests (ARCO) and records of
//! processing activities (RAT), behind a session-authenticated JSON API.
//! Every module is public so integration tests can drive them directly.

pub mod consent;
pub mod entities;
pub mod errors;
pub mod ingest;
pub mod normalize;
pub mod rat;
pub mod report;
pub mod rights;
pub mod session;
pub mod settings;
pub mod storage;
pub mod user_sync;
pub mod web;
