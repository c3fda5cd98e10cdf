use migration::MigratorTrait;
use privacydesk::storage::RecordStore;
use sea_orm::Database;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    store: RecordStore,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            store: RecordStore::from_connection(connection),
            _temp_file: temp_file,
        }
    }

    /// Record store backed by this database
    pub fn store(&self) -> &RecordStore {
        &self.store
    }
}
