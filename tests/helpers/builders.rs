use privacydesk::rights::{RequestStatus, RightsRequest};
use privacydesk::storage::{self, RecordStore, Role, User};

/// Builder for creating staff accounts
pub struct UserBuilder {
    email: String,
    password: String,
    display_name: String,
    role: Role,
    active: bool,
}

impl UserBuilder {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            password: "password123".to_string(),
            display_name: "Analista".to_string(),
            role: Role::Analyst,
            active: true,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn admin(mut self) -> Self {
        self.role = Role::Admin;
        self.display_name = "Administrador".to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub async fn create(self, store: &RecordStore) -> User {
        let user = storage::create_user(
            store,
            &self.email,
            &self.password,
            &self.display_name,
            self.role,
        )
        .await
        .expect("Failed to create test user");

        if !self.active {
            storage::update_user(store, &user.id, Some(false), None, None, None)
                .await
                .expect("Failed to deactivate user");
        }

        storage::get_user_by_id(store, &user.id)
            .await
            .expect("Failed to get user")
            .expect("User not found")
    }
}

/// Builder for seeding rights requests without going through the webhook
pub struct RightsRequestBuilder {
    request: RightsRequest,
}

impl RightsRequestBuilder {
    pub fn new(id: &str, ingested_at: i64) -> Self {
        Self {
            request: RightsRequest {
                id: id.to_string(),
                subject_name: "Ana Rojas".to_string(),
                subject_id: "12345678-5".to_string(),
                email: None,
                request_type: Some("access".to_string()),
                details: None,
                attachments: vec![],
                status: None,
                system_status: None,
                notes: None,
                origin: "webhook".to_string(),
                ingested_at,
                updated_at: None,
            },
        }
    }

    pub fn subject(mut self, name: &str, subject_id: &str) -> Self {
        self.request.subject_name = name.to_string();
        self.request.subject_id = subject_id.to_string();
        self
    }

    pub fn request_type(mut self, request_type: &str) -> Self {
        self.request.request_type = Some(request_type.to_string());
        self
    }

    pub fn sender_status(mut self, status: &str) -> Self {
        self.request.status = Some(status.to_string());
        self
    }

    pub fn system_status(mut self, status: RequestStatus) -> Self {
        self.request.system_status = Some(status);
        self
    }

    pub async fn create(self, store: &RecordStore) -> RightsRequest {
        storage::insert_rights_request(store, &self.request)
            .await
            .expect("Failed to insert rights request");
        self.request
    }
}
