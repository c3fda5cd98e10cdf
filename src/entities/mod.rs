pub mod consent;
pub mod rat_record;
pub mod rights_request;
pub mod session;
pub mod user;

pub use consent::Entity as ConsentRecord;
pub use rat_record::Entity as RatRecord;
pub use rights_request::Entity as RightsRequest;
pub use session::Entity as Session;
pub use user::Entity as User;
