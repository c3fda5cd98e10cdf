pub mod app;
pub mod builders;
pub mod db;

pub use app::TestApp;
pub use builders::{RightsRequestBuilder, UserBuilder};
pub use db::TestDb;
