pub mod auth;
pub mod error;
pub mod models;
pub mod responses;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use models::{FileRow, SubjectRow, UserProfile, UserRow};
pub use responses::ApiMessage;
pub use state::AppState;
