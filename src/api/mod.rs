pub mod error;
pub mod route;
pub mod response;

pub use error::ApiError;
pub use route::{create_router, TokenPriceRequest};
pub use response::ApiResponse;
