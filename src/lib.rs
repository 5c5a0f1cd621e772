pub mod config;
pub mod error;
pub mod model;
pub mod page;
pub mod pipeline;
pub mod preprocess;
pub mod server;
pub mod storage;

pub use config::AppConfig;
pub use error::ServiceError;
pub use model::{Classifier, ModelRegistry, Prediction};
pub use server::build_router;
