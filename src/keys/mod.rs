pub mod auto_generate;
pub mod models;
pub mod rotation;
pub mod service;
pub mod store;

pub use auto_generate::AutoGenerator;
pub use models::{ApiKeyRecord, IssuedKey};
pub use rotation::{MasterKeyRotationWatcher, StateStore};
pub use service::KeyLifecycleService;
pub use store::KeyStore;
