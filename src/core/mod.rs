pub mod cancellation;
pub mod domain;
pub mod errors;
pub mod extensions;
pub mod provider;
pub mod references;
pub mod traits;
