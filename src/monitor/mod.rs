pub mod alerts;
pub mod export;
pub mod store;

pub use alerts::{Alert, AlertKind};
pub use store::ObservationStore;
