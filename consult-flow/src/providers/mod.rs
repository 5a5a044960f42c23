//! Adapters from the service traits to the hosted platform.

#[cfg(feature = "cortex")]
pub mod cortex;
pub mod postgres;
#[cfg(feature = "rig")]
pub mod rig;

#[cfg(feature = "cortex")]
pub use cortex::CortexSearch;
pub use postgres::PostgresDocumentStore;
#[cfg(feature = "rig")]
pub use rig::RigCompletionModel;
