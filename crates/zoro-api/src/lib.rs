//! Tracking-service adapters and the orchestrator that fronts them.
//!
//! Each provider module translates between its wire protocol and the
//! normalized model in `zoro-core`; [`Orchestrator`] is the only type the
//! host plugin talks to.

pub mod anilist;
pub mod credentials;
pub mod mal;
pub mod orchestrator;
pub mod simkl;
pub mod traits;

pub use credentials::CredentialStore;
pub use orchestrator::Orchestrator;
pub use traits::TrackerService;
