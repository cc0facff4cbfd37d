//! # uiforge-client
//!
//! Client-side session runtime for UIForge.
//!
//! ## Modules
//!
//! - `storage`: key/value persistence backends with atomic batches
//! - `session`: the persisted session and its epoch
//! - `transport`: the HTTP seam and its reqwest implementation
//! - `coordinator`: bearer attachment, single-flight refresh, retry
//! - `client`: login, signup, logout, profile
//! - `gate`: route requirements and redirect decisions

pub mod client;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod session;
pub mod storage;
pub mod transport;

pub use client::{AuthClient, ProfileResponse, SignupForm};
pub use coordinator::{RequestPhase, SessionEvent, TokenRefreshCoordinator};
pub use error::{ClientError, ClientResult};
pub use gate::{GateOutcome, GateState, ProfileSource, RouteGate, RouteRequirement};
pub use session::{Session, SessionStore, TokenSet};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageOp};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
