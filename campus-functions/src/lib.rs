//! # campus-functions — Server handlers for the campus marketplace
//!
//! Small request → response functions (achievement checks, notification
//! dispatch, certificate fingerprints, checkout, video rooms, AI completions)
//! behind an axum router, plus the ports they call.
//!
//! ```text
//!   HTTP ──► http::router ──► handlers ──► Store ─────────┐
//!                │                │                       │ MemoryStore
//!                ▼                ├──► ChangeNotifier     │ RocksStore
//!           AuthProvider          │      (realtime Hub) ──┘
//!                                 └──► Payment / Video / Completion gateways
//! ```

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateways;
pub mod handlers;
pub mod http;
pub mod notify;
pub mod store;

pub use app::{build_state, StartupError};
pub use auth::{AuthProvider, AuthUser, StaticTokenAuth};
pub use config::AppConfig;
pub use error::FunctionError;
pub use http::{router, AppState};
pub use notify::{ChangeNotifier, RecordingNotifier};
pub use store::{MemoryStore, RocksStore, Store, StoreError};
