#![doc = include_str!("../README.md")]

pub mod bootstrap;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod paths;
mod refresh;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenient access
pub use bootstrap::{Bootstrap, BootstrapTask};
pub use cache::{FileCache, MemoryCache, SelectedPetCache};
pub use client::SessionClient;
pub use config::{DeployMode, RoutePaths, SessionConfig};
pub use error::Error;
pub use guard::{decide, evaluate, Decision, OnboardingStep, RouteSpec};
pub use paths::PathPolicy;
pub use session::{AuthPhase, SessionHandle, SessionState};
pub use transport::{ApiClient, RequestSpec};
pub use types::{
    DemoScenario, LoginTokens, MemberId, OnboardingProgress, PetId, UnauthReason, WhoAmI,
};
