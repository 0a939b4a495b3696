//! Content-safety layer: the shared pattern registry and the firewall that
//! applies it to stage output.

pub mod firewall;
pub mod patterns;

pub use firewall::{ContentFirewall, FirewallStage, SanitizeOutcome};
pub use patterns::{PatternCategory, PatternRegistry, REGISTRY_VERSION};
