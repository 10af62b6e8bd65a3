//! Authentication and authorization.
//!
//! Identity is proven by a session cookie issued at login. Each session
//! token gets an authorization gate ([`gate::AuthGate`]) that tracks the
//! session and its user's role, created on demand by the
//! [`registry::SessionGates`] registry and updated through session
//! lifecycle events from the auth service. Route guards
//! ([`middleware`]) consult the gate and redirect when access is denied.
//!
//! Roles ([`role::Role`]) are fixed at signup and stored in the profile
//! store; anything unresolvable degrades to a role that grants nothing.

pub mod gate;
pub mod middleware;
pub mod password;
pub mod registry;
pub mod role;
pub mod session;
