//! Collaborators the portal talks to: the browser's position, photo storage,
//! notification delivery and staff sign-in.

pub mod auth;
pub mod delivery;
pub mod geo;
pub mod photo;
