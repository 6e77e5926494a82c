//! Types shared by the Storyloom crates: the domain model, API request and
//! response bodies, and the JWT claims carried by access and refresh tokens.

pub mod api;
pub mod models;
