//! Domain layer
//!
//! Entities, the traits storage backends implement, and the signature
//! matching services. Nothing here touches the operating system directly.

pub mod entities;
pub mod repositories;
pub mod services;
