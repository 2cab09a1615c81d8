pub mod client;
pub mod contact;
pub mod public;

pub use client::{Backend, HttpBackend};
pub use contact::{ContactForm, submit_contact};
