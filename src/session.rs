//! Session credential types: redacted token secrets and the persisted credential record.

pub mod credential;

pub use credential::*;
