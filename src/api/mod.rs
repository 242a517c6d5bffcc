//! API handlers for the library REST endpoints

pub mod books;
pub mod health;
pub mod issues;
pub mod openapi;
pub mod reminders;
pub mod students;
