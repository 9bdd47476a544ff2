pub mod admin;
pub mod health;
pub mod payment;
pub mod public;
