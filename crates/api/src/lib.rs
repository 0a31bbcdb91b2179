pub mod accounts;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod directory;
pub mod error;
pub mod money;
pub mod orders;
pub mod permission;
pub mod purchases;
pub mod schema;
pub mod seed;
