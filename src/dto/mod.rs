pub mod auth;
pub mod orders;
pub mod payouts;
pub mod pickup;
pub mod returns;
