pub mod admin;
pub mod inbox;
