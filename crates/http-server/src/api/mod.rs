pub mod address;
pub mod inbox;
pub mod incoming;
pub mod ws;
