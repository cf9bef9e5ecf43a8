pub mod audit;
pub mod blob;
pub mod notification;
