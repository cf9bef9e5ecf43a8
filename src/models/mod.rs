pub mod actor;
pub mod home;
pub mod incident;
pub mod photo;
pub mod resident;
