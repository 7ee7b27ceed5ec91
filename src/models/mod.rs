pub mod api;
pub mod campaign;
pub mod contact;
pub mod line;
