pub mod call;
pub mod can_authenticate;
pub mod delete;
pub mod read;
pub mod write;
