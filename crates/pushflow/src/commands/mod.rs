pub mod extract;
pub mod push;
