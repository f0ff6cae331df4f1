pub mod slots;
pub mod store;
