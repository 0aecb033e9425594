pub mod batch;
pub mod core;
pub mod document;
pub mod notify;
pub mod render;
pub mod template;
