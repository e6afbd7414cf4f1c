pub mod image;
pub mod isa;
pub mod label;
pub mod object;
pub mod resource;
