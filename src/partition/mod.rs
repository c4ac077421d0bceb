pub mod ops;
pub mod size;
pub mod table;
