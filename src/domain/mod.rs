pub mod cameras;
pub mod emotions;
