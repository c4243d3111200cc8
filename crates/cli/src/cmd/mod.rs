pub mod course;
pub mod db;
pub mod permit;
pub mod stats;
