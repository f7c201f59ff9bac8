pub mod api;
pub mod db;
pub mod media;
pub mod process;
pub mod sync;
