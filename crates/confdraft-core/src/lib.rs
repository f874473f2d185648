// Library root: the draft engine, its persistence layer, and configuration.

pub mod catalog;
pub mod config;
pub mod db;
pub mod draft;
