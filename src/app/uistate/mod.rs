pub mod dumpsys_parser;
pub mod geometry;
pub mod index;
pub mod models;
pub mod provider;
pub mod tap;
pub mod xml_parser;
