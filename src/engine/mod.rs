//! Core engine — round lifecycle, settlement, and the public service.

pub mod registry;
pub mod service;
pub mod settlement;
pub mod timer;
