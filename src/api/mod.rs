//! Local read-only status endpoints

pub mod rest;
