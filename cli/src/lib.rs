//! A3S Refs CLI - attach artifacts to OCI images and indexes.

pub mod commands;
pub mod output;
