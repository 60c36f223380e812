//! Shared integration test helpers

#![allow(dead_code)]

pub mod audio_generator;
pub mod fixtures;
