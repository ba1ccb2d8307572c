//! Contains utilities for presenting measurements

pub mod presentable_measurements;
