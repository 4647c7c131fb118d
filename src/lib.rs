pub mod acquisition;
pub mod app;
pub mod config;
pub mod coordinates;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod formats;
pub mod fs_util;
pub mod geometry;
pub mod output;
pub mod pattern;
pub mod report;
pub mod store;
pub mod tilt_series;
pub mod tui;
