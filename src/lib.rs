//! Watches a folder for incoming photos, classifies each as defect or not, and archives or
//! deletes it accordingly.

pub mod app_dirs;
pub mod classifier;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod preferences;
pub mod session;
