/*!
Core modules of the drone scanner
*/

pub mod config;
pub mod detection_engine;
pub mod event_system;
pub mod output_plugins;
pub mod state_manager;
pub mod supervisor;
pub mod tracker;
