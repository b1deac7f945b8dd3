/*!
Core architecture modules for the event-driven privacy monitor
*/

pub mod config;
pub mod console;
pub mod detection_engine;
pub mod error;
pub mod event_system;
pub mod output_plugins;
pub mod state_manager;
pub mod tracker;
