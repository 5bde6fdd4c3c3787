// Layout configuration
pub mod config;

// WebSocket transport session
pub mod transport;

// Backend state sync client
pub mod backend;

// Key kinds
pub mod keys;

// Navigation stack and page orchestration
pub mod menu;

// Key image rendering
pub mod render;

// Display surfaces
pub mod frontend;

// Process wiring
pub mod app;
