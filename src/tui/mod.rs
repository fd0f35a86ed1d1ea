//! TUI module for terminal user interfaces

mod batch_view;

pub use batch_view::BatchApp;
