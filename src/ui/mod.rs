// UI module - GUI wiring and the event loop bridge
//
// This module contains:
// - SlintScheduler: plugs the dispatcher into Slint's event loop
// - panel: pure view-model helpers for the operations panel
// - UiController: wires the window to the registry and the services

pub mod bridge;
pub mod controller;
pub mod panel;

pub use bridge::SlintScheduler;
pub use controller::UiController;
