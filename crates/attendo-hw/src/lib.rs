//! attendo-hw — V4L2 camera access for the attendance kiosk.
//!
//! The camera is a per-session singleton: opened once when the kiosk session
//! starts, dropped (and thereby released) when the session ends or the loop
//! halts on a fatal error.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, PixelFormat};
pub use frame::Frame;
