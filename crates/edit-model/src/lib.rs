//! Montage Edit Model
//!
//! Defines the data contracts shared by the render pipeline and the
//! editor-facing managers:
//! - **Operations:** Typed video transformations (color, LUT, overlays, audio, speed, fades)
//! - **Profiles:** Output geometry, codec, quality tier, and audio ducking
//! - **Requests:** Editor render state lowered into ordered operations
//! - **Jobs:** Render job lifecycle and produced artifacts
//! - **Snapshots:** Opaque editor states captured for undo/redo
//!
//! Overlay positions and sizes are percentages of the output frame so they
//! survive a change of export resolution.

pub mod job;
pub mod operation;
pub mod profile;
pub mod request;
pub mod snapshot;

pub use job::*;
pub use operation::*;
pub use profile::*;
pub use request::*;
pub use snapshot::*;
