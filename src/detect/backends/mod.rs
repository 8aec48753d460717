pub mod color;
pub mod scripted;

pub use color::{ColorBackend, ColorRule, Hue};
pub use scripted::{ScriptCue, ScriptedBackend};
