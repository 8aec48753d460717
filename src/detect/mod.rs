mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ColorBackend, ColorRule, Hue, ScriptCue, ScriptedBackend};
pub use registry::{BackendRegistry, SharedBackend};
pub use result::Detection;
