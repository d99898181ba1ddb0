mod login_gate;
mod metrics_layer;
mod session_extractor;
mod tracing_layer;

pub use login_gate::*;
pub use metrics_layer::*;
pub use session_extractor::*;
pub use tracing_layer::*;
