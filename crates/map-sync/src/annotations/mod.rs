//! Annotation lifecycle: bulk materialize, zoom-driven resize, highlight
//! bounces and teardown.
//!
//! - `sizing` - Zoom to icon-size curve
//! - `index` - Bijective complaint id <-> handle maps
//! - `manager` - The lifecycle manager that owns every live annotation

mod index;
mod manager;
mod sizing;

pub use index::HandleIndex;
pub use manager::{AnnotationLifecycleManager, MaterializeReport};
pub use sizing::IconSizing;
