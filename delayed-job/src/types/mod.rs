pub mod ids;
pub mod kind;
pub mod record;
pub mod events;

pub use ids::JobId;
pub use kind::CollectionKind;
pub use record::{timestamp_now, JobRecord};
pub use events::{EventKind, JobEvent};
