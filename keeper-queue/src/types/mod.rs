pub mod ctx;
pub mod events;
pub mod ids;
pub mod message;
pub mod record;
pub mod verdict;

pub use ctx::JobContext;
pub use events::JobEvent;
pub use ids::{JobId, ReservationId};
pub use message::NewJob;
pub use record::{JobRecord, JobStatus};
pub use verdict::Verdict;
