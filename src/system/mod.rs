//! Runtime plumbing around the tracker: clock, process-wide request
//! throttle, the background poll worker and the camera/classifier
//! collaborator traits it drives.

pub mod clock;
pub mod messages;
pub mod poller;
pub mod shared_state;
pub mod sources;
pub mod throttle;

pub use clock::{Clock, ManualClock, SystemClock};
pub use messages::PollResultMsg;
pub use poller::{PollRequest, PollingConfig, spawn_poll_worker};
pub use shared_state::PollShared;
pub use sources::{CameraSource, ObjectClassifier};
pub use throttle::RequestThrottle;
