pub mod connection;
pub mod job_view;
pub mod models;
pub mod poller;
pub mod presentation;
pub mod reconciler;
pub mod source;
pub mod status;
pub mod stream;
pub mod timeline;
pub mod watcher;

pub use connection::{ConnectionMachine, ConnectionState, Transition};
pub use job_view::{JobView, WatchSettings};
pub use models::{Job, MergedView, StreamEvent};
pub use poller::SnapshotPoller;
pub use presentation::{Badge, ColorClass, TextContrast, badge, badge_for};
pub use reconciler::{Reconciler, Teardown, ViewUpdate};
pub use source::{FrameStream, JobSource, TransportError};
pub use status::{Status, StatusValue, UnknownStatus};
pub use stream::{ReconnectPolicy, StreamConnectionManager, StreamFrame, parse_frame};
pub use timeline::Timeline;
pub use watcher::JobWatcher;
