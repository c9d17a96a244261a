//! Per-client token bucket rate limiting.

mod bucket;
mod clock;
mod registry;

pub use bucket::TokenBucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use registry::{BucketHandle, SweepHandle, Visitor, VisitorRegistry};
