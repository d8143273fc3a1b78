//! Device snapshot model: lenient decoding of a raw device tree plus the
//! injected clock every deriver reads time from.

pub mod lenient;
pub mod model;
pub mod time;

pub use lenient::OrderedMap;
pub use model::DeviceSnapshot;
pub use time::Clock;
