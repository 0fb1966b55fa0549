pub mod fanin;
pub mod reader;
pub mod rollup;
pub mod sampler;

pub use fanin::{fan_in, FanInReport};
pub use reader::SummaryReader;
pub use rollup::{DeviceRollup, GenerationRollup, RollupError, RollupReport, RoomRollup};
pub use sampler::{SamplePass, Sampler};
