// Audio module - frame layout, lock-free buffer pool and live capture

pub mod buffer_pool;
pub mod frame;
#[cfg(feature = "live")]
pub mod capture;

pub use buffer_pool::{BufferPool, CaptureChannels, RawFrameBuffer, WorkerChannels};
pub use frame::{AudioFrame, ChannelMatrix, ChannelRemapper};
#[cfg(feature = "live")]
pub use capture::{list_input_devices, CpalCapture};
