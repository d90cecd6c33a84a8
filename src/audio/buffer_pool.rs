// BufferPool - lock-free pool of raw interleaved frames with dual SPSC queues
//
// The capture callback must never allocate, so every raw frame buffer is
// created up front and circulates between two rtrb ring buffers:
// - DATA queue: capture thread pushes filled frames, pipeline worker consumes
// - POOL queue: worker returns drained frames, capture thread recycles
//
// A frame is `CHUNK * RAW_CHANNELS` interleaved i16 samples.

use rtrb::{Consumer, Producer};

/// Raw interleaved frame buffer
pub type RawFrameBuffer = Vec<i16>;

/// Both ends of both queues, before being handed to their threads
pub struct BufferPoolChannels {
    /// Producer for sending filled frames to the pipeline worker
    pub data_producer: Producer<RawFrameBuffer>,
    /// Consumer for receiving filled frames in the pipeline worker
    pub data_consumer: Consumer<RawFrameBuffer>,
    /// Producer for returning drained frames from the worker
    pub pool_producer: Producer<RawFrameBuffer>,
    /// Consumer for retrieving empty frames in the capture thread
    pub pool_consumer: Consumer<RawFrameBuffer>,
}

/// Queue ends owned by the capture side
pub struct CaptureChannels {
    pub data_producer: Producer<RawFrameBuffer>,
    pub pool_consumer: Consumer<RawFrameBuffer>,
}

/// Queue ends owned by the pipeline worker
pub struct WorkerChannels {
    pub data_consumer: Consumer<RawFrameBuffer>,
    pub pool_producer: Producer<RawFrameBuffer>,
}

impl BufferPoolChannels {
    /// Split into the capture half and the worker half
    pub fn split_for_threads(self) -> (CaptureChannels, WorkerChannels) {
        (
            CaptureChannels {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
            },
            WorkerChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

/// Lock-free frame pool using dual SPSC ring buffers
pub struct BufferPool;

impl BufferPool {
    /// Pre-allocate `buffer_count` zeroed frames of `frame_len` samples
    ///
    /// # Panics
    /// Panics if buffer_count is 0 or frame_len is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, frame_len: usize) -> BufferPoolChannels {
        assert!(buffer_count > 0, "buffer_count must be greater than 0");
        assert!(frame_len > 0, "frame_len must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        for _ in 0..buffer_count {
            // Capacity equals buffer_count, so this cannot fail
            let _ = pool_producer.push(vec![0_i16; frame_len]);
        }

        BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool_creation() {
        let mut channels = BufferPool::new(8, 64);

        let mut available = 0;
        while let Ok(frame) = channels.pool_consumer.pop() {
            assert_eq!(frame.len(), 64);
            available += 1;
        }
        assert_eq!(available, 8);
        assert!(channels.data_consumer.pop().is_err());
    }

    #[test]
    fn test_frame_circulation_across_split() {
        let (mut capture, mut worker) = BufferPool::new(2, 16).split_for_threads();

        for i in 0..2 {
            let mut frame = capture.pool_consumer.pop().unwrap();
            frame[0] = i as i16 + 1;
            capture.data_producer.push(frame).unwrap();
        }
        assert!(capture.pool_consumer.pop().is_err(), "pool exhausted");

        for i in 0..2 {
            let frame = worker.data_consumer.pop().unwrap();
            assert_eq!(frame[0], i as i16 + 1);
            worker.pool_producer.push(frame).unwrap();
        }

        assert!(capture.pool_consumer.pop().is_ok());
        assert!(capture.pool_consumer.pop().is_ok());
    }

    #[test]
    fn test_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CaptureChannels>();
        assert_send::<WorkerChannels>();
    }

    #[test]
    #[should_panic(expected = "buffer_count must be greater than 0")]
    fn test_zero_buffer_count_panics() {
        BufferPool::new(0, 1024);
    }
}
