/// Configuration descriptor for the sound engine
#[derive(Debug, Clone)]
pub struct EngineDesc {
    /// Sample rate of the render graph. Decoded assets are resampled to this rate.
    pub sample_rate: u32,
    /// Number of output channels (typically 2 for stereo)
    pub channels: u16,
    /// Frames requested from the device per callback
    pub block_size: usize,
}

impl Default for EngineDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            block_size: 1024,
        }
    }
}
