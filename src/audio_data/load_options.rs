#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertToMono {
    /// Keep original channels: stereo if input is stereo, mono if input is mono
    Original,
    /// Force mono: if input is stereo combine both channels into mono
    ForceMono,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// How to handle mono conversion
    pub convert_to_mono: ConvertToMono,
    /// Resample decoded audio to this rate; `None` keeps the file's rate
    pub target_sample_rate: Option<u32>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            convert_to_mono: ConvertToMono::Original,
            target_sample_rate: None,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_to_mono(mut self, convert: ConvertToMono) -> Self {
        self.convert_to_mono = convert;
        self
    }

    pub fn target_sample_rate(mut self, rate: u32) -> Self {
        self.target_sample_rate = Some(rate);
        self
    }
}
