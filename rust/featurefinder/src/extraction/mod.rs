pub mod background;
pub mod peak_extractor;
pub mod resampling;
pub mod wavelet;

pub use background::BackgroundRemover;
pub use peak_extractor::WaveletPeakExtractor;
pub use resampling::SpectrumResampler;
