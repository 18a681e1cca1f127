use crate::audio_graph::AnalysisTap;
use crate::config::EngineConfig;
use crate::dsp::detect_pitch_yin;
use crate::error::EstimateError;
use std::time::Duration;

/// How long one request waits for fresh audio before answering "no pitch".
const READY_TIMEOUT: Duration = Duration::from_millis(250);

/// Pitch estimation capability. One request at a time, issued from the
/// pitch loop's own thread.
pub trait PitchEstimator: Send {
    /// `Ok(None)` means no detectable pitch right now.
    fn request_pitch(&mut self) -> Result<Option<f32>, EstimateError>;
}

/// Builds an estimator bound to one session's audio graph.
pub trait EstimatorFactory {
    fn build(&self, tap: AnalysisTap) -> Result<Box<dyn PitchEstimator>, EstimateError>;
}

impl<F> EstimatorFactory for F
where
    F: Fn(AnalysisTap) -> Result<Box<dyn PitchEstimator>, EstimateError>,
{
    fn build(&self, tap: AnalysisTap) -> Result<Box<dyn PitchEstimator>, EstimateError> {
        self(tap)
    }
}

/// Default estimator: YIN over the latest analysis window.
pub struct YinEstimator {
    tap: AnalysisTap,
    amplitude_threshold: f32,
    min_hz: f32,
    max_hz: f32,
}

impl YinEstimator {
    pub fn new(tap: AnalysisTap, config: &EngineConfig) -> Self {
        Self {
            tap,
            amplitude_threshold: config.amplitude_threshold,
            min_hz: config.min_frequency_hz,
            max_hz: config.max_frequency_hz,
        }
    }
}

impl PitchEstimator for YinEstimator {
    fn request_pitch(&mut self) -> Result<Option<f32>, EstimateError> {
        if !self.tap.wait_ready(READY_TIMEOUT)? {
            return Ok(None);
        }
        let Some(frame) = self.tap.frame() else {
            return Ok(None);
        };
        Ok(detect_pitch_yin(
            &frame,
            self.tap.sample_rate(),
            self.amplitude_threshold,
            self.min_hz,
            self.max_hz,
        ))
    }
}

pub struct YinEstimatorFactory {
    config: EngineConfig,
}

impl YinEstimatorFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EstimatorFactory for YinEstimatorFactory {
    fn build(&self, tap: AnalysisTap) -> Result<Box<dyn PitchEstimator>, EstimateError> {
        let sr = tap.sample_rate() as f32;
        if sr <= 0.0 {
            return Err(EstimateError::Failed("capture stream has no sample rate".into()));
        }
        // The window must hold two periods of the lowest frequency
        let needed = (2.0 * sr / self.config.min_frequency_hz).ceil() as usize;
        if tap.window_size() < needed {
            return Err(EstimateError::Failed(format!(
                "analysis window of {} samples cannot resolve {} Hz at {} Hz (need {})",
                tap.window_size(),
                self.config.min_frequency_hz,
                tap.sample_rate(),
                needed
            )));
        }
        Ok(Box::new(YinEstimator::new(tap, &self.config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_graph::AudioGraph;
    use crate::dsp::test_helpers::sine_wave;
    use crate::encoder::WavEncoder;
    use crate::types::AudioChunk;
    use crossbeam_channel::bounded;

    fn open_graph(window: usize) -> (crossbeam_channel::Sender<AudioChunk>, AudioGraph) {
        let (tx, rx) = bounded(16);
        let graph = AudioGraph::open(rx, 44100, WavEncoder::shared(), window).unwrap();
        (tx, graph)
    }

    #[test]
    fn test_yin_estimator_reads_tap() {
        let (tx, graph) = open_graph(2048);
        let mut est = YinEstimatorFactory::new(EngineConfig::default())
            .build(graph.tap())
            .unwrap();

        tx.send(AudioChunk {
            timestamp_us: 0,
            samples: sine_wave(440.0, 0.5, 44100, 100),
            sample_rate: 44100,
        })
        .unwrap();
        let f = est.request_pitch().unwrap().expect("pitch");
        assert!((f - 440.0).abs() < 2.0, "got {f}");
    }

    #[test]
    fn test_no_audio_is_no_pitch_then_closed() {
        let (_tx, mut graph) = open_graph(2048);
        let mut est = YinEstimatorFactory::new(EngineConfig::default())
            .build(graph.tap())
            .unwrap();
        assert_eq!(est.request_pitch().unwrap(), None);
        graph.close();
        assert!(matches!(est.request_pitch(), Err(EstimateError::SourceClosed)));
    }

    #[test]
    fn test_factory_rejects_short_window() {
        let (_tx, graph) = open_graph(256);
        let result = YinEstimatorFactory::new(EngineConfig::default()).build(graph.tap());
        assert!(matches!(result, Err(EstimateError::Failed(_))));
    }

    #[test]
    fn test_closure_factory() {
        struct Fixed;
        impl PitchEstimator for Fixed {
            fn request_pitch(&mut self) -> Result<Option<f32>, EstimateError> {
                Ok(Some(330.0))
            }
        }
        let factory = |_tap: AnalysisTap| -> Result<Box<dyn PitchEstimator>, EstimateError> {
            Ok(Box::new(Fixed))
        };
        let (_tx, graph) = open_graph(64);
        let mut est = factory.build(graph.tap()).unwrap();
        assert_eq!(est.request_pitch().unwrap(), Some(330.0));
    }
}
