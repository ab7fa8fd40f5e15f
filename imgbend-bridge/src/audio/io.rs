//! Per-callback port buffer access
//!
//! [`BlockIo`] is what the engine sees of the audio subsystem during one
//! callback: N input port buffers and N output port buffers, all `frames()`
//! long, readable and writable synchronously within the invocation.

/// Port buffers for one callback invocation
pub trait BlockIo {
    /// Frames in this invocation (identical for every port)
    fn frames(&self) -> usize;

    fn input_ports(&self) -> usize;

    fn output_ports(&self) -> usize;

    fn input(&self, port: usize) -> &[f32];

    /// Inputs are writable so a stopping engine can mark them with the abort fill
    fn input_mut(&mut self, port: usize) -> &mut [f32];

    fn output_mut(&mut self, port: usize) -> &mut [f32];
}

/// Owned, non-interleaved port buffers.
///
/// Used as scratch space by interleaved hosts and directly by the loopback
/// host and tests.
#[derive(Debug, Clone)]
pub struct BufferIo {
    frames: usize,
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
}

impl BufferIo {
    /// `ports` inputs and `ports` outputs of `frames` zeroed samples each
    pub fn new(ports: usize, frames: usize) -> Self {
        Self {
            frames,
            inputs: vec![vec![0.0; frames]; ports],
            outputs: vec![vec![0.0; frames]; ports],
        }
    }

    /// Change the frame count. Only reallocates when the size actually changes.
    pub fn set_frames(&mut self, frames: usize) {
        if frames == self.frames {
            return;
        }
        self.frames = frames;
        for port in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            port.resize(frames, 0.0);
        }
    }

    pub fn inputs(&self) -> &[Vec<f32>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Vec<f32>] {
        &self.outputs
    }

    /// Overwrite input port `port`; extra source samples are ignored, missing ones zeroed
    pub fn set_input(&mut self, port: usize, samples: &[f32]) {
        let dst = &mut self.inputs[port];
        let n = samples.len().min(dst.len());
        dst[..n].copy_from_slice(&samples[..n]);
        dst[n..].fill(0.0);
    }

    /// Load frame-interleaved samples into the input ports.
    ///
    /// Returns the number of whole frames taken from `src`; remaining frames are zeroed.
    pub fn load_inputs_interleaved(&mut self, src: &[f32]) -> usize {
        let ports = self.inputs.len();
        if ports == 0 {
            return 0;
        }
        let mut loaded = 0;
        for (i, frame) in src.chunks_exact(ports).take(self.frames).enumerate() {
            for (port, &s) in frame.iter().enumerate() {
                self.inputs[port][i] = s;
            }
            loaded += 1;
        }
        for port in self.inputs.iter_mut() {
            port[loaded..].fill(0.0);
        }
        loaded
    }

    /// Write the output ports frame-interleaved into `dst`
    pub fn store_outputs_interleaved(&self, dst: &mut [f32]) {
        let ports = self.outputs.len();
        if ports == 0 {
            return;
        }
        for (i, frame) in dst.chunks_exact_mut(ports).take(self.frames).enumerate() {
            for (port, s) in frame.iter_mut().enumerate() {
                *s = self.outputs[port][i];
            }
        }
    }
}

impl BlockIo for BufferIo {
    fn frames(&self) -> usize {
        self.frames
    }

    fn input_ports(&self) -> usize {
        self.inputs.len()
    }

    fn output_ports(&self) -> usize {
        self.outputs.len()
    }

    fn input(&self, port: usize) -> &[f32] {
        &self.inputs[port]
    }

    fn input_mut(&mut self, port: usize) -> &mut [f32] {
        &mut self.inputs[port]
    }

    fn output_mut(&mut self, port: usize) -> &mut [f32] {
        &mut self.outputs[port]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave_round_trip() {
        let mut io = BufferIo::new(2, 3);
        let loaded = io.load_inputs_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(loaded, 3);
        assert_eq!(io.input(0), &[1.0, 3.0, 5.0]);
        assert_eq!(io.input(1), &[2.0, 4.0, 6.0]);

        io.output_mut(0).copy_from_slice(&[1.0, 3.0, 5.0]);
        io.output_mut(1).copy_from_slice(&[2.0, 4.0, 6.0]);
        let mut out = [0.0; 6];
        io.store_outputs_interleaved(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_short_capture_is_zero_padded() {
        let mut io = BufferIo::new(1, 4);
        io.set_input(0, &[9.0; 4]);
        assert_eq!(io.load_inputs_interleaved(&[1.0, 2.0]), 2);
        assert_eq!(io.input(0), &[1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_set_frames_resizes_every_port() {
        let mut io = BufferIo::new(2, 4);
        io.set_frames(8);
        assert_eq!(io.frames(), 8);
        assert!(io.inputs().iter().chain(io.outputs()).all(|p| p.len() == 8));
    }
}
