//! Test fixture: serializes model files in the on-disk binary format
//!
//! The writer mirrors the format the codec reads: common header, packed
//! meta block, weight count, payload sections padded to the quantization
//! width from the start of the file, and a trailing CRC-32. `swapped`
//! serialization reverses every multi-byte field, producing the file a
//! host of the opposite endianness would have written.

#![allow(dead_code)]

use neurite_engine::format;

/// Weight table at the model's quantization level
pub enum Weights {
    Q8(Vec<i8>),
    Q16(Vec<i16>),
    F32(Vec<f32>),
}

/// Activation coefficient table at the model's quantization level
pub enum Coefficients {
    Q8(Vec<u8>),
    Q16(Vec<u16>),
    F32(Vec<f32>),
}

/// In-memory description of a model file
pub struct ModelFile {
    pub options: u8,
    pub task: u8,
    pub inputs_dim: u16,
    pub outputs_dim: u16,
    pub neurons_count: u16,
    pub inputs_max: Vec<f32>,
    pub inputs_min: Vec<f32>,
    pub outputs_max: Vec<f32>,
    pub outputs_min: Vec<f32>,
    pub outputs_log_offset: Option<Vec<f32>>,
    pub output_labels: Vec<u16>,
    pub int_link_counts: Vec<u16>,
    pub ext_link_counts: Vec<u16>,
    pub links: Vec<u16>,
    pub weights: Weights,
    pub coefficients: Coefficients,
}

impl ModelFile {
    pub fn quantization(&self) -> u8 {
        match self.weights {
            Weights::Q8(_) => 8,
            Weights::Q16(_) => 16,
            Weights::F32(_) => 32,
        }
    }

    /// Serialize in the host's byte order
    pub fn to_bytes(&self) -> Vec<u8> {
        self.serialize(false)
    }

    /// Serialize as a host of the opposite endianness would have
    pub fn to_bytes_swapped(&self) -> Vec<u8> {
        self.serialize(true)
    }

    fn serialize(&self, swapped: bool) -> Vec<u8> {
        let mut w = Writer {
            bytes: Vec::new(),
            swapped,
        };
        let align = self.quantization() as usize / 8;

        // header
        w.bytes.extend_from_slice(b"nb");
        w.push_u8(5); // model type
        w.push_u8(1); // version
        w.push_u16(format::BOM);

        // meta block and weight count
        w.push_u8(self.options);
        w.push_u8(self.task);
        w.push_u16(self.inputs_dim);
        w.push_u16(self.outputs_dim);
        w.push_u8(self.quantization());
        w.push_u8(0); // reserved
        w.push_u16(self.neurons_count);
        w.push_u32(self.links.len() as u32);

        // payload sections, aligned to the quantization width
        for value in self.inputs_max.iter().chain(&self.inputs_min) {
            w.push_f32(*value);
        }
        for value in self.outputs_max.iter().chain(&self.outputs_min) {
            w.push_f32(*value);
        }
        if let Some(offsets) = &self.outputs_log_offset {
            for value in offsets {
                w.push_f32(*value);
            }
        }

        w.align_to(align);
        for label in &self.output_labels {
            w.push_u16(*label);
        }

        w.align_to(align);
        for count in self.int_link_counts.iter().chain(&self.ext_link_counts) {
            w.push_u16(*count);
        }

        w.align_to(align);
        for link in &self.links {
            w.push_u16(*link);
        }

        w.align_to(align);
        match &self.weights {
            Weights::Q8(values) => {
                for value in values {
                    w.push_u8(*value as u8);
                }
            }
            Weights::Q16(values) => {
                for value in values {
                    w.push_u16(*value as u16);
                }
            }
            Weights::F32(values) => {
                for value in values {
                    w.push_f32(*value);
                }
            }
        }

        w.align_to(align);
        match &self.coefficients {
            Coefficients::Q8(values) => {
                for value in values {
                    w.push_u8(*value);
                }
            }
            Coefficients::Q16(values) => {
                for value in values {
                    w.push_u16(*value);
                }
            }
            Coefficients::F32(values) => {
                for value in values {
                    w.push_f32(*value);
                }
            }
        }

        let crc = format::crc32(&w.bytes);
        w.push_u32(crc);
        w.bytes
    }
}

struct Writer {
    bytes: Vec<u8>,
    swapped: bool,
}

impl Writer {
    fn push_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn push_u16(&mut self, value: u16) {
        let value = if self.swapped {
            value.swap_bytes()
        } else {
            value
        };
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    fn push_u32(&mut self, value: u32) {
        let value = if self.swapped {
            value.swap_bytes()
        } else {
            value
        };
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    fn push_f32(&mut self, value: f32) {
        self.push_u32(value.to_bits());
    }

    fn align_to(&mut self, align: usize) {
        while self.bytes.len() % align != 0 {
            self.bytes.push(0);
        }
    }
}

/// Recompute the trailing CRC after a deliberate mutation
pub fn refresh_crc(bytes: &mut [u8]) {
    let body = bytes.len() - 4;
    let crc = format::crc32(&bytes[..body]).to_ne_bytes();
    bytes[body..].copy_from_slice(&crc);
}

/// Per-channel 0..1 limits for `dim` inputs
pub fn unit_limits(dim: u16) -> (Vec<f32>, Vec<f32>) {
    (vec![1.0; dim as usize], vec![0.0; dim as usize])
}

/// A single-neuron float regression model fed by input 0
pub fn single_neuron_f32(weight: f32, coefficient: f32) -> ModelFile {
    let (inputs_max, inputs_min) = unit_limits(2);
    ModelFile {
        options: 0,
        task: 2, // regression
        inputs_dim: 2,
        outputs_dim: 1,
        neurons_count: 1,
        inputs_max,
        inputs_min,
        outputs_max: vec![1.0],
        outputs_min: vec![0.0],
        outputs_log_offset: None,
        output_labels: vec![0],
        int_link_counts: vec![0],
        ext_link_counts: vec![1],
        links: vec![0],
        weights: Weights::F32(vec![weight]),
        coefficients: Coefficients::F32(vec![coefficient]),
    }
}

/// A single-neuron 8-bit model fed by input 0
pub fn single_neuron_q8(options: u8, weight: i8, coefficient: u8) -> ModelFile {
    let (inputs_max, inputs_min) = unit_limits(2);
    ModelFile {
        options,
        task: 2,
        inputs_dim: 2,
        outputs_dim: 1,
        neurons_count: 1,
        inputs_max,
        inputs_min,
        outputs_max: vec![1.0],
        outputs_min: vec![0.0],
        outputs_log_offset: None,
        output_labels: vec![0],
        int_link_counts: vec![0],
        ext_link_counts: vec![1],
        links: vec![0],
        weights: Weights::Q8(vec![weight]),
        coefficients: Coefficients::Q8(vec![coefficient]),
    }
}

/// A single-neuron 16-bit model fed by input 0
pub fn single_neuron_q16(options: u8, weight: i16, coefficient: u16) -> ModelFile {
    let (inputs_max, inputs_min) = unit_limits(2);
    ModelFile {
        options,
        task: 2,
        inputs_dim: 2,
        outputs_dim: 1,
        neurons_count: 1,
        inputs_max,
        inputs_min,
        outputs_max: vec![1.0],
        outputs_min: vec![0.0],
        outputs_log_offset: None,
        output_labels: vec![0],
        int_link_counts: vec![0],
        ext_link_counts: vec![1],
        links: vec![0],
        weights: Weights::Q16(vec![weight]),
        coefficients: Coefficients::Q16(vec![coefficient]),
    }
}

/// Two-neuron 8-bit model with both internal and external links; neuron 1
/// is the output (index N-1)
pub fn two_neuron_q8() -> ModelFile {
    let (inputs_max, inputs_min) = unit_limits(3);
    ModelFile {
        options: 0,
        task: 2,
        inputs_dim: 3,
        outputs_dim: 1,
        neurons_count: 2,
        inputs_max,
        inputs_min,
        outputs_max: vec![1.0],
        outputs_min: vec![0.0],
        outputs_log_offset: None,
        output_labels: vec![1],
        int_link_counts: vec![0, 1],
        ext_link_counts: vec![2, 1],
        // internal links first (neuron 1 <- neuron 0), then the external
        // links of neuron 0 and neuron 1
        links: vec![0, 0, 1, 1],
        weights: Weights::Q8(vec![100, 64, -32, 20]),
        coefficients: Coefficients::Q8(vec![4, 3]),
    }
}
