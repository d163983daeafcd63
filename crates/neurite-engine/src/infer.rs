//! Quantized inference kernels
//!
//! One kernel per quantization level. Each walks the neurons in their
//! stored topological order, accumulates weighted contributions from
//! already-computed neurons (internal links) and from the raw input vector
//! (external links), applies the sigmoid activation and finally gathers
//! the designated output neurons into the output buffer. The offset-table
//! element width is resolved once per call through a generic parameter, so
//! the per-neuron loops carry no width dispatch.

use crate::model::{Accumulators, LinkOffsets, Model, OffsetIndex};
use crate::sigmoid::fast_sigmoid_q8;
use crate::views::{U16View, U8View};

#[cfg(feature = "q16")]
use crate::sigmoid::fast_sigmoid_q16;

/// Largest value an input may carry into the fixed-point conversion
const MAX_INPUT: f32 = 0.999_999_9;

/// Activation shift constant for the 8-bit kernel
const KSHIFT_2: u32 = 2;

/// Activation shift constant for the 16-bit kernel
#[cfg(feature = "q16")]
const KSHIFT_10: u32 = 10;

/// Link tables shared by every kernel
#[derive(Clone, Copy)]
struct LinkTables<'b> {
    links: U16View<'b>,
    int_counts: U16View<'b>,
    ext_counts: U16View<'b>,
}

impl Model<'_> {
    /// Evaluate the network on `inputs`, returning the raw output buffer.
    ///
    /// `inputs` must hold at least [`Model::inputs_dim`] values, the last
    /// of them being the bias slot. Returns `None` instead of an error to
    /// keep the hot path branch-light. The returned slice lives in the
    /// model's output buffer and is overwritten by the next call.
    pub fn run_inference(&mut self, inputs: &[f32]) -> Option<&[f32]> {
        if inputs.len() < self.inputs_dim as usize {
            return None;
        }

        let Model {
            payload,
            sections,
            options,
            accumulators,
            offsets,
            output_buffer,
            ..
        } = self;

        let bytes = payload.bytes();
        let tables = LinkTables {
            links: sections.links(bytes),
            int_counts: sections.int_link_counts(bytes),
            ext_counts: sections.ext_link_counts(bytes),
        };
        let labels = sections.output_labels(bytes);
        let force_integer = options.force_integer();

        match accumulators {
            Accumulators::Q8(acc) => {
                let weights = sections.weights_i8(bytes);
                let coefficients = sections.coefficients_u8(bytes);
                match offsets {
                    LinkOffsets::U8 { int, ext } => {
                        run_q8(tables, weights, coefficients, int, ext, force_integer, acc, inputs)
                    }
                    LinkOffsets::U16 { int, ext } => {
                        run_q8(tables, weights, coefficients, int, ext, force_integer, acc, inputs)
                    }
                    LinkOffsets::U32 { int, ext } => {
                        run_q8(tables, weights, coefficients, int, ext, force_integer, acc, inputs)
                    }
                }
                for (idx, out) in output_buffer.iter_mut().enumerate() {
                    *out = f32::from(acc[labels.at(idx) as usize]) / 256.0;
                }
            }
            #[cfg(feature = "q16")]
            Accumulators::Q16(acc) => {
                let weights = sections.weights_i16(bytes);
                let coefficients = sections.coefficients_u16(bytes);
                match offsets {
                    LinkOffsets::U8 { int, ext } => {
                        run_q16(tables, weights, coefficients, int, ext, force_integer, acc, inputs)
                    }
                    LinkOffsets::U16 { int, ext } => {
                        run_q16(tables, weights, coefficients, int, ext, force_integer, acc, inputs)
                    }
                    LinkOffsets::U32 { int, ext } => {
                        run_q16(tables, weights, coefficients, int, ext, force_integer, acc, inputs)
                    }
                }
                for (idx, out) in output_buffer.iter_mut().enumerate() {
                    *out = f32::from(acc[labels.at(idx) as usize]) / 65536.0;
                }
            }
            #[cfg(feature = "q32")]
            Accumulators::F32(acc) => {
                let weights = sections.weights_f32(bytes);
                let coefficients = sections.coefficients_f32(bytes);
                match offsets {
                    LinkOffsets::U8 { int, ext } => {
                        run_f32(tables, weights, coefficients, int, ext, acc, inputs)
                    }
                    LinkOffsets::U16 { int, ext } => {
                        run_f32(tables, weights, coefficients, int, ext, acc, inputs)
                    }
                    LinkOffsets::U32 { int, ext } => {
                        run_f32(tables, weights, coefficients, int, ext, acc, inputs)
                    }
                }
                for (idx, out) in output_buffer.iter_mut().enumerate() {
                    *out = acc[labels.at(idx) as usize];
                }
            }
        }

        Some(output_buffer.as_slice())
    }
}

#[allow(clippy::too_many_arguments)]
fn run_q8<T: OffsetIndex>(
    tables: LinkTables<'_>,
    weights: crate::views::I8View<'_>,
    coefficients: U8View<'_>,
    int_offsets: &[T],
    ext_offsets: &[T],
    force_integer: bool,
    acc: &mut [u8],
    inputs: &[f32],
) {
    acc.fill(0);

    for neuron in 0..acc.len() {
        let mut sum: i32 = 0;

        let offset = int_offsets[neuron].index();
        for idx in 0..tables.int_counts.at(neuron) as usize {
            let weight = i32::from(weights.at(offset + idx));
            let value = i32::from(acc[tables.links.at(offset + idx) as usize]);
            sum += weight * value;
        }

        let offset = ext_offsets[neuron].index();
        for idx in 0..tables.ext_counts.at(neuron) as usize {
            let weight = i32::from(weights.at(offset + idx));
            let input = inputs[tables.links.at(offset + idx) as usize];
            let input = if input > MAX_INPUT { MAX_INPUT } else { input };
            sum += weight * (input * 256.0) as i32;
        }

        let arg = (i32::from(coefficients.at(neuron)) * sum) >> (8 + KSHIFT_2 - 1);

        acc[neuron] = if force_integer {
            fast_sigmoid_q8(-arg)
        } else {
            let qs = arg as f32 / 256.0;
            let value = 1.0 / (1.0 + (-qs).exp());
            let value = if value > MAX_INPUT { MAX_INPUT } else { value };
            (value * 256.0) as u8
        };
    }
}

#[cfg(feature = "q16")]
#[allow(clippy::too_many_arguments)]
fn run_q16<T: OffsetIndex>(
    tables: LinkTables<'_>,
    weights: crate::views::I16View<'_>,
    coefficients: U16View<'_>,
    int_offsets: &[T],
    ext_offsets: &[T],
    force_integer: bool,
    acc: &mut [u16],
    inputs: &[f32],
) {
    acc.fill(0);

    for neuron in 0..acc.len() {
        let mut sum: i64 = 0;

        let offset = int_offsets[neuron].index();
        for idx in 0..tables.int_counts.at(neuron) as usize {
            let weight = i64::from(weights.at(offset + idx));
            let value = i64::from(acc[tables.links.at(offset + idx) as usize]);
            sum += weight * value;
        }

        let offset = ext_offsets[neuron].index();
        for idx in 0..tables.ext_counts.at(neuron) as usize {
            let weight = i64::from(weights.at(offset + idx));
            let input = inputs[tables.links.at(offset + idx) as usize];
            let input = if input > MAX_INPUT { MAX_INPUT } else { input };
            sum += weight * (input * 65536.0) as i64;
        }

        let arg = (i64::from(coefficients.at(neuron)) * sum) >> (16 + KSHIFT_10 - 1);

        acc[neuron] = if force_integer {
            fast_sigmoid_q16(-arg)
        } else {
            let qs = arg as f32 / 65536.0;
            let value = 1.0 / (1.0 + (-qs).exp());
            let value = if value > MAX_INPUT { MAX_INPUT } else { value };
            (value * 65536.0) as u16
        };
    }
}

#[cfg(feature = "q32")]
fn run_f32<T: OffsetIndex>(
    tables: LinkTables<'_>,
    weights: crate::views::F32View<'_>,
    coefficients: crate::views::F32View<'_>,
    int_offsets: &[T],
    ext_offsets: &[T],
    acc: &mut [f32],
    inputs: &[f32],
) {
    acc.fill(0.0);

    for neuron in 0..acc.len() {
        let mut sum: f64 = 0.0;

        let offset = int_offsets[neuron].index();
        for idx in 0..tables.int_counts.at(neuron) as usize {
            let weight = f64::from(weights.at(offset + idx));
            let value = f64::from(acc[tables.links.at(offset + idx) as usize]);
            sum += weight * value;
        }

        let offset = ext_offsets[neuron].index();
        for idx in 0..tables.ext_counts.at(neuron) as usize {
            let weight = f64::from(weights.at(offset + idx));
            let value = f64::from(inputs[tables.links.at(offset + idx) as usize]);
            sum += weight * value;
        }

        let coefficient = f64::from(coefficients.at(neuron));
        acc[neuron] = (1.0 / (1.0 + (-coefficient * sum).exp())) as f32;
    }
}
