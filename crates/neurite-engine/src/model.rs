//! Model state: payload storage, typed sections and per-inference scratch
//!
//! A loaded model is one aggregate. The immutable parameter tables live in
//! a payload that is either a privately owned arena or a zero-copy alias
//! into the caller's buffer; the mutable scratch (accumulators, output
//! buffer, link offset tables) is always freshly allocated. Dropping the
//! model releases everything it owns.

use std::ops::Range;

use crate::error::{ModelError, Result};
use crate::views::{F32View, I16View, I8View, U16View, U8View};

/// Sentinel in the log-offset table marking a channel without a log
/// transform; 0xFFFFFFFF as stored by the training tooling
pub(crate) const LOG_OFFSET_NONE: f32 = u32::MAX as f32;

/// Task the network was trained for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Multiclass classification
    MulticlassClassification,
    /// Binary classification
    BinaryClassification,
    /// Regression
    Regression,
}

impl TaskKind {
    pub(crate) fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::MulticlassClassification),
            1 => Ok(Self::BinaryClassification),
            2 => Ok(Self::Regression),
            other => Err(ModelError::inconsistent(format!(
                "unknown task kind {other}"
            ))),
        }
    }
}

/// Model option bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOptions(u8);

impl ModelOptions {
    /// One min/max pair is shared by every input channel
    pub const ONE_MINMAX_FOR_ALL_INPUTS: u8 = 1 << 7;
    /// Per-channel logarithmic output offsets are present
    pub const LOG_SCALE_OUTPUTS: u8 = 1 << 6;
    /// The bit-packed integer sigmoid is forced for integer kernels
    pub const FORCE_INTEGER_ACTIVATION: u8 = 1 << 5;

    /// Wrap a raw option byte
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw option byte
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check a single option bit
    pub const fn contains(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub(crate) const fn single_input_limits(&self) -> bool {
        self.contains(Self::ONE_MINMAX_FOR_ALL_INPUTS)
    }

    pub(crate) const fn log_scale_outputs(&self) -> bool {
        self.contains(Self::LOG_SCALE_OUTPUTS)
    }

    pub(crate) const fn force_integer(&self) -> bool {
        self.contains(Self::FORCE_INTEGER_ACTIVATION)
    }
}

/// Quantization level of weights, coefficients and accumulators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantization {
    /// 8-bit fixed point
    Q8,
    /// 16-bit fixed point
    Q16,
    /// 32-bit IEEE float
    F32,
}

impl Quantization {
    /// Bit width of one weight, coefficient or accumulator
    pub const fn bits(&self) -> u8 {
        match self {
            Self::Q8 => 8,
            Self::Q16 => 16,
            Self::F32 => 32,
        }
    }

    /// Element width in bytes; also the payload section alignment
    pub(crate) const fn width(&self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Map the on-disk quantization byte onto a compiled-in kernel
    pub(crate) fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            8 => Ok(Self::Q8),
            #[cfg(feature = "q16")]
            16 => Ok(Self::Q16),
            #[cfg(feature = "q32")]
            32 => Ok(Self::F32),
            other => Err(ModelError::not_supported(format!(
                "quantization level {other}"
            ))),
        }
    }
}

/// Storage behind the immutable payload sections
#[derive(Debug)]
pub(crate) enum Payload<'a> {
    /// Freshly allocated arena holding a private copy
    Owned(Vec<u8>),
    /// Zero-copy alias into the caller-owned source buffer
    Mapped(&'a [u8]),
}

impl Payload<'_> {
    pub(crate) fn bytes(&self) -> &[u8] {
        match self {
            Payload::Owned(arena) => arena,
            Payload::Mapped(bytes) => bytes,
        }
    }
}

/// Byte ranges of the payload sections, relative to the payload start
#[derive(Debug, Clone, Default)]
pub(crate) struct Sections {
    pub inputs_max: Range<usize>,
    pub inputs_min: Range<usize>,
    pub outputs_max: Range<usize>,
    pub outputs_min: Range<usize>,
    pub outputs_log_offset: Option<Range<usize>>,
    pub output_labels: Range<usize>,
    pub int_link_counts: Range<usize>,
    pub ext_link_counts: Range<usize>,
    pub links: Range<usize>,
    pub weights: Range<usize>,
    pub coefficients: Range<usize>,
    /// Total payload size, alignment padding included
    pub total: usize,
}

impl Sections {
    pub(crate) fn inputs_max<'b>(&self, bytes: &'b [u8]) -> F32View<'b> {
        F32View(&bytes[self.inputs_max.clone()])
    }

    pub(crate) fn inputs_min<'b>(&self, bytes: &'b [u8]) -> F32View<'b> {
        F32View(&bytes[self.inputs_min.clone()])
    }

    pub(crate) fn outputs_max<'b>(&self, bytes: &'b [u8]) -> F32View<'b> {
        F32View(&bytes[self.outputs_max.clone()])
    }

    pub(crate) fn outputs_min<'b>(&self, bytes: &'b [u8]) -> F32View<'b> {
        F32View(&bytes[self.outputs_min.clone()])
    }

    pub(crate) fn outputs_log_offset<'b>(&self, bytes: &'b [u8]) -> Option<F32View<'b>> {
        self.outputs_log_offset
            .as_ref()
            .map(|range| F32View(&bytes[range.clone()]))
    }

    pub(crate) fn output_labels<'b>(&self, bytes: &'b [u8]) -> U16View<'b> {
        U16View(&bytes[self.output_labels.clone()])
    }

    pub(crate) fn int_link_counts<'b>(&self, bytes: &'b [u8]) -> U16View<'b> {
        U16View(&bytes[self.int_link_counts.clone()])
    }

    pub(crate) fn ext_link_counts<'b>(&self, bytes: &'b [u8]) -> U16View<'b> {
        U16View(&bytes[self.ext_link_counts.clone()])
    }

    pub(crate) fn links<'b>(&self, bytes: &'b [u8]) -> U16View<'b> {
        U16View(&bytes[self.links.clone()])
    }

    pub(crate) fn weights_i8<'b>(&self, bytes: &'b [u8]) -> I8View<'b> {
        I8View(&bytes[self.weights.clone()])
    }

    pub(crate) fn weights_i16<'b>(&self, bytes: &'b [u8]) -> I16View<'b> {
        I16View(&bytes[self.weights.clone()])
    }

    pub(crate) fn weights_f32<'b>(&self, bytes: &'b [u8]) -> F32View<'b> {
        F32View(&bytes[self.weights.clone()])
    }

    pub(crate) fn coefficients_u8<'b>(&self, bytes: &'b [u8]) -> U8View<'b> {
        U8View(&bytes[self.coefficients.clone()])
    }

    pub(crate) fn coefficients_u16<'b>(&self, bytes: &'b [u8]) -> U16View<'b> {
        U16View(&bytes[self.coefficients.clone()])
    }

    pub(crate) fn coefficients_f32<'b>(&self, bytes: &'b [u8]) -> F32View<'b> {
        F32View(&bytes[self.coefficients.clone()])
    }
}

/// Per-inference neuron accumulators, element width keyed by quantization
#[derive(Debug)]
pub(crate) enum Accumulators {
    Q8(Vec<u8>),
    #[cfg(feature = "q16")]
    Q16(Vec<u16>),
    #[cfg(feature = "q32")]
    F32(Vec<f32>),
}

/// Element type of a link offset table
pub(crate) trait OffsetIndex: Copy {
    /// Truncating conversion used while building the prefix sums
    fn from_u32_lossy(value: u32) -> Self;
    /// Widening conversion used while indexing the link tables
    fn index(self) -> usize;
}

impl OffsetIndex for u8 {
    fn from_u32_lossy(value: u32) -> Self {
        value as u8
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl OffsetIndex for u16 {
    fn from_u32_lossy(value: u32) -> Self {
        value as u16
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl OffsetIndex for u32 {
    fn from_u32_lossy(value: u32) -> Self {
        value
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Prefix-sum link offset tables; element width is chosen by the weight
/// count so small models pay one byte per neuron per table
#[derive(Debug)]
pub(crate) enum LinkOffsets {
    U8 { int: Vec<u8>, ext: Vec<u8> },
    U16 { int: Vec<u16>, ext: Vec<u16> },
    U32 { int: Vec<u32>, ext: Vec<u32> },
}

/// A loaded model: parameter tables plus per-inference scratch.
///
/// The lifetime ties a mapped model to the buffer it aliases; models loaded
/// in copy mode, and every model loaded from a file, borrow nothing and are
/// `'static`. Inference mutates only the scratch, so a model is exclusively
/// owned by its caller for the duration of any operation.
#[derive(Debug)]
pub struct Model<'a> {
    pub(crate) payload: Payload<'a>,
    pub(crate) sections: Sections,
    pub(crate) task: TaskKind,
    pub(crate) options: ModelOptions,
    pub(crate) quantization: Quantization,
    pub(crate) inputs_dim: u16,
    pub(crate) outputs_dim: u16,
    pub(crate) neurons_count: u16,
    pub(crate) weights_count: u32,
    pub(crate) cached_inputs_diff: f32,
    pub(crate) accumulators: Accumulators,
    pub(crate) offsets: LinkOffsets,
    pub(crate) output_buffer: Vec<f32>,
}

impl<'a> Model<'a> {
    /// Load a model from a byte buffer.
    ///
    /// With `copy` set the payload is always copied into a private arena.
    /// Without it the loader aliases the buffer when the byte order matches
    /// the host and the payload fits, avoiding the copy entirely.
    pub fn from_memory(bytes: &'a [u8], copy: bool) -> Result<Self> {
        crate::codec::load_model(crate::source::ByteSource::from_buffer(bytes), copy)
    }

    /// Load a model from a file; the payload is always copied
    #[cfg(feature = "std")]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Model<'static>> {
        crate::codec::load_model(crate::source::ByteSource::open_path(path)?, true)
    }

    /// Input dimension, the trailing bias slot included
    pub fn inputs_dim(&self) -> u16 {
        self.inputs_dim
    }

    /// Output dimension
    pub fn outputs_dim(&self) -> u16 {
        self.outputs_dim
    }

    /// Task the model was trained for
    pub fn task(&self) -> TaskKind {
        self.task
    }

    /// Quantization level of the loaded model
    pub fn quantization(&self) -> Quantization {
        self.quantization
    }

    /// Neuron count
    pub fn neurons_count(&self) -> u16 {
        self.neurons_count
    }

    /// Total number of link weights
    pub fn weights_count(&self) -> u32 {
        self.weights_count
    }

    /// Raw option bits
    pub fn options(&self) -> ModelOptions {
        self.options
    }

    /// Whether the payload aliases the source buffer instead of owning a copy
    pub fn is_mapped(&self) -> bool {
        matches!(self.payload, Payload::Mapped(_))
    }

    /// Scale a sample into the 0.0..=1.0 range the network was trained on.
    ///
    /// Every input channel except the last is mapped against the training
    /// limits and clamped to `[0, 1]`; the final slot is the bias term and
    /// is left untouched. Channels whose limits coincide are not scaled but
    /// still clamped.
    pub fn normalize_sample(&self, sample: &mut [f32]) -> Result<()> {
        let dim = self.inputs_dim as usize;
        if sample.len() < dim {
            return Err(ModelError::bad_argument(format!(
                "sample holds {} values, the model expects {dim}",
                sample.len()
            )));
        }

        let bytes = self.payload.bytes();
        let inputs_min = self.sections.inputs_min(bytes);
        let inputs_max = self.sections.inputs_max(bytes);
        let single_limits = self.options.single_input_limits() || dim == 1;

        for (i, value) in sample.iter_mut().enumerate().take(dim - 1) {
            if single_limits {
                if self.cached_inputs_diff != 0.0 {
                    *value = (*value - inputs_min.at(0)) / self.cached_inputs_diff;
                }
            } else if inputs_max.at(i) != inputs_min.at(i) {
                *value = (*value - inputs_min.at(i)) / (inputs_max.at(i) - inputs_min.at(i));
            }

            *value = value.clamp(0.0, 1.0);
        }

        Ok(())
    }

    /// Map raw network outputs back onto the training value ranges.
    ///
    /// Binary classification scales each output by the sum of all outputs;
    /// a zero sum divides through to NaN. The other tasks apply the linear
    /// limit mapping and, where a log offset is present, `exp(x) - offset`.
    pub fn denormalize_result(&self, result: &mut [f32]) -> Result<()> {
        let dim = self.outputs_dim as usize;
        if result.len() < dim {
            return Err(ModelError::bad_argument(format!(
                "result holds {} values, the model produces {dim}",
                result.len()
            )));
        }

        let bytes = self.payload.bytes();
        denormalize_in_place(
            self.task,
            self.sections.outputs_max(bytes),
            self.sections.outputs_min(bytes),
            self.options
                .log_scale_outputs()
                .then(|| self.sections.outputs_log_offset(bytes))
                .flatten(),
            &mut result[..dim],
        );

        Ok(())
    }

    /// Normalize a sample, run inference and denormalize the prediction.
    ///
    /// The returned slice lives in the model's output buffer and is
    /// overwritten by the next call.
    pub fn predict(&mut self, sample: &mut [f32]) -> Option<&[f32]> {
        self.normalize_sample(sample).ok()?;
        self.run_inference(sample)?;

        let Model {
            payload,
            sections,
            task,
            options,
            output_buffer,
            ..
        } = self;
        let bytes = payload.bytes();
        denormalize_in_place(
            *task,
            sections.outputs_max(bytes),
            sections.outputs_min(bytes),
            options
                .log_scale_outputs()
                .then(|| sections.outputs_log_offset(bytes))
                .flatten(),
            output_buffer,
        );

        Some(output_buffer.as_slice())
    }
}

/// Shared denormalization core; `result` is exactly `outputs_dim` long
fn denormalize_in_place(
    task: TaskKind,
    outputs_max: F32View<'_>,
    outputs_min: F32View<'_>,
    log_offsets: Option<F32View<'_>>,
    result: &mut [f32],
) {
    match task {
        TaskKind::BinaryClassification => {
            let sum: f32 = result.iter().sum();
            for value in result.iter_mut() {
                *value /= sum;
            }
        }
        TaskKind::MulticlassClassification | TaskKind::Regression => {
            for (i, value) in result.iter_mut().enumerate() {
                *value = *value * (outputs_max.at(i) - outputs_min.at(i)) + outputs_min.at(i);

                if let Some(offsets) = log_offsets {
                    let offset = offsets.at(i);
                    if offset != LOG_OFFSET_NONE {
                        *value = (f64::from(*value).exp() - f64::from(offset)) as f32;
                    }
                }
            }
        }
    }
}
