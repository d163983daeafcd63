//! Binary model codec
//!
//! Walks the fixed header and meta block, verifies the trailing CRC-32,
//! lays the payload sections out with quantization-width alignment and
//! loads them either by copying into a private arena or by aliasing the
//! caller's buffer when the byte order already matches ("mapping"). The
//! scratch region is always freshly allocated.

use std::ops::Range;

use crate::error::{ModelError, Result};
use crate::format::{self, FileType, MetaInfo};
use crate::model::{
    Accumulators, LinkOffsets, Model, ModelOptions, OffsetIndex, Payload, Quantization, Sections,
    TaskKind,
};
use crate::source::ByteSource;
use crate::views::U16View;

/// Load a model from a byte source.
///
/// With `copy` set the payload sections are always read into a private
/// arena. Without it the loader aliases a buffer-backed source directly
/// when the on-disk byte order matches the host and the payload fits
/// before the end of the source; otherwise it falls back to copying.
/// The source is consumed either way.
pub fn load_model<'a>(mut source: ByteSource<'a>, copy: bool) -> Result<Model<'a>> {
    let reverse = format::check_file_header(&mut source, FileType::Model)?;

    let mut raw_meta = [0u8; MetaInfo::SIZE];
    source.read_exact(&mut raw_meta)?;
    let meta = MetaInfo::parse(raw_meta, reverse);

    let mut raw_count = [0u8; 4];
    source.read_exact(&mut raw_count)?;
    let mut weights_count = u32::from_ne_bytes(raw_count);
    if reverse {
        weights_count = weights_count.swap_bytes();
    }

    // unsupported quantization outranks the dimension checks
    let quantization = Quantization::from_raw(meta.quantization)?;

    if weights_count == 0
        || meta.inputs_dim == 0
        || meta.outputs_dim == 0
        || meta.neurons_count == 0
    {
        return Err(ModelError::inconsistent("zero-sized model dimension"));
    }

    let task = TaskKind::from_raw(meta.task)?;
    let options = ModelOptions::from_bits(meta.options);

    let sections = layout_sections(options, &meta, weights_count, quantization);
    let payload_base = source.pos()? as usize;

    let payload = match source.raw_data() {
        Some(data) if !copy && !reverse && data.len() >= payload_base + sections.total => {
            Payload::Mapped(&data[payload_base..payload_base + sections.total])
        }
        _ => {
            if !copy && reverse {
                log::debug!("mapped load requested but the byte order differs; copying payload");
            }
            Payload::Owned(read_payload(&mut source, &sections, quantization, reverse)?)
        }
    };
    let mapped = matches!(payload, Payload::Mapped(_));

    let neurons = meta.neurons_count as usize;
    let outputs = meta.outputs_dim as usize;

    let bytes = payload.bytes();
    let offsets = build_link_offsets(
        weights_count,
        sections.int_link_counts(bytes),
        sections.ext_link_counts(bytes),
        neurons,
    )?;

    validate_tables(&sections, bytes, options, &meta)?;

    let limits_count = input_limits_count(options, meta.inputs_dim);
    let inputs_min = sections.inputs_min(bytes);
    let inputs_max = sections.inputs_max(bytes);
    let cached_inputs_diff = if limits_count == 1 && inputs_max.at(0) != inputs_min.at(0) {
        inputs_max.at(0) - inputs_min.at(0)
    } else {
        0.0
    };

    let accumulators = match quantization {
        Quantization::Q8 => Accumulators::Q8(alloc_zeroed(neurons)?),
        #[cfg(feature = "q16")]
        Quantization::Q16 => Accumulators::Q16(alloc_zeroed(neurons)?),
        #[cfg(not(feature = "q16"))]
        Quantization::Q16 => unreachable!(),
        #[cfg(feature = "q32")]
        Quantization::F32 => Accumulators::F32(alloc_zeroed(neurons)?),
        #[cfg(not(feature = "q32"))]
        Quantization::F32 => unreachable!(),
    };
    let output_buffer = alloc_zeroed(outputs)?;

    log::debug!(
        "loaded model: {} neurons, {} weights, q{}, {} inputs -> {} outputs ({})",
        meta.neurons_count,
        weights_count,
        quantization.bits(),
        meta.inputs_dim,
        meta.outputs_dim,
        if mapped { "mapped" } else { "copied" },
    );

    Ok(Model {
        payload,
        sections,
        task,
        options,
        quantization,
        inputs_dim: meta.inputs_dim,
        outputs_dim: meta.outputs_dim,
        neurons_count: meta.neurons_count,
        weights_count,
        cached_inputs_diff,
        accumulators,
        offsets,
        output_buffer,
    })
}

/// Number of entries in each input limit table
fn input_limits_count(options: ModelOptions, inputs_dim: u16) -> usize {
    if options.single_input_limits() {
        1
    } else {
        inputs_dim as usize
    }
}

/// Walk the fixed section order, inserting alignment padding.
///
/// Offsets are relative to the payload start; the payload begins at file
/// offset 20, which is already aligned for every quantization width, so
/// payload-relative and file-relative padding agree.
fn layout_sections(
    options: ModelOptions,
    meta: &MetaInfo,
    weights_count: u32,
    quantization: Quantization,
) -> Sections {
    let align = quantization.width();
    let element = quantization.width();
    let limits = input_limits_count(options, meta.inputs_dim);
    let outputs = meta.outputs_dim as usize;
    let neurons = meta.neurons_count as usize;
    let weights = weights_count as usize;

    let mut layout = Layout { cursor: 0 };

    let inputs_max = layout.take(4 * limits);
    let inputs_min = layout.take(4 * limits);
    let outputs_max = layout.take(4 * outputs);
    let outputs_min = layout.take(4 * outputs);
    let outputs_log_offset = options
        .log_scale_outputs()
        .then(|| layout.take(4 * outputs));

    layout.align_to(align);
    let output_labels = layout.take(2 * outputs);

    layout.align_to(align);
    let int_link_counts = layout.take(2 * neurons);
    let ext_link_counts = layout.take(2 * neurons);

    layout.align_to(align);
    let links = layout.take(2 * weights);

    layout.align_to(align);
    let weights = layout.take(element * weights);

    layout.align_to(align);
    let coefficients = layout.take(element * neurons);

    Sections {
        inputs_max,
        inputs_min,
        outputs_max,
        outputs_min,
        outputs_log_offset,
        output_labels,
        int_link_counts,
        ext_link_counts,
        links,
        weights,
        coefficients,
        total: layout.cursor,
    }
}

struct Layout {
    cursor: usize,
}

impl Layout {
    fn take(&mut self, len: usize) -> Range<usize> {
        let range = self.cursor..self.cursor + len;
        self.cursor += len;
        range
    }

    fn align_to(&mut self, align: usize) {
        self.cursor += format::align_pad(align, self.cursor);
    }
}

/// Copy-mode loading: read the payload region into an owned arena and
/// reverse byte order in place where the BOM demands it
fn read_payload(
    source: &mut ByteSource<'_>,
    sections: &Sections,
    quantization: Quantization,
    reverse: bool,
) -> Result<Vec<u8>> {
    let mut arena = alloc_zeroed::<u8>(sections.total)?;
    source.read_exact(&mut arena)?;

    if reverse {
        let mut float_sections = vec![
            sections.inputs_max.clone(),
            sections.inputs_min.clone(),
            sections.outputs_max.clone(),
            sections.outputs_min.clone(),
        ];
        if let Some(range) = &sections.outputs_log_offset {
            float_sections.push(range.clone());
        }
        for range in float_sections {
            format::swap_elements(&mut arena[range], 4)?;
        }

        for range in [
            sections.output_labels.clone(),
            sections.int_link_counts.clone(),
            sections.ext_link_counts.clone(),
            sections.links.clone(),
        ] {
            format::swap_elements(&mut arena[range], 2)?;
        }

        let width = quantization.width() as u8;
        format::swap_elements(&mut arena[sections.weights.clone()], width)?;
        format::swap_elements(&mut arena[sections.coefficients.clone()], width)?;
    }

    Ok(arena)
}

/// Build the exclusive prefix sums over the link counts; the external pass
/// continues where the internal pass ended, so external links trail the
/// internal ones in the link and weight arrays
fn build_link_offsets(
    weights_count: u32,
    int_counts: U16View<'_>,
    ext_counts: U16View<'_>,
    neurons: usize,
) -> Result<LinkOffsets> {
    Ok(if weights_count <= 256 {
        let (int, ext) = prefix_sums::<u8>(int_counts, ext_counts, neurons)?;
        LinkOffsets::U8 { int, ext }
    } else if weights_count <= 65536 {
        let (int, ext) = prefix_sums::<u16>(int_counts, ext_counts, neurons)?;
        LinkOffsets::U16 { int, ext }
    } else {
        let (int, ext) = prefix_sums::<u32>(int_counts, ext_counts, neurons)?;
        LinkOffsets::U32 { int, ext }
    })
}

fn prefix_sums<T: OffsetIndex>(
    int_counts: U16View<'_>,
    ext_counts: U16View<'_>,
    neurons: usize,
) -> Result<(Vec<T>, Vec<T>)> {
    let mut int = alloc_uninit::<T>(neurons)?;
    let mut ext = alloc_uninit::<T>(neurons)?;

    let mut offset = 0u32;
    for idx in 0..neurons {
        int.push(T::from_u32_lossy(offset));
        offset += u32::from(int_counts.at(idx));
    }
    for idx in 0..neurons {
        ext.push(T::from_u32_lossy(offset));
        offset += u32::from(ext_counts.at(idx));
    }

    Ok((int, ext))
}

/// Range checks over the freshly loaded tables
fn validate_tables(
    sections: &Sections,
    bytes: &[u8],
    options: ModelOptions,
    meta: &MetaInfo,
) -> Result<()> {
    let output_labels = sections.output_labels(bytes);
    let outputs_max = sections.outputs_max(bytes);
    let outputs_min = sections.outputs_min(bytes);

    for idx in 0..meta.outputs_dim as usize {
        let label = output_labels.at(idx);
        if label >= meta.neurons_count {
            return Err(ModelError::inconsistent(format!(
                "output {idx} references neuron {label} of {}",
                meta.neurons_count
            )));
        }
        if outputs_min.at(idx) > outputs_max.at(idx) {
            return Err(ModelError::inconsistent(format!(
                "reversed output limits on channel {idx}"
            )));
        }
    }

    let inputs_max = sections.inputs_max(bytes);
    let inputs_min = sections.inputs_min(bytes);
    for idx in 0..input_limits_count(options, meta.inputs_dim) {
        if inputs_min.at(idx) > inputs_max.at(idx) {
            return Err(ModelError::inconsistent(format!(
                "reversed input limits on channel {idx}"
            )));
        }
    }

    Ok(())
}

fn alloc_zeroed<T: Default + Clone>(len: usize) -> Result<Vec<T>> {
    let mut buffer = alloc_uninit(len)?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

fn alloc_uninit<T>(len: usize) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| ModelError::MemoryAllocation {
            bytes: len * std::mem::size_of::<T>(),
        })?;
    Ok(buffer)
}
