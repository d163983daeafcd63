//! Loader behavior: header validation, CRC verification, copy vs mapped
//! payloads and byte-swapped files

mod common;

use common::{refresh_crc, single_neuron_f32, two_neuron_q8, Coefficients, ModelFile, Weights};
use neurite_engine::{Model, ModelError, Quantization, TaskKind};

const INPUTS: [f32; 3] = [0.25, 0.75, 1.0];

#[test]
fn copy_and_mapped_loads_agree_bit_exactly() {
    let bytes = two_neuron_q8().to_bytes();

    let mut copied = Model::from_memory(&bytes, true).unwrap();
    let mut mapped = Model::from_memory(&bytes, false).unwrap();
    assert!(!copied.is_mapped());
    assert!(mapped.is_mapped());

    let expected = copied.run_inference(&INPUTS).unwrap().to_vec();
    let got = mapped.run_inference(&INPUTS).unwrap();
    assert_eq!(expected, got);
}

#[cfg(feature = "q32")]
#[test]
fn copy_and_mapped_loads_agree_for_floats() {
    let bytes = single_neuron_f32(1.0, 1.0).to_bytes();

    let mut copied = Model::from_memory(&bytes, true).unwrap();
    let mut mapped = Model::from_memory(&bytes, false).unwrap();
    assert!(mapped.is_mapped());

    let expected = copied.run_inference(&INPUTS[..2]).unwrap().to_vec();
    let got = mapped.run_inference(&INPUTS[..2]).unwrap();
    assert_eq!(expected, got);
}

#[test]
fn byte_swapped_file_loads_to_the_same_model() {
    let fixture = two_neuron_q8();
    let native = fixture.to_bytes();
    let swapped = fixture.to_bytes_swapped();
    assert_ne!(native, swapped);

    let mut from_native = Model::from_memory(&native, true).unwrap();
    let mut from_swapped = Model::from_memory(&swapped, true).unwrap();

    assert_eq!(from_native.inputs_dim(), from_swapped.inputs_dim());
    assert_eq!(from_native.weights_count(), from_swapped.weights_count());

    let expected = from_native.run_inference(&INPUTS).unwrap().to_vec();
    let got = from_swapped.run_inference(&INPUTS).unwrap();
    assert_eq!(expected, got);
}

#[cfg(feature = "q32")]
#[test]
fn byte_swapped_float_file_loads_to_the_same_model() {
    let fixture = single_neuron_f32(1.0, 1.0);
    let native = fixture.to_bytes();
    let swapped = fixture.to_bytes_swapped();

    let mut from_native = Model::from_memory(&native, true).unwrap();
    let mut from_swapped = Model::from_memory(&swapped, true).unwrap();

    let expected = from_native.run_inference(&INPUTS[..2]).unwrap().to_vec();
    let got = from_swapped.run_inference(&INPUTS[..2]).unwrap();
    assert_eq!(expected, got);
}

#[test]
fn byte_swapped_file_is_never_mapped() {
    let swapped = two_neuron_q8().to_bytes_swapped();
    let model = Model::from_memory(&swapped, false).unwrap();
    assert!(!model.is_mapped());
}

#[test]
fn bad_magic_is_bad_file_format() {
    let mut bytes = two_neuron_q8().to_bytes();
    bytes[0] = b'a';
    let err = Model::from_memory(&bytes, true).unwrap_err();
    assert!(matches!(err, ModelError::BadFileFormat { .. }));
    assert_eq!(err.code(), 3);
}

#[test]
fn wrong_type_byte_is_bad_file_format() {
    let mut bytes = two_neuron_q8().to_bytes();
    bytes[2] = 2;
    let err = Model::from_memory(&bytes, true).unwrap_err();
    assert_eq!(err.code(), 3);
}

#[test]
fn zeroed_crc_is_inconsistent_data() {
    let mut bytes = two_neuron_q8().to_bytes();
    let len = bytes.len();
    bytes[len - 4..].fill(0);
    let err = Model::from_memory(&bytes, true).unwrap_err();
    assert!(matches!(err, ModelError::InconsistentData { .. }));
    assert_eq!(err.code(), 4);
}

#[test]
fn any_flipped_payload_byte_is_inconsistent_data() {
    let reference = two_neuron_q8().to_bytes();
    // every payload byte, one flip at a time
    for pos in 20..reference.len() - 4 {
        let mut bytes = reference.clone();
        bytes[pos] ^= 0x01;
        let err = Model::from_memory(&bytes, true).unwrap_err();
        assert_eq!(err.code(), 4, "flip at {pos} slipped through");
    }
}

#[test]
fn unsupported_quantization_is_feature_not_supported() {
    let mut bytes = two_neuron_q8().to_bytes();
    bytes[12] = 12; // quantization byte in the meta block
    refresh_crc(&mut bytes);
    let err = Model::from_memory(&bytes, true).unwrap_err();
    assert!(matches!(err, ModelError::FeatureNotSupported { .. }));
    assert_eq!(err.code(), 6);
}

#[test]
fn zero_neuron_count_is_inconsistent_data() {
    let mut bytes = two_neuron_q8().to_bytes();
    bytes[14..16].fill(0); // neuron count in the meta block
    refresh_crc(&mut bytes);
    let err = Model::from_memory(&bytes, true).unwrap_err();
    assert_eq!(err.code(), 4);
}

#[test]
fn zero_weight_count_is_inconsistent_data() {
    let mut bytes = two_neuron_q8().to_bytes();
    bytes[16..20].fill(0); // weight count after the meta block
    refresh_crc(&mut bytes);
    let err = Model::from_memory(&bytes, true).unwrap_err();
    assert_eq!(err.code(), 4);
}

#[test]
fn truncated_payload_is_read_file() {
    let mut bytes = two_neuron_q8().to_bytes();
    // keep the header and meta but drop most of the payload, with a CRC
    // that matches the truncated content
    bytes.truncate(28);
    refresh_crc(&mut bytes);
    let err = Model::from_memory(&bytes, true).unwrap_err();
    assert!(matches!(err, ModelError::ReadFile { .. }));
    assert_eq!(err.code(), 2);
}

#[test]
fn reversed_output_limits_are_inconsistent_data() {
    let mut fixture = two_neuron_q8();
    fixture.outputs_max = vec![0.0];
    fixture.outputs_min = vec![1.0];
    let err = Model::from_memory(&fixture.to_bytes(), true).unwrap_err();
    assert_eq!(err.code(), 4);
}

#[test]
fn reversed_input_limits_are_inconsistent_data() {
    let mut fixture = two_neuron_q8();
    fixture.inputs_max = vec![0.0, 1.0, 1.0];
    fixture.inputs_min = vec![0.5, 0.0, 0.0];
    let err = Model::from_memory(&fixture.to_bytes(), true).unwrap_err();
    assert_eq!(err.code(), 4);
}

#[test]
fn out_of_range_output_neuron_is_inconsistent_data() {
    let mut fixture = two_neuron_q8();
    fixture.output_labels = vec![2]; // only neurons 0 and 1 exist
    let err = Model::from_memory(&fixture.to_bytes(), true).unwrap_err();
    assert_eq!(err.code(), 4);
}

#[test]
fn introspection_reports_the_meta_block() {
    let bytes = two_neuron_q8().to_bytes();
    let model = Model::from_memory(&bytes, true).unwrap();

    assert_eq!(model.inputs_dim(), 3);
    assert_eq!(model.outputs_dim(), 1);
    assert_eq!(model.neurons_count(), 2);
    assert_eq!(model.weights_count(), 4);
    assert_eq!(model.task(), TaskKind::Regression);
    assert_eq!(model.quantization(), Quantization::Q8);
    assert_eq!(model.quantization().bits(), 8);
    assert_eq!(model.options().bits(), 0);
}

#[test]
fn output_on_the_last_neuron_works() {
    // two_neuron_q8 labels neuron 1 of 2 as its output
    let bytes = two_neuron_q8().to_bytes();
    let mut model = Model::from_memory(&bytes, true).unwrap();
    assert!(model.run_inference(&INPUTS).is_some());
}

#[cfg(feature = "std")]
#[test]
fn loading_from_a_file_copies_the_payload() {
    use std::io::Write;

    let bytes = two_neuron_q8().to_bytes();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&bytes).unwrap();

    let mut from_file = Model::from_file(tmp.path()).unwrap();
    assert!(!from_file.is_mapped());

    let mut from_memory = Model::from_memory(&bytes, true).unwrap();
    let expected = from_memory.run_inference(&INPUTS).unwrap().to_vec();
    let got = from_file.run_inference(&INPUTS).unwrap();
    assert_eq!(expected, got);
}

#[cfg(feature = "std")]
#[test]
fn missing_file_is_open_file() {
    let err = Model::from_file("/nonexistent/model.nb").unwrap_err();
    assert!(matches!(err, ModelError::OpenFile { .. }));
    assert_eq!(err.code(), 1);
}

#[test]
fn log_scale_section_shifts_the_layout() {
    // a model with the log-scale flag carries one extra float table; the
    // loader must still find every later section
    let mut fixture = two_neuron_q8();
    fixture.options = 1 << 6; // log-scale outputs present
    fixture.outputs_log_offset = Some(vec![4_294_967_295u32 as f32]);
    let bytes = fixture.to_bytes();
    let mut model = Model::from_memory(&bytes, true).unwrap();
    assert!(model.run_inference(&INPUTS).is_some());
}

#[test]
fn mapping_requires_the_payload_to_fit() {
    // a consistent file that ends before the advertised payload cannot be
    // mapped and fails its copy-mode read instead
    let mut bytes = two_neuron_q8().to_bytes();
    bytes.truncate(40);
    refresh_crc(&mut bytes);
    let err = Model::from_memory(&bytes, false).unwrap_err();
    assert_eq!(err.code(), 2);
}

#[test]
fn single_limit_flag_shrinks_the_limit_tables() {
    let fixture = ModelFile {
        options: 1 << 7, // one min/max pair for all inputs
        task: 2,
        inputs_dim: 3,
        outputs_dim: 1,
        neurons_count: 1,
        inputs_max: vec![2.0],
        inputs_min: vec![0.0],
        outputs_max: vec![1.0],
        outputs_min: vec![0.0],
        outputs_log_offset: None,
        output_labels: vec![0],
        int_link_counts: vec![0],
        ext_link_counts: vec![2],
        links: vec![0, 1],
        weights: Weights::Q8(vec![50, 50]),
        coefficients: Coefficients::Q8(vec![2]),
    };

    let bytes = fixture.to_bytes();
    let mut model = Model::from_memory(&bytes, true).unwrap();
    assert!(model.run_inference(&INPUTS).is_some());
}
