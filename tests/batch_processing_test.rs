use image_processors_rs::mocks::MockInferenceEngine;
use image_processors_rs::{
    HeightWidth, ImageProcessor, ModelOutputs, PixelBuffer, PreprocessOverrides, ProcessorError,
    SegmentationOptions, SizeSpec,
};

fn gradient(width: u32, height: u32, channels: usize) -> PixelBuffer {
    let data = (0..width as usize * height as usize * channels)
        .map(|v| (v % 256) as f32)
        .collect();
    PixelBuffer::new(width, height, channels, data).unwrap()
}

#[test]
fn test_batch_preprocessing_preserves_input_order() -> Result<(), Box<dyn std::error::Error>> {
    let processor = ImageProcessor::from_json(
        r#"{"size": {"height": 16, "width": 16}, "do_normalize": true, "image_mean": 0.5, "image_std": 0.5}"#,
    )?;

    // mixed channel layouts and sizes, all resized to the same shape
    let images: Vec<PixelBuffer> = (0..8)
        .map(|i| match i % 3 {
            0 => gradient(10 + i, 20, 1),
            1 => gradient(30, 5 + i, 3),
            _ => gradient(7, 7 + i, 4),
        })
        .collect();

    let batch = processor.batch_preprocess(&images, &PreprocessOverrides::default())?;

    assert_eq!(batch.pixel_values.shape(), &[8, 3, 16, 16]);
    assert_eq!(batch.original_sizes.len(), images.len());
    for (size, image) in batch.original_sizes.iter().zip(&images) {
        assert_eq!(*size, image.size());
    }
    assert!(batch
        .reshaped_input_sizes
        .iter()
        .all(|size| *size == HeightWidth::new(16, 16)));

    // each batch item equals preprocessing the image on its own
    for (i, image) in images.iter().enumerate() {
        let single = processor.preprocess(image, &PreprocessOverrides::default())?;
        let item = batch.pixel_values.index_axis(ndarray::Axis(0), i);
        assert_eq!(item, single.pixel_values);
    }
    Ok(())
}

#[test]
fn test_batch_overrides_leave_base_config_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let processor = ImageProcessor::from_json(r#"{"size": {"height": 8, "width": 8}}"#)?;
    let before = processor.config().clone();
    let images = vec![gradient(4, 4, 3), gradient(5, 3, 3)];

    let overrides = PreprocessOverrides {
        size: Some(SizeSpec::exact(4, 6)),
        do_rescale: Some(false),
        ..Default::default()
    };
    let overridden = processor.batch_preprocess(&images, &overrides)?;
    let plain = processor.batch_preprocess(&images, &PreprocessOverrides::default())?;

    assert_eq!(overridden.pixel_values.shape(), &[2, 3, 4, 6]);
    assert_eq!(plain.pixel_values.shape(), &[2, 3, 8, 8]);
    assert!(plain.pixel_values.iter().all(|v| *v <= 1.0));
    assert_eq!(processor.config(), &before);
    Ok(())
}

#[test]
fn test_batch_fails_before_processing_bad_image() {
    let processor = ImageProcessor::from_json(r#"{"size": {"height": 8, "width": 8}}"#).unwrap();
    let images = vec![gradient(4, 4, 3), gradient(4, 4, 2), gradient(4, 4, 3)];

    let err = processor
        .batch_preprocess(&images, &PreprocessOverrides::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::UnsupportedChannels { channels: 2 }
    ));
}

#[test]
fn test_batch_through_mock_engine() -> Result<(), Box<dyn std::error::Error>> {
    let processor = ImageProcessor::from_json(r#"{"size": {"height": 6, "width": 6}}"#)?;
    let engine = MockInferenceEngine::mask_classification(3, 2);
    let images = vec![gradient(12, 6, 3), gradient(3, 9, 3)];

    let (batch, outputs) = processor.infer(&engine, &images, &PreprocessOverrides::default())?;
    let ModelOutputs::MaskClassification(outputs) = outputs else {
        panic!("expected mask classification outputs");
    };

    // zero logits: every query is below the default threshold
    let results = processor.post_process_instance_segmentation(
        &outputs,
        &SegmentationOptions::default(),
        Some(&batch.original_sizes),
    )?;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].segmentation.dim(), (6, 12));
    assert_eq!(results[1].segmentation.dim(), (9, 3));
    assert!(results.iter().all(|r| r.segments.is_empty()));
    Ok(())
}
