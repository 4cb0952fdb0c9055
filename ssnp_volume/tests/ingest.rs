use pretty_assertions::assert_eq;
use ssnp_volume::core_modules::interchange_writer;
use ssnp_volume::{Dimensions, IngestConfig, IngestError, VolumeExtents, ingest, ingest_file};
use std::io::Cursor;
use tiff::encoder::{TiffEncoder, colortype};

fn gray8_stack(pages: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
        for (width, height, data) in pages {
            encoder
                .write_image::<colortype::Gray8>(*width, *height, data)
                .unwrap();
        }
    }
    cursor.into_inner()
}

#[test]
fn single_8_bit_page_normalizes_to_unit_interval() {
    let bytes = gray8_stack(&[(2, 2, vec![0, 128, 255, 64])]);
    let volume = ingest(&bytes, &IngestConfig::default()).unwrap();

    assert_eq!(
        volume.extents(),
        VolumeExtents {
            depth: 1,
            height: 2,
            width: 2
        }
    );
    let expected = [0.0, 0.502, 1.0, 0.251];
    for (got, want) in volume.as_slice().iter().zip(expected) {
        assert!((got - want).abs() < 1e-3, "{got} vs {want}");
    }
}

#[test]
fn bigtiff_stack_ingests_like_classic_tiff() {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new_big(&mut cursor).unwrap();
        encoder
            .write_image::<colortype::Gray8>(2, 2, &[0, 128, 255, 64])
            .unwrap();
        encoder
            .write_image::<colortype::Gray8>(2, 2, &[255, 255, 0, 0])
            .unwrap();
    }
    let volume = ingest(&cursor.into_inner(), &IngestConfig::default()).unwrap();

    assert_eq!(volume.depth(), 2);
    let expected = [0.0, 0.502, 1.0, 0.251];
    for (got, want) in volume.slice(0).unwrap().iter().zip(expected) {
        assert!((got - want).abs() < 1e-3, "{got} vs {want}");
    }
    assert_eq!(volume.slice(1).unwrap(), &[1.0, 1.0, 0.0, 0.0][..]);
}

#[test]
fn page_count_becomes_depth() {
    let pages: Vec<_> = (0..5u8).map(|i| (3, 2, vec![i * 50; 6])).collect();
    let volume = ingest(&gray8_stack(&pages), &IngestConfig::default()).unwrap();

    assert_eq!(volume.depth(), 5);
    assert_eq!(volume.as_slice().len(), 5 * 2 * 3);
    assert_eq!(volume.slice(4).unwrap(), &[200.0 / 255.0; 6][..]);
}

#[test]
fn mismatched_page_aborts_ingestion() {
    let bytes = gray8_stack(&[
        (2, 2, vec![0; 4]),
        (2, 2, vec![0; 4]),
        (2, 3, vec![0; 6]),
    ]);
    let err = ingest(&bytes, &IngestConfig::default()).unwrap_err();

    match err {
        IngestError::DimensionMismatch {
            index,
            actual,
            expected,
        } => {
            assert_eq!(index, 2);
            assert_eq!(actual, Dimensions::new(2, 3));
            assert_eq!(expected, Dimensions::new(2, 2));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn rgb_pages_keep_the_first_channel() {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
        encoder
            .write_image::<colortype::RGB8>(2, 1, &[255, 0, 0, 51, 255, 255])
            .unwrap();
    }
    let volume = ingest(&cursor.into_inner(), &IngestConfig::default()).unwrap();
    assert_eq!(volume.as_slice(), &[1.0, 0.2]);
}

#[test]
fn float_pages_are_not_rescaled() {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
        encoder
            .write_image::<colortype::Gray32Float>(3, 1, &[-2.5, 0.0, 1234.5])
            .unwrap();
    }
    let volume = ingest(&cursor.into_inner(), &IngestConfig::default()).unwrap();
    assert_eq!(volume.as_slice(), &[-2.5, 0.0, 1234.5]);
}

#[test]
fn tiny_buffer_limit_fails_the_page() {
    let bytes = gray8_stack(&[(64, 64, vec![7; 64 * 64])]);
    let config = IngestConfig {
        decoding_buffer_limit: Some(16),
    };
    assert!(matches!(
        ingest(&bytes, &config),
        Err(IngestError::PageDecodeFailure { index: 0, .. })
    ));
}

#[tokio::test]
async fn ingested_file_exports_as_volume_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.tif");
    tokio::fs::write(&path, gray8_stack(&[(2, 1, vec![0, 255]), (2, 1, vec![255, 0])]))
        .await
        .unwrap();

    let volume = ingest_file(&path, &IngestConfig::default()).await.unwrap();
    let bytes = interchange_writer::encode_volume(&volume).unwrap();

    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
    assert!(header.contains("'shape': (2, 1, 2,)"));
    assert_eq!(bytes.len(), 10 + header_len + 4 * 4);
}
