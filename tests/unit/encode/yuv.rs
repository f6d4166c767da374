use super::*;

fn frame(w: u32, h: u32) -> YuvFrame {
    YuvFrame::new(w, h, 8, ChromaFormat::Yuv444)
}

#[test]
fn primaries_convert_to_expected_ycbcr() {
    assert_eq!(rgb_to_ycbcr(0, 0, 0), (0, 128, 128));
    assert_eq!(rgb_to_ycbcr(255, 255, 255), (255, 128, 128));
    assert_eq!(rgb_to_ycbcr(128, 128, 128), (128, 128, 128));
    assert_eq!(rgb_to_ycbcr(255, 0, 0), (76, 85, 255));
    assert_eq!(rgb_to_ycbcr(0, 255, 0), (150, 44, 21));
}

#[test]
fn converter_fills_full_resolution_planes() {
    let img = image::RgbImage::from_fn(3, 2, |x, _| {
        if x == 0 {
            image::Rgb([255, 255, 255])
        } else {
            image::Rgb([0, 0, 0])
        }
    });
    let mut f = frame(3, 2);
    assert!(!f.has_pixels());

    Bt601Converter
        .rgb_to_yuv(&RgbView::from(&img), &mut f)
        .unwrap();

    assert!(f.has_pixels());
    assert_eq!(f.row_bytes(0), 3);
    assert_eq!(f.plane(0), &[255, 0, 0, 255, 0, 0]);
    assert_eq!(f.plane(1), &[128; 6]);
    assert_eq!(f.plane(2), &[128; 6]);
}

#[test]
fn converter_honors_row_stride_padding() {
    // 1x2 image with 2 bytes of padding per row.
    let pixels = [255u8, 255, 255, 9, 9, 0, 0, 0];
    let rgb = RgbView {
        width: 1,
        height: 2,
        row_bytes: 5,
        pixels: &pixels,
    };
    let mut f = frame(1, 2);
    Bt601Converter.rgb_to_yuv(&rgb, &mut f).unwrap();
    assert_eq!(f.plane(0), &[255, 0]);
}

#[test]
fn converter_rejects_bad_inputs() {
    let pixels = [0u8; 12];
    let ok = RgbView {
        width: 2,
        height: 2,
        row_bytes: 6,
        pixels: &pixels,
    };

    assert_eq!(
        Bt601Converter.rgb_to_yuv(&ok, &mut frame(2, 3)),
        Err(ConversionError::SizeMismatch {
            frame_width: 2,
            frame_height: 3,
            image_width: 2,
            image_height: 2,
        })
    );
    assert_eq!(
        Bt601Converter.rgb_to_yuv(&RgbView { row_bytes: 5, ..ok }, &mut frame(2, 2)),
        Err(ConversionError::StrideTooSmall {
            row_bytes: 5,
            min: 6
        })
    );
    assert_eq!(
        Bt601Converter.rgb_to_yuv(
            &RgbView {
                pixels: &pixels[..11],
                ..ok
            },
            &mut frame(2, 2)
        ),
        Err(ConversionError::BufferTooShort {
            len: 11,
            expected: 12
        })
    );
    assert_eq!(
        Bt601Converter.rgb_to_yuv(
            &RgbView {
                width: 0,
                height: 0,
                ..ok
            },
            &mut frame(0, 0)
        ),
        Err(ConversionError::EmptyImage)
    );
    assert_eq!(
        Bt601Converter.rgb_to_yuv(&ok, &mut YuvFrame::new(2, 2, 10, ChromaFormat::Yuv444)),
        Err(ConversionError::UnsupportedDepth(10))
    );
}

#[test]
fn set_planes_checks_sizes() {
    let mut f = frame(2, 1);
    assert!(f.set_planes([vec![0; 2], vec![0; 2], vec![0; 1]]).is_err());
    assert!(!f.has_pixels());
    f.set_planes([vec![1; 2], vec![2; 2], vec![3; 2]]).unwrap();
    assert_eq!(f.plane(2), &[3, 3]);
}

#[test]
fn xmp_attachment_is_shared() {
    let block: Arc<[u8]> = Arc::from(&b"<x/>"[..]);
    let mut a = frame(1, 1);
    let mut b = frame(1, 1);
    a.set_xmp(block.clone());
    b.set_xmp(block.clone());
    assert_eq!(a.xmp(), Some(&b"<x/>"[..]));
    assert_eq!(Arc::strong_count(&block), 3);
    drop(a);
    assert_eq!(Arc::strong_count(&block), 2);
    assert_eq!(b.xmp(), Some(&b"<x/>"[..]));
}

#[test]
fn converter_tags_full_range() {
    let img = image::RgbImage::from_pixel(1, 1, image::Rgb([10, 20, 30]));
    let mut f = frame(1, 1);
    assert_eq!(f.range(), YuvRange::Limited);
    Bt601Converter
        .rgb_to_yuv(&RgbView::from(&img), &mut f)
        .unwrap();
    assert_eq!(f.range(), YuvRange::Full);
    assert_eq!(YuvRange::from_tag(f.range().tag()), Some(YuvRange::Full));
    assert_eq!(YuvRange::from_tag(2), None);
}

#[test]
fn failed_conversion_keeps_the_range_tag() {
    let img = image::RgbImage::from_pixel(2, 1, image::Rgb([0, 0, 0]));
    let mut f = frame(1, 1);
    assert!(Bt601Converter.rgb_to_yuv(&RgbView::from(&img), &mut f).is_err());
    assert_eq!(f.range(), YuvRange::Limited);
}
